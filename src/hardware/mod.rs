//! Hardware collaborators: GPIO pins, the still camera, image storage and
//! the environment sensor.

pub mod camera;
pub mod environment;
pub mod gpio;

pub use camera::{DirectorySink, FrameGrabber, ImageSink, StillCamera};
pub use environment::{EnvironmentReading, EnvironmentSource, ThermalZoneSource};
pub use gpio::{DefaultGpioProvider, GpioProvider, PinLevel, SimulatedGpio};
