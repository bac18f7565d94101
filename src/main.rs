//! DomiSafe - Raspberry Pi Home Security Binary
//!
//! Runs the intrusion alarm, the status LCD and the device control loop.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use domisafe::display::DisplayConnector;
use domisafe::{
    AlertController, AppConfig, CaptureThrottle, Command, DeviceController, DirectorySink,
    EnvironmentSource, GpioProvider, PartyMode, RangeFinder, RangeSensor, SecurityMonitor,
    SimulatedBus, SimulatedGpio, StatusDisplay, StillCamera, ThermalZoneSource,
    TracingTelemetry, DEFAULT_POLL_INTERVAL_MS, DEFAULT_THRESHOLD_CM,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "domisafe")]
#[command(about = "DomiSafe - Raspberry Pi home security appliance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    long_about = "Ultrasonic intrusion alarm with LED/buzzer actuators, intruder photos and a status LCD"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Alarm trigger distance in centimeters
    #[arg(short, long, default_value_t = DEFAULT_THRESHOLD_CM)]
    threshold: f64,

    /// Alarm evaluation interval in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    poll_interval: u64,

    /// Directory for intruder photos
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// Disable intruder photos
    #[arg(long)]
    no_camera: bool,

    /// Disable the status LCD
    #[arg(long)]
    no_display: bool,

    /// Use simulated GPIO and display even when hardware support is compiled in
    #[arg(long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the security appliance (default)
    Run,

    /// Take range readings and exit
    Measure(MeasureArgs),

    /// Print the effective configuration as JSON
    Config,
}

#[derive(Args)]
struct MeasureArgs {
    /// Number of readings
    #[arg(short, long, default_value_t = 5)]
    count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    let config = build_config(&cli);
    config.validate().context("Invalid configuration")?;

    match &cli.command {
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(Commands::Measure(args)) => {
            measure_command(&cli, &config, args).await?;
        }
        Some(Commands::Run) | None => {
            print_banner();
            run_command(&cli, config).await?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("DomiSafe - Raspberry Pi Home Security");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!("   Commands: 1-5 toggle devices, p party mode, q quit");
    println!();
}

fn build_config(cli: &Cli) -> AppConfig {
    let mut config = AppConfig::new()
        .with_threshold_cm(cli.threshold)
        .with_poll_interval_ms(cli.poll_interval)
        .with_camera(!cli.no_camera)
        .with_display(!cli.no_display);

    if let Some(dir) = &cli.image_dir {
        config = config.with_image_dir(dir);
    }

    config
}

fn build_gpio(cli: &Cli) -> Result<Arc<dyn GpioProvider>> {
    #[cfg(feature = "gpio")]
    if !cli.simulate {
        let gpio = domisafe::RaspberryPiGpio::new().context("GPIO initialization failed")?;
        return Ok(Arc::new(gpio));
    }

    #[cfg(not(feature = "gpio"))]
    if !cli.simulate {
        info!("GPIO support not compiled in, using simulated pins");
    }

    Ok(Arc::new(SimulatedGpio::new()))
}

fn build_display_bus(cli: &Cli, config: &AppConfig) -> Arc<dyn DisplayConnector> {
    let display = &config.display;

    #[cfg(feature = "gpio")]
    if !cli.simulate {
        return Arc::new(domisafe::I2cDisplayBus::new(
            display.i2c_bus,
            display.width as u8,
            display.rows as u8,
        ));
    }

    #[cfg(not(feature = "gpio"))]
    let _ = cli;

    Arc::new(SimulatedBus::new(
        &display.candidate_addresses,
        display.width,
        display.rows,
    ))
}

/// Room sensor on real hardware, the board's thermal zone otherwise.
fn build_environment(cli: &Cli, config: &AppConfig) -> Option<Arc<dyn EnvironmentSource>> {
    if !config.environment.enabled {
        info!("Environment sensor disabled");
        return None;
    }

    #[cfg(feature = "gpio")]
    if !cli.simulate {
        match domisafe::Dht11Source::new(config.environment.dht_pin) {
            Ok(source) => return Some(Arc::new(source)),
            Err(e) => warn!("DHT11 unavailable, reporting board temperature: {}", e),
        }
    }

    #[cfg(not(feature = "gpio"))]
    let _ = cli;

    Some(Arc::new(ThermalZoneSource::default()))
}

async fn measure_command(cli: &Cli, config: &AppConfig, args: &MeasureArgs) -> Result<()> {
    let gpio = build_gpio(cli)?;
    let mut sensor = RangeSensor::new(gpio, config.security.trigger_pin, config.security.echo_pin)
        .context("Failed to set up the range sensor")?;

    for i in 1..=args.count {
        let (returned, sample) = tokio::task::spawn_blocking(move || {
            let sample = sensor.measure();
            (sensor, sample)
        })
        .await?;
        sensor = returned;

        match sample? {
            Some(distance) => println!("{:>3}: {:.1} cm", i, distance),
            None => println!("{:>3}: no echo", i),
        }

        if i < args.count {
            tokio::time::sleep(config.security.poll_interval()).await;
        }
    }

    Ok(())
}

async fn run_command(cli: &Cli, config: AppConfig) -> Result<()> {
    info!("Starting DomiSafe...");

    let gpio = build_gpio(cli)?;

    let environment = build_environment(cli, &config);

    let display = if config.display.enabled {
        let display = StatusDisplay::open(
            build_display_bus(cli, &config),
            environment.clone(),
            config.display.clone(),
        )
        .context("LCD initialization failed")?;
        display.start();
        Some(display)
    } else {
        info!("Status display disabled");
        None
    };

    let mut devices = DeviceController::new(Arc::clone(&gpio), config.devices.clone())
        .context("Failed to initialize devices")?;
    if let Some(display) = &display {
        devices = devices.with_display(display.clone());
    }
    let party = PartyMode::new(devices.clone());

    let sensor = RangeSensor::new(
        Arc::clone(&gpio),
        config.security.trigger_pin,
        config.security.echo_pin,
    )
    .context("Failed to set up the range sensor")?;
    let capture = CaptureThrottle::new(
        Arc::new(StillCamera::new(config.capture.camera_program.clone())),
        Arc::new(
            DirectorySink::new(&config.capture.image_dir)
                .context("Failed to create the image directory")?,
        ),
    )
    .with_cooldown(config.capture.cooldown())
    .with_enabled(config.capture.enabled);

    let mut alert = AlertController::new(sensor, gpio, capture, config.security.clone());
    if let Some(display) = &display {
        alert = alert.with_display(display.clone());
    }

    let mut monitor = SecurityMonitor::new(
        alert,
        Arc::new(TracingTelemetry),
        config.security.poll_interval(),
        config.reporting.clone(),
    );
    if let Some(environment) = environment {
        monitor = monitor.with_environment(environment);
    }
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    info!("DomiSafe running:");
    info!("  - Threshold: {:.1} cm", config.security.threshold_cm);
    info!("  - Poll interval: {}ms", config.security.poll_interval_ms);
    info!("  - Camera enabled: {}", config.capture.enabled);
    info!("  - Image directory: {}", config.capture.image_dir.display());

    control_loop(&devices, &party).await;

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    match tokio::time::timeout(Duration::from_secs(3), monitor_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Security monitor failed: {}", e),
        Err(_) => warn!("Security monitor did not stop in time"),
    }

    if party.is_active() {
        party.stop().await;
    }
    devices.all_off();

    if let Some(display) = &display {
        display.shutdown().await;
    }

    info!("Goodbye");
    Ok(())
}

/// Read commands from stdin until `q`, Ctrl-C, or a fatal read error.
async fn control_loop(devices: &DeviceController, party: &PartyMode) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(Command::Party) => {
                        party.toggle().await;
                    }
                    Ok(Command::Toggle(index)) => match devices.key_at(index) {
                        Some(key) => {
                            if let Err(e) = devices.toggle(&key) {
                                error!("Failed to toggle {}: {}", key, e);
                            }
                        }
                        None => warn!("No device at position {}", index),
                    },
                    Err(e) => warn!("{}", e),
                },
                Ok(None) => {
                    info!("stdin closed, waiting for Ctrl-C");
                    stdin_open = false;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }
}
