use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use feeder_controller::adapters::mqtt::{MqttTransport, spawn_event_loop};
use feeder_controller::adapters::{build_camera, build_sensor, build_store, gpio};
use feeder_controller::config::{GpioBackend, GpioConfig, LoggingConfig};
use feeder_controller::ports::OutputPin;
use feeder_controller::{
    Config, Controller, DeviceEvent, Ports, ReportingSchedule, http, run_reporting_loop,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Capacity of the queue between event sources and the dispatch loop.
const EVENT_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "feeder-controller")]
#[command(about = "Bird feeder controller")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "feeder-controller.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    init_tracing(&config.logging)?;
    if cli.config.exists() {
        info!(path = ?cli.config, "Loaded configuration");
    } else {
        info!(path = ?cli.config, "No configuration file found, using defaults");
    }
    config.validate()?;

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| color_eyre::eyre::eyre!("failed to install crypto provider"))?;

    info!(
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        client_id = %config.mqtt.client_id,
        "Starting feeder-controller"
    );

    let identity = feeder_tls::load_identity(&config.mqtt.tls)?;
    let (mqtt, eventloop) = MqttTransport::new(&config.mqtt, identity);

    let cancel = CancellationToken::new();
    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CAPACITY);

    let (feeder_pin, _motion) = setup_gpio(&config.gpio, events_tx.clone())?;
    let controller = Controller::new(
        &config,
        Ports {
            transport: Arc::new(mqtt.clone()),
            camera: build_camera(&config.camera),
            store: build_store(&config.storage)?,
            sensor: build_sensor(&config.sensor),
            feeder_pin,
        },
    )?;

    // only fired by `MqttTransport::shutdown` when the DISCONNECT stalls
    let mqtt_cancel = CancellationToken::new();
    let mqtt_handle = spawn_event_loop(eventloop, events_tx, mqtt_cancel.clone());

    let reporting_handle = tokio::spawn(run_reporting_loop(
        controller.monitor().clone(),
        controller.reporter(),
        ReportingSchedule::from(&config.reporting),
        cancel.clone(),
    ));

    let http_handle = config.server.as_ref().map(|server| {
        let monitor = controller.monitor().clone();
        let cancel = cancel.clone();
        let addr = server.http_addr;
        tokio::spawn(async move {
            if let Err(e) = http::serve(addr, monitor, cancel).await {
                error!(error = %e, "HTTP server failed");
            }
        })
    });

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else {
                    warn!("Event sources closed");
                    break;
                };
                controller.handle_event(event).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    drop(events_rx);
    cancel.cancel();
    controller.feeder().shutdown().await;
    mqtt.shutdown(mqtt_handle, &mqtt_cancel).await;

    let _ = reporting_handle.await;
    if let Some(handle) = http_handle {
        let _ = handle.await;
    }

    info!("feeder-controller shut down complete");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> color_eyre::Result<()> {
    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tracing=info,feeder_controller=info".to_owned());

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

/// Holds whatever keeps the motion interrupt armed.
type MotionGuard = Option<Box<dyn Send>>;

#[cfg(feature = "rpi")]
fn setup_gpio(
    config: &GpioConfig,
    events: mpsc::Sender<DeviceEvent>,
) -> color_eyre::Result<(Arc<dyn OutputPin>, MotionGuard)> {
    match config.backend {
        GpioBackend::Rpi => {
            let chip = rppal::gpio::Gpio::new()?;
            let feeder = gpio::RpiOutputPin::new(&chip, config.feeder_pin)?;
            let motion = gpio::MotionSensor::new(
                &chip,
                config.motion_pin,
                std::time::Duration::from_millis(config.debounce_ms),
                events,
            )?;
            Ok((Arc::new(feeder), Some(Box::new(motion))))
        }
        GpioBackend::Simulated => Ok(simulated_gpio(config, events)),
    }
}

#[cfg(not(feature = "rpi"))]
fn setup_gpio(
    config: &GpioConfig,
    events: mpsc::Sender<DeviceEvent>,
) -> color_eyre::Result<(Arc<dyn OutputPin>, MotionGuard)> {
    if config.backend == GpioBackend::Rpi {
        color_eyre::eyre::bail!("GPIO backend \"rpi\" requires building with the `rpi` feature");
    }
    Ok(simulated_gpio(config, events))
}

fn simulated_gpio(
    config: &GpioConfig,
    events: mpsc::Sender<DeviceEvent>,
) -> (Arc<dyn OutputPin>, MotionGuard) {
    info!(feeder_pin = config.feeder_pin, "Using simulated GPIO, no motion input");
    drop(events);
    (Arc::new(gpio::SimulatedPin::new(config.feeder_pin)), None)
}
