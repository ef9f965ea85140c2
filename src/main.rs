pub mod clock;
pub mod config;
pub mod controls;
pub mod externals;
pub mod models;
pub mod ports;
pub mod sensing;
pub mod tasks;

use anyhow::Result;
use clap::Parser;
use config::Cli;
use externals::{
    event_logging::task::task_control_event_logging,
    frame_sinks::FrameSinkModule,
    hardware::HardwareModule,
    liveness::{
        services::HostUptimeServiceActual,
        task::{bind, spawn_liveness_server},
    },
};
use tasks::control_loop::{task_control_loop, ControlLoop};
use tokio::{signal, sync::broadcast};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(cli.log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    cli.validate()?;
    info!("Starting with geometry {} on {:?} backend.", cli.geometry, cli.backend);

    let HardwareModule {
        ranging,
        frames,
        actuators,
        mut clock_generator,
    } = HardwareModule::initialize(&cli)?;

    let FrameSinkModule { sinks } = FrameSinkModule::initialize(
        cli.capture_dir.clone(),
        cli.classifier_url.clone(),
        cli.classifier_timeout(),
    );

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    clock_generator.start(&token)?;

    let liveness = spawn_liveness_server(
        bind(&cli.liveness_addr)?,
        token.clone(),
        HostUptimeServiceActual,
    )?;

    let (tx_control_event, rx_control_event) = broadcast::channel(32);

    let token_clone = token.clone();
    tracker.spawn(async { task_control_event_logging(token_clone, rx_control_event).await });

    let token_clone = token.clone();
    let control = ControlLoop::new(ranging, frames, actuators, sinks, cli.control_settings());
    let interval = cli.interval();
    tracker.spawn(async move {
        if let Err(e) = task_control_loop(token_clone, control, interval, tx_control_event).await {
            error!("Control loop failed. Error: {}", e);
        }
    });

    let token_clone = token.clone();

    tokio::select! {
        _ = token_clone.cancelled() => {}
        res = signal::ctrl_c() => {
            match res {
                Ok(_) => {
                    info!("Got ctrl_c, shutting down.");
                    token.cancel();
                },
                Err(e) => {
                    error!("Failed to listen for ctrl_c. Error: {}", e);
                    token.cancel();
                }
            };
        },
    }

    tracker.close();
    tracker.wait().await;

    if let Err(e) = clock_generator.stop() {
        error!("Failed to stop clock generator. Error: {}", e);
    }
    if liveness.join().is_err() {
        error!("Liveness thread panicked.");
    }

    info!("Stopped.");
    Ok(())
}
