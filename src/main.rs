mod command;
mod config;
mod context;
mod drone;
mod relay;

use anyhow::{bail, Context, Result};
use clap::Parser;
use command::CommandExecutor;
use config::{Args, DroneBackend, RelayConfig};
use context::RelayContext;
use drone::{DroneClient, MavlinkDrone, SimulatedDrone};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Blocking readers (stdin, serial) would otherwise hold the runtime open,
    // so leave through process::exit either way
    match run().await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    let config = RelayConfig::from_args(Args::parse());
    if !config.has_work() {
        bail!("Nothing to do: every listener is disabled and stdin input is off");
    }

    info!("Drone relay starting (preset {:?})", config.preset);

    let drone: Arc<dyn DroneClient> = match config.drone {
        DroneBackend::Mavlink => Arc::new(MavlinkDrone::connect(config.mavlink.clone())),
        DroneBackend::Simulated => Arc::new(SimulatedDrone::new()),
    };
    info!("Using {} drone client", drone.name());

    let context = Arc::new(RelayContext::new());
    info!("Active camera: {}", context.camera().await);
    let executor = Arc::new(CommandExecutor::new(
        drone.clone(),
        context.clone(),
        config.fields,
    ));

    let mut listeners: JoinSet<Result<()>> = JoinSet::new();

    if let Some(addr) = config.command_addr() {
        let listener = bind(addr, "command").await?;
        listeners.spawn(relay::serve_commands(listener, executor.clone()));
    }

    if let Some(addr) = config.navdata_addr() {
        let listener = bind(addr, "navdata").await?;
        listeners.spawn(relay::serve_navdata(listener, drone.clone()));
    }

    if let Some(addr) = config.http_addr() {
        let listener = bind(addr, "HTTP").await?;
        let slot = context.frames().clone();
        tokio::spawn(relay::run_frame_pump(drone.clone(), slot.clone()));
        listeners.spawn(relay::serve_frames(listener, slot));
    }

    let stdin_task = config.stdin.then(|| {
        info!("Reading commands from stdin");
        let executor = executor.clone();
        tokio::spawn(async move {
            relay::run_stdin(BufReader::new(tokio::io::stdin()), &executor).await;
        })
    });
    let stdin_closed = async move {
        match stdin_task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!("Stdin task failed: {}", e);
                }
            }
            None => std::future::pending::<()>().await,
        }
    };

    let result = tokio::select! {
        _ = stdin_closed => Ok(()),
        Some(joined) = listeners.join_next() => match joined {
            Ok(Ok(())) => Err(anyhow::anyhow!("Listener stopped unexpectedly")),
            Ok(Err(e)) => Err(e),
            Err(e) => Err(anyhow::anyhow!("Listener task failed: {}", e)),
        },
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to wait for ctrl-c: {}", e);
            }
            info!("Shutting down");
            Ok(())
        }
    };

    if let Err(e) = drone.flush().await {
        warn!("Failed to flush drone commands: {:#}", e);
    }

    result
}

async fn bind(addr: SocketAddr, what: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {} listener on {}", what, addr))
}
