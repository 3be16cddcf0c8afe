//! TCP command listener
//!
//! Every connection streams JSON command objects. Nothing is ever written back.

use anyhow::Result;
use drone_relay_shared::Command;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::session::ClientSession;
use crate::command::CommandExecutor;

/// Accept command connections until the listener fails
pub async fn serve_commands(listener: TcpListener, executor: Arc<CommandExecutor>) -> Result<()> {
    info!("Command relay listening on {}", listener.local_addr()?);

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Command client connected: {}", addr);

        let executor = executor.clone();
        tokio::spawn(async move {
            let mut session = ClientSession::new(socket, addr);
            handle_commands(&mut session, &executor).await;
            info!("Command client disconnected: {}", session.addr());
        });
    }
}

/// Apply every command a client sends, in arrival order
async fn handle_commands(session: &mut ClientSession, executor: &CommandExecutor) {
    while let Some(value) = session.recv().await {
        debug!("Command from {}: {}", session.addr(), value);

        let command = Command::from_json(&value);
        if command.is_empty() {
            continue;
        }

        let report = executor.execute(&command).await;
        debug!(
            "Applied {} calls in {}ms",
            report.actions.len(),
            report.elapsed_ms
        );
        if report.failed > 0 {
            warn!(
                "Command from {} applied {} of {} calls",
                session.addr(),
                report.applied,
                report.applied + report.failed
            );
        }
    }
}
