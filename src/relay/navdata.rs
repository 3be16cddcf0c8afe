//! Navigation data echo
//!
//! Clients send the JSON string "GET" and receive the drone's current
//! navigation data, unmodified. Anything else is ignored.

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::session::ClientSession;
use crate::drone::DroneClient;

/// Request value that triggers a navdata reply
pub const NAVDATA_REQUEST: &str = "GET";

/// Accept navdata connections until the listener fails
pub async fn serve_navdata(listener: TcpListener, drone: Arc<dyn DroneClient>) -> Result<()> {
    info!("Navdata echo listening on {}", listener.local_addr()?);

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("Navdata client connected: {}", addr);

        let drone = drone.clone();
        tokio::spawn(async move {
            let mut session = ClientSession::new(socket, addr);
            if let Err(e) = handle_requests(&mut session, drone.as_ref()).await {
                error!("Navdata client {} failed: {}", addr, e);
            }
            info!("Navdata client disconnected: {}", addr);
        });
    }
}

async fn handle_requests(session: &mut ClientSession, drone: &dyn DroneClient) -> Result<()> {
    while let Some(value) = session.recv().await {
        if !is_navdata_request(&value) {
            debug!("Ignoring {} from {}", value, session.addr());
            continue;
        }

        match drone.navdata().await {
            Ok(navdata) => session.send(&navdata).await?,
            Err(e) => error!("Failed to read navdata: {:#}", e),
        }
    }
    Ok(())
}

fn is_navdata_request(value: &Value) -> bool {
    value.as_str() == Some(NAVDATA_REQUEST)
}
