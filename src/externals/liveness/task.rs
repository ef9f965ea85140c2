use std::{
    thread::{self, JoinHandle},
    time::Duration,
};

use thiserror::Error;
use tiny_http::{Response, Server};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::services::HostUptimeService;

/// How long a `recv` may block before the token is checked again.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum LivenessError {
    #[error("Failed to bind liveness endpoint to {address}. Error: {reason}")]
    Bind { address: String, reason: String },
}

pub fn bind(address: &str) -> Result<Server, LivenessError> {
    Server::http(address).map_err(|e| LivenessError::Bind {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Plain text answer for every liveness request.
pub fn status_message(service: &impl HostUptimeService) -> String {
    match service.uptime() {
        Ok(uptime) => {
            let seconds = uptime.as_secs();
            format!(
                "occupancy sentinel running. Host uptime: {}h {}m {}s\n",
                seconds / 3600,
                (seconds % 3600) / 60,
                seconds % 60
            )
        }
        Err(e) => {
            warn!("Failed to get host uptime. Error: {}", e);
            "occupancy sentinel running. Host uptime: unknown\n".to_string()
        }
    }
}

/// Task: Answer liveness probes on a dedicated thread until cancelled.
pub fn spawn_liveness_server(
    server: Server,
    token: CancellationToken,
    service: impl HostUptimeService + 'static,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("liveness".to_string())
        .spawn(move || serve(server, token, service))
}

#[tracing::instrument(skip_all)]
fn serve(server: Server, token: CancellationToken, service: impl HostUptimeService) {
    info!("Started.");
    while !token.is_cancelled() {
        let request = match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                error!("Failed to receive liveness request. Error: {}", e);
                break;
            }
        };

        debug!("Got liveness request: {} {}", request.method(), request.url());
        if let Err(e) = request.respond(Response::from_string(status_message(&service))) {
            warn!("Failed to answer liveness request. Error: {}", e);
        }
    }
    warn!("Cancelled.");
}
