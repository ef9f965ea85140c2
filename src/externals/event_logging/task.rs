use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::control_event::ControlEvent;

/// Task: Log every control event broadcast by the control loop.
/// Can be cancelled.
#[tracing::instrument(skip_all)]
pub async fn task_control_event_logging(
    token: CancellationToken,
    mut rx_control_event: Receiver<ControlEvent>,
) {
    info!("Started.");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            },
            received = rx_control_event.recv() => match received {
                Ok(event) => info!("Got control event: {}", event),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} control events.", skipped),
                Err(RecvError::Closed) => {
                    info!("Control event channel closed.");
                    break;
                }
            }
        };
    }
}
