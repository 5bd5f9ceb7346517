use system::{ConnectionId, OutboundMessage};
use tokio::sync::mpsc::error::TrySendError;

use crate::connection::Egress;
use crate::session::Session;
use crate::session_registry::SessionRegistry;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Sends `message` to every session registered right now. A recipient that
/// cannot take the frame is skipped.
pub fn broadcast(registry: &SessionRegistry, message: &OutboundMessage) -> Delivery {
    let mut delivery = Delivery::default();
    let text = match message.encode() {
        Ok(text) => text,
        Err(error) => {
            log::error!("Failed to encode {:?}: {}", message, error);
            return delivery;
        }
    };

    registry.for_each_session(|connection_id, session| {
        if deliver(connection_id, session, text.clone()) {
            delivery.delivered += 1;
        } else {
            delivery.failed += 1;
        }
    });

    log::debug!(
        "Broadcast {} bytes: {} delivered, {} failed",
        text.len(),
        delivery.delivered,
        delivery.failed
    );
    delivery
}

pub fn send_to(connection_id: &ConnectionId, session: &Session, message: &OutboundMessage) -> bool {
    match message.encode() {
        Ok(text) => deliver(connection_id, session, text),
        Err(error) => {
            log::error!("Failed to encode {:?}: {}", message, error);
            false
        }
    }
}

fn deliver(connection_id: &ConnectionId, session: &Session, text: String) -> bool {
    match session.try_send(Egress(text)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            log::warn!(
                "Outbound buffer of connection {} is full, dropping event",
                connection_id
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            log::warn!("Connection {} is closing, dropping event", connection_id);
            false
        }
    }
}
