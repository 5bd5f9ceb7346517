use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::connection::Egress;

pub type ConnectionTx = Sender<Egress>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Joined,
}

#[derive(Debug)]
pub struct Session {
    display_name: Option<String>,
    tx: ConnectionTx,
}

impl Session {
    pub fn new(tx: ConnectionTx) -> Self {
        Self {
            display_name: None,
            tx,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.display_name.is_some() {
            SessionState::Joined
        } else {
            SessionState::Connected
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, display_name: String) {
        self.display_name = Some(display_name);
    }

    /// Never waits: a full or closed outbound channel is reported back.
    pub fn try_send(&self, frame: Egress) -> Result<(), TrySendError<Egress>> {
        self.tx.try_send(frame)
    }
}
