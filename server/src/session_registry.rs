use std::collections::HashMap;

use system::{Cell, CellSnapshot, CellStore, ConnectionId, OutboundMessage};

use crate::broadcast::{broadcast, Delivery};
use crate::session::{ConnectionTx, Session, SessionState};

/// Shown for connections that never joined.
pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("display name is empty")]
    EmptyDisplayName,
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),
    #[error("connection {0} already joined")]
    AlreadyJoined(ConnectionId),
}

/// Live sessions plus the cell store. Only the owner of the registry can
/// touch the cells, and every cell mutation is broadcast before the next one
/// starts.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnectionId, Session>,
    cells: CellStore,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            cells: CellStore::new(),
        }
    }

    pub fn register(&mut self, connection_id: ConnectionId, tx: ConnectionTx) -> ConnectionId {
        if self
            .sessions
            .insert(connection_id, Session::new(tx))
            .is_some()
        {
            log::warn!("Connection {} registered twice", connection_id);
        }
        log::debug!(
            "Connection {} registered ({} live)",
            connection_id,
            self.len()
        );
        connection_id
    }

    pub fn set_display_name(
        &mut self,
        connection_id: &ConnectionId,
        display_name: String,
    ) -> Result<(), RegistryError> {
        if display_name.is_empty() {
            return Err(RegistryError::EmptyDisplayName);
        }
        let session = self
            .sessions
            .get_mut(connection_id)
            .ok_or(RegistryError::UnknownConnection(*connection_id))?;
        if session.state() == SessionState::Joined {
            return Err(RegistryError::AlreadyJoined(*connection_id));
        }
        session.set_display_name(display_name);
        Ok(())
    }

    pub fn display_name_of(&self, connection_id: &ConnectionId) -> &str {
        self.sessions
            .get(connection_id)
            .and_then(|s| s.display_name())
            .unwrap_or(ANONYMOUS)
    }

    pub fn state_of(&self, connection_id: &ConnectionId) -> Option<SessionState> {
        self.sessions.get(connection_id).map(|s| s.state())
    }

    pub fn session(&self, connection_id: &ConnectionId) -> Option<&Session> {
        self.sessions.get(connection_id)
    }

    pub fn unregister(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        self.sessions.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn for_each_session<F>(&self, mut f: F)
    where
        F: FnMut(&ConnectionId, &Session),
    {
        for (connection_id, session) in &self.sessions {
            f(connection_id, session);
        }
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn snapshot(&self) -> CellSnapshot {
        self.cells.snapshot()
    }

    pub fn handle_draw(&mut self, cell: Cell) -> Delivery {
        self.cells.upsert(cell.clone());
        broadcast(self, &OutboundMessage::Draw { data: cell })
    }

    /// `None` when there was no such cell; nothing is broadcast then.
    pub fn handle_erase(&mut self, id: &str) -> Option<Delivery> {
        let removed = self.cells.delete(id)?;
        log::info!("Cell erased: {}", id);
        Some(broadcast(self, &OutboundMessage::Erase { data: removed }))
    }
}
