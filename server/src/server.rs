use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use system::{Cell, ChatLine, ConnectionId, InboundMessage, OutboundMessage};

use super::connection::ConnectionCommand;
use crate::broadcast::{broadcast, send_to};
use crate::session::SessionState;
use crate::session_registry::SessionRegistry;

pub type ServerTx = UnboundedSender<ConnectionCommand>;

/// Owns all shared state. Commands are applied one at a time in arrival
/// order, which is what serializes draws and erases.
struct Server {
    registry: SessionRegistry,
}

impl Server {
    fn new() -> Self {
        Self {
            registry: SessionRegistry::new(),
        }
    }

    fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { from, tx } => {
                self.registry.register(from, tx);
            }
            ConnectionCommand::Inbound { from, message } => self.handle_inbound(&from, message),
            ConnectionCommand::Disconnect { from } => {
                self.disconnect(&from);
            }
        }
    }

    fn handle_inbound(&mut self, from: &ConnectionId, message: InboundMessage) {
        let state = match self.registry.state_of(from) {
            Some(state) => state,
            None => {
                log::debug!(
                    "Ignoring {} from closed connection {}",
                    message.action(),
                    from
                );
                return;
            }
        };

        match (state, message) {
            (SessionState::Connected, InboundMessage::Join { username, .. }) => {
                self.join(from, username)
            }
            (SessionState::Joined, InboundMessage::Join { .. }) => log::warn!(
                "{} tried to join again, ignoring",
                self.registry.display_name_of(from)
            ),
            (SessionState::Connected, message) => log::warn!(
                "Dropping {} from connection {} before join",
                message.action(),
                from
            ),
            (SessionState::Joined, InboundMessage::Draw { data }) => self.draw(from, data),
            (SessionState::Joined, InboundMessage::Erase { data }) => self.erase(&data.id),
            (SessionState::Joined, InboundMessage::Chat { message, .. }) => {
                self.chat(from, message)
            }
        }
    }

    fn join(&mut self, from: &ConnectionId, username: String) {
        if let Err(error) = self.registry.set_display_name(from, username) {
            log::warn!("Join of connection {} rejected: {}", from, error);
            return;
        }
        log::info!("{} joined", self.registry.display_name_of(from));

        let init = OutboundMessage::Init {
            data: self.registry.snapshot(),
        };
        if let Some(session) = self.registry.session(from) {
            send_to(from, session, &init);
        }
    }

    fn draw(&mut self, from: &ConnectionId, cell: Cell) {
        if cell.id.is_empty() {
            log::warn!("Dropping draw without cell id from connection {}", from);
            return;
        }
        self.registry.handle_draw(cell);
    }

    fn erase(&mut self, id: &str) {
        if self.registry.handle_erase(id).is_none() {
            log::debug!("Nothing to erase at {}", id);
        }
    }

    fn chat(&mut self, from: &ConnectionId, message: String) {
        if message.is_empty() {
            log::warn!("Empty chat message from connection {}", from);
            return;
        }
        let username = self.registry.display_name_of(from).to_owned();
        log::info!("Message from {}: {}", username, message);
        broadcast(
            &self.registry,
            &OutboundMessage::Chat {
                data: ChatLine { username, message },
            },
        );
    }

    /// Returns the display name the connection left with.
    fn disconnect(&mut self, connection_id: &ConnectionId) -> Option<String> {
        let display_name = self.registry.display_name_of(connection_id).to_owned();
        if self.registry.unregister(connection_id).is_none() {
            log::debug!("Connection {} was already gone", connection_id);
            return None;
        }
        log::info!("{} disconnected", display_name);
        if self.registry.is_empty() {
            log::debug!(
                "No live connections, {} cells kept",
                self.registry.cell_count()
            );
        }
        Some(display_name)
    }
}

pub fn spawn_server() -> ServerTx {
    let (srv_tx, mut srv_rx) = unbounded_channel::<ConnectionCommand>();

    tokio::spawn(async move {
        let mut server = Server::new();

        while let Some(command) = srv_rx.recv().await {
            server.handle_connection_command(command);
        }
        log::info!("Server task terminated");
    });

    srv_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Egress;
    use crate::session_registry::ANONYMOUS;
    use tokio::sync::mpsc::{channel, Receiver};

    fn cell(id: &str, x: i64, y: i64, color: &str) -> Cell {
        Cell {
            id: id.into(),
            x,
            y,
            color: color.into(),
        }
    }

    fn connect(server: &mut Server) -> (ConnectionId, Receiver<Egress>) {
        let from = ConnectionId::new_v4();
        let (tx, rx) = channel(64);
        server.handle_connection_command(ConnectionCommand::Connect { from, tx });
        (from, rx)
    }

    fn send(server: &mut Server, from: ConnectionId, message: InboundMessage) {
        server.handle_connection_command(ConnectionCommand::Inbound { from, message });
    }

    fn join(server: &mut Server, from: ConnectionId, username: &str) {
        send(
            server,
            from,
            InboundMessage::Join {
                username: username.into(),
                color: None,
            },
        );
    }

    fn received(rx: &mut Receiver<Egress>) -> Vec<OutboundMessage> {
        let mut result = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            result.push(OutboundMessage::decode(&frame.0).expect("valid frame"));
        }
        result
    }

    #[test]
    fn it_sends_init_to_joining_connection_only() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        let (_b, mut rx_b) = connect(&mut server);

        join(&mut server, a, "alice");

        assert_eq!(
            received(&mut rx_a),
            vec![OutboundMessage::Init {
                data: Default::default()
            }]
        );
        assert!(received(&mut rx_b).is_empty());
    }

    #[test]
    fn it_shares_drawing_between_alice_bob_and_late_carol() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        let (b, mut rx_b) = connect(&mut server);
        join(&mut server, a, "alice");
        join(&mut server, b, "bob");
        received(&mut rx_a);
        received(&mut rx_b);

        let red = cell("0,0", 0, 0, "#ff0000");
        send(&mut server, a, InboundMessage::Draw { data: red.clone() });

        assert_eq!(
            received(&mut rx_b),
            vec![OutboundMessage::Draw { data: red.clone() }]
        );

        let (c, mut rx_c) = connect(&mut server);
        join(&mut server, c, "carol");
        match received(&mut rx_c).as_slice() {
            [OutboundMessage::Init { data }] => {
                assert_eq!(data.len(), 1);
                assert_eq!(data["0,0"], red);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn it_broadcasts_draw_then_erase_and_leaves_store_empty() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        join(&mut server, a, "alice");
        received(&mut rx_a);

        let red = cell("30,60", 30, 60, "#ff0000");
        send(&mut server, a, InboundMessage::Draw { data: red.clone() });
        send(
            &mut server,
            a,
            InboundMessage::Erase {
                data: system::CellRef {
                    id: "30,60".into(),
                },
            },
        );

        assert_eq!(
            received(&mut rx_a),
            vec![
                OutboundMessage::Draw { data: red.clone() },
                OutboundMessage::Erase { data: red }
            ]
        );
        assert!(server.registry.snapshot().is_empty());
    }

    #[test]
    fn it_sends_surviving_cells_to_late_joiner() {
        let mut server = Server::new();
        let (a, _rx_a) = connect(&mut server);
        join(&mut server, a, "alice");

        for i in 0..5 {
            let id = format!("{},0", i * 30);
            send(
                &mut server,
                a,
                InboundMessage::Draw {
                    data: cell(&id, i * 30, 0, "#00ff00"),
                },
            );
        }
        send(
            &mut server,
            a,
            InboundMessage::Draw {
                data: cell("60,0", 60, 0, "#0000ff"),
            },
        );
        send(
            &mut server,
            a,
            InboundMessage::Erase {
                data: system::CellRef { id: "30,0".into() },
            },
        );

        let (late, mut rx_late) = connect(&mut server);
        join(&mut server, late, "late");
        match received(&mut rx_late).as_slice() {
            [OutboundMessage::Init { data }] => {
                assert_eq!(data.len(), 4);
                assert!(!data.contains_key("30,0"));
                assert_eq!(data["60,0"].color, "#0000ff");
                assert_eq!(data["0,0"].color, "#00ff00");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn it_ignores_erase_of_missing_cell_and_empty_chat() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        let (b, mut rx_b) = connect(&mut server);
        join(&mut server, a, "alice");
        join(&mut server, b, "bob");
        received(&mut rx_a);
        received(&mut rx_b);

        send(
            &mut server,
            a,
            InboundMessage::Erase {
                data: system::CellRef { id: "9,9".into() },
            },
        );
        send(
            &mut server,
            a,
            InboundMessage::Chat {
                username: Some("alice".into()),
                message: String::new(),
            },
        );

        assert!(received(&mut rx_a).is_empty());
        assert!(received(&mut rx_b).is_empty());
        assert!(server.registry.snapshot().is_empty());
    }

    #[test]
    fn it_attributes_chat_to_display_name() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        let (b, mut rx_b) = connect(&mut server);
        join(&mut server, a, "alice");
        join(&mut server, b, "bob");
        received(&mut rx_a);
        received(&mut rx_b);

        send(
            &mut server,
            b,
            InboundMessage::Chat {
                username: Some("mallory".into()),
                message: "hi".into(),
            },
        );

        let expected = vec![OutboundMessage::Chat {
            data: ChatLine {
                username: "bob".into(),
                message: "hi".into(),
            },
        }];
        assert_eq!(received(&mut rx_a), expected);
        assert_eq!(received(&mut rx_b), expected);
    }

    #[test]
    fn it_drops_events_before_join() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);

        send(
            &mut server,
            a,
            InboundMessage::Draw {
                data: cell("0,0", 0, 0, "#ff0000"),
            },
        );
        send(
            &mut server,
            a,
            InboundMessage::Chat {
                username: None,
                message: "hello".into(),
            },
        );
        join(&mut server, a, "");

        assert!(received(&mut rx_a).is_empty());
        assert!(server.registry.snapshot().is_empty());
        assert_eq!(server.registry.state_of(&a), Some(SessionState::Connected));

        join(&mut server, a, "alice");
        assert_eq!(server.registry.state_of(&a), Some(SessionState::Joined));
        assert_eq!(received(&mut rx_a).len(), 1);
    }

    #[test]
    fn it_ignores_second_join() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        join(&mut server, a, "alice");
        join(&mut server, a, "alicia");

        assert_eq!(received(&mut rx_a).len(), 1);
        assert_eq!(server.registry.display_name_of(&a), "alice");
    }

    #[test]
    fn it_stops_delivering_after_disconnect() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        let (b, mut rx_b) = connect(&mut server);
        join(&mut server, a, "alice");
        join(&mut server, b, "bob");
        received(&mut rx_a);
        received(&mut rx_b);

        server.handle_connection_command(ConnectionCommand::Disconnect { from: b });
        server.handle_connection_command(ConnectionCommand::Disconnect { from: b });
        send(
            &mut server,
            b,
            InboundMessage::Draw {
                data: cell("0,0", 0, 0, "#ff0000"),
            },
        );
        send(
            &mut server,
            a,
            InboundMessage::Draw {
                data: cell("30,0", 30, 0, "#ff0000"),
            },
        );

        assert_eq!(server.registry.len(), 1);
        assert_eq!(received(&mut rx_a).len(), 1);
        assert!(received(&mut rx_b).is_empty());
        assert!(!server.registry.snapshot().contains_key("0,0"));
    }

    #[test]
    fn it_drops_draw_without_cell_id() {
        let mut server = Server::new();
        let (a, mut rx_a) = connect(&mut server);
        join(&mut server, a, "alice");
        received(&mut rx_a);

        send(
            &mut server,
            a,
            InboundMessage::Draw {
                data: cell("", 0, 0, "#ff0000"),
            },
        );
        assert!(received(&mut rx_a).is_empty());
        assert!(server.registry.snapshot().is_empty());
    }

    #[test]
    fn it_reports_display_name_on_disconnect() {
        let mut server = Server::new();
        let (a, _rx_a) = connect(&mut server);
        let (b, _rx_b) = connect(&mut server);
        join(&mut server, b, "bob");

        assert_eq!(server.disconnect(&a), Some(ANONYMOUS.to_owned()));
        assert_eq!(server.disconnect(&b), Some("bob".to_owned()));
        assert_eq!(server.disconnect(&b), None);
        assert!(server.registry.is_empty());
    }
}
