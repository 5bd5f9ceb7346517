use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Recipient, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::mpsc::Receiver;

use system::{ConnectionId, DecodeError, InboundMessage};

use crate::config::ServerConfig;
use crate::server::ServerTx;
use crate::session::ConnectionTx;

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        from: ConnectionId,
        tx: ConnectionTx,
    },
    Inbound {
        from: ConnectionId,
        message: InboundMessage,
    },
    Disconnect {
        from: ConnectionId,
    },
}

/// An encoded frame on its way to one websocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Egress(pub String);

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(Egress);

enum ConnectionState {
    Open,
    Closed,
}

struct ConnectionActor {
    connection_id: ConnectionId,
    state: ConnectionState,
    srv_tx: ServerTx,
    outbound_buffer: usize,
}

impl ConnectionActor {
    fn send_to_server(&self, command: ConnectionCommand) -> bool {
        if self.srv_tx.send(command).is_err() {
            log::error!(
                "Server task is gone, dropping command from connection {}",
                self.connection_id
            );
            false
        } else {
            true
        }
    }

    fn handle_text(&self, text: &str) {
        match InboundMessage::decode(text) {
            Ok(message) => {
                log::debug!("Ingress {:?}", message);
                self.send_to_server(ConnectionCommand::Inbound {
                    from: self.connection_id,
                    message,
                });
            }
            Err(DecodeError::UnknownAction(action)) => log::warn!(
                "Ignoring unknown action {:?} from connection {}",
                action,
                self.connection_id
            ),
            Err(error) => log::warn!(
                "Dropping payload from connection {}: {}",
                self.connection_id,
                error
            ),
        }
    }
}

/// Moves frames from the outbound channel into the actor one at a time. The
/// next frame is pulled only after the actor has written the previous one,
/// so a socket that stops draining leaves frames in the bounded channel and
/// `try_send` on the broadcast side reports it full.
async fn forward_egress(
    connection_id: ConnectionId,
    mut rx: Receiver<Egress>,
    addr: Recipient<ConnectionActorMessage>,
) {
    log::debug!("Egress task of connection {} started", connection_id);
    while let Some(frame) = rx.recv().await {
        if let Err(error) = addr.send(ConnectionActorMessage(frame)).await {
            log::debug!(
                "Connection {} stopped taking frames: {}",
                connection_id,
                error
            );
            break;
        }
    }
    log::debug!("Egress task of connection {} terminated", connection_id);
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, rx) = tokio::sync::mpsc::channel::<Egress>(self.outbound_buffer);

        if !self.send_to_server(ConnectionCommand::Connect {
            from: self.connection_id,
            tx,
        }) {
            self.state = ConnectionState::Closed;
            ctx.stop();
            return;
        }

        let addr: Recipient<ConnectionActorMessage> = ctx.address().recipient();
        actix::spawn(forward_egress(self.connection_id, rx, addr));
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let ConnectionState::Open = self.state {
            self.state = ConnectionState::Closed;
            self.send_to_server(ConnectionCommand::Disconnect {
                from: self.connection_id,
            });
        }

        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        if let ConnectionState::Closed = self.state {
            return;
        }
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Text(text)) => self.handle_text(&text),
            Ok(ws::Message::Binary(bin)) => match std::str::from_utf8(&bin) {
                Ok(text) => self.handle_text(text),
                Err(_) => log::warn!(
                    "Dropping non UTF-8 binary frame from connection {}",
                    self.connection_id
                ),
            },
            Ok(ws::Message::Close(reason)) => {
                log::debug!("Connection {} closed: {:?}", self.connection_id, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => log::warn!(
                "Dropping continuation frame from connection {}",
                self.connection_id
            ),
            Ok(ws::Message::Pong(_)) | Ok(ws::Message::Nop) => (),
            Err(error) => {
                log::warn!("Connection {} failed: {}", self.connection_id, error);
                ctx.stop();
            }
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        let Egress(text) = msg.0;
        log::debug!("Egress to {}: {}", self.connection_id, text);
        ctx.text(text);
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    srv_tx: web::Data<ServerTx>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, Error> {
    let connection_id = ConnectionId::new_v4();
    log::debug!(
        "Accepting connection {} from {:?}",
        connection_id,
        req.peer_addr()
    );
    ws::start(
        ConnectionActor {
            connection_id,
            state: ConnectionState::Open,
            srv_tx: srv_tx.get_ref().clone(),
            outbound_buffer: config.outbound_buffer,
        },
        &req,
        stream,
    )
}
