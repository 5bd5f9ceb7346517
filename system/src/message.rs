use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub type ConnectionId = uuid::Uuid;
pub type CellId = String;
pub type CellSnapshot = HashMap<CellId, Cell>;

/// One colored square of the shared grid.
///
/// `id` is expected to be `"<x>,<y>"` but is taken as sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    pub x: i64,
    pub y: i64,
    pub color: String,
}

/// Names a cell to erase. Clients usually send the whole cell; only `id` matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRef {
    pub id: CellId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub username: String,
    pub message: String,
}

const INBOUND_ACTIONS: [&str; 4] = ["join", "draw", "erase", "chat"];

/// Client -> server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum InboundMessage {
    Join {
        username: String,
        #[serde(default)]
        color: Option<String>,
    },
    Draw {
        data: Cell,
    },
    Erase {
        data: CellRef,
    },
    Chat {
        #[serde(default)]
        username: Option<String>,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload has no action")]
    MissingAction,
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

impl InboundMessage {
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingAction)?;
        if !INBOUND_ACTIONS.contains(&action) {
            return Err(DecodeError::UnknownAction(action.to_owned()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Draw { .. } => "draw",
            Self::Erase { .. } => "erase",
            Self::Chat { .. } => "chat",
        }
    }
}

/// Server -> client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OutboundMessage {
    Init { data: CellSnapshot },
    Draw { data: Cell },
    Erase { data: Cell },
    Chat { data: ChatLine },
}

impl OutboundMessage {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
