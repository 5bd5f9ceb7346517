mod cell_store;
mod message;

pub use cell_store::*;
pub use message::*;

pub extern crate serde;
pub extern crate serde_json;
pub extern crate uuid;
