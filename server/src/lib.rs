pub extern crate actix_web;

mod broadcast;
pub mod config;
pub mod connection;
pub mod handlers;
pub mod server;
mod session;
mod session_registry;
