pub extern crate actix_web;

pub mod auth;
pub mod connection;
pub mod connection_tx_storage;
mod countdown;
pub mod server;
mod server_state;
mod session;
pub mod store;
