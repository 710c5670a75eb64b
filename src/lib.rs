//! BLE Bridge library
//! Relays bytes between a BLE peripheral's notify/write characteristics and
//! a TCP or UDP client.

pub mod config;
pub mod console;
pub mod core;
pub mod logging;
pub mod state;
pub mod utils;
