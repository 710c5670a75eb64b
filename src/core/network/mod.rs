//! Network endpoints the bridge publishes peripheral data on.

mod server;

pub use server::{NetworkServer, DEFAULT_CHUNK_SIZE};
