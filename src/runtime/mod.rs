//! HTTP surface of the agent runtime: sessions and `/run`.

pub mod server;

pub use server::{router, RunRequest, RuntimeState};
