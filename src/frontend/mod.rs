//! Browser-facing chat frontend that relays messages to the agent runtime.

pub mod render;
pub mod runtime_client;
pub mod server;
pub mod templates;

pub use runtime_client::RuntimeClient;
pub use server::{router, FrontendState};
