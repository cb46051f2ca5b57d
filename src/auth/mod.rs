//! Kite login: the demo auth server, its client, and the frontend middleware.

pub mod client;
pub mod middleware;
pub mod server;
pub mod session;
pub mod store;
pub mod templates;

pub use client::AuthClient;
pub use middleware::{AgentContext, AuthMiddleware, AuthorizationDecision, DenialReason, SpendingDecision};
pub use server::AuthServerState;
pub use session::{SessionCodec, SessionData};
pub use store::AuthStore;
