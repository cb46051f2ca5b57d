//! # BuyWhenReady
//!
//! An LLM shopping agent with Kite login, split into three services:
//!
//! - **Auth server**: demo email/OTP login and agent budget configuration, kept in memory
//! - **Agent runtime**: session API and `/run`, driving the shopping agent tree against an
//!   OpenAI-compatible chat-completions backend
//! - **Frontend**: chat page and JSON API that relays browser messages to the runtime
//!
//! The shopping agent itself searches a demo catalog, collects shipping and payment
//! details, signs cart and payment mandates and completes an OTP-confirmed payment.

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod frontend;
pub mod model;
pub mod runtime;
pub mod shopping;

pub use config::AppConfig;
pub use error::{Result, ShoppingError};
