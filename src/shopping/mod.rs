//! The BuyWhenReady shopping agent: demo merchant, mandates, tools and the
//! agent tree that uses them.

pub mod agents;
pub mod catalog;
pub mod mandate;
pub mod prompts;
pub mod tools;

pub use agents::{root_agent, APP_NAME};
pub use catalog::{Catalog, Product};
pub use mandate::{CartContents, CartMandate, MerchantSigner, PaymentMandate, PaymentReceipt, SignedPaymentMandate, UserDevice};
pub use tools::Shop;
