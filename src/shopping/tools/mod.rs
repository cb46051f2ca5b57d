//! Tools exposed to the shopping agents, grouped by the agent that owns them.

pub mod buywhenready;
pub mod checkout;
pub mod payment_method;
pub mod shipping;
pub mod shopper;

use crate::{
    agent::tool::{arg_str, Tool, ToolContext},
    config::DemoConfig,
    shopping::{catalog::Catalog, mandate::MerchantSigner},
};
use serde_json::Value;
use std::sync::Arc;

// Session state keys shared by the tools and the frontend.
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const AGENT_ID: &str = "agent_id";
    pub const USER_EMAIL: &str = "user_email";
    pub const MAX_BUDGET: &str = "max_budget";
    pub const EXPIRATION_TIME: &str = "expiration_time";
    pub const WALLET_ADDRESS: &str = "wallet_address";

    pub const CART_MANDATES: &str = "cart_mandates";
    pub const CHOSEN_CART_ID: &str = "chosen_cart_id";
    pub const CART_MANDATE: &str = "cart_mandate";
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
    pub const PAYMENT_METHOD_ALIAS: &str = "payment_method_alias";
    pub const PAYMENT_CREDENTIAL_TOKEN: &str = "payment_credential_token";
    pub const PAYMENT_MANDATE: &str = "payment_mandate";
    pub const SIGNED_PAYMENT_MANDATE: &str = "signed_payment_mandate";
    pub const PAYMENT_MANDATE_ACCEPTED: &str = "payment_mandate_accepted";
    pub const OTP_CHALLENGE: &str = "otp_challenge";
    pub const PAYMENT_RECEIPT: &str = "payment_receipt";
    pub const BUYWHENREADY_CONDITIONS: &str = "buywhenready_conditions";
    pub const PROOF_OF_INTENT: &str = "proof_of_intent";
}

pub const KITE_WALLET_ALIAS: &str = "Kite User Wallet";

// The demo merchant and user data every shopping tool works against.
pub struct Shop {
    pub catalog: Catalog,
    pub demo: DemoConfig,
}

impl Shop {
    pub fn new(demo: DemoConfig) -> Arc<Self> {
        let signer = MerchantSigner::new(demo.merchant_name.clone(), &demo.merchant_secret);
        Arc::new(Self {
            catalog: Catalog::demo(signer, demo.currency.clone()),
            demo,
        })
    }

    // Email from the tool arguments, then the session, then the demo user.
    pub fn user_email(&self, args: &Value, ctx: &ToolContext<'_>) -> String {
        arg_str(args, keys::USER_EMAIL)
            .or_else(|| ctx.get_str(keys::USER_EMAIL).map(str::to_string))
            .unwrap_or_else(|| self.demo.user_email.clone())
    }
}

pub fn root_tools(shop: &Arc<Shop>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(checkout::CreatePaymentMandate::new(shop.clone())),
        Arc::new(checkout::InitiatePayment::new(shop.clone())),
        Arc::new(checkout::InitiatePaymentWithOtp),
        Arc::new(checkout::SendSignedPaymentMandateToCredentialsProvider::new(shop.clone())),
        Arc::new(checkout::SignMandatesOnUserDevice),
        Arc::new(checkout::UpdateCart::new(shop.clone())),
        Arc::new(checkout::DisplayKiteProofOfIntent::new(shop.clone())),
    ]
}

pub fn shopper_tools(shop: &Arc<Shop>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(shopper::FindProducts::new(shop.clone())),
        Arc::new(shopper::UpdateChosenCartMandate),
    ]
}

pub fn shipping_tools(shop: &Arc<Shop>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(shipping::GetShippingAddress::new(shop.clone())),
        Arc::new(shipping::GetDefaultShippingAddress::new(shop.clone())),
    ]
}

pub fn payment_method_tools(shop: &Arc<Shop>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(payment_method::GetPaymentMethods),
        Arc::new(payment_method::GetPaymentCredentialToken::new(shop.clone())),
    ]
}

pub fn buywhenready_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(buywhenready::StoreBuyWhenReadyConditions)]
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::agent::tool::State;

    pub fn shop() -> Arc<Shop> {
        Shop::new(DemoConfig::default())
    }

    pub async fn call(tool: &dyn Tool, args: Value, state: &mut State) -> crate::Result<Value> {
        let mut ctx = ToolContext {
            agent_name: "test_agent",
            invocation_id: "e-test",
            state,
        };
        tool.call(args, &mut ctx).await
    }
}
