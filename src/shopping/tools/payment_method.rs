use super::{keys, Shop, KITE_WALLET_ALIAS};
use crate::{
    agent::tool::{required_arg, string_params, Tool, ToolContext},
    error::{Result, ShoppingError},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const KITE_WALLET_URL: &str = "demo://kite-wallet";

// The demo only ever offers the Kite wallet.
pub struct GetPaymentMethods;

#[async_trait]
impl Tool for GetPaymentMethods {
    fn name(&self) -> &str {
        "get_payment_methods"
    }

    fn description(&self) -> &str {
        "Gets the payment methods available on the user's account."
    }

    fn parameters(&self) -> Value {
        string_params(&[("user_email", "Identifies the user's account")], &[])
    }

    async fn call(&self, _args: Value, _ctx: &mut ToolContext<'_>) -> Result<Value> {
        Ok(json!([KITE_WALLET_ALIAS]))
    }
}

pub struct GetPaymentCredentialToken {
    shop: Arc<Shop>,
}

impl GetPaymentCredentialToken {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for GetPaymentCredentialToken {
    fn name(&self) -> &str {
        "get_payment_credential_token"
    }

    fn description(&self) -> &str {
        "Gets a payment credential token for the chosen payment method."
    }

    fn parameters(&self) -> Value {
        string_params(
            &[
                ("user_email", "The user's email address"),
                ("payment_method_alias", "The payment method the user chose"),
            ],
            &["payment_method_alias"],
        )
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let user_email = self.shop.user_email(&args, ctx);
        let alias = required_arg(&args, "payment_method_alias")?;
        if alias != KITE_WALLET_ALIAS {
            return Err(ShoppingError::Payment(format!(
                "Unsupported payment method `{}`; only {} is available",
                alias, KITE_WALLET_ALIAS
            )));
        }

        let demo = &self.shop.demo;
        let wallet_address = ctx
            .get_str(keys::WALLET_ADDRESS)
            .map(str::to_string)
            .unwrap_or_else(|| demo.wallet_address.clone());
        let token = json!({
            "type": "kite_wallet",
            "address": wallet_address,
            "balance": demo.wallet_balance,
            "currency": demo.currency,
        });

        ctx.set(
            keys::PAYMENT_CREDENTIAL_TOKEN,
            json!({"value": token, "url": KITE_WALLET_URL}),
        )?;
        ctx.set(keys::PAYMENT_METHOD_ALIAS, &alias)?;
        tracing::info!(user_email = %user_email, "payment credential token issued");

        Ok(json!({"status": "success", "token": token}))
    }
}
