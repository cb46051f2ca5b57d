use super::{keys, Shop};
use crate::{
    agent::tool::{string_params, Tool, ToolContext},
    error::Result,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct GetShippingAddress {
    shop: Arc<Shop>,
}

impl GetShippingAddress {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for GetShippingAddress {
    fn name(&self) -> &str {
        "get_shipping_address"
    }

    fn description(&self) -> &str {
        "Gets the shipping address on file for the user's account."
    }

    fn parameters(&self) -> Value {
        string_params(&[("user_email", "Identifies the user's account")], &[])
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let user_email = self.shop.user_email(&args, ctx);
        let shipping_address = ctx
            .get_str(keys::SHIPPING_ADDRESS)
            .map(str::to_string)
            .unwrap_or_else(|| self.shop.demo.default_shipping_address.clone());

        Ok(json!({
            "status": "success",
            "user_email": user_email,
            "shipping_address": shipping_address,
        }))
    }
}

pub struct GetDefaultShippingAddress {
    shop: Arc<Shop>,
}

impl GetDefaultShippingAddress {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for GetDefaultShippingAddress {
    fn name(&self) -> &str {
        "get_default_shipping_address"
    }

    fn description(&self) -> &str {
        "Gets the user's default shipping address and selects it for this order."
    }

    fn parameters(&self) -> Value {
        string_params(&[], &[])
    }

    async fn call(&self, _args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let address = self.shop.demo.default_shipping_address.clone();
        ctx.set(keys::SHIPPING_ADDRESS, &address)?;
        Ok(json!({"status": "success", "shipping_address": address}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{agent::tool::State, shopping::tools::test_support::{call, shop}};

    #[tokio::test]
    async fn test_default_address_is_selected() {
        let shop = shop();
        let mut state = State::new();

        let output = call(&GetDefaultShippingAddress::new(shop.clone()), json!({}), &mut state)
            .await
            .unwrap();
        assert_eq!(output["shipping_address"], "123 Main St, San Francisco, CA 94105");
        assert_eq!(state[keys::SHIPPING_ADDRESS], output["shipping_address"]);
    }

    #[tokio::test]
    async fn test_address_on_file_wins() {
        let mut state = State::new();
        state.insert(keys::SHIPPING_ADDRESS.to_string(), json!("1 Infinite Loop, Cupertino, CA 95014"));

        let output = call(&GetShippingAddress::new(shop()), json!({}), &mut state)
            .await
            .unwrap();
        assert_eq!(output["shipping_address"], "1 Infinite Loop, Cupertino, CA 95014");
        assert_eq!(output["user_email"], "bugsbunny@gmail.com");
    }
}
