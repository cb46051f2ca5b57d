use super::{keys, Shop};
use crate::{
    agent::tool::{required_arg, string_params, Tool, ToolContext},
    error::{Result, ShoppingError},
    shopping::mandate::CartMandate,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct FindProducts {
    shop: Arc<Shop>,
}

impl FindProducts {
    pub fn new(shop: Arc<Shop>) -> Self {
        Self { shop }
    }
}

#[async_trait]
impl Tool for FindProducts {
    fn name(&self) -> &str {
        "find_products"
    }

    fn description(&self) -> &str {
        "Finds products matching the user's shopping intent. Returns up to three \
         signed cart mandates, one per product, each valid for 30 minutes."
    }

    fn parameters(&self) -> Value {
        string_params(
            &[("intent", "Natural-language description of what the user wants to buy")],
            &["intent"],
        )
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let intent = required_arg(&args, "intent")?;
        let carts = self.shop.catalog.find_products(&intent, Utc::now())?;
        tracing::info!(intent = %intent, carts = carts.len(), "products found");

        ctx.set(keys::CART_MANDATES, &carts)?;
        Ok(json!({"status": "success", "cart_mandates": carts}))
    }
}

pub struct UpdateChosenCartMandate;

#[async_trait]
impl Tool for UpdateChosenCartMandate {
    fn name(&self) -> &str {
        "update_chosen_cart_mandate"
    }

    fn description(&self) -> &str {
        "Records which of the offered carts the user chose."
    }

    fn parameters(&self) -> Value {
        string_params(&[("cart_id", "The id of the chosen cart mandate")], &["cart_id"])
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let cart_id = required_arg(&args, "cart_id")?;
        let carts: Vec<CartMandate> = ctx.require(keys::CART_MANDATES)?;
        let chosen = carts
            .into_iter()
            .find(|cart| cart.contents.id == cart_id)
            .ok_or_else(|| ShoppingError::Tool(format!("No offered cart has id {}", cart_id)))?;

        ctx.set(keys::CHOSEN_CART_ID, &cart_id)?;
        ctx.set(keys::CART_MANDATE, &chosen)?;
        Ok(json!({
            "status": "success",
            "message": "Chosen cart mandate is ready",
            "cart_mandate": chosen,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{agent::tool::State, shopping::tools::test_support::{call, shop}};

    #[tokio::test]
    async fn test_find_then_choose() {
        let shop = shop();
        let mut state = State::new();

        let found = call(&FindProducts::new(shop), json!({"intent": "headphones"}), &mut state)
            .await
            .unwrap();
        let cart_id = found["cart_mandates"][0]["contents"]["id"].as_str().unwrap().to_string();

        let chosen = call(&UpdateChosenCartMandate, json!({"cart_id": cart_id}), &mut state)
            .await
            .unwrap();
        assert_eq!(chosen["status"], "success");
        assert_eq!(state[keys::CHOSEN_CART_ID], json!(cart_id));
        assert!(state.contains_key(keys::CART_MANDATE));
    }

    #[tokio::test]
    async fn test_choosing_unknown_cart_fails() {
        let mut state = State::new();
        let result = call(&UpdateChosenCartMandate, json!({"cart_id": "nope"}), &mut state).await;
        assert!(result.is_err());
    }
}
