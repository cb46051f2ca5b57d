use super::keys;
use crate::{
    agent::tool::{Tool, ToolContext},
    error::{Result, ShoppingError},
};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct StoreBuyWhenReadyConditions;

#[async_trait]
impl Tool for StoreBuyWhenReadyConditions {
    fn name(&self) -> &str {
        "store_buywhenready_conditions"
    }

    fn description(&self) -> &str {
        "Stores the BuyWhenReady conditions the user confirmed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "conditions": {
                    "type": "object",
                    "description": "The user's confirmed BuyWhenReady conditions",
                    "properties": {
                        "condition_type": {
                            "type": "string",
                            "enum": ["price_below", "price_drop_percent", "scheduled", "in_stock"]
                        },
                        "threshold": {
                            "type": "string",
                            "description": "Target price, percentage or date/time, depending on the condition"
                        },
                        "details": {"type": "string"}
                    },
                    "required": ["condition_type"]
                }
            },
            "required": ["conditions"]
        })
    }

    async fn call(&self, args: Value, ctx: &mut ToolContext<'_>) -> Result<Value> {
        let conditions = match args.get("conditions") {
            Some(Value::Null) | None => {
                return Err(ShoppingError::Tool("Missing required argument `conditions`".to_string()))
            }
            Some(conditions) => conditions.clone(),
        };

        let message = format!("BuyWhenReady conditions stored successfully: {}", conditions);
        ctx.set(keys::BUYWHENREADY_CONDITIONS, conditions)?;
        Ok(Value::String(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{agent::tool::State, shopping::tools::test_support::call};

    #[tokio::test]
    async fn test_conditions_stored() {
        let mut state = State::new();
        let conditions = json!({"condition_type": "price_below", "threshold": "75"});
        let output = call(
            &StoreBuyWhenReadyConditions,
            json!({"conditions": conditions.clone()}),
            &mut state,
        )
        .await
        .unwrap();

        assert!(output.as_str().unwrap().starts_with("BuyWhenReady conditions stored successfully"));
        assert_eq!(state[keys::BUYWHENREADY_CONDITIONS], conditions);
    }

    #[tokio::test]
    async fn test_missing_conditions() {
        let mut state = State::new();
        assert!(call(&StoreBuyWhenReadyConditions, json!({}), &mut state).await.is_err());
    }
}
