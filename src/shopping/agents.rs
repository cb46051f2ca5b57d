use crate::{
    agent::definition::LlmAgent,
    shopping::{
        prompts::{self, with_debug},
        tools::{self, Shop},
    },
};
use std::sync::Arc;

pub const APP_NAME: &str = "shopping_agent";

/// Builds the shopping agent tree rooted at `root_agent`.
pub fn root_agent(model: &str, shop: &Arc<Shop>) -> Arc<LlmAgent> {
    let shopper = LlmAgent::builder("shopper")
        .model(model)
        .description("Finds products matching the user's intent and records the chosen cart.")
        .instruction(with_debug(prompts::SHOPPER))
        .tools(tools::shopper_tools(shop))
        .retry(2, 1.0)
        .build();

    let shipping_address_collector = LlmAgent::builder("shipping_address_collector")
        .model(model)
        .description("Confirms or collects the user's shipping address.")
        .instruction(with_debug(prompts::SHIPPING_ADDRESS_COLLECTOR))
        .tools(tools::shipping_tools(shop))
        .retry(2, 1.5)
        .build();

    let payment_method_collector = LlmAgent::builder("payment_method_collector")
        .model(model)
        .description("Lets the user choose a payment method and fetches its credential token.")
        .instruction(with_debug(prompts::PAYMENT_METHOD_COLLECTOR))
        .tools(tools::payment_method_tools(shop))
        .retry(2, 1.0)
        .build();

    let buywhenready_collector = LlmAgent::builder("buywhenready_collector")
        .model(model)
        .description("Collects the conditions that trigger an automatic BuyWhenReady purchase.")
        .instruction(with_debug(prompts::BUYWHENREADY_COLLECTOR))
        .tools(tools::buywhenready_tools())
        .retry(1, 2.0)
        .build();

    LlmAgent::builder("root_agent")
        .model(model)
        .description("Shopping assistant that coordinates product search, checkout and BuyWhenReady.")
        .instruction(with_debug(prompts::ROOT))
        .tools(tools::root_tools(shop))
        .sub_agent(shopper)
        .sub_agent(shipping_address_collector)
        .sub_agent(payment_method_collector)
        .sub_agent(buywhenready_collector)
        .retry(2, 1.0)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{agent::definition::RetryPolicy, config::DemoConfig};

    #[test]
    fn test_agent_tree() {
        let shop = Shop::new(DemoConfig::default());
        let root = root_agent("gemini-2.5-flash", &shop);

        assert_eq!(root.sub_agents.len(), 4);
        assert_eq!(root.tools.len(), 7);
        assert_eq!(root.retry, RetryPolicy::new(2, 1.0));

        let shipping = root.find_agent("shipping_address_collector").unwrap();
        assert_eq!(shipping.retry, RetryPolicy::new(2, 1.5));
        let buywhenready = root.find_agent("buywhenready_collector").unwrap();
        assert_eq!(buywhenready.retry, RetryPolicy::new(1, 2.0));
        assert!(buywhenready.tools.get("store_buywhenready_conditions").is_some());

        let targets: Vec<String> = root
            .transfer_targets("shopper")
            .iter()
            .map(|agent| agent.name.clone())
            .collect();
        assert_eq!(targets, ["root_agent"]);
        assert!(root.find_agent("shopper").unwrap().model == "gemini-2.5-flash");
    }
}
