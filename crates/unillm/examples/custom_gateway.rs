//! Point the generic `/v1` adapter at a self-hosted gateway
//!
//! Works with LM Studio, vLLM, llama.cpp server and other OpenAI-compatible
//! servers. The model is priced through a custom registry entry.

use std::sync::Arc;
use unillm::{ClientOptions, LLMClient, ModelRegistry, ModelUsageEntry, SendOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    unillm_utils::init_tracing();

    let base_url =
        std::env::var("GATEWAY_URL").unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
    let model = std::env::var("GATEWAY_MODEL").unwrap_or_else(|_| "qwen2.5-7b-instruct".to_string());

    let registry = Arc::new(ModelRegistry::new());
    registry.add_custom(ModelUsageEntry::new("apiv1", model.as_str()).with_costs(1e-7, 2e-7));

    let options = ClientOptions::new("apiv1")
        .with_base_url(base_url.as_str())
        .with_api_key("not-needed")
        .with_model(model.as_str())
        .with_timeout(300);
    let mut client = LLMClient::new(options)?.with_registry(registry);

    for listing in client.fetch_models(true).await? {
        println!("available: {}", listing.model);
    }

    let response = client
        .chat("Name three prime numbers.", SendOptions::new())
        .await?;
    println!("{}", response.content);
    if let Some(usage) = response.usage {
        println!("{} tokens, ${:.8}", usage.total_tokens, usage.total_cost);
    }
    Ok(())
}
