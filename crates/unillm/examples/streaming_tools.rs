//! Stream a reply that may call a tool, then answer the call
//!
//! ```sh
//! ANTHROPIC_API_KEY=... cargo run -p unillm --example streaming_tools
//! ```

use serde_json::json;
use std::io::Write;
use unillm::tools::schema;
use unillm::{ClientOptions, LLMClient, SendOptions, StreamEvent, ToolDefinition};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    unillm_utils::init_tracing_with_filter("unillm=info");

    let weather = ToolDefinition::new(
        "get_weather",
        "Current weather for a city",
        schema::object(json!({"city": schema::string("City name")}), vec!["city"]),
    );
    let options = ClientOptions::new("anthropic")
        .with_max_tokens(1024)
        .with_tools(vec![weather]);
    let mut client = LLMClient::new(options)?;
    client.user("What's the weather in Lisbon right now?");

    let mut stream = client.stream(SendOptions::new()).await?;
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Content(text) => {
                print!("{text}");
                std::io::stdout().flush()?;
            }
            StreamEvent::ToolCalls(calls) => {
                for call in calls {
                    println!("\n[tool call] {} {}", call.name, call.input);
                }
            }
            _ => {}
        }
    }
    let response = stream.complete().await?;
    println!();

    if let Some(call) = response.tool_calls.first() {
        client.user(format!(
            "Result of {}: {}",
            call.name,
            json!({"city": call.input["city"], "temperature_c": 21, "sky": "clear"})
        ));
        let answer = client.send(SendOptions::new().stream(false)).await?;
        println!("{}", answer.content);
    }

    if let Some(usage) = response.usage {
        println!("cost of first turn: ${:.6}", usage.total_cost);
    }
    Ok(())
}
