//! Command-line front end for unillm

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use tracing::{debug, info};
use unillm::{
    ChatResponse, ClientOptions, LLMClient, ModelListing, SendOptions, StreamEvent, ToolCall,
    Usage, providers,
};

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser, Debug)]
#[command(name = "unillm")]
#[command(about = "Chat with any supported LLM service", long_about = None)]
struct Cli {
    /// Log filter directive, e.g. `unillm::stream=debug`
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one prompt and print the reply
    Chat(ChatArgs),
    /// List the models a service serves
    Models(ModelsArgs),
}

#[derive(clap::Args, Debug)]
struct ServiceArgs {
    /// Service name (openai, anthropic, google, ollama, groq, ...)
    #[arg(short, long, default_value = "openai")]
    service: String,

    /// Override the service's base URL
    #[arg(long)]
    base_url: Option<String>,

    /// API key (defaults to ${SERVICE}_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Model name (defaults to the service's default model)
    #[arg(short, long)]
    model: Option<String>,

    /// Stream the reply as it is generated
    #[arg(long)]
    stream: bool,

    /// Enable the model's reasoning mode
    #[arg(long)]
    think: bool,

    /// Reasoning token budget
    #[arg(long)]
    thinking_budget: Option<u32>,

    /// Ask for a JSON reply and print the parsed value
    #[arg(long)]
    json: bool,

    #[arg(long, default_value_t = unillm::completion::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    #[arg(long)]
    temperature: Option<f32>,

    /// System prompt
    #[arg(long)]
    system: Option<String>,

    /// Send even when the model has no cost metadata
    #[arg(long)]
    allow_unknown: bool,

    /// Prompt text
    #[arg(required = true)]
    prompt: Vec<String>,
}

#[derive(clap::Args, Debug)]
struct ModelsArgs {
    #[command(flatten)]
    service: ServiceArgs,

    /// Include models missing from the registry
    #[arg(long)]
    all: bool,

    /// List from the bundled registry instead of asking the service
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.log {
        Some(directive) => unillm_utils::init_tracing_with_filter(directive),
        None => unillm_utils::init_tracing_with_filter("warn"),
    }

    match cli.command {
        Commands::Chat(args) => chat(args).await,
        Commands::Models(args) => models(args).await,
    }
}

fn client_options(args: &ServiceArgs) -> anyhow::Result<ClientOptions> {
    if !providers::SERVICES.contains(&args.service.as_str()) {
        anyhow::bail!(
            "Unknown service '{}' (expected one of: {})",
            args.service,
            providers::SERVICES.join(", ")
        );
    }
    let mut options = ClientOptions::new(args.service.as_str());
    if let Some(base_url) = &args.base_url {
        options = options.with_base_url(base_url.as_str());
    }
    if let Some(api_key) = &args.api_key {
        options = options.with_api_key(api_key.as_str());
    }
    Ok(options)
}

async fn chat(args: ChatArgs) -> anyhow::Result<()> {
    let mut options = client_options(&args.service)?
        .with_stream(args.stream)
        .with_think(args.think)
        .with_json(args.json)
        .with_max_tokens(args.max_tokens)
        .allow_unknown_models(args.allow_unknown);
    if let Some(model) = &args.model {
        options = options.with_model(model.as_str());
    }
    if let Some(temperature) = args.temperature {
        options = options.with_temperature(temperature);
    }
    if let Some(budget) = args.thinking_budget {
        options = options.with_max_thinking_tokens(budget);
    }

    let mut client = LLMClient::new(options).context("Failed to create client")?;
    if let Some(system) = &args.system {
        client.system(system.as_str());
    }
    client.user(args.prompt.join(" "));
    info!(service = client.service(), model = ?client.model(), "Sending prompt");

    let response = if args.stream {
        let mut stream = client.stream(SendOptions::new()).await?;
        let mut thinking = false;
        let mut stdout = std::io::stdout();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Thinking(text) => {
                    if !thinking {
                        write!(stdout, "{DIM}thinking: ")?;
                        thinking = true;
                    }
                    write!(stdout, "{text}")?;
                }
                StreamEvent::Content(text) => {
                    if thinking {
                        writeln!(stdout, "{RESET}")?;
                        thinking = false;
                    }
                    write!(stdout, "{text}")?;
                }
                StreamEvent::ToolCalls(calls) => print_tool_calls(&calls),
                StreamEvent::Usage(usage) => debug!(?usage, "Usage update"),
                StreamEvent::Buffers(_) => {}
            }
            stdout.flush()?;
        }
        if thinking {
            write!(stdout, "{RESET}")?;
        }
        writeln!(stdout)?;
        stream.complete().await?
    } else {
        let response = client.send(SendOptions::new()).await?;
        print_response(&response);
        response
    };

    if let Some(parsed) = &response.parsed {
        println!("{}", serde_json::to_string_pretty(parsed)?);
    }
    if let Some(usage) = &response.usage {
        print_usage(usage);
    }
    Ok(())
}

async fn models(args: ModelsArgs) -> anyhow::Result<()> {
    let options = client_options(&args.service)?;

    if args.offline {
        let registry = unillm::ModelRegistry::new();
        for entry in registry.list_by_service(&args.service.service, args.all) {
            println!(
                "{:<48} in ${:.2}/M  out ${:.2}/M",
                entry.model,
                entry.input_cost_per_token * 1e6,
                entry.output_cost_per_token * 1e6
            );
        }
        return Ok(());
    }

    let client = LLMClient::new(options).context("Failed to create client")?;
    let listings = client.fetch_models(args.all).await?;
    for listing in &listings {
        print_listing(listing);
    }
    Ok(())
}

fn print_response(response: &ChatResponse) {
    if let Some(thinking) = &response.thinking {
        println!("{DIM}thinking: {thinking}{RESET}");
    }
    if !response.content.is_empty() {
        println!("{}", response.content);
    }
    print_tool_calls(&response.tool_calls);
}

fn print_tool_calls(calls: &[ToolCall]) {
    for call in calls {
        println!("-> {}({}) [{}]", call.name, call.input, call.id);
    }
}

fn print_usage(usage: &Usage) {
    let cost = if usage.local {
        "local".to_string()
    } else {
        format!("${:.6}", usage.total_cost)
    };
    println!(
        "{DIM}tokens: {} in / {} out / {} total, cost: {cost}{RESET}",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    );
}

fn print_listing(listing: &ModelListing) {
    let created = listing
        .created
        .map(|created| created.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let pricing = listing.usage.as_ref().map_or_else(String::new, |entry| {
        format!(
            "in ${:.2}/M  out ${:.2}/M",
            entry.input_cost_per_token * 1e6,
            entry.output_cost_per_token * 1e6
        )
    });
    println!("{:<48} {created:<10} {pricing}", listing.model);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_args_parse() {
        let cli = Cli::parse_from([
            "unillm", "chat", "-s", "anthropic", "--think", "--max-tokens", "1024", "why", "blue",
        ]);
        let Commands::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(args.service.service, "anthropic");
        assert!(args.think);
        assert_eq!(args.max_tokens, 1024);
        assert_eq!(args.prompt, vec!["why", "blue"]);
    }

    #[test]
    fn test_unknown_service_rejected() {
        let args = ServiceArgs {
            service: "mystery".to_string(),
            base_url: None,
            api_key: None,
        };
        assert!(client_options(&args).is_err());
    }
}
