//! Cloud Messaging CLI
//!
//! Inspect provider configuration and rehearse publishing against an
//! in-memory broker.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloud_messaging::{
    BatchLimits, ConfigLoader, MemoryBroker, MessagePublisher, MessagePublisherFactory, MessagingError,
    PublisherContext, PublisherRegistry,
};
use std::path::{Path, PathBuf};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Provider-agnostic message publishing
#[derive(Parser)]
#[command(name = "cloud-messaging")]
#[command(version = "0.1.0")]
#[command(about = "Provider-agnostic message publishing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered provider ids
    Providers,

    /// Build configured publishers without connecting to any broker
    Check {
        /// Messaging configuration file (.yaml, .yml or .toml)
        #[arg(short, long)]
        config: PathBuf,

        /// Only check this publisher
        #[arg(short, long)]
        publisher: Option<String>,
    },

    /// Publish a JSON array as one batch against an in-memory broker
    Simulate {
        /// Messaging configuration file (.yaml, .yml or .toml)
        #[arg(short, long)]
        config: PathBuf,

        /// Publisher name from the configuration file
        #[arg(short, long)]
        publisher: String,

        /// Topic to publish to
        #[arg(short, long)]
        topic: String,

        /// JSON file holding an array of messages
        #[arg(short, long)]
        messages: PathBuf,

        /// Maximum batch size in bytes
        #[arg(long, default_value = "262144")]
        max_batch_bytes: usize,

        /// Maximum messages per batch
        #[arg(long)]
        max_batch_messages: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            report_error(&e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Providers => providers_command(),
        Commands::Check { config, publisher } => check_command(&config, publisher).await,
        Commands::Simulate {
            config,
            publisher,
            topic,
            messages,
            max_batch_bytes,
            max_batch_messages,
        } => {
            let limits = BatchLimits {
                max_bytes: max_batch_bytes,
                max_messages: max_batch_messages,
            };
            simulate_command(&config, &publisher, &topic, &messages, limits).await
        }
    }
}

fn providers_command() -> Result<i32> {
    let registry = PublisherRegistry::builtin()?;

    for provider in registry.providers() {
        println!("{}", provider);
    }

    Ok(0)
}

async fn check_command(config_path: &Path, publisher_filter: Option<String>) -> Result<i32> {
    println!("\n🔍 Messaging Check\n");

    let config = ConfigLoader::load(config_path, &ConfigLoader::process_env()).await?;
    let factory = MessagePublisherFactory::with_builtin_providers(
        PublisherContext::in_memory(&MemoryBroker::new())
            .with_messaging_options(config.messaging_options()),
    )?;

    let validation = ConfigLoader::validate(&config, &factory.registry().providers());
    println!("{}\n", ConfigLoader::format_validation_result(&validation));
    if !validation.valid {
        return Ok(1);
    }

    let mut failures = 0;

    for (name, provider_options) in &config.publishers {
        if let Some(ref filter) = publisher_filter {
            if name != filter {
                continue;
            }
        }

        println!("📨 {}:", name);
        match factory.create(provider_options) {
            Ok(publisher) => {
                let info = serde_json::to_string_pretty(&publisher.info())?;
                println!("{}\n", info);
            }
            Err(e) => {
                failures += 1;
                print_messaging_error(&e);
                println!();
            }
        }
    }

    if let Some(filter) = publisher_filter {
        if config.publisher(&filter).is_none() {
            eprintln!("⚠️  Publisher '{}' not found in {}", filter, config_path.display());
            return Ok(1);
        }
    }

    if failures == 0 {
        println!("✅ All publishers are ready");
        Ok(0)
    } else {
        println!("❌ {} publisher(s) failed validation", failures);
        Ok(1)
    }
}

async fn simulate_command(
    config_path: &Path,
    publisher_name: &str,
    topic: &str,
    messages_path: &Path,
    limits: BatchLimits,
) -> Result<i32> {
    println!("\n🧪 Simulated publish ({} → {})\n", publisher_name, topic);

    let config = ConfigLoader::load(config_path, &ConfigLoader::process_env()).await?;
    let provider_options = config.publisher(publisher_name).with_context(|| {
        format!(
            "Publisher '{}' not found in {}",
            publisher_name,
            config_path.display()
        )
    })?;

    let content = tokio::fs::read_to_string(messages_path)
        .await
        .with_context(|| format!("Failed to read {}", messages_path.display()))?;
    let messages: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("{} must hold a JSON array", messages_path.display()))?;

    let broker = MemoryBroker::new().with_limits(limits);
    let limits = broker.limits();
    println!(
        "Batch limits: {} bytes, {}\n",
        limits.max_bytes,
        match limits.max_messages {
            Some(max) => format!("{} message(s)", max),
            None => "no message cap".to_string(),
        }
    );
    let factory = MessagePublisherFactory::with_builtin_providers(
        PublisherContext::in_memory(&broker).with_messaging_options(config.messaging_options()),
    )?;
    let publisher = factory.create(provider_options)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcome = publisher
        .publish_batch_values(topic, messages.clone(), &cancel)
        .await;

    let deliveries = broker.deliveries().await;
    for (index, delivery) in deliveries.iter().enumerate() {
        let bytes: usize = delivery.payloads.iter().map(|p| p.size()).sum();
        println!(
            "  #{} {} {} message(s), {} bytes{}",
            index + 1,
            delivery.entity_path,
            delivery.len(),
            bytes,
            if delivery.batched { " [batch]" } else { "" }
        );
    }

    let delivered: usize = deliveries.iter().map(|d| d.len()).sum();
    println!(
        "\n{} of {} message(s) delivered in {} call(s)",
        delivered,
        messages.len(),
        deliveries.len()
    );

    match outcome {
        Ok(()) => {
            println!("✅ Simulation completed successfully");
            Ok(0)
        }
        Err(e) => {
            print_messaging_error(&e);
            Ok(1)
        }
    }
}

fn print_messaging_error(error: &MessagingError) {
    eprintln!("❌ [{}] {}", error.code(), error);
    for action in error.suggested_actions() {
        eprintln!("   💡 {}", action);
    }
}

fn report_error(error: &anyhow::Error) {
    eprintln!("\n❌ Error");
    match error.downcast_ref::<MessagingError>() {
        Some(messaging_error) => print_messaging_error(messaging_error),
        None => eprintln!("{:#}", error),
    }
}
