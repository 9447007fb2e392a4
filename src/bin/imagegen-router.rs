use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;

use imagegen_router::{
    ImageProvider, OpenAiCompatibleImages, ParameterExtractor, ProviderManager, ProviderSettings,
    RouterConfig, RouterError,
};

#[derive(Parser)]
#[command(name = "imagegen-router", version, about = "Route text-to-image requests across providers")]
struct Cli {
    /// Emit logs as JSON lines instead of plain text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract generation parameters from a chat line and print them
    Extract {
        text: String,
        /// Router config supplying negative keywords and the default provider
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Extract parameters from a chat line and generate an image
    Generate {
        #[arg(short, long)]
        config: PathBuf,
        text: String,
        /// Force a provider, overriding any tag in the text
        #[arg(short, long)]
        provider: Option<String>,
        #[arg(long)]
        no_fallback: bool,
    },
    /// Probe every configured provider
    Health {
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn adapter_for(settings: &ProviderSettings) -> imagegen_router::Result<Option<Arc<dyn ImageProvider>>> {
    if !settings.kind.is_openai_compatible() && settings.base_url.is_none() {
        return Ok(None);
    }
    let provider: Arc<dyn ImageProvider> = Arc::new(OpenAiCompatibleImages::new(settings.clone())?);
    Ok(Some(provider))
}

fn print_json(value: &impl serde::Serialize) -> Result<(), RouterError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(command: Command) -> Result<bool, RouterError> {
    match command {
        Command::Extract { text, config } => {
            let config = match config {
                Some(path) => RouterConfig::load(path)?,
                None => RouterConfig::default(),
            };
            let extraction = ParameterExtractor::new(&config.extractor).extract(&text);
            let errors = ParameterExtractor::validate(&extraction);
            print_json(&json!({ "extraction": extraction, "errors": errors }))?;
            Ok(errors.is_empty())
        }
        Command::Generate {
            config,
            text,
            provider,
            no_fallback,
        } => {
            let config = RouterConfig::load(config)?;
            let manager = ProviderManager::from_config(&config, adapter_for).await?;
            let extraction = ParameterExtractor::new(&config.extractor).extract(&text);
            let errors = ParameterExtractor::validate(&extraction);
            if !errors.is_empty() {
                tracing::warn!(errors = %errors.join("; "), "extracted parameters look off");
            }
            let use_fallback = no_fallback.then_some(false);
            let result = manager
                .generate_image(&extraction.request, provider.as_deref(), use_fallback)
                .await;
            print_json(&result)?;
            Ok(result.is_success())
        }
        Command::Health { config } => {
            let config = RouterConfig::load(config)?;
            let manager = ProviderManager::from_config(&config, adapter_for).await?;
            let reports = manager.health_check_all().await;
            print_json(&json!({ "summary": manager.summary(), "health": reports }))?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = imagegen_router::telemetry::init_tracing(cli.json_logs) {
        eprintln!("failed to initialize logging: {err}");
    }

    match run(cli.command).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}
