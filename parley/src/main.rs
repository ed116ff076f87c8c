#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod chat;

use args::{Args, Command};
use clap::Parser;
use parley_config::Config;
use parley_llm::Orchestrator;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load_or_default(&args.config)?;
    parley_telemetry::init(&config.logging)?;

    tracing::debug!(config_path = %args.config.display(), "starting parley");

    let orchestrator = Orchestrator::from_config(&config)?;

    match args.command {
        Command::Providers => {
            for provider in orchestrator.list_providers() {
                let status = if provider.configured { "configured" } else { "no credential" };
                println!("{:<20} {:<20} {status}", provider.name, provider.display_name);
            }
        }
        Command::Models { provider, json } => {
            let models = orchestrator.get_provider(&provider)?.supported_models().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(models.as_ref())?);
            } else {
                for model in models.iter() {
                    println!("{:<48} {:>9} tokens", model.id, model.context_window);
                }
            }
        }
        Command::Auth { provider } => {
            let handle = orchestrator.get_provider(&provider)?;
            handle.authenticate().await?;
            println!("{} credential accepted", handle.display_name());
        }
        Command::Chat {
            provider,
            model,
            system,
            reasoning,
            no_stream,
            prompt,
        } => {
            let shutdown = CancellationToken::new();
            let shutdown_clone = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, cancelling");
                    shutdown_clone.cancel();
                }
            });

            let request = chat::ChatRequest {
                provider,
                model,
                system,
                reasoning,
                prompt: prompt.join(" "),
            };
            if no_stream {
                chat::complete(&orchestrator, request, &shutdown).await?;
            } else {
                chat::stream(&orchestrator, request, &shutdown).await?;
            }
        }
    }

    Ok(())
}
