use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parley_llm::ReasoningEffort;

/// Parley multi-provider chat client
#[derive(Debug, Parser)]
#[command(name = "parley", about = "Chat with any supported LLM provider from the terminal")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "parley.toml", env = "PARLEY_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List providers and whether each has a credential
    Providers,

    /// List the models a provider offers
    Models {
        /// Provider name, e.g. `anthropic`
        provider: String,

        /// Print full descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that a provider accepts its credential
    Auth {
        provider: String,
    },

    /// Send one prompt and print the reply
    Chat {
        /// Provider name
        #[arg(short, long, default_value = "openai", env = "PARLEY_PROVIDER")]
        provider: String,

        /// Model id; the provider default when omitted
        #[arg(short, long)]
        model: Option<String>,

        /// Optional system prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Reasoning effort: low, medium, high, or disabled
        #[arg(long)]
        reasoning: Option<ReasoningEffort>,

        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,

        /// Prompt text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}
