use std::path::PathBuf;

use cadence_telemetry::LogFormat;
use clap::{Parser, Subcommand};

/// Cadence streaming chat client
#[derive(Debug, Parser)]
#[command(name = "cadence", about = "Stream chat replies and embeddings from a configured model backend")]
pub struct Args {
    /// Path to configuration file; built-in defaults when absent
    #[arg(short, long, env = "CADENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter directives
    #[arg(long, default_value = "warn", env = "CADENCE_LOG")]
    pub log_filter: String,

    /// Log line format (plain or json)
    #[arg(long, default_value_t = LogFormat::Plain, env = "CADENCE_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream a reply to a prompt, or hold a conversation on stdin
    Chat(ChatArgs),
    /// Print one embedding vector per input as JSON
    Embed(EmbedArgs),
}

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    /// Model name, defaults to the backend's configured model
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Ask the model to think before answering
    #[arg(long)]
    pub think: bool,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Read prompts line by line from stdin, keeping the history
    #[arg(short, long, conflicts_with = "prompt")]
    pub interactive: bool,

    /// Prompt text
    #[arg(required_unless_present = "interactive")]
    pub prompt: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct EmbedArgs {
    /// Model name, defaults to the backend's configured model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Requested output dimensionality
    #[arg(long)]
    pub dimensions: Option<u32>,

    /// Texts to embed
    #[arg(required = true)]
    pub texts: Vec<String>,
}
