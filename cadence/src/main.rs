#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use args::{Args, ChatArgs, Command, EmbedArgs};
use cadence_config::Config;
use cadence_llm::{ChatOptions, ChatResponse, EmbedOptions, LlmClient, Message, ResponseAggregator};
use clap::Parser;
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

const DEFAULT_CONFIG: &str = "cadence.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    cadence_telemetry::init(&args.log_filter, args.log_format)?;

    let config = load_config(args.config.as_deref())?;
    let client = LlmClient::from_config(&config)?;

    tracing::info!(backend = config.backend.kind(), "starting cadence");

    match args.command {
        Command::Chat(chat) => run_chat(&client, &config, chat).await,
        Command::Embed(embed) => run_embed(&client, &config, embed).await,
    }
}

/// Explicit path must exist; the default file is optional
fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if default.exists() {
                Config::load(&default)
            } else {
                tracing::debug!("no configuration file, using defaults");
                Ok(Config::default())
            }
        }
    }
}

fn resolve_model(config: &Config, model: Option<String>) -> anyhow::Result<String> {
    model
        .or_else(|| config.backend.default_model().map(str::to_owned))
        .context("no model given and the backend has no default_model")
}

async fn run_chat(client: &LlmClient, config: &Config, args: ChatArgs) -> anyhow::Result<()> {
    let model = resolve_model(config, args.model)?;

    let mut options = ChatOptions::default().think(args.think);
    options.temperature = args.temperature;

    let mut history = Vec::new();
    if let Some(system) = args.system {
        history.push(Message::system(system));
    }

    if !args.interactive
        && let Some(prompt) = args.prompt
    {
        history.push(Message::user(prompt));
        stream_turn(client, &model, &history, options).await?;
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        history.push(Message::user(line));
        match stream_turn(client, &model, &history, options.clone()).await? {
            Some(response) => record_reply(&mut history, &response),
            None => break,
        }
    }

    Ok(())
}

/// Append the assistant reply, or drop the unanswered prompt when there is none
fn record_reply(history: &mut Vec<Message>, response: &ChatResponse) {
    match response.to_message() {
        Some(reply) => history.push(reply),
        None => {
            tracing::warn!(finish_reason = ?response.finish_reason, "empty reply, prompt dropped from history");
            history.pop();
        }
    }
}

/// Print one streamed turn; thinking goes to stderr, content to stdout
///
/// Returns the aggregated response, or `None` if interrupted.
async fn stream_turn(
    client: &LlmClient,
    model: &str,
    history: &[Message],
    options: ChatOptions,
) -> anyhow::Result<Option<ChatResponse>> {
    let mut turn = client.stream_chat(model, history.to_vec(), Vec::new(), options)?;
    let mut aggregator = ResponseAggregator::new();
    let mut stdout = std::io::stdout();

    loop {
        let chunk = tokio::select! {
            chunk = turn.next() => chunk,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                writeln!(stdout)?;
                return Ok(None);
            }
        };

        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk?;

        if let Some(thinking) = chunk.thinking() {
            eprint!("{thinking}");
        }
        if let Some(content) = chunk.content() {
            write!(stdout, "{content}")?;
            stdout.flush()?;
        }
        aggregator.push(&chunk);
    }
    writeln!(stdout)?;

    let response = aggregator.finish_turn(&turn);
    tracing::info!(
        prompt_tokens = response.usage.prompt_tokens,
        completion_tokens = response.usage.completion_tokens,
        finish_reason = ?response.finish_reason,
        "turn complete"
    );

    Ok(Some(response))
}

async fn run_embed(client: &LlmClient, config: &Config, args: EmbedArgs) -> anyhow::Result<()> {
    let model = resolve_model(config, args.model)?;

    let options = EmbedOptions {
        dimensions: args.dimensions,
        ..EmbedOptions::default()
    };
    let vectors = client.embed(&model, &args.texts, options).await?;

    let mut stdout = std::io::stdout().lock();
    for vector in vectors {
        serde_json::to_writer(&mut stdout, &vector)?;
        writeln!(stdout)?;
    }

    Ok(())
}
