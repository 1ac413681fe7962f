//! CLI binary entry point.

/// CLI argument parsing definitions.
mod cli;

use centauri::coordinator::Coordinator;
use centauri::config::Config;
use centauri::record::LogSeverity;
use clap::Parser;
use cli::{Args, Command};
use std::time::Duration;

fn parse_severity(raw: &str) -> LogSeverity {
    match raw.to_ascii_lowercase().as_str() {
        "error" => LogSeverity::Error,
        "warning" | "warn" => LogSeverity::Warning,
        "debug" => LogSeverity::Debug,
        _ => LogSeverity::Info,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut builder = Config::builder(args.dir.clone())
        .base_url(args.base_url.clone())
        .use_https(args.https);
    if let Some(user_id) = &args.user_id {
        builder = builder.user_id(user_id.clone());
    }
    let config = builder.build();

    let coordinator = match Coordinator::install(config) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            eprintln!("failed to start agent: {e}");
            std::process::exit(1);
        }
    };

    match args.command {
        Command::Begin { app_token } => coordinator.begin_session(app_token),
        Command::Log { message, severity, tags } => {
            coordinator.log(parse_severity(&severity), tags, message)
        }
        Command::Suspend => coordinator.suspend(),
        Command::Resume => coordinator.resume(),
        Command::End => coordinator.end_session(),
        Command::Flush => coordinator.flush(),
    }

    // Ingress calls only enqueue work onto the session worker; give it (and
    // any Transmitter request it kicks off) a moment to run before the
    // process exits, since there is no blocking "wait for drain" API.
    tokio::time::sleep(Duration::from_millis(300)).await;
}
