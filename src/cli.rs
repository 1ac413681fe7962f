//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// Demo driver for a `centauri` agent instance. Not part of the library's
/// public contract — a thin harness for exercising a `Coordinator` from the
/// terminal.
#[derive(Debug, Parser)]
#[command(name = "centauri", version)]
pub struct Args {
    /// Directory the agent persists state and buffer files under.
    #[arg(short = 'd', long = "dir", default_value = "./centauri-demo")]
    pub dir: String,

    /// Collector host, without scheme (e.g. `collector.example.com:8080`).
    #[arg(long = "base-url", default_value = "127.0.0.1:4317")]
    pub base_url: String,

    /// Use `https://` instead of `http://` for the collector URL.
    #[arg(long = "https")]
    pub https: bool,

    /// Associate this user id with any Session started this run.
    #[arg(long = "user-id")]
    pub user_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a new current Session.
    Begin {
        /// Application token identifying the caller to the collector.
        #[arg(long = "app-token")]
        app_token: String,
    },
    /// Buffer a log record onto the current Session.
    Log {
        /// Message text.
        #[arg(long = "message")]
        message: String,
        /// Importance level.
        #[arg(long = "severity", default_value = "info")]
        severity: String,
        /// Space-separated filter tags.
        #[arg(long = "tags")]
        tags: Option<String>,
    },
    /// Suspend the current Session and flush every Session with frozen
    /// buffers.
    Suspend,
    /// Resume the current Session, or start a fresh one if the idle timeout
    /// has elapsed.
    Resume,
    /// End the current Session.
    End,
    /// Enqueue an upload for every Session with frozen buffers.
    Flush,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_requires_app_token() {
        let args = Args::parse_from(["centauri", "begin", "--app-token", "abc123"]);
        match args.command {
            Command::Begin { app_token } => assert_eq!(app_token, "abc123"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn log_parses_optional_tags() {
        let args = Args::parse_from([
            "centauri",
            "log",
            "--message",
            "hello",
            "--severity",
            "warning",
            "--tags",
            "net ui",
        ]);
        match args.command {
            Command::Log { message, severity, tags } => {
                assert_eq!(message, "hello");
                assert_eq!(severity, "warning");
                assert_eq!(tags.as_deref(), Some("net ui"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn dir_and_base_url_have_defaults() {
        let args = Args::parse_from(["centauri", "flush"]);
        assert_eq!(args.dir, "./centauri-demo");
        assert_eq!(args.base_url, "127.0.0.1:4317");
        assert!(!args.https);
    }
}
