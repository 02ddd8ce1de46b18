//! CLI command definitions for the `recall` binary.

pub mod memory;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Long-term memory backed by a vector index and a text log.
#[derive(Parser)]
#[command(name = "recall", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (defaults to config.toml in the data directory).
    #[arg(long, global = true, env = "RECALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export spans through OpenTelemetry to stdout.
    #[arg(long, global = true, env = "RECALL_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start against existing memories and stay up until Ctrl+C.
    Serve,

    /// Erase every memory and recreate both stores.
    Reset,

    /// Store one or more memories.
    Ingest {
        /// Erase existing memories first.
        #[arg(long)]
        reset: bool,

        /// Texts to remember.
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Recall the memories closest to each text.
    Query {
        /// Texts to search for.
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// Reset, store a few sample memories, and query them.
    Demo,

    /// Compare the ids held by the vector index and the text log.
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ingest() {
        let cli = Cli::try_parse_from(["recall", "--json", "ingest", "--reset", "a", "b"]).unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Ingest { reset, texts } => {
                assert!(reset);
                assert_eq!(texts, vec!["a", "b"]);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_query_requires_text() {
        assert!(Cli::try_parse_from(["recall", "query"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        let cli = Cli::try_parse_from(["recall", "-vv", "check"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
