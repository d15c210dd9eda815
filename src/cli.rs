use clap::{Parser, Subcommand, ValueEnum};

/// Mirror commerce-platform entities into a local Postgres store.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = default_tracing_format())]
    pub tracing: TracingFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TracingFormat {
    /// Human-readable, for local development
    Pretty,
    /// One JSON object per line, for log aggregation
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Run one sync and print the result as JSON
    Sync {
        /// Entity type (`products`, `order`, ...) or `all`
        entity_type: String,
        /// Bypass the cache and fetch fresh data
        #[arg(long)]
        force: bool,
        /// Page size for this run
        #[arg(long)]
        limit: Option<u32>,
    },
}

fn default_tracing_format() -> TracingFormat {
    if cfg!(debug_assertions) {
        TracingFormat::Pretty
    } else {
        TracingFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_is_implicit() {
        let args = Args::try_parse_from(["storemirror"]).unwrap();
        assert!(args.command.is_none());
    }

    #[test]
    fn parses_sync_command() {
        let args = Args::try_parse_from([
            "storemirror",
            "--tracing",
            "json",
            "sync",
            "orders",
            "--force",
            "--limit",
            "25",
        ])
        .unwrap();
        assert_eq!(args.tracing, TracingFormat::Json);
        match args.command {
            Some(Command::Sync {
                entity_type,
                force,
                limit,
            }) => {
                assert_eq!(entity_type, "orders");
                assert!(force);
                assert_eq!(limit, Some(25));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
