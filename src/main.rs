use clap::{Parser, Subcommand};
use runbook_triage::Result;
use runbook_triage::commands::{reindex, search, show_config, show_status, triage};

#[derive(Parser)]
#[command(name = "runbook-triage")]
#[command(about = "Incident alert triage backed by semantic runbook retrieval")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or initialize the configuration
    Config {
        /// Print the resolved configuration
        #[arg(long)]
        show: bool,
    },
    /// Index the runbook corpus (incremental unless --force)
    Index {
        /// Re-embed every document even if unchanged
        #[arg(long)]
        force: bool,
    },
    /// Search the indexed runbooks
    Search {
        /// Free-text query
        query: String,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum similarity score in [0, 1]
        #[arg(long)]
        min_score: Option<f32>,
    },
    /// Classify an alert and propose a triage action
    Triage {
        /// Raw alert text
        alert: String,
    },
    /// Show index and model status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            show_config(show)?;
        }
        Commands::Index { force } => {
            reindex(force).await?;
        }
        Commands::Search {
            query,
            limit,
            min_score,
        } => {
            search(&query, limit, min_score).await?;
        }
        Commands::Triage { alert } => {
            triage(&alert).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["runbook-triage", "status"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Status);
        }
    }

    #[test]
    fn index_command_with_force() {
        let cli = Cli::try_parse_from(["runbook-triage", "index", "--force"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Index { force } = parsed.command {
                assert!(force);
            }
        }
    }

    #[test]
    fn search_command_with_options() {
        let cli = Cli::try_parse_from([
            "runbook-triage",
            "search",
            "disk full",
            "--limit",
            "3",
            "--min-score",
            "0.5",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                limit,
                min_score,
            } = parsed.command
            {
                assert_eq!(query, "disk full");
                assert_eq!(limit, Some(3));
                assert_eq!(min_score, Some(0.5));
            }
        }
    }

    #[test]
    fn triage_command() {
        let cli = Cli::try_parse_from(["runbook-triage", "triage", "disk full at 95%"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Triage { alert } = parsed.command {
                assert_eq!(alert, "disk full at 95%");
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["runbook-triage", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["runbook-triage", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["runbook-triage", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
