use clap::{Parser, Subcommand};

mod client;
mod commands;
mod config;
mod types;
mod utils;

use commands::*;

#[derive(Parser)]
#[command(name = "blendctl")]
#[command(about = "blendctl - command-line client for the Blend monitor", long_about = "
Talks to a running blend-monitor server.
• NPM stats, versions and download trends for the design system package
• Deployment history and rollbacks
• User roles and hosting/billing usage alerts
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the API URL and access token
    Setup,

    /// Show database and registry health
    Health,

    /// Show package stats
    Stats,

    /// List published versions, newest first
    Versions {
        /// Number of versions to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show daily download trends
    Trends {
        /// Lookback window in days (server clamps to 1..=365)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Refresh every data kind from the NPM registry
    Sync,

    /// List users (requires a token)
    Users {
        #[arg(short, long)]
        limit: Option<i64>,

        #[arg(short, long)]
        offset: Option<i64>,
    },

    /// Change a user's role (requires an admin token)
    Role {
        /// User id
        user: String,

        /// New role: admin, developer or viewer
        role: String,
    },

    /// Show deployment history
    Deployments {
        #[arg(short, long)]
        environment: Option<String>,

        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Record a deployment (requires a token)
    Deploy {
        environment: String,

        version: String,

        /// Commit the deployment was built from
        #[arg(short, long)]
        commit: Option<String>,

        /// pending, in_progress, success or failed (default success)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Roll a deployment back to the previous successful version
    Rollback {
        /// Deployment id
        id: String,

        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show the latest hosting and billing usage with alerts
    Usage,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Setup => setup::handle_setup().await,
        Commands::Health => health::handle_health().await,
        Commands::Stats => npm::handle_stats().await,
        Commands::Versions { limit } => npm::handle_versions(limit).await,
        Commands::Trends { days } => npm::handle_trends(days).await,
        Commands::Sync => npm::handle_sync().await,
        Commands::Users { limit, offset } => users::handle_users(limit, offset).await,
        Commands::Role { user, role } => users::handle_role(user, role).await,
        Commands::Deployments { environment, limit } => deployments::handle_history(environment, limit).await,
        Commands::Deploy { environment, version, commit, status } => {
            deployments::handle_deploy(environment, version, commit, status).await
        }
        Commands::Rollback { id, reason } => deployments::handle_rollback(id, reason).await,
        Commands::Usage => usage::handle_usage().await,
    };

    match result {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            utils::print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rollback_with_reason() {
        let cli = Cli::try_parse_from(["blendctl", "rollback", "abc", "--reason", "bad build"]).unwrap();
        match cli.command {
            Commands::Rollback { id, reason } => {
                assert_eq!(id, "abc");
                assert_eq!(reason.as_deref(), Some("bad build"));
            }
            _ => panic!("expected rollback"),
        }
    }

    #[test]
    fn versions_limit_defaults() {
        let cli = Cli::try_parse_from(["blendctl", "versions"]).unwrap();
        assert!(matches!(cli.command, Commands::Versions { limit: 20 }));
    }
}
