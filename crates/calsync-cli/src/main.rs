use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "calsync", version, about = "Calendar synchronization CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Account management
    Account {
        #[command(subcommand)]
        action: commands::account::AccountAction,
    },
    /// Synchronize accounts
    Sync(commands::sync::SyncArgs),
    /// Show upcoming events
    Agenda(commands::agenda::AgendaArgs),
    /// Event management
    Event {
        #[command(subcommand)]
        action: commands::event::EventAction,
    },
    /// Accounts and sync state overview
    Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Account { action } => commands::account::run(action).await,
        Commands::Sync(args) => commands::sync::run(args).await,
        Commands::Agenda(args) => commands::agenda::run(args).await,
        Commands::Event { action } => commands::event::run(action).await,
        Commands::Status(args) => commands::status::run(args).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn agenda_accepts_date_and_json() {
        let cli = Cli::parse_from(["calsync", "agenda", "--date", "2024-06-10", "--json"]);
        match cli.command {
            Commands::Agenda(args) => {
                assert_eq!(args.date.as_deref(), Some("2024-06-10"));
                assert!(args.json);
            }
            _ => panic!("expected agenda"),
        }
    }

    #[test]
    fn account_add_parses_caldav_fields() {
        let cli = Cli::parse_from([
            "calsync", "account", "add", "caldav", "--name", "Fastmail", "--server-url",
            "https://dav.example.com/", "--username", "me", "--app-password", "secret",
        ]);
        assert!(matches!(
            cli.command,
            Commands::Account {
                action: commands::account::AccountAction::Add { .. }
            }
        ));
    }
}
