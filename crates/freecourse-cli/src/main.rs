//! freecourse — entry point.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use freecourse::JsonSettingsStore;
use freecourse_cli::commands;
use freecourse_cli::config::SettingsLocation;

#[derive(Parser)]
#[command(
    name = "freecourse",
    about = "Scrape free course coupons from listing sites and enroll them on your account",
    version
)]
struct Cli {
    /// Path to the settings JSON file.
    #[arg(short, long, global = true)]
    settings: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in, scrape every enabled site and enroll the results (default).
    Run,

    /// Scrape only and print the courses found as JSON.
    Scrape {
        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
    },

    /// Validate the settings file.
    Validate,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   freecourse completions bash > ~/.local/share/bash-completion/completions/freecourse
    ///   freecourse completions zsh > ~/.zfunc/_freecourse
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli).await {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let location = SettingsLocation::resolve(cli.settings.as_deref());
    tracing::debug!(path = %location.path.display(), source = %location.source, "settings file");
    let store = JsonSettingsStore::new(location.path.clone());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            tracing::info!("Settings: {} (from {})", store.path().display(), location.source);
            commands::run(&store).await?;
        }

        Commands::Scrape { pretty } => {
            commands::scrape(&store, pretty).await?;
        }

        Commands::Validate => match commands::validate(&store) {
            Ok(settings) => {
                println!("Valid settings file: {}", store.path().display());
                println!("  Sites: {}", settings.selected_sites().len());
                println!("  Languages: {}", settings.languages.join(", "));
                println!("  Categories: {}", settings.categories.join(", "));
            }
            Err(e) => {
                eprintln!("Invalid settings file: {e:#}");
                std::process::exit(1);
            }
        },

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "freecourse", &mut std::io::stdout());
        }
    }

    Ok(())
}
