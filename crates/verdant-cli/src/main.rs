use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "verdant", version, about = "Verdant focus forest")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Session control
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },
    /// Show the forest
    Forest {
        /// Print the whole forest document instead of a summary
        #[arg(long)]
        full: bool,
    },
    /// Print the raw focus metrics
    Metrics,
    /// Report user activity (keyboard, mouse, scroll, tab_switch, url_change)
    Activity {
        kind: String,
    },
    /// Report a navigation in a tab
    Tab {
        tab_id: i64,
        url: String,
    },
    /// Report that the browser window gained or lost focus
    Window {
        #[arg(action = clap::ArgAction::Set)]
        focused: bool,
    },
    /// Run one focus analysis tick now
    Analyze,
    /// Wildfire control
    Wildfire {
        #[command(subcommand)]
        action: commands::forest::WildfireAction,
    },
    /// Distraction site list
    Sites {
        #[command(subcommand)]
        action: commands::sites::SitesAction,
    },
    /// Send a raw JSON command, e.g. '{"action":"getSessionData"}'
    Rpc {
        request: String,
    },
    /// Run the scoring, wildfire and idle-check timers until the session ends
    Run,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// External analyzer settings
    Api {
        #[command(subcommand)]
        action: commands::api::ApiAction,
    },
    /// Print shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_env("VERDANT_LOG").unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(if matches!(cli.command, Commands::Run) {
        "info"
    } else {
        "warn"
    });

    let result = match cli.command {
        Commands::Session { action } => commands::session::run(action),
        Commands::Forest { full } => commands::forest::show(full),
        Commands::Metrics => commands::focus::metrics(),
        Commands::Activity { kind } => commands::focus::activity(&kind),
        Commands::Tab { tab_id, url } => commands::focus::tab(tab_id, &url),
        Commands::Window { focused } => commands::focus::window(focused),
        Commands::Analyze => commands::focus::analyze().await,
        Commands::Wildfire { action } => commands::forest::wildfire(action),
        Commands::Sites { action } => commands::sites::run(action),
        Commands::Rpc { request } => commands::rpc::run(&request).await,
        Commands::Run => commands::daemon::run().await,
        Commands::Config { action } => commands::config::run(action),
        Commands::Api { action } => commands::api::run(action).await,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "verdant", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
