use clap::{Parser, Subcommand};

mod commands;
mod util;

use commands::admin::AdminCommands;
use commands::predict::{PredictArgs, PreviewArgs};

#[derive(Parser)]
#[command(name = "croprec", version, about = "Crop recommendation CLI")]
struct Cli {
    /// API base URL
    #[arg(long, env = "CROPREC_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API health
    Health,
    /// Sign in and store the session token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CROPREC_PASSWORD")]
        password: String,
    },
    /// Revoke and forget the stored session
    Logout,
    /// Show the identity behind the current session
    Whoami,
    /// List NPK compositions
    Compositions,
    /// Request a crop recommendation
    Predict(PredictArgs),
    /// Run a preview prediction with raw values (admin only, never stored)
    Preview(PreviewArgs),
    /// Show your stored predictions, newest first
    History {
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Bootstrap operations against the database
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let api_url = cli.api_url.as_str();

    let code = match cli.command {
        Commands::Health => commands::health::run(api_url).await,
        Commands::Login { username, password } => {
            commands::auth::login(api_url, &username, &password).await
        }
        Commands::Logout => commands::auth::logout(api_url).await,
        Commands::Whoami => commands::auth::whoami(api_url).await,
        Commands::Compositions => commands::predict::compositions(api_url).await,
        Commands::Predict(args) => commands::predict::predict(api_url, &args).await,
        Commands::Preview(args) => commands::predict::preview(api_url, &args).await,
        Commands::History { limit } => commands::predict::history(api_url, limit).await,
        Commands::Admin { command } => commands::admin::run(command).await,
    };

    std::process::exit(code);
}
