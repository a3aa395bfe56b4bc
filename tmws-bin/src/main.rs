use clap::{error::ErrorKind, Parser, Subcommand};
use tracing::{error, info};

use tmws_config::{TmwsConfig, WarningSeverity};
use tmws_core::TmwsError;
use tmws_server::ServerState;

/// Exit code for configuration errors.
const EXIT_CONFIG: i32 = 2;
/// Exit code when the database stays unreachable.
const EXIT_DATABASE: i32 = 3;
/// Exit code for bad CLI arguments.
const EXIT_USAGE: i32 = 64;

/// TMWS: multi-agent persistent memory service
#[derive(Parser)]
#[command(name = "tmws", version, about, long_about = None)]
struct Cli {
    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket/REST server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        listen: String,
    },
    /// Serve a single session over stdin/stdout
    Stdio,
    /// Audit the configuration and report findings
    Doctor,
    /// Mint a session token for an agent (requires TMWS_SECRET_KEY)
    Token {
        /// Agent id to assert
        agent: String,
    },
}

fn init_tracing(cli_level: Option<&str>, config_level: &str) {
    let level = cli_level.unwrap_or(config_level).to_string();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version are not usage errors.
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                let _ = e.print();
                std::process::exit(0);
            }
            let _ = e.print();
            std::process::exit(EXIT_USAGE);
        }
    };

    let config = match TmwsConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    init_tracing(cli.log_level.as_deref(), &config.log_level);

    match cli.command {
        Commands::Doctor => {
            // Doctor reports findings instead of dying on them.
            match config.validate() {
                Ok(warnings) if warnings.is_empty() => println!("configuration ok"),
                Ok(warnings) => {
                    for finding in warnings {
                        let tag = match finding.severity {
                            WarningSeverity::Error => "error",
                            WarningSeverity::Warning => "warning",
                            WarningSeverity::Info => "info",
                        };
                        println!("{tag}: {}: {}", finding.field, finding.message);
                    }
                }
                Err(e) => {
                    println!("error: {e}");
                    std::process::exit(EXIT_CONFIG);
                }
            }
        }
        Commands::Token { agent } => {
            if let Err(e) = config.validate() {
                error!("configuration invalid: {e}");
                std::process::exit(EXIT_CONFIG);
            }
            let Some(ref secret) = config.secret_key else {
                eprintln!("TMWS_SECRET_KEY must be set to mint tokens");
                std::process::exit(EXIT_CONFIG);
            };
            println!("{}", tmws_server::auth::make_token(secret, &agent));
        }
        Commands::Serve { listen } => {
            if let Err(e) = config.validate() {
                error!("configuration invalid: {e}");
                std::process::exit(EXIT_CONFIG);
            }
            let state = build_or_exit(config);
            info!("tmws server starting");
            if let Err(e) = tmws_server::serve(state, &listen).await {
                error!(error = %e, "server terminated");
                std::process::exit(1);
            }
        }
        Commands::Stdio => {
            if let Err(e) = config.validate() {
                error!("configuration invalid: {e}");
                std::process::exit(EXIT_CONFIG);
            }
            let state = build_or_exit(config);
            if let Err(e) = tmws_server::run_stdio(state).await {
                error!(error = %e, "stdio session failed");
                std::process::exit(1);
            }
        }
    }
}

fn build_or_exit(config: TmwsConfig) -> std::sync::Arc<ServerState> {
    match ServerState::build(config) {
        Ok(state) => state,
        Err(TmwsError::Storage(e)) => {
            error!(error = %e, "database unreachable");
            std::process::exit(EXIT_DATABASE);
        }
        Err(e) => {
            error!(error = %e, "startup failed");
            std::process::exit(EXIT_CONFIG);
        }
    }
}
