//! CLI entry point. Loads configuration, builds the composition root, and
//! serves it over the JSON-RPC stdio transport, the REST adapter, or both
//! (spec §6.3 `mode` key), mapping failures onto the exit codes in spec
//! §6.4.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cortex::app::{CortexApp, DocstoreUnreachable};
use cortex_core::GlobalConfig;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cortex")]
#[command(about = "Agent task coordination, knowledge store, and code index", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a config file (TOML), overriding the default search path.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve operations over the configured transport(s).
    ///
    /// The transport is taken from the `mode` config key (`rpc`, `rest`, or
    /// `both`) unless overridden here.
    Serve {
        /// Force stdio JSON-RPC only, regardless of the `mode` config key.
        #[arg(long)]
        rpc: bool,

        /// Force REST only, regardless of the `mode` config key.
        #[arg(long)]
        rest: bool,
    },

    /// Print the resolved configuration and exit without serving.
    PrintConfig,
}

fn init_logging(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level.to_string()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = match GlobalConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(1);
        }
    };

    match cli.command {
        Commands::PrintConfig => {
            for (key, value) in config.as_map() {
                println!("{key} = {value}");
            }
            ExitCode::SUCCESS
        }
        Commands::Serve { rpc, rest } => run_serve(config, rpc, rest).await,
    }
}

async fn run_serve(config: GlobalConfig, force_rpc: bool, force_rest: bool) -> ExitCode {
    let mode = if force_rpc {
        "rpc"
    } else if force_rest {
        "rest"
    } else {
        config.get("mode").unwrap_or("both")
    };

    let app = match CortexApp::build(config).await {
        Ok(app) => app,
        Err(e) => {
            if e.downcast_ref::<DocstoreUnreachable>().is_some() {
                error!(error = %e, "docstore unreachable at startup");
                return ExitCode::from(2);
            }
            error!(error = %e, "failed to build application");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = app.start_watching().await {
        error!(error = %e, "failed to register handlers for the code-index watcher");
        return ExitCode::from(3);
    }
    let app = std::sync::Arc::new(app);

    info!(mode, "cortex starting");

    let result = match mode {
        "rpc" => cortex::mcp::run_stdio(app.clone()).await,
        "rest" => serve_rest(app.clone()).await,
        _ => {
            let rpc = cortex::mcp::run_stdio(app.clone());
            let rest = serve_rest(app.clone());
            tokio::select! {
                r = rpc => r,
                r = rest => r,
            }
        }
    };

    app.stop_watching();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited with an error");
            ExitCode::from(1)
        }
    }
}

async fn serve_rest(app: std::sync::Arc<CortexApp>) -> anyhow::Result<()> {
    let port = app.config.get_u16("rest.port", 8080);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "REST server listening");
    let router = cortex::rest::router(app);
    axum::serve(listener, router).await?;
    Ok(())
}
