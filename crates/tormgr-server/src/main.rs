use std::env;

use tormgr_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};
use tormgr_server::{Bootstrapped, ServerBuilder, bootstrap};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From TORMGR_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (tormgr.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (TORMGR_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    tormgr_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %config_path, source = %source, "Configuration loaded");
    tormgr_server::observability::apply_logging_level(&cfg.logging.level);
    tormgr_server::metrics::init_metrics();

    let Bootstrapped { state, background } = bootstrap(cfg).await?;

    let server = background
        .into_iter()
        .fold(ServerBuilder::new(state), ServerBuilder::with_background_task)
        .build();
    server.run().await
}

fn resolve_config_path() -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (path, ConfigSource::CliArgument);
        }
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("TORMGR_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
