//! Logtail - Entry Point
//!
//! Prints the history of a deployment's logs and optionally follows them live.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use logtail::app::options::AppOptions;
use logtail::app::run::{build_components, run};
use logtail::app::settings::Settings;
use logtail::authn::token::StaticToken;
use logtail::logging::{init_logging, LogOptions};
use logtail::utils::version_info;

use tracing::{error, info};

const USAGE: &str = "Usage: logtail --deployment=<id> [--type=runtime|build] [--instance=<id>] \
[--start=<rfc3339>] [--end=<rfc3339>] [--since=<minutes>] [--tail] [--previous=<pages>] \
[--format=text|html|json] [--settings=<path>]";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --tail
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        println!("{}", serde_json::to_string_pretty(&version_info())?);
        return Ok(());
    }
    if cli_args.contains_key("help") {
        println!("{}", USAGE);
        return Ok(());
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("settings")
        .map(PathBuf::from)
        .unwrap_or_else(Settings::default_path);
    let settings = Settings::load(&settings_path).await?;

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.json_logs,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = match AppOptions::from_args(&cli_args, &settings, Utc::now()) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let tokens = Arc::new(StaticToken::from_env_or(settings.token.as_ref())?);
    let components = build_components(&options, tokens)?;

    info!("Reading logs of deployment {}", options.params.filters.deployment_id);
    if let Err(e) = run(options, components, await_shutdown_signal()).await {
        error!("Failed to read logs: {e}");
        return Err(e.into());
    }
    Ok(())
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
