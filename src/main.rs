mod commands;
mod config;
mod error;
mod garage_api;
mod image_refresh;
mod notifier;
mod processors;
mod reconciler;
mod session;
mod state;

use tracing::{debug, error, info};
use tracing_appender::rolling;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt};

use crate::commands::{UserCommand, parse_command};
use crate::config::{Config, LoggingConfig};
use crate::garage_api::backoff::ReconnectPolicy;
use crate::garage_api::garage_client::GarageClient;
use crate::notifier::LogNotifier;
use crate::session::{Session, SessionInput, SessionOptions};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = Config::from_file(&config_path).or_else(|e| {
        println!("Config file not found. Creating example {}...", config_path);
        Config::save_example(&config_path)?;
        println!("Please edit {} with your settings and restart the application.", config_path);
        Err(e)
    })?;

    init_logging(&config.logging);

    let client = GarageClient::new(&config.garage)?;
    info!("Watching garage at {}", config.garage.base_url);

    let status_poll = match config.intervals.status_poll_seconds {
        0 => None,
        seconds => Some(Duration::from_secs(seconds)),
    };
    let options = SessionOptions {
        camera_url: client.camera_url().to_string(),
        snapshot_path: PathBuf::from(&config.image.snapshot_path),
        image_refresh: Duration::from_secs(config.intervals.image_refresh_seconds.max(1)),
        status_poll,
        auto_image: config.image.auto_refresh,
        permission: config.notifications.permission,
    };

    let session = Session::new(client.clone(), options, Arc::new(LogNotifier));
    let stream = client.open_event_stream(ReconnectPolicy::from(&config.intervals));

    spawn_stdin_reader(session.sender());

    let ctrl_c = session.sender();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl-C: {:?}", e);
            return;
        }
        let _ = ctrl_c.send(SessionInput::Shutdown);
    });

    session.run(stream).await;
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    // Directory for logs
    let log_dir = &logging.directory;

    // One file per level
    let debug_file = rolling::daily(log_dir, &logging.debug_file);
    let info_file = rolling::daily(log_dir, &logging.info_file);
    let warn_file = rolling::daily(log_dir, &logging.warn_file);
    let error_file = rolling::daily(log_dir, &logging.error_file);

    let debug_layer = fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug"));

    let info_layer = fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::INFO);

    let warn_layer = fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

    let error_layer = fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

    let console_layer = fmt::layer()
        .pretty()
        .with_filter(EnvFilter::new(&logging.console_level));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(debug_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .init();
}

/// Blocking stdin lives on its own thread so it never holds up runtime shutdown.
fn spawn_stdin_reader(inputs: UnboundedSender<SessionInput>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Unable to read stdin: {:?}", e);
                    break;
                }
            };
            let Some(command) = parse_command(&line) else {
                continue;
            };
            if inputs.send(SessionInput::Command(command)).is_err() {
                return;
            }
            if command == UserCommand::Quit {
                return;
            }
        }
        debug!("stdin closed");
        let _ = inputs.send(SessionInput::Shutdown);
    });
}
