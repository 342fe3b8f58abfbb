// Pickwise entry point.
//
// Startup sequence:
// 1. Load config (copying defaults on first run)
// 2. Initialize tracing (log to file, stdout is for command output)
// 3. Open database and the configured event
// 4. Spawn stdin reader and app logic tasks
// 5. Print UI updates until the app loop exits

use pickwise_app::app::{self, AppState, UiUpdate};
use pickwise_app::command;
use pickwise_core::config;
use pickwise_core::db::Database;

use anyhow::Context;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config.logging.filter)?;
    info!("Pickwise starting up for event {}", config.event.id);

    // 3. Open database
    let db_path = config.resolved_db_path()?;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db_path_str = db_path.to_string_lossy();
    let db = Database::open(&db_path_str).context("failed to open database")?;
    info!("Database opened at {}", db_path_str);

    match db.active_event()? {
        Some(previous) if previous != config.event.id => {
            info!("Switching from event {} to {}", previous, config.event.id);
        }
        _ => {}
    }
    db.set_active_event(&config.event.id)?;

    let state = AppState::new(config, db).context("failed to open event")?;

    // 4. Spawn tasks
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);

    let input_ui_tx = ui_tx.clone();
    let input_handle = tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    let _ = cmd_tx.send(command::UserCommand::Quit).await;
                    break;
                }
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    let _ = cmd_tx.send(command::UserCommand::Quit).await;
                    break;
                }
            };
            match command::parse_line(&line) {
                Ok(Some(cmd)) => {
                    let quit = cmd == command::UserCommand::Quit;
                    if cmd_tx.send(cmd).await.is_err() || quit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = input_ui_tx.send(UiUpdate::Error(e.to_string())).await;
                }
            }
        }
    });

    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(cmd_rx, ui_tx, state).await {
            error!("Application loop error: {}", e);
        }
    });

    // 5. Print until every sender is gone
    println!("pickwise: type `help` for commands");
    while let Some(update) = ui_rx.recv().await {
        match update {
            UiUpdate::Output(text) if text.is_empty() => {}
            UiUpdate::Output(text) => println!("{text}"),
            UiUpdate::Error(message) => eprintln!("error: {message}"),
            UiUpdate::Changed(change) => println!("[{}]", app::describe_change(&change)),
        }
    }

    let _ = app_handle.await;
    input_handle.abort();

    info!("Pickwise shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to `logs/pickwise.log`. `RUST_LOG` overrides the
/// configured filter.
fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("pickwise.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
