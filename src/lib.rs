pub mod cli;
pub mod commands;
pub mod db;
pub mod error;
pub mod logging;
pub mod market;
pub mod state;

use clap::Parser;
use cli::{Args, ConsoleCommand, HELP};
use commands::{
    health::health,
    trackers::{
        add_tracker, remove_tracker, restore_credential, select_tracker_symbol, set_auth_token,
        tracker_depth, tracker_statuses, SelectSymbolArgs,
    },
};
use db::initialize_pool;
use error::AppError;
use market::persistence::SqliteCredentialStore;
use market::registry::TrackerRegistry;
use market::stockbit::StockbitClient;
use market::types::{OrderBookRow, TrackerEvent};
use state::AppState;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub fn run() -> Result<(), AppError> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(serve(args));
    // A pending stdin read would otherwise hold the runtime open.
    runtime.shutdown_background();
    result
}

pub async fn serve(args: Args) -> Result<(), AppError> {
    let config = args.poller_settings().normalize()?;
    let db_pool = initialize_pool(args.db_path.as_deref()).await?;
    let credential_store = Arc::new(SqliteCredentialStore::new(db_pool.clone()));
    let source = Arc::new(StockbitClient::new(&config)?);

    info!(
        base_url = %config.base_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        depth_rows = config.depth_rows,
        "starting quote desk"
    );
    let registry = TrackerRegistry::new(source, config);
    let events = registry.subscribe();
    let state = AppState::new(db_pool.clone(), credential_store, registry);

    let logger_token = CancellationToken::new();
    let logger = tokio::spawn(log_tracker_events(events, logger_token.clone()));

    bootstrap(&state, &args).await?;
    println!("{HELP}");
    read_console(&state).await;

    state.registry.lock().await.shutdown().await;
    logger_token.cancel();
    let _ = logger.await;
    db_pool.close().await;
    info!("quote desk stopped");
    Ok(())
}

async fn bootstrap(state: &AppState, args: &Args) -> Result<(), AppError> {
    match args.token.as_deref() {
        Some(token) => {
            set_auth_token(state, token).await?;
        }
        None => {
            let restored = restore_credential(state).await?;
            if !restored.has_credential {
                warn!("no access token configured; trackers stay idle until 'token <value>'");
            }
        }
    }

    for (index, symbol) in args.initial_symbols().into_iter().enumerate() {
        let id = if index == 0 {
            state.registry.lock().await.first_id()
        } else {
            Some(add_tracker(state).await?.id)
        };
        let Some(id) = id else {
            continue;
        };
        select_tracker_symbol(state, SelectSymbolArgs { id: id.0, symbol }).await?;
    }
    Ok(())
}

async fn log_tracker_events(
    mut events: broadcast::Receiver<TrackerEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel_token.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(TrackerEvent::Updated(snapshot)) => info!("{}", snapshot.summary()),
            Ok(TrackerEvent::Removed { id }) => info!(tracker = %id, "tracker removed"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "event log fell behind")
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn read_console(state: &AppState) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                warn!(%error, "failed to read console input");
                break;
            }
        };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(error) => {
                println!("{error}");
                continue;
            }
        };
        if command == ConsoleCommand::Quit {
            break;
        }

        match execute(state, command).await {
            Ok(output) => println!("{output}"),
            Err(error) => println!("{error}"),
        }
    }
}

fn depth_line(bid: &OrderBookRow, offer: &OrderBookRow) -> String {
    format!(
        "{:>6} {:>8} {:>10} | {:<10} {:<8} {:<6}",
        bid.que_num, bid.volume, bid.price, offer.price, offer.volume, offer.que_num
    )
}

async fn execute(state: &AppState, command: ConsoleCommand) -> Result<String, AppError> {
    let output = match command {
        ConsoleCommand::Add => {
            let tracked = add_tracker(state).await?;
            format!("added tracker {}", tracked.id)
        }
        ConsoleCommand::Remove(id) => {
            if remove_tracker(state, id).await?.removed {
                format!("removed tracker #{id}")
            } else {
                "the last tracker cannot be removed".to_string()
            }
        }
        ConsoleCommand::Select { id, symbol } => {
            let tracked = select_tracker_symbol(state, SelectSymbolArgs { id, symbol }).await?;
            if tracked.symbol.is_empty() {
                format!("tracker {} cleared", tracked.id)
            } else {
                format!("tracker {} now follows {}", tracked.id, tracked.symbol)
            }
        }
        ConsoleCommand::Token(value) => {
            let result = set_auth_token(state, &value).await?;
            if result.has_credential {
                format!("token saved, {} tracker(s) polling", result.active_trackers)
            } else {
                "token cleared, every tracker is idle".to_string()
            }
        }
        ConsoleCommand::Status => tracker_statuses(state)
            .await?
            .iter()
            .map(|snapshot| snapshot.summary())
            .collect::<Vec<_>>()
            .join("\n"),
        ConsoleCommand::Book(id) => {
            let depth = tracker_depth(state, id).await?;
            let mut lines = vec![format!("{} {}", depth.id, depth.symbol)];
            lines.extend(
                depth
                    .bids
                    .iter()
                    .zip(depth.offers.iter())
                    .map(|(bid, offer)| depth_line(bid, offer)),
            );
            lines.join("\n")
        }
        ConsoleCommand::Health => {
            let report = health(state).await?;
            format!(
                "status={} db={} uptime_ms={} trackers={} active={} token={}",
                report.status,
                report.db,
                report.uptime_ms,
                report.trackers,
                report.active_trackers,
                report.has_credential
            )
        }
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
    };
    Ok(output)
}
