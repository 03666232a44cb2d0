//! Command-line arguments and the console command grammar of the `quote-desk` shell.
use crate::error::AppError;
use crate::market::types::PollerSettingsArgs;
use clap::Parser;
use std::path::PathBuf;

/// Parsed command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "quote-desk", version, about, long_about = None)]
pub struct Args {
    /// Access token sent as a bearer credential. Saved for later sessions.
    #[arg(long, env = "QUOTE_DESK_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Instruments to track at startup, comma separated (e.g. BBCA,TLKM).
    #[arg(long, value_delimiter = ',')]
    pub symbols: Vec<String>,

    /// Delay between fetch cycles of one instrument.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Upper bound for a single request.
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Rows shown per order book side.
    #[arg(long)]
    pub depth_rows: Option<usize>,

    /// Chart bucket width in minutes.
    #[arg(long)]
    pub chart_interval: Option<u32>,

    /// Quote service root.
    #[arg(long)]
    pub base_url: Option<String>,

    /// SQLite file holding the saved credential.
    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl Args {
    pub fn poller_settings(&self) -> PollerSettingsArgs {
        PollerSettingsArgs {
            base_url: self.base_url.clone(),
            poll_interval_ms: self.poll_interval_ms,
            request_timeout_ms: self.request_timeout_ms,
            depth_rows: self.depth_rows,
            chart_interval_minutes: self.chart_interval,
        }
    }

    /// Startup symbols with blanks dropped.
    pub fn initial_symbols(&self) -> Vec<String> {
        self.symbols
            .iter()
            .map(|symbol| symbol.trim())
            .filter(|symbol| !symbol.is_empty())
            .map(str::to_string)
            .collect()
    }
}

pub const HELP: &str = "\
commands:
  add                  start tracking a new (empty) instrument
  remove <id>          stop tracking an instrument (the last one is kept)
  select <id> [SYM]    poll SYM on tracker <id>; no symbol clears it
  token [value]        set the access token; no value clears it
  status               one line per tracker
  book <id>            order book of tracker <id>
  health               process and database health
  help                 this text
  quit                 stop every tracker and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Add,
    Remove(u64),
    Select { id: u64, symbol: String },
    Token(String),
    Status,
    Book(u64),
    Health,
    Help,
    Quit,
}

fn parse_id(raw: Option<&str>, command: &str) -> Result<u64, AppError> {
    let raw = raw.ok_or_else(|| {
        AppError::InvalidArgument(format!("{command} needs a tracker id"))
    })?;
    raw.trim_start_matches('#')
        .parse::<u64>()
        .map_err(|_| AppError::InvalidArgument(format!("'{raw}' is not a tracker id")))
}

impl ConsoleCommand {
    /// Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, AppError> {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Ok(None);
        };

        let command = match keyword.to_ascii_lowercase().as_str() {
            "add" => Self::Add,
            "remove" | "rm" => Self::Remove(parse_id(parts.next(), "remove")?),
            "select" | "sel" => {
                let id = parse_id(parts.next(), "select")?;
                let symbol = parts.next().unwrap_or_default().to_string();
                Self::Select { id, symbol }
            }
            "token" => Self::Token(parts.next().unwrap_or_default().to_string()),
            "status" | "ls" => Self::Status,
            "book" => Self::Book(parse_id(parts.next(), "book")?),
            "health" => Self::Health,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => {
                return Err(AppError::InvalidArgument(format!(
                    "unknown command '{other}', try 'help'"
                )))
            }
        };

        if parts.next().is_some() {
            return Err(AppError::InvalidArgument(format!(
                "too many arguments for '{keyword}'"
            )));
        }
        Ok(Some(command))
    }
}
