//! `ical-events` CLI: list the events of an iCalendar file or URL within a time window.
//!
//! ## Usage
//!
//! ```sh
//! # Events of the next 24 hours, as JSON
//! ical-events calendar.ics
//!
//! # A fixed window, read in Asia/Omsk, as text
//! ical-events https://example.com/cal.ics --tz Asia/Omsk \
//!     --after 2017-01-01 --before 2017-01-06 --format text
//!
//! # Reader settings from a TOML file, overridden by ICAL_* variables
//! ICAL_READER__INVALID_EVENTS=strict ical-events cal.ics --config ical.toml
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use clap::{Parser, ValueEnum};
use ical_engine::source::HttpSource;
use ical_engine::{AnySource, CalendarEvents, CalendarReader, Interval, ReaderConfig};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ical-events",
    version,
    about = "List iCalendar events within a time window"
)]
struct Cli {
    /// Calendar file path, file:// URL, or http(s)/webcal URL
    source: String,

    /// Window start (inclusive): RFC 3339, or a local date/date-time in --tz [default: now]
    #[arg(long)]
    after: Option<String>,

    /// Window end (exclusive): RFC 3339, or a local date/date-time in --tz
    #[arg(long, conflicts_with = "hours")]
    before: Option<String>,

    /// Window length in hours when --before is not given
    #[arg(long, default_value_t = 24)]
    hours: i64,

    /// IANA timezone the window is read in
    #[arg(long, default_value = "UTC")]
    tz: String,

    /// TOML file with reader settings
    #[arg(long)]
    config: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Log progress to stderr (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Text,
}

/// Settings read from the config file and `ICAL_*` environment variables.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct Settings {
    reader: ReaderConfig,
    http_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            reader: ReaderConfig::default(),
            http_timeout_secs: 30,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(cli.config.as_deref())?;
    let tz: Tz = cli
        .tz
        .parse()
        .map_err(|_| anyhow!("Unknown timezone: '{}'", cli.tz))?;

    let after = match cli.after.as_deref() {
        Some(raw) => parse_instant(raw, tz)?,
        None => Utc::now().with_timezone(&tz),
    };
    let before = match cli.before.as_deref() {
        Some(raw) => parse_instant(raw, tz)?,
        None => chrono::Duration::try_hours(cli.hours)
            .and_then(|length| after.checked_add_signed(length))
            .ok_or_else(|| anyhow!("Window of {} hours is out of range", cli.hours))?,
    };
    let interval = Interval::new(after, before).context("Invalid time window")?;
    tracing::debug!(after = %interval.after(), before = %interval.before(), tz = %tz, "query window");

    let http = HttpSource::with_timeout(Duration::from_secs(settings.http_timeout_secs))
        .context("Failed to set up HTTP client")?;
    let reader = CalendarReader::new(AnySource::with_http(http), settings.reader);
    let calendar = reader
        .read_calendar(&cli.source, &interval)
        .with_context(|| format!("Failed to read calendar: {}", cli.source))?;

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&calendar)?),
        Format::Text => print_text(&calendar, tz),
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "ical_engine=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Layer the optional TOML file under `ICAL_` environment variables.
fn load_settings(path: Option<&str>) -> Result<Settings> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        if !Path::new(path).exists() {
            anyhow::bail!("Config file not found: {}", path);
        }
        builder = builder.add_source(config::File::with_name(path).format(config::FileFormat::Toml));
    }
    builder
        .add_source(
            config::Environment::with_prefix("ICAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(config::Config::try_deserialize)
        .context("Failed to load settings")
}

/// Parse an RFC 3339 instant, or a date / date-time read as wall-clock time in `tz`.
fn parse_instant(raw: &str, tz: Tz) -> Result<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&tz));
    }
    let local = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN)))
        .with_context(|| format!("Invalid time: '{}'", raw))?;
    tz.from_local_datetime(&local)
        .earliest()
        .ok_or_else(|| anyhow!("Time '{}' does not exist in {}", raw, tz))
}

fn print_text(calendar: &CalendarEvents, tz: Tz) {
    if let Some(name) = &calendar.name {
        println!("# {}", name);
    }
    for event in &calendar.events {
        let start = event.start.with_timezone(&tz);
        let when = if event.all_day {
            start.format("%Y-%m-%d").to_string()
        } else {
            start.format("%Y-%m-%d %H:%M").to_string()
        };
        match &event.location {
            Some(location) => println!("{}  {} @ {}", when, event.title, location),
            None => println!("{}  {}", when, event.title),
        }
    }
    if calendar.skipped > 0 {
        eprintln!("{} invalid event(s) skipped", calendar.skipped);
    }
}
