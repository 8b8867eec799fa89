use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveTime, TimeZone};
use serde::Serialize;
use std::io::{self, BufRead, Write};

use drip_core::models::WaterIntakeEntry;

/// Number of id characters shown in listings and accepted by `drip delete`.
pub(crate) const SHORT_ID_LEN: usize = 8;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday")),
        },
    }
}

pub(crate) fn parse_time(time_str: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(time_str.trim(), "%H:%M")
        .with_context(|| format!("Invalid time '{time_str}'. Use HH:MM (24h)"))
}

/// Millisecond timestamp for a local date and time.
pub(crate) fn local_timestamp(date: NaiveDate, time: NaiveTime) -> Result<i64> {
    let dt = Local
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .with_context(|| format!("{date} {time} does not exist in the local timezone"))?;
    Ok(dt.timestamp_millis())
}

/// Resolve an id or unique id prefix against stored entries.
pub(crate) fn resolve_entry<'a>(
    entries: &'a [WaterIntakeEntry],
    id_or_prefix: &str,
) -> Result<Option<&'a WaterIntakeEntry>> {
    if let Some(exact) = entries.iter().find(|e| e.id == id_or_prefix) {
        return Ok(Some(exact));
    }
    let mut matches = entries.iter().filter(|e| e.id.starts_with(id_or_prefix));
    let first = matches.next();
    if matches.next().is_some() {
        bail!("Id prefix '{id_or_prefix}' matches more than one entry");
    }
    Ok(first)
}

pub(crate) fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id, |(end, _)| &id[..end])
}

pub(crate) fn format_time(entry: &WaterIntakeEntry) -> String {
    entry
        .local_time()
        .map_or_else(|| "??:??".to_string(), |t| t.format("%H:%M").to_string())
}

pub(crate) fn progress_bar(percentage: u8, width: usize) -> String {
    let filled = (usize::from(percentage.min(100)) * width + 50) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

pub(crate) fn prompt_choice(options: &[i64]) -> Result<usize> {
    for (i, amount) in options.iter().enumerate() {
        eprintln!("  {}) {amount} ml", i + 1);
    }
    let count = options.len();
    eprint!("\nSelect an amount (1-{count}): ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    let n: usize = line.trim().parse().context("Invalid number")?;
    if n < 1 || n > count {
        bail!("Selection out of range");
    }
    Ok(n - 1)
}

pub(crate) fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N]: ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let line = stdin.lock().lines().next().context("No input")??;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}
