use anyhow::Result;
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use drip_core::ledger::LedgerService;
use drip_core::models::{percentage, progress};

use super::helpers::{format_time, parse_date, progress_bar, short_id};

pub(crate) async fn cmd_summary(
    ledger: &LedgerService,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let summary = ledger.day_summary(date).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let total = summary.total;
    let target = summary.target;
    let pct = summary.percentage;
    let bar = progress_bar(pct, 30);

    println!("=== {date} ===\n");
    println!("  {bar} {pct}%");
    println!("  {total} / {target} ml");
    if summary.goal_reached() {
        println!("  Daily goal reached!");
    } else {
        let remaining = summary.remaining;
        println!("  {remaining} ml to go");
    }
    println!();

    if summary.entries.is_empty() {
        eprintln!("No entries for {date}");
        process::exit(2);
    }

    for e in &summary.entries {
        let id = short_id(&e.id);
        let at = format_time(e);
        let amount = e.amount;
        let note = e
            .note
            .as_ref()
            .map(|n| format!("  ({n})"))
            .unwrap_or_default();
        println!("    [{id}] {at}  {amount:>5} ml{note}");
    }

    Ok(())
}

pub(crate) async fn cmd_history(ledger: &LedgerService, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Drinks")]
        drinks: usize,
        #[tabled(rename = "Total")]
        total: String,
        #[tabled(rename = "Goal")]
        goal: String,
    }

    let today = Local::now().date_naive();
    let history = ledger.history(today, days).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    if history.iter().all(|d| d.entry_count == 0) {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let target = ledger.target();
    let rows: Vec<HistoryRow> = history
        .iter()
        .map(|d| {
            let pct = percentage(progress(d.total, target));
            HistoryRow {
                date: d.date.format("%a %Y-%m-%d").to_string(),
                drinks: d.entry_count,
                total: format!("{} ml", d.total),
                goal: format!("{pct}%"),
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
