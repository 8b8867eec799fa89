use anyhow::{Result, bail};
use chrono::Local;
use std::process;

use drip_core::ledger::LedgerService;
use drip_core::models::{NewWaterIntakeEntry, PRESET_AMOUNTS, local_date, parse_amount};

use super::helpers::{
    confirm, format_time, json_error, local_timestamp, parse_date, parse_time, prompt_choice,
    resolve_entry, short_id,
};

pub(crate) async fn cmd_log(
    ledger: &LedgerService,
    amount: Option<String>,
    date: Option<String>,
    time: Option<String>,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    let amount = match amount {
        Some(s) => parse_amount(&s)?,
        None => {
            if json {
                bail!("An amount is required with --json");
            }
            PRESET_AMOUNTS[prompt_choice(PRESET_AMOUNTS)?]
        }
    };

    let timestamp = if date.is_some() || time.is_some() {
        let date = parse_date(date)?;
        let time = match time {
            Some(t) => parse_time(&t)?,
            None => Local::now().time(),
        };
        Some(local_timestamp(date, time)?)
    } else {
        None
    };

    let entry = ledger
        .add_entry(NewWaterIntakeEntry {
            amount,
            timestamp,
            note,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
        return Ok(());
    }

    let id = short_id(&entry.id);
    let at = format_time(&entry);
    println!("Logged {amount} ml at {at} [{id}]");

    if let Some(day) = local_date(entry.timestamp) {
        let summary = ledger.day_summary(day).await?;
        let total = summary.total;
        let target = summary.target;
        let pct = summary.percentage;
        println!("  {day}: {total} / {target} ml ({pct}%)");
        if summary.goal_reached() {
            println!("  Daily goal reached!");
        }
    }

    Ok(())
}

pub(crate) async fn cmd_delete(ledger: &LedgerService, entry_id: &str, json: bool) -> Result<()> {
    let entries = ledger.all_entries().await?;
    let Some(entry) = resolve_entry(&entries, entry_id)? else {
        if json {
            println!("{}", json_error(&format!("Entry {entry_id} not found")));
        } else {
            eprintln!("Entry {entry_id} not found");
        }
        process::exit(2);
    };

    ledger.delete_entry(&entry.id).await?;

    if json {
        println!("{}", serde_json::json!({ "deleted": entry.id }));
    } else {
        let amount = entry.amount;
        let id = short_id(&entry.id);
        println!("Deleted {amount} ml entry [{id}]");
    }
    Ok(())
}

pub(crate) async fn cmd_clear(ledger: &LedgerService, yes: bool, json: bool) -> Result<()> {
    if !yes && !confirm("Delete every logged drink? Target and reminder settings are kept.")? {
        eprintln!("Aborted");
        return Ok(());
    }

    ledger.clear_all().await?;

    if json {
        println!("{}", serde_json::json!({ "cleared": true }));
    } else {
        println!("All water intake data has been deleted");
    }
    Ok(())
}
