use anyhow::{Context, Result, bail};
use chrono::Local;
use std::io::{self, BufRead};
use std::process;
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::warn;

use drip_core::ledger::LedgerService;
use drip_core::models::{NewWaterIntakeEntry, parse_amount};
use drip_core::notify::{NotificationId, TokioNotifier};
use drip_core::reminder::ReminderScheduler;

use super::helpers::json_error;

pub(crate) async fn cmd_remind_interval(
    scheduler: &ReminderScheduler,
    minutes: Option<i64>,
    json: bool,
) -> Result<()> {
    let Some(minutes) = minutes else {
        let interval = scheduler.interval();
        if json {
            println!("{}", serde_json::json!({ "interval_minutes": interval }));
        } else {
            println!("Reminder interval: every {interval} minutes");
        }
        return Ok(());
    };

    let scheduled = scheduler.set_interval(minutes).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "interval_minutes": minutes, "scheduled": scheduled })
        );
    } else {
        println!("Reminder interval: every {minutes} minutes");
        if scheduled.is_none() {
            eprintln!("Reminders could not be scheduled (are notifications enabled?)");
        }
        eprintln!("Run `drip remind watch` to keep reminders running");
    }
    Ok(())
}

pub(crate) async fn cmd_remind_test(
    scheduler: &ReminderScheduler,
    notifier: &TokioNotifier,
    json: bool,
) -> Result<()> {
    let mut deliveries = notifier.deliveries();

    let Some(id) = scheduler.fire_now().await else {
        let message = "Reminder could not be sent (are notifications enabled?)";
        if json {
            println!("{}", json_error(message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    };

    let delivery = tokio::time::timeout(Duration::from_secs(5), deliveries.recv())
        .await
        .context("Timed out waiting for the test reminder")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&delivery)?);
    } else {
        let title = &delivery.content.title;
        let body = &delivery.content.body;
        println!("\x07{title}  {body}  [{id}]");
    }
    Ok(())
}

/// Keep the recurring reminder alive and let the user answer reminders from the terminal.
///
/// An empty line opens the last delivered reminder. A number logs a drink and, when a reminder
/// was opened, dismisses that reminder.
pub(crate) async fn cmd_remind_watch(
    ledger: &LedgerService,
    scheduler: &ReminderScheduler,
    notifier: &TokioNotifier,
) -> Result<()> {
    let mut deliveries = notifier.deliveries();
    let mut responses = scheduler.subscribe();

    if scheduler.schedule_recurring().await.is_none() {
        bail!("Reminders could not be scheduled (are notifications enabled?)");
    }

    let interval = scheduler.interval();
    println!("Reminding you every {interval} minutes. Ctrl-C to stop.");
    println!("Press Enter to open the last reminder, or type an amount (e.g. 250) to log a drink.");

    let mut lines = spawn_line_reader(io::BufReader::new(io::stdin()));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut last_delivered: Option<NotificationId> = None;
    let mut opened: Option<NotificationId> = None;

    loop {
        tokio::select! {
            delivery = deliveries.recv() => match delivery {
                Ok(d) => {
                    let now = Local::now().format("%H:%M");
                    let title = &d.content.title;
                    let body = &d.content.body;
                    println!("\x07[{now}] {title}  {body}");
                    last_delivered = Some(d.id);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed reminder deliveries"),
                Err(RecvError::Closed) => break,
            },
            response = responses.recv() => match response {
                Ok(r) => {
                    println!("How much did you drink? (ml)");
                    opened = Some(r.id);
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "missed reminder responses"),
                Err(RecvError::Closed) => break,
            },
            line = lines.recv() => {
                let Some(line) = line else { break };
                let line = line.context("Failed to read from stdin")?;
                let line = line.trim();
                if line.is_empty() {
                    if let Some(id) = last_delivered.take() {
                        notifier.respond(&id);
                    }
                    continue;
                }
                log_from_terminal(ledger, scheduler, line, opened.take()).await;
            }
            _ = &mut ctrl_c => break,
        }
    }

    scheduler.cancel_all().await;
    println!("Reminders stopped");
    Ok(())
}

/// Forward lines from `reader` over a channel, read on a plain thread so a pending read never
/// holds up runtime shutdown.
fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(8);
    thread::spawn(move || {
        for line in reader.lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn log_from_terminal(
    ledger: &LedgerService,
    scheduler: &ReminderScheduler,
    input: &str,
    opened: Option<NotificationId>,
) {
    let amount = match parse_amount(input) {
        Ok(amount) => amount,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };

    if let Err(e) = ledger.add_entry(NewWaterIntakeEntry::new(amount)).await {
        eprintln!("Failed to save entry: {e}");
        return;
    }
    if let Some(id) = opened {
        scheduler.acknowledge(&id).await;
    }

    match ledger.day_summary(Local::now().date_naive()).await {
        Ok(summary) => {
            let total = summary.total;
            let target = summary.target;
            let pct = summary.percentage;
            println!("Logged {amount} ml. Today: {total} / {target} ml ({pct}%)");
        }
        Err(e) => eprintln!("Logged {amount} ml, but today's total is unavailable: {e}"),
    }
}
