use anyhow::Result;

use drip_core::ledger::LedgerService;
use drip_core::models::DEFAULT_DAILY_TARGET;

pub(crate) async fn cmd_target_set(ledger: &LedgerService, ml: i64, json: bool) -> Result<()> {
    ledger.set_target(ml).await?;

    if json {
        println!("{}", serde_json::json!({ "daily_target": ml }));
    } else {
        println!("Daily target: {ml} ml");
    }
    Ok(())
}

pub(crate) fn cmd_target_show(ledger: &LedgerService, json: bool) -> Result<()> {
    let target = ledger.target();

    if json {
        println!("{}", serde_json::json!({ "daily_target": target }));
    } else if target == DEFAULT_DAILY_TARGET {
        println!("Daily target: {target} ml (default)");
    } else {
        println!("Daily target: {target} ml");
    }
    Ok(())
}
