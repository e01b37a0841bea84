use anyhow::{anyhow, Result};
use bsod_core::db::AnalyzerContext;

use super::analyze::{render_result, OutputFormat};

/// List recorded crashes, newest first.
pub fn history_command(
    ctx: &AnalyzerContext,
    limit: usize,
    days: Option<u32>,
    json: bool,
) -> Result<()> {
    let records = ctx.db.crash_history(limit, days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No crashes recorded.");
        return Ok(());
    }

    println!("Crash history:");
    for record in records {
        println!(
            "- #{} {} | {} ({:#x}) | driver: {} | confidence {:.0}%",
            record.id,
            record.crash_time,
            record.bugcheck_name,
            record.bugcheck_code,
            record.suspected_driver.as_deref().unwrap_or("Unknown"),
            record.confidence * 100.0
        );
        println!("    {}", record.dump_file_path);
    }
    Ok(())
}

/// Re-render one stored analysis.
pub fn show_command(ctx: &AnalyzerContext, id: i64, format: OutputFormat) -> Result<()> {
    let record = ctx.db.get_by_id(id)?.ok_or_else(|| anyhow!("No crash record with id {id}"))?;
    let result = record.analysis()?;
    println!("{}", render_result(&result, format, ctx.config.confidence_threshold)?);
    Ok(())
}

/// Summarize the crash history over a window of days.
pub fn stats_command(ctx: &AnalyzerContext, days: u32, json: bool) -> Result<()> {
    let stats = ctx.db.statistics(days)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("Crash statistics (last {} days)", stats.days);
    println!("  Total crashes: {}", stats.total_crashes);
    println!("  Top bugchecks:");
    if stats.top_bugchecks.is_empty() {
        println!("    (none)");
    }
    for (code, name, count) in &stats.top_bugchecks {
        println!("    - {name} ({code:#x}): {count}");
    }
    println!("  Top drivers:");
    if stats.top_drivers.is_empty() {
        println!("    (none)");
    }
    for (driver, count) in &stats.top_drivers {
        println!("    - {driver}: {count}");
    }
    Ok(())
}

/// Delete records older than `days` days.
pub fn prune_command(ctx: &AnalyzerContext, days: u32) -> Result<()> {
    let deleted = ctx.db.clear_old_records(days)?;
    println!("Removed {deleted} crash record(s) older than {days} days");
    Ok(())
}
