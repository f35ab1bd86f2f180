pub mod migrate;
pub mod new;

use chrono::{DateTime, Utc};
use console::style;
use stagehand_migrate::Summary;

/// Print `summary` grouped by stage under a colored header
pub fn print_summary(action: &str, summary: &Summary, with_time: bool) {
    if summary.is_empty() {
        println!("{} {}", style(action).yellow().bold(), style("nothing to do").dim());
        return;
    }

    println!("{} {} migration(s)", style(action).green().bold(), summary.len());
    let now = Utc::now();
    for (stage, files) in summary.group_by_stage() {
        println!("  {}:", style(stage).cyan());
        for file in files {
            if with_time {
                println!("    {}: {}", style(&file.name).green(), style(humanize(file.created_at, now)).italic());
            } else {
                println!("    {}", style(&file.name).green());
            }
        }
    }
}

/// Print `summary` as a JSON array
pub fn print_json(summary: &Summary) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

/// Relative age of `at` as seen from `now`
pub fn humanize(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds();
    if seconds < 0 {
        return at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    }

    let (value, unit) = match seconds {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (seconds / 60, "minute"),
        3_600..=86_399 => (seconds / 3_600, "hour"),
        86_400..=2_591_999 => (seconds / 86_400, "day"),
        _ => return at.format("%Y-%m-%d").to_string(),
    };

    if value == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", value, unit)
    }
}
