//! `sheetsync status|start|stop|trigger`: scheduler control and visibility.

use anyhow::Result;
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

use sheetsync_daemon::SyncStatus;
use sheetsync_engine::CycleReport;

use super::print_json;
use crate::client::ApiClient;

#[derive(Debug, Clone, Copy)]
pub enum ControlAction {
    Start,
    Stop,
    Trigger,
}

impl ControlAction {
    fn path(self) -> &'static str {
        match self {
            ControlAction::Start => "/api/sync/start",
            ControlAction::Stop => "/api/sync/stop",
            ControlAction::Trigger => "/api/sync/trigger",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlReply {
    message: String,
    status: SyncStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    report: Option<CycleReport>,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

pub fn status(client: &ApiClient, json: bool) -> Result<()> {
    let status: SyncStatus = client.get("/api/sync/status")?;
    if json {
        return print_json(&status);
    }
    print_status(&status);
    Ok(())
}

pub fn control(client: &ApiClient, action: ControlAction, json: bool) -> Result<()> {
    let reply: ControlReply = client.post(action.path())?;
    if json {
        return print_json(&reply);
    }

    println!("{} {}", "✓".green().bold(), reply.message);
    if let Some(report) = &reply.report {
        print_report(report);
    }
    Ok(())
}

fn print_status(status: &SyncStatus) {
    let state = if status.is_running {
        "RUNNING".green().bold().to_string()
    } else {
        "STOPPED".bright_black().bold().to_string()
    };
    let errors = if status.errors > 0 {
        status.errors.to_string().red().to_string()
    } else {
        status.errors.to_string()
    };

    let rows = vec![
        StatusRow {
            field: "scheduler",
            value: state,
        },
        StatusRow {
            field: "last sync",
            value: format_when(status.last_sync, Utc::now()),
        },
        StatusRow {
            field: "next sync",
            value: format_when(status.next_sync, Utc::now()),
        },
        StatusRow {
            field: "total syncs",
            value: status.total_syncs.to_string(),
        },
        StatusRow {
            field: "errors",
            value: errors,
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if let Some(report) = &status.last_report {
        print_report(report);
    }
}

fn print_report(report: &CycleReport) {
    println!(
        "cycle {:?}: {} mappings checked, {} skipped, {} updates applied",
        report.outcome, report.mappings_checked, report.mappings_skipped, report.updates_applied,
    );
    for decision in &report.decisions {
        let mark = if decision.applied {
            "✓".green().to_string()
        } else {
            "✗".red().to_string()
        };
        println!("  {mark} {} [{}]", decision.mapping_name, decision.direction.as_str());
    }
    if report.writes_deferred {
        println!("  {}", "writes deferred: rate limit reached".yellow());
    }
    for sheet in report.sheets_failed.iter().chain(&report.writes_failed) {
        println!("  {} {sheet}", "failed:".red());
    }
}

/// Relative rendering of an optional timestamp, `never` when absent.
fn format_when(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };
    let seconds = (now - at).num_seconds();
    let (amount, future) = if seconds < 0 { (-seconds, true) } else { (seconds, false) };
    let span = match amount {
        0..=59 => format!("{amount}s"),
        60..=3599 => format!("{}m", amount / 60),
        3600..=86_399 => format!("{}h", amount / 3600),
        _ => format!("{}d", amount / 86_400),
    };
    if future {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn format_when_renders_past_and_future() {
        let now = Utc::now();
        assert_eq!(format_when(None, now), "never");
        assert_eq!(format_when(Some(now - Duration::seconds(42)), now), "42s ago");
        assert_eq!(format_when(Some(now - Duration::minutes(5)), now), "5m ago");
        assert_eq!(format_when(Some(now + Duration::hours(2)), now), "in 2h");
        assert_eq!(format_when(Some(now - Duration::days(3)), now), "3d ago");
    }
}
