//! Output formatting for CLI commands.
//!
//! Every formatter returns a string; `main` decides where it goes. JSON
//! output is stable for scripting, text output is colored for terminals.

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, ValidationResult};
use crate::gateway::{HealthStatus, InventoryItem};
use crate::planner::{ActionType, DeploymentPlan, ExecutionResult};
use crate::resource::FieldChange;
use crate::state::StateFile;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Result")]
    result: String,
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

#[derive(Tabled)]
struct InventoryRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when writing JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Formats a deployment plan.
    #[must_use]
    pub fn format_plan(&self, plan: &DeploymentPlan, detailed: bool) -> String {
        if self.is_json() {
            return to_json(plan);
        }

        if plan.is_empty() {
            return format!("{} No changes. Dockhand matches the configuration.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = writeln!(
            output,
            "\nPlan for configuration {}\n",
            ConfigHasher::short_hash(&plan.config_hash)
        );

        let changes: Vec<_> = plan
            .actions
            .iter()
            .filter(|a| a.action_type != ActionType::NoChange)
            .collect();
        let rows: Vec<PlanActionRow> = changes
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: action_label(a.action_type),
                address: a.address.clone(),
                reason: truncate(&a.reason, 60),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            for action in changes.iter().filter(|a| !a.changes.is_empty()) {
                let _ = writeln!(output, "\n  {}", action.address.bold());
                for change in &action.changes {
                    let _ = writeln!(output, "    {}", format_change(change));
                }
            }
        }

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to change, {} to replace, {} to destroy",
            plan.count(ActionType::Create).to_string().green(),
            (plan.count(ActionType::Update)
                + plan.count(ActionType::Refresh)
                + plan.count(ActionType::Restate))
            .to_string()
            .yellow(),
            plan.count(ActionType::Replace).to_string().magenta(),
            plan.count(ActionType::Delete).to_string().red()
        );

        output
    }

    /// Formats the result of an apply, destroy or refresh.
    #[must_use]
    pub fn format_execution(&self, result: &ExecutionResult) -> String {
        if self.is_json() {
            return to_json(result);
        }

        let mut output = String::new();
        let rows: Vec<ResultRow> = result
            .results
            .iter()
            .filter(|r| r.action_type != ActionType::NoChange || !r.success)
            .map(|r| ResultRow {
                address: r.address.clone(),
                action: action_label(r.action_type),
                result: if r.skipped {
                    "skipped".dimmed().to_string()
                } else if r.success {
                    r.outcome
                        .map_or_else(|| String::from("ok"), |o| to_label(&o))
                        .green()
                        .to_string()
                } else {
                    truncate(r.error.as_deref().unwrap_or("failed"), 60)
                        .red()
                        .to_string()
                },
            })
            .collect();

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        for r in result.results.iter().filter(|r| !r.drift.is_empty()) {
            let _ = writeln!(output, "\n  {} {}", "drift".yellow(), r.address.bold());
            for change in &r.drift {
                let _ = writeln!(output, "    {}", format_change(change));
            }
        }

        let status = if result.success {
            format!("{} Complete", "✓".green())
        } else {
            format!("{} Failed", "✗".red())
        };
        let _ = writeln!(output, "\n{status}: {result}");
        output
    }

    /// Formats the state summary.
    #[must_use]
    pub fn format_state(&self, state: &StateFile) -> String {
        if self.is_json() {
            return to_json(state);
        }

        let mut output = String::new();
        let _ = writeln!(output, "\nState {} (serial {})\n", state.lineage, state.serial);
        let _ = writeln!(output, "   Version: {}", state.version);
        let _ = writeln!(output, "   Last updated: {}", state.last_updated);
        let _ = writeln!(output, "   Records: {}", state.records.len());

        if !state.records.is_empty() {
            let rows: Vec<RecordRow> = state
                .records
                .iter()
                .map(|r| RecordRow {
                    address: r.address.clone(),
                    id: truncate(r.record.id(), 16),
                    environment: r.record.environment_id().to_string(),
                    hash: ConfigHasher::short_hash(&r.config_hash).to_string(),
                })
                .collect();
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !state.history.is_empty() {
            let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
            for entry in state.history.iter().rev().take(5) {
                let status = if entry.success { "✓".green() } else { "✗".red() };
                let _ = writeln!(
                    output,
                    "     {status} {} - {} ({})",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.resources.join(", ")
                );
            }
        }

        output
    }

    /// Formats the list of recorded addresses.
    #[must_use]
    pub fn format_addresses(&self, state: &StateFile) -> String {
        if self.is_json() {
            return to_json(&state.addresses());
        }
        state.addresses().iter().fold(String::new(), |mut out, a| {
            let _ = writeln!(out, "{a}");
            out
        })
    }

    /// Formats an inventory listing.
    #[must_use]
    pub fn format_inventory(&self, items: &[InventoryItem]) -> String {
        if self.is_json() {
            return to_json(&items);
        }
        if items.is_empty() {
            return String::from("No objects found.\n");
        }

        let rows: Vec<InventoryRow> = items
            .iter()
            .map(|i| InventoryRow {
                kind: i.kind.to_string(),
                id: truncate(&i.id, 16),
                name: i.name.clone(),
                detail: truncate(&i.detail, 40),
            })
            .collect();
        format!("{}\n", Table::new(rows))
    }

    /// Formats a health probe.
    #[must_use]
    pub fn format_health(&self, status: &HealthStatus) -> String {
        if self.is_json() {
            return to_json(status);
        }

        if status.healthy {
            format!(
                "{} {} is healthy ({} ms)\n",
                "✓".green(),
                status.url,
                status.response_time_ms.unwrap_or_default()
            )
        } else {
            format!(
                "{} {} is unhealthy: {}\n",
                "✗".red(),
                status.url,
                status.error.as_deref().unwrap_or("unknown error")
            )
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, warnings: bool) -> String {
        if self.is_json() {
            return to_json(&serde_json::json!({
                "valid": result.errors.is_empty(),
                "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "warnings": result.warnings,
            }));
        }

        let mut output = String::new();
        if result.errors.is_empty() {
            let _ = writeln!(output, "{} Configuration is valid", "✓".green());
        } else {
            let _ = writeln!(output, "{} Configuration is invalid:", "✗".red());
            for error in &result.errors {
                let _ = writeln!(output, "   - {error}");
            }
        }
        if warnings && !result.warnings.is_empty() {
            let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
            for warning in &result.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }
        output
    }

    /// Formats a one-line status message.
    #[must_use]
    pub fn message(&self, success: bool, message: &str) -> String {
        if self.is_json() {
            let status = if success { "success" } else { "error" };
            return to_json(&serde_json::json!({ "status": status, "message": message }));
        }
        if success {
            format!("{} {message}\n", "✓".green())
        } else {
            format!("{} {message}\n", "✗".red())
        }
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Renders a serde enum as its wire label.
fn to_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(Value::String(s)) => s,
        _ => String::new(),
    }
}

fn action_label(action_type: ActionType) -> String {
    match action_type {
        ActionType::Create => "+ create".green().to_string(),
        ActionType::Update => "~ update".yellow().to_string(),
        ActionType::Replace => "-/+ replace".magenta().to_string(),
        ActionType::Refresh => "? refresh".cyan().to_string(),
        ActionType::Restate => "= restate".blue().to_string(),
        ActionType::Delete => "- delete".red().to_string(),
        ActionType::NoChange => "no-op".dimmed().to_string(),
    }
}

fn format_change(change: &FieldChange) -> String {
    let show = |v: Option<&Value>| v.map_or_else(|| String::from("(none)"), Value::to_string);
    format!(
        "{}: {} -> {}",
        change.field,
        show(change.old_value.as_ref()).dimmed(),
        show(change.new_value.as_ref())
    )
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
