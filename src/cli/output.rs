//! Output formatting for CLI commands.
//!
//! Formatters return strings; the binary decides where they go. Secret values
//! never appear in any output.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, ValidationResult};
use crate::model::{Attr, EnvironmentRecord, VarMap};
use crate::planner::{ChangeAction, EnvironmentPlan};
use crate::reconciler::{ApplyReport, DriftReport, RefreshReport};
use crate::state::{LockInfo, ProviderState};

use super::commands::OutputFormat;

/// Placeholder printed in place of secret values.
pub const SENSITIVE: &str = "(sensitive)";

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    format: OutputFormat,
}

/// Plan change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Environment")]
    address: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// Managed environment row for table display.
#[derive(Tabled)]
struct EnvironmentRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Project")]
    project: i64,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Secrets")]
    secrets: usize,
    #[tabled(rename = "Config")]
    config: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when output is JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &EnvironmentPlan) -> String {
        match self.format {
            OutputFormat::Json => to_json(plan),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &EnvironmentPlan) -> String {
        if plan.is_empty() {
            return format!("{} No changes. Environments match the configuration.\n", "✓".green());
        }

        let rows: Vec<ChangeRow> = plan
            .changes
            .iter()
            .enumerate()
            .map(|(i, c)| ChangeRow {
                index: i + 1,
                action: Self::format_action(c.action),
                address: c.address.clone(),
                reason: truncate(&c.reason, 48),
            })
            .collect();

        let mut output = String::from("\nEnvironment plan\n\n");
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        for change in plan.changes.iter().filter(|c| !c.secret_changes.is_empty()) {
            let _ = writeln!(output, "\n  {} secrets:", change.address);
            for op in &change.secret_changes {
                let _ = writeln!(output, "    {op}");
            }
        }

        let _ = writeln!(
            output,
            "\nPlan: {} to create, {} to update, {} to replace, {} to destroy",
            plan.count(ChangeAction::Create).to_string().green(),
            plan.count(ChangeAction::Update).to_string().yellow(),
            plan.count(ChangeAction::Replace).to_string().magenta(),
            plan.count(ChangeAction::Delete).to_string().red()
        );
        output
    }

    /// Formats the outcome of an apply or destroy.
    #[must_use]
    pub fn format_apply(&self, report: &ApplyReport) -> String {
        if self.is_json() {
            return to_json(report);
        }

        let Some(execution) = &report.execution else {
            return if report.plan.is_empty() {
                Self::format_plan_text(&report.plan)
            } else {
                String::from("Apply cancelled.\n")
            };
        };

        let mut output = String::new();
        for result in &execution.results {
            if result.success {
                let _ = writeln!(output, "{} {} {}", "✓".green(), result.action, result.address);
            } else {
                let _ = writeln!(
                    output,
                    "{} {} {}: {}",
                    "✗".red(),
                    result.action,
                    result.address,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        let _ = writeln!(output, "\n{execution}");
        output
    }

    /// Formats a refresh report.
    #[must_use]
    pub fn format_refresh(&self, report: &RefreshReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                let mut output = format!("{report}\n");
                for address in &report.changed {
                    let _ = writeln!(output, "  {} {address} changed on the server", "~".yellow());
                }
                for address in &report.removed {
                    let _ = writeln!(output, "  {} {address} no longer exists", "-".red());
                }
                output
            }
        }
    }

    /// Formats a drift report.
    #[must_use]
    pub fn format_drift(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!("{} No drift detected - state is converged.\n", "✓".green());
                }

                let mut output = format!("{} Drift detected:\n\n", "⚠".yellow());
                for address in &report.remote_changes {
                    let _ = writeln!(output, "   ~ {address} (changed on server)");
                }
                for address in &report.missing {
                    let _ = writeln!(output, "   - {address} (missing on server)");
                }
                for address in &report.config_changes {
                    let _ = writeln!(output, "   * {address} (configuration changed)");
                }
                output.push_str(&Self::format_plan_text(&report.plan));
                output
            }
        }
    }

    /// Formats provider state with secret values hidden.
    #[must_use]
    pub fn format_state(&self, state: &ProviderState, lock: Option<&LockInfo>) -> String {
        if self.is_json() {
            return to_json(&serde_json::json!({ "state": redact_state(state), "lock": lock }));
        }

        let mut output = format!("\nState version {}, updated {}\n", state.version, state.last_updated);
        match lock {
            Some(lock) => {
                let _ = writeln!(
                    output,
                    "{} Locked: {lock} (expires in {}s)",
                    "⚠".yellow(),
                    lock.remaining_secs()
                );
            }
            None => output.push_str("Not locked.\n"),
        }
        output.push('\n');

        if state.is_empty() {
            output.push_str("   No environments managed.\n");
        } else {
            let rows: Vec<EnvironmentRow> = state
                .environments
                .values()
                .map(|env| EnvironmentRow {
                    address: env.address.clone(),
                    name: env.record.name.clone(),
                    project: env.record.project_identity,
                    id: env.record.identity.map_or_else(|| String::from("-"), |id| id.to_string()),
                    secrets: env.record.secret_list().len(),
                    config: if env.config_hash.is_empty() {
                        String::from("imported")
                    } else {
                        ConfigHasher::new().short_hash(&env.config_hash)
                    },
                })
                .collect();
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !state.history.is_empty() {
            let _ = writeln!(output, "\nRecent history ({}):", state.history.len());
            for entry in state.history.iter().rev().take(5) {
                let status = if entry.success { "✓".green() } else { "✗".red() };
                let _ = writeln!(
                    output,
                    "  {status} {} - {} ({})",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.addresses.join(", ")
                );
            }
        }

        output
    }

    /// Formats a single record with secret values hidden.
    #[must_use]
    pub fn format_record(&self, address: &str, record: &EnvironmentRecord) -> String {
        let record = redact_record(record);
        if self.is_json() {
            return to_json(&serde_json::json!({ "address": address, "environment": record }));
        }

        let mut output = format!(
            "{address}: '{}' (project {}, id {})\n",
            record.name,
            record.project_identity,
            record.identity.map_or_else(|| String::from("-"), |id| id.to_string())
        );
        write_vars(&mut output, "variables", &record.generic_variables);
        write_vars(&mut output, "env", &record.runtime_variables);
        for secret in record.secret_list() {
            let _ = writeln!(
                output,
                "  secret {} ({}, id {}) = {}",
                secret.name,
                secret.kind,
                secret.identity.map_or_else(|| String::from("-"), |id| id.to_string()),
                secret.value
            );
        }
        output
    }

    /// Formats validation results.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        if self.is_json() {
            let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
            return to_json(&serde_json::json!({
                "valid": result.is_valid(),
                "errors": errors,
                "warnings": result.warnings,
            }));
        }

        let mut output = if result.is_valid() {
            format!("{} Configuration is valid.\n", "✓".green())
        } else {
            let mut s = format!("{} {} errors:\n", "✗".red(), result.error_count());
            for error in &result.errors {
                let _ = writeln!(s, "   - {error}");
            }
            s
        };

        if show_warnings && !result.warnings.is_empty() {
            let _ = writeln!(output, "\n{} {} warnings:", "⚠".yellow(), result.warning_count());
            for warning in &result.warnings {
                let _ = writeln!(output, "   - {warning}");
            }
        }
        output
    }

    /// Formats a one-line status message.
    #[must_use]
    pub fn message(&self, status: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => to_json(&serde_json::json!({ "status": status, "message": message })),
            OutputFormat::Text => match status {
                "success" => format!("{} {message}", "✓".green()),
                "warning" => format!("{} {message}", "⚠".yellow()),
                "error" => format!("{} {message}", "✗".red()),
                _ => message.to_string(),
            },
        }
    }

    fn format_action(action: ChangeAction) -> String {
        match action {
            ChangeAction::Create => "+create".green().to_string(),
            ChangeAction::Update => "~update".yellow().to_string(),
            ChangeAction::Replace => "-/+replace".magenta().to_string(),
            ChangeAction::Delete => "-delete".red().to_string(),
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn write_vars(output: &mut String, label: &str, vars: &Attr<VarMap>) {
    if let Attr::Value(map) = vars {
        for (key, value) in map {
            let _ = writeln!(output, "  {label} {key} = {value}");
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn redact_record(record: &EnvironmentRecord) -> EnvironmentRecord {
    let mut record = record.clone();
    if let Attr::Value(secrets) = &mut record.secrets {
        for secret in secrets {
            secret.value = SENSITIVE.to_string();
        }
    }
    record
}

fn redact_state(state: &ProviderState) -> ProviderState {
    let mut state = state.clone();
    for env in state.environments.values_mut() {
        env.record = redact_record(&env.record);
    }
    state
}
