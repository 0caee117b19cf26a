//! CLI output formatting

use crate::{
    core::{ExecutionRecord, ExecutionStatus, StepRecord},
    execution::ExecutionEvent,
    persistence::ExecutionSummary,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static BRANCH: Emoji<'_, '_> = Emoji("🔀 ", "? ");

/// Create a spinner shown while waiting on an execution
pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Executing => style("EXECUTING").yellow().to_string(),
        ExecutionStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
        ExecutionStatus::Stopped => style("STOPPED").yellow().to_string(),
    }
}

fn status_icon(status: ExecutionStatus) -> Emoji<'static, 'static> {
    match status {
        ExecutionStatus::Succeeded => CHECK,
        ExecutionStatus::Failed => CROSS,
        ExecutionStatus::Executing => SPINNER,
        ExecutionStatus::Stopped => WARN,
        ExecutionStatus::Pending => INFO,
    }
}

/// Format execution summary for display
pub fn format_execution_summary(summary: &ExecutionSummary) -> String {
    format!(
        "{} {} - {} v{} - {} ({}/{} steps succeeded)",
        status_icon(summary.status),
        style(short_id(&summary.execution_id.to_string())).dim(),
        style(&summary.pipeline_name).bold(),
        summary.pipeline_version,
        format_status(summary.status),
        summary.succeeded_steps,
        summary.entered_steps,
    )
}

/// Format one step of an execution
pub fn format_step_record(step: &StepRecord) -> String {
    let mut line = format!(
        "{} {} [{}] {}",
        status_icon(step.status),
        style(&step.name).cyan(),
        style(step.kind).dim(),
        format_status(step.status)
    );
    if let Some(branch) = step.outcome {
        line.push_str(&format!(" {} {}", BRANCH, style(branch).bold()));
    }
    if let Some(reason) = &step.failure_reason {
        line.push_str(&format!(": {}", style(reason).red()));
    }
    line
}

/// Print an execution record with its steps
pub fn print_execution(record: &ExecutionRecord) {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(record.execution_id).cyan());
    println!(
        "  Pipeline: {} (version {})",
        style(&record.pipeline_name).bold(),
        record.pipeline_version
    );
    println!("  Status: {}", format_status(record.status));
    if let Some(started) = record.started_at {
        println!("  Started: {}", style(started.to_rfc3339()).dim());
        if let Some(ended) = record.ended_at {
            println!("  Ended: {}", style(ended.to_rfc3339()).dim());
            if let Ok(duration) = ended.signed_duration_since(started).to_std() {
                println!("  Duration: {}", style(format_duration(duration)).dim());
            }
        }
    }
    if let Some(reason) = &record.failure_reason {
        println!("  Failure: {}", style(reason).red());
    }
    if !record.parameters.is_empty() {
        println!("  Parameters:");
        for (name, value) in &record.parameters {
            println!("    {} = {}", style(name).cyan(), value);
        }
    }
    println!("  Steps:");
    for step in &record.steps {
        println!("    {}", format_step_record(step));
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::ExecutionStarted {
            execution_id,
            pipeline_name,
        } => format!(
            "{} Starting pipeline {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(short_id(&execution_id.to_string())).dim()
        ),
        ExecutionEvent::StepStarted { step, kind } => {
            format!("{} {} [{}]", SPINNER, style(step).cyan(), style(kind).dim())
        }
        ExecutionEvent::StepSucceeded { step, outputs } => {
            if outputs.is_empty() {
                format!("{} {}", CHECK, style(step).green())
            } else {
                let rendered: Vec<String> = outputs
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, format_value(value, 60)))
                    .collect();
                format!("{} {} ({})", CHECK, style(step).green(), style(rendered.join(", ")).dim())
            }
        }
        ExecutionEvent::StepFailed { step, reason } => {
            format!("{} {}: {}", CROSS, style(step).red(), style(reason).dim())
        }
        ExecutionEvent::ConditionEvaluated { step, branch } => format!(
            "{} {} → {} arm",
            BRANCH,
            style(step).yellow(),
            style(branch).bold()
        ),
        ExecutionEvent::ExecutionFinished { execution_id, status } => format!(
            "{} Pipeline ({}) {}",
            status_icon(*status),
            style(short_id(&execution_id.to_string())).dim(),
            format_status(*status)
        ),
    }
}

/// Render a JSON value on one line, truncated to `max_chars`
pub fn format_value(value: &Value, max_chars: usize) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if rendered.chars().count() <= max_chars {
        rendered
    } else {
        let truncated: String = rendered.chars().take(max_chars).collect();
        format!("{}…", truncated)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
