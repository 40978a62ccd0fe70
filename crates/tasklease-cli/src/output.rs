//! Output formatting for CLI responses

use anyhow::Error;
use colored::Colorize;
use serde_json::json;

use tasklease_supervisor::{AttributionResult, CoordinatorMetricsSnapshot};

use crate::error::CliError;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
            "type": error_type_name(error)
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format error as JSON: {e}"),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

fn error_type_name(error: &Error) -> &'static str {
    match error.downcast_ref::<CliError>() {
        Some(CliError::InvalidConfiguration(_)) => "InvalidConfiguration",
        Some(CliError::Supervisor(_)) => "SupervisorError",
        Some(CliError::IoError(_)) => "IoError",
        Some(CliError::JsonError(_)) => "JsonError",
        Some(CliError::YamlError(_)) => "YamlError",
        None => "Error",
    }
}

/// Print the outcome of attributing a diagnostic report
pub fn print_attribution(result: &AttributionResult, json: bool) {
    if json {
        let output = json!({
            "success": true,
            "attribution": result
        });
        match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to format attribution as JSON: {e}"),
        }
        return;
    }

    match &result.name {
        Some(name) if result.captured => {
            println!("{} {}", "Attributed:".green().bold(), name.as_str().bold());
            if result.names.len() > 1 {
                println!("{}", "All expired units:".bold());
                for unit in &result.names {
                    println!("  {} {}", "●".red(), unit.as_str());
                }
            }
        }
        _ => println!("{}", "No unit could be attributed".yellow()),
    }
}

/// Print coordinator counters at the end of a run
pub fn print_metrics(metrics: &CoordinatorMetricsSnapshot, json: bool) {
    if json {
        let output = json!({
            "success": true,
            "metrics": metrics
        });
        match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to format metrics as JSON: {e}"),
        }
        return;
    }

    println!("{}", "Recovery Coordinator:".bold());
    println!("  Cycles: {}", metrics.cycles);
    println!("  Attributed: {}", metrics.attributed_cycles);
    println!("  Fallback: {}", metrics.fallback_cycles);
    println!("  Spurious wakes: {}", metrics.spurious_wakes);
    println!("  Actions run: {}", metrics.actions_run);
    let failures = metrics.action_failures.to_string();
    if metrics.action_failures == 0 {
        println!("  Action failures: {}", failures.green());
    } else {
        println!("  Action failures: {}", failures.red());
    }
}
