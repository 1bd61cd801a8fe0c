// Output formatting and display for CLI

use crate::process::{Outcome, SupervisorSettings};
use colored::*;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a success message
pub fn print_success_msg(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print the resolved settings as a two-column table
pub fn print_settings(settings: &SupervisorSettings) {
    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "Setting")]
        key: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let spec = &settings.spec;
    let restart = &settings.restart;
    let shutdown = &settings.shutdown;

    let mut rows = vec![
        SettingRow {
            key: "name",
            value: spec.name.cyan().to_string(),
        },
        SettingRow {
            key: "script",
            value: spec.script.display().to_string(),
        },
        SettingRow {
            key: "interpreter",
            value: spec
                .interpreter
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        },
        SettingRow {
            key: "args",
            value: if spec.args.is_empty() {
                "-".to_string()
            } else {
                spec.args.join(" ")
            },
        },
        SettingRow {
            key: "autorestart",
            value: format_flag(restart.enabled),
        },
        SettingRow {
            key: "restart delay",
            value: format!(
                "{} + k × {}",
                format_millis(&restart.base_delay),
                format_millis(&restart.backoff_increment)
            ),
        },
        SettingRow {
            key: "max restart delay",
            value: restart
                .max_delay
                .as_ref()
                .map(format_millis)
                .unwrap_or_else(|| "uncapped".to_string()),
        },
        SettingRow {
            key: "restart budget",
            value: format!(
                "{} per {}",
                restart.max_restarts,
                format_duration(&restart.window)
            ),
        },
        SettingRow {
            key: "min uptime",
            value: format_millis(&restart.min_uptime),
        },
        SettingRow {
            key: "max memory",
            value: settings
                .limits
                .max_memory
                .map(|limit| {
                    format!(
                        "{} (every {})",
                        format_memory(limit),
                        format_millis(&settings.limits.check_interval)
                    )
                })
                .unwrap_or_else(|| "-".to_string()),
        },
        SettingRow {
            key: "stop",
            value: format!(
                "{} then SIGKILL after {}{}",
                shutdown.kill_signal,
                format_millis(&shutdown.kill_timeout),
                if shutdown.treekill { " (group)" } else { "" }
            ),
        },
        SettingRow {
            key: "out file",
            value: settings.logs.out_file.display().to_string(),
        },
        SettingRow {
            key: "error file",
            value: settings.logs.error_file.display().to_string(),
        },
        SettingRow {
            key: "log file",
            value: settings.logs.combined_file.display().to_string(),
        },
        SettingRow {
            key: "timestamps",
            value: if settings.logs.time {
                settings.logs.date_format.clone()
            } else {
                format_flag(false)
            },
        },
    ];

    if let Some(ref pid_file) = spec.pid_file {
        rows.push(SettingRow {
            key: "pid file",
            value: pid_file.display().to_string(),
        });
    }

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
}

/// Print how supervision ended
pub fn print_outcome(name: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Stopped => print_success_msg(&format!("{} stopped", name)),
        Outcome::ChildExited { code: Some(0) } => {
            print_success_msg(&format!("{} exited cleanly", name))
        }
        Outcome::ChildExited { code } => print_error(&format!(
            "{} exited with {} and autorestart is disabled",
            name,
            code.map(|c| format!("code {}", c))
                .unwrap_or_else(|| "a signal".to_string())
        )),
        Outcome::BudgetExhausted { restarts } => print_error(&format!(
            "{} crashed after {} restart(s) within the window, giving up",
            name, restarts
        )),
    }
}

fn format_flag(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".bright_black().to_string()
    }
}

/// Millisecond-precision durations below a minute, coarser above
fn format_millis(duration: &Duration) -> String {
    if duration.as_secs() >= 60 || (duration.subsec_millis() == 0 && !duration.is_zero()) {
        format_duration(duration)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Format a duration in human-readable format
fn format_duration(duration: &Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else if secs < 86400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else {
        let days = secs / 86400;
        let hours = (secs % 86400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}d", days)
        }
    }
}

/// Format memory usage in human-readable format
fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < MB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    }
}
