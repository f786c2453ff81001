// Output formatting and display for CLI

use crate::error::AggregateError;
use crate::ipc::{ProcessInfo, ResponseData};
use crate::process::ProcessState;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Print a success response to stdout
pub fn print_success(data: &ResponseData) {
    match data {
        ResponseData::Stopped { name } => {
            println!(
                "{}",
                format!("✓ Process {} stopped successfully", name)
                    .green()
                    .bold()
            );
        }

        ResponseData::Status(processes) => match processes.as_slice() {
            [] => println!("{}", "No processes are configured".yellow()),
            [single] => print_detailed_status(single),
            many => print_process_table(many),
        },
    }
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Report launch failures from a batch start
pub fn print_launch_failures(failures: &AggregateError) {
    eprintln!(
        "{}",
        format!("✗ {} process(es) failed to launch", failures.failures.len())
            .red()
            .bold()
    );
    for (name, error) in &failures.failures {
        eprintln!("  {} {}", name.cyan(), error);
    }
}

/// Print a formatted table of processes
fn print_process_table(processes: &[ProcessInfo]) {
    #[derive(Tabled)]
    struct ProcessRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "PID")]
        pid: String,
        #[tabled(rename = "CPU")]
        cpu: String,
        #[tabled(rename = "Memory")]
        memory: String,
        #[tabled(rename = "Uptime")]
        uptime: String,
        #[tabled(rename = "Restarts")]
        restarts: String,
    }

    let rows: Vec<ProcessRow> = processes
        .iter()
        .map(|p| ProcessRow {
            name: truncate(&p.process.name, 20),
            state: format_state_colored(&p.process.state),
            pid: or_dash(p.process.pid.map(|pid| pid.to_string())),
            cpu: or_dash(p.cpu_usage.map(|cpu| format!("{:.1}%", cpu))),
            memory: or_dash(p.memory.map(format_memory)),
            uptime: or_dash(p.process.uptime.as_ref().map(format_duration)),
            restarts: p.process.restarts.to_string(),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
    println!(
        "{}",
        format!("Total: {} process(es)", processes.len())
            .dimmed()
            .italic()
    );
}

/// Print detailed status view for a single process
fn print_detailed_status(info: &ProcessInfo) {
    let process = &info.process;

    println!("\n{}", "Process Details".bold().underline());
    println!();
    println!("  {:<15} {}", "Name:".bold(), process.name.cyan());
    println!(
        "  {:<15} {}",
        "State:".bold(),
        format_state_colored(&process.state)
    );

    if let Some(pid) = process.pid {
        println!("  {:<15} {}", "PID:".bold(), pid);
    }
    if let Some(cpu) = info.cpu_usage {
        println!("  {:<15} {:.1}%", "CPU Usage:".bold(), cpu);
    }
    if let Some(memory) = info.memory {
        println!("  {:<15} {}", "Memory:".bold(), format_memory(memory));
    }
    if let Some(uptime) = &process.uptime {
        println!("  {:<15} {}", "Uptime:".bold(), format_duration(uptime));
    }
    println!("  {:<15} {}", "Restarts:".bold(), process.restarts);

    println!();
}

/// Format a process state with color coding
fn format_state_colored(state: &ProcessState) -> String {
    let text = state.to_string();
    match state {
        ProcessState::Running => text.green().to_string(),
        ProcessState::Starting | ProcessState::Restarting { .. } | ProcessState::Stopping => {
            text.yellow().to_string()
        }
        ProcessState::Idle | ProcessState::Stopped => text.bright_black().to_string(),
        ProcessState::Exited(status) if status.success() => text.bright_black().to_string(),
        ProcessState::Exited(_) => text.red().to_string(),
        ProcessState::Failed(_) => text.red().bold().to_string(),
    }
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
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

/// Truncate a string to a maximum number of characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Spinner shown while waiting on the supervisor
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(&Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(&Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(&Duration::from_secs(3700)), "1h 1m");
        assert_eq!(format_duration(&Duration::from_secs(90000)), "1d 1h");
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(512), "512B");
        assert_eq!(format_memory(2048), "2.0KB");
        assert_eq!(format_memory(2 * 1024 * 1024), "2.0MB");
        assert_eq!(format_memory(3 * 1024 * 1024 * 1024), "3.00GB");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a very long string", 10), "this is...");
        assert_eq!(truncate("reservación-web-app-01", 12), "reservaci...");
    }
}
