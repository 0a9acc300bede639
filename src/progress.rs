//! Progress bar and logging utilities.
//!
//! A bar sized to the input when the record count is known, a spinner for
//! stdin. In log-only mode both are hidden and [`log_progress`] prints
//! tail-friendly lines instead.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Set once from `--log-only` before the run starts.
static LOG_ONLY: AtomicBool = AtomicBool::new(false);

/// Hide the record bar and report progress through log lines.
pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Run time with one decimal, in the largest fitting unit (s, m or h).
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

fn hidden_in_log_only(pb: ProgressBar, style: ProgressStyle) -> ProgressBar {
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        pb.set_style(style);
    }
    pb
}

/// Records done out of the counted input rows.
fn record_bar(records: u64, msg: &str) -> ProgressBar {
    let style = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} records (ETA: {eta})")
        .unwrap()
        .progress_chars("=> ");
    let pb = hidden_in_log_only(ProgressBar::new(records), style);
    pb.set_message(msg.to_string());
    pb
}

// stdin has no known length
fn record_spinner(msg: &str) -> ProgressBar {
    let style = ProgressStyle::default_spinner()
        .template("{msg} {spinner} {pos} records [{elapsed_precise}]")
        .unwrap();
    let pb = hidden_in_log_only(ProgressBar::new_spinner(), style);
    if !is_log_only() {
        pb.enable_steady_tick(Duration::from_millis(100));
    }
    pb.set_message(msg.to_string());
    pb
}

/// Bar for a known record count, spinner otherwise.
pub fn create_record_progress(total: Option<u64>, msg: &str) -> ProgressBar {
    match total {
        Some(records) => record_bar(records, msg),
        None => record_spinner(msg),
    }
}

/// Progress line for log-only mode, or `None` when nothing should be printed.
fn progress_line(phase: &str, current: u64, total: Option<u64>, interval: u64) -> Option<String> {
    match total {
        Some(total) if current % interval == 0 || current == total => {
            let pct = if total == 0 {
                100.0
            } else {
                100.0 * current as f64 / total as f64
            };
            Some(format!("[{}] {}/{} ({:.1}%)", phase, current, total, pct))
        }
        None if current % interval == 0 => Some(format!("[{}] {}", phase, current)),
        _ => None,
    }
}

/// Print every `interval`-th processed record (and the last one) in log-only mode.
pub fn log_progress(phase: &str, current: u64, total: Option<u64>, interval: u64) {
    if !is_log_only() {
        return;
    }
    if let Some(line) = progress_line(phase, current, total, interval.max(1)) {
        eprintln!("{}", line);
    }
}
