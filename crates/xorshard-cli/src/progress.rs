//! Job progress display.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a job is in flight
///
/// Workers report only on completion, so there is no byte-level progress to
/// draw; the spinner just shows the job is alive and for how long.
pub struct JobProgress {
    bar: ProgressBar,
}

impl JobProgress {
    /// Start a spinner for `label` over a payload of `total_bytes`
    #[must_use]
    pub fn start(label: &str, total_bytes: u64, threads: usize) -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!(
            "{label}: {} across {threads} workers",
            format_bytes(total_bytes)
        ));
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Hidden spinner, for non-interactive output
    #[must_use]
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Finish with custom message
    pub fn finish_with_message(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    /// Abandon the spinner (for errors)
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

/// Format bytes in human-readable format
///
/// # Example
///
/// ```
/// use xorshard_cli::progress::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.00 KB");
/// assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;

    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{size:.2} {}", UNITS[unit])
}

/// Format throughput (bytes/sec)
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}

/// Format a job duration
///
/// Sub-second jobs are common, so they are shown in milliseconds.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    let secs = duration.as_secs();

    if secs == 0 {
        format!("{millis}ms")
    } else if secs < 60 {
        format!("{:.2}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024_u64.pow(4)), "1.00 TB");
        assert_eq!(format_bytes(1024_u64.pow(5)), "1024.00 TB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024.0), "1.00 KB/s");
        assert_eq!(format_speed(1_048_576.0), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0ms");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m");
    }

    #[test]
    fn test_hidden_spinner() {
        let progress = JobProgress::hidden();
        progress.finish_with_message("done".to_string());
    }
}
