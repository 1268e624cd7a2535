use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait ProgressSink: Send + Sync {
    fn start_indeterminate(&self, message: Option<&str>);
    fn set(&self, progress_0_1: f32, message: Option<&str>);
    fn finish(&self, message: Option<&str>);
    fn reset(&self);
}

/// Progress printed to stderr as `[progress] 42% message`
pub struct ConsoleProgress {
    last_update: Mutex<Instant>, // throttling
    min_interval: Duration,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            last_update: Mutex::new(Instant::now() - Duration::from_millis(500)),
            min_interval: Duration::from_millis(250),
        }
    }

    fn print(&self, line: &str) {
        let mut err = std::io::stderr().lock();
        let _ = writeln!(err, "{}", line);
        if let Ok(mut last) = self.last_update.lock() {
            *last = Instant::now();
        }
    }

    fn due(&self) -> bool {
        self.last_update
            .lock()
            .map(|last| last.elapsed() >= self.min_interval)
            .unwrap_or(true)
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn format_progress(progress_0_1: f32, message: Option<&str>) -> String {
    let pct = (progress_0_1.clamp(0.0, 1.0) * 100.0).round() as u32;
    match message {
        Some(m) => format!("[progress] {:>3}% {}", pct, m),
        None => format!("[progress] {:>3}%", pct),
    }
}

impl ProgressSink for ConsoleProgress {
    fn start_indeterminate(&self, message: Option<&str>) {
        // Always shown immediately
        self.print(&format!("[progress] ... {}", message.unwrap_or("working")));
    }

    fn set(&self, progress_0_1: f32, message: Option<&str>) {
        let clamped = progress_0_1.clamp(0.0, 1.0);
        // Messages and the ends of the range bypass throttling
        let force = message.is_some() || clamped >= 0.99 || clamped <= 0.01;
        if force || self.due() {
            self.print(&format_progress(clamped, message));
        }
    }

    fn finish(&self, message: Option<&str>) {
        self.print(&format_progress(1.0, message));
    }

    fn reset(&self) {
        if let Ok(mut last) = self.last_update.lock() {
            *last = Instant::now() - self.min_interval;
        }
    }
}

pub struct NoopProgress;
impl ProgressSink for NoopProgress {
    fn start_indeterminate(&self, _message: Option<&str>) {}
    fn set(&self, _progress_0_1: f32, _message: Option<&str>) {}
    fn finish(&self, _message: Option<&str>) {}
    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_progress() {
        assert_eq!(format_progress(0.5, Some("Reading EXR")), "[progress]  50% Reading EXR");
        assert_eq!(format_progress(2.0, None), "[progress] 100%");
        assert_eq!(format_progress(-1.0, None), "[progress]   0%");
    }

    #[test]
    fn test_console_progress_throttles() {
        let p = ConsoleProgress::new();
        p.set(0.5, None);
        // Just printed, the next unforced update is suppressed
        assert!(!p.due());
        p.reset();
        assert!(p.due());
    }
}
