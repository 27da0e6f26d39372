//! Per-file progress display
//!
//! The transfer loop is the only writer of `ProgressState::moved`; the
//! reporter thread only reads it. The counter is atomic, so a reading may lag
//! by a chunk but is never torn.

use crate::protocol::{timeouts, BAR_WIDTH};
use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Where status and progress go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    Terminal,
    Quiet,
}

impl Output {
    pub fn is_quiet(&self) -> bool {
        matches!(self, Output::Quiet)
    }
}

pub struct ProgressState {
    name: String,
    size: u64,
    moved: AtomicU64,
    started: Instant,
    finished: Mutex<Option<Instant>>,
}

impl ProgressState {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            moved: AtomicU64::new(0),
            started: Instant::now(),
            finished: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn advance(&self, bytes: u64) {
        self.moved.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn moved(&self) -> u64 {
        self.moved.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        match *self.finished.lock() {
            Some(end) => end.duration_since(self.started),
            None => self.started.elapsed(),
        }
    }

    fn mark_finished(&self) {
        let mut finished = self.finished.lock();
        if finished.is_none() {
            *finished = Some(Instant::now());
        }
    }
}

/// Filled cells for a bar of `width`; a zero-size file is complete.
pub fn bar_cells(moved: u64, total: u64, width: usize) -> usize {
    if total == 0 {
        return width;
    }
    let filled = (moved as u128 * width as u128 / total as u128) as usize;
    filled.min(width)
}

fn bar(moved: u64, total: u64) -> String {
    let filled = bar_cells(moved, total, BAR_WIDTH);
    format!("{}{}", "=".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}

pub fn render_line(name: &str, moved: u64, total: u64, elapsed: Duration) -> String {
    format!(
        "{} |{}| {}/{} B {:.1}s",
        name,
        bar(moved, total),
        moved,
        total,
        elapsed.as_secs_f64()
    )
}

pub fn summary_line(name: &str, size: u64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        size as f64 / secs
    } else {
        size as f64
    };
    format!(
        "{} |{}| {} B in {:.2}s ({}/s)",
        name,
        bar(size, size),
        size,
        secs,
        HumanBytes(rate as u64)
    )
}

pub fn broken_line(name: &str, moved: u64, total: u64, elapsed: Duration) -> String {
    format!(
        "{} |{}| broken at {}/{} B after {:.1}s",
        name,
        bar(moved, total),
        moved,
        total,
        elapsed.as_secs_f64()
    )
}

/// Background reporter for one in-flight file.
///
/// Dropping an unfinished reporter stops it and prints the broken line, so
/// the thread is always joined before the state goes away.
pub struct ProgressReporter {
    state: Arc<ProgressState>,
    bar: ProgressBar,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn start(name: impl Into<String>, size: u64, output: Output) -> Self {
        let state = Arc::new(ProgressState::new(name, size));
        let bar = match output {
            Output::Terminal => {
                let pb = ProgressBar::with_draw_target(Some(size), ProgressDrawTarget::stderr());
                pb.set_style(
                    ProgressStyle::with_template("{msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                pb
            }
            Output::Quiet => ProgressBar::hidden(),
        };
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let state = state.clone();
            let bar = bar.clone();
            let running = running.clone();
            thread::spawn(move || {
                let tick = Duration::from_millis(timeouts::PROGRESS_TICK_MS);
                while running.load(Ordering::SeqCst) {
                    bar.set_message(render_line(
                        state.name(),
                        state.moved(),
                        state.size(),
                        state.elapsed(),
                    ));
                    thread::park_timeout(tick);
                }
            })
        };

        Self {
            state,
            bar,
            running,
            handle: Some(handle),
        }
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    /// Stop after a completed transfer; returns the transfer duration.
    pub fn finish(mut self) -> Duration {
        self.stop();
        let elapsed = self.state.elapsed();
        self.bar
            .finish_with_message(summary_line(self.state.name(), self.state.size(), elapsed));
        elapsed
    }

    /// Stop after a failed transfer.
    pub fn abort(mut self) {
        self.stop_broken();
    }

    fn stop(&mut self) {
        self.state.mark_finished();
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            h.thread().unpark();
            let _ = h.join();
        }
    }

    fn stop_broken(&mut self) {
        self.stop();
        self.bar.abandon_with_message(broken_line(
            self.state.name(),
            self.state.moved(),
            self.state.size(),
            self.state.elapsed(),
        ));
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop_broken();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_cells_floor_and_clamp() {
        assert_eq!(bar_cells(0, 100, 30), 0);
        assert_eq!(bar_cells(50, 100, 30), 15);
        assert_eq!(bar_cells(99, 100, 30), 29);
        assert_eq!(bar_cells(100, 100, 30), 30);
        assert_eq!(bar_cells(150, 100, 30), 30);
    }

    #[test]
    fn zero_size_does_not_divide_by_zero() {
        assert_eq!(bar_cells(0, 0, 30), 30);
        let line = render_line("empty.txt", 0, 0, Duration::ZERO);
        assert!(line.contains(&"=".repeat(30)));
    }

    #[test]
    fn render_line_is_deterministic() {
        let line = render_line("temp.txt", 4096, 8192, Duration::from_millis(1500));
        assert_eq!(
            line,
            format!(
                "temp.txt |{}{}| 4096/8192 B 1.5s",
                "=".repeat(15),
                " ".repeat(15)
            )
        );
    }

    #[test]
    fn summary_includes_rate() {
        let line = summary_line("a.bin", 2048, Duration::from_secs(2));
        assert!(line.contains("2048 B in 2.00s"));
        assert!(line.contains("1.00 KiB/s"));
    }

    #[test]
    fn broken_line_is_distinct() {
        let line = broken_line("a.bin", 10, 100, Duration::from_secs(1));
        assert!(line.contains("broken at 10/100 B"));
    }

    #[test]
    fn reporter_tracks_and_stops() {
        let reporter = ProgressReporter::start("x", 8192, Output::Quiet);
        reporter.state().advance(4096);
        reporter.state().advance(4096);
        assert_eq!(reporter.state().moved(), 8192);
        let elapsed = reporter.finish();
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn dropped_reporter_is_joined() {
        let reporter = ProgressReporter::start("y", 10, Output::Quiet);
        reporter.state().advance(3);
        drop(reporter);
    }
}
