//! Progress counters for a checking run and the text progress reporter

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Width of the rendered bar, not counting the brackets
const BAR_WIDTH: usize = 50;

/// Default sampling interval of the reporter
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Counters shared between the workers of one run and its observers.
///
/// `checked` counts dequeued items, `available` counts passing items.
/// Both only ever grow, and `available <= checked <= total`.
#[derive(Debug)]
pub struct Progress {
    total: usize,
    checked: AtomicUsize,
    available: AtomicUsize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            checked: AtomicUsize::new(0),
            available: AtomicUsize::new(0),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn checked(&self) -> usize {
        self.checked.load(Ordering::Relaxed)
    }

    pub fn available(&self) -> usize {
        self.available.load(Ordering::Relaxed)
    }

    pub(crate) fn record_checked(&self) {
        self.checked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_available(&self) {
        self.available.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            checked: self.checked(),
            available: self.available(),
            total: self.total,
        }
    }
}

/// Point-in-time copy of [`Progress`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub checked: usize,
    pub available: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    /// Completion percentage, `None` for an empty run
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.checked as f64 / self.total as f64 * 100.0)
    }

    pub fn is_complete(&self) -> bool {
        self.checked >= self.total
    }
}

/// Render one progress line, or nothing for an empty run
pub fn render_bar(snapshot: &ProgressSnapshot) -> Option<String> {
    let percent = snapshot.percent()?;
    let filled = ((percent / 2.0) as usize).min(BAR_WIDTH);
    let bar = format!("{}>", "=".repeat(filled));

    Some(format!(
        "Progress: [{:<width$}] {:.1}% ({}/{}) available: {}",
        bar,
        percent,
        snapshot.checked,
        snapshot.total,
        snapshot.available,
        width = BAR_WIDTH + 1
    ))
}

/// Background task redrawing the progress line on stderr.
///
/// It only reads the counters and never holds up the workers.
pub struct ProgressReporter {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub fn spawn(progress: Arc<Progress>, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        draw(&progress.snapshot());
                        eprintln!();
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        draw(&progress.snapshot());
                    }
                }
            }
        });

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    /// Draw the final frame and wait for the reporter to exit
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = self.handle.await {
            tracing::debug!("Progress reporter exited abnormally: {}", e);
        }
    }
}

fn draw(snapshot: &ProgressSnapshot) {
    if let Some(line) = render_bar(snapshot) {
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r{}", line);
        let _ = stderr.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_counters() {
        let progress = Progress::new(3);
        progress.record_checked();
        progress.record_checked();
        progress.record_available();

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.checked, 2);
        assert_eq!(snapshot.available, 1);
        assert_eq!(snapshot.total, 3);
        assert!(!snapshot.is_complete());
    }

    #[test]
    fn test_percent_guards_empty_run() {
        let snapshot = Progress::new(0).snapshot();
        assert_eq!(snapshot.percent(), None);
        assert_eq!(render_bar(&snapshot), None);
    }

    #[test]
    fn test_render_bar_half() {
        let snapshot = ProgressSnapshot {
            checked: 2,
            available: 1,
            total: 4,
        };
        let line = render_bar(&snapshot).unwrap();
        assert!(line.starts_with("Progress: [=========================>"));
        assert!(line.ends_with("] 50.0% (2/4) available: 1"));
    }

    #[test]
    fn test_render_bar_full_stays_bounded() {
        let snapshot = ProgressSnapshot {
            checked: 10,
            available: 10,
            total: 10,
        };
        let line = render_bar(&snapshot).unwrap();
        let bar = &line[line.find('[').unwrap() + 1..line.find(']').unwrap()];
        assert_eq!(bar.chars().count(), BAR_WIDTH + 1);
        assert!(line.contains("100.0% (10/10)"));
    }

    #[tokio::test]
    async fn test_reporter_stops() {
        let progress = Arc::new(Progress::new(0));
        let reporter = ProgressReporter::spawn(Arc::clone(&progress), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        reporter.stop().await;
    }
}
