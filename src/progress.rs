//! Terminal progress for interactive scans, using indicatif.
//!
//! Two phases are reported:
//!
//! - `walking`: spinner with a running entry count (the total is unknown)
//! - `hashing`: bar over the files pending a digest when the pass started
//!
//! Scheduled runs pass no callback at all; `voltrack scan` only creates a
//! [`Progress`] when stderr is a terminal and `-q` wasn't given.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Walk phase name.
pub const PHASE_WALKING: &str = "walking";
/// Hash pass phase name.
pub const PHASE_HASHING: &str = "hashing";

/// Receives progress updates from the scanner and the hash pass.
pub trait ProgressCallback: Send + Sync {
    /// A phase starts; `total` is 0 when unknown.
    fn on_phase_start(&self, phase: &str, total: usize);

    /// One more item processed.
    fn on_progress(&self, current: usize, path: &str);

    /// Bytes processed by the last item.
    fn on_item_completed(&self, _bytes: u64) {}

    /// The phase is over.
    fn on_phase_end(&self, phase: &str);
}

/// indicatif-backed reporter.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress {
    /// Create a reporter drawing to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
        }
    }

    fn walking_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} entries")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn hashing_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn with_active(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(active) = self.active.lock() {
            if let Some(pb) = active.as_ref() {
                f(pb);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        let pb = if phase == PHASE_WALKING {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::walking_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::hashing_style());
            pb
        };
        pb.set_message(phase.to_string());

        if let Ok(mut active) = self.active.lock() {
            if let Some(previous) = active.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        self.with_active(|pb| {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(path, 40));
        });
    }

    fn on_phase_end(&self, phase: &str) {
        if let Ok(mut active) = self.active.lock() {
            if let Some(pb) = active.take() {
                pb.finish_with_message(format!("{phase} complete"));
            }
        }
    }
}

/// Shorten a path to its file name when it doesn't fit.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let chars: Vec<char> = file_name.chars().collect();
    if chars.len() + 4 > max_len {
        let tail: String = chars[chars.len().saturating_sub(max_len.saturating_sub(3))..]
            .iter()
            .collect();
        return format!("...{tail}");
    }
    format!(".../{file_name}")
}
