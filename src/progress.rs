//! Progress reporting for the duplicate scan.
//!
//! The engine reports progress through the [`ProgressCallback`] trait so any
//! presentation layer can render it. [`Progress`] is a ready-made terminal
//! implementation built on indicatif.
//!
//! # Accessible Mode
//!
//! When accessible mode is enabled, bars use ASCII characters only and
//! carry no animation, which keeps screen readers quiet.

use std::sync::{Mutex, MutexGuard};

use indicatif::{ProgressBar, ProgressStyle};

/// Phase name reported while fingerprinting assets.
pub const PHASE_FINGERPRINT: &str = "fingerprint";

/// Progress callback for engine phases.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g. [`PHASE_FINGERPRINT`])
    /// * `total` - Total number of items to process
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Number of items finished so far
    /// * `item` - Identifier of the item just processed
    fn on_progress(&self, current: usize, item: &str);

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);
}

/// Terminal progress reporter using indicatif.
pub struct Progress {
    bar: Mutex<Option<ProgressBar>>,
    quiet: bool,
    accessible: bool,
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, nothing is displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use phototriage::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            quiet,
            accessible: false,
        }
    }

    /// Create a progress reporter with accessible mode.
    #[must_use]
    pub fn with_accessible(quiet: bool, accessible: bool) -> Self {
        Self {
            accessible,
            ..Self::new(quiet)
        }
    }

    /// Whether accessible mode is enabled.
    #[must_use]
    pub fn is_accessible(&self) -> bool {
        self.accessible
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn style(&self) -> ProgressStyle {
        if self.accessible {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
        } else {
            ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█>-")
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(self.style());
        pb.set_message(match phase {
            PHASE_FINGERPRINT => "Fingerprinting".to_string(),
            other => other.to_string(),
        });
        *self.lock() = Some(pb);
    }

    fn on_progress(&self, current: usize, item: &str) {
        if self.quiet {
            return;
        }
        if let Some(ref pb) = *self.lock() {
            pb.set_position(current as u64);
            pb.set_message(truncate_id(item, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(pb) = self.lock().take() {
            pb.finish_with_message(format!("{} complete", phase));
        }
    }
}

/// Shorten an asset identifier for display, keeping its tail.
fn truncate_id(id: &str, max_len: usize) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= max_len {
        return id.to_string();
    }
    let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
    format!("...{}", tail)
}
