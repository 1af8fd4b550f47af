//! Progress reporting and cooperative cancellation
//!
//! Long running loops report through a [`Progress`]. The wrapped callback
//! receives the overall completion fraction and a message, and returns `false`
//! to request cancellation, which surfaces as [`GdalVecError::UserInterrupt`].

use crate::errors::{GdalVecError, Result};

/// Callback signature: `(fraction_done, message) -> continue?`
pub type ProgressCallback<'a> = &'a mut dyn FnMut(f64, &str) -> bool;

/// A progress sink covering the `[start, end]` slice of a parent operation.
pub struct Progress<'a> {
    callback: Option<ProgressCallback<'a>>,
    start: f64,
    end: f64,
}

impl<'a> Progress<'a> {
    pub fn new(callback: ProgressCallback<'a>) -> Self {
        Progress {
            callback: Some(callback),
            start: 0.0,
            end: 1.0,
        }
    }

    /// A sink that never cancels.
    pub fn none() -> Self {
        Progress {
            callback: None,
            start: 0.0,
            end: 1.0,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.callback.is_none()
    }

    /// Report `fraction` (0 to 1) of this slice as done.
    ///
    /// Returns [`GdalVecError::UserInterrupt`] when the callback declines to continue.
    pub fn report(&mut self, fraction: f64, msg: &str) -> Result<()> {
        let overall = self.start + (self.end - self.start) * fraction.clamp(0.0, 1.0);
        if let Some(callback) = self.callback.as_mut() {
            if !callback(overall, msg) {
                return Err(GdalVecError::UserInterrupt);
            }
        }
        Ok(())
    }

    /// Sub-progress covering `[start, end]` of this slice.
    pub fn scaled(&mut self, start: f64, end: f64) -> Progress<'_> {
        let span = self.end - self.start;
        Progress {
            callback: match self.callback {
                Some(ref mut callback) => Some(&mut **callback),
                None => None,
            },
            start: self.start + span * start,
            end: self.start + span * end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_near;

    #[test]
    fn test_scaled_progress() {
        let mut seen = Vec::new();
        let mut cb = |f: f64, _: &str| {
            seen.push(f);
            true
        };
        let mut progress = Progress::new(&mut cb);
        progress.report(0.0, "").unwrap();
        {
            let mut sub = progress.scaled(0.5, 1.0);
            sub.report(0.5, "half of second half").unwrap();
            let mut subsub = sub.scaled(0.0, 0.5);
            subsub.report(1.0, "").unwrap();
        }
        progress.report(1.0, "").unwrap();
        drop(progress);

        assert_eq!(seen.len(), 4);
        assert_near!(seen[0], 0.0);
        assert_near!(seen[1], 0.75);
        assert_near!(seen[2], 0.75);
        assert_near!(seen[3], 1.0);
    }

    #[test]
    fn test_cancel() {
        let mut calls = 0;
        let mut cb = |_: f64, _: &str| {
            calls += 1;
            calls < 3
        };
        let mut progress = Progress::new(&mut cb);
        assert!(progress.report(0.1, "").is_ok());
        assert!(progress.report(0.2, "").is_ok());
        let err = progress.report(0.3, "").unwrap_err();
        assert!(err.is_user_interrupt());
    }

    #[test]
    fn test_choose_sink_at_runtime() {
        let mut calls = 0;
        let mut cb = |_: f64, _: &str| {
            calls += 1;
            true
        };
        for verbose in [true, false] {
            let mut progress = if verbose {
                Progress::new(&mut cb)
            } else {
                Progress::none()
            };
            progress.report(1.0, "").unwrap();
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_silent() {
        let mut progress = Progress::none();
        assert!(progress.is_silent());
        assert!(progress.scaled(0.0, 0.5).report(1.0, "").is_ok());
    }
}
