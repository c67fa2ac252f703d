//! Progress reporting for long imports and exports

/// Caller-supplied progress callback, receives a percentage in `0..=100`
pub type ProgressCallback<'a> = &'a mut dyn FnMut(u8);

/// Wraps an optional callback and enforces its contract:
/// percentages never decrease, never exceed 100, and are not repeated.
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
    last: Option<u8>,
    step: u8,
}

impl<'a> ProgressReporter<'a> {
    /// `step` is the minimum increase between two reports (clamped to `1..=100`)
    pub fn new(callback: Option<ProgressCallback<'a>>, step: u8) -> Self {
        Self {
            callback,
            last: None,
            step: step.clamp(1, 100),
        }
    }

    /// Reporter that drops every update
    pub fn silent() -> Self {
        Self::new(None, 100)
    }

    /// Report an absolute percentage
    pub fn report(&mut self, percent: u8) {
        let percent = percent.min(100);
        if let Some(last) = self.last
            && percent <= last
        {
            return;
        }
        self.last = Some(percent);
        if let Some(callback) = self.callback.as_mut() {
            callback(percent);
        }
    }

    /// Report `done` out of `total` units of work, mapped into `start..=end`.
    ///
    /// Updates smaller than the configured step are coalesced.
    pub fn report_fraction(&mut self, done: usize, total: usize, start: u8, end: u8) {
        let span = end.saturating_sub(start) as usize;
        let percent = if total == 0 {
            end
        } else {
            start + (span * done.min(total) / total) as u8
        };
        let due = match self.last {
            None => true,
            Some(last) => percent >= last.saturating_add(self.step) || percent == end,
        };
        if due {
            self.report(percent);
        }
    }

    /// Terminal report at 100
    pub fn finish(&mut self) {
        self.report(100);
    }
}
