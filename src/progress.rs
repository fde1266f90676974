//! Progress reporting

/// Wraps the caller's progress callback.
///
/// Within one strategy attempt reported percentages never go backwards;
/// `begin_attempt` resets the floor so the next strategy can start low.
pub struct Progress<'a> {
    callback: &'a mut dyn FnMut(u8, &str),
    floor: u8,
}

impl<'a> Progress<'a> {
    pub fn new(callback: &'a mut dyn FnMut(u8, &str)) -> Self {
        Self { callback, floor: 0 }
    }

    /// Reports progress, clamped to `floor..=100`
    pub fn report(&mut self, percent: u8, message: &str) {
        let percent = percent.min(100).max(self.floor);
        self.floor = percent;
        log::info!("[{:>3}%] {}", percent, message);
        (self.callback)(percent, message);
    }

    /// Reports at the current percentage
    pub fn note(&mut self, message: &str) {
        let percent = self.floor;
        self.report(percent, message);
    }

    /// Reports a failed attempt at 0%
    pub fn failure(&mut self, message: &str) {
        log::warn!("{}", message);
        (self.callback)(0, message);
    }

    /// Starts a new attempt with its own 0-100 range
    pub fn begin_attempt(&mut self) {
        self.floor = 0;
    }
}

/// Records progress events, handy for callers that show the full trail
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressLog {
    pub events: Vec<(u8, String)>,
}

impl ProgressLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, percent: u8, message: &str) {
        self.events.push((percent, message.to_string()));
    }

    /// Messages reported at 0%
    pub fn failures(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|(p, _)| *p == 0)
            .map(|(_, m)| m.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_within_attempt() {
        let mut log = ProgressLog::new();
        {
            let mut callback = |p: u8, m: &str| log.record(p, m);
            let mut progress = Progress::new(&mut callback);
            progress.report(30, "a");
            progress.report(10, "b");
            progress.report(120, "c");
            progress.failure("failed");
            progress.begin_attempt();
            progress.report(5, "d");
        }
        let percents: Vec<u8> = log.events.iter().map(|(p, _)| *p).collect();
        assert_eq!(percents, vec![30, 30, 100, 0, 5]);
        assert_eq!(log.failures(), vec!["failed"]);
    }
}
