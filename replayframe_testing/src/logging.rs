//! Serialised access to the global log capture.

use std::sync::{Mutex, MutexGuard, OnceLock};

use logtest::{Logger, Record};
use rstest::fixture;

/// Exclusive handle to the process-wide [`logtest::Logger`].
///
/// `logtest` installs a single global logger, so tests asserting on log output
/// take this handle to keep their records apart. Records left over from an
/// earlier holder are dropped on acquisition.
pub struct LoggerHandle {
    guard: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Acquire the global logger and discard any buffered records.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder panicked while holding the logger.
    #[must_use]
    pub fn new() -> Self {
        static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

        let logger = LOGGER.get_or_init(|| Mutex::new(Logger::start()));
        let mut guard = logger.lock().expect("logger poisoned");
        while guard.pop().is_some() {}
        Self { guard }
    }

    /// Drain every buffered record.
    pub fn drain(&mut self) -> Vec<Record> { std::iter::from_fn(|| self.guard.pop()).collect() }

    /// Drain the buffer and report whether any record at `level` contains
    /// `needle`.
    pub fn contains(&mut self, level: log::Level, needle: &str) -> bool {
        self.drain()
            .iter()
            .any(|record| record.level() == level && record.args().contains(needle))
    }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

impl std::ops::Deref for LoggerHandle {
    type Target = Logger;

    fn deref(&self) -> &Self::Target { &self.guard }
}

impl std::ops::DerefMut for LoggerHandle {
    fn deref_mut(&mut self) -> &mut Self::Target { &mut self.guard }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
