//! Thread-safe diagnostics sink
//!
//! A [`Diagnostics`] value is created once per run and handed to every
//! component by reference. Messages go to the `log` facade; a capturing sink
//! additionally keeps them in memory so callers can inspect what a run said.

use std::sync::Mutex;

/// Severity of a diagnostics message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warning,
}

/// A message recorded by a capturing sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: Severity,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    debug_enabled: bool,
    captured: Option<Mutex<Vec<Message>>>,
}

impl Diagnostics {
    /// Sink that only forwards to the `log` facade
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that also keeps every message in memory
    pub fn capturing() -> Self {
        Self {
            debug_enabled: true,
            captured: Some(Mutex::new(Vec::new())),
        }
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug_enabled = enabled;
        self
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if !self.debug_enabled {
            return;
        }
        log::debug!("{}", message.as_ref());
        self.record(Severity::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        log::info!("{}", message.as_ref());
        self.record(Severity::Info, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        log::warn!("{}", message.as_ref());
        self.record(Severity::Warning, message.as_ref());
    }

    /// Messages recorded so far (empty unless the sink is capturing)
    pub fn messages(&self) -> Vec<Message> {
        match &self.captured {
            Some(captured) => captured
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
            None => Vec::new(),
        }
    }

    /// Captured messages of one severity, text only
    pub fn texts(&self, severity: Severity) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.severity == severity)
            .map(|m| m.text)
            .collect()
    }

    fn record(&self, severity: Severity, text: &str) {
        if let Some(captured) = &self.captured {
            captured
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(Message {
                    severity,
                    text: text.to_string(),
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_capturing_sink_records_all_severities() {
        let diagnostics = Diagnostics::capturing();
        diagnostics.debug("d");
        diagnostics.info("i");
        diagnostics.warning("w");

        assert_eq!(diagnostics.messages().len(), 3);
        assert_eq!(diagnostics.texts(Severity::Warning), vec!["w".to_string()]);
    }

    #[test]
    fn test_debug_is_dropped_when_disabled() {
        let diagnostics = Diagnostics::capturing().with_debug(false);
        diagnostics.debug("hidden");
        diagnostics.info("shown");
        assert_eq!(diagnostics.texts(Severity::Debug), Vec::<String>::new());
        assert_eq!(diagnostics.texts(Severity::Info), vec!["shown".to_string()]);
    }

    #[test]
    fn test_concurrent_writers() {
        let diagnostics = Diagnostics::capturing();
        thread::scope(|scope| {
            for i in 0..4 {
                let diagnostics = &diagnostics;
                scope.spawn(move || {
                    for j in 0..25 {
                        diagnostics.info(format!("{i}-{j}"));
                    }
                });
            }
        });
        assert_eq!(diagnostics.messages().len(), 100);
    }
}
