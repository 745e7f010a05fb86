//! Diagnostic listeners attached to a scanner instance.
//!
//! Applications that want library diagnostics in their own log pipeline
//! register a listener on the [`LogListeners`] handle passed to the scanner.
//! Each scanner owns its own registry; nothing here is process-global.
//! Every record is also forwarded to `tracing`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

/// Severity of a diagnostic record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Verbose,
    #[default]
    Info,
    Warning,
    Error,
}

/// One diagnostic message.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Component that produced the record, e.g. the device address.
    pub ident: String,
    pub level: LogLevel,
    pub timestamp: SystemTime,
    pub message: String,
}

/// Handle returned by [`LogListeners::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&LogRecord) + Send + Sync>;

struct Registry {
    next_id: u64,
    threshold: LogLevel,
    listeners: Vec<(ListenerId, Listener)>,
}

/// Shared registry of diagnostic listeners.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct LogListeners {
    inner: Arc<Mutex<Registry>>,
}

impl Default for LogListeners {
    fn default() -> Self {
        Self::new(LogLevel::default())
    }
}

impl std::fmt::Debug for LogListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("LogListeners")
            .field("threshold", &registry.threshold)
            .field("listeners", &registry.listeners.len())
            .finish()
    }
}

impl LogListeners {
    /// Creates an empty registry that drops records below `threshold`.
    pub fn new(threshold: LogLevel) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry { next_id: 0, threshold, listeners: Vec::new() })),
        }
    }

    /// Registers a listener and returns its id.
    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&LogRecord) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if the id was unknown.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(listener_id, _)| *listener_id != id);
        registry.listeners.len() != before
    }

    pub fn threshold(&self) -> LogLevel {
        self.lock().threshold
    }

    pub fn set_threshold(&self, threshold: LogLevel) {
        self.lock().threshold = threshold;
    }

    /// Delivers a record to every listener and to `tracing`.
    pub fn emit(&self, ident: &str, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => trace!("[{}] {}", ident, message),
            LogLevel::Verbose => debug!("[{}] {}", ident, message),
            LogLevel::Info => info!("[{}] {}", ident, message),
            LogLevel::Warning => warn!("[{}] {}", ident, message),
            LogLevel::Error => error!("[{}] {}", ident, message),
        }

        let listeners: Vec<Listener> = {
            let registry = self.lock();
            if level < registry.threshold {
                return;
            }
            registry.listeners.iter().map(|(_, listener)| Arc::clone(listener)).collect()
        };
        if listeners.is_empty() {
            return;
        }

        let record =
            LogRecord { ident: ident.to_string(), level, timestamp: SystemTime::now(), message };
        for listener in listeners {
            listener(&record);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting(listeners: &LogListeners) -> (ListenerId, Arc<Mutex<Vec<LogRecord>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = listeners.add(move |record| sink.lock().unwrap().push(record.clone()));
        (id, seen)
    }

    #[test]
    fn registries_are_independent() {
        let first = LogListeners::new(LogLevel::Debug);
        let second = LogListeners::new(LogLevel::Debug);
        let (_, first_seen) = collecting(&first);
        let (_, second_seen) = collecting(&second);

        first.emit("scanner-a", LogLevel::Info, "connected");

        assert_eq!(first_seen.lock().unwrap().len(), 1);
        assert!(second_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn records_below_threshold_are_dropped() {
        let listeners = LogListeners::new(LogLevel::Warning);
        let (_, seen) = collecting(&listeners);

        listeners.emit("scanner", LogLevel::Info, "ignored");
        listeners.emit("scanner", LogLevel::Error, "kept");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message, "kept");
        assert_eq!(seen[0].level, LogLevel::Error);
        assert_eq!(seen[0].ident, "scanner");
    }

    #[test]
    fn removed_listener_stops_receiving() {
        let listeners = LogListeners::new(LogLevel::Debug);
        let (id, seen) = collecting(&listeners);

        listeners.emit("scanner", LogLevel::Info, "one");
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.emit("scanner", LogLevel::Info, "two");

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn clones_share_the_registry() {
        let listeners = LogListeners::new(LogLevel::Debug);
        let clone = listeners.clone();
        let (_, seen) = collecting(&listeners);

        clone.set_threshold(LogLevel::Error);
        listeners.emit("scanner", LogLevel::Warning, "dropped");
        clone.emit("scanner", LogLevel::Error, "kept");

        assert_eq!(listeners.threshold(), LogLevel::Error);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
