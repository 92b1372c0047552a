use std::time::Duration;

use tagline_core::ALL_NOTES;

/// Default quiescence window for the debounced tag refresh, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Configuration for a tag session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Parent scope identifying the note collection.
    pub parent: String,
    /// Quiescence window for size-change driven refreshes.
    pub debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            parent: ALL_NOTES.to_string(),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl SessionConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TAGLINE_PARENT` | `notes/-` | Note collection scope |
    /// | `TAGLINE_DEBOUNCE_MS` | `300` | Refresh quiescence window |
    pub fn from_env() -> Self {
        let parent = std::env::var("TAGLINE_PARENT").unwrap_or_else(|_| ALL_NOTES.to_string());
        let debounce_ms = std::env::var("TAGLINE_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        Self {
            parent,
            debounce: Duration::from_millis(debounce_ms),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}
