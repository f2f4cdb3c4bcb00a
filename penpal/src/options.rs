//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout applied when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Per-client settings.
///
/// Deserializes from the same camelCase shape hosts use on the wire:
///
/// ```json
/// { "clientName": "dashboard", "timeoutMs": 2500 }
/// ```
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use penpal::ClientOptions;
///
/// let options = ClientOptions::new()
///     .with_client_name("dashboard")
///     .with_timeout(Duration::from_secs(1));
/// assert_eq!(options.timeout(), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    client_name: Option<String>,
    #[serde(rename = "timeoutMs", with = "millis")]
    timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_name: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ClientOptions {
    /// Defaults: generated client name, 5000 ms timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name carried in every request.
    pub fn with_client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    /// Set how long a request may stay unanswered.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured client name, if any.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_options_default() {
        let options = ClientOptions::default();
        assert_eq!(options.timeout(), Duration::from_millis(5000));
        assert_eq!(options.client_name(), None);
    }

    #[test]
    fn test_client_options_builder() {
        let options = ClientOptions::new()
            .with_client_name("dashboard")
            .with_timeout(Duration::from_millis(250));
        assert_eq!(options.client_name(), Some("dashboard"));
        assert_eq!(options.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_client_options_from_json() {
        let options: ClientOptions =
            serde_json::from_value(json!({"clientName": "ui", "timeoutMs": 1200})).unwrap();
        assert_eq!(options.client_name(), Some("ui"));
        assert_eq!(options.timeout(), Duration::from_millis(1200));

        let partial: ClientOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(partial, ClientOptions::default());
    }
}
