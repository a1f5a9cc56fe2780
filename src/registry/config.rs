//! Relay configuration

use std::time::Duration;

/// Relay instance configuration options
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Name used in logs
    pub name: String,

    /// Initial capacity of the listener table
    pub listener_capacity: usize,

    /// Initial capacity of each connection's handle list
    pub handles_per_connection: usize,

    /// How often the reaper looks for closed connections
    pub reap_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: "relay".to_string(),
            listener_capacity: 64,
            handles_per_connection: 2,
            reap_interval: Duration::from_secs(30),
        }
    }
}

impl RelayConfig {
    /// Create a default config with a custom name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the initial listener table capacity
    pub fn listener_capacity(mut self, capacity: usize) -> Self {
        self.listener_capacity = capacity;
        self
    }

    /// Set the initial per-connection handle capacity
    pub fn handles_per_connection(mut self, capacity: usize) -> Self {
        self.handles_per_connection = capacity;
        self
    }

    /// Set the reaper interval
    pub fn reap_interval(mut self, interval: Duration) -> Self {
        // tokio intervals panic on zero periods
        self.reap_interval = interval.max(Duration::from_millis(1));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.name, "relay");
        assert_eq!(config.listener_capacity, 64);
        assert_eq!(config.handles_per_connection, 2);
        assert_eq!(config.reap_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_named() {
        let config = RelayConfig::named("front");

        assert_eq!(config.name, "front");
        assert_eq!(config.listener_capacity, 64);
    }

    #[test]
    fn test_builder_reap_interval_floor() {
        let config = RelayConfig::default().reap_interval(Duration::ZERO);

        assert_eq!(config.reap_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::default()
            .name("virtual")
            .listener_capacity(8)
            .handles_per_connection(4)
            .reap_interval(Duration::from_secs(5));

        assert_eq!(config.name, "virtual");
        assert_eq!(config.listener_capacity, 8);
        assert_eq!(config.handles_per_connection, 4);
        assert_eq!(config.reap_interval, Duration::from_secs(5));
    }
}
