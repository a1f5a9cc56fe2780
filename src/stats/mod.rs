//! Statistics and metrics for relay instances

pub mod metrics;

pub use metrics::{RelayMetrics, RelayStats};
