use std::net::IpAddr;

use thiserror::Error;

/// Tuning knobs for a [`crate::dispatcher::Dispatcher`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Seconds an unmatched TSval may wait for its echo. Should be
    /// longer than both the largest time between TSval ticks and the
    /// longest queue wait packets are expected to see.
    pub tsval_max_age: f64,
    /// Seconds of silence before a flow is forgotten.
    pub flow_max_idle: f64,
    /// Seconds between summary reports; 0 disables them.
    pub summary_interval: f64,
    /// Hard cap on tracked flow directions.
    pub max_flows: usize,
    /// When set, passive pings terminating at this address (local
    /// host applications) are not tracked.
    pub local_addr: Option<IpAddr>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tsval_max_age: 10.0,
            flow_max_idle: 300.0,
            summary_interval: 10.0,
            max_flows: 10_000,
            local_addr: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    #[error("tsvalMaxAge must be a positive number of seconds, got {0}")]
    TsvalMaxAge(f64),
    #[error("flowMaxIdle must be a positive number of seconds, got {0}")]
    FlowMaxIdle(f64),
    #[error("sumInt must not be negative, got {0}")]
    SummaryInterval(f64),
    #[error("maxFlows must be nonzero")]
    MaxFlows,
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(self.tsval_max_age > 0.0) {
            return Err(SettingsError::TsvalMaxAge(self.tsval_max_age));
        }
        if !(self.flow_max_idle > 0.0) {
            return Err(SettingsError::FlowMaxIdle(self.flow_max_idle));
        }
        if !(self.summary_interval >= 0.0) {
            return Err(SettingsError::SummaryInterval(self.summary_interval));
        }
        if self.max_flows == 0 {
            return Err(SettingsError::MaxFlows);
        }
        Ok(())
    }
}
