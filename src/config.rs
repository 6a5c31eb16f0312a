//! Runtime configuration, validated the way async-raft's `Config::build()`
//! validates its tunables before a `Raft` instance is constructed.

use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ConfigError {
    #[error("election_timeout_min_ms ({min}) must be less than election_timeout_max_ms ({max})")]
    ElectionTimeoutOrder { min: u64, max: u64 },

    #[error(
        "heartbeat_interval_ms ({heartbeat}) must leave room for at least one heartbeat \
         before election_timeout_min_ms ({min}) elapses"
    )]
    HeartbeatTooSlow { heartbeat: u64, min: u64 },

    #[error("catchup_batch_size must be non-zero")]
    ZeroCatchupBatch,

    #[error("max_allowed_shipping_lag must be non-zero")]
    ZeroShippingLag,
}

/// Tunable parameters governing timers and batching.
#[derive(Clone, Debug)]
pub struct Config {
    /// Lower bound, in milliseconds, of the randomized election timeout.
    pub election_timeout_min_ms: u64,
    /// Upper bound, in milliseconds, of the randomized election timeout.
    pub election_timeout_max_ms: u64,
    /// Interval between heartbeats sent by the leader to an idle follower.
    pub heartbeat_interval_ms: u64,
    /// Maximum number of entries shipped in a single catch-up batch.
    pub catchup_batch_size: u64,
    /// Once a follower falls this far behind the leader's log, new entries
    /// stop being streamed until it catches up via bulk catch-up.
    pub max_allowed_shipping_lag: u64,
    /// Interval, in milliseconds, between probe retransmissions while a
    /// follower's shipper is in the MISMATCH state.
    pub retry_time_millis: u64,
}

impl Config {
    /// Construct a `Config` with the defaults used throughout this crate's
    /// test suite and documentation.
    pub fn build() -> Self {
        Self {
            election_timeout_min_ms: 400,
            election_timeout_max_ms: 800,
            heartbeat_interval_ms: 150,
            catchup_batch_size: 64,
            max_allowed_shipping_lag: 256,
            retry_time_millis: 150,
        }
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err(ConfigError::ElectionTimeoutOrder {
                min: self.election_timeout_min_ms,
                max: self.election_timeout_max_ms,
            });
        }
        if self.heartbeat_interval_ms * 2 >= self.election_timeout_min_ms {
            return Err(ConfigError::HeartbeatTooSlow {
                heartbeat: self.heartbeat_interval_ms,
                min: self.election_timeout_min_ms,
            });
        }
        if self.catchup_batch_size == 0 {
            return Err(ConfigError::ZeroCatchupBatch);
        }
        if self.max_allowed_shipping_lag == 0 {
            return Err(ConfigError::ZeroShippingLag);
        }
        Ok(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Config::build().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_timeout_bounds() {
        let mut cfg = Config::build();
        cfg.election_timeout_min_ms = 800;
        cfg.election_timeout_max_ms = 400;
        assert_eq!(
            cfg.validate().unwrap_err(),
            ConfigError::ElectionTimeoutOrder { min: 800, max: 400 }
        );
    }

    #[test]
    fn rejects_slow_heartbeat() {
        let mut cfg = Config::build();
        cfg.heartbeat_interval_ms = 300;
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::HeartbeatTooSlow { .. }
        ));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let mut cfg = Config::build();
        cfg.catchup_batch_size = 0;
        assert_eq!(cfg.validate().unwrap_err(), ConfigError::ZeroCatchupBatch);
    }
}
