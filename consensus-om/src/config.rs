//! OM consensus configuration.
//!
//! Defines round timing and recursion-depth parameters for the Oral
//! Messages protocol.

use std::time::Duration;

/// Configuration for the OM consensus engine.
///
/// All timeouts are in milliseconds.  Round timeouts grow linearly with
/// the recursion level so that deeper sub-rounds have time to complete
/// before their parents give up on them.
#[derive(Debug, Clone)]
pub struct OmConfig {
    /// Base round timeout in milliseconds.  A round at recursion level
    /// `om` waits `base * (om + 1)` before substituting defaults for
    /// missing child votes.
    /// Default: 5000.
    pub round_timeout_base_ms: u64,

    /// Upper bound on tolerated Byzantine peers, subtracted from the peer
    /// count when choosing the root recursion depth:
    /// `om = peer_count - fault_bound` (saturating at zero).
    /// Default: 1.
    pub fault_bound: usize,

    /// How long a resolved round is retained past its deadline before the
    /// sweep garbage-collects it.  Late reports inside the grace window
    /// are recognisably dropped rather than treated as unknown rounds.
    /// Default: 5000.
    pub sweep_grace_ms: u64,
}

impl Default for OmConfig {
    fn default() -> Self {
        Self {
            round_timeout_base_ms: 5_000,
            fault_bound: 1,
            sweep_grace_ms: 5_000,
        }
    }
}

impl OmConfig {
    /// Timeout for a round at the given recursion level.
    pub fn round_timeout(&self, om: u32) -> Duration {
        Duration::from_millis(
            self.round_timeout_base_ms
                .saturating_mul(u64::from(om).saturating_add(1)),
        )
    }

    /// Recursion depth for a root round started against `peer_count`
    /// known peers.
    pub fn om_depth(&self, peer_count: usize) -> u32 {
        peer_count.saturating_sub(self.fault_bound) as u32
    }

    /// Grace period applied after a round's deadline before collection.
    pub fn sweep_grace(&self) -> Duration {
        Duration::from_millis(self.sweep_grace_ms)
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), OmConfigError> {
        if self.round_timeout_base_ms == 0 {
            return Err(OmConfigError::InvalidRoundTimeout);
        }
        Ok(())
    }

    /// Create a config suitable for local testing with short timeouts.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            round_timeout_base_ms: 200,
            fault_bound: 1,
            sweep_grace_ms: 200,
        }
    }
}

/// Errors in OM configuration.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OmConfigError {
    #[error("round_timeout_base_ms must be > 0")]
    InvalidRoundTimeout,
}
