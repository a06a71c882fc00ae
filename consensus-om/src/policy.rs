//! Lying policy and protocol sentinels.
//!
//! A node may be configured to lie: on each outbound consensus value it
//! independently decides, with a configured probability, to substitute a
//! deterministic corruption of the value.  Lying happens only at emission
//! time (root broadcast and upward reports), never on receipt, so a
//! node's lies are observable to its peers while its own bookkeeping
//! stays consistent.

use rand::Rng;

/// Value substituted for a child that misses its round deadline, and the
/// output of a majority tie.  Identical on every node in a deployment.
pub const DEFAULT_SENTINEL: &str = "?";

/// Deterministic lie for a value: the first character replaced by `'!'`.
/// An empty value becomes `"!"`.
pub fn lie_substitute(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        None => "!".to_string(),
        Some(_) => format!("!{}", chars.as_str()),
    }
}

/// Process-wide lying policy: the percentage of outbound values that get
/// substituted.  Zero means always truthful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LyingPolicy {
    percent: u8,
}

impl LyingPolicy {
    /// A policy that never lies.
    pub fn truthful() -> Self {
        Self { percent: 0 }
    }

    /// A policy lying with the given probability, clamped to 0..=100.
    pub fn new(percent: u8) -> Self {
        Self {
            percent: percent.min(100),
        }
    }

    /// The configured lie percentage.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Apply the policy to one outbound value, drawing independently.
    pub fn apply(&self, value: &str, rng: &mut impl Rng) -> String {
        if self.percent > 0 && rng.gen_range(0..100) < self.percent {
            lie_substitute(value)
        } else {
            value.to_string()
        }
    }
}
