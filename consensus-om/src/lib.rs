//! omesh OM Consensus Engine
//!
//! This crate implements the recursive Oral Messages (OM) Byzantine
//! agreement protocol over a tiny five-word replicated database.  A root
//! node proposes a value for one database index; every participant relays
//! the value it heard to the remaining participants through sub-rounds of
//! strictly decreasing depth, then takes a strict majority over everything
//! it learned.  An honest majority converges on one value per round even
//! when some nodes lie in their reports.
//!
//! # Key properties
//!
//! - **Deterministic engine**: given the same sequence of messages and
//!   clock readings, the engine produces the same state transitions and
//!   output messages.  All I/O and timekeeping is handled externally; this
//!   crate is pure state-machine logic.
//! - **Tree-shaped correlation**: in-flight rounds live in a flat table
//!   keyed by round id with parent linkage by id only, so garbage
//!   collection is a sweep and there is no cyclic-reference management.
//! - **Partial-failure tolerance**: every round carries a deadline; child
//!   votes that never arrive are substituted with a fixed sentinel and the
//!   round resolves anyway.
//! - **Observable lying**: a node's lying policy is applied only when a
//!   value is *emitted* (root broadcast, upward report), never on receipt,
//!   so lies are visible to peers while local bookkeeping stays coherent.
//!
//! # Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | `OmConfig` timing/depth parameters and dev overrides |
//! | [`types`]  | Wire-level consensus messages and round-id generation |
//! | [`policy`] | Lying policy and the default/lie sentinels |
//! | [`state`]  | Round table: child votes, deadlines, majority decision |
//! | [`engine`] | The OM state machine driving rounds end to end |

pub mod config;
pub mod engine;
pub mod policy;
pub mod state;
pub mod types;

pub use config::{OmConfig, OmConfigError};
pub use engine::{EngineOutput, OmEngine, StartError, WordWrite};
pub use policy::{lie_substitute, LyingPolicy, DEFAULT_SENTINEL};
pub use state::{RecordChild, RoundNode, RoundTable};
pub use types::{generate_round_id, ConsensusMessage, PeerKey, RoundId, WORD_COUNT};
