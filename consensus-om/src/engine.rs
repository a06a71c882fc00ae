//! The OM consensus state machine.
//!
//! Drives rounds end to end: root starts, downward propagation through
//! sub-rounds of decreasing depth, upward report aggregation, majority
//! resolution, and deadline sweeps.  The engine is deterministic: given
//! the same message sequence and clock readings it always produces the
//! same transitions and output messages.  All sockets and timers are
//! handled externally; entry points take `now` explicitly and return an
//! [`EngineOutput`] describing what the caller should send and write.
//!
//! ## Round correlation
//!
//! Rounds are shared by id between the node that broadcast them and every
//! recipient.  A node receiving `forward{id, parentid, om, value}`:
//!
//! - opens round `id` with one pending child per peer not yet on the
//!   branch path;
//! - at `om == 0` (or with nobody left to ask) resolves immediately and
//!   reports straight back to the forwarder;
//! - otherwise relays the value untouched through one broadcast with a
//!   fresh id and `parentid = id`, at `om - 1`.
//!
//! Every remaining participant of round `P` relays `P` the same way, so
//! each of them owns exactly one sub-round identity carrying
//! `parentid = P`.  That identity is what the others gather against:
//! when a node resolves a round it received from peer `L`, the result is
//! filed locally as its vote on `L` inside the enclosing round named by
//! `parentid`, and one report travels back to `L` carrying
//! `parentid = <the resolved round's id>`.  At the round's originator
//! those reports fill the pending children (the only way the root
//! initiator learns anything at all, since sub-round paths exclude it);
//! at every other node the children fill through the local gathering, and
//! a report addressed to a relay id this node broadcast finds no round
//! in the table and drops under the unknown-round rule.

use {
    crate::{
        config::OmConfig,
        policy::{LyingPolicy, DEFAULT_SENTINEL},
        state::{RecordChild, RoundNode, RoundTable},
        types::{generate_round_id, ConsensusMessage, PeerKey, RoundId, WORD_COUNT},
    },
    log::{debug, info},
    rand::{rngs::StdRng, SeedableRng},
    std::time::Instant,
};

/// A committed write to the local word database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordWrite {
    pub index: usize,
    pub value: String,
}

/// Result of processing one consensus event.
#[derive(Debug, Default)]
pub struct EngineOutput {
    /// Messages to send, addressed by peer key.
    pub outbound: Vec<(PeerKey, ConsensusMessage)>,
    /// Database writes from resolved root-shaped rounds.
    pub writes: Vec<WordWrite>,
}

impl EngineOutput {
    fn empty() -> Self {
        Self::default()
    }
}

/// Errors starting a root round.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("index {0} out of range (0..{max})", max = WORD_COUNT - 1)]
    IndexOutOfRange(usize),
}

/// The OM consensus engine.
pub struct OmEngine {
    config: OmConfig,
    identity: PeerKey,
    table: RoundTable,
    policy: LyingPolicy,
    rng: StdRng,
}

impl OmEngine {
    /// Create a new engine.  The lying RNG is seeded from OS entropy.
    pub fn new(config: OmConfig, identity: PeerKey) -> Self {
        Self {
            config,
            identity,
            table: RoundTable::new(),
            policy: LyingPolicy::truthful(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Create an engine with a fixed RNG seed, for deterministic tests.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn with_seed(config: OmConfig, identity: PeerKey, seed: u64) -> Self {
        Self {
            config,
            identity,
            table: RoundTable::new(),
            policy: LyingPolicy::truthful(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// This node's peer key.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn policy(&self) -> LyingPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: LyingPolicy) {
        info!("lying policy set to {}%", policy.percent());
        self.policy = policy;
    }

    /// Number of rounds currently tracked.
    pub fn round_count(&self) -> usize {
        self.table.len()
    }

    // ── Entry points ────────────────────────────────────────────────────

    /// Start a root round proposing `value` for `index`, asking every
    /// peer in `peers`.  Returns the new round id and the forwards to
    /// send.  With no peers the round resolves immediately to this
    /// node's own proposed value.
    pub fn start_root(
        &mut self,
        index: usize,
        value: &str,
        peers: &[PeerKey],
        now: Instant,
    ) -> Result<(RoundId, EngineOutput), StartError> {
        if index >= WORD_COUNT {
            return Err(StartError::IndexOutOfRange(index));
        }

        let om = self.config.om_depth(peers.len());
        let id = generate_round_id(&self.identity, &mut self.rng);
        let own_value = self.policy.apply(value, &mut self.rng);

        let node = RoundNode {
            id: id.clone(),
            parentid: String::new(),
            om,
            index,
            value_received: own_value,
            origin: self.identity.clone(),
            path: vec![self.identity.clone()],
            forwarder: None,
            children: peers.iter().map(|p| (p.clone(), None)).collect(),
            deadline: now + self.config.round_timeout(om),
            result: None,
        };
        self.table.add_round(node);

        let mut out = EngineOutput::empty();
        for peer in peers {
            // Each recipient gets its own lie draw: a Byzantine node may
            // tell different peers different values.
            let sent = self.policy.apply(value, &mut self.rng);
            out.outbound.push((
                peer.clone(),
                ConsensusMessage::Forward {
                    id: id.clone(),
                    parentid: String::new(),
                    om,
                    index,
                    value: sent,
                    origin: self.identity.clone(),
                    path: vec![self.identity.clone()],
                },
            ));
        }
        info!(
            "started root round {id} (index={index}, om={om}, {} peers)",
            peers.len()
        );

        if peers.is_empty() {
            self.resolve_cascade(id.clone(), &mut out);
        }
        Ok((id, out))
    }

    /// Process one inbound consensus message from `sender`.
    pub fn handle_message(
        &mut self,
        msg: ConsensusMessage,
        sender: &str,
        peers: &[PeerKey],
        now: Instant,
    ) -> EngineOutput {
        match msg {
            ConsensusMessage::Forward {
                id,
                parentid,
                om,
                index,
                value,
                origin,
                path,
            } => self.handle_forward(id, parentid, om, index, value, origin, path, sender, peers, now),
            ConsensusMessage::Report {
                parentid,
                reporter,
                value,
                ..
            } => self.handle_report(&parentid, &reporter, value, sender),
        }
    }

    /// Substitute defaults for children of past-deadline rounds and
    /// resolve them, then collect rounds past their grace window.
    pub fn sweep(&mut self, now: Instant) -> EngineOutput {
        let mut out = EngineOutput::empty();
        for id in self.table.deadline_expired(now) {
            if let Some(round) = self.table.find_round_mut(&id) {
                let missing = round.pending_children().len();
                if missing > 0 {
                    debug!("round {id} deadline passed with {missing} children missing");
                }
                for slot in round.children.values_mut() {
                    if slot.is_none() {
                        *slot = Some(DEFAULT_SENTINEL.to_string());
                    }
                }
            }
            self.resolve_cascade(id, &mut out);
        }
        self.table.sweep_expired(now, self.config.sweep_grace());
        out
    }

    // ── Message handling ────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn handle_forward(
        &mut self,
        id: RoundId,
        parentid: String,
        om: u32,
        index: usize,
        value: String,
        origin: PeerKey,
        path: Vec<PeerKey>,
        sender: &str,
        peers: &[PeerKey],
        now: Instant,
    ) -> EngineOutput {
        if index >= WORD_COUNT {
            debug!("dropping forward {id}: index {index} out of range");
            return EngineOutput::empty();
        }
        if path.iter().any(|p| *p == self.identity) {
            debug!("dropping forward {id}: already on branch path");
            return EngineOutput::empty();
        }
        if self.table.contains(&id) {
            debug!("dropping forward {id}: round already known");
            return EngineOutput::empty();
        }

        let others: Vec<PeerKey> = peers
            .iter()
            .filter(|p| **p != self.identity && !path.contains(*p))
            .cloned()
            .collect();

        let mut out = EngineOutput::empty();
        if om == 0 || others.is_empty() {
            // Leaf of the recursion: our contribution is the value as
            // received; it goes straight back to the forwarder.
            self.table.add_round(RoundNode {
                id: id.clone(),
                parentid,
                om,
                index,
                value_received: value,
                origin,
                path,
                forwarder: Some(sender.to_string()),
                children: Default::default(),
                deadline: now + self.config.round_timeout(om),
                result: None,
            });
            self.resolve_cascade(id, &mut out);
            return out;
        }

        // Interior node: open the received round with one vote slot per
        // remaining participant, and relay the value under a fresh id.
        // Relays carry the value untouched; lying happens on reports
        // only.  Each vote slot is filled by locally resolving that
        // participant's own relay of this round (its forward arrives
        // with `parentid = id`), never by the echoes our relay provokes:
        // those come back addressed to `relay_id`, which has no table
        // entry here and drops as an unknown round.
        let relay_id = generate_round_id(&self.identity, &mut self.rng);
        let mut relay_path = path.clone();
        relay_path.push(self.identity.clone());

        self.table.add_round(RoundNode {
            id: id.clone(),
            parentid,
            om,
            index,
            value_received: value.clone(),
            origin: origin.clone(),
            path,
            forwarder: Some(sender.to_string()),
            children: others.iter().map(|p| (p.clone(), None)).collect(),
            deadline: now + self.config.round_timeout(om),
            result: None,
        });

        for peer in &others {
            out.outbound.push((
                peer.clone(),
                ConsensusMessage::Forward {
                    id: relay_id.clone(),
                    parentid: id.clone(),
                    om: om - 1,
                    index,
                    value: value.clone(),
                    origin: origin.clone(),
                    path: relay_path.clone(),
                },
            ));
        }
        debug!(
            "round {id} (om={om}) opened; relaying as {relay_id} to {} peers",
            others.len()
        );
        out
    }

    fn handle_report(
        &mut self,
        parentid: &str,
        reporter: &str,
        value: String,
        sender: &str,
    ) -> EngineOutput {
        let child = if reporter.is_empty() { sender } else { reporter };
        match self.table.record_child(parentid, child, value) {
            RecordChild::Complete => {
                let mut out = EngineOutput::empty();
                self.resolve_cascade(parentid.to_string(), &mut out);
                out
            }
            RecordChild::Incomplete => EngineOutput::empty(),
            RecordChild::Rejected => {
                debug!("dropping report from {child} for round {parentid}");
                EngineOutput::empty()
            }
        }
    }

    // ── Resolution ──────────────────────────────────────────────────────

    /// Resolve a round and cascade upward.  Resolving a round received
    /// from peer `L` does two things: one report travels back to `L`,
    /// and the result is filed locally as this node's vote on `L` inside
    /// the enclosing round (`L`'s relay is `L`'s identity in that round).
    /// Filing the vote may complete the enclosing round, which then
    /// resolves in turn; the cascade ends at a self-originated root.
    fn resolve_cascade(&mut self, first: RoundId, out: &mut EngineOutput) {
        let mut queue = vec![first];
        while let Some(id) = queue.pop() {
            let (result, index, is_root, forwarder, parentid) = {
                let Some(round) = self.table.find_round_mut(&id) else {
                    continue;
                };
                if round.is_resolved() {
                    continue;
                }
                let result = round.decide();
                round.result = Some(result.clone());
                (
                    result,
                    round.index,
                    round.is_root(),
                    round.forwarder.clone(),
                    round.parentid.clone(),
                )
            };
            info!("round {id} resolved to '{result}'");

            if is_root {
                out.writes.push(WordWrite {
                    index,
                    value: result.clone(),
                });
            }

            match forwarder {
                Some(forwarder) => {
                    // Report upward, lying applied at this emission only.
                    let reported = self.policy.apply(&result, &mut self.rng);
                    let msg_id = generate_round_id(&self.identity, &mut self.rng);
                    out.outbound.push((
                        forwarder.clone(),
                        ConsensusMessage::Report {
                            id: msg_id,
                            parentid: id.clone(),
                            reporter: self.identity.clone(),
                            value: reported,
                        },
                    ));

                    // Classical-OM gathering: what we concluded about the
                    // branch the forwarder relayed is our vote on that
                    // forwarder in the enclosing round.  This is the only
                    // path that fills a non-originator's child slots, so
                    // a completed enclosing round must resolve here.
                    if !parentid.is_empty()
                        && self.table.record_child(&parentid, &forwarder, result)
                            == RecordChild::Complete
                    {
                        queue.push(parentid);
                    }
                }
                None => {
                    // A root this node started: its children fill from
                    // network reports and there is nothing above it.
                }
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
