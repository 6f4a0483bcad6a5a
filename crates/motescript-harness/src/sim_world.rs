//! Deterministic in-memory simulator.
//!
//! `SimWorld` keeps a virtual clock, a set of motes and a priority queue of
//! pending deliveries. Mote output is scripted up front (or injected by
//! tests); the plan adds its own cue messages and the timeout through the
//! [`Simulator`] trait.
//!
//! Events are delivered in `(time, sequence)` order, so two runs with the
//! same seed and the same scripted output are identical.

use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

use motescript_core::{
    Environment, EventMessage, MessageSource, Node, NodeId, SimEvent, SimTime, Simulator,
};
use thiserror::Error;

use crate::sim_mote::SimMote;

/// Errors from simulator services.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulatorError {
    /// Message attributed to a mote that is not in the world.
    #[error("unknown mote {id}")]
    UnknownMote {
        /// Offending id.
        id: NodeId,
    },

    /// A mote with this id already exists.
    #[error("duplicate mote {id}")]
    DuplicateMote {
        /// Offending id.
        id: NodeId,
    },

    /// Re-arming would move the deadline earlier.
    #[error("timeout already armed for {armed}, cannot move it to {requested}")]
    TimeoutEarlier {
        /// Current deadline.
        armed: SimTime,
        /// Rejected deadline.
        requested: SimTime,
    },

    /// The timeout has already fired.
    #[error("timeout already fired")]
    TimeoutFired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeoutState {
    Disarmed,
    Armed(SimTime),
    Fired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Message { source: MessageSource, text: String },
    Timeout,
}

/// A delivery scheduled at a specific simulated time.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Scheduled {
    at: SimTime,
    sequence: u64,
    pending: Pending,
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap; earliest (time, sequence) must pop first.
        other.at.cmp(&self.at).then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Deterministic simulation world.
#[derive(Debug, Clone)]
pub struct SimWorld {
    now: SimTime,
    seed: u64,
    motes: Vec<SimMote>,
    queue: BinaryHeap<Scheduled>,
    sequence: u64,
    timeout: TimeoutState,
    last_generated: SimTime,
}

impl SimWorld {
    /// Empty world at time zero.
    pub fn new(seed: u64) -> Self {
        Self {
            now: SimTime::ZERO,
            seed,
            motes: Vec::new(),
            queue: BinaryHeap::new(),
            sequence: 0,
            timeout: TimeoutState::Disarmed,
            last_generated: SimTime::ZERO,
        }
    }

    /// World with motes `1..=count` running the stock firmware layout.
    pub fn with_motes(seed: u64, count: u32) -> Self {
        let mut world = Self::new(seed);
        world.motes = (1..=count).map(SimMote::with_firmware_layout).collect();
        world
    }

    /// Add a mote.
    pub fn add_mote(&mut self, mote: SimMote) -> Result<(), SimulatorError> {
        if self.mote(mote.id()).is_some() {
            return Err(SimulatorError::DuplicateMote { id: mote.id() });
        }
        self.motes.push(mote);
        Ok(())
    }

    /// All motes, in enumeration order.
    pub fn motes(&self) -> &[SimMote] {
        &self.motes
    }

    /// Mote by id.
    pub fn mote(&self, id: NodeId) -> Option<&SimMote> {
        self.motes.iter().find(|m| m.id() == id)
    }

    /// Schedule `msg` for delivery at its timestamp.
    ///
    /// Timestamps in the past are delivered at the current time.
    pub fn schedule(&mut self, msg: EventMessage) -> Result<(), SimulatorError> {
        if let MessageSource::Mote(id) = msg.source {
            if self.mote(id).is_none() {
                return Err(SimulatorError::UnknownMote { id });
            }
        }

        let at = msg.time.max(self.now);
        self.push(at, Pending::Message { source: msg.source, text: msg.text });
        Ok(())
    }

    /// Schedule a line printed by mote `id` at `at`.
    pub fn print(
        &mut self,
        at: SimTime,
        id: NodeId,
        text: impl Into<String>,
    ) -> Result<(), SimulatorError> {
        self.schedule(EventMessage::from_mote(at, id, text))
    }

    fn push(&mut self, at: SimTime, pending: Pending) {
        self.queue.push(Scheduled { at, sequence: self.sequence, pending });
        self.sequence += 1;
    }
}

impl Environment for SimWorld {
    fn now(&self) -> SimTime {
        self.now
    }

    fn random_seed(&self) -> u64 {
        self.seed
    }
}

impl Simulator for SimWorld {
    type Mote = SimMote;
    type Error = SimulatorError;

    fn arm_timeout(&mut self, after: Duration) -> Result<(), SimulatorError> {
        let requested = self.now + after;

        match self.timeout {
            TimeoutState::Fired => return Err(SimulatorError::TimeoutFired),
            TimeoutState::Armed(armed) if requested < armed => {
                return Err(SimulatorError::TimeoutEarlier { armed, requested });
            },
            TimeoutState::Armed(_) | TimeoutState::Disarmed => {},
        }

        tracing::debug!(deadline = %requested, "timeout armed");
        self.timeout = TimeoutState::Armed(requested);
        self.push(requested, Pending::Timeout);
        Ok(())
    }

    fn generate_message(&mut self, delay: Duration, payload: &str) -> Result<(), SimulatorError> {
        let at = (self.now + delay).max(self.last_generated);
        self.last_generated = at;
        self.push(at, Pending::Message { source: MessageSource::Script, text: payload.to_string() });
        Ok(())
    }

    fn next_event(&mut self) -> Option<SimEvent> {
        while let Some(scheduled) = self.queue.pop() {
            self.now = self.now.max(scheduled.at);

            match scheduled.pending {
                Pending::Message { source, text } => {
                    return Some(SimEvent::Message(EventMessage { time: self.now, source, text }));
                },
                Pending::Timeout if self.timeout == TimeoutState::Armed(scheduled.at) => {
                    self.timeout = TimeoutState::Fired;
                    return Some(SimEvent::TimeoutExpired { at: self.now });
                },
                // Superseded by a later re-arm.
                Pending::Timeout => {},
            }
        }

        None
    }

    fn motes_mut(&mut self) -> &mut [SimMote] {
        &mut self.motes
    }
}
