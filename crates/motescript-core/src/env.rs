//! Simulator abstraction for deterministic testing.
//!
//! The `Environment` and `Simulator` traits decouple test plans from the
//! simulator engine that runs the motes. This enables:
//!
//! - Deterministic Simulation: the in-memory world in `motescript-harness`
//!   provides a virtual clock, a seed and an ordered event queue, allowing
//!   perfect replay of a run.
//!
//! - Real Simulators: a bridge to an external simulator implements the same
//!   traits without any change to the controller.
//!
//! # Invariants
//!
//! - Monotonicity: `now()` never goes backwards
//! - Ordering: `next_event()` yields events in global (time, sequence) order
//! - Single timeout: the armed timeout fires at most once

use std::time::Duration;

use crate::{memory::Node, message::EventMessage, time::SimTime};

/// Clock and seed of a simulation.
pub trait Environment {
    /// Current simulated time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: subsequent calls return times >= previous calls.
    fn now(&self) -> SimTime;

    /// Seed of this simulation run.
    ///
    /// Every pseudorandom choice a plan makes derives from this value so
    /// that a run can be reproduced from its seed.
    fn random_seed(&self) -> u64;
}

/// Something the simulator delivers to a waiting controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// A mote printed a line, or a generated message came due.
    Message(EventMessage),
    /// The armed timeout elapsed.
    TimeoutExpired {
        /// Time at which it fired.
        at: SimTime,
    },
}

/// The simulator services a test plan consumes.
pub trait Simulator: Environment {
    /// Node handle type.
    type Mote: Node;

    /// Error raised by simulator services.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Arm the run's timeout `after` from now.
    ///
    /// Fires at most once. Re-arming to fire earlier than an already armed
    /// deadline is rejected.
    fn arm_timeout(&mut self, after: Duration) -> Result<(), Self::Error>;

    /// Schedule a self-addressed message at least `delay` from now.
    ///
    /// Generated messages are delivered in the order they were generated.
    fn generate_message(&mut self, delay: Duration, payload: &str) -> Result<(), Self::Error>;

    /// Advance the simulation to the next event.
    ///
    /// Returns `None` once nothing remains scheduled.
    fn next_event(&mut self) -> Option<SimEvent>;

    /// Participating nodes, in stable enumeration order.
    fn motes_mut(&mut self) -> &mut [Self::Mote];
}
