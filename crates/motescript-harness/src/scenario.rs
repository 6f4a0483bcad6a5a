//! Scenario builder for simulation tests.
//!
//! ```ignore
//! let report = Scenario::new(TestPlan::tcp_stream())
//!     .with_mote_output(1_000, 2, "Stream OK")
//!     .oracle(Box::new(|world, report| {
//!         if report.verdict.is_success() { Ok(()) } else { Err("failed".into()) }
//!     }))
//!     .run()?;
//! ```

use motescript_core::{
    DriverError, EventMessage, NodeId, RunReport, ScriptDriver, SimTime, TestPlan,
};
use thiserror::Error;

use crate::{
    sim_mote::SimMote,
    sim_world::{SimWorld, SimulatorError},
};

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 12345;

/// Mote count used when none is given.
pub const DEFAULT_MOTES: u32 = 3;

/// Post-run check over the final world and report.
pub type Oracle = Box<dyn Fn(&SimWorld, &RunReport) -> Result<(), String>>;

/// Errors from running a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Scripted output could not be scheduled.
    #[error(transparent)]
    Simulator(#[from] SimulatorError),

    /// The run did not reach a verdict.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The oracle rejected the outcome.
    #[error("oracle failed: {0}")]
    Oracle(String),
}

/// One plan, one world, scripted mote output.
pub struct Scenario {
    plan: TestPlan,
    seed: u64,
    motes: u32,
    extra_motes: Vec<SimMote>,
    messages: Vec<EventMessage>,
    event_limit: Option<usize>,
    oracle: Option<Oracle>,
}

impl Scenario {
    /// Scenario for `plan` with default seed and motes.
    pub fn new(plan: TestPlan) -> Self {
        Self {
            plan,
            seed: DEFAULT_SEED,
            motes: DEFAULT_MOTES,
            extra_motes: Vec::new(),
            messages: Vec::new(),
            event_limit: None,
            oracle: None,
        }
    }

    /// Simulation seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Number of stock-firmware motes, ids `1..=count`.
    #[must_use]
    pub fn with_motes(mut self, count: u32) -> Self {
        self.motes = count;
        self
    }

    /// Add a custom mote after the stock ones.
    #[must_use]
    pub fn with_mote(mut self, mote: SimMote) -> Self {
        self.extra_motes.push(mote);
        self
    }

    /// Schedule a message.
    #[must_use]
    pub fn with_message(mut self, msg: EventMessage) -> Self {
        self.messages.push(msg);
        self
    }

    /// Schedule a line printed by mote `id` at `at_ms` milliseconds.
    #[must_use]
    pub fn with_mote_output(self, at_ms: u64, id: NodeId, text: impl Into<String>) -> Self {
        self.with_message(EventMessage::from_mote(SimTime::from_millis(at_ms), id, text))
    }

    /// Cap delivered events.
    #[must_use]
    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.event_limit = Some(limit);
        self
    }

    /// Check run after completion.
    #[must_use]
    pub fn oracle(mut self, oracle: Oracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Build the world, run the plan and apply the oracle.
    pub fn run(self) -> Result<RunReport, ScenarioError> {
        let mut world = SimWorld::with_motes(self.seed, self.motes);
        for mote in self.extra_motes {
            world.add_mote(mote)?;
        }
        for msg in self.messages {
            world.schedule(msg)?;
        }

        let mut driver = ScriptDriver::for_simulation(self.plan, &world);
        if let Some(limit) = self.event_limit {
            driver = driver.with_event_limit(limit);
        }

        let report = driver.run(&mut world)?;

        if let Some(oracle) = &self.oracle {
            oracle(&world, &report).map_err(ScenarioError::Oracle)?;
        }

        Ok(report)
    }
}
