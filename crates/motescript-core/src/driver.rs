//! Runs a controller against a simulator.
//!
//! The driver owns the cooperative loop. It hands the controller one event,
//! executes every returned action to completion, then suspends on the
//! simulator through one of two primitives:
//!
//! - [`EventCursor::await_next_event`]: yield exactly one event.
//! - [`EventCursor::await_until`]: yield events until a message satisfies
//!   the predicate or the timeout fires. Skipped messages are dropped.
//!
//! There is never more than one outstanding wait, and no broadcast runs
//! while a wait is in progress.

use rand::RngCore;
use rand_chacha::ChaCha8Rng;

use crate::{
    broadcast::{ParameterBinding, broadcast_all},
    controller::{
        ControllerAction, ControllerEvent, LogLevel, Suspension, TestController, Verdict,
    },
    env::{Environment, SimEvent, Simulator},
    error::DriverError,
    memory::VarAccessor,
    message::EventMessage,
    plan::TestPlan,
    time::SimTime,
};

/// Default cap on delivered events per run.
pub const DEFAULT_EVENT_LIMIT: usize = 1_000_000;

/// A broadcast as executed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastRecord {
    /// Simulated time of the broadcast.
    pub at: SimTime,
    /// Bindings applied to every mote.
    pub bindings: Vec<ParameterBinding>,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Terminal verdict.
    pub verdict: Verdict,
    /// Simulated time at which the verdict was reached.
    pub ended_at: SimTime,
    /// Events pulled from the simulator (including skipped ones).
    pub events_delivered: usize,
    /// Every broadcast, in execution order.
    pub broadcasts: Vec<BroadcastRecord>,
    /// Controller log lines, in emission order.
    pub log: Vec<String>,
}

/// Suspension primitives over a simulator, with a delivery limit.
#[derive(Debug, Clone)]
pub struct EventCursor {
    delivered: usize,
    limit: usize,
}

impl EventCursor {
    /// Cursor that gives up after `limit` deliveries.
    pub fn new(limit: usize) -> Self {
        Self { delivered: 0, limit }
    }

    /// Events delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Suspend until the simulator produces its next event.
    pub fn await_next_event<S: Simulator>(&mut self, sim: &mut S) -> Result<SimEvent, DriverError> {
        if self.delivered >= self.limit {
            return Err(DriverError::EventLimitReached { limit: self.limit, at: sim.now() });
        }

        let event = sim.next_event().ok_or_else(|| DriverError::Stalled { at: sim.now() })?;
        self.delivered += 1;
        Ok(event)
    }

    /// Suspend until a message satisfies `predicate` or the timeout fires.
    pub fn await_until<S, P>(&mut self, sim: &mut S, mut predicate: P) -> Result<SimEvent, DriverError>
    where
        S: Simulator,
        P: FnMut(&EventMessage) -> bool,
    {
        loop {
            match self.await_next_event(sim)? {
                SimEvent::Message(msg) if !predicate(&msg) => {
                    tracing::trace!(time = %msg.time, "skipping {}", msg);
                },
                event => return Ok(event),
            }
        }
    }
}

impl Default for EventCursor {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LIMIT)
    }
}

/// Drives one [`TestController`] to a verdict.
pub struct ScriptDriver<R = ChaCha8Rng> {
    controller: TestController<R>,
    accessor: VarAccessor,
    cursor: EventCursor,
    broadcasts: Vec<BroadcastRecord>,
    log: Vec<String>,
}

impl ScriptDriver<ChaCha8Rng> {
    /// Driver for `plan`, seeded from the simulation's seed.
    pub fn for_simulation<E: Environment>(plan: TestPlan, env: &E) -> Self {
        let seed = env.random_seed();
        tracing::info!(seed, plan = %plan.name, "preparing run");
        Self::new(TestController::with_seed(plan, seed))
    }
}

impl<R: RngCore> ScriptDriver<R> {
    /// Driver for an existing controller.
    pub fn new(controller: TestController<R>) -> Self {
        let accessor = controller.plan().accessor();
        Self {
            controller,
            accessor,
            cursor: EventCursor::default(),
            broadcasts: Vec::new(),
            log: Vec::new(),
        }
    }

    /// Cap the number of delivered events.
    pub fn with_event_limit(mut self, limit: usize) -> Self {
        self.cursor = EventCursor::new(limit);
        self
    }

    /// The controller being driven.
    pub fn controller(&self) -> &TestController<R> {
        &self.controller
    }

    /// Run until the controller reaches a verdict.
    ///
    /// # Errors
    ///
    /// Returns `DriverError` if the simulator fails, runs dry, or the event
    /// limit is reached before a verdict.
    pub fn run<S: Simulator>(mut self, sim: &mut S) -> Result<RunReport, DriverError> {
        let mut verdict = self.step(sim, ControllerEvent::Start { now: sim.now() })?;

        while verdict.is_none() {
            let event = match self.controller.suspension() {
                Suspension::NextEvent => self.cursor.await_next_event(sim)?,
                Suspension::Until(_) => {
                    let controller = &self.controller;
                    self.cursor.await_until(sim, |msg| controller.wakes_on(msg))?
                },
            };

            let event = match event {
                SimEvent::Message(msg) => ControllerEvent::Message(msg),
                SimEvent::TimeoutExpired { at } => ControllerEvent::TimeoutExpired { now: at },
            };
            verdict = self.step(sim, event)?;
        }

        let verdict = verdict.ok_or(DriverError::Stalled { at: sim.now() })?;
        tracing::info!(at = %sim.now(), "{}", verdict);

        Ok(RunReport {
            verdict,
            ended_at: sim.now(),
            events_delivered: self.cursor.delivered(),
            broadcasts: self.broadcasts,
            log: self.log,
        })
    }

    fn step<S: Simulator>(
        &mut self,
        sim: &mut S,
        event: ControllerEvent,
    ) -> Result<Option<Verdict>, DriverError> {
        let actions = self.controller.handle(event)?;
        self.execute(sim, actions)
    }

    fn execute<S: Simulator>(
        &mut self,
        sim: &mut S,
        actions: Vec<ControllerAction>,
    ) -> Result<Option<Verdict>, DriverError> {
        let mut verdict = None;

        for action in actions {
            match action {
                ControllerAction::ArmTimeout { after } => {
                    sim.arm_timeout(after).map_err(DriverError::simulator)?;
                },
                ControllerAction::Broadcast { bindings } => {
                    broadcast_all(sim.motes_mut(), &bindings, &self.accessor);
                    self.broadcasts.push(BroadcastRecord { at: sim.now(), bindings });
                },
                ControllerAction::GenerateMessage { delay, payload } => {
                    sim.generate_message(delay, &payload).map_err(DriverError::simulator)?;
                },
                ControllerAction::Log { level, message } => {
                    match level {
                        LogLevel::Info => tracing::info!("{}", message),
                        LogLevel::Error => tracing::error!("{}", message),
                    }
                    self.log.push(message);
                },
                ControllerAction::Finish(v) => verdict = Some(v),
            }
        }

        Ok(verdict)
    }
}
