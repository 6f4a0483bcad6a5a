//! Test controller state machine.
//!
//! The controller is a pure state machine: it consumes [`ControllerEvent`]s
//! and returns [`ControllerAction`]s. The caller owns the simulator and
//! executes the actions (arming the timeout, broadcasting parameters,
//! generating cue messages) before delivering the next event.
//!
//! # States
//!
//! ```text
//! Armed ──Start──▶ Running ──failure marker / pass marker / timeout──▶ Terminal
//!                  │     ▲
//!                  └─────┘ phase marker, reset cue, other messages
//! ```
//!
//! # Invariants
//!
//! - The verdict is set exactly once; events after `Terminal` produce no
//!   actions.
//! - The failure marker is checked before every other marker.
//! - Without a failure, the timeout resolves to the plan's expiry policy.

use std::{fmt, time::Duration};

use rand::RngCore;
use rand_chacha::ChaCha8Rng;

use crate::{
    broadcast::ParameterBinding,
    error::ControllerError,
    message::EventMessage,
    plan::{ExpiryPolicy, PortSource, TestPlan},
    ports::{NEUTRAL_PORT, PortAllocator},
    time::{SimTime, format_fixed2},
};

/// Severity of a controller log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Failure evidence.
    Error,
}

/// Inputs to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Begin the run.
    Start {
        /// Simulated time at start.
        now: SimTime,
    },
    /// A message the current suspension woke on.
    Message(EventMessage),
    /// The armed timeout fired.
    TimeoutExpired {
        /// Simulated time at expiry.
        now: SimTime,
    },
}

/// Effects the caller must perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerAction {
    /// Arm the run's single timeout.
    ArmTimeout {
        /// Budget from now.
        after: Duration,
    },
    /// Apply these bindings to every mote.
    Broadcast {
        /// Bindings, applied per mote in this order.
        bindings: Vec<ParameterBinding>,
    },
    /// Schedule a self-addressed message.
    GenerateMessage {
        /// Minimum delay from now.
        delay: Duration,
        /// Message text.
        payload: String,
    },
    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Line content.
        message: String,
    },
    /// The run is over.
    Finish(Verdict),
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// An explicit pass marker was observed.
    Pass,
    /// The run failed.
    Fail {
        /// What failed the run (the offending log line, or the timeout).
        reason: String,
    },
    /// The budget elapsed without a failure.
    TimeoutPass,
}

impl Verdict {
    /// Whether the run counts as successful.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Pass | Self::TimeoutPass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail { reason } => write!(f, "FAIL: {reason}"),
            Self::TimeoutPass => write!(f, "PASS (timeout)"),
        }
    }
}

/// Lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed, waiting for `Start`.
    Armed,
    /// Waiting on messages or the timeout.
    Running,
    /// Verdict recorded; nothing further happens.
    Terminal(Verdict),
}

/// What the controller is currently waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension<'a> {
    /// Wake on every message.
    NextEvent,
    /// Wake only on this exact cue (or a terminal marker).
    Until(&'a str),
}

/// Position inside a reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CyclePhase {
    /// Motes run with configured ports; the next cue parks them.
    Configured,
    /// Motes are parked; the next cue reconfigures them.
    Parked,
}

/// Event-driven test controller.
pub struct TestController<R = ChaCha8Rng> {
    plan: TestPlan,
    ports: PortAllocator<R>,
    state: ControllerState,
    cycle: Option<CyclePhase>,
}

impl TestController<ChaCha8Rng> {
    /// Controller whose port draws derive from the simulation seed.
    pub fn with_seed(plan: TestPlan, seed: u64) -> Self {
        Self::new(plan, PortAllocator::from_seed(seed))
    }
}

impl<R: RngCore> TestController<R> {
    /// Create a controller in the `Armed` state.
    pub fn new(plan: TestPlan, ports: PortAllocator<R>) -> Self {
        Self { plan, ports, state: ControllerState::Armed, cycle: None }
    }

    /// The plan being run.
    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// Recorded verdict, once terminal.
    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.state {
            ControllerState::Terminal(verdict) => Some(verdict),
            _ => None,
        }
    }

    /// Whether a verdict has been recorded.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, ControllerState::Terminal(_))
    }

    /// Current wait.
    pub fn suspension(&self) -> Suspension<'_> {
        match (&self.plan.reset_cycle, self.cycle) {
            (Some(cycle), Some(_)) => Suspension::Until(&cycle.cue),
            _ => Suspension::NextEvent,
        }
    }

    /// Whether `msg` ends the current suspension.
    ///
    /// Terminal markers always wake the controller, so failure detection
    /// keeps priority during conditional waits. The phase marker does not
    /// end a cue wait.
    pub fn wakes_on(&self, msg: &EventMessage) -> bool {
        if self.state != ControllerState::Running {
            return false;
        }

        match self.suspension() {
            Suspension::NextEvent => true,
            Suspension::Until(cue) => {
                msg.text == cue
                    || contains(self.plan.failure_marker.as_deref(), &msg.text)
                    || contains(self.plan.pass_marker.as_deref(), &msg.text)
            },
        }
    }

    /// Process an event and return the actions to perform.
    ///
    /// # Errors
    ///
    /// Returns `ControllerError` if events arrive out of lifecycle order.
    pub fn handle(
        &mut self,
        event: ControllerEvent,
    ) -> Result<Vec<ControllerAction>, ControllerError> {
        if self.is_terminal() {
            return Ok(Vec::new());
        }

        match event {
            ControllerEvent::Start { now } => self.handle_start(now),
            ControllerEvent::Message(msg) => self.handle_message(&msg),
            ControllerEvent::TimeoutExpired { now } => self.handle_timeout(now),
        }
    }

    fn handle_start(&mut self, now: SimTime) -> Result<Vec<ControllerAction>, ControllerError> {
        if self.state != ControllerState::Armed {
            return Err(ControllerError::AlreadyStarted);
        }

        let mut actions = vec![
            ControllerAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "Starting {} at {} (timeout {} ms)",
                    self.plan.name,
                    now,
                    self.plan.timeout.as_millis()
                ),
            },
            ControllerAction::ArmTimeout { after: self.plan.timeout },
        ];

        let bindings = self.draw_parameters();
        if !bindings.is_empty() {
            actions.push(ControllerAction::Broadcast { bindings });
        }

        if let Some(cycle) = &self.plan.reset_cycle {
            actions.push(ControllerAction::GenerateMessage {
                delay: cycle.run_phase,
                payload: cycle.cue.clone(),
            });
            self.cycle = Some(CyclePhase::Configured);
        }

        self.state = ControllerState::Running;
        Ok(actions)
    }

    fn handle_message(
        &mut self,
        msg: &EventMessage,
    ) -> Result<Vec<ControllerAction>, ControllerError> {
        if self.state == ControllerState::Armed {
            return Err(ControllerError::NotStarted { event: "message" });
        }

        if contains(self.plan.failure_marker.as_deref(), &msg.text) {
            let line = msg.to_string();
            let mut actions =
                vec![ControllerAction::Log { level: LogLevel::Error, message: line.clone() }];
            actions.extend(self.finish(Verdict::Fail { reason: line }));
            return Ok(actions);
        }

        if contains(self.plan.pass_marker.as_deref(), &msg.text) {
            return Ok(self.finish(Verdict::Pass));
        }

        let mut actions = Vec::new();

        // Phases only restart outside a reset cycle.
        if self.cycle.is_none() && contains(self.plan.phase_marker.as_deref(), &msg.text) {
            let bindings = self.draw_parameters();
            let ports: Vec<String> = bindings.iter().map(|b| b.value.to_string()).collect();
            actions.push(ControllerAction::Broadcast { bindings });
            actions.push(ControllerAction::Log {
                level: LogLevel::Info,
                message: format!("Starting new stream at port {}", ports.join(", ")),
            });
        }

        let cue = match (&self.plan.reset_cycle, self.cycle) {
            (Some(cycle), Some(phase)) if msg.text == cycle.cue => Some((phase, cycle.clone())),
            _ => None,
        };

        if let Some((phase, cycle)) = cue {
            match phase {
                CyclePhase::Configured => {
                    actions.push(ControllerAction::Log {
                        level: LogLevel::Info,
                        message: "Reset ports".to_string(),
                    });
                    actions.push(ControllerAction::Broadcast { bindings: self.neutral_parameters() });
                    actions.push(ControllerAction::GenerateMessage {
                        delay: cycle.reset_phase,
                        payload: cycle.cue,
                    });
                    self.cycle = Some(CyclePhase::Parked);
                },
                CyclePhase::Parked => {
                    actions.push(ControllerAction::Broadcast { bindings: self.draw_parameters() });
                    actions.push(ControllerAction::GenerateMessage {
                        delay: cycle.run_phase,
                        payload: cycle.cue,
                    });
                    self.cycle = Some(CyclePhase::Configured);
                },
            }
        }

        Ok(actions)
    }

    fn handle_timeout(&mut self, now: SimTime) -> Result<Vec<ControllerAction>, ControllerError> {
        if self.state == ControllerState::Armed {
            return Err(ControllerError::NotStarted { event: "timeout" });
        }

        let elapsed = format_fixed2(now.as_secs_f64());
        let verdict = match self.plan.on_expire {
            ExpiryPolicy::Pass => Verdict::TimeoutPass,
            ExpiryPolicy::Fail => Verdict::Fail { reason: format!("timed out after {elapsed} s") },
        };

        let mut actions = vec![ControllerAction::Log {
            level: LogLevel::Info,
            message: format!("Budget elapsed at {elapsed} s"),
        }];
        actions.extend(self.finish(verdict));
        Ok(actions)
    }

    fn finish(&mut self, verdict: Verdict) -> Vec<ControllerAction> {
        let (level, message) = if verdict.is_success() {
            (LogLevel::Info, "TEST OK")
        } else {
            (LogLevel::Error, "TEST FAILED")
        };

        self.state = ControllerState::Terminal(verdict.clone());
        vec![
            ControllerAction::Log { level, message: message.to_string() },
            ControllerAction::Finish(verdict),
        ]
    }

    fn draw_parameters(&mut self) -> Vec<ParameterBinding> {
        let ports = &mut self.ports;
        self.plan
            .parameters
            .iter()
            .map(|p| {
                let port = match &p.source {
                    PortSource::Fixed(port) => *port,
                    PortSource::Allocate { role } => ports.allocate(role),
                };
                ParameterBinding::int16(p.variable.clone(), port)
            })
            .collect()
    }

    fn neutral_parameters(&self) -> Vec<ParameterBinding> {
        self.plan
            .parameters
            .iter()
            .map(|p| ParameterBinding::int16(p.variable.clone(), NEUTRAL_PORT))
            .collect()
    }
}

fn contains(marker: Option<&str>, text: &str) -> bool {
    marker.is_some_and(|m| text.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{memory::VarValue, plan::STREAM_OK_MARKER as STREAM_OK, ports::is_allocatable};

    fn mote_msg(text: &str) -> ControllerEvent {
        ControllerEvent::Message(EventMessage::from_mote(SimTime::from_micros(12), 3, text))
    }

    fn cue() -> ControllerEvent {
        ControllerEvent::Message(EventMessage::from_script(SimTime::from_millis(300_000), "continue"))
    }

    fn started(plan: TestPlan) -> (TestController, Vec<ControllerAction>) {
        let mut controller = TestController::with_seed(plan, 42);
        let actions = controller.handle(ControllerEvent::Start { now: SimTime::ZERO }).unwrap();
        (controller, actions)
    }

    fn broadcasts(actions: &[ControllerAction]) -> Vec<Vec<ParameterBinding>> {
        actions
            .iter()
            .filter_map(|a| match a {
                ControllerAction::Broadcast { bindings } => Some(bindings.clone()),
                _ => None,
            })
            .collect()
    }

    fn port(binding: &ParameterBinding) -> u16 {
        match binding.value {
            VarValue::Int16(v) => v,
            VarValue::Bool(_) => panic!("port bindings are int16"),
        }
    }

    #[test]
    fn start_arms_timeout_before_broadcast() {
        let (controller, actions) = started(TestPlan::tcp_fixed_port());

        let arm = actions.iter().position(|a| matches!(a, ControllerAction::ArmTimeout { .. }));
        let cast = actions.iter().position(|a| matches!(a, ControllerAction::Broadcast { .. }));
        assert!(arm.unwrap() < cast.unwrap());
        assert!(actions.contains(&ControllerAction::ArmTimeout {
            after: Duration::from_millis(14_400_000)
        }));
        assert_eq!(broadcasts(&actions), vec![vec![ParameterBinding::int16("tcp_test_port", 1883)]]);
        assert_eq!(controller.state(), &ControllerState::Running);
    }

    #[test]
    fn error_marker_fails_run() {
        let (mut controller, _) = started(TestPlan::tcp_stream());

        let actions = controller.handle(mote_msg(" ERROR bad packet")).unwrap();

        assert!(actions.contains(&ControllerAction::Log {
            level: LogLevel::Error,
            message: "12:3: ERROR bad packet".to_string(),
        }));
        assert_eq!(
            actions.last(),
            Some(&ControllerAction::Finish(Verdict::Fail {
                reason: "12:3: ERROR bad packet".to_string()
            }))
        );
        assert!(!controller.verdict().unwrap().is_success());
    }

    #[test]
    fn error_without_surrounding_spaces_is_ignored() {
        let (mut controller, _) = started(TestPlan::tcp_fixed_port());
        let actions = controller.handle(mote_msg("ERROR: not a marker")).unwrap();
        assert!(actions.is_empty());
        assert!(!controller.is_terminal());
    }

    #[test]
    fn timeout_without_failure_passes() {
        let (mut controller, _) =
            started(TestPlan::rpl_udp().with_timeout(Duration::from_millis(1000)));

        controller.handle(mote_msg("routing table updated")).unwrap();
        let actions = controller
            .handle(ControllerEvent::TimeoutExpired { now: SimTime::from_millis(1000) })
            .unwrap();

        assert_eq!(actions.last(), Some(&ControllerAction::Finish(Verdict::TimeoutPass)));
        assert_eq!(controller.verdict(), Some(&Verdict::TimeoutPass));
    }

    #[test]
    fn strict_expiry_policy_fails_on_timeout() {
        let (mut controller, _) = started(
            TestPlan::default().with_pass_marker("DONE").with_expiry(ExpiryPolicy::Fail),
        );

        controller
            .handle(ControllerEvent::TimeoutExpired { now: SimTime::from_millis(2500) })
            .unwrap();

        assert_eq!(
            controller.verdict(),
            Some(&Verdict::Fail { reason: "timed out after 2.50 s".to_string() })
        );
    }

    #[test]
    fn pass_marker_passes_immediately() {
        let (mut controller, _) = started(TestPlan::default().with_pass_marker("ALL DONE"));
        let actions = controller.handle(mote_msg("ALL DONE")).unwrap();
        assert_eq!(actions.last(), Some(&ControllerAction::Finish(Verdict::Pass)));
    }

    #[test]
    fn failure_marker_beats_every_other_marker() {
        let (mut controller, _) = started(TestPlan::tcp_stream().with_pass_marker("DONE"));

        let actions = controller.handle(mote_msg("Stream OK DONE ERROR x")).unwrap();

        assert!(broadcasts(&actions).is_empty());
        assert!(matches!(controller.verdict(), Some(Verdict::Fail { .. })));
    }

    #[test]
    fn failure_marker_beats_pass_marker_during_cycle() {
        let (mut controller, _) = started(TestPlan::rpl_udp_varying().with_pass_marker("DONE"));

        let actions = controller.handle(mote_msg("DONE ERROR x")).unwrap();

        assert!(broadcasts(&actions).is_empty());
        assert!(matches!(controller.verdict(), Some(Verdict::Fail { .. })));
    }

    #[test]
    fn phase_marker_is_ignored_while_parked() {
        let plan = TestPlan::rpl_udp_varying().with_phase_marker(Some(STREAM_OK.to_string()));
        let (mut controller, _) = started(plan);
        controller.handle(cue()).unwrap();

        assert!(!controller.wakes_on(&EventMessage::from_mote(SimTime::ZERO, 1, STREAM_OK)));
        assert!(controller.handle(mote_msg(STREAM_OK)).unwrap().is_empty());

        let fresh = broadcasts(&controller.handle(cue()).unwrap());
        assert_eq!(fresh.len(), 1);
        assert!(fresh[0].iter().all(|b| is_allocatable(port(b))));
    }

    #[test]
    fn terminal_state_ignores_everything() {
        let (mut controller, _) = started(TestPlan::tcp_stream());
        controller.handle(mote_msg(" ERROR first")).unwrap();
        let verdict = controller.verdict().cloned();

        assert!(controller.handle(mote_msg("Stream OK")).unwrap().is_empty());
        assert!(controller.handle(mote_msg(" ERROR second")).unwrap().is_empty());
        assert!(
            controller
                .handle(ControllerEvent::TimeoutExpired { now: SimTime::from_millis(1) })
                .unwrap()
                .is_empty()
        );
        assert!(controller.handle(ControllerEvent::Start { now: SimTime::ZERO }).unwrap().is_empty());
        assert_eq!(controller.verdict().cloned(), verdict);
    }

    #[test]
    fn stream_ok_rerandomizes_port_and_keeps_running() {
        let (mut controller, initial) = started(TestPlan::tcp_stream());
        assert_eq!(broadcasts(&initial).len(), 1);

        let actions = controller.handle(mote_msg("Stream OK")).unwrap();
        let casts = broadcasts(&actions);

        assert_eq!(casts.len(), 1);
        assert_eq!(casts[0][0].name, "tcp_test_port");
        assert!(is_allocatable(port(&casts[0][0])));
        assert!(actions.iter().any(|a| matches!(
            a,
            ControllerAction::Log { message, .. } if message.starts_with("Starting new stream at port ")
        )));
        assert!(!controller.is_terminal());
    }

    #[test]
    fn unrelated_message_produces_no_actions() {
        let (mut controller, _) = started(TestPlan::tcp_stream());
        assert!(controller.handle(mote_msg("Connected to server")).unwrap().is_empty());
    }

    #[test]
    fn reset_cycle_parks_then_reconfigures() {
        let (mut controller, initial) = started(TestPlan::rpl_udp_varying());
        assert!(initial.contains(&ControllerAction::GenerateMessage {
            delay: Duration::from_millis(300_000),
            payload: "continue".to_string(),
        }));

        let parked = controller.handle(cue()).unwrap();
        assert_eq!(
            broadcasts(&parked),
            vec![vec![
                ParameterBinding::int16("udp_server_port", 0),
                ParameterBinding::int16("udp_client_port", 0),
            ]]
        );
        assert!(parked.contains(&ControllerAction::GenerateMessage {
            delay: Duration::from_millis(15_000),
            payload: "continue".to_string(),
        }));

        let fresh = controller.handle(cue()).unwrap();
        let casts = broadcasts(&fresh);
        assert_eq!(casts.len(), 1);
        assert_eq!(casts[0][0].name, "udp_server_port");
        assert_eq!(casts[0][1].name, "udp_client_port");
        assert!(casts[0].iter().all(|b| is_allocatable(port(b))));
        assert!(fresh.contains(&ControllerAction::GenerateMessage {
            delay: Duration::from_millis(300_000),
            payload: "continue".to_string(),
        }));

        assert_eq!(controller.state(), &ControllerState::Running);
    }

    #[test]
    fn cue_must_match_exactly() {
        let (mut controller, _) = started(TestPlan::rpl_udp_varying());
        assert!(controller.handle(mote_msg("continue please")).unwrap().is_empty());
    }

    #[test]
    fn reset_wait_only_wakes_on_cue_or_markers() {
        let (controller, _) = started(TestPlan::rpl_udp_varying());

        assert_eq!(controller.suspension(), Suspension::Until("continue"));
        assert!(!controller.wakes_on(&EventMessage::from_mote(SimTime::ZERO, 1, "hello")));
        assert!(controller.wakes_on(&EventMessage::from_script(SimTime::ZERO, "continue")));
        assert!(controller.wakes_on(&EventMessage::from_mote(SimTime::ZERO, 1, "x ERROR y")));
        assert!(!controller.wakes_on(&EventMessage::from_mote(SimTime::ZERO, 1, STREAM_OK)));
    }

    #[test]
    fn plain_wait_wakes_on_everything() {
        let (controller, _) = started(TestPlan::tcp_stream());
        assert_eq!(controller.suspension(), Suspension::NextEvent);
        assert!(controller.wakes_on(&EventMessage::from_mote(SimTime::ZERO, 1, "hello")));
    }

    #[test]
    fn events_before_start_are_rejected() {
        let mut controller = TestController::with_seed(TestPlan::default(), 1);

        assert_eq!(
            controller.handle(mote_msg("hello")),
            Err(ControllerError::NotStarted { event: "message" })
        );
        assert_eq!(
            controller.handle(ControllerEvent::TimeoutExpired { now: SimTime::ZERO }),
            Err(ControllerError::NotStarted { event: "timeout" })
        );
        assert!(!controller.wakes_on(&EventMessage::from_mote(SimTime::ZERO, 1, " ERROR ")));
    }

    #[test]
    fn double_start_is_rejected() {
        let (mut controller, _) = started(TestPlan::default());
        assert_eq!(
            controller.handle(ControllerEvent::Start { now: SimTime::ZERO }),
            Err(ControllerError::AlreadyStarted)
        );
    }

    #[test]
    fn same_seed_same_initial_ports() {
        let (_, a) = started(TestPlan::rpl_udp());
        let (_, b) = started(TestPlan::rpl_udp());
        assert_eq!(broadcasts(&a), broadcasts(&b));
    }

    #[test]
    fn verdict_display() {
        assert_eq!(Verdict::Pass.to_string(), "PASS");
        assert_eq!(Verdict::TimeoutPass.to_string(), "PASS (timeout)");
        assert_eq!(Verdict::Fail { reason: "boom".to_string() }.to_string(), "FAIL: boom");
    }
}
