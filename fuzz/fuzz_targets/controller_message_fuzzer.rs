//! Fuzz target for the [`TestController`] state machine
//!
//! # Strategy
//!
//! - Event sequences: arbitrary mixes of mote lines, script cues, timeouts
//!   and repeated starts
//! - Marker collisions: lines carrying several markers at once
//! - Plan variety: every preset, optionally with a pass marker
//!
//! # Invariants
//!
//! - Events before `Start` MUST be rejected without changing state
//! - A line containing the failure marker while running MUST fail the run
//! - `Finish` is emitted at most once and always last
//! - No transition FROM `Terminal` (no actions, verdict unchanged)
//! - Every broadcast port is fixed, neutral or allocatable

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use motescript_core::{
    ControllerAction, ControllerEvent, ControllerState, EventMessage, PortSource, SimTime,
    TestController, TestPlan, VarValue, Verdict, ports::is_allocatable,
};

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Start,
    MoteLine { id: u8, text: FuzzText },
    ScriptCue { text: FuzzText },
    Timeout,
    Advance { millis: u16 },
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzText {
    Error,
    StreamOk,
    Continue,
    Done,
    Mixed,
    Raw(String),
}

impl FuzzText {
    fn render(&self) -> String {
        match self {
            Self::Error => " ERROR fuzz".to_string(),
            Self::StreamOk => "Stream OK".to_string(),
            Self::Continue => "continue".to_string(),
            Self::Done => "DONE".to_string(),
            Self::Mixed => "Stream OK DONE ERROR continue".to_string(),
            Self::Raw(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    plan: u8,
    pass_marker: bool,
    seed: u64,
    events: Vec<FuzzEvent>,
}

fn plan_for(input: &FuzzInput) -> TestPlan {
    let plan = match input.plan % 4 {
        0 => TestPlan::tcp_fixed_port(),
        1 => TestPlan::tcp_stream(),
        2 => TestPlan::rpl_udp(),
        _ => TestPlan::rpl_udp_varying(),
    };
    if input.pass_marker { plan.with_pass_marker("DONE") } else { plan }
}

fuzz_target!(|input: FuzzInput| {
    let plan = plan_for(&input);
    let fixed: Vec<u16> = plan
        .parameters
        .iter()
        .filter_map(|p| match p.source {
            PortSource::Fixed(port) => Some(port),
            PortSource::Allocate { .. } => None,
        })
        .collect();

    let mut controller = TestController::with_seed(plan, input.seed);
    let mut now = SimTime::ZERO;
    let mut finished: Option<Verdict> = None;

    for event in input.events {
        let previous = controller.state().clone();

        let event = match event {
            FuzzEvent::Start => ControllerEvent::Start { now },
            FuzzEvent::MoteLine { id, text } => {
                ControllerEvent::Message(EventMessage::from_mote(now, u32::from(id), text.render()))
            },
            FuzzEvent::ScriptCue { text } => {
                ControllerEvent::Message(EventMessage::from_script(now, text.render()))
            },
            FuzzEvent::Timeout => ControllerEvent::TimeoutExpired { now },
            FuzzEvent::Advance { millis } => {
                now = now + std::time::Duration::from_millis(u64::from(millis));
                continue;
            },
        };

        let is_error = matches!(&event, ControllerEvent::Message(m) if m.text.contains(" ERROR "));
        let result = controller.handle(event);

        match (&previous, result) {
            (ControllerState::Terminal(verdict), Ok(actions)) => {
                assert!(actions.is_empty(), "Terminal state produced actions");
                assert_eq!(controller.state(), &ControllerState::Terminal(verdict.clone()));
            },
            (ControllerState::Terminal(_), Err(e)) => panic!("Terminal state returned error {e}"),
            (_, Err(_)) => {
                assert_eq!(controller.state(), &previous, "Rejected event changed state");
            },
            (_, Ok(actions)) => {
                if previous == ControllerState::Running && is_error {
                    assert!(matches!(controller.verdict(), Some(Verdict::Fail { .. })));
                }

                for (idx, action) in actions.iter().enumerate() {
                    match action {
                        ControllerAction::Finish(verdict) => {
                            assert!(finished.is_none(), "Finish emitted twice");
                            assert_eq!(idx, actions.len() - 1, "Finish must be last");
                            finished = Some(verdict.clone());
                        },
                        ControllerAction::Broadcast { bindings } => {
                            for binding in bindings {
                                let VarValue::Int16(port) = binding.value else {
                                    panic!("port binding is not int16");
                                };
                                assert!(
                                    port == 0 || fixed.contains(&port) || is_allocatable(port),
                                    "Unexpected port {port}"
                                );
                            }
                        },
                        ControllerAction::ArmTimeout { .. }
                        | ControllerAction::GenerateMessage { .. }
                        | ControllerAction::Log { .. } => {},
                    }
                }
            },
        }
    }

    assert_eq!(finished.as_ref(), controller.verdict());
});
