//! Test plans: what a run configures and which messages it reacts to.
//!
//! A [`TestPlan`] is plain configuration. The four presets reproduce the
//! stock network exercises; builder methods adjust any of them.

use std::time::Duration;

use crate::memory::VarAccessor;

/// Substring that marks a protocol failure in mote output.
pub const DEFAULT_FAILURE_MARKER: &str = " ERROR ";

/// Substring a TCP client prints after a completed stream.
pub const STREAM_OK_MARKER: &str = "Stream OK";

/// Cue text used to pace reset cycles.
pub const CONTINUE_CUE: &str = "continue";

/// Well-known MQTT port used by the fixed-port TCP exercise.
pub const MQTT_PORT: u16 = 1883;

/// What the timeout resolves to if nothing else ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// No failure observed within budget counts as a pass.
    #[default]
    Pass,
    /// Reaching the budget is a failure (requires a pass marker to succeed).
    Fail,
}

/// Where a port parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSource {
    /// Always the same port.
    Fixed(u16),
    /// Drawn from the allocator, logged under `role`.
    Allocate {
        /// Role label used in the allocation log.
        role: String,
    },
}

/// A 16-bit port variable configured on every mote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortParameter {
    /// Firmware variable name.
    pub variable: String,
    /// Value source.
    pub source: PortSource,
}

impl PortParameter {
    /// Parameter with a fixed port.
    pub fn fixed(variable: impl Into<String>, port: u16) -> Self {
        Self { variable: variable.into(), source: PortSource::Fixed(port) }
    }

    /// Parameter drawn from the allocator for `role`.
    pub fn allocated(variable: impl Into<String>, role: impl Into<String>) -> Self {
        Self { variable: variable.into(), source: PortSource::Allocate { role: role.into() } }
    }
}

/// Periodic reset of all parameters to the neutral port.
///
/// The plan runs with fresh ports for `run_phase`, parks every mote on the
/// neutral port for `reset_phase`, then starts over with fresh ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetCycle {
    /// Self-generated message that ends each phase (matched exactly).
    pub cue: String,
    /// How long motes run with configured ports.
    pub run_phase: Duration,
    /// How long motes stay parked.
    pub reset_phase: Duration,
}

impl Default for ResetCycle {
    fn default() -> Self {
        Self {
            cue: CONTINUE_CUE.to_string(),
            run_phase: Duration::from_millis(300_000),
            reset_phase: Duration::from_millis(15_000),
        }
    }
}

/// Configuration of one test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPlan {
    /// Human-readable plan name.
    pub name: String,
    /// Simulated-time budget.
    pub timeout: Duration,
    /// Outcome when the budget elapses.
    pub on_expire: ExpiryPolicy,
    /// Port parameters applied at start and on every re-randomization.
    pub parameters: Vec<PortParameter>,
    /// Substring that fails the run. Checked before any other marker.
    pub failure_marker: Option<String>,
    /// Substring that passes the run immediately.
    pub pass_marker: Option<String>,
    /// Substring that ends a phase and re-randomizes the parameters.
    pub phase_marker: Option<String>,
    /// Optional reset cycle.
    pub reset_cycle: Option<ResetCycle>,
    /// Log the previous value of every variable before writing it.
    pub verbose_memory: bool,
}

impl Default for TestPlan {
    fn default() -> Self {
        Self {
            name: "custom".to_string(),
            timeout: Duration::from_millis(3_600_000),
            on_expire: ExpiryPolicy::Pass,
            parameters: Vec::new(),
            failure_marker: Some(DEFAULT_FAILURE_MARKER.to_string()),
            pass_marker: None,
            phase_marker: None,
            reset_cycle: None,
            verbose_memory: false,
        }
    }
}

impl TestPlan {
    /// TCP on the fixed MQTT port for four hours.
    pub fn tcp_fixed_port() -> Self {
        Self {
            name: "ipv6-tcp".to_string(),
            timeout: Duration::from_millis(14_400_000),
            parameters: vec![PortParameter::fixed("tcp_test_port", MQTT_PORT)],
            ..Self::default()
        }
    }

    /// Repeated TCP streams, each on a freshly drawn server port.
    pub fn tcp_stream() -> Self {
        Self {
            name: "ipv6-tcp-stream".to_string(),
            timeout: Duration::from_millis(3_600_000),
            parameters: vec![PortParameter::allocated("tcp_test_port", "server")],
            phase_marker: Some(STREAM_OK_MARKER.to_string()),
            ..Self::default()
        }
    }

    /// UDP over RPL with one random server/client port pair.
    pub fn rpl_udp() -> Self {
        Self {
            name: "rpl-udp".to_string(),
            timeout: Duration::from_millis(3_600_000),
            parameters: udp_port_pair(),
            ..Self::default()
        }
    }

    /// UDP over RPL, periodically parking and re-randomizing the port pair.
    pub fn rpl_udp_varying() -> Self {
        Self {
            name: "rpl-udp-varying".to_string(),
            timeout: Duration::from_millis(7_200_000),
            parameters: udp_port_pair(),
            reset_cycle: Some(ResetCycle::default()),
            ..Self::default()
        }
    }

    /// Override the plan name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the timeout budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the expiry outcome.
    pub fn with_expiry(mut self, policy: ExpiryPolicy) -> Self {
        self.on_expire = policy;
        self
    }

    /// Replace the parameter list.
    pub fn with_parameters(mut self, parameters: Vec<PortParameter>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Override or disable the failure marker.
    pub fn with_failure_marker(mut self, marker: Option<String>) -> Self {
        self.failure_marker = marker;
        self
    }

    /// Require an explicit success marker.
    pub fn with_pass_marker(mut self, marker: impl Into<String>) -> Self {
        self.pass_marker = Some(marker.into());
        self
    }

    /// Override or disable the phase marker.
    pub fn with_phase_marker(mut self, marker: Option<String>) -> Self {
        self.phase_marker = marker;
        self
    }

    /// Override or disable the reset cycle.
    pub fn with_reset_cycle(mut self, cycle: Option<ResetCycle>) -> Self {
        self.reset_cycle = cycle;
        self
    }

    /// Enable read-before-write auditing.
    pub fn with_verbose_memory(mut self, verbose: bool) -> Self {
        self.verbose_memory = verbose;
        self
    }

    /// Accessor matching this plan's auditing setting.
    pub fn accessor(&self) -> VarAccessor {
        if self.verbose_memory { VarAccessor::verbose() } else { VarAccessor::new() }
    }
}

fn udp_port_pair() -> Vec<PortParameter> {
    vec![
        PortParameter::allocated("udp_server_port", "server"),
        PortParameter::allocated("udp_client_port", "client"),
    ]
}
