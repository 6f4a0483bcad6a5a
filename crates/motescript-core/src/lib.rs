//! Sans-IO core of the motescript test orchestration layer.
//!
//! Drives simulated motes through network exercises: configures firmware
//! variables on every mote, watches the simulator's message stream for
//! failure markers and resolves the run when its simulated-time budget
//! elapses.
//!
//! ## Architecture
//!
//! ```text
//! motescript-core
//!   ├─ TestController   (event-driven state machine, returns actions)
//!   ├─ ScriptDriver     (executes actions, suspends on the simulator)
//!   ├─ PortAllocator    (seeded protocol port selection)
//!   ├─ broadcast        (one binding, every mote)
//!   ├─ VarAccessor      (typed writes to named variables)
//!   └─ Simulator        (clock, timeout, message and node services)
//! ```
//!
//! Nothing in this crate performs I/O. Simulators implement the traits in
//! [`env`]; `motescript-harness` ships a deterministic in-memory one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broadcast;
pub mod controller;
pub mod driver;
pub mod env;
pub mod error;
pub mod memory;
pub mod message;
pub mod plan;
pub mod ports;
pub mod time;

pub use broadcast::{ParameterBinding, broadcast, broadcast_all};
pub use controller::{
    ControllerAction, ControllerEvent, ControllerState, LogLevel, Suspension, TestController,
    Verdict,
};
pub use driver::{BroadcastRecord, EventCursor, RunReport, ScriptDriver};
pub use env::{Environment, SimEvent, Simulator};
pub use error::{AccessError, ControllerError, DriverError, ParseError};
pub use memory::{
    Endianness, MemoryImage, Node, NodeId, Symbol, VarAccessor, VarValue, VarWidth, WriteReport,
};
pub use message::{EventMessage, MessageSource};
pub use plan::{ExpiryPolicy, PortParameter, PortSource, ResetCycle, TestPlan};
pub use ports::PortAllocator;
pub use time::SimTime;
