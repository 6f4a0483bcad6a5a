//! Deterministic simulation harness for motescript test plans.
//!
//! [`SimWorld`] implements the core [`Simulator`](motescript_core::Simulator)
//! trait with a virtual clock and an ordered event queue, so a plan runs
//! the same way every time for a given seed and scripted mote output.
//! [`Scenario`] wraps world construction, the run and a post-run oracle
//! for tests. The `motescript` binary replays recorded feeds.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod feed;
pub mod scenario;
pub mod sim_mote;
pub mod sim_world;

pub use feed::{FeedError, load_feed, parse_feed};
pub use scenario::{Oracle, Scenario, ScenarioError};
pub use sim_mote::{FIRMWARE_PORT_VARIABLES, SimMemory, SimMote};
pub use sim_world::{SimWorld, SimulatorError};
