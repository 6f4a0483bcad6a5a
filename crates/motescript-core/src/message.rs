//! Event messages delivered by the simulator.

use std::{fmt, str::FromStr};

use crate::{error::ParseError, memory::NodeId, time::SimTime};

/// Origin of an event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageSource {
    /// Printed by a mote.
    Mote(NodeId),
    /// Generated by the test plan itself (pacing cues).
    Script,
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mote(id) => write!(f, "{id}"),
            Self::Script => write!(f, "script"),
        }
    }
}

/// A timestamped text notification.
///
/// Rendered and parsed in the simulator's log line format `time:id:text`.
/// The text is kept verbatim, including leading whitespace, because markers
/// such as `" ERROR "` depend on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMessage {
    /// Simulated time of delivery.
    pub time: SimTime,
    /// Originating mote or the plan itself.
    pub source: MessageSource,
    /// Message payload.
    pub text: String,
}

impl EventMessage {
    /// Message printed by mote `id`.
    pub fn from_mote(time: SimTime, id: NodeId, text: impl Into<String>) -> Self {
        Self { time, source: MessageSource::Mote(id), text: text.into() }
    }

    /// Message generated by the plan.
    pub fn from_script(time: SimTime, text: impl Into<String>) -> Self {
        Self { time, source: MessageSource::Script, text: text.into() }
    }
}

impl fmt::Display for EventMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.time, self.source, self.text)
    }
}

impl FromStr for EventMessage {
    type Err = ParseError;

    /// Parse `time:id:text`, where `time` is in microseconds.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.splitn(3, ':');
        let (Some(time), Some(id), Some(text)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseError::Malformed { line: line.to_string() });
        };

        let time = time
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidTime { field: time.to_string() })?;

        let id = id.trim();
        let source = if id == "script" {
            MessageSource::Script
        } else {
            MessageSource::Mote(
                id.parse::<NodeId>()
                    .map_err(|_| ParseError::InvalidNodeId { field: id.to_string() })?,
            )
        };

        Ok(Self { time: SimTime::from_micros(time), source, text: text.to_string() })
    }
}
