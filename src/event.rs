use crate::filter::Filter;
use crate::identifier::Identifier;
use crate::record::{Record, RecordIds};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// What happened in the IDE.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    Activity,
    Command { command_id: String },
    UserProfile { profile_id: String },
    Other { name: String, payload: String },
}

/// One captured IDE interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode, Serialize, Deserialize)]
pub struct Event {
    /// Milliseconds since the unix epoch.
    pub triggered_at: i64,
    pub session_id: Option<String>,
    pub kind: EventKind,
}

impl Event {
    pub fn activity(triggered_at: i64, session_id: &str) -> Self {
        Event {
            triggered_at,
            session_id: Some(session_id.to_string()),
            kind: EventKind::Activity,
        }
    }

    pub fn command(triggered_at: i64, command_id: &str) -> Self {
        Event {
            triggered_at,
            session_id: None,
            kind: EventKind::Command {
                command_id: command_id.to_string(),
            },
        }
    }

    pub fn profile(triggered_at: i64, profile_id: &str) -> Self {
        Event {
            triggered_at,
            session_id: None,
            kind: EventKind::UserProfile {
                profile_id: profile_id.to_string(),
            },
        }
    }

    pub fn in_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }
}

impl Record for Event {
    type Timestamp = i64;

    fn timestamp(&self) -> i64 {
        self.triggered_at
    }

    fn identifiers(&self) -> RecordIds {
        let mut ids = RecordIds::new();
        if let EventKind::UserProfile { profile_id } = &self.kind {
            ids.extend(Identifier::profile(profile_id));
        }
        if let Some(session_id) = &self.session_id {
            ids.extend(Identifier::session(session_id));
        }
        ids
    }
}

/// Drops command events with the given command id.
pub struct CommandFilter {
    command_id: String,
}

impl CommandFilter {
    pub fn new(command_id: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
        }
    }
}

impl Filter<Event> for CommandFilter {
    fn name(&self) -> String {
        format!("command filter: {}", self.command_id)
    }

    fn keep(&self, event: &Event) -> bool {
        match &event.kind {
            EventKind::Command { command_id } => command_id != &self.command_id,
            _ => true,
        }
    }
}
