use crate::*;
use std::sync::Mutex;

/// Append-only audit trail of everything the registry does.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ElectionCreated {
        election_id: ElectionId,
        creator: Principal,
        organization: String,
    },
    CandidatesUpdated {
        election_id: ElectionId,
        count: usize,
    },
    StateChanged {
        election_id: ElectionId,
        from: ElectionState,
        to: ElectionState,
    },
    EmergencyPause {
        election_id: ElectionId,
        by: Principal,
        reason: String,
    },
    Resumed {
        election_id: ElectionId,
        by: Principal,
        to: ElectionState,
    },
    VoteCast {
        election_id: ElectionId,
        nullifier: FieldElement,
        timestamp: u64,
    },
    Tallied {
        election_id: ElectionId,
        counted: u64,
        rejected: u64,
    },
    Audited {
        election_id: ElectionId,
        #[serde(with = "Hex32")]
        audit_hash: [u8; 32],
        passed: bool,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemEventLog {
    events: Mutex<Vec<Event>>,
}

impl MemEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemEventLog {
    fn emit(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Writes each event as a JSON line at info level.
#[derive(Debug, Default, Copy, Clone)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "zkballot::events", "{}", json),
            Err(e) => error!(target: "zkballot::events", "unable to encode event: {}", e),
        }
    }
}
