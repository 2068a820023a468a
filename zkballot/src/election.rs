use crate::*;
use num_enum::TryFromPrimitive;
use std::fmt;
use std::str::FromStr;

/// Election identifier, handed out by a monotonic counter.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ElectionId(pub u64);

impl ElectionId {
    /// `hash_to_field` of the id as a big-endian u64. This is the election
    /// signal a vote proof commits to.
    pub fn field_hash(&self) -> FieldElement {
        hash_to_field(&self.0.to_be_bytes())
    }
}

impl fmt::Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ElectionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(ElectionId)
            .map_err(|_| Error::InvalidElectionId)
    }
}

/// Election lifecycle.
///
/// Elections move forward one step at a time:
/// `Setup -> Active -> Ended -> Tallied -> Audited`.
/// `Paused` is a side state entered by an emergency pause and left by an
/// explicit resume back to the state it was entered from.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, TryFromPrimitive,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ElectionState {
    Setup = 0,
    Active = 1,
    Paused = 2,
    Ended = 3,
    Tallied = 4,
    Audited = 5,
}

impl ElectionState {
    /// The only state this one may advance to, if any.
    pub fn next(self) -> Option<ElectionState> {
        match self {
            ElectionState::Setup => Some(ElectionState::Active),
            ElectionState::Active => Some(ElectionState::Ended),
            ElectionState::Ended => Some(ElectionState::Tallied),
            ElectionState::Tallied => Some(ElectionState::Audited),
            ElectionState::Paused | ElectionState::Audited => None,
        }
    }

    /// Whether an emergency pause may be entered from this state.
    pub fn pausable(self) -> bool {
        matches!(
            self,
            ElectionState::Setup | ElectionState::Active | ElectionState::Ended
        )
    }

    /// Results have been computed; nothing can reopen voting.
    pub fn is_final(self) -> bool {
        matches!(self, ElectionState::Tallied | ElectionState::Audited)
    }

    /// Check a forward transition.
    pub fn advance_to(self, to: ElectionState) -> Result<ElectionState, Error> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(Error::InvalidStateTransition { from: self, to })
        }
    }
}

impl fmt::Display for ElectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ElectionState::Setup => "setup",
            ElectionState::Active => "active",
            ElectionState::Paused => "paused",
            ElectionState::Ended => "ended",
            ElectionState::Tallied => "tallied",
            ElectionState::Audited => "audited",
        };
        write!(f, "{}", name)
    }
}

/// What an election manager supplies to create an election.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ElectionParams {
    pub title: String,
    pub candidates: Vec<String>,

    /// Unix seconds, inclusive
    pub start_time: u64,

    /// Unix seconds, inclusive
    pub end_time: u64,

    /// Root of the eligibility tree over all eligible voters
    pub eligibility_root: FieldElement,

    /// Ballots are encrypted to this key
    pub encryption_key: ElectionPublicKey,

    /// Multi-tenant organization tag
    pub organization: String,

    /// Results stay sealed until an auditor has signed off
    pub requires_audit: bool,
}

impl ElectionParams {
    /// Check limits, and that the window has not already closed at `now`.
    pub fn validate(&self, now: u64, config: &ProtocolConfig) -> Result<(), Error> {
        validate_candidates(&self.candidates, config)?;
        validate_time_range(self.start_time, self.end_time, config)?;

        // An election that can never open is a caller error
        if self.end_time <= now {
            return Err(Error::InvalidTimeRange(config.min_duration, config.max_duration));
        }
        Ok(())
    }
}

/// Auditor sign-off on a tallied election.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    #[serde(with = "Hex32")]
    pub audit_hash: [u8; 32],
    pub passed: bool,
    pub auditor: Principal,
    pub timestamp: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    pub candidates: Vec<String>,
    pub start_time: u64,
    pub end_time: u64,
    pub eligibility_root: FieldElement,

    /// Depth of the eligibility tree; membership paths must have exactly this length
    pub tree_depth: usize,

    pub encryption_key: ElectionPublicKey,
    pub state: ElectionState,

    /// State to return to on resume, set while paused
    pub paused_from: Option<ElectionState>,

    pub creator: Principal,
    pub organization: String,
    pub requires_audit: bool,
    pub created_at: u64,
    pub audit: Option<AuditRecord>,
}

impl Election {
    /// Validate `params` and build an election in `Setup`.
    pub fn new(
        id: ElectionId,
        params: ElectionParams,
        creator: Principal,
        now: u64,
        config: &ProtocolConfig,
    ) -> Result<Self, Error> {
        params.validate(now, config)?;

        Ok(Election {
            id,
            title: params.title,
            candidates: params.candidates,
            start_time: params.start_time,
            end_time: params.end_time,
            eligibility_root: params.eligibility_root,
            tree_depth: config.tree_depth,
            encryption_key: params.encryption_key,
            state: ElectionState::Setup,
            paused_from: None,
            creator,
            organization: params.organization,
            requires_audit: params.requires_audit,
            created_at: now,
            audit: None,
        })
    }

    pub fn num_candidates(&self) -> u32 {
        self.candidates.len() as u32
    }

    /// What a voter client needs to build a ballot for this election.
    pub fn ballot_context(&self) -> BallotContext {
        BallotContext {
            election_id: self.id,
            num_candidates: self.num_candidates(),
            tree_depth: self.tree_depth,
        }
    }

    /// Votes are accepted only in `Active` and inside the window.
    pub fn is_open_at(&self, now: u64) -> bool {
        self.state == ElectionState::Active && self.start_time <= now && now <= self.end_time
    }

    /// The voting window has closed.
    pub fn has_expired(&self, now: u64) -> bool {
        now > self.end_time
    }

    /// Seconds until voting closes, zero once it has.
    pub fn time_remaining(&self, now: u64) -> u64 {
        self.end_time.saturating_sub(now)
    }
}

/// Candidate count must be within `2..=max_candidates`.
pub fn validate_candidates(candidates: &[String], config: &ProtocolConfig) -> Result<(), Error> {
    if candidates.len() < 2 || candidates.len() > config.max_candidates {
        return Err(Error::TooManyCandidates(config.max_candidates, candidates.len()));
    }
    Ok(())
}

/// `start < end` and the duration within `min_duration..=max_duration`.
pub fn validate_time_range(start: u64, end: u64, config: &ProtocolConfig) -> Result<(), Error> {
    if start >= end {
        return Err(Error::InvalidTimeRange(config.min_duration, config.max_duration));
    }
    let duration = end - start;
    if duration < config.min_duration || duration > config.max_duration {
        return Err(Error::InvalidTimeRange(config.min_duration, config.max_duration));
    }
    Ok(())
}
