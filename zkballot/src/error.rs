use crate::*;

use thiserror::Error;

/// Error types
///
/// Every business-rule rejection has its own variant so that callers can tell
/// "already voted" apart from "not eligible" apart from "malformed proof".
/// `Storage` is the only transient kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("zkballot: election does not exist")]
    InvalidElectionId,

    #[error("zkballot: election is not accepting votes")]
    ElectionNotActive,

    #[error("zkballot: voter is not eligible for this election")]
    VoterNotEligible,

    #[error("zkballot: nullifier already used in this election")]
    AlreadyVoted,

    #[error("zkballot: invalid time range - start must precede end and duration must be within {0}..={1} seconds")]
    InvalidTimeRange(u64, u64),

    #[error("zkballot: candidate count must be within 2..={0}, found {1}")]
    TooManyCandidates(usize, usize),

    #[error("zkballot: vote proof failed verification")]
    InvalidZKProof,

    #[error("zkballot: caller {0} lacks role {1}")]
    UnauthorizedAccess(Principal, Role),

    #[error("zkballot: election has not ended")]
    ElectionNotEnded,

    #[error("zkballot: results require a completed audit")]
    AuditRequired,

    #[error("zkballot: vote proof was produced for a different election")]
    ElectionMismatch,

    #[error("zkballot: illegal state transition from {from} to {to}")]
    InvalidStateTransition {
        from: ElectionState,
        to: ElectionState,
    },

    #[error("zkballot: candidates can only change during setup")]
    CandidatesLocked,

    #[error("zkballot: an emergency pause needs a reason")]
    PauseReasonRequired,

    #[error("zkballot: feature disabled for this deployment: {0}")]
    FeatureDisabled(&'static str),

    #[error("zkballot: eligibility tree holds at most {0} voters")]
    EligibilityTreeFull(usize),

    #[error("zkballot: cannot generate vote proof: {0}")]
    ProofGeneration(String),

    #[error("zkballot: invalid field element")]
    InvalidFieldElement,

    #[error("zkballot: invalid hexidecimal")]
    InvalidHex,

    #[error("zkballot: invalid encryption key")]
    InvalidKey,

    #[error("zkballot: failed to encrypt vote")]
    EncryptionError,

    #[error("zkballot: failed to decrypt vote")]
    DecryptionError,

    #[error("zkballot: configuration error: {0}")]
    Config(String),

    #[error("zkballot: storage error: {0}")]
    Storage(String),

    #[error("zkballot: CBOR error: {0}")]
    CBOR(#[from] serde_cbor::Error),

    #[error("zkballot: JSON error: {0}")]
    JSON(#[from] serde_json::Error),
}

impl Error {
    /// Transient failures come from the storage collaborator and may be retried.
    /// Everything else is a business rule or caller error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

/// A single finding from vote-proof verification.
///
/// Verification reports all findings instead of stopping at the first one.
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofError {
    #[error("nullifier already used")]
    AlreadyVoted,

    #[error("eligibility root mismatch")]
    VoterNotEligible,

    #[error("election id mismatch")]
    ElectionMismatch,

    #[error("proof failed cryptographic verification")]
    InvalidZKProof,
}

impl From<ProofError> for Error {
    fn from(err: ProofError) -> Self {
        match err {
            ProofError::AlreadyVoted => Error::AlreadyVoted,
            ProofError::VoterNotEligible => Error::VoterNotEligible,
            ProofError::ElectionMismatch => Error::ElectionMismatch,
            ProofError::InvalidZKProof => Error::InvalidZKProof,
        }
    }
}
