use crate::*;
use std::convert::TryInto;

/// Everything a voter client sends to `cast_vote`.
///
/// Contains no identity and no secret: the eligibility path stays on the
/// voter's device and only its root appears, inside the public signals.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BallotSubmission {
    pub commitment: FieldElement,

    /// Candidate index, ECIES-encrypted to the election key
    #[serde(with = "hex_serde")]
    pub encrypted_vote: Vec<u8>,

    pub nullifier_hash: FieldElement,
    pub proof: VoteProof,
}

impl BallotSubmission {
    /// The outer commitment and nullifier must repeat the ones the proof covers,
    /// and the encrypted vote must be the one the proof was made for.
    pub fn is_consistent(&self) -> bool {
        self.commitment == self.proof.commitment
            && self.nullifier_hash == self.proof.nullifier_hash
            && ballot_hash(&self.encrypted_vote) == self.proof.public_signals.ballot_hash
    }
}

/// A recorded vote. Append-only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub commitment: FieldElement,

    #[serde(with = "hex_serde")]
    pub encrypted_vote: Vec<u8>,

    pub nullifier_hash: FieldElement,
    pub timestamp: u64,
    pub proof: ProofBlob,
}

impl Ballot {
    pub fn from_submission(submission: BallotSubmission, timestamp: u64) -> Self {
        Ballot {
            commitment: submission.commitment,
            encrypted_vote: submission.encrypted_vote,
            nullifier_hash: submission.nullifier_hash,
            timestamp,
            proof: submission.proof.proof,
        }
    }
}

/// Returned to the voter once their ballot is recorded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub election_id: ElectionId,
    pub nullifier_hash: FieldElement,
    pub ballot_index: u64,
    pub timestamp: u64,
}

/// Encrypt a candidate index (4 bytes, big-endian) to the election key.
pub fn encrypt_vote(election_key: &ElectionPublicKey, candidate: u32) -> Result<Vec<u8>, Error> {
    encrypt(election_key, &candidate.to_be_bytes())
}

/// Open an encrypted vote. Anything but a 4-byte payload is a decryption failure.
pub fn decrypt_vote(election_secret: &ElectionSecretKey, encrypted: &[u8]) -> Result<u32, Error> {
    let decrypted = decrypt(election_secret, encrypted)?;
    let bytes: [u8; 4] = decrypted
        .as_slice()
        .try_into()
        .map_err(|_| Error::DecryptionError)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Build a complete submission on the voter's side.
pub fn prepare_ballot(
    system: &dyn ProofSystem,
    election: &Election,
    credential: &VoterCredential,
    candidate: u32,
    eligibility: &EligibilityProof,
) -> Result<BallotSubmission, Error> {
    let encrypted_vote = encrypt_vote(&election.encryption_key, candidate)?;
    let proof = generate_vote_proof(
        system,
        credential,
        candidate,
        eligibility,
        &election.ballot_context(),
        &encrypted_vote,
    )?;

    Ok(BallotSubmission {
        commitment: proof.commitment.clone(),
        encrypted_vote,
        nullifier_hash: proof.nullifier_hash.clone(),
        proof,
    })
}
