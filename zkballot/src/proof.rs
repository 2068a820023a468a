//! Vote proofs.
//!
//! A vote proof ties four public signals together: the eligibility root, the
//! voter's nullifier, the election id hash and the commitment to the candidate
//! choice. It is also bound to a hash of the encrypted vote, so the ciphertext
//! cannot be replaced in transit. The proving backend sits behind [`ProofSystem`] so that a zk-SNARK
//! circuit can replace the reference backend without changing any caller.

use crate::*;
use curve25519_dalek::constants::RISTRETTO_BASEPOINT_TABLE;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use sha2::Sha512;
use std::collections::BTreeSet;
use std::convert::TryInto;

const PROOF_KEY_DOMAIN: &[u8] = b"zkballot/proof-key";
const CHALLENGE_DOMAIN: &[u8] = b"zkballot/vote-proof";
const BALLOT_DOMAIN: &[u8] = b"zkballot/encrypted-vote";

/// Length of a [`SchnorrProofSystem`] proof: public key, commitment, response.
pub const SCHNORR_PROOF_LENGTH: usize = 96;

/// The public statement a vote proof is checked against.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicSignals {
    pub root: FieldElement,
    pub nullifier: FieldElement,
    pub election_id_hash: FieldElement,
    pub commitment: FieldElement,

    /// Hash of the encrypted vote this proof travels with
    pub ballot_hash: FieldElement,
}

impl PublicSignals {
    /// Signals in circuit order: root, nullifier, election id hash, commitment.
    pub fn to_array(&self) -> [FieldElement; 4] {
        [
            self.root.clone(),
            self.nullifier.clone(),
            self.election_id_hash.clone(),
            self.commitment.clone(),
        ]
    }

    /// Canonical encoding hashed into the proof transcript.
    pub fn as_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(serde_cbor::to_vec(&(self.to_array(), &self.ballot_hash))?)
    }
}

/// Field hash of an encrypted vote, carried in [`PublicSignals::ballot_hash`].
pub fn ballot_hash(encrypted_vote: &[u8]) -> FieldElement {
    hash_concat(&[BALLOT_DOMAIN, encrypted_vote])
}

/// What a voter client must know about the election it votes in.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BallotContext {
    pub election_id: ElectionId,
    pub num_candidates: u32,
    pub tree_depth: usize,
}

/// Opaque proof produced by a [`ProofSystem`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(transparent)]
pub struct ProofBlob(#[serde(with = "hex_serde")] pub Vec<u8>);

impl ProofBlob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Private inputs known only to the voter.
pub struct VoteWitness<'a> {
    pub credential: &'a VoterCredential,
    pub candidate: u32,
    pub num_candidates: u32,
    pub tree_depth: usize,
    pub eligibility: &'a EligibilityProof,
}

/// A proving backend.
///
/// `prove` must attest, without revealing the witness, that:
///  - the witness identity is a leaf of the `tree_depth` tree with root `signals.root`
///  - `signals.nullifier` was derived from that identity and the witness secret
///  - `signals.commitment` commits to the witness candidate under the same secret
///  - the candidate is below `num_candidates`
///
/// `verify` must reject any blob that does not attest to exactly these signals,
/// `signals.ballot_hash` included.
pub trait ProofSystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn prove(&self, signals: &PublicSignals, witness: &VoteWitness) -> Result<ProofBlob, Error>;

    fn verify(&self, signals: &PublicSignals, blob: &ProofBlob) -> bool;
}

/// Reference backend: a Schnorr proof of knowledge over Ristretto.
///
/// The prover refuses any witness that does not satisfy the statement, then
/// proves knowledge of a key derived from the voter secret, bound by
/// Fiat-Shamir to all public signals. No signal can be swapped after the fact,
/// but unlike a circuit backend it does not let the verifier check membership
/// itself: the key is derived from the voter secret alone, so anyone who knows
/// the root can prove for a made-up credential with a fresh nullifier.
/// Eligibility is enforced only against provers that run this code unmodified.
#[derive(Debug, Default, Copy, Clone)]
pub struct SchnorrProofSystem;

impl SchnorrProofSystem {
    fn challenge(
        public: &CompressedRistretto,
        nonce_commitment: &CompressedRistretto,
        signals: &[u8],
    ) -> Scalar {
        let mut transcript =
            Vec::with_capacity(CHALLENGE_DOMAIN.len() + 64 + signals.len());
        transcript.extend_from_slice(CHALLENGE_DOMAIN);
        transcript.extend_from_slice(public.as_bytes());
        transcript.extend_from_slice(nonce_commitment.as_bytes());
        transcript.extend_from_slice(signals);
        Scalar::hash_from_bytes::<Sha512>(&transcript)
    }

    fn check_witness(signals: &PublicSignals, witness: &VoteWitness) -> Result<(), Error> {
        let credential = witness.credential;
        if !verify_membership(
            witness.eligibility,
            &signals.root,
            &credential.identity,
            witness.tree_depth,
        ) {
            return Err(Error::ProofGeneration(
                "identity is not a member of the eligibility tree".into(),
            ));
        }
        if signals.nullifier != credential.nullifier
            || signals.nullifier != derive_nullifier(&credential.identity, credential.secret())
        {
            return Err(Error::ProofGeneration(
                "nullifier does not match the credential".into(),
            ));
        }
        if signals.commitment != credential.commitment(witness.candidate) {
            return Err(Error::ProofGeneration(
                "commitment does not match the candidate choice".into(),
            ));
        }
        if witness.candidate >= witness.num_candidates {
            return Err(Error::ProofGeneration(format!(
                "candidate {} out of range for {} candidates",
                witness.candidate, witness.num_candidates
            )));
        }
        Ok(())
    }
}

impl ProofSystem for SchnorrProofSystem {
    fn name(&self) -> &'static str {
        "schnorr-ristretto"
    }

    fn prove(&self, signals: &PublicSignals, witness: &VoteWitness) -> Result<ProofBlob, Error> {
        Self::check_witness(signals, witness)?;

        let mut key_material = Vec::with_capacity(PROOF_KEY_DOMAIN.len() + SECRET_LENGTH);
        key_material.extend_from_slice(PROOF_KEY_DOMAIN);
        key_material.extend_from_slice(witness.credential.secret());
        let secret = Scalar::hash_from_bytes::<Sha512>(&key_material);
        let public = (&secret * &RISTRETTO_BASEPOINT_TABLE).compress();

        let mut csprng = rand::rngs::OsRng {};
        let nonce = Scalar::random(&mut csprng);
        let nonce_commitment = (&nonce * &RISTRETTO_BASEPOINT_TABLE).compress();

        let challenge = Self::challenge(&public, &nonce_commitment, &signals.as_bytes()?);
        let response = nonce + challenge * secret;

        let mut blob = Vec::with_capacity(SCHNORR_PROOF_LENGTH);
        blob.extend_from_slice(public.as_bytes());
        blob.extend_from_slice(nonce_commitment.as_bytes());
        blob.extend_from_slice(response.as_bytes());
        Ok(ProofBlob(blob))
    }

    fn verify(&self, signals: &PublicSignals, blob: &ProofBlob) -> bool {
        let bytes = blob.as_bytes();
        if bytes.len() != SCHNORR_PROOF_LENGTH {
            return false;
        }
        let encoded_signals = match signals.as_bytes() {
            Ok(encoded) => encoded,
            Err(_) => return false,
        };

        let public = CompressedRistretto::from_slice(&bytes[0..32]);
        let nonce_commitment = CompressedRistretto::from_slice(&bytes[32..64]);
        let response: [u8; 32] = match bytes[64..96].try_into() {
            Ok(response) => response,
            Err(_) => return false,
        };

        let public_point: RistrettoPoint = match public.decompress() {
            Some(point) => point,
            None => return false,
        };
        let nonce_point: RistrettoPoint = match nonce_commitment.decompress() {
            Some(point) => point,
            None => return false,
        };
        let response = match Scalar::from_canonical_bytes(response) {
            Some(scalar) => scalar,
            None => return false,
        };

        let challenge = Self::challenge(&public, &nonce_commitment, &encoded_signals);
        &response * &RISTRETTO_BASEPOINT_TABLE == nonce_point + challenge * public_point
    }
}

/// A vote proof as submitted by a voter client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VoteProof {
    pub proof: ProofBlob,
    pub public_signals: PublicSignals,
    pub nullifier_hash: FieldElement,
    pub commitment: FieldElement,
}

/// Produce a vote proof for `candidate`, bound to `encrypted_vote`.
///
/// Runs entirely on the voter's side; nothing here is transmitted.
pub fn generate_vote_proof(
    system: &dyn ProofSystem,
    credential: &VoterCredential,
    candidate: u32,
    eligibility: &EligibilityProof,
    context: &BallotContext,
    encrypted_vote: &[u8],
) -> Result<VoteProof, Error> {
    let commitment = credential.commitment(candidate);
    let public_signals = PublicSignals {
        root: eligibility.root.clone(),
        nullifier: credential.nullifier.clone(),
        election_id_hash: context.election_id.field_hash(),
        commitment: commitment.clone(),
        ballot_hash: ballot_hash(encrypted_vote),
    };
    let witness = VoteWitness {
        credential,
        candidate,
        num_candidates: context.num_candidates,
        tree_depth: context.tree_depth,
        eligibility,
    };
    let proof = system.prove(&public_signals, &witness)?;

    Ok(VoteProof {
        proof,
        nullifier_hash: credential.nullifier.clone(),
        commitment,
        public_signals,
    })
}

/// Outcome of checking one vote proof. All findings are reported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    pub errors: Vec<ProofError>,
}

impl Verification {
    /// First finding as an error. Findings are ordered: already voted, not
    /// eligible, election mismatch, invalid proof.
    pub fn into_result(self) -> Result<(), Error> {
        match self.errors.first() {
            Some(err) => Err((*err).into()),
            None => Ok(()),
        }
    }
}

/// Check a vote proof against an election without touching shared state.
///
/// The ciphertext is not seen here; a submission's `ballot_hash` is checked by
/// [`BallotSubmission::is_consistent`].
///
/// Recording the nullifier on success is the caller's job, which keeps this
/// check idempotent.
pub fn verify_vote_proof(
    system: &dyn ProofSystem,
    proof: &VoteProof,
    expected_root: &FieldElement,
    election_id: ElectionId,
    used_nullifiers: &BTreeSet<FieldElement>,
) -> Verification {
    let mut errors = Vec::new();
    let signals = &proof.public_signals;

    if used_nullifiers.contains(&proof.nullifier_hash) {
        errors.push(ProofError::AlreadyVoted);
    }
    if signals.root != *expected_root {
        errors.push(ProofError::VoterNotEligible);
    }
    if signals.election_id_hash != election_id.field_hash() {
        errors.push(ProofError::ElectionMismatch);
    }
    if proof.nullifier_hash != signals.nullifier
        || proof.commitment != signals.commitment
        || !system.verify(signals, &proof.proof)
    {
        errors.push(ProofError::InvalidZKProof);
    }

    debug!(
        "verified vote proof for election {} with {}: {} finding(s)",
        election_id,
        system.name(),
        errors.len()
    );

    Verification {
        valid: errors.is_empty(),
        errors,
    }
}

/// Result of verifying a batch of proofs in order.
#[derive(Debug, Clone)]
pub struct BatchVerification {
    pub valid_proofs: Vec<VoteProof>,
    pub invalid_proofs: Vec<(VoteProof, Vec<ProofError>)>,
    pub used_nullifiers: BTreeSet<FieldElement>,
}

/// Verify proofs in input order. Each accepted nullifier joins the used set
/// before the next proof is checked, so a repeat inside the batch is
/// `AlreadyVoted`, as is one already in `used_nullifiers`.
pub fn batch_verify(
    system: &dyn ProofSystem,
    proofs: Vec<VoteProof>,
    root: &FieldElement,
    election_id: ElectionId,
    mut used_nullifiers: BTreeSet<FieldElement>,
) -> BatchVerification {
    let mut valid_proofs = Vec::new();
    let mut invalid_proofs = Vec::new();

    for proof in proofs {
        let verification = verify_vote_proof(system, &proof, root, election_id, &used_nullifiers);
        if verification.valid {
            used_nullifiers.insert(proof.nullifier_hash.clone());
            valid_proofs.push(proof);
        } else {
            invalid_proofs.push((proof, verification.errors));
        }
    }

    BatchVerification {
        valid_proofs,
        invalid_proofs,
        used_nullifiers,
    }
}
