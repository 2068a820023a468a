use crate::*;
use rand::{CryptoRng, RngCore};
use std::fmt;

/// Length of a voter secret in bytes
pub const SECRET_LENGTH: usize = 32;

/// Credentials a voter holds for one election.
///
/// Only the nullifier (and proofs built from the secret) ever leave the voter's
/// device. The secret must never be transmitted.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct VoterCredential {
    /// `hash_to_field(raw_identity)`, also the voter's eligibility-tree leaf
    pub identity: FieldElement,

    #[serde(with = "Hex32")]
    secret: [u8; SECRET_LENGTH],

    /// `hash_to_field(identity || secret)`
    pub nullifier: FieldElement,
}

impl VoterCredential {
    /// Issue credentials with a fresh secret from the operating system RNG.
    pub fn issue(raw_identity: &str) -> Self {
        let mut csprng = rand::rngs::OsRng {};
        Self::issue_with_rng(raw_identity, &mut csprng)
    }

    pub fn issue_with_rng<R: RngCore + CryptoRng>(raw_identity: &str, rng: &mut R) -> Self {
        let mut secret = [0u8; SECRET_LENGTH];
        rng.fill_bytes(&mut secret);
        Self::from_secret(raw_identity, secret)
    }

    /// Rebuild credentials from a known secret. Same inputs, same nullifier.
    pub fn from_secret(raw_identity: &str, secret: [u8; SECRET_LENGTH]) -> Self {
        let identity = hash_to_field(raw_identity.as_bytes());
        let nullifier = derive_nullifier(&identity, &secret);
        VoterCredential {
            identity,
            secret,
            nullifier,
        }
    }

    pub fn secret(&self) -> &[u8; SECRET_LENGTH] {
        &self.secret
    }

    /// Commitment to a candidate choice under this credential's secret.
    pub fn commitment(&self, candidate: u32) -> FieldElement {
        vote_commitment(&self.secret, candidate)
    }
}

// Keep the secret out of logs and panic messages
impl fmt::Debug for VoterCredential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VoterCredential")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .field("nullifier", &self.nullifier)
            .finish()
    }
}

/// Issue credentials for a raw voter identity.
pub fn issue_credentials(raw_identity: &str) -> VoterCredential {
    VoterCredential::issue(raw_identity)
}

/// `hash_to_field(identity || secret)`
pub fn derive_nullifier(identity: &FieldElement, secret: &[u8; SECRET_LENGTH]) -> FieldElement {
    hash_concat(&[&identity.to_bytes()[..], &secret[..]])
}

/// `hash_to_field(secret || candidate)`, the candidate as a big-endian u32
pub fn vote_commitment(secret: &[u8; SECRET_LENGTH], candidate: u32) -> FieldElement {
    hash_concat(&[&secret[..], &candidate.to_be_bytes()[..]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn nullifier_is_deterministic() {
        let secret = [7u8; SECRET_LENGTH];
        let first = VoterCredential::from_secret("alice@example.com", secret);
        let second = VoterCredential::from_secret("alice@example.com", secret);
        assert_eq!(first.nullifier, second.nullifier);
        assert_eq!(first.identity, hash_to_field(b"alice@example.com"));
    }

    #[test]
    fn fresh_secrets_give_fresh_nullifiers() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let first = VoterCredential::issue_with_rng("alice@example.com", &mut rng);
        let second = VoterCredential::issue_with_rng("alice@example.com", &mut rng);
        assert_eq!(first.identity, second.identity);
        assert_ne!(first.secret(), second.secret());
        assert_ne!(first.nullifier, second.nullifier);

        let os = issue_credentials("alice@example.com");
        assert_ne!(os.nullifier, first.nullifier);
    }

    #[test]
    fn nullifier_does_not_reveal_identity() {
        let credential = VoterCredential::from_secret("bob", [1u8; SECRET_LENGTH]);
        assert_ne!(credential.nullifier, credential.identity);
        assert_ne!(credential.nullifier, hash_to_field(b"bob"));
    }

    #[test]
    fn commitments_bind_choice() {
        let credential = VoterCredential::from_secret("carol", [9u8; SECRET_LENGTH]);
        assert_eq!(credential.commitment(1), credential.commitment(1));
        assert_ne!(credential.commitment(0), credential.commitment(1));

        let other = VoterCredential::from_secret("carol", [8u8; SECRET_LENGTH]);
        assert_ne!(credential.commitment(1), other.commitment(1));
    }

    #[test]
    fn debug_redacts_secret() {
        let credential = VoterCredential::from_secret("dave", [0xaa; SECRET_LENGTH]);
        let printed = format!("{:?}", credential);
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains(&hex::encode([0xaa; SECRET_LENGTH])));
    }

    #[test]
    fn credential_json_keeps_secret_for_the_voter() {
        let credential = VoterCredential::from_secret("erin", [3u8; SECRET_LENGTH]);
        let json = serde_json::to_string(&credential).unwrap();
        let restored: VoterCredential = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, credential);
    }
}
