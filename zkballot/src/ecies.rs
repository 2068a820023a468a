//! ECIES over Curve25519 for ballot encryption.
//!
//! Voters encrypt their candidate choice to the election's public key; only the
//! holder of the matching secret key can open ballots at tally time.
//!   - The secret key is 32 random bytes used directly as a scalar (no ed25519
//!     hashing or bit mangling), so it must come from a good RNG.
//!   - The symmetric key is HKDF-SHA256 over the ephemeral public key and the
//!     shared point; payloads are sealed with AES-256-GCM.

use crate::*;
use aes_gcm::aead::{Aead, NewAead};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use curve25519_dalek::constants;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use hkdf::Hkdf;
use rand::RngCore;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;

pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const SECRET_KEY_LENGTH: usize = 32;
const AES_IV_LENGTH: usize = 12;

type AesKey = [u8; 32];
type SharedSecret = [u8; 32];

/// Secret half of an election encryption keypair. Supplied at tally time.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElectionSecretKey(#[serde(with = "Hex32")] [u8; SECRET_KEY_LENGTH]);

impl ElectionSecretKey {
    pub fn from_bytes(bytes: [u8; SECRET_KEY_LENGTH]) -> Self {
        ElectionSecretKey(bytes)
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.0
    }

    fn scalar(&self) -> Scalar {
        Scalar::from_bits(self.0)
    }
}

impl fmt::Debug for ElectionSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ElectionSecretKey(<redacted>)")
    }
}

/// Public half of an election encryption keypair, stored on the election.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct ElectionPublicKey {
    compressed: CompressedEdwardsY,
    point: EdwardsPoint,
}

impl ElectionPublicKey {
    /// Derive a public key from a secret key
    pub fn from_secret(sk: &ElectionSecretKey) -> Self {
        let point = &sk.scalar() * &constants::ED25519_BASEPOINT_TABLE;
        ElectionPublicKey {
            compressed: point.compress(),
            point,
        }
    }

    /// Construct a public key from its compressed encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(Error::InvalidKey);
        }
        let compressed = CompressedEdwardsY::from_slice(bytes);
        let point = compressed.decompress().ok_or(Error::InvalidKey)?;
        Ok(ElectionPublicKey { compressed, point })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.compressed.to_bytes()
    }
}

impl fmt::Debug for ElectionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ElectionPublicKey({})", self)
    }
}

impl fmt::Display for ElectionPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl FromStr for ElectionPublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHex)?;
        ElectionPublicKey::from_bytes(&bytes)
    }
}

impl Serialize for ElectionPublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ElectionPublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ElectionPublicKey::from_str(&s).map_err(de::Error::custom)
    }
}

/// Generate a keypair, ready for use in ECIES
pub fn generate_keypair() -> (ElectionSecretKey, ElectionPublicKey) {
    let mut csprng = rand::rngs::OsRng {};
    let mut secret = [0u8; SECRET_KEY_LENGTH];
    csprng.fill_bytes(&mut secret);
    let secret = ElectionSecretKey(secret);
    let public = ElectionPublicKey::from_secret(&secret);
    (secret, public)
}

/// Encrypt a message using ECIES, it can only be decrypted by the receiver's secret key.
pub fn encrypt(receiver_pub: &ElectionPublicKey, msg: &[u8]) -> Result<Vec<u8>, Error> {
    let (ephemeral_sk, ephemeral_pk) = generate_keypair();

    let aes_key = encapsulate(&ephemeral_sk, receiver_pub)?;
    let encrypted = aes_encrypt(&aes_key, msg)?;

    let mut cipher_text = Vec::with_capacity(PUBLIC_KEY_LENGTH + encrypted.len());
    cipher_text.extend(ephemeral_pk.to_bytes().iter());
    cipher_text.extend(encrypted);

    Ok(cipher_text)
}

/// Decrypt a ECIES encrypted ciphertext using the receiver's secret key.
pub fn decrypt(receiver_sec: &ElectionSecretKey, msg: &[u8]) -> Result<Vec<u8>, Error> {
    if msg.len() < PUBLIC_KEY_LENGTH + AES_IV_LENGTH {
        return Err(Error::DecryptionError);
    }

    let ephemeral_pk = ElectionPublicKey::from_bytes(&msg[..PUBLIC_KEY_LENGTH])
        .map_err(|_| Error::DecryptionError)?;
    let encrypted = &msg[PUBLIC_KEY_LENGTH..];
    let aes_key = decapsulate(receiver_sec, &ephemeral_pk)?;

    aes_decrypt(&aes_key, encrypted)
}

fn hkdf_sha256(master: &[u8]) -> Result<AesKey, Error> {
    let h = Hkdf::<Sha256>::new(None, master);
    let mut out = [0u8; 32];
    h.expand(&[], &mut out).map_err(|_| Error::EncryptionError)?;
    Ok(out)
}

fn generate_shared(secret: &ElectionSecretKey, public: &ElectionPublicKey) -> SharedSecret {
    let shared_point = public.point * secret.scalar();
    shared_point.compress().to_bytes()
}

fn encapsulate(ephemeral_sk: &ElectionSecretKey, peer_pk: &ElectionPublicKey) -> Result<AesKey, Error> {
    let shared_point = generate_shared(ephemeral_sk, peer_pk);
    let ephemeral_pk = ElectionPublicKey::from_secret(ephemeral_sk);

    let mut master = Vec::with_capacity(32 * 2);
    master.extend(ephemeral_pk.to_bytes().iter());
    master.extend(shared_point.iter());
    hkdf_sha256(master.as_slice())
}

fn decapsulate(sk: &ElectionSecretKey, ephemeral_pk: &ElectionPublicKey) -> Result<AesKey, Error> {
    let shared_point = generate_shared(sk, ephemeral_pk);

    let mut master = Vec::with_capacity(32 * 2);
    master.extend(ephemeral_pk.to_bytes().iter());
    master.extend(shared_point.iter());
    hkdf_sha256(master.as_slice())
}

fn aes_encrypt(key: &AesKey, msg: &[u8]) -> Result<Vec<u8>, Error> {
    let aead = Aes256Gcm::new(Key::from_slice(key));

    let mut nonce = [0u8; AES_IV_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = aead
        .encrypt(Nonce::from_slice(&nonce), msg)
        .map_err(|_| Error::EncryptionError)?;

    let mut output = Vec::with_capacity(AES_IV_LENGTH + ciphertext.len());
    output.extend(nonce.iter());
    output.extend(ciphertext);

    Ok(output)
}

fn aes_decrypt(key: &AesKey, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    if ciphertext.len() < AES_IV_LENGTH {
        return Err(Error::DecryptionError);
    }
    let aead = Aes256Gcm::new(Key::from_slice(key));

    let nonce = Nonce::from_slice(&ciphertext[..AES_IV_LENGTH]);
    let encrypted = &ciphertext[AES_IV_LENGTH..];

    aead.decrypt(nonce, encrypted)
        .map_err(|_| Error::DecryptionError)
}
