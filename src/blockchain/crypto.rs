use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use log::warn;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;
use std::str::FromStr;

/// Errors that can occur while decoding keys or signatures
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// Public identifier of an identity (public key in base58 format)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Creates an address from a public key
    pub fn from_public_key(public_key: &VerifyingKey) -> Self {
        Address(bs58::encode(public_key.as_bytes()).into_string())
    }

    /// Decodes the address back into a public key
    pub fn to_public_key(&self) -> Result<VerifyingKey, CryptoError> {
        let bytes = bs58::decode(&self.0)
            .into_vec()
            .map_err(|e| CryptoError::DecodingError(e.to_string()))?;

        let bytes: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidPublicKey("Invalid public key length".to_string())
        })?;

        VerifyingKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Address(s.to_string());
        address.to_public_key()?;
        Ok(address)
    }
}

/// Raw signature bytes attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalSignature(pub Vec<u8>);

impl DigitalSignature {
    /// Wraps an ed25519 signature
    pub fn from_signature(signature: &Signature) -> Self {
        DigitalSignature(signature.to_bytes().to_vec())
    }

    /// Converts the raw bytes back into an ed25519 signature
    pub fn to_signature(&self) -> Result<Signature, CryptoError> {
        let bytes: [u8; 64] = self.0.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidSignature(format!(
                "expected 64 bytes, got {}",
                self.0.len()
            ))
        })?;

        Ok(Signature::from_bytes(&bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for DigitalSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// A participant's key pair
///
/// The signing key stays inside the identity; callers only ever get the
/// public half or signatures produced with it.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    address: Address,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Identity {
    /// Creates an identity with a random key pair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        Self::from_signing_key(signing_key)
    }

    /// Creates an identity from an existing 32-byte secret key
    pub fn from_secret_key(secret_key_bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = secret_key_bytes.try_into().map_err(|_| {
            CryptoError::InvalidPrivateKey("Invalid private key length".to_string())
        })?;

        Ok(Self::from_signing_key(SigningKey::from_bytes(&bytes)))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        let address = Address::from_public_key(&verifying_key);

        Identity {
            signing_key,
            verifying_key,
            address,
        }
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Signs a hex digest with the identity's private key
    pub fn sign(&self, digest: &str) -> DigitalSignature {
        sign(&self.signing_key, digest)
    }
}

/// Signs a digest with a private key
///
/// Ed25519 signing is deterministic: the same key and digest always give the
/// same signature.
pub fn sign(signing_key: &SigningKey, digest: &str) -> DigitalSignature {
    DigitalSignature::from_signature(&signing_key.sign(digest.as_bytes()))
}

/// Verifies a signature over a digest
///
/// Never fails: a malformed signature or a mismatch is logged and reported
/// as `false`.
pub fn verify(public_key: &VerifyingKey, digest: &str, signature: &DigitalSignature) -> bool {
    let signature = match signature.to_signature() {
        Ok(signature) => signature,
        Err(err) => {
            warn!("Error - Signature invalid: {}", err);
            return false;
        }
    };

    match public_key.verify(digest.as_bytes(), &signature) {
        Ok(()) => true,
        Err(err) => {
            warn!("Error - Signature invalid: {}", err);
            false
        }
    }
}

/// Verifies a signature against the public key encoded in an address
pub fn verify_with_address(address: &Address, digest: &str, signature: &DigitalSignature) -> bool {
    match address.to_public_key() {
        Ok(public_key) => verify(&public_key, digest, signature),
        Err(err) => {
            warn!("Error - cannot verify signature for {}: {}", address, err);
            false
        }
    }
}
