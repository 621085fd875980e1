use log::warn;
use serde::{Deserialize, Serialize};

use super::crypto::{self, Address, DigitalSignature, Identity};
use super::hashing::HashEngine;
use super::timestamp::Timestamp;

/// A signed transfer between two identities
///
/// The hash and signature are produced once, when the transaction is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's public address
    pub sender: Address,

    /// Receiver's public address
    pub receiver: Address,

    /// Amount being transferred
    pub amount: f64,

    /// Time the transaction was created
    pub timestamp: Timestamp,

    /// Digest of (timestamp, sender, receiver, amount)
    pub hash: String,

    /// Sender's signature over `hash`
    pub signature: DigitalSignature,
}

impl Transaction {
    /// Creates and signs a transaction stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `sender` - The identity paying, whose key signs the transaction
    /// * `receiver` - The receiving address
    /// * `amount` - The amount to transfer
    pub fn new(sender: &Identity, receiver: &Address, amount: f64) -> Self {
        Self::with_timestamp(sender, receiver, amount, Timestamp::now())
    }

    /// Creates and signs a transaction with an explicit timestamp
    pub fn with_timestamp(
        sender: &Identity,
        receiver: &Address,
        amount: f64,
        timestamp: Timestamp,
    ) -> Self {
        let hash = Self::compute_hash(&timestamp, sender.address(), receiver, amount);
        let signature = sender.sign(&hash);

        Transaction {
            sender: sender.address().clone(),
            receiver: receiver.clone(),
            amount,
            timestamp,
            hash,
            signature,
        }
    }

    fn compute_hash(timestamp: &Timestamp, sender: &Address, receiver: &Address, amount: f64) -> String {
        HashEngine::new()
            .field(timestamp)
            .field(sender)
            .field(receiver)
            .field(&amount)
            .finish()
    }

    /// Recomputes the digest from the current field values
    pub fn calculate_hash(&self) -> String {
        Self::compute_hash(&self.timestamp, &self.sender, &self.receiver, self.amount)
    }

    /// Checks that the transaction is intact and signed by its sender
    ///
    /// Returns false, never an error, when the fields no longer match the
    /// stored hash or when the signature does not verify under the sender's
    /// public key.
    pub fn verify_transaction(&self) -> bool {
        if self.calculate_hash() != self.hash {
            warn!("Error - transaction {} does not match its contents", self.hash);
            return false;
        }

        crypto::verify_with_address(&self.sender, &self.hash, &self.signature)
    }
}
