use sha2::{Digest, Sha256};
use std::fmt::{Display, Write};

/// Length of a hex-encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

/// Builds a deterministic digest over an ordered list of fields
///
/// Fields are rendered with `Display` and concatenated in the order they were
/// pushed. The concatenation is then JSON-encoded as a single string, which is
/// the canonical form that gets hashed. The same logical fields always yield
/// the same canonical string, no matter where the engine is used from.
#[derive(Debug, Default, Clone)]
pub struct HashEngine {
    buffer: String,
}

impl HashEngine {
    /// Creates an engine with no fields
    pub fn new() -> Self {
        HashEngine {
            buffer: String::new(),
        }
    }

    /// Appends a field to the canonical input
    pub fn field<T: Display + ?Sized>(mut self, value: &T) -> Self {
        let _ = write!(self.buffer, "{}", value);
        self
    }

    /// Returns the canonical string that will be digested
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.buffer).unwrap_or_else(|_| format!("{:?}", self.buffer))
    }

    /// Consumes the engine and returns the lowercase hex digest
    pub fn finish(self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Hashes a sequence of fields in one call
pub fn digest_fields(fields: &[&dyn Display]) -> String {
    fields
        .iter()
        .fold(HashEngine::new(), |engine, value| engine.field(value))
        .finish()
}
