//! Runtime block domain types and round extraction.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use crate::error::DecodeError;

/// Size of namespaces and hashes on the wire.
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-512/256 digest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    /// Wrap raw digest bytes.
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Digest of `data`.
    pub fn digest(data: &[u8]) -> Self {
        Self(Sha512_256::digest(data).into())
    }

    /// Parse a hash from raw bytes, naming `field` in errors.
    pub fn from_slice(field: &'static str, bytes: &[u8]) -> Result<Self, DecodeError> {
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| DecodeError::InvalidLength {
            field,
            expected: HASH_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Namespace identifying a runtime (paratime) on the consensus layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuntimeId([u8; HASH_SIZE]);

impl RuntimeId {
    /// Sapphire mainnet.
    pub const SAPPHIRE: RuntimeId = RuntimeId([
        0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xf8, 0x03, 0x06,
        0xc9, 0x85, 0x8e, 0x72, 0x79,
    ]);

    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a runtime id from raw bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        Hash::from_slice("runtime_id", bytes).map(|h| Self(h.0))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl Default for RuntimeId {
    fn default() -> Self {
        Self::SAPPHIRE
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for RuntimeId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| DecodeError::InvalidHex {
            field: "runtime_id",
            reason: e.to_string(),
        })?;
        Self::from_slice(&bytes)
    }
}

/// Header of a runtime block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u16,
    pub namespace: RuntimeId,
    pub round: u64,
    /// Unix seconds.
    pub timestamp: u64,
    pub header_type: u8,
    pub previous_hash: Hash,
    pub io_root: Hash,
    pub state_root: Hash,
    pub messages_hash: Hash,
    pub in_messages_hash: Hash,
}

impl BlockHeader {
    /// Fixed-order byte encoding the block hash is computed over.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + 8 + 8 + 1 + HASH_SIZE * 6);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(self.namespace.as_bytes());
        buf.extend_from_slice(&self.round.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.push(self.header_type);
        for h in [
            &self.previous_hash,
            &self.io_root,
            &self.state_root,
            &self.messages_hash,
            &self.in_messages_hash,
        ] {
            buf.extend_from_slice(h.as_bytes());
        }
        buf
    }

    /// Hash identifying this block.
    pub fn encoded_hash(&self) -> Hash {
        Hash::digest(&self.canonical_bytes())
    }
}

/// An event emitted by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundEvent {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Emitting transaction; `None` for block-level events.
    pub tx_hash: Option<Hash>,
}

/// A transaction together with its execution result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundTransaction {
    pub tx: Vec<u8>,
    pub result: Vec<u8>,
    pub events: Vec<RoundEvent>,
}

impl RoundTransaction {
    /// Hash of the raw transaction.
    pub fn hash(&self) -> Hash {
        Hash::digest(&self.tx)
    }
}

/// Everything extracted from one round, printed as the task message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u64,
    pub timestamp: u64,
    pub hash: Hash,
    pub num_transactions: usize,
    pub num_events: usize,
}

impl RoundSummary {
    /// Validate a fetched round and summarize it.
    ///
    /// Transactions must carry a body and a result, every event needs a key,
    /// and every transaction-scoped event must reference a transaction of
    /// the same round.
    pub fn extract(
        header: &BlockHeader,
        transactions: &[RoundTransaction],
        events: &[RoundEvent],
    ) -> Result<Self, DecodeError> {
        let mut tx_hashes = Vec::with_capacity(transactions.len());
        for (index, tx) in transactions.iter().enumerate() {
            if tx.tx.is_empty() {
                return Err(DecodeError::MalformedTransaction {
                    index,
                    reason: "empty body".to_string(),
                });
            }
            if tx.result.is_empty() {
                return Err(DecodeError::MalformedTransaction {
                    index,
                    reason: "missing result".to_string(),
                });
            }
            if tx.events.iter().any(|ev| ev.key.is_empty()) {
                return Err(DecodeError::MalformedTransaction {
                    index,
                    reason: "event without key".to_string(),
                });
            }
            tx_hashes.push(tx.hash());
        }

        for (index, ev) in events.iter().enumerate() {
            if ev.key.is_empty() {
                return Err(DecodeError::MalformedEvent {
                    index,
                    reason: "empty key".to_string(),
                });
            }
            if let Some(tx_hash) = &ev.tx_hash {
                if !tx_hashes.contains(tx_hash) {
                    return Err(DecodeError::MalformedEvent {
                        index,
                        reason: format!("unknown transaction {tx_hash}"),
                    });
                }
            }
        }

        Ok(Self {
            round: header.round,
            timestamp: header.timestamp,
            hash: header.encoded_hash(),
            num_transactions: transactions.len(),
            num_events: events.len(),
        })
    }
}

impl fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Round: {}, NumTransactions: {}, NumEvents: {}, Hash: {}",
            self.round, self.num_transactions, self.num_events, self.hash
        )
    }
}
