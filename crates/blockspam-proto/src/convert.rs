//! Converters between proto types and domain types.

use crate::pb;
use blockspam_core::block::Hash;
use blockspam_core::{BlockHeader, DecodeError, RoundEvent, RoundSummary, RoundTransaction, RuntimeId};

// ============================================================================
// BlockHeader conversions
// ============================================================================

impl TryFrom<pb::BlockHeader> for BlockHeader {
    type Error = DecodeError;

    fn try_from(h: pb::BlockHeader) -> Result<Self, Self::Error> {
        Ok(Self {
            version: u16::try_from(h.version).map_err(|_| DecodeError::OutOfRange {
                field: "version",
                value: u64::from(h.version),
            })?,
            namespace: RuntimeId::from_slice(&h.namespace)?,
            round: h.round,
            timestamp: h.timestamp,
            header_type: u8::try_from(h.header_type).map_err(|_| DecodeError::OutOfRange {
                field: "header_type",
                value: u64::from(h.header_type),
            })?,
            previous_hash: Hash::from_slice("previous_hash", &h.previous_hash)?,
            io_root: Hash::from_slice("io_root", &h.io_root)?,
            state_root: Hash::from_slice("state_root", &h.state_root)?,
            messages_hash: Hash::from_slice("messages_hash", &h.messages_hash)?,
            in_messages_hash: Hash::from_slice("in_messages_hash", &h.in_messages_hash)?,
        })
    }
}

impl TryFrom<pb::Block> for BlockHeader {
    type Error = DecodeError;

    fn try_from(block: pb::Block) -> Result<Self, Self::Error> {
        block
            .header
            .ok_or(DecodeError::MissingField("header"))?
            .try_into()
    }
}

impl From<&BlockHeader> for pb::BlockHeader {
    fn from(h: &BlockHeader) -> Self {
        Self {
            version: u32::from(h.version),
            namespace: h.namespace.as_bytes().to_vec(),
            round: h.round,
            timestamp: h.timestamp,
            header_type: u32::from(h.header_type),
            previous_hash: h.previous_hash.as_bytes().to_vec(),
            io_root: h.io_root.as_bytes().to_vec(),
            state_root: h.state_root.as_bytes().to_vec(),
            messages_hash: h.messages_hash.as_bytes().to_vec(),
            in_messages_hash: h.in_messages_hash.as_bytes().to_vec(),
        }
    }
}

// ============================================================================
// Event / transaction conversions
// ============================================================================

impl TryFrom<pb::Event> for RoundEvent {
    type Error = DecodeError;

    fn try_from(ev: pb::Event) -> Result<Self, Self::Error> {
        let tx_hash = if ev.tx_hash.is_empty() {
            None
        } else {
            Some(Hash::from_slice("tx_hash", &ev.tx_hash)?)
        };
        Ok(Self {
            key: ev.key,
            value: ev.value,
            tx_hash,
        })
    }
}

impl From<&RoundEvent> for pb::Event {
    fn from(ev: &RoundEvent) -> Self {
        Self {
            key: ev.key.clone(),
            value: ev.value.clone(),
            tx_hash: ev
                .tx_hash
                .map(|h| h.as_bytes().to_vec())
                .unwrap_or_default(),
        }
    }
}

impl TryFrom<pb::TransactionWithResults> for RoundTransaction {
    type Error = DecodeError;

    fn try_from(tx: pb::TransactionWithResults) -> Result<Self, Self::Error> {
        Ok(Self {
            tx: tx.tx,
            result: tx.result,
            events: tx
                .events
                .into_iter()
                .map(RoundEvent::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl From<&RoundTransaction> for pb::TransactionWithResults {
    fn from(tx: &RoundTransaction) -> Self {
        Self {
            tx: tx.tx.clone(),
            result: tx.result.clone(),
            events: tx.events.iter().map(pb::Event::from).collect(),
        }
    }
}

// ============================================================================
// Round decoding
// ============================================================================

/// Turn the three raw responses of a round into its summary.
///
/// Pure transform: no I/O, fails only on malformed data.
pub fn decode_round(
    block: pb::Block,
    transactions: pb::GetTransactionsResponse,
    events: pb::GetEventsResponse,
) -> Result<RoundSummary, DecodeError> {
    let header = BlockHeader::try_from(block)?;
    let transactions: Vec<RoundTransaction> = transactions
        .transactions
        .into_iter()
        .map(RoundTransaction::try_from)
        .collect::<Result<_, _>>()?;
    let events = events
        .events
        .into_iter()
        .enumerate()
        .map(|(index, ev)| {
            RoundEvent::try_from(ev).map_err(|e| DecodeError::MalformedEvent {
                index,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    RoundSummary::extract(&header, &transactions, &events)
}
