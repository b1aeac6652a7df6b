//! Canonical cross-chain transfer messages
//!
//! Every deposit observed on a source chain is translated into exactly one
//! [`Message`]. The message is chain-agnostic: it carries the routing key
//! (source chain, destination chain, nonce) plus the asset-specific payload
//! the destination chain's handler needs to execute the transfer.

use bigdecimal::num_bigint::BigUint;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Bridge-assigned chain identifier (one byte, as registered on the bridge)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChainId(pub u8);

impl ChainId {
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ChainId {
    fn from(id: u8) -> Self {
        ChainId(id)
    }
}

/// Per-source-chain deposit sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Nonce(pub u64);

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Nonce {
    fn from(n: u64) -> Self {
        Nonce(n)
    }
}

/// 32-byte identifier binding an asset/handler pairing across chains
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceId(pub [u8; 32]);

impl ResourceId {
    /// Build from an arbitrary slice.
    ///
    /// At most 32 bytes are copied, left-aligned; shorter input leaves the
    /// trailing bytes zeroed.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut id = [0u8; 32];
        let len = bytes.len().min(32);
        id[..len].copy_from_slice(&bytes[..len]);
        ResourceId(id)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.to_hex())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Asset class of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferType {
    Fungible,
    NonFungible,
    Generic,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Fungible => "fungible",
            TransferType::NonFungible => "non-fungible",
            TransferType::Generic => "generic",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A translated deposit, ready to be routed to its destination chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    FungibleTransfer {
        source: ChainId,
        dest: ChainId,
        nonce: Nonce,
        amount: BigUint,
        resource_id: ResourceId,
        recipient: Vec<u8>,
    },
    NonFungibleTransfer {
        source: ChainId,
        dest: ChainId,
        nonce: Nonce,
        resource_id: ResourceId,
        token_id: BigUint,
        recipient: Vec<u8>,
        metadata: Vec<u8>,
    },
    GenericTransfer {
        source: ChainId,
        dest: ChainId,
        nonce: Nonce,
        resource_id: ResourceId,
        metadata: Vec<u8>,
    },
}

impl Message {
    pub fn source(&self) -> ChainId {
        match self {
            Message::FungibleTransfer { source, .. }
            | Message::NonFungibleTransfer { source, .. }
            | Message::GenericTransfer { source, .. } => *source,
        }
    }

    pub fn destination(&self) -> ChainId {
        match self {
            Message::FungibleTransfer { dest, .. }
            | Message::NonFungibleTransfer { dest, .. }
            | Message::GenericTransfer { dest, .. } => *dest,
        }
    }

    pub fn nonce(&self) -> Nonce {
        match self {
            Message::FungibleTransfer { nonce, .. }
            | Message::NonFungibleTransfer { nonce, .. }
            | Message::GenericTransfer { nonce, .. } => *nonce,
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        match self {
            Message::FungibleTransfer { resource_id, .. }
            | Message::NonFungibleTransfer { resource_id, .. }
            | Message::GenericTransfer { resource_id, .. } => *resource_id,
        }
    }

    pub fn transfer_type(&self) -> TransferType {
        match self {
            Message::FungibleTransfer { .. } => TransferType::Fungible,
            Message::NonFungibleTransfer { .. } => TransferType::NonFungible,
            Message::GenericTransfer { .. } => TransferType::Generic,
        }
    }
}
