//! Raw deposit records as delivered by the upstream feed
//!
//! The feed returns `{ "deposits": [...], "date": "..." }`. Each deposit
//! carries a `kind` tag plus one payload object per kind; only the payload
//! selected by the tag is meaningful, the others are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response envelope of the deposit feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositResponse {
    pub deposits: Vec<RawDeposit>,
    #[serde(default)]
    pub date: String,
}

/// One deposit record, exactly as the feed reports it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeposit {
    pub id: String,
    pub nonce: String,
    #[serde(alias = "from", default)]
    pub from_address: String,
    pub destination_chain_id: String,
    pub destination_recipient_address: String,
    #[serde(alias = "type")]
    pub kind: String,
    pub resource_id: String,
    #[serde(default)]
    pub fungible: FungiblePayload,
    #[serde(default)]
    pub non_fungible: NonFungiblePayload,
    #[serde(default)]
    pub generic: GenericPayload,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungiblePayload {
    #[serde(default)]
    pub amount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonFungiblePayload {
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub metadata: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericPayload {
    #[serde(default)]
    pub metadata: String,
}

/// Classification of a deposit by its `kind` tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositKind {
    Fungible,
    NonFungible,
    Generic,
    /// Tag not handled by this relayer; the record is skipped
    Unknown(String),
}

impl DepositKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "fungible" => DepositKind::Fungible,
            "non-fungible" => DepositKind::NonFungible,
            "generic" => DepositKind::Generic,
            other => DepositKind::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for DepositKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepositKind::Fungible => write!(f, "fungible"),
            DepositKind::NonFungible => write!(f, "non-fungible"),
            DepositKind::Generic => write!(f, "generic"),
            DepositKind::Unknown(tag) => write!(f, "unknown({})", tag),
        }
    }
}

impl RawDeposit {
    pub fn kind(&self) -> DepositKind {
        DepositKind::from_tag(&self.kind)
    }
}
