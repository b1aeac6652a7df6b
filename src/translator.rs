//! Deposit to message translation
//!
//! Turns one [`RawDeposit`] into exactly one [`Message`], or reports why it
//! could not. Fungible deposits hex-decode their resource id and recipient;
//! non-fungible and generic deposits carry those fields through as the raw
//! bytes of their string form. The two behaviours are kept separate on
//! purpose and must not be unified without agreement from the feed owners.

use bigdecimal::num_bigint::BigUint;
use tracing::{debug, info, warn};

use crate::deposit::{DepositKind, RawDeposit};
use crate::error::TranslateError;
use crate::types::{ChainId, Message, Nonce, ResourceId};

/// Translates deposits observed on a single source chain
#[derive(Debug, Clone, Copy)]
pub struct DepositTranslator {
    source: ChainId,
}

impl DepositTranslator {
    pub fn new(source: ChainId) -> Self {
        Self { source }
    }

    /// Translate one deposit.
    ///
    /// Returns `Ok(None)` for deposits of an unrecognized kind; those are
    /// skipped, not failed.
    pub fn translate(&self, deposit: &RawDeposit) -> Result<Option<Message>, TranslateError> {
        let kind = deposit.kind();
        if let DepositKind::Unknown(tag) = &kind {
            warn!(
                deposit_id = %deposit.id,
                nonce = %deposit.nonce,
                dest = %deposit.destination_chain_id,
                kind = %tag,
                "Deposit has unrecognized kind, skipping"
            );
            return Ok(None);
        }

        let dest = parse_chain_id("destinationChainId", &deposit.destination_chain_id)?;
        let nonce = Nonce(parse_u64("nonce", &deposit.nonce)?);

        let message = match kind {
            DepositKind::Fungible => self.fungible_transfer(dest, nonce, deposit)?,
            DepositKind::NonFungible => self.non_fungible_transfer(dest, nonce, deposit)?,
            DepositKind::Generic => self.generic_transfer(dest, nonce, deposit),
            DepositKind::Unknown(_) => return Ok(None),
        };

        Ok(Some(message))
    }

    fn fungible_transfer(
        &self,
        dest: ChainId,
        nonce: Nonce,
        deposit: &RawDeposit,
    ) -> Result<Message, TranslateError> {
        info!(
            deposit_id = %deposit.id,
            %dest,
            %nonce,
            "Handling fungible deposit"
        );

        let resource_id = decode_prefixed_hex("resourceId", &deposit.resource_id)?;
        let recipient = decode_prefixed_hex(
            "destinationRecipientAddress",
            &deposit.destination_recipient_address,
        )?;
        let amount = parse_big_uint("fungible.amount", &deposit.fungible.amount)?;

        debug!(
            recipient = %deposit.destination_recipient_address,
            %amount,
            "Built fungible transfer"
        );

        Ok(Message::FungibleTransfer {
            source: self.source,
            dest,
            nonce,
            amount,
            resource_id: ResourceId::from_slice(&resource_id),
            recipient,
        })
    }

    fn non_fungible_transfer(
        &self,
        dest: ChainId,
        nonce: Nonce,
        deposit: &RawDeposit,
    ) -> Result<Message, TranslateError> {
        info!(
            deposit_id = %deposit.id,
            %dest,
            %nonce,
            "Handling non-fungible deposit"
        );

        let token_id = parse_big_uint("nonFungible.tokenId", &deposit.non_fungible.token_id)?;

        // Resource id, recipient and metadata are forwarded as raw string bytes
        Ok(Message::NonFungibleTransfer {
            source: self.source,
            dest,
            nonce,
            resource_id: ResourceId::from_slice(deposit.resource_id.as_bytes()),
            token_id,
            recipient: deposit.destination_recipient_address.as_bytes().to_vec(),
            metadata: deposit.non_fungible.metadata.as_bytes().to_vec(),
        })
    }

    fn generic_transfer(&self, dest: ChainId, nonce: Nonce, deposit: &RawDeposit) -> Message {
        info!(
            deposit_id = %deposit.id,
            %dest,
            %nonce,
            "Handling generic deposit"
        );

        Message::GenericTransfer {
            source: self.source,
            dest,
            nonce,
            resource_id: ResourceId::from_slice(deposit.resource_id.as_bytes()),
            metadata: deposit.generic.metadata.as_bytes().to_vec(),
        }
    }
}

// ============================================================================
// Field parsing
// ============================================================================

/// Parse a base-10 integer that must fit in 64 bits
pub fn parse_u64(field: &'static str, value: &str) -> Result<u64, TranslateError> {
    value
        .parse::<u64>()
        .map_err(|e| TranslateError::MalformedIdentifier {
            field,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a destination chain id: a 64-bit integer within the bridge's chain id range
pub fn parse_chain_id(field: &'static str, value: &str) -> Result<ChainId, TranslateError> {
    let id = parse_u64(field, value)?;
    u8::try_from(id)
        .map(ChainId)
        .map_err(|_| TranslateError::MalformedIdentifier {
            field,
            value: value.to_string(),
            reason: format!("chain id must be at most {}", u8::MAX),
        })
}

/// Parse an arbitrary-precision base-10 unsigned integer.
///
/// Only ASCII digits are accepted: no sign, whitespace or digit separators.
pub fn parse_big_uint(field: &'static str, value: &str) -> Result<BigUint, TranslateError> {
    let malformed = || TranslateError::MalformedAmount {
        field,
        value: value.to_string(),
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    BigUint::parse_bytes(value.as_bytes(), 10).ok_or_else(malformed)
}

/// Decode a hex string, stripping a leading `0x` if present
pub fn decode_prefixed_hex(field: &'static str, value: &str) -> Result<Vec<u8>, TranslateError> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(stripped).map_err(|e| TranslateError::MalformedHex {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
