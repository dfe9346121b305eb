//! Ledger domain types.
//!
//! [`Entity`] is a tracked account and [`LedgerTransaction`] is one ingested
//! transaction, keyed by `(transaction_id, entity_address)`. All monetary
//! fields are integers in micro-units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Length of a ledger address in base32 characters.
pub const ADDRESS_LENGTH: usize = 58;

/// Classification of an ingested transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// Value transfer between two accounts.
    Transfer,
    /// Participation key registration sent by the entity itself.
    Registration,
    /// Anything else. Never persisted.
    Other,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Registration => "registration",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TxKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "transfer" => Ok(Self::Transfer),
            "registration" => Ok(Self::Registration),
            "other" => Ok(Self::Other),
            _ => Err(Error::InvalidField {
                field: "kind",
                reason: format!("unknown transaction kind '{}'", s),
            }),
        }
    }
}

/// A tracked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub address: String,
    pub display_name: String,
    /// Balance at registration time, in micro-units.
    pub initial_balance: u64,
    /// Registration transaction that opened the reward window. Set at most once.
    pub bootstrap_transaction_id: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Input for registering a new entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntity {
    pub address: String,
    /// Falls back to [`default_display_name`] when absent.
    pub display_name: Option<String>,
    pub initial_balance: u64,
}

impl NewEntity {
    /// Validate the address and resolve the display name.
    pub fn into_entity(self, registered_at: DateTime<Utc>) -> Result<Entity> {
        validate_address(&self.address)?;

        let display_name = self
            .display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| default_display_name(&self.address));

        Ok(Entity {
            address: self.address,
            display_name,
            initial_balance: self.initial_balance,
            bootstrap_transaction_id: None,
            registered_at,
        })
    }
}

/// Display name used when none was given: `Node-` plus the first 8 address characters.
pub fn default_display_name(address: &str) -> String {
    let prefix: String = address.chars().take(8).collect();
    format!("Node-{}", prefix)
}

/// An ingested, immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub transaction_id: String,
    pub entity_address: String,
    pub kind: TxKind,
    pub sender: String,
    /// Only set for transfers.
    pub receiver: Option<String>,
    pub amount: u64,
    pub fee: u64,
    pub confirmed_round: u64,
    /// Unix timestamp (seconds) of the confirming block.
    pub occurred_at: i64,
    pub note: Option<String>,
}

impl LedgerTransaction {
    /// Whether the note carries the given marker text.
    pub fn note_contains(&self, marker: &str) -> bool {
        self.note.as_deref().is_some_and(|note| note.contains(marker))
    }
}

/// Check that `address` is 58 characters of the RFC 4648 base32 alphabet.
///
/// The embedded checksum is not verified.
pub fn validate_address(address: &str) -> Result<()> {
    if address.len() != ADDRESS_LENGTH {
        return Err(Error::InvalidAddress {
            address: address.to_string(),
            reason: format!(
                "expected {} characters, got {}",
                ADDRESS_LENGTH,
                address.len()
            ),
        });
    }

    if let Some(bad) = address
        .chars()
        .find(|c| !matches!(c, 'A'..='Z' | '2'..='7'))
    {
        return Err(Error::InvalidAddress {
            address: address.to_string(),
            reason: format!("invalid base32 character '{}'", bad),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::REWARD_SOURCE_ADDRESS;

    const ADDRESS: &str = "CZMNXX6Z4EFY2I66O5ZLYJVE3E3WI3FAIGKCGZ7P6ZDTBSXY7BWW7TGS5Y";

    #[test]
    fn test_tx_kind_round_trip_strings() {
        for kind in [TxKind::Transfer, TxKind::Registration, TxKind::Other] {
            assert_eq!(kind.as_str().parse::<TxKind>().unwrap(), kind);
        }
        assert!("swap".parse::<TxKind>().is_err());
    }

    #[test]
    fn test_tx_kind_serde_lowercase() {
        let json = serde_json::to_string(&TxKind::Registration).unwrap();
        assert_eq!(json, "\"registration\"");
    }

    #[test]
    fn test_validate_address_accepts_known_addresses() {
        assert!(validate_address(ADDRESS).is_ok());
        assert!(validate_address(REWARD_SOURCE_ADDRESS).is_ok());
    }

    #[test]
    fn test_validate_address_rejects_wrong_length() {
        let err = validate_address("ABC").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress { .. }));
        assert!(err.to_string().contains("got 3"));
    }

    #[test]
    fn test_validate_address_rejects_lowercase_and_digits_outside_alphabet() {
        let lower = ADDRESS.to_lowercase();
        assert!(validate_address(&lower).is_err());

        let with_one = format!("1{}", &ADDRESS[1..]);
        let err = validate_address(&with_one).unwrap_err();
        assert!(err.to_string().contains("'1'"));
    }

    #[test]
    fn test_new_entity_default_display_name() {
        let entity = NewEntity {
            address: ADDRESS.to_string(),
            display_name: None,
            initial_balance: 5,
        }
        .into_entity(Utc::now())
        .unwrap();

        assert_eq!(entity.display_name, "Node-CZMNXX6Z");
        assert_eq!(entity.initial_balance, 5);
        assert!(entity.bootstrap_transaction_id.is_none());
    }

    #[test]
    fn test_new_entity_blank_name_falls_back() {
        let entity = NewEntity {
            address: ADDRESS.to_string(),
            display_name: Some("   ".to_string()),
            initial_balance: 0,
        }
        .into_entity(Utc::now())
        .unwrap();
        assert_eq!(entity.display_name, "Node-CZMNXX6Z");
    }

    #[test]
    fn test_new_entity_rejects_bad_address() {
        let result = NewEntity {
            address: "not-an-address".to_string(),
            display_name: Some("x".to_string()),
            initial_balance: 0,
        }
        .into_entity(Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn test_note_contains() {
        let mut tx = LedgerTransaction {
            transaction_id: "TX1".to_string(),
            entity_address: ADDRESS.to_string(),
            kind: TxKind::Transfer,
            sender: REWARD_SOURCE_ADDRESS.to_string(),
            receiver: Some(ADDRESS.to_string()),
            amount: 10,
            fee: 1_000,
            confirmed_round: 1,
            occurred_at: 0,
            note: Some("ProposerPayout for round 1".to_string()),
        };
        assert!(tx.note_contains("ProposerPayout"));

        tx.note = None;
        assert!(!tx.note_contains("ProposerPayout"));
    }
}
