use crate::constants::{GENESIS_MESSAGE, GENESIS_RECIPIENT, NETWORK_SENDER};
use crate::error::{LedgerError, Result};
use crate::{now_secs, sha256, Hash};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::hash::{Hash as StdHash, Hasher};

/// Opaque caller-supplied key-value bag carried with a transaction.
pub type Metadata = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Transfer,
    Reward,
    Genesis,
}

/// Raw transaction record as received from a transport. Every field is
/// optional here so that a missing one is reported as a validation error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    kind: TxKind,
    sender: String,
    recipient: String,
    amount: f64,
    #[serde(default)]
    metadata: Metadata,
    timestamp: u64,
    id: String,
}

impl Transaction {
    /// A transfer stamped with the current time.
    pub fn create(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        metadata: Metadata,
    ) -> Result<Self> {
        Self::with_timestamp(sender, recipient, amount, metadata, now_secs())
    }

    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        metadata: Metadata,
        timestamp: u64,
    ) -> Result<Self> {
        let sender = sender.into();
        let recipient = recipient.into();
        if sender.trim().is_empty() {
            return Err(LedgerError::validation("sender must not be empty"));
        }
        if recipient.trim().is_empty() {
            return Err(LedgerError::validation("recipient must not be empty"));
        }
        if sender == NETWORK_SENDER {
            return Err(LedgerError::validation(format!(
                "sender `{NETWORK_SENDER}` is reserved for rewards"
            )));
        }
        if !amount.is_finite() {
            return Err(LedgerError::validation("amount must be a finite number"));
        }
        if amount < 0.0 {
            return Err(LedgerError::validation(format!(
                "amount must be non-negative, got {amount}"
            )));
        }
        Ok(Self::build(
            TxKind::Transfer,
            sender,
            recipient,
            amount,
            metadata,
            timestamp,
        ))
    }

    pub fn from_record(record: TransactionRecord) -> Result<Self> {
        let sender = record
            .sender
            .ok_or_else(|| LedgerError::validation("missing field `sender`"))?;
        let recipient = record
            .recipient
            .ok_or_else(|| LedgerError::validation("missing field `recipient`"))?;
        let amount = match record.amount {
            None | Some(Value::Null) => {
                return Err(LedgerError::validation("missing field `amount`"))
            }
            Some(value) => value
                .as_f64()
                .ok_or_else(|| LedgerError::validation("field `amount` must be a number"))?,
        };
        let metadata = match record.metadata {
            None | Some(Value::Null) => Metadata::new(),
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(_) => {
                return Err(LedgerError::validation(
                    "field `metadata` must be an object",
                ))
            }
        };
        Self::create(sender, recipient, amount, metadata)
    }

    /// The synthesized payout appended to every mined block.
    pub fn reward(miner: impl Into<String>, amount: f64, timestamp: u64) -> Self {
        Self::build(
            TxKind::Reward,
            NETWORK_SENDER.to_string(),
            miner.into(),
            amount,
            Metadata::new(),
            timestamp,
        )
    }

    pub fn genesis(timestamp: u64) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("message".into(), Value::from(GENESIS_MESSAGE));
        Self::build(
            TxKind::Genesis,
            NETWORK_SENDER.to_string(),
            GENESIS_RECIPIENT.to_string(),
            0.0,
            metadata,
            timestamp,
        )
    }

    fn build(
        kind: TxKind,
        sender: String,
        recipient: String,
        amount: f64,
        metadata: Metadata,
        timestamp: u64,
    ) -> Self {
        let mut tx = Self {
            kind,
            sender,
            recipient,
            amount,
            metadata,
            timestamp,
            id: String::new(),
        };
        tx.id = hex::encode(tx.content_hash());
        tx
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Hex content id as stored with the transaction.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// SHA-256 over the canonical encoding of every field except the id.
    pub fn content_hash(&self) -> Hash {
        let canonical = json!({
            "amount": self.amount,
            "kind": self.kind,
            "metadata": canonicalize(Value::Object(
                self.metadata.clone().into_iter().collect()
            )),
            "recipient": self.recipient,
            "sender": self.sender,
            "timestamp": self.timestamp,
        });
        sha256(canonical.to_string().as_bytes())
    }

    /// Whether the stored id still matches the transaction's contents.
    pub fn verify_id(&self) -> bool {
        hex::encode(self.content_hash()) == self.id
    }

    pub fn touches(&self, address: &str) -> bool {
        self.sender == address || self.recipient == address
    }

    #[cfg(test)]
    pub(crate) fn set_amount(&mut self, amount: f64) {
        self.amount = amount;
    }
}

/// Rebuild every object with its keys in sorted order, at any depth, so the
/// encoding does not depend on how the map was populated.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Transaction {}

impl std::hash::Hash for Transaction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        StdHash::hash(&self.id, state);
    }
}
