//! Transactional mutable property source
//!
//! Writes are staged under a transaction id and become visible only on
//! commit. Committing returns the resulting [`PropertySourceChange`].

use crate::change::ChangeType;
use crate::frozen::FrozenPropertySource;
use crate::source_change::{PropertySourceChange, PropertySourceChangeBuilder};
use crate::{EventError, Result};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tessera_core::source::ordinals;
use tessera_core::{PropertySource, PropertyValue};
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier of a pending transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Staged operation for one key; the last one wins
#[derive(Debug, Clone)]
enum Pending {
    Put(String),
    Remove,
}

/// Property source whose content can be changed at runtime
#[derive(Debug)]
pub struct MutablePropertySource {
    name: String,
    ordinal: i32,
    properties: RwLock<BTreeMap<String, String>>,
    transactions: DashMap<TransactionId, BTreeMap<String, Pending>>,
}

impl MutablePropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_ordinal(name, ordinals::MUTABLE)
    }

    pub fn with_ordinal(name: impl Into<String>, ordinal: i32) -> Self {
        Self {
            name: name.into(),
            ordinal,
            properties: RwLock::new(BTreeMap::new()),
            transactions: DashMap::new(),
        }
    }

    /// Seed initial content without any transaction
    pub fn with_properties<K, V>(self, properties: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties.write().extend(
            properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(k, _)| !k.is_empty()),
        );
        self
    }

    pub fn start_transaction(&self) -> TransactionId {
        let id = TransactionId::new();
        self.transactions.insert(id, BTreeMap::new());
        debug!(source = %self.name, transaction = %id, "Started transaction");
        id
    }

    /// Stage a value for `key`
    pub fn put(&self, tx: TransactionId, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.stage(tx, key.into(), Pending::Put(value.into()))
    }

    /// Stage several values
    pub fn put_all<K, V>(&self, tx: TransactionId, values: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut pending = self.pending(tx)?;
        for (key, value) in values {
            pending.insert(key.into(), Pending::Put(value.into()));
        }
        Ok(())
    }

    /// Stage the removal of `key`
    pub fn remove(&self, tx: TransactionId, key: impl Into<String>) -> Result<()> {
        self.stage(tx, key.into(), Pending::Remove)
    }

    fn stage(&self, tx: TransactionId, key: String, op: Pending) -> Result<()> {
        self.pending(tx)?.insert(key, op);
        Ok(())
    }

    fn pending(
        &self,
        tx: TransactionId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, TransactionId, BTreeMap<String, Pending>>> {
        self.transactions
            .get_mut(&tx)
            .ok_or_else(|| EventError::unknown_transaction(tx))
    }

    /// Apply the staged operations and return what changed.
    ///
    /// The transaction is finished afterwards; committing it again fails.
    pub fn commit(&self, tx: TransactionId) -> Result<PropertySourceChange> {
        let (_, staged) = self
            .transactions
            .remove(&tx)
            .ok_or_else(|| EventError::unknown_transaction(tx))?;

        let mut properties = self.properties.write();
        let old = properties.clone();
        for (key, op) in staged {
            if key.is_empty() {
                continue;
            }
            match op {
                Pending::Put(value) => {
                    properties.insert(key, value);
                }
                Pending::Remove => {
                    properties.remove(&key);
                }
            }
        }

        let change = PropertySourceChangeBuilder::from_frozen(
            FrozenPropertySource::from_map(self.name.clone(), self.ordinal, &old),
            ChangeType::Updated,
        )
        .compare_maps(&old, &properties)
        .with_transaction_id(tx.to_string())
        .build();

        info!(
            source = %self.name,
            transaction = %tx,
            changes = change.len(),
            "Committed transaction"
        );
        Ok(change)
    }

    /// Discard the staged operations; returns whether the transaction existed
    pub fn rollback(&self, tx: TransactionId) -> bool {
        let existed = self.transactions.remove(&tx).is_some();
        if existed {
            debug!(source = %self.name, transaction = %tx, "Rolled back transaction");
        }
        existed
    }

    /// Put a single value in its own transaction
    pub fn set_now(&self, key: impl Into<String>, value: impl Into<String>) -> Result<PropertySourceChange> {
        let tx = self.start_transaction();
        self.put(tx, key, value)?;
        self.commit(tx)
    }

    /// Remove a single key in its own transaction
    pub fn remove_now(&self, key: impl Into<String>) -> Result<PropertySourceChange> {
        let tx = self.start_transaction();
        self.remove(tx, key)?;
        self.commit(tx)
    }

    pub fn pending_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_pending(&self, tx: TransactionId) -> bool {
        self.transactions.contains_key(&tx)
    }
}

impl PropertySource for MutablePropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_ordinal(&self) -> i32 {
        self.ordinal
    }

    fn get(&self, key: &str) -> Option<PropertyValue> {
        self.properties
            .read()
            .get(key)
            .map(|v| PropertyValue::new(key, v.clone(), self.name.clone()))
    }

    fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.properties
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::new(k.clone(), v.clone(), self.name.clone())))
            .collect()
    }
}
