//! In-memory keyspace: named lists and sets.
//!
//! Every operation either fails before touching anything or completes fully,
//! so a caller holding the keyspace lock never observes a half-applied write.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::{ListOp, Result, StoreError, Transaction};

/// A stored value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    List(VecDeque<String>),
    Set(BTreeSet<String>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::List(_) => "list",
            Value::Set(_) => "set",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::List(list) => list.is_empty(),
            Value::Set(set) => set.is_empty(),
        }
    }
}

/// All keys of one store.
///
/// Equality compares contents only, not the revision counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyspace {
    entries: BTreeMap<String, Value>,

    /// Bumped on every write that changes a key.
    #[serde(skip)]
    revision: u64,
}

impl PartialEq for Keyspace {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Keyspace {}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of changing writes applied so far (not persisted).
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn lpush(&mut self, key: &str, value: &str) -> Result<usize> {
        let list = self.list_mut(key)?;
        list.push_front(value.to_string());
        let len = list.len();
        self.revision += 1;
        Ok(len)
    }

    pub fn rpush(&mut self, key: &str, value: &str) -> Result<usize> {
        let list = self.list_mut(key)?;
        list.push_back(value.to_string());
        let len = list.len();
        self.revision += 1;
        Ok(len)
    }

    pub fn rpop(&mut self, key: &str) -> Result<Option<String>> {
        self.check_list(key)?;
        let popped = match self.entries.get_mut(key) {
            Some(Value::List(list)) => list.pop_back(),
            _ => None,
        };
        if popped.is_some() {
            self.revision += 1;
            self.drop_if_empty(key);
        }
        Ok(popped)
    }

    pub fn last(&self, key: &str) -> Result<Option<String>> {
        Ok(self.list(key)?.and_then(|list| list.back().cloned()))
    }

    pub fn range(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .list(key)?
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn len(&self, key: &str) -> Result<usize> {
        Ok(self.list(key)?.map_or(0, VecDeque::len))
    }

    /// Pops the rightmost element of `src` and pushes it on the left of `dst`.
    ///
    /// Both keys are type-checked before anything moves.
    pub fn pop_right_push_left(&mut self, src: &str, dst: &str) -> Result<Option<String>> {
        self.check_list(src)?;
        self.check_list(dst)?;

        let Some(value) = self.rpop(src)? else {
            return Ok(None);
        };
        self.lpush(dst, &value)?;
        Ok(Some(value))
    }

    pub fn sadd(&mut self, key: &str, member: &str) -> Result<bool> {
        let added = self.set_mut(key)?.insert(member.to_string());
        if added {
            self.revision += 1;
        }
        Ok(added)
    }

    pub fn srem(&mut self, key: &str, member: &str) -> Result<bool> {
        self.check_set(key)?;
        let removed = match self.entries.get_mut(key) {
            Some(Value::Set(set)) => set.remove(member),
            _ => false,
        };
        if removed {
            self.revision += 1;
            self.drop_if_empty(key);
        }
        Ok(removed)
    }

    pub fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.check_set(key)?;
        Ok(match self.entries.get(key) {
            Some(Value::Set(set)) => set.iter().cloned().collect(),
            _ => Vec::new(),
        })
    }

    /// Applies a transaction all-or-nothing.
    ///
    /// Every key is type-checked first; list writes cannot fail afterwards.
    pub fn apply(&mut self, tx: &Transaction) -> Result<()> {
        for op in tx.ops() {
            self.check_list(op.key())?;
        }

        for op in tx.ops() {
            match op {
                ListOp::RPush { key, value } => {
                    self.rpush(key, value)?;
                }
                ListOp::LPush { key, value } => {
                    self.lpush(key, value)?;
                }
                ListOp::RPop { key } => {
                    self.rpop(key)?;
                }
            }
        }
        Ok(())
    }

    // ─── Helpers ───

    fn list(&self, key: &str) -> Result<Option<&VecDeque<String>>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Value::List(list)) => Ok(Some(list)),
            Some(other) => Err(wrong_type(key, other)),
        }
    }

    fn list_mut(&mut self, key: &str) -> Result<&mut VecDeque<String>> {
        let value = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::List(VecDeque::new()));
        match value {
            Value::List(list) => Ok(list),
            other => Err(wrong_type(key, other)),
        }
    }

    fn set_mut(&mut self, key: &str) -> Result<&mut BTreeSet<String>> {
        let value = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Value::Set(BTreeSet::new()));
        match value {
            Value::Set(set) => Ok(set),
            other => Err(wrong_type(key, other)),
        }
    }

    fn check_list(&self, key: &str) -> Result<()> {
        match self.entries.get(key) {
            Some(other @ Value::Set(_)) => Err(wrong_type(key, other)),
            _ => Ok(()),
        }
    }

    fn check_set(&self, key: &str) -> Result<()> {
        match self.entries.get(key) {
            Some(other @ Value::List(_)) => Err(wrong_type(key, other)),
            _ => Ok(()),
        }
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(Value::is_empty) {
            self.entries.remove(key);
        }
    }
}

fn wrong_type(key: &str, found: &Value) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        found: found.type_name(),
    }
}
