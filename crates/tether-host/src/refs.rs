//! Reference table: stable ids for host values with identity.
//!
//! The guest never sees a host object directly. It holds a 32-bit id and
//! tells the host when it takes or drops a copy of it. An entry lives while
//! its count is positive; the same value registered again while live gets
//! the same id back.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::error::{BridgeError, BridgeResult};
use crate::value::Value;

/// Reference id handed to the guest.
pub type RefId = u32;

/// Id that stands for null/undefined and is never issued.
pub const NO_REFERENCE: RefId = 0;

/// Identity key of a registrable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Address of a shared allocation (host object or guest closure).
    Object(usize),
    /// Symbol token.
    Token(u64),
}

impl Value {
    /// Identity of this value, if it has one.
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Value::Reference(obj) => Some(Identity::Object(obj.address())),
            Value::Closure(c) => Some(Identity::Object(c.address())),
            Value::OnceClosure(c) => Some(Identity::Object(c.address())),
            Value::Symbol(sym) => Some(Identity::Token(sym.token())),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct Entry {
    target: Value,
    refcount: u32,
}

/// Id ⇄ value registry with per-id counts.
#[derive(Debug, Default)]
pub struct RefTable {
    entries: HashMap<RefId, Entry>,
    ids: HashMap<Identity, RefId>,
    last_id: RefId,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` (or bump its count) and return its id.
    ///
    /// Null and undefined map to [`NO_REFERENCE`] without touching the
    /// table. Ids are never reused.
    pub fn acquire(&mut self, value: &Value) -> BridgeResult<RefId> {
        if value.is_nullish() {
            return Ok(NO_REFERENCE);
        }
        let identity = value
            .identity()
            .ok_or(BridgeError::NotReferenceType(value.type_name()))?;

        if let Some(&id) = self.ids.get(&identity) {
            self.increment(id)?;
            return Ok(id);
        }

        let id = self
            .last_id
            .checked_add(1)
            .ok_or(BridgeError::ReferenceIdsExhausted)?;
        self.last_id = id;
        self.ids.insert(identity, id);
        self.entries.insert(
            id,
            Entry {
                target: value.clone(),
                refcount: 1,
            },
        );
        debug!(id, kind = value.type_name(), "reference registered");
        Ok(id)
    }

    /// The value behind `id`. [`NO_REFERENCE`] reads as undefined.
    pub fn lookup(&self, id: RefId) -> BridgeResult<Value> {
        if id == NO_REFERENCE {
            return Ok(Value::Undefined);
        }
        self.entries
            .get(&id)
            .map(|entry| entry.target.clone())
            .ok_or(BridgeError::UnknownReference(id))
    }

    /// One more holder of `id`.
    pub fn increment(&mut self, id: RefId) -> BridgeResult<()> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(BridgeError::UnknownReference(id))?;
        entry.refcount = entry
            .refcount
            .checked_add(1)
            .ok_or(BridgeError::ReferenceIdsExhausted)?;
        debug!(id, refcount = entry.refcount, "reference retained");
        Ok(())
    }

    /// One fewer holder of `id`; the entry is removed at zero.
    pub fn decrement(&mut self, id: RefId) -> BridgeResult<()> {
        let Some(entry) = self.entries.get_mut(&id) else {
            error!(id, "reference count underflow");
            return Err(BridgeError::RefCountUnderflow(id));
        };
        entry.refcount -= 1;
        if entry.refcount > 0 {
            debug!(id, refcount = entry.refcount, "reference released");
            return Ok(());
        }
        if let Some(entry) = self.entries.remove(&id) {
            if let Some(identity) = entry.target.identity() {
                self.ids.remove(&identity);
            }
        }
        debug!(id, "reference retired");
        Ok(())
    }

    /// Current count of `id`, `None` once retired.
    pub fn refcount(&self, id: RefId) -> Option<u32> {
        self.entries.get(&id).map(|entry| entry.refcount)
    }

    pub fn contains(&self, id: RefId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Id currently assigned to `value`, without acquiring.
    pub fn id_of(&self, value: &Value) -> Option<RefId> {
        self.ids.get(&value.identity()?).copied()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
