use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use num_bigint_dig::BigInt;

use crate::error::FlightError;
use crate::model::{Model, ObjectId, TypedArray};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaintKey {
    Text(String),
    BigInt(BigInt),
    Binary(Bytes),
}

#[derive(Debug, Clone)]
struct TaintEntry {
    message: String,
    count: usize,
}

/// Values that must never reach the wire.
#[derive(Debug, Default)]
pub struct TaintRegistry {
    objects: DashMap<ObjectId, String>,
    values: DashMap<TaintKey, TaintEntry>,
    byte_lengths: DashMap<usize, usize>,
}

const DEFAULT_OBJECT_MESSAGE: &str =
    "A tainted value was attempted to be serialized to a Client Component or Action closure. This would leak it to the client.";

impl TaintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taint_object_reference(&self, message: Option<&str>, object: &Model) -> Result<(), FlightError> {
        let id = match object {
            Model::String(_) | Model::BigInt(_) => {
                return Err(FlightError::InvalidTaint(
                    "Only objects or functions can be passed to taintObjectReference. Try taintUniqueValue instead."
                        .to_string(),
                ));
            }
            other => other.identity().ok_or_else(|| {
                FlightError::InvalidTaint(
                    "Only objects or functions can be passed to taintObjectReference.".to_string(),
                )
            })?,
        };
        self.objects.insert(id, message.unwrap_or(DEFAULT_OBJECT_MESSAGE).to_string());
        Ok(())
    }

    /// Taints a unique value. Tainting the same value again bumps a reference count.
    pub fn taint_unique_value(&self, message: Option<&str>, value: TaintKey) {
        let binary_len = match &value {
            TaintKey::Binary(bytes) => Some(bytes.len()),
            _ => None,
        };
        match self.values.entry(value) {
            Entry::Occupied(mut entry) => entry.get_mut().count += 1,
            Entry::Vacant(entry) => {
                entry.insert(TaintEntry { message: message.unwrap_or(DEFAULT_OBJECT_MESSAGE).to_string(), count: 1 });
                if let Some(len) = binary_len {
                    *self.byte_lengths.entry(len).or_insert(0) += 1;
                }
            }
        }
    }

    /// Drops one reference to a tainted value, forgetting it at zero.
    pub fn release_unique_value(&self, value: &TaintKey) {
        let remove = match self.values.get_mut(value) {
            Some(mut entry) => {
                entry.count -= 1;
                entry.count == 0
            }
            None => return,
        };
        if remove {
            self.values.remove(value);
            if let TaintKey::Binary(bytes) = value {
                let len = bytes.len();
                let empty = self.byte_lengths.get_mut(&len).is_some_and(|mut n| {
                    *n -= 1;
                    *n == 0
                });
                if empty {
                    self.byte_lengths.remove(&len);
                }
            }
        }
    }

    pub fn check_object(&self, id: ObjectId) -> Result<(), FlightError> {
        match self.objects.get(&id) {
            Some(message) => Err(FlightError::TaintViolation(message.clone())),
            None => Ok(()),
        }
    }

    pub fn check_text(&self, text: &str) -> Result<(), FlightError> {
        if self.values.is_empty() {
            return Ok(());
        }
        self.check_value(&TaintKey::Text(text.to_string()))
    }

    pub fn check_bigint(&self, value: &BigInt) -> Result<(), FlightError> {
        if self.values.is_empty() {
            return Ok(());
        }
        self.check_value(&TaintKey::BigInt(value.clone()))
    }

    pub fn check_binary(&self, array: &TypedArray) -> Result<(), FlightError> {
        if !self.byte_lengths.contains_key(&array.byte_length()) {
            return Ok(());
        }
        self.check_value(&TaintKey::Binary(array.bytes().clone()))
    }

    fn check_value(&self, key: &TaintKey) -> Result<(), FlightError> {
        match self.values.get(key) {
            Some(entry) => Err(FlightError::TaintViolation(entry.message.clone())),
            None => Ok(()),
        }
    }
}
