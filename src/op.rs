//! Pending operation model and persistence envelope.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::types::{OperationId, Timestamp};

/// Version number for serialized [`StoredOperationEnvelope`] payloads.
pub const OP_FORMAT_VERSION: u16 = 1;

/// A concrete operation subtype.
///
/// Every variant of deferred work implements this trait. `KIND` is the
/// discriminant under which the operation is persisted and dispatched, so it
/// must be unique across all subtypes registered with one dispatcher.
pub trait OperationKind: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable discriminant for this subtype.
    const KIND: &'static str;
}

/// Persisted, timestamped unit of pending work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Storage key, generated at creation.
    pub id: OperationId,
    /// Creation time stamped by the queue service. Sole replay ordering key.
    pub creation_timestamp: Timestamp,
    /// Set once a dispatch attempt for this operation errored.
    pub last_sync_failed: bool,
    /// Discriminant of the concrete subtype, see [`OperationKind::KIND`].
    pub kind: String,
    /// Body of the concrete subtype.
    pub payload: serde_json::Value,
}

/// Reasons a typed payload could not be recovered from an [`Operation`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The operation belongs to a different subtype.
    #[error("operation {id} has kind '{actual}', expected '{expected}'")]
    KindMismatch {
        /// Operation id.
        id: OperationId,
        /// Kind requested by the caller.
        expected: &'static str,
        /// Kind stored on the operation.
        actual: String,
    },
    /// The body does not match the subtype's shape.
    #[error("payload of operation {id} ({kind}) could not be decoded")]
    Decode {
        /// Operation id.
        id: OperationId,
        /// Stored kind.
        kind: String,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
}

impl Operation {
    /// Wraps a typed payload into a new operation with a fresh id.
    pub fn new<T: OperationKind>(
        creation_timestamp: Timestamp,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: OperationId::generate(),
            creation_timestamp,
            last_sync_failed: false,
            kind: T::KIND.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    /// Returns true when this operation was created from subtype `T`.
    pub fn is<T: OperationKind>(&self) -> bool {
        self.kind == T::KIND
    }

    /// Recovers the typed payload.
    pub fn decode<T: OperationKind>(&self) -> Result<T, PayloadError> {
        if !self.is::<T>() {
            return Err(PayloadError::KindMismatch {
                id: self.id.clone(),
                expected: T::KIND,
                actual: self.kind.clone(),
            });
        }
        T::deserialize(&self.payload).map_err(|source| PayloadError::Decode {
            id: self.id.clone(),
            kind: self.kind.clone(),
            source,
        })
    }
}

/// Freshly constructed operation handed to the enrichment callback.
///
/// Dereferences to the typed payload so callers can set fields directly.
#[derive(Debug)]
pub struct NewOperation<T> {
    id: OperationId,
    creation_timestamp: Timestamp,
    payload: T,
}

impl<T: OperationKind> NewOperation<T> {
    pub(crate) fn new(creation_timestamp: Timestamp) -> Self {
        Self {
            id: OperationId::generate(),
            creation_timestamp,
            payload: T::default(),
        }
    }

    /// Identifier the operation will be stored under.
    pub fn id(&self) -> &OperationId {
        &self.id
    }

    /// Creation time assigned by the queue service.
    pub fn creation_timestamp(&self) -> Timestamp {
        self.creation_timestamp
    }

    pub(crate) fn into_operation(self) -> Result<Operation, serde_json::Error> {
        Ok(Operation {
            id: self.id,
            creation_timestamp: self.creation_timestamp,
            last_sync_failed: false,
            kind: T::KIND.to_string(),
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}

impl<T> Deref for NewOperation<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<T> DerefMut for NewOperation<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.payload
    }
}

/// Versioned wrapper for stable on-disk payload decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOperationEnvelope {
    /// Payload format version.
    pub format_version: u16,
    /// Wrapped operation.
    pub operation: Operation,
}

impl StoredOperationEnvelope {
    /// Constructs an envelope using [`OP_FORMAT_VERSION`].
    pub fn new(operation: Operation) -> Self {
        Self {
            format_version: OP_FORMAT_VERSION,
            operation,
        }
    }
}
