//! Storage targets that receive applied payloads.

use bytes::Bytes;
use serde::Serialize;

/// Anything the driver can insert payloads into.
pub trait StorageTarget {
    /// What an insertion hands back, e.g. the identity of the stored part.
    type Handle;
    /// Insertion failure. The driver propagates it unchanged.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stores `payload`, producing exactly one mutation per call.
    fn insert(&mut self, payload: Bytes) -> Result<Self::Handle, Self::Error>;
}

/// Identity of a part inside a [`PartLog`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct PartId(pub u64);

/// Handle returned for every inserted part.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct PartRef {
    pub id: PartId,
    /// Payload size in bytes.
    pub len: usize,
}

/// A stored part.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Part {
    pub id: PartId,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PartLogError {
    /// The configured part limit has been reached.
    #[error("part log is full ({limit} parts)")]
    Full { limit: usize },
}

/// Append-only in-memory list of inserted parts.
#[derive(Debug, Clone, Default)]
pub struct PartLog {
    parts: Vec<Part>,
    limit: Option<usize>,
}

impl PartLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log that refuses insertions once it holds `limit` parts.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            parts: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Sum of all stored payload sizes.
    pub fn total_bytes(&self) -> usize {
        self.parts.iter().map(|part| part.payload.len()).sum()
    }

    /// Payloads in insertion order, lossily decoded as text.
    pub fn payload_strings(&self) -> Vec<String> {
        self.parts
            .iter()
            .map(|part| String::from_utf8_lossy(&part.payload).into_owned())
            .collect()
    }
}

impl StorageTarget for PartLog {
    type Handle = PartRef;
    type Error = PartLogError;

    fn insert(&mut self, payload: Bytes) -> Result<PartRef, PartLogError> {
        if let Some(limit) = self.limit {
            if self.parts.len() >= limit {
                return Err(PartLogError::Full { limit });
            }
        }
        let id = PartId(self.parts.len() as u64);
        let handle = PartRef {
            id,
            len: payload.len(),
        };
        self.parts.push(Part { id, payload });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_are_numbered_in_order() {
        let mut log = PartLog::new();
        let first = log.insert(Bytes::from_static(b"abc")).unwrap();
        let second = log.insert(Bytes::from_static(b"de")).unwrap();

        assert_eq!(first, PartRef { id: PartId(0), len: 3 });
        assert_eq!(second.id, PartId(1));
        assert_eq!(log.total_bytes(), 5);
        assert_eq!(log.payload_strings(), vec!["abc", "de"]);
    }

    #[test]
    fn limit_rejects_extra_parts() {
        let mut log = PartLog::with_limit(1);
        log.insert(Bytes::from_static(b"ok")).unwrap();

        let err = log.insert(Bytes::from_static(b"no")).unwrap_err();
        assert_eq!(err, PartLogError::Full { limit: 1 });
        assert_eq!(log.len(), 1);
    }
}
