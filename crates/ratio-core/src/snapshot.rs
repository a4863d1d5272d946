//! Memento snapshots for the undo contract.
//!
//! Every setter on a tracked planner entity assumes the caller already holds
//! a restorable snapshot of the entity's prior state. A [`Memento`] is that
//! snapshot: the target's key plus its editable state encoded with
//! `bitcode`. The undo/redo stack that stores mementos lives outside the
//! planner core.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors that can occur while capturing or restoring a memento.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

/// A captured, restorable state of one tracked entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memento<K> {
    target: K,
    data: Vec<u8>,
}

impl<K: Copy> Memento<K> {
    /// Encode `state` as the snapshot of `target`.
    pub fn capture<S: Serialize>(target: K, state: &S) -> Result<Self, SnapshotError> {
        let data = bitcode::serialize(state).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        Ok(Self { target, data })
    }

    /// The entity this memento belongs to.
    pub fn target(&self) -> K {
        self.target
    }

    /// Decode the captured state.
    pub fn state<S: DeserializeOwned>(&self) -> Result<S, SnapshotError> {
        bitcode::deserialize(&self.data).map_err(|e| SnapshotError::Decode(e.to_string()))
    }

    /// Size of the encoded payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Editable {
        amount: f64,
        enabled: bool,
        label: Option<String>,
    }

    #[test]
    fn capture_then_restore_returns_prior_state() {
        let before = Editable {
            amount: 12.5,
            enabled: true,
            label: Some("smelting".to_string()),
        };
        let memento = Memento::capture(3u32, &before).unwrap();
        assert_eq!(memento.target(), 3);
        assert!(!memento.is_empty());

        let restored: Editable = memento.state().unwrap();
        assert_eq!(restored, before);
    }

    #[test]
    fn decoding_as_wrong_type_fails() {
        let memento = Memento::capture(0u32, &true).unwrap();
        let result: Result<Editable, _> = memento.state();
        assert!(matches!(result, Err(SnapshotError::Decode(_))));
    }

    #[test]
    fn error_display_messages() {
        let msg = format!("{}", SnapshotError::Decode("eof".to_string()));
        assert!(msg.contains("decoding failed"), "got: {msg}");
        assert!(msg.contains("eof"), "got: {msg}");
    }
}
