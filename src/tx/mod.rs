//! Transaction handles.
//!
//! Every ingest batch runs in its own `ReadWrite` transaction and commits
//! independently; preview and export only ever open `ReadOnly` ones.

use serde::{Deserialize, Serialize};

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

impl TxMode {
    pub fn is_write(self) -> bool {
        matches!(self, TxMode::ReadWrite)
    }
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

/// Transaction trait that all backends must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;
}
