//! Read-only snapshots the node materializes for one invocation.

use serde::{Deserialize, Serialize};

/// One input of the transaction driving the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub txid: String,
    /// Index into the referenced transaction's outputs. 32-bit by wire
    /// format, surfaced to scripts as a plain integer.
    pub vout: i32,
    pub signature: String,
    pub pubkey: String,
}

/// One output of the transaction driving the invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// 64-bit amount; surfaced to scripts as an arbitrary-precision value.
    pub amount: i64,
    pub pubkeyhash: String,
}

/// The transaction snapshot published to scripts as the frozen global `_tx`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSnapshot {
    pub id: String,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    pub tip: i64,
}

/// A previous UTXO consumed by the driving transaction; published to scripts
/// inside the frozen global `_prevUtxos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSnapshot {
    pub txid: String,
    pub tx_index: i32,
    /// 64-bit amount; surfaced as an arbitrary-precision value.
    pub value: i64,
    pub pubkeyhash: String,
    pub address: String,
}

/// Log level of a script `_log` call, forwarded to the host logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

/// A value paired with the storage-accounting increment the host charged for
/// producing it; the binding feeds the increment to the instruction counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Costed<T> {
    pub value: T,
    pub cost: u64,
}

impl<T> Costed<T> {
    /// A result the host charged nothing for.
    pub const fn free(value: T) -> Self {
        Self { value, cost: 0 }
    }

    pub const fn new(value: T, cost: u64) -> Self {
        Self { value, cost }
    }
}

/// An in-memory module served by the require delegate instead of the
/// filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSource {
    pub source: String,
    pub line_offset: i32,
}
