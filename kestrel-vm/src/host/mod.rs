//! The host capability table.
//!
//! The node installs its callbacks once, before any engine exists; the built
//! table is immutable and shared by reference with every engine. A capability
//! whose slot is unset is either absent from the script global or throws a
//! script-level error when invoked.

mod types;

pub use types::{
    Costed, LogLevel, ModuleSource, TxInput, TxOutput, TxSnapshot, UtxoSnapshot,
};

use std::sync::Arc;

/// `verifyAddress(addr)`: address validity plus the storage-accounting cost.
pub type VerifyAddressFn = dyn Fn(&str) -> Costed<bool> + Send + Sync;
/// `transfer(to, amount, tip)` for the contract identified by the handler.
pub type TransferFn = dyn Fn(u64, &str, &str, &str) -> Costed<i32> + Send + Sync;
/// Current chain height.
pub type BlockHeightFn = dyn Fn(u64) -> u64 + Send + Sync;
/// The executing node's own address.
pub type NodeAddressFn = dyn Fn(u64) -> Option<String> + Send + Sync;
/// Request deletion of the calling contract.
pub type DeleteContractFn = dyn Fn(u64) -> i32 + Send + Sync;
/// Per-contract storage read; `None` maps to script `null`.
pub type StorageGetFn = dyn Fn(u64, &str) -> Costed<Option<String>> + Send + Sync;
/// Per-contract storage write.
pub type StorageSetFn = dyn Fn(u64, &str, &str) -> Costed<i32> + Send + Sync;
/// Per-contract storage delete.
pub type StorageDelFn = dyn Fn(u64, &str) -> Costed<i32> + Send + Sync;
/// Reward accounting: `record(addr, amount)`.
pub type RecordRewardFn = dyn Fn(u64, &str, &str) -> i32 + Send + Sync;
/// Event sink: `trigger(topic, data)`.
pub type TriggerEventFn = dyn Fn(u64, &str, &str) -> i32 + Send + Sync;
/// Transaction snapshot for the invocation identified by the handler.
pub type TransactionGetFn = dyn Fn(u64) -> Option<TxSnapshot> + Send + Sync;
/// Previous-UTXO snapshots for the invocation identified by the handler.
pub type PrevUtxosGetFn = dyn Fn(u64) -> Vec<UtxoSnapshot> + Send + Sync;
/// Script log sink.
pub type LoggerFn = dyn Fn(LogLevel, &[String]) + Send + Sync;
/// Signature verification: `(msg, pubkey, sig)`.
pub type VerifySignatureFn = dyn Fn(&str, &str, &str) -> bool + Send + Sync;
/// Public-key/address verification: `(addr, pubkey)`.
pub type VerifyPublicKeyFn = dyn Fn(&str, &str) -> bool + Send + Sync;
/// Deterministic random in `[0, max)` for the invocation's seed.
pub type RandomFn = dyn Fn(u64, i64) -> i64 + Send + Sync;
/// In-memory module lookup consulted before the filesystem.
pub type RequireDelegateFn = dyn Fn(u64, &str) -> Option<ModuleSource> + Send + Sync;
/// Maps a bare library name to its version-pinned relative path.
pub type LibVersionFn = dyn Fn(u64, &str) -> Option<String> + Send + Sync;

/// Immutable table of host callbacks, one slot per capability.
#[derive(Default)]
pub struct HostCallbacks {
    pub(crate) verify_address: Option<Box<VerifyAddressFn>>,
    pub(crate) transfer: Option<Box<TransferFn>>,
    pub(crate) block_height: Option<Box<BlockHeightFn>>,
    pub(crate) node_address: Option<Box<NodeAddressFn>>,
    pub(crate) delete_contract: Option<Box<DeleteContractFn>>,
    pub(crate) storage_get: Option<Box<StorageGetFn>>,
    pub(crate) storage_set: Option<Box<StorageSetFn>>,
    pub(crate) storage_del: Option<Box<StorageDelFn>>,
    pub(crate) record_reward: Option<Box<RecordRewardFn>>,
    pub(crate) trigger_event: Option<Box<TriggerEventFn>>,
    pub(crate) transaction_get: Option<Box<TransactionGetFn>>,
    pub(crate) prev_utxos_get: Option<Box<PrevUtxosGetFn>>,
    pub(crate) logger: Option<Box<LoggerFn>>,
    pub(crate) verify_signature: Option<Box<VerifySignatureFn>>,
    pub(crate) verify_public_key: Option<Box<VerifyPublicKeyFn>>,
    pub(crate) random: Option<Box<RandomFn>>,
    pub(crate) require_delegate: Option<Box<RequireDelegateFn>>,
    pub(crate) lib_version: Option<Box<LibVersionFn>>,
}

impl HostCallbacks {
    /// Start building a callback table.
    #[must_use]
    pub fn builder() -> HostCallbacksBuilder {
        HostCallbacksBuilder {
            callbacks: Self::default(),
        }
    }

    /// An empty table: every capability invocation throws script-side.
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// Builder installing callbacks slot by slot; `build` freezes the table.
pub struct HostCallbacksBuilder {
    callbacks: HostCallbacks,
}

impl HostCallbacksBuilder {
    pub fn verify_address(
        mut self,
        f: impl Fn(&str) -> Costed<bool> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.verify_address = Some(Box::new(f));
        self
    }

    pub fn transfer(
        mut self,
        f: impl Fn(u64, &str, &str, &str) -> Costed<i32> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.transfer = Some(Box::new(f));
        self
    }

    pub fn block_height(mut self, f: impl Fn(u64) -> u64 + Send + Sync + 'static) -> Self {
        self.callbacks.block_height = Some(Box::new(f));
        self
    }

    pub fn node_address(
        mut self,
        f: impl Fn(u64) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.node_address = Some(Box::new(f));
        self
    }

    pub fn delete_contract(mut self, f: impl Fn(u64) -> i32 + Send + Sync + 'static) -> Self {
        self.callbacks.delete_contract = Some(Box::new(f));
        self
    }

    pub fn storage_get(
        mut self,
        f: impl Fn(u64, &str) -> Costed<Option<String>> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.storage_get = Some(Box::new(f));
        self
    }

    pub fn storage_set(
        mut self,
        f: impl Fn(u64, &str, &str) -> Costed<i32> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.storage_set = Some(Box::new(f));
        self
    }

    pub fn storage_del(
        mut self,
        f: impl Fn(u64, &str) -> Costed<i32> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.storage_del = Some(Box::new(f));
        self
    }

    pub fn record_reward(
        mut self,
        f: impl Fn(u64, &str, &str) -> i32 + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.record_reward = Some(Box::new(f));
        self
    }

    pub fn trigger_event(
        mut self,
        f: impl Fn(u64, &str, &str) -> i32 + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.trigger_event = Some(Box::new(f));
        self
    }

    pub fn transaction_get(
        mut self,
        f: impl Fn(u64) -> Option<TxSnapshot> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.transaction_get = Some(Box::new(f));
        self
    }

    pub fn prev_utxos_get(
        mut self,
        f: impl Fn(u64) -> Vec<UtxoSnapshot> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.prev_utxos_get = Some(Box::new(f));
        self
    }

    pub fn logger(mut self, f: impl Fn(LogLevel, &[String]) + Send + Sync + 'static) -> Self {
        self.callbacks.logger = Some(Box::new(f));
        self
    }

    pub fn verify_signature(
        mut self,
        f: impl Fn(&str, &str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.verify_signature = Some(Box::new(f));
        self
    }

    pub fn verify_public_key(
        mut self,
        f: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.verify_public_key = Some(Box::new(f));
        self
    }

    pub fn random(mut self, f: impl Fn(u64, i64) -> i64 + Send + Sync + 'static) -> Self {
        self.callbacks.random = Some(Box::new(f));
        self
    }

    pub fn require_delegate(
        mut self,
        f: impl Fn(u64, &str) -> Option<ModuleSource> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.require_delegate = Some(Box::new(f));
        self
    }

    pub fn lib_version(
        mut self,
        f: impl Fn(u64, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.lib_version = Some(Box::new(f));
        self
    }

    /// Freeze the table. Readers share it without locking.
    #[must_use]
    pub fn build(self) -> Arc<HostCallbacks> {
        Arc::new(self.callbacks)
    }
}
