//! State shared between an engine, its worker, its supervisor, and the
//! capability bindings closed over it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::runtime::HeapStats;

/// Capability groups enabled on an engine. Stored as a bitmask so embedders
/// can pin the surface a historical contract was deployed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityVersion(pub u64);

impl CapabilityVersion {
    /// The `math` global (deterministic random).
    pub const MATH: Self = Self(0x01);
    /// Seed-backed fallback for `math.random` when the host installs no
    /// random callback.
    pub const MATH_RANDOM: Self = Self(0x02);
    /// The `_native_blockchain` global.
    pub const BLOCKCHAIN: Self = Self(0x04);

    /// Default surface for newly created engines.
    pub const DEFAULT: Self = Self(Self::MATH.0 | Self::BLOCKCHAIN.0);

    /// Checks whether the mask contains the given group.
    #[must_use]
    pub const fn contains(self, group: Self) -> bool {
        (self.0 & group.0) != 0
    }
}

impl std::ops::BitOr for CapabilityVersion {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for CapabilityVersion {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Statistics snapshot combining the runtime's heap numbers with the
/// engine's instruction count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub count_of_executed_instructions: u64,
    /// `total_heap_size + peak_array_buffer_size`; the number compared
    /// against the memory limit.
    pub total_memory_size: u64,
    pub total_heap_size: u64,
    pub total_heap_size_executable: u64,
    pub total_physical_size: u64,
    pub total_available_size: u64,
    pub used_heap_size: u64,
    pub heap_size_limit: u64,
    pub malloced_memory: u64,
    pub peak_malloced_memory: u64,
    pub total_array_buffer_size: u64,
    pub peak_array_buffer_size: u64,
}

/// Mutable engine core shared by `Arc`. The worker thread holding the engine
/// lock mutates it; the supervisor and the limits listener read flags and
/// counters through atomics.
pub(crate) struct EngineShared {
    instructions: AtomicU64,
    max_instructions: AtomicU64,
    max_memory: AtomicU64,
    termination_requested: AtomicBool,
    unexpected_error: AtomicBool,
    inner_vm_error: AtomicBool,
    inner_vm_message: Mutex<String>,
    stats: Mutex<MemoryStats>,
    rng_state: AtomicU64,
}

impl EngineShared {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            instructions: AtomicU64::new(0),
            max_instructions: AtomicU64::new(0),
            max_memory: AtomicU64::new(0),
            termination_requested: AtomicBool::new(false),
            unexpected_error: AtomicBool::new(false),
            inner_vm_error: AtomicBool::new(false),
            inner_vm_message: Mutex::new(String::new()),
            stats: Mutex::new(MemoryStats::default()),
            rng_state: AtomicU64::new(0),
        })
    }

    pub(crate) fn add_instructions(&self, n: u64) -> u64 {
        self.instructions.fetch_add(n, Ordering::SeqCst) + n
    }

    pub(crate) fn instructions(&self) -> u64 {
        self.instructions.load(Ordering::SeqCst)
    }

    pub(crate) fn set_instructions(&self, n: u64) {
        self.instructions.store(n, Ordering::SeqCst);
        self.stats.lock().count_of_executed_instructions = n;
    }

    pub(crate) fn set_limits(&self, max_instructions: u64, max_memory: u64) {
        self.max_instructions.store(max_instructions, Ordering::SeqCst);
        self.max_memory.store(max_memory, Ordering::SeqCst);
    }

    pub(crate) fn max_instructions(&self) -> u64 {
        self.max_instructions.load(Ordering::SeqCst)
    }

    pub(crate) fn max_memory(&self) -> u64 {
        self.max_memory.load(Ordering::SeqCst)
    }

    pub(crate) fn request_termination(&self) {
        self.termination_requested.store(true, Ordering::SeqCst);
    }

    pub(crate) fn termination_requested(&self) -> bool {
        self.termination_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn set_unexpected_error(&self) {
        self.unexpected_error.store(true, Ordering::SeqCst);
    }

    pub(crate) fn unexpected_error(&self) -> bool {
        self.unexpected_error.load(Ordering::SeqCst)
    }

    pub(crate) fn set_inner_vm_error(&self, message: &str) {
        *self.inner_vm_message.lock() = message.to_string();
        self.inner_vm_error.store(true, Ordering::SeqCst);
    }

    pub(crate) fn inner_vm_error(&self) -> bool {
        self.inner_vm_error.load(Ordering::SeqCst)
    }

    pub(crate) fn inner_vm_message(&self) -> String {
        self.inner_vm_message.lock().clone()
    }

    /// Resets the counter and clears per-run flags at the start of an
    /// invocation. Within a run the counter only grows and flags are only
    /// ever set.
    pub(crate) fn begin_run(&self) {
        self.reset_instructions();
        self.termination_requested.store(false, Ordering::SeqCst);
        self.unexpected_error.store(false, Ordering::SeqCst);
        self.inner_vm_error.store(false, Ordering::SeqCst);
        self.inner_vm_message.lock().clear();
    }

    /// Folds a fresh heap snapshot into the stats and returns the combined
    /// view.
    pub(crate) fn refresh_stats(&self, heap: HeapStats) -> MemoryStats {
        let mut stats = self.stats.lock();
        stats.total_heap_size = heap.total_heap_size;
        stats.total_heap_size_executable = heap.total_heap_size_executable;
        stats.total_physical_size = heap.total_physical_size;
        stats.total_available_size = heap.total_available_size;
        stats.used_heap_size = heap.used_heap_size;
        stats.heap_size_limit = heap.heap_size_limit;
        stats.malloced_memory = heap.malloced_memory;
        stats.peak_malloced_memory = heap.peak_malloced_memory;
        stats.total_array_buffer_size = heap.total_array_buffer_size;
        stats.peak_array_buffer_size = heap.peak_array_buffer_size;
        stats.total_memory_size = heap.total_heap_size + heap.peak_array_buffer_size;
        stats.count_of_executed_instructions = self.instructions();
        *stats
    }

    pub(crate) fn seed_rng(&self, seed: u64) {
        self.rng_state.store(seed, Ordering::SeqCst);
    }

    /// SplitMix64 step over the per-invocation seed; deterministic across
    /// nodes replaying the same transaction.
    pub(crate) fn next_random(&self) -> u64 {
        let mut z = self
            .rng_state
            .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::SeqCst)
            .wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Resets the counter for a fresh invocation.
    pub(crate) fn reset_instructions(&self) {
        self.set_instructions(0);
    }
}
