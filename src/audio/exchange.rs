//! Lock-free snapshot handoff between the capture thread and consumers
//!
//! The public snapshot lives in an [`ArcSwap`]; the capture thread owns the
//! internal one outright. Publishing is a single atomic pointer swap. The
//! snapshot that was public becomes the next internal one as soon as no
//! reader holds it, so in the steady state the same two allocations flip
//! back and forth forever.

use super::snapshot::AudioData;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// How many previously published snapshots may wait for readers to let go
const MAX_RETIRED: usize = 4;

/// Consumer-side handle to the latest published snapshot
#[derive(Clone)]
pub struct SnapshotReader {
    public: Arc<ArcSwap<AudioData>>,
}

impl SnapshotReader {
    /// The most recent complete snapshot.
    ///
    /// Take it once per read cycle: two calls may return different blocks.
    pub fn latest(&self) -> Arc<AudioData> {
        self.public.load_full()
    }

    /// Sequence number of the most recent snapshot
    pub fn sequence(&self) -> u64 {
        self.public.load().sequence
    }
}

/// Double-buffered publication owned by the capture loop
pub(crate) struct SnapshotExchange {
    public: Arc<ArcSwap<AudioData>>,
    internal: Arc<AudioData>,
    retired: Vec<Arc<AudioData>>,
    block_size: usize,
    fallback_allocations: u64,
}

impl SnapshotExchange {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            public: Arc::new(ArcSwap::from_pointee(AudioData::new(block_size))),
            internal: Arc::new(AudioData::new(block_size)),
            retired: Vec::with_capacity(MAX_RETIRED),
            block_size,
            fallback_allocations: 0,
        }
    }

    pub(crate) fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            public: Arc::clone(&self.public),
        }
    }

    /// The snapshot being filled for the next publish.
    ///
    /// The internal `Arc` is never handed out, so this does not clone.
    pub(crate) fn internal_mut(&mut self) -> &mut AudioData {
        Arc::make_mut(&mut self.internal)
    }

    /// Current public snapshot
    pub(crate) fn current(&self) -> Arc<AudioData> {
        self.public.load_full()
    }

    /// Swap the internal snapshot in as the public one
    pub(crate) fn publish(&mut self) {
        let previous = self.public.swap(Arc::clone(&self.internal));
        self.internal = self.reclaim(previous);
    }

    /// Number of snapshots allocated because readers held on to old ones
    pub(crate) fn fallback_allocations(&self) -> u64 {
        self.fallback_allocations
    }

    fn reclaim(&mut self, mut previous: Arc<AudioData>) -> Arc<AudioData> {
        if Arc::get_mut(&mut previous).is_some() {
            return previous;
        }

        // A reader still holds the old public snapshot; park it and look for
        // an earlier one that has been released since.
        if self.retired.len() == MAX_RETIRED {
            self.retired.remove(0);
        }
        self.retired.push(previous);

        if let Some(index) = self
            .retired
            .iter_mut()
            .position(|snapshot| Arc::get_mut(snapshot).is_some())
        {
            return self.retired.swap_remove(index);
        }

        self.fallback_allocations += 1;
        log::debug!(
            "All {} retired snapshots still held by readers, allocating a new one",
            self.retired.len()
        );
        Arc::new(AudioData::new(self.block_size))
    }
}
