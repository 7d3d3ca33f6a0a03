//! Collection with scan-deferred mutation
//!
//! [`ScanCollection::begin_scan`] returns a [`Scan`] guard holding a snapshot
//! of the elements. While any scan is alive, structural mutations are queued
//! instead of applied: additions are buffered and removals are recorded as
//! indices. When the last scan is dropped, the removals are deduplicated and
//! applied in descending index order, then the buffered additions are
//! appended. Indices seen through a scan therefore stay valid for as long as
//! the scan lives.
//!
//! Callers never wait for scans to finish; they queue. The queue is bounded
//! by `max_pending` and a mutation beyond it is rejected with
//! [`CollectionError::PendingOverflow`].

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::errors::CollectionError;

#[derive(Debug)]
struct CollectionState<T> {
    items: Vec<Arc<T>>,
    active_scans: usize,
    pending_adds: Vec<Arc<T>>,
    pending_removals: SmallVec<[usize; 8]>,
}

impl<T> CollectionState<T> {
    fn pending(&self) -> usize {
        self.pending_adds.len() + self.pending_removals.len()
    }

    fn apply_pending(&mut self) {
        let mut removals = std::mem::take(&mut self.pending_removals);
        removals.sort_unstable_by(|a, b| b.cmp(a));
        removals.dedup();
        for index in removals {
            if index < self.items.len() {
                self.items.remove(index);
            }
        }
        self.items.append(&mut self.pending_adds);
    }
}

/// Thread-safe list whose structure never changes under an active scan.
#[derive(Debug)]
pub struct ScanCollection<T> {
    state: Mutex<CollectionState<T>>,
    max_pending: usize,
}

impl<T> ScanCollection<T> {
    /// Empty collection queueing at most `max_pending` mutations per scan period
    pub fn new(max_pending: usize) -> Self {
        Self {
            state: Mutex::new(CollectionState {
                items: Vec::new(),
                active_scans: 0,
                pending_adds: Vec::new(),
                pending_removals: SmallVec::new(),
            }),
            max_pending,
        }
    }

    /// Start a scan over the current elements
    pub fn begin_scan(&self) -> Scan<'_, T> {
        let mut state = self.state.lock();
        state.active_scans += 1;
        Scan {
            owner: self,
            items: state.items.clone(),
        }
    }

    fn end_scan(&self) {
        let mut state = self.state.lock();
        state.active_scans = match state.active_scans.checked_sub(1) {
            Some(n) => n,
            None => panic!("scan released more times than it was acquired"),
        };
        if state.active_scans == 0 && state.pending() > 0 {
            log::trace!(
                "applying {} deferred additions and {} removals",
                state.pending_adds.len(),
                state.pending_removals.len()
            );
            state.apply_pending();
        }
    }

    /// Append an element, or queue it while a scan is active.
    ///
    /// Returns the shared handle to the element.
    pub fn add(&self, item: T) -> Result<Arc<T>, CollectionError> {
        let item = Arc::new(item);
        let mut state = self.state.lock();
        if state.active_scans == 0 {
            state.items.push(Arc::clone(&item));
            return Ok(item);
        }
        if state.pending() >= self.max_pending {
            return Err(CollectionError::PendingOverflow {
                limit: self.max_pending,
            });
        }
        state.pending_adds.push(Arc::clone(&item));
        Ok(item)
    }

    /// Remove the element at `index`, or queue the removal while a scan is active.
    ///
    /// Queuing the same index twice is a no-op.
    pub fn remove_at(&self, index: usize) -> Result<(), CollectionError> {
        let mut state = self.state.lock();
        let len = state.items.len();
        if index >= len {
            return Err(CollectionError::OutOfBounds { index, len });
        }
        if state.active_scans == 0 {
            state.items.remove(index);
            return Ok(());
        }
        if state.pending_removals.contains(&index) {
            return Ok(());
        }
        if state.pending() >= self.max_pending {
            return Err(CollectionError::PendingOverflow {
                limit: self.max_pending,
            });
        }
        state.pending_removals.push(index);
        Ok(())
    }

    /// Remove every element (deferred while scanning)
    pub fn clear(&self) {
        let mut state = self.state.lock();
        if state.active_scans == 0 {
            state.items.clear();
            return;
        }
        // Clearing supersedes anything already queued
        state.pending_adds.clear();
        state.pending_removals = (0..state.items.len()).collect();
    }

    /// Number of visible elements
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether there are no visible elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of queued mutations
    pub fn pending(&self) -> usize {
        self.state.lock().pending()
    }

    /// Number of live scans
    pub fn active_scans(&self) -> usize {
        self.state.lock().active_scans
    }

    /// Bound on queued mutations
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Copy of the visible elements without starting a scan
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.state.lock().items.clone()
    }
}

/// Live scan over a [`ScanCollection`]; queued mutations apply when the last one drops.
#[derive(Debug)]
pub struct Scan<'a, T> {
    owner: &'a ScanCollection<T>,
    items: Vec<Arc<T>>,
}

impl<T> Scan<'_, T> {
    /// Elements visible when the scan began
    #[inline]
    pub fn items(&self) -> &[Arc<T>] {
        &self.items
    }

    /// Iterate the scanned elements
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }

    /// Number of scanned elements
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the scan saw no elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Queue removal of a scanned element by index
    pub fn remove_at(&self, index: usize) -> Result<(), CollectionError> {
        self.owner.remove_at(index)
    }

    /// Queue an addition
    pub fn add(&self, item: T) -> Result<Arc<T>, CollectionError> {
        self.owner.add(item)
    }
}

impl<T> Drop for Scan<'_, T> {
    fn drop(&mut self) {
        self.owner.end_scan();
    }
}

impl<'s, T> IntoIterator for &'s Scan<'_, T> {
    type Item = &'s Arc<T>;
    type IntoIter = std::slice::Iter<'s, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
