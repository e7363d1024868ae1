//! Bounded in-memory response cache with insertion-order eviction.

use crate::limits::CacheLimits;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared LRU cache mapping request targets to complete response bytes.
///
/// Entries live on a recency list ordered by **insertion** time: new entries
/// are linked at the head, eviction removes from the tail. Lookups never
/// reorder the list, so a frequently read entry still ages out on schedule.
/// This is deliberate; promoting on read would change which entries survive
/// the size bound.
///
/// Concurrency follows the readers-writer discipline: any number of
/// [`find`](Self::find) calls run in parallel, [`insert`](Self::insert)
/// takes the list exclusively for the whole evict-and-link sequence. Bodies
/// are handed out as shared `Arc<[u8]>` handles cloned under the read lock,
/// so a reader can keep streaming a body that a writer evicts concurrently.
///
/// # Examples
///
/// ```
/// use keeper_proxy::{ResponseCache, limits::CacheLimits};
///
/// let cache = ResponseCache::new(CacheLimits::default());
/// cache.insert("http://example.com/", b"HTTP/1.0 200 OK\r\n\r\nhello");
///
/// let body = cache.find("http://example.com/").unwrap();
/// assert!(body.ends_with(b"hello"));
/// assert_eq!(cache.find("http://example.com/missing"), None);
/// ```
#[derive(Debug)]
pub struct ResponseCache {
    state: RwLock<Recency>,
    limits: CacheLimits,
}

/// The recency list, stored as an arena of stable-index slots.
///
/// `prev`/`next` are slot indices instead of pointers; freed slots go on the
/// free list for reuse. The surrounding write lock gives the mutating side
/// unique access, so the arena itself needs no further synchronization.
#[derive(Debug, Default)]
struct Recency {
    slots: Vec<Option<Entry>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    total_size: usize,
}

#[derive(Debug)]
struct Entry {
    uri: Box<str>,
    body: Arc<[u8]>,
    prev: Option<usize>,
    next: Option<usize>,
}

impl ResponseCache {
    #[inline]
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            state: RwLock::new(Recency::default()),
            limits,
        }
    }

    /// Looks up the cached response for an exactly matching target.
    ///
    /// The match is byte-for-byte on the request target used at insert time.
    /// When duplicate targets exist the most recently inserted one wins.
    pub fn find(&self, uri: &str) -> Option<Arc<[u8]>> {
        let state = self.read();

        let mut cursor = state.head;
        while let Some(index) = cursor {
            let Some(entry) = state.slots[index].as_ref() else {
                break;
            };

            if *entry.uri == *uri {
                return Some(entry.body.clone());
            }
            cursor = entry.next;
        }

        None
    }

    /// Caches `body` under `uri`, evicting from the tail until it fits.
    ///
    /// Bodies over `max_object_size` are skipped silently. Existing entries
    /// with the same target are left in place; the new entry shadows them
    /// from the head until all of them age out.
    pub fn insert(&self, uri: &str, body: &[u8]) {
        if body.len() > self.limits.max_object_size {
            return;
        }

        let mut state = self.write();

        while state.total_size + body.len() > self.limits.max_cache_size {
            if !state.evict_tail() {
                break;
            }
        }
        // Only reachable with a max_object_size above max_cache_size.
        if state.total_size + body.len() > self.limits.max_cache_size {
            return;
        }

        state.link_front(uri, body);
    }

    /// Sum of all cached body lengths, in bytes.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.read().total_size
    }

    /// Number of cached entries (duplicates counted separately).
    #[inline]
    pub fn entry_count(&self) -> usize {
        let state = self.read();
        state.slots.len() - state.free.len()
    }

    #[inline]
    fn read(&self) -> RwLockReadGuard<'_, Recency> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn write(&self) -> RwLockWriteGuard<'_, Recency> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Recency {
    fn link_front(&mut self, uri: &str, body: &[u8]) {
        let entry = Entry {
            uri: uri.into(),
            body: Arc::from(body),
            prev: None,
            next: self.head,
        };
        self.total_size += body.len();

        let index = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };

        if let Some(old_head) = self.head {
            if let Some(old) = self.slots[old_head].as_mut() {
                old.prev = Some(index);
            }
        }
        self.head = Some(index);
        if self.tail.is_none() {
            self.tail = Some(index);
        }
    }

    fn evict_tail(&mut self) -> bool {
        let Some(index) = self.tail else {
            return false;
        };
        let Some(entry) = self.slots[index].take() else {
            return false;
        };

        self.tail = entry.prev;
        match entry.prev {
            Some(prev) => {
                if let Some(new_tail) = self.slots[prev].as_mut() {
                    new_tail.next = None;
                }
            }
            // Single entry: the list becomes empty.
            None => self.head = None,
        }

        self.total_size -= entry.body.len();
        self.free.push(index);
        true
    }
}
