// registry.rs - process-wide surface id tables
//
// Hosts refer to windows and video surfaces by numeric id strings. These
// tables resolve the ids; they hold handles only, never player state.

use crate::video::VideoSource;
use crate::window::WindowRef;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct SurfaceRegistry<T: Clone> {
    next_id: AtomicU64,
    entries: RwLock<HashMap<u64, T>>,
}

impl<T: Clone> SurfaceRegistry<T> {
    pub fn new(first_id: u64) -> Self {
        Self { next_id: AtomicU64::new(first_id.max(1)), entries: RwLock::new(HashMap::new()) }
    }

    /// Stores `value` under a fresh id.
    pub fn allocate(&self, value: T) -> u64 {
        self.allocate_with(|_| value)
    }

    /// Like [`allocate`](Self::allocate) for values that embed their own id.
    pub fn allocate_with(&self, make: impl FnOnce(u64) -> T) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(id, make(id));
        id
    }

    /// Stores `value` under a caller-chosen id, replacing any previous entry.
    pub fn insert(&self, id: u64, value: T) -> Option<T> {
        self.entries.write().insert(id, value)
    }

    pub fn get(&self, id: u64) -> Option<T> {
        self.entries.read().get(&id).cloned()
    }

    pub fn remove(&self, id: u64) -> Option<T> {
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

static WINDOWS: Lazy<SurfaceRegistry<WindowRef>> = Lazy::new(|| SurfaceRegistry::new(1));
static VIDEO_SURFACES: Lazy<SurfaceRegistry<VideoSource>> =
    Lazy::new(|| SurfaceRegistry::new(1000));

/// Publishes a host window and returns its surface id.
pub fn register_window(window: WindowRef) -> u64 {
    WINDOWS.allocate(window)
}

/// Publishes a host window under an id chosen by the host platform.
pub fn register_window_with_id(id: u64, window: WindowRef) {
    WINDOWS.insert(id, window);
}

pub fn unregister_window(id: u64) -> Option<WindowRef> {
    WINDOWS.remove(id)
}

pub fn lookup_window(id: u64) -> Option<WindowRef> {
    WINDOWS.get(id)
}

pub(crate) fn register_video_surface(make: impl FnOnce(u64) -> VideoSource) -> u64 {
    VIDEO_SURFACES.allocate_with(make)
}

pub(crate) fn unregister_video_surface(id: u64) {
    VIDEO_SURFACES.remove(id);
}

pub(crate) fn lookup_video_surface(id: u64) -> Option<VideoSource> {
    VIDEO_SURFACES.get(id)
}
