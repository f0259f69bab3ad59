//! Identifiers shared by every manager.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, globally unique identifier of one loaded model instance.
///
/// Handles are owned by the application; managers only reference them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelHandle(u64);

static NEXT_MODEL_HANDLE: AtomicU64 = AtomicU64::new(1);

impl ModelHandle {
    /// Allocates a new handle that has never been returned before in this process.
    pub fn next() -> Self {
        Self(NEXT_MODEL_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps an application-provided raw id.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dense per-model object index in `[0, object_count)`.
pub type ObjectId = u32;

/// Identifier of a streamed sector.
pub type SectorId = u64;

/// Stable identifier of a record inside a [`PackedOverrideBuffer`](crate::PackedOverrideBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
