//! Logical time source for the workout runtime.
//!
//! The runtime never reads the system clock directly. Every component takes a
//! `Clock` and the execution context snapshots `now()` exactly once per turn,
//! so all operations within one turn observe the same instant (including the
//! cascaded completion/unmount chain after the action drain). Between turns
//! time advances normally.
//!
//! Two implementations ship: `WallClock` for real runs and `ManualClock` for
//! tests, which is shared-handle cloneable so a test can keep advancing time
//! while the runtime owns its boxed copy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since an arbitrary epoch. Wall implementations use the Unix
/// epoch; tests usually start at zero. Only differences and ordering matter.
pub type Millis = u64;

/// Monotonic-enough time source consumed by the runtime.
///
/// Implementations must be cheap to call; `now()` is read once per turn and
/// once per externally produced event.
pub trait Clock: Send {
    fn now(&self) -> Millis;
}

/// Wall clock reading the system time as milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now(&self) -> Millis {
        // A pre-epoch system clock yields 0 rather than panicking.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Millis)
            .unwrap_or(0)
    }
}

/// Settable clock for tests. Clones share the same underlying instant, so a
/// test holds one handle while the runtime owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Millis) -> Millis {
        self.now.fetch_add(by, Ordering::SeqCst) + by
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}
