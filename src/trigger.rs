// Trigger sources - boolean signals polled once per captured frame

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::capture::Frame;

/// A predicate evaluated once per captured frame.
///
/// `poll` receives the frame just captured so gesture-style detectors can
/// inspect pixels; simple triggers ignore it. Implementations must not
/// touch the ring buffer.
pub trait TriggerSource: Send {
    fn poll(&mut self, frame: &Frame) -> bool;
}

/// Trigger backed by a shared armed flag.
///
/// `poll` consumes the rising edge: firing the handle any number of times
/// between two frames still yields a single trigger. The flag is reset by
/// the poll itself, so ownership of the edge is unambiguous.
pub struct FlagTrigger {
    armed: Arc<AtomicBool>,
}

/// Cloneable handle used to fire a [`FlagTrigger`] from another thread
/// (keyboard reader, signal handler, gesture detector).
#[derive(Clone)]
pub struct TriggerHandle {
    armed: Arc<AtomicBool>,
}

impl FlagTrigger {
    pub fn new() -> (Self, TriggerHandle) {
        let armed = Arc::new(AtomicBool::new(false));
        (
            Self {
                armed: armed.clone(),
            },
            TriggerHandle { armed },
        )
    }
}

impl TriggerSource for FlagTrigger {
    fn poll(&mut self, _frame: &Frame) -> bool {
        self.armed.swap(false, Ordering::AcqRel)
    }
}

impl TriggerHandle {
    /// Request a flush at the next captured frame.
    pub fn fire(&self) {
        self.armed.store(true, Ordering::Release);
    }
}

/// Trigger that never fires. Useful for soak runs and tests.
pub struct NeverTrigger;

impl TriggerSource for NeverTrigger {
    fn poll(&mut self, _frame: &Frame) -> bool {
        false
    }
}
