//! Ambient action collection
//!
//! Builders append every action they produce to the innermost open frame of
//! the current thread. Frames nest: a builder transaction opens its own
//! frame so nested actions land in the transaction rather than the caller's
//! collection.

use statekit_core::Action;
use std::cell::RefCell;

thread_local! {
    static FRAMES: RefCell<Vec<Vec<Action>>> = RefCell::new(Vec::new());
}

/// An open collection frame, popped on drop if not closed
pub(crate) struct Frame {
    closed: bool,
}

impl Frame {
    pub(crate) fn open() -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(Vec::new()));
        Frame { closed: false }
    }

    /// Pop the frame and return what it collected
    pub(crate) fn close(mut self) -> Vec<Action> {
        self.closed = true;
        FRAMES.with(|frames| frames.borrow_mut().pop().unwrap_or_default())
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        if !self.closed {
            FRAMES.with(|frames| {
                frames.borrow_mut().pop();
            });
        }
    }
}

/// Append to the innermost frame; a no-op when none is open
pub(crate) fn record(action: &Action) {
    FRAMES.with(|frames| {
        if let Some(top) = frames.borrow_mut().last_mut() {
            top.push(action.clone());
        }
    });
}

/// Whether a collection frame is open on this thread
pub fn is_collecting() -> bool {
    FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Run `f` and return every action recorded while it ran, in call order
///
/// Frames nest: an inner `collect_actions` keeps its actions from the outer
/// one. A panic inside `f` discards the frame.
///
/// ```
/// use statekit_actions::{collect_actions, ActionBuilder};
/// use statekit_core::{Scope, StorageKind};
///
/// let cart = ActionBuilder::new(Scope::App, StorageKind::Memory);
/// let actions = collect_actions(|| {
///     cart.set("cart.total", 5).unwrap();
///     cart.remove("cart.coupon").unwrap();
/// });
/// assert_eq!(actions.len(), 2);
/// ```
pub fn collect_actions<F>(f: F) -> Vec<Action>
where
    F: FnOnce(),
{
    let frame = Frame::open();
    f();
    frame.close()
}
