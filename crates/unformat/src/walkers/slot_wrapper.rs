//! Slot wrappers are recorded, never traversed.

use crate::{
    event::{SlotWrapperEvent, WalkEvent},
    inj::Injection,
};

/// Terminal walker for a `<slot wrapper …>` response.
pub(crate) struct SlotWrapperWalker {
    inj: Injection,
    done: bool,
}

impl SlotWrapperWalker {
    pub(crate) fn new(inj: Injection) -> Self {
        Self { inj, done: false }
    }
}

impl Iterator for SlotWrapperWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(WalkEvent::SlotWrapper(SlotWrapperEvent {
            inj: self.inj.to_string(),
        }))
    }
}
