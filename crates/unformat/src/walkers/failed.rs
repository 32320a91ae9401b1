//! The walker for when things don't quite work out.

use crate::event::WalkEvent;

/// Synthetic terminal walker carrying only an explanation.
pub(crate) struct FailedWalker {
    message: String,
    done: bool,
}

impl FailedWalker {
    /// Builds an instance with the specified message.
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            done: false,
        }
    }
}

impl Iterator for FailedWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(WalkEvent::failure(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn yields_its_message_once() {
        let mut walker = FailedWalker::msg("it broke");
        let event = walker.next().unwrap();
        assert!(event.is_failure());
        assert_eq!(event.to_string(), "it broke");
        assert!(walker.next().is_none());
    }
}
