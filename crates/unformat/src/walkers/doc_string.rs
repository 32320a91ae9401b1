//! Recovery of `__doc__` strings.

use crate::{
    event::{DocStringEvent, WalkEvent},
    inj::Injection,
    literal::{Literal, parse_literal},
};

/// Terminal walker for a `__doc__` read.
///
/// Unlike names, docstrings are frequently `None`; that parses cleanly and
/// is not a failure; the recovered value is simply absent.
pub(crate) struct DocStringWalker {
    inj: Injection,
    raw: String,
    value: Option<String>,
    state: DocState,
}

enum DocState {
    Emit,
    Fail,
    Done,
}

/// What a docstring walk recovered.
pub(crate) struct DocStringOutcome {
    /// The recovered docstring; absent for `None` docstrings and parse
    /// failures alike.
    pub value: Option<String>,
}

impl DocStringWalker {
    pub(crate) fn new(inj: Injection, raw: String) -> Self {
        Self {
            inj,
            raw,
            value: None,
            state: DocState::Emit,
        }
    }

    pub(crate) fn finish(self) -> DocStringOutcome {
        DocStringOutcome { value: self.value }
    }
}

impl Iterator for DocStringWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        match self.state {
            DocState::Emit => {
                match parse_literal(&self.raw) {
                    Ok(Literal::Str(text)) => {
                        self.value = Some(text);
                        self.state = DocState::Done;
                    }
                    Ok(Literal::None) => {
                        self.state = DocState::Done;
                    }
                    _ => {
                        self.state = DocState::Fail;
                    }
                }
                Some(WalkEvent::DocString(DocStringEvent {
                    inj: self.inj.to_string(),
                    value: self.value.clone(),
                }))
            }
            DocState::Fail => {
                self.state = DocState::Done;
                Some(WalkEvent::failure(format!(
                    "Expected string literal for docstring but got {}",
                    self.raw
                )))
            }
            DocState::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn recovers_a_docstring() {
        let mut walker = DocStringWalker::new(Injection::from_path("0.__doc__"), "'the docs'".to_owned());
        let events: Vec<_> = walker.by_ref().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(walker.finish().value.as_deref(), Some("the docs"));
    }

    #[test]
    fn none_docstring_is_not_a_failure() {
        let mut walker = DocStringWalker::new(Injection::from_path("0.__doc__"), "None".to_owned());
        let events: Vec<_> = walker.by_ref().collect();
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_failure());
        assert_eq!(walker.finish().value, None);
    }

    #[test]
    fn garbage_docstring_fails() {
        let mut walker =
            DocStringWalker::new(Injection::from_path("0.__doc__"), "<garbage>".to_owned());
        let events: Vec<_> = walker.by_ref().collect();
        assert_eq!(events.len(), 2);
        assert!(events[1].is_failure());
    }
}
