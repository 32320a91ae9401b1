//! Recovery of `__name__`-family strings.

use crate::{
    event::{NameEvent, WalkEvent},
    inj::Injection,
    literal::{Literal, parse_literal},
};

/// Terminal walker for a `__name__` / `__qualname__` / `__module__` read.
///
/// The recovered text feeds blacklisting decisions, so parents check
/// [`NameOutcome::is_default`] before trusting the value.
pub(crate) struct NameWalker {
    inj: Injection,
    raw: String,
    value: Option<String>,
    state: NameState,
}

enum NameState {
    Emit,
    Fail,
    Done,
}

/// What a name walk recovered.
pub(crate) struct NameOutcome {
    /// The recovered text; absent when the response was not a string
    /// literal.
    pub value: Option<String>,
}

impl NameOutcome {
    /// True when no name was actually recovered.
    pub fn is_default(&self) -> bool {
        self.value.is_none()
    }
}

impl NameWalker {
    pub(crate) fn new(inj: Injection, raw: String) -> Self {
        Self {
            inj,
            raw,
            value: None,
            state: NameState::Emit,
        }
    }

    pub(crate) fn finish(self) -> NameOutcome {
        NameOutcome { value: self.value }
    }
}

impl Iterator for NameWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        match self.state {
            NameState::Emit => {
                if let Ok(Literal::Str(text)) = parse_literal(&self.raw) {
                    self.value = Some(text);
                    self.state = NameState::Done;
                } else {
                    self.state = NameState::Fail;
                }
                Some(WalkEvent::Name(NameEvent {
                    inj: self.inj.to_string(),
                    value: self.value.clone(),
                }))
            }
            NameState::Fail => {
                self.state = NameState::Done;
                Some(WalkEvent::failure(format!(
                    "Expected string literal for name field but got {}",
                    self.raw
                )))
            }
            NameState::Done => None,
        }
    }
}
