//! Recovery of literal attributes.

use crate::{
    event::{AttributeEvent, WalkEvent},
    inj::Injection,
    literal::parse_literal,
};

/// Terminal walker for an attribute whose response is (hopefully) a plain
/// literal. On success it synthesizes the `name = repr(value)` source line
/// that reappears in class and module synthesis.
pub(crate) struct AttributeWalker {
    inj: Injection,
    raw: String,
    src_code: Option<String>,
    done: bool,
}

/// What an attribute walk recovered.
pub(crate) struct AttributeOutcome {
    /// The attribute name (last path segment).
    pub name: String,
    /// The synthesized `name = value` line; absent when parsing failed.
    pub src_code: Option<String>,
}

impl AttributeWalker {
    pub(crate) fn new(inj: Injection, raw: String) -> Self {
        Self {
            inj,
            raw,
            src_code: None,
            done: false,
        }
    }

    pub(crate) fn finish(self) -> AttributeOutcome {
        AttributeOutcome {
            name: self.inj.leaf_name().to_owned(),
            src_code: self.src_code,
        }
    }
}

impl Iterator for AttributeWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        if self.done {
            return None;
        }
        self.done = true;

        match parse_literal(&self.raw) {
            Ok(value) => {
                let name = self.inj.leaf_name().to_owned();
                let value_repr = value.py_repr();
                let src_code = format!("{name} = {value_repr}");
                self.src_code = Some(src_code.clone());
                Some(WalkEvent::Attribute(AttributeEvent {
                    inj: self.inj.to_string(),
                    name,
                    value_repr,
                    src_code,
                }))
            }
            Err(_) => Some(WalkEvent::failure(format!(
                "Unable to parse raw injection response {} as a literal; received from string {}",
                self.raw, self.inj
            ))),
        }
    }
}
