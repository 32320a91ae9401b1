//! Typed single-field reads against a code object.

use crate::{
    engine::Scope,
    event::{CodeObjectFieldEvent, WalkEvent},
    inj::Injection,
    literal::{Literal, parse_literal},
};

/// The literal type a field reader requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldType {
    Int,
    Bytes,
    Text,
    TextTuple,
}

impl FieldType {
    fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Bytes => "bytes",
            Self::Text => "str",
            Self::TextTuple => "tuple of str",
        }
    }

    fn accepts(self, value: &Literal) -> bool {
        match self {
            Self::Int => value.expect_int().is_ok(),
            Self::Bytes => value.expect_bytes().is_ok(),
            Self::Text => value.expect_str().is_ok(),
            Self::TextTuple => value.expect_str_tuple().is_ok(),
        }
    }
}

/// Terminal walker carrying one recovered code-object field.
///
/// Constructed by field readers, never dispatched from a response.
#[derive(Debug)]
pub(crate) struct CodeObjectFieldWalker {
    inj: Injection,
    field: String,
    value: Literal,
    done: bool,
}

/// The recovered field value.
pub(crate) struct CodeObjectFieldOutcome {
    pub field: String,
    pub value: Literal,
}

impl CodeObjectFieldWalker {
    pub(crate) fn new(inj: Injection, field: impl Into<String>, value: Literal) -> Self {
        Self {
            inj,
            field: field.into(),
            value,
            done: false,
        }
    }

    pub(crate) fn finish(self) -> CodeObjectFieldOutcome {
        CodeObjectFieldOutcome {
            field: self.field,
            value: self.value,
        }
    }
}

impl Iterator for CodeObjectFieldWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(WalkEvent::CodeObjectField(CodeObjectFieldEvent {
            inj: self.inj.to_string(),
            field: self.field.clone(),
            value_repr: self.value.py_repr(),
        }))
    }
}

/// Reads one field from a code object: appends `.<field>` to the base path,
/// sends it with the `!r` conversion, parses the response as a literal of
/// the expected type.
///
/// The error string is ready to become a `Failure` event; a failed field is
/// fatal to the enclosing code-object walk.
pub(crate) fn read_code_field(
    scope: &Scope,
    base: &Injection,
    field: &'static str,
    expected: FieldType,
) -> Result<CodeObjectFieldWalker, String> {
    let inj = base.attr(field);
    let raw = scope.send_repr(&inj).ok_or_else(|| {
        format!(
            "Unable to retrieve {field} field from code object injection with string {}",
            inj.repr_payload()
        )
    })?;
    let value = parse_literal(&raw)
        .map_err(|err| format!("Unable to parse {field} field response {raw}: {err}"))?;
    if !expected.accepts(&value) {
        return Err(format!(
            "Expected {} when reading {field}; got {} instead",
            expected.name(),
            value.type_name()
        ));
    }
    Ok(CodeObjectFieldWalker::new(inj, field, value))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::test_support::scripted_scope;

    #[test]
    fn reads_a_typed_field() {
        let scope = scripted_scope(&[("0.__code__.co_argcount!r", "2")]);
        let mut walker = read_code_field(
            &scope,
            &Injection::from_path("0.__code__"),
            "co_argcount",
            FieldType::Int,
        )
        .unwrap();

        let event = walker.next().unwrap();
        assert_eq!(event.to_string(), "Injected code object field with string 0.__code__.co_argcount");
        assert!(walker.next().is_none());

        let outcome = walker.finish();
        assert_eq!(outcome.field, "co_argcount");
        assert_eq!(outcome.value, Literal::Int(2));
    }

    #[test]
    fn missing_response_is_fatal() {
        let scope = scripted_scope(&[]);
        let err = read_code_field(
            &scope,
            &Injection::from_path("0.__code__"),
            "co_flags",
            FieldType::Int,
        )
        .unwrap_err();
        assert_eq!(
            err,
            "Unable to retrieve co_flags field from code object injection with string 0.__code__.co_flags!r"
        );
    }

    #[test]
    fn type_mismatch_is_fatal() {
        let scope = scripted_scope(&[("0.__code__.co_code!r", "'not bytes'")]);
        let err = read_code_field(
            &scope,
            &Injection::from_path("0.__code__"),
            "co_code",
            FieldType::Bytes,
        )
        .unwrap_err();
        assert_eq!(err, "Expected bytes when reading co_code; got str instead");
    }

    #[test]
    fn unparseable_response_is_fatal() {
        let scope = scripted_scope(&[("0.__code__.co_name!r", "<garbage>")]);
        let err = read_code_field(
            &scope,
            &Injection::from_path("0.__code__"),
            "co_name",
            FieldType::Text,
        )
        .unwrap_err();
        assert!(err.starts_with("Unable to parse co_name field response <garbage>"));
    }
}
