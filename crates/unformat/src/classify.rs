//! Classification of oracle responses into walker variants.
//!
//! The original runtime enumerated walker subclasses and probed each one's
//! patterns; here the registry is a fixed-order enum. Each variant may carry
//! an *injection* pattern (matched against the payload as sent, conversion
//! flag included) and a *response* pattern (matched against the extracted
//! response). The whole injection battery is consulted before the response
//! battery: a `__name__` read renders as a plain string literal that only
//! the injection context can disambiguate.

use std::sync::LazyLock;

use regex::Regex;
use strum::IntoEnumIterator;

/// Which traversal variant a `(payload, response)` pair belongs to.
///
/// Declaration order is classification order. `Module` carries no patterns:
/// module walks are entered by injection context (a `__globals__` or
/// `__dict__` pivot), never dispatched from a response. `CodeObjectField`
/// and `Failed` are constructed, not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, serde::Serialize)]
pub enum WalkerKind {
    /// `<class …>` responses.
    Class,
    /// `<function … at 0x…>` responses.
    Function,
    /// `<code object … at 0x…, file …, line …>` responses.
    CodeObject,
    /// Entered by injection context; never pattern-dispatched.
    Module,
    /// `<attribute …>` responses, and the literal fallback.
    Attribute,
    /// `<slot wrapper …>` responses.
    SlotWrapper,
    /// Payloads ending in a `__name__`-family read.
    Name,
    /// Payloads ending in a `__doc__` read.
    DocString,
    /// Constructed by field readers; never dispatched.
    CodeObjectField,
    /// Synthetic; never dispatched.
    Failed,
}

static CLASS_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<class .+>").expect("class pattern is valid"));
static FUNCTION_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<function .+ at 0x[0-9a-fA-F]+>").expect("function pattern is valid"));
static CODE_OBJECT_RESPONSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<code object .+ at 0x[0-9a-fA-F]+, file .+, line .+>").expect("code object pattern is valid")
});
static ATTRIBUTE_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<attribute .+>").expect("attribute pattern is valid"));
static SLOT_WRAPPER_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<slot wrapper .+>").expect("slot wrapper pattern is valid"));

// The bracketed forms ([__name__], [__doc__]) are the mapping-key reads the
// module walker sends; the bare forms are attribute reads. Both may carry a
// conversion flag.
static NAME_INJECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(__(qual)?name__|__module__)\]?(!(s|a|r))?$").expect("name injection pattern is valid")
});
static DOC_INJECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__doc__\]?(!(s|a|r))?$").expect("doc injection pattern is valid"));

/// `<module …>` probe used by the module walker's key loop; not part of the
/// dispatch registry.
pub(crate) static MODULE_RESPONSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<module .+>").expect("module pattern is valid"));

/// Extracts the quoted module name from a `<module 'name' …>` response.
pub(crate) static MODULE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<module '([^']+)'").expect("module name pattern is valid"));

/// Top-level key extraction from a repr-rendered mapping.
///
/// Deliberately naive (`'(\w+)':`): keys containing punctuation, or values
/// whose reprs contain a quoted-and-colon shape, can mis-parse. This is the
/// mandated behaviour.
pub(crate) static DICT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(\w+)':").expect("dict key pattern is valid"));

impl WalkerKind {
    /// The pattern matched against the payload text, if this variant has one.
    #[must_use]
    pub fn injection_pattern(self) -> Option<&'static Regex> {
        match self {
            Self::Name => Some(&NAME_INJECTION_RE),
            Self::DocString => Some(&DOC_INJECTION_RE),
            _ => None,
        }
    }

    /// The pattern matched against the response text, if this variant has one.
    #[must_use]
    pub fn response_pattern(self) -> Option<&'static Regex> {
        match self {
            Self::Class => Some(&CLASS_RESPONSE_RE),
            Self::Function => Some(&FUNCTION_RESPONSE_RE),
            Self::CodeObject => Some(&CODE_OBJECT_RESPONSE_RE),
            Self::Attribute => Some(&ATTRIBUTE_RESPONSE_RE),
            Self::SlotWrapper => Some(&SLOT_WRAPPER_RESPONSE_RE),
            _ => None,
        }
    }
}

/// Picks the walker variant for a payload/response pair.
///
/// Injection patterns take precedence over response patterns; within each
/// battery, variants are consulted in declaration order. Returns `None` when
/// nothing matches; the caller decides the fallback (most sites demote to
/// `Attribute`; the engine seed fails).
#[must_use]
pub fn classify(payload: &str, response: &str) -> Option<WalkerKind> {
    for kind in WalkerKind::iter() {
        if let Some(pattern) = kind.injection_pattern() {
            if pattern.is_match(payload) {
                return Some(kind);
            }
        }
    }
    for kind in WalkerKind::iter() {
        if let Some(pattern) = kind.response_pattern() {
            if pattern.is_match(response) {
                return Some(kind);
            }
        }
    }
    None
}

/// Parses the top-level keys out of a repr-rendered mapping.
pub(crate) fn parse_dict_top_level_keys(rendered: &str) -> Vec<String> {
    DICT_KEY_RE
        .captures_iter(rendered)
        .map(|captures| captures[1].to_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn responses_dispatch_by_shape() {
        assert_eq!(classify("0.__class__", "<class 'Foo'>"), Some(WalkerKind::Class));
        assert_eq!(
            classify("0.__class__.run", "<function Foo.run at 0x7f3a10>"),
            Some(WalkerKind::Function)
        );
        assert_eq!(
            classify(
                "0.__class__.run.__code__",
                "<code object run at 0x7f3a20, file \"app.py\", line 10>"
            ),
            Some(WalkerKind::CodeObject)
        );
        assert_eq!(
            classify("0.__class__.x", "<attribute 'x' of 'Foo' objects>"),
            Some(WalkerKind::Attribute)
        );
        assert_eq!(
            classify("0.__class__.__init__", "<slot wrapper '__init__' of 'object' objects>"),
            Some(WalkerKind::SlotWrapper)
        );
    }

    /// A `__name__` read renders as a bare string literal; only the payload
    /// tail identifies it. The injection battery must win even when the
    /// response would also match something.
    #[test]
    fn injection_context_takes_precedence() {
        assert_eq!(classify("0.__class__.__name__!r", "'Foo'"), Some(WalkerKind::Name));
        assert_eq!(
            classify("0.__class__.run.__qualname__!r", "'Foo.run'"),
            Some(WalkerKind::Name)
        );
        assert_eq!(classify("0.__module__!r", "'app'"), Some(WalkerKind::Name));
        assert_eq!(classify("0.__class__.__doc__!r", "'docs'"), Some(WalkerKind::DocString));
        assert_eq!(
            classify("0.__class__.__name__!r", "<class 'str'>"),
            Some(WalkerKind::Name)
        );
    }

    #[test]
    fn bracketed_key_reads_classify_like_attribute_reads() {
        assert_eq!(
            classify("0.__init__.__globals__[__name__]!r", "'app'"),
            Some(WalkerKind::Name)
        );
        assert_eq!(
            classify("0.__init__.__globals__[__doc__]!r", "None"),
            Some(WalkerKind::DocString)
        );
    }

    #[test]
    fn unmatched_pairs_are_unclassified() {
        assert_eq!(classify("0.__class__.x!r", "42"), None);
        assert_eq!(classify("0.__class__.x!r", "'just text'"), None);
    }

    #[test]
    fn module_is_never_pattern_dispatched() {
        assert_eq!(
            classify("0.__globals__[helper]!r", "<module 'helper' from '/app/helper.py'>"),
            None
        );
        assert!(MODULE_RESPONSE_RE.is_match("<module 'helper' from '/app/helper.py'>"));
    }

    #[test]
    fn module_name_extraction() {
        let caps = MODULE_NAME_RE.captures("<module 'os' from '/usr/lib/python3.7/os.py'>").unwrap();
        assert_eq!(&caps[1], "os");
    }

    #[test]
    fn dict_keys_parse_from_rendered_mappings() {
        let rendered = "{'a': 1, 'run': <function Foo.run at 0x1>, '__doc__': None}";
        assert_eq!(parse_dict_top_level_keys(rendered), vec!["a", "run", "__doc__"]);
    }

    /// The mandated naive key regex also fires on quoted-colon shapes inside
    /// values; the behaviour is preserved, not fixed.
    #[test]
    fn dict_key_parsing_stays_naive() {
        let rendered = "{'a': \"text with 'inner': colon\"}";
        assert_eq!(parse_dict_top_level_keys(rendered), vec!["a", "inner"]);
    }
}
