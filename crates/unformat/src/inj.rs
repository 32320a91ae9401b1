//! The composable accessor path sent to the target's formatter.

use std::fmt;

/// A textual accessor expression understood by the target's formatter,
/// e.g. `0.__class__.__bases__[1].__name__`.
///
/// The leading numeric index selects the positional format argument; the
/// rest is a chain of attribute accesses (`.field`), sequence indexing
/// (`[3]`), and mapping keys (`[name]`, unquoted per the format
/// mini-language). Walkers only ever *extend* a path; the `!r` conversion
/// flag is appended when the payload is rendered, never stored, so a
/// conversion can never end up in the middle of a composed path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Injection(String);

impl Injection {
    /// The seed injection for a format argument index: `<d>.__class__`.
    #[must_use]
    pub fn seed(index: u32) -> Self {
        Self(format!("{index}.__class__"))
    }

    /// Builds a path from an already-rendered accessor expression.
    #[must_use]
    pub fn from_path(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Extends the path with an attribute access: `<self>.<name>`.
    #[must_use]
    pub fn attr(&self, name: &str) -> Self {
        Self(format!("{}.{name}", self.0))
    }

    /// Extends the path with a sequence index: `<self>[<i>]`.
    #[must_use]
    pub fn index(&self, i: usize) -> Self {
        Self(format!("{}[{i}]", self.0))
    }

    /// Extends the path with an unquoted mapping key: `<self>[<name>]`.
    #[must_use]
    pub fn key(&self, name: &str) -> Self {
        Self(format!("{}[{name}]", self.0))
    }

    /// The payload text requesting `repr`-style rendering: `<self>!r`.
    #[must_use]
    pub fn repr_payload(&self) -> String {
        format!("{}!r", self.0)
    }

    /// The payload text for plain rendering.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.0
    }

    /// The last path segment: the attribute name after the final `.`, or
    /// the key inside the final `[…]` when the path ends with an index.
    ///
    /// Used to name recovered attributes in synthesized source.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        let path = &self.0;
        if let Some(stripped) = path.strip_suffix(']') {
            if let Some(open) = stripped.rfind('[') {
                return &stripped[open + 1..];
            }
        }
        match path.rfind('.') {
            Some(dot) => &path[dot + 1..],
            None => path,
        }
    }
}

impl fmt::Display for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
