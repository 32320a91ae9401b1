//! The decompiler seam.
//!
//! Decompilation is consumed as a black box: `(version, code object) →
//! source text`. The [`Decompiler`] trait keeps the walker tree independent
//! of any particular backend; the shipped [`RawBytecodeDecompiler`] renders
//! the recovered fields as pseudo-source rather than reconstructing control
//! flow, which is the honest degradation when no real decompilation engine
//! is wired in.

use std::{fmt, str::FromStr};

use crate::code_object::CodeObject;

/// Bytecode version tags a backend can be asked about, mirroring the
/// release tags of the target runtime.
pub const KNOWN_BYTECODE_VERSIONS: &[&str] = &[
    "1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "2.0", "2.1", "2.2", "2.3", "2.4", "2.5", "2.6",
    "2.7", "3.0", "3.1", "3.2", "3.3", "3.4", "3.5", "3.6", "3.7", "3.8", "3.9", "3.10",
];

/// A `major.minor` bytecode dialect tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BytecodeVersion {
    /// Major release number.
    pub major: u8,
    /// Minor release number.
    pub minor: u8,
}

/// A malformed bytecode version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionParseError {
    text: String,
}

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid bytecode version {:?}; expected major.minor", self.text)
    }
}

impl std::error::Error for VersionParseError {}

impl FromStr for BytecodeVersion {
    type Err = VersionParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let error = || VersionParseError { text: text.to_owned() };
        let (major, minor) = text.split_once('.').ok_or_else(error)?;
        Ok(Self {
            major: major.parse().map_err(|_| error())?,
            minor: minor.parse().map_err(|_| error())?,
        })
    }
}

impl fmt::Display for BytecodeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A decompilation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecompileError {
    /// The backend does not speak this bytecode dialect.
    UnsupportedVersion(BytecodeVersion),
    /// The backend failed on this particular code object.
    Backend(String),
}

impl fmt::Display for DecompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion(version) => {
                write!(f, "bytecode version {version} is not supported by the decompiler")
            }
            Self::Backend(message) => write!(f, "decompilation failed: {message}"),
        }
    }
}

impl std::error::Error for DecompileError {}

/// A bytecode decompilation backend.
///
/// Implementations are pure: same version and code object in, same source
/// text out. The walker tree never inspects the output beyond the
/// normalization pass.
pub trait Decompiler {
    /// Whether this backend speaks the given bytecode dialect.
    fn supports(&self, version: BytecodeVersion) -> bool;

    /// Produces source text for a recovered code object.
    fn decompile(&self, version: BytecodeVersion, code: &CodeObject) -> Result<String, DecompileError>;
}

/// The fallback backend: renders the recovered fields as pseudo-source.
///
/// No control-flow reconstruction is attempted; the bytecode, constants and
/// name tables are emitted as assignments so nothing recovered is lost.
/// Real decompilation engines plug in through the [`Decompiler`] trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytecodeDecompiler;

impl Decompiler for RawBytecodeDecompiler {
    fn supports(&self, version: BytecodeVersion) -> bool {
        KNOWN_BYTECODE_VERSIONS.contains(&version.to_string().as_str())
    }

    fn decompile(&self, version: BytecodeVersion, code: &CodeObject) -> Result<String, DecompileError> {
        if !self.supports(version) {
            return Err(DecompileError::UnsupportedVersion(version));
        }

        let consts = code
            .co_consts
            .iter()
            .map(crate::code_object::Const::render)
            .collect::<Vec<_>>()
            .join(", ");
        let names = code
            .co_names
            .iter()
            .map(|name| format!("'{name}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = String::new();
        out.push_str(&format!("__bytecode__ = {}\n", render_bytes(&code.co_code)));
        out.push_str(&format!("__consts__ = ({consts})\n"));
        out.push_str(&format!("__names__ = ({names})\n"));
        Ok(out)
    }
}

fn render_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b'");
    for byte in bytes {
        out.push_str(&format!("\\x{byte:02x}"));
    }
    out.push('\'');
    out
}

/// Normalizes decompiler output: collapses triple newlines to double and
/// drops comment lines.
#[must_use]
pub fn normalize_decompiled(raw: &str) -> String {
    let collapsed = raw.replace("\n\n\n", "\n\n");
    let lines: Vec<&str> = collapsed
        .lines()
        .filter(|line| !line.trim_start().starts_with("# "))
        .collect();
    lines.join("\n")
}
