//! The reconstructed code object.
//!
//! A code object is rebuilt from fifteen individually-exfiltrated `co_*`
//! fields. It is the unit handed to the decompiler, and the structural
//! source for a function's formal parameter list.

use crate::literal::Literal;

/// Number of positional arguments is in `co_argcount`; these flag bits mark
/// `*args` / `**kwargs` parameters beyond it.
const CO_VARARGS: i64 = 0x04;
const CO_VARKEYWORDS: i64 = 0x08;

/// A single constant from `co_consts`: either a plain literal or a nested
/// code object recovered by a nested walk.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Const {
    /// A literal constant.
    Literal(Literal),
    /// A nested code object (e.g. a comprehension or inner function body).
    Code(Box<CodeObject>),
}

impl Const {
    /// Renders this constant the way it would appear inside a repr of the
    /// constants tuple.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Literal(value) => value.py_repr(),
            Self::Code(code) => format!("<code object {}>", code.co_name),
        }
    }
}

/// An opaque compiled-function body, reconstructed field by field.
///
/// Field names and meanings mirror the target runtime's code objects; the
/// decompiler consumes the structure whole.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CodeObject {
    /// Number of positional args, including those with default values.
    pub co_argcount: i64,
    /// Number of keyword-only args, not counting `**kwargs`.
    pub co_kwonlyargcount: i64,
    /// Number of local variables used by the function.
    pub co_nlocals: i64,
    /// VM stack space needed.
    pub co_stacksize: i64,
    /// Interpreter flags.
    pub co_flags: i64,
    /// Raw bytecode.
    pub co_code: Vec<u8>,
    /// Literals (and nested code objects) used by the bytecode.
    pub co_consts: Vec<Const>,
    /// Names used within the bytecode.
    pub co_names: Vec<String>,
    /// Names of arguments and local variables.
    pub co_varnames: Vec<String>,
    /// Filename the code was compiled from.
    pub co_filename: String,
    /// Function name.
    pub co_name: String,
    /// First line number of the function's source.
    pub co_firstlineno: i64,
    /// Bytecode-offset-to-line-number table.
    pub co_lnotab: Vec<u8>,
    /// Names of free variables.
    pub co_freevars: Vec<String>,
    /// Local variables referenced by nested functions.
    pub co_cellvars: Vec<String>,
}

impl CodeObject {
    /// Derives the formal parameter list, parenthesized, from the recovered
    /// fields: positional names from the head of `co_varnames`, keyword-only
    /// names after them, and `*args` / `**kwargs` from the flag bits.
    ///
    /// Returns `None` when the structure cannot support a faithful
    /// signature: free variables are present (the synthesized callable
    /// would need a closure) or the varnames table is shorter than the
    /// counts claim. Callers degrade to `(*args, **kwargs)`.
    #[must_use]
    pub fn parameter_list(&self) -> Option<String> {
        if !self.co_freevars.is_empty() {
            return None;
        }

        let argcount = usize::try_from(self.co_argcount).ok()?;
        let kwonly = usize::try_from(self.co_kwonlyargcount).ok()?;
        let has_varargs = self.co_flags & CO_VARARGS != 0;
        let has_varkeywords = self.co_flags & CO_VARKEYWORDS != 0;

        let needed = argcount + kwonly + usize::from(has_varargs) + usize::from(has_varkeywords);
        if self.co_varnames.len() < needed {
            return None;
        }

        let mut parts: Vec<String> = self.co_varnames[..argcount].to_vec();
        let mut star_slot = argcount + kwonly;
        if has_varargs {
            parts.push(format!("*{}", self.co_varnames[star_slot]));
            star_slot += 1;
        } else if kwonly > 0 {
            parts.push("*".to_owned());
        }
        parts.extend(self.co_varnames[argcount..argcount + kwonly].iter().cloned());
        if has_varkeywords {
            parts.push(format!("**{}", self.co_varnames[star_slot]));
        }

        Some(format!("({})", parts.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn code_with(
        argcount: i64,
        kwonly: i64,
        flags: i64,
        varnames: &[&str],
        freevars: &[&str],
    ) -> CodeObject {
        CodeObject {
            co_argcount: argcount,
            co_kwonlyargcount: kwonly,
            co_nlocals: varnames.len() as i64,
            co_stacksize: 2,
            co_flags: flags,
            co_code: vec![0x64, 0x00, 0x53, 0x00],
            co_consts: vec![Const::Literal(Literal::None)],
            co_names: vec![],
            co_varnames: varnames.iter().map(|s| (*s).to_owned()).collect(),
            co_filename: "app.py".to_owned(),
            co_name: "f".to_owned(),
            co_firstlineno: 1,
            co_lnotab: vec![],
            co_freevars: freevars.iter().map(|s| (*s).to_owned()).collect(),
            co_cellvars: vec![],
        }
    }

    #[test]
    fn plain_positional_signature() {
        let code = code_with(2, 0, 0, &["a", "b", "local"], &[]);
        assert_eq!(code.parameter_list().unwrap(), "(a, b)");
    }

    #[test]
    fn empty_signature() {
        let code = code_with(0, 0, 0, &[], &[]);
        assert_eq!(code.parameter_list().unwrap(), "()");
    }

    #[test]
    fn varargs_and_varkeywords() {
        let code = code_with(1, 0, CO_VARARGS | CO_VARKEYWORDS, &["a", "args", "kwargs"], &[]);
        assert_eq!(code.parameter_list().unwrap(), "(a, *args, **kwargs)");
    }

    #[test]
    fn keyword_only_without_varargs_gets_a_bare_star() {
        let code = code_with(1, 1, 0, &["a", "flag"], &[]);
        assert_eq!(code.parameter_list().unwrap(), "(a, *, flag)");
    }

    #[test]
    fn keyword_only_after_varargs() {
        let code = code_with(1, 1, CO_VARARGS, &["a", "flag", "rest"], &[]);
        assert_eq!(code.parameter_list().unwrap(), "(a, *rest, flag)");
    }

    /// Free variables mean the signature cannot be synthesized without a
    /// closure; the caller falls back to `(*args, **kwargs)`.
    #[test]
    fn free_variables_degrade() {
        let code = code_with(1, 0, 0, &["a"], &["captured"]);
        assert_eq!(code.parameter_list(), None);
    }

    #[test]
    fn short_varnames_table_degrades() {
        let code = code_with(3, 0, 0, &["a"], &[]);
        assert_eq!(code.parameter_list(), None);
    }
}
