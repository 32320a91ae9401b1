//! Recovery of functions: qualified name, docstring, code object, and the
//! reconstructed definition.

use tracing::debug;

use crate::{
    classify::WalkerKind,
    defaults::UNKNOWN_BODY_PLACEHOLDER,
    engine::Scope,
    event::{FunctionEvent, WalkEvent},
    inj::Injection,
    walkers::{
        code_object::CodeObjectWalker,
        doc_string::DocStringWalker,
        name::NameWalker,
    },
};

/// Walker that reconstructs a function definition.
///
/// Order: `__qualname__` (checked against, then added to, the function
/// blacklist), `__doc__`, `.__code__`. The signature comes from the
/// recovered code object's structure; when that degrades, the fallback
/// `(*args, **kwargs)` is emitted with a comment. A decompiler failure
/// leaves the body as the unknown-body placeholder.
pub(crate) struct FunctionWalker {
    scope: Scope,
    inj: Injection,
    qualname: Option<String>,
    docstring: Option<String>,
    src_code: Option<String>,
    state: FunctionState,
}

enum FunctionState {
    Qualname,
    QualnameChild(NameWalker),
    Doc,
    DocChild(DocStringWalker),
    Code,
    CodeChild(Box<CodeObjectWalker>),
    YieldSelf,
    Done,
}

/// What a function walk recovered.
pub(crate) struct FunctionOutcome {
    /// The function's qualified name, when resolvable.
    pub qualname: Option<String>,
    /// The reconstructed definition, when the code object was recovered.
    pub src_code: Option<String>,
    /// The injection that produced the function; class walkers pivot
    /// through it to reach `__globals__`.
    pub inj: Injection,
}

impl FunctionWalker {
    pub(crate) fn new(scope: Scope, inj: Injection, _raw: String) -> Self {
        Self {
            scope,
            inj,
            qualname: None,
            docstring: None,
            src_code: None,
            state: FunctionState::Qualname,
        }
    }

    pub(crate) fn finish(self) -> FunctionOutcome {
        FunctionOutcome {
            qualname: self.qualname,
            src_code: self.src_code,
            inj: self.inj,
        }
    }

    fn synthesize(&self, code: Option<&crate::code_object::CodeObject>, body: Option<&str>) -> Option<String> {
        let code = code?;
        let (signature, degraded) = match code.parameter_list() {
            Some(signature) => (signature, false),
            None => ("(*args, **kwargs)".to_owned(), true),
        };

        let mut src = format!("def {}{signature}:", code.co_name);
        if degraded {
            src.push_str("  # fallback signature; formal parameters not recovered");
        }
        src.push('\n');
        if let Some(doc) = self.docstring.as_deref() {
            if !doc.is_empty() {
                src.push_str(&format!("    \"\"\"{doc}\"\"\"\n"));
            }
        }
        let body = body.unwrap_or(UNKNOWN_BODY_PLACEHOLDER);
        for line in body.lines() {
            if line.is_empty() {
                src.push('\n');
            } else {
                src.push_str(&format!("    {line}\n"));
            }
        }
        Some(src)
    }
}

impl Iterator for FunctionWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            match std::mem::replace(&mut self.state, FunctionState::Done) {
                FunctionState::Qualname => {
                    let q_inj = self.inj.attr("__qualname__");
                    match self.scope.send_repr(&q_inj) {
                        Some(raw) => {
                            self.state = FunctionState::QualnameChild(NameWalker::new(q_inj, raw));
                        }
                        None => {
                            self.state = FunctionState::Doc;
                            return Some(WalkEvent::failure(format!(
                                "Unable to read qualified name of function with injection {}",
                                q_inj.repr_payload()
                            )));
                        }
                    }
                }
                FunctionState::QualnameChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = FunctionState::QualnameChild(child);
                        return Some(event);
                    }
                    let outcome = child.finish();
                    if let Some(qualname) = outcome.value {
                        let mut state = self.scope.state.borrow_mut();
                        if state.function_blacklist.contains(&qualname) {
                            debug!(%qualname, "function already walked; aborting");
                            return None;
                        }
                        state.function_blacklist.insert(qualname.clone());
                        self.qualname = Some(qualname);
                    }
                    self.state = FunctionState::Doc;
                }
                FunctionState::Doc => {
                    let d_inj = self.inj.attr("__doc__");
                    match self.scope.send_repr(&d_inj) {
                        Some(raw) => {
                            self.state = FunctionState::DocChild(DocStringWalker::new(d_inj, raw));
                        }
                        None => {
                            self.state = FunctionState::Code;
                            return Some(WalkEvent::failure(format!(
                                "Unable to read docstring of function with injection {}",
                                d_inj.repr_payload()
                            )));
                        }
                    }
                }
                FunctionState::DocChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = FunctionState::DocChild(child);
                        return Some(event);
                    }
                    self.docstring = child.finish().value;
                    self.state = FunctionState::Code;
                }
                FunctionState::Code => {
                    let c_inj = self.inj.attr("__code__");
                    let Some(raw) = self.scope.send(&c_inj) else {
                        self.state = FunctionState::YieldSelf;
                        return Some(WalkEvent::failure(format!(
                            "Unable to read code object of function with injection {c_inj}"
                        )));
                    };
                    let is_code = WalkerKind::CodeObject
                        .response_pattern()
                        .is_some_and(|pattern| pattern.is_match(&raw));
                    if !is_code {
                        self.state = FunctionState::YieldSelf;
                        return Some(WalkEvent::failure(format!(
                            "Expected a code object response from injection {c_inj}; got {raw}"
                        )));
                    }
                    self.state = FunctionState::CodeChild(Box::new(CodeObjectWalker::new(
                        self.scope.clone(),
                        c_inj,
                        raw,
                    )));
                }
                FunctionState::CodeChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = FunctionState::CodeChild(child);
                        return Some(event);
                    }
                    let outcome = child.finish();
                    self.src_code = self.synthesize(outcome.code.as_ref(), outcome.src_code.as_deref());
                    self.state = FunctionState::YieldSelf;
                }
                FunctionState::YieldSelf => {
                    self.state = FunctionState::Done;
                    return Some(WalkEvent::Function(FunctionEvent {
                        inj: self.inj.to_string(),
                        qualname: self.qualname.clone(),
                        src_code: self.src_code.clone(),
                    }));
                }
                FunctionState::Done => return None,
            }
        }
    }
}
