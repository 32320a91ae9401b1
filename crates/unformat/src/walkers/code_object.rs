//! Recovery of full code objects, one field at a time.

use ahash::AHashMap;
use tracing::debug;

use crate::{
    classify::WalkerKind,
    code_object::{CodeObject, Const},
    decompile::normalize_decompiled,
    engine::Scope,
    event::{CodeObjectEvent, CodeObjectFieldEvent, WalkEvent},
    inj::Injection,
    literal::{Literal, parse_literal},
    walkers::{
        WalkOutcome, Walker,
        code_object_field::{CodeObjectFieldOutcome, CodeObjectFieldWalker, FieldType, read_code_field},
    },
};

/// Drives a terminal field walker through the sum type: one event out, one
/// recovered value out.
fn drain_field_walker(reader: CodeObjectFieldWalker) -> (WalkEvent, CodeObjectFieldOutcome) {
    let mut walker = Walker::CodeObjectField(reader);
    let event = walker.next().expect("a field walker always yields its event");
    let WalkOutcome::CodeObjectField(outcome) = walker.finish() else {
        unreachable!("a field walker finishes as a field outcome");
    };
    (event, outcome)
}

/// Scalar fields read before the constants tuple, in protocol order.
const PRE_CONSTS_FIELDS: &[(&str, FieldType)] = &[
    ("co_argcount", FieldType::Int),
    ("co_kwonlyargcount", FieldType::Int),
    ("co_nlocals", FieldType::Int),
    ("co_stacksize", FieldType::Int),
    ("co_flags", FieldType::Int),
    ("co_code", FieldType::Bytes),
];

/// Scalar fields read after the constants tuple, in protocol order.
const POST_CONSTS_FIELDS: &[(&str, FieldType)] = &[
    ("co_names", FieldType::TextTuple),
    ("co_varnames", FieldType::TextTuple),
    ("co_filename", FieldType::Text),
    ("co_name", FieldType::Text),
    ("co_firstlineno", FieldType::Int),
    ("co_lnotab", FieldType::Bytes),
    ("co_freevars", FieldType::TextTuple),
    ("co_cellvars", FieldType::TextTuple),
];

/// Walker that reassembles a code object from its fifteen fields.
///
/// `co_consts` is probed index-by-index; an element that is itself a code
/// object spawns a nested walker whose recovered code joins the constants
/// tuple. Any field failure is fatal to the walk: a `Failure` event names
/// the field and the remaining fields are abandoned.
pub(crate) struct CodeObjectWalker {
    scope: Scope,
    inj: Injection,
    fields: AHashMap<&'static str, Literal>,
    consts: Vec<Const>,
    code: Option<CodeObject>,
    src_code: Option<String>,
    state: CodeState,
}

enum CodeState {
    PreField(usize),
    ConstElem(usize),
    ConstNested {
        index: usize,
        child: Box<CodeObjectWalker>,
    },
    ConstsSummary,
    PostField(usize),
    Assemble,
    YieldSelf,
    Done,
}

/// What a code-object walk recovered.
pub(crate) struct CodeObjectOutcome {
    /// The reassembled code object; absent when any field failed.
    pub code: Option<CodeObject>,
    /// Normalized decompiler output; absent when the backend failed.
    pub src_code: Option<String>,
}

impl CodeObjectWalker {
    pub(crate) fn new(scope: Scope, inj: Injection, _raw: String) -> Self {
        Self {
            scope,
            inj,
            fields: AHashMap::new(),
            consts: Vec::new(),
            code: None,
            src_code: None,
            state: CodeState::PreField(0),
        }
    }

    pub(crate) fn finish(self) -> CodeObjectOutcome {
        CodeObjectOutcome {
            code: self.code,
            src_code: self.src_code,
        }
    }

    /// Reads one scalar field, stores the value, and hands back the field
    /// walker's single event. Errors are already phrased for `Failure`.
    fn read_scalar(&mut self, field: &'static str, expected: FieldType) -> Result<WalkEvent, String> {
        let reader = read_code_field(&self.scope, &self.inj, field, expected)?;
        let (event, outcome) = drain_field_walker(reader);
        self.fields.insert(field, outcome.value);
        Ok(event)
    }

    /// Builds the final structure out of the recovered parts.
    fn assemble(&mut self) -> Result<CodeObject, String> {
        let mut take = |field: &'static str| {
            self.fields
                .remove(field)
                .ok_or_else(|| format!("Code object field {field} was never recovered"))
        };
        let typed = |field: &'static str, err: crate::literal::TypeFault| {
            format!("Expected {} when reading {field}; got {} instead", err.expected, err.found)
        };

        Ok(CodeObject {
            co_argcount: take("co_argcount")?.expect_int().map_err(|e| typed("co_argcount", e))?,
            co_kwonlyargcount: take("co_kwonlyargcount")?
                .expect_int()
                .map_err(|e| typed("co_kwonlyargcount", e))?,
            co_nlocals: take("co_nlocals")?.expect_int().map_err(|e| typed("co_nlocals", e))?,
            co_stacksize: take("co_stacksize")?.expect_int().map_err(|e| typed("co_stacksize", e))?,
            co_flags: take("co_flags")?.expect_int().map_err(|e| typed("co_flags", e))?,
            co_code: take("co_code")?.expect_bytes().map_err(|e| typed("co_code", e))?.to_vec(),
            co_consts: std::mem::take(&mut self.consts),
            co_names: take("co_names")?.expect_str_tuple().map_err(|e| typed("co_names", e))?,
            co_varnames: take("co_varnames")?
                .expect_str_tuple()
                .map_err(|e| typed("co_varnames", e))?,
            co_filename: take("co_filename")?
                .expect_str()
                .map_err(|e| typed("co_filename", e))?
                .to_owned(),
            co_name: take("co_name")?.expect_str().map_err(|e| typed("co_name", e))?.to_owned(),
            co_firstlineno: take("co_firstlineno")?
                .expect_int()
                .map_err(|e| typed("co_firstlineno", e))?,
            co_lnotab: take("co_lnotab")?.expect_bytes().map_err(|e| typed("co_lnotab", e))?.to_vec(),
            co_freevars: take("co_freevars")?
                .expect_str_tuple()
                .map_err(|e| typed("co_freevars", e))?,
            co_cellvars: take("co_cellvars")?
                .expect_str_tuple()
                .map_err(|e| typed("co_cellvars", e))?,
        })
    }

    fn fail(&mut self, message: String) -> Option<WalkEvent> {
        self.state = CodeState::Done;
        Some(WalkEvent::failure(message))
    }
}

impl Iterator for CodeObjectWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            match std::mem::replace(&mut self.state, CodeState::Done) {
                CodeState::PreField(index) => {
                    let (field, expected) = PRE_CONSTS_FIELDS[index];
                    match self.read_scalar(field, expected) {
                        Ok(event) => {
                            self.state = if index + 1 < PRE_CONSTS_FIELDS.len() {
                                CodeState::PreField(index + 1)
                            } else {
                                CodeState::ConstElem(0)
                            };
                            return Some(event);
                        }
                        Err(message) => return self.fail(message),
                    }
                }
                CodeState::ConstElem(index) => {
                    let elem_inj = self.inj.attr("co_consts").index(index);
                    let Some(raw) = self.scope.send_repr(&elem_inj) else {
                        if index == 0 {
                            return self.fail(
                                "Got an empty tuple for co_consts; this should never happen".to_owned(),
                            );
                        }
                        self.state = CodeState::ConstsSummary;
                        continue;
                    };

                    if let Ok(value) = parse_literal(&raw) {
                        let reader =
                            CodeObjectFieldWalker::new(elem_inj, format!("co_consts[{index}]"), value);
                        let (event, outcome) = drain_field_walker(reader);
                        self.consts.push(Const::Literal(outcome.value));
                        self.state = CodeState::ConstElem(index + 1);
                        return Some(event);
                    }

                    if WalkerKind::CodeObject
                        .response_pattern()
                        .is_some_and(|pattern| pattern.is_match(&raw))
                    {
                        debug!(index, "descending into nested code object constant");
                        let child = Self::new(self.scope.clone(), elem_inj, raw);
                        self.state = CodeState::ConstNested {
                            index,
                            child: Box::new(child),
                        };
                        continue;
                    }

                    return self.fail(format!("Unable to parse co_consts element {raw}"));
                }
                CodeState::ConstNested { index, mut child } => {
                    if let Some(event) = child.next() {
                        self.state = CodeState::ConstNested { index, child };
                        return Some(event);
                    }
                    let outcome = child.finish();
                    match outcome.code {
                        Some(code) => {
                            self.consts.push(Const::Code(Box::new(code)));
                            self.state = CodeState::ConstElem(index + 1);
                        }
                        None => {
                            return self.fail(format!(
                                "Unable to recover nested code object at co_consts[{index}] of {}",
                                self.inj
                            ));
                        }
                    }
                }
                CodeState::ConstsSummary => {
                    let rendered: Vec<String> = self.consts.iter().map(Const::render).collect();
                    let value_repr = if rendered.len() == 1 {
                        format!("({},)", rendered[0])
                    } else {
                        format!("({})", rendered.join(", "))
                    };
                    self.state = CodeState::PostField(0);
                    return Some(WalkEvent::CodeObjectField(CodeObjectFieldEvent {
                        inj: self.inj.attr("co_consts").to_string(),
                        field: "co_consts".to_owned(),
                        value_repr,
                    }));
                }
                CodeState::PostField(index) => {
                    let (field, expected) = POST_CONSTS_FIELDS[index];
                    match self.read_scalar(field, expected) {
                        Ok(event) => {
                            self.state = if index + 1 < POST_CONSTS_FIELDS.len() {
                                CodeState::PostField(index + 1)
                            } else {
                                CodeState::Assemble
                            };
                            return Some(event);
                        }
                        Err(message) => return self.fail(message),
                    }
                }
                CodeState::Assemble => {
                    let code = match self.assemble() {
                        Ok(code) => code,
                        Err(message) => return self.fail(message),
                    };
                    let decompiled = self.scope.decompiler.decompile(self.scope.version, &code);
                    self.code = Some(code);
                    self.state = CodeState::YieldSelf;
                    match decompiled {
                        Ok(text) => {
                            self.src_code = Some(normalize_decompiled(&text));
                        }
                        Err(err) => {
                            return Some(WalkEvent::failure(format!(
                                "Unable to decompile code object from injection {}: {err}",
                                self.inj
                            )));
                        }
                    }
                }
                CodeState::YieldSelf => {
                    self.state = CodeState::Done;
                    return Some(WalkEvent::CodeObject(CodeObjectEvent {
                        inj: self.inj.to_string(),
                        src_code: self.src_code.clone(),
                    }));
                }
                CodeState::Done => return None,
            }
        }
    }
}
