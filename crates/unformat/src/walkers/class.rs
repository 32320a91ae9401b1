//! Recovery of classes: name, bases, dict, synthesized source, and the
//! module escape through a method's `__globals__`.

use tracing::debug;

use crate::{
    classify::{classify, parse_dict_top_level_keys},
    engine::Scope,
    event::{ClassEvent, WalkEvent},
    inj::Injection,
    walkers::{
        AttributeOutcome, FunctionOutcome, WalkOutcome, Walker,
        attribute::AttributeWalker,
        doc_string::DocStringWalker,
        module::ModuleWalker,
        name::NameWalker,
    },
};

/// Dict keys that are read by dedicated protocol steps and must not be
/// traversed again from the key loop.
const PROTOCOL_KEYS: &[&str] = &["__name__", "__doc__", "__bases__", "__dict__"];

/// Walker that recovers a class, in strict order: name, docstring, bases,
/// dict, synthesized source, module escape.
///
/// A resolvable name is added to the class blacklist; a name already
/// present there stops the walk before any children are spawned. Base
/// classes are recursed into unless blacklisted; recursion hands the child
/// the already-resolved name so the `__name__` injection is never sent
/// twice for the same class.
pub(crate) struct ClassWalker {
    scope: Scope,
    inj: Injection,
    known_name: Option<String>,
    name: Option<String>,
    docstring: Option<String>,
    bases: Vec<String>,
    attributes: Vec<AttributeOutcome>,
    functions: Vec<FunctionOutcome>,
    src_code: Option<String>,
    state: ClassState,
}

enum ClassState {
    Name,
    NameChild(NameWalker),
    Doc,
    DocChild(DocStringWalker),
    BasesProbe,
    BaseElem(usize),
    BaseName {
        index: usize,
        raw_base: String,
        child: NameWalker,
    },
    BaseRecurse {
        index: usize,
        child: Box<ClassWalker>,
    },
    Dict,
    DictKey {
        keys: Vec<String>,
        pos: usize,
    },
    DictChild {
        keys: Vec<String>,
        pos: usize,
        child: Box<Walker>,
    },
    Synthesize,
    Globals,
    GlobalsChild(Box<Walker>),
    Done,
}

/// What a class walk recovered.
pub(crate) struct ClassOutcome {
    /// The recovered class name, when resolvable.
    pub name: Option<String>,
    /// The synthesized class source.
    pub src_code: Option<String>,
}

impl ClassWalker {
    pub(crate) fn new(scope: Scope, inj: Injection, _raw: String) -> Self {
        Self {
            scope,
            inj,
            known_name: None,
            name: None,
            docstring: None,
            bases: Vec::new(),
            attributes: Vec::new(),
            functions: Vec::new(),
            src_code: None,
            state: ClassState::Name,
        }
    }

    /// Builds a walker whose name was already resolved by the parent (base
    /// recursion), so the name read is not repeated.
    pub(crate) fn with_known_name(scope: Scope, inj: Injection, raw: String, name: String) -> Self {
        let mut walker = Self::new(scope, inj, raw);
        walker.known_name = Some(name);
        walker
    }

    pub(crate) fn finish(self) -> ClassOutcome {
        ClassOutcome {
            name: self.name,
            src_code: self.src_code,
        }
    }

    fn synthesize(&self) -> String {
        let name = self.name.as_deref().unwrap_or("<unknown_class>");
        let mut src = format!("class {name}({}):\n", self.bases.join(", "));

        let mut body: Vec<String> = Vec::new();
        if let Some(doc) = self.docstring.as_deref() {
            if !doc.is_empty() {
                body.push(format!("    \"\"\"{doc}\"\"\""));
            }
        }
        for attribute in &self.attributes {
            if let Some(line) = attribute.src_code.as_deref() {
                body.push(format!("    {line}"));
            }
        }
        for function in &self.functions {
            if let Some(func_src) = function.src_code.as_deref() {
                let mut block = String::new();
                for line in func_src.lines() {
                    if line.is_empty() {
                        block.push('\n');
                    } else {
                        block.push_str(&format!("    {line}\n"));
                    }
                }
                body.push(block.trim_end_matches('\n').to_owned());
            }
        }

        if body.is_empty() {
            src.push_str("    pass");
        } else {
            src.push_str(&body.join("\n"));
        }
        src
    }
}

impl Iterator for ClassWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            match std::mem::replace(&mut self.state, ClassState::Done) {
                ClassState::Name => {
                    if let Some(known) = self.known_name.take() {
                        self.scope.state.borrow_mut().class_blacklist.insert(known.clone());
                        self.name = Some(known);
                        self.state = ClassState::Doc;
                        continue;
                    }
                    let n_inj = self.inj.attr("__name__");
                    match self.scope.send_repr(&n_inj) {
                        Some(raw) => {
                            self.state = ClassState::NameChild(NameWalker::new(n_inj, raw));
                        }
                        None => {
                            self.state = ClassState::Doc;
                            return Some(WalkEvent::failure(format!(
                                "Unable to read name of class with injection {}",
                                n_inj.repr_payload()
                            )));
                        }
                    }
                }
                ClassState::NameChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = ClassState::NameChild(child);
                        return Some(event);
                    }
                    if let Some(name) = child.finish().value {
                        let mut state = self.scope.state.borrow_mut();
                        if state.class_blacklist.contains(&name) {
                            debug!(%name, "class already walked or blacklisted; aborting");
                            return None;
                        }
                        state.class_blacklist.insert(name.clone());
                        self.name = Some(name);
                    }
                    self.state = ClassState::Doc;
                }
                ClassState::Doc => {
                    let d_inj = self.inj.attr("__doc__");
                    match self.scope.send_repr(&d_inj) {
                        Some(raw) => {
                            self.state = ClassState::DocChild(DocStringWalker::new(d_inj, raw));
                        }
                        None => {
                            self.state = ClassState::BasesProbe;
                            return Some(WalkEvent::failure(format!(
                                "Unable to read docstring of class with injection {}",
                                d_inj.repr_payload()
                            )));
                        }
                    }
                }
                ClassState::DocChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = ClassState::DocChild(child);
                        return Some(event);
                    }
                    self.docstring = child.finish().value;
                    self.state = ClassState::BasesProbe;
                }
                ClassState::BasesProbe => {
                    let b_inj = self.inj.attr("__bases__");
                    match self.scope.send(&b_inj) {
                        Some(_) => {
                            self.state = ClassState::BaseElem(0);
                        }
                        None => {
                            self.state = ClassState::Dict;
                            return Some(WalkEvent::failure(format!(
                                "Unable to read __bases__ of class with injection {b_inj}"
                            )));
                        }
                    }
                }
                ClassState::BaseElem(index) => {
                    let e_inj = self.inj.attr("__bases__").index(index);
                    let Some(raw_base) = self.scope.send(&e_inj) else {
                        self.state = ClassState::Dict;
                        continue;
                    };
                    if classify(e_inj.payload(), &raw_base) != Some(crate::classify::WalkerKind::Class) {
                        self.state = ClassState::Dict;
                        return Some(WalkEvent::failure(format!(
                            "Expected a class response when reading base {index} of {}; got {raw_base}",
                            self.inj
                        )));
                    }
                    let bn_inj = e_inj.attr("__name__");
                    match self.scope.send_repr(&bn_inj) {
                        Some(raw_name) => {
                            self.state = ClassState::BaseName {
                                index,
                                raw_base,
                                child: NameWalker::new(bn_inj, raw_name),
                            };
                        }
                        None => {
                            self.state = ClassState::BaseElem(index + 1);
                            return Some(WalkEvent::failure(format!(
                                "Unable to read name of base class with injection {}",
                                bn_inj.repr_payload()
                            )));
                        }
                    }
                }
                ClassState::BaseName {
                    index,
                    raw_base,
                    mut child,
                } => {
                    if let Some(event) = child.next() {
                        self.state = ClassState::BaseName { index, raw_base, child };
                        return Some(event);
                    }
                    match child.finish().value {
                        Some(base_name) => {
                            self.bases.push(base_name.clone());
                            let blacklisted =
                                self.scope.state.borrow().class_blacklist.contains(&base_name);
                            if blacklisted {
                                debug!(%base_name, "base recorded but not descended");
                                self.state = ClassState::BaseElem(index + 1);
                            } else {
                                let e_inj = self.inj.attr("__bases__").index(index);
                                let grandchild = Self::with_known_name(
                                    self.scope.clone(),
                                    e_inj,
                                    raw_base,
                                    base_name,
                                );
                                self.state = ClassState::BaseRecurse {
                                    index,
                                    child: Box::new(grandchild),
                                };
                            }
                        }
                        None => {
                            self.state = ClassState::BaseElem(index + 1);
                        }
                    }
                }
                ClassState::BaseRecurse { index, mut child } => {
                    if let Some(event) = child.next() {
                        self.state = ClassState::BaseRecurse { index, child };
                        return Some(event);
                    }
                    let _ = child.finish();
                    self.state = ClassState::BaseElem(index + 1);
                }
                ClassState::Dict => {
                    let d_inj = self.inj.attr("__dict__");
                    let Some(rendered) = self.scope.send(&d_inj) else {
                        self.state = ClassState::Synthesize;
                        return Some(WalkEvent::failure(format!(
                            "Unable to read __dict__ of class with injection {d_inj}"
                        )));
                    };
                    let keys: Vec<String> = {
                        let state = self.scope.state.borrow();
                        parse_dict_top_level_keys(&rendered)
                            .into_iter()
                            .filter(|key| !PROTOCOL_KEYS.contains(&key.as_str()))
                            .filter(|key| !state.attribute_blacklist.contains(key))
                            .collect()
                    };
                    self.state = ClassState::DictKey { keys, pos: 0 };
                }
                ClassState::DictKey { keys, pos } => {
                    if pos >= keys.len() {
                        self.state = ClassState::Synthesize;
                        continue;
                    }
                    let k_inj = self.inj.attr(&keys[pos]);
                    let Some(raw) = self.scope.send_repr(&k_inj) else {
                        self.state = ClassState::DictKey { keys, pos: pos + 1 };
                        return Some(WalkEvent::failure(format!(
                            "Unable to recover response from injection string {}",
                            k_inj.repr_payload()
                        )));
                    };
                    let child = classify(&k_inj.repr_payload(), &raw)
                        .and_then(|kind| Walker::from_classified(&self.scope, kind, k_inj.clone(), raw.clone()))
                        .unwrap_or_else(|| Walker::Attribute(AttributeWalker::new(k_inj, raw)));
                    self.state = ClassState::DictChild {
                        keys,
                        pos,
                        child: Box::new(child),
                    };
                }
                ClassState::DictChild { keys, pos, mut child } => {
                    if let Some(event) = child.next() {
                        self.state = ClassState::DictChild { keys, pos, child };
                        return Some(event);
                    }
                    match child.finish() {
                        WalkOutcome::Function(function) => self.functions.push(function),
                        WalkOutcome::Attribute(attribute) => self.attributes.push(attribute),
                        _ => {}
                    }
                    self.state = ClassState::DictKey { keys, pos: pos + 1 };
                }
                ClassState::Synthesize => {
                    let src = self.synthesize();
                    self.src_code = Some(src);
                    self.state = ClassState::Globals;
                    return Some(WalkEvent::Class(ClassEvent {
                        inj: self.inj.to_string(),
                        name: self.name.clone(),
                        src_code: self.src_code.clone(),
                    }));
                }
                ClassState::Globals => {
                    let Some(function) = self.functions.first() else {
                        return None;
                    };
                    let g_inj = function.inj.attr("__globals__");
                    let Some(rendered) = self.scope.send(&g_inj) else {
                        return Some(WalkEvent::failure(format!(
                            "Unable to read __globals__ of function with injection {g_inj}"
                        )));
                    };
                    self.state = ClassState::GlobalsChild(Box::new(Walker::Module(Box::new(
                        ModuleWalker::new(self.scope.clone(), g_inj, rendered),
                    ))));
                }
                ClassState::GlobalsChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = ClassState::GlobalsChild(child);
                        return Some(event);
                    }
                    let _ = child.finish();
                    return None;
                }
                ClassState::Done => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::test_support::{scripted_scope, scripted_scope_logged};

    fn simple_class_table() -> Vec<(&'static str, &'static str)> {
        vec![
            ("0.__class__.__name__!r", "'X'"),
            ("0.__class__.__doc__!r", "'docs for X'"),
            ("0.__class__.__bases__", "(<class 'object'>,)"),
            ("0.__class__.__bases__[0]", "<class 'object'>"),
            ("0.__class__.__bases__[0].__name__!r", "'object'"),
            ("0.__class__.__dict__", "{'a': 1, '__doc__': 'docs for X'}"),
            ("0.__class__.a!r", "1"),
        ]
    }

    fn drive(table: &[(&'static str, &'static str)]) -> (ClassWalker, Vec<WalkEvent>) {
        let scope = scripted_scope(table);
        let mut walker = ClassWalker::new(
            scope,
            Injection::from_path("0.__class__"),
            "<class 'X'>".to_owned(),
        );
        let events: Vec<_> = walker.by_ref().collect();
        (walker, events)
    }

    #[test]
    fn walks_name_doc_bases_dict_and_synthesizes() {
        let (walker, events) = drive(&simple_class_table());
        assert!(events.iter().all(|event| !event.is_failure()), "unexpected failure");

        let outcome = walker.finish();
        assert_eq!(outcome.name.as_deref(), Some("X"));
        let src = outcome.src_code.unwrap();
        assert!(src.starts_with("class X(object):\n"), "got source:\n{src}");
        assert!(src.contains("\"\"\"docs for X\"\"\""));
        assert!(src.contains("    a = 1"));
    }

    /// The `object` base is recorded in the inheritance list but never
    /// descended: it is blacklisted by default.
    #[test]
    fn blacklisted_base_is_recorded_not_descended() {
        let (scope, sent) = scripted_scope_logged(&simple_class_table());
        let mut walker = ClassWalker::new(
            scope,
            Injection::from_path("0.__class__"),
            "<class 'X'>".to_owned(),
        );
        let _ = walker.by_ref().count();

        let sent = sent.borrow();
        assert!(sent.iter().any(|p| p == "0.__class__.__bases__[0].__name__!r"));
        assert!(!sent.iter().any(|p| p.starts_with("0.__class__.__bases__[0].__doc__")));
    }

    /// Base probing stops at the first missing index; the base list stays
    /// empty when `__bases__[0]` never answers.
    #[test]
    fn missing_first_base_empties_the_inheritance_list() {
        let table = vec![
            ("0.__class__.__name__!r", "'Y'"),
            ("0.__class__.__doc__!r", "None"),
            ("0.__class__.__bases__", "()"),
            ("0.__class__.__dict__", "{}"),
        ];
        let (walker, events) = drive(&table);
        assert!(events.iter().all(|event| !event.is_failure()));

        let src = walker.finish().src_code.unwrap();
        assert!(src.starts_with("class Y():\n"), "got source:\n{src}");
        assert!(src.contains("    pass"));
    }

    /// Dict keys already covered by protocol steps are skipped, as are
    /// blacklisted attributes.
    #[test]
    fn dict_loop_skips_protocol_keys_and_blacklisted_attributes() {
        let table = vec![
            ("0.__class__.__name__!r", "'Z'"),
            ("0.__class__.__doc__!r", "None"),
            ("0.__class__.__bases__", "()"),
            (
                "0.__class__.__dict__",
                "{'__name__': 'Z', '__weakref__': None, 'b': 2}",
            ),
            ("0.__class__.b!r", "2"),
        ];
        let (scope, sent) = scripted_scope_logged(&table);
        let mut walker = ClassWalker::new(
            scope,
            Injection::from_path("0.__class__"),
            "<class 'Z'>".to_owned(),
        );
        let _ = walker.by_ref().count();

        let sent = sent.borrow();
        assert!(sent.iter().any(|p| p == "0.__class__.b!r"));
        assert!(!sent.iter().any(|p| p == "0.__class__.__weakref__!r"));
        // __name__ was sent once by the protocol step, never by the key loop.
        assert_eq!(sent.iter().filter(|p| p.contains("__name__")).count(), 1);
    }

    /// A class whose name is already blacklisted yields its name events
    /// and no children.
    #[test]
    fn blacklisted_class_aborts_before_children() {
        let (scope, sent) = scripted_scope_logged(&simple_class_table());
        scope.state.borrow_mut().class_blacklist.insert("X".to_owned());
        let mut walker = ClassWalker::new(
            scope,
            Injection::from_path("0.__class__"),
            "<class 'X'>".to_owned(),
        );
        let events: Vec<_> = walker.by_ref().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(sent.borrow().as_slice(), ["0.__class__.__name__!r"]);
    }
}
