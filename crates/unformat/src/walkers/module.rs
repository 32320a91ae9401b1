//! Recovery of modules: walk a rendered `__dict__`, dispatch every key,
//! and record the result for the final dump.

use tracing::debug;

use crate::{
    classify::{MODULE_NAME_RE, MODULE_RESPONSE_RE, classify, parse_dict_top_level_keys},
    defaults::OMITTED_IMPORTS_PLACEHOLDER,
    engine::{ModuleRecord, Scope},
    event::{ModuleEvent, WalkEvent},
    inj::Injection,
    walkers::{
        WalkOutcome, Walker,
        attribute::AttributeWalker,
        doc_string::DocStringWalker,
        name::NameWalker,
    },
};

/// Walker over a module's rendered `__dict__`.
///
/// Entered with the injection already pointing at a mapping rendering
/// (a `__globals__` pivot or a nested `.__dict__`). Reads `[__name__]` and
/// `[__doc__]` first; a blacklisted name aborts with no children. Each
/// remaining key is injected, classified, and driven to completion; a
/// `<module …>` response pivots into a fresh module walk unless the
/// module's name is already blacklisted, checked against the response
/// text before any `__dict__` injection is spent on it.
pub(crate) struct ModuleWalker {
    scope: Scope,
    inj: Injection,
    raw: String,
    name: Option<String>,
    docstring: Option<String>,
    attributes: Vec<String>,
    functions: Vec<String>,
    classes: Vec<String>,
    state: ModuleState,
}

enum ModuleState {
    Name,
    NameChild(NameWalker),
    Doc,
    DocChild(DocStringWalker),
    Keys,
    Key {
        keys: Vec<String>,
        pos: usize,
    },
    KeyChild {
        keys: Vec<String>,
        pos: usize,
        child: Box<Walker>,
    },
    NestedModule {
        keys: Vec<String>,
        pos: usize,
        child: Box<Walker>,
    },
    Finish,
    Done,
}

/// What a module walk recovered.
pub(crate) struct ModuleOutcome {
    /// The module's name, when resolvable.
    pub name: Option<String>,
}

impl ModuleWalker {
    pub(crate) fn new(scope: Scope, inj: Injection, raw: String) -> Self {
        Self {
            scope,
            inj,
            raw,
            name: None,
            docstring: None,
            attributes: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
            state: ModuleState::Name,
        }
    }

    pub(crate) fn finish(self) -> ModuleOutcome {
        ModuleOutcome { name: self.name }
    }

    /// Synthesizes module source: docstring, the imports placeholder,
    /// attributes, functions, classes.
    fn synthesize(&self) -> String {
        let mut src = String::new();
        if let Some(doc) = self.docstring.as_deref() {
            if !doc.is_empty() {
                src.push_str(&format!("\"\"\"{doc}\"\"\"\n\n"));
            }
        }
        src.push_str(OMITTED_IMPORTS_PLACEHOLDER);
        src.push_str("\n\n\n");
        if !self.attributes.is_empty() {
            src.push_str(&self.attributes.join("\n"));
            src.push('\n');
        }
        if !self.functions.is_empty() {
            src.push('\n');
            src.push_str(&self.functions.join("\n\n\n"));
            src.push('\n');
        }
        if !self.classes.is_empty() {
            src.push('\n');
            src.push_str(&self.classes.join("\n\n\n"));
            src.push('\n');
        }
        src
    }
}

impl Iterator for ModuleWalker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            match std::mem::replace(&mut self.state, ModuleState::Done) {
                ModuleState::Name => {
                    let n_inj = self.inj.key("__name__");
                    match self.scope.send_repr(&n_inj) {
                        Some(raw) => {
                            self.state = ModuleState::NameChild(NameWalker::new(n_inj, raw));
                        }
                        None => {
                            self.state = ModuleState::Doc;
                            return Some(WalkEvent::failure(format!(
                                "Unable to read response from injection {} when attempting to read the module name",
                                n_inj.repr_payload()
                            )));
                        }
                    }
                }
                ModuleState::NameChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = ModuleState::NameChild(child);
                        return Some(event);
                    }
                    let outcome = child.finish();
                    if !outcome.is_default() {
                        let name = outcome.value.expect("non-default name outcomes carry a value");
                        if self.scope.state.borrow().module_blacklist.contains(&name) {
                            debug!(%name, "module blacklisted; aborting walk");
                            return None;
                        }
                        self.name = Some(name);
                    }
                    self.state = ModuleState::Doc;
                }
                ModuleState::Doc => {
                    let d_inj = self.inj.key("__doc__");
                    match self.scope.send_repr(&d_inj) {
                        Some(raw) => {
                            self.state = ModuleState::DocChild(DocStringWalker::new(d_inj, raw));
                        }
                        None => {
                            self.state = ModuleState::Keys;
                            return Some(WalkEvent::failure(format!(
                                "Unable to read docstring of module with injection {}",
                                d_inj.repr_payload()
                            )));
                        }
                    }
                }
                ModuleState::DocChild(mut child) => {
                    if let Some(event) = child.next() {
                        self.state = ModuleState::DocChild(child);
                        return Some(event);
                    }
                    self.docstring = child.finish().value;
                    self.state = ModuleState::Keys;
                }
                ModuleState::Keys => {
                    let keys: Vec<String> = parse_dict_top_level_keys(&self.raw)
                        .into_iter()
                        .filter(|key| key != "__name__" && key != "__doc__")
                        .collect();
                    if keys.is_empty() {
                        return Some(WalkEvent::failure(format!(
                            "Unable to parse dictionary keys from response {} from injection {}",
                            self.raw, self.inj
                        )));
                    }
                    self.state = ModuleState::Key { keys, pos: 0 };
                }
                ModuleState::Key { keys, pos } => {
                    if pos >= keys.len() {
                        self.state = ModuleState::Finish;
                        continue;
                    }
                    let k_inj = self.inj.key(&keys[pos]);
                    let Some(raw) = self.scope.send_repr(&k_inj) else {
                        self.state = ModuleState::Key { keys, pos: pos + 1 };
                        return Some(WalkEvent::failure(format!(
                            "Unable to recover response from injection string {}",
                            k_inj.repr_payload()
                        )));
                    };

                    if let Some(kind) = classify(&k_inj.repr_payload(), &raw) {
                        if let Some(child) = Walker::from_classified(&self.scope, kind, k_inj, raw) {
                            self.state = ModuleState::KeyChild {
                                keys,
                                pos,
                                child: Box::new(child),
                            };
                            continue;
                        }
                        self.state = ModuleState::Key { keys, pos: pos + 1 };
                        continue;
                    }

                    if MODULE_RESPONSE_RE.is_match(&raw) {
                        let nested_name = MODULE_NAME_RE
                            .captures(&raw)
                            .map(|captures| captures[1].to_owned());
                        if let Some(nested_name) = &nested_name {
                            if self.scope.state.borrow().module_blacklist.contains(nested_name) {
                                debug!(name = %nested_name, "nested module blacklisted; skipping");
                                self.state = ModuleState::Key { keys, pos: pos + 1 };
                                continue;
                            }
                        }
                        let md_inj = k_inj.attr("__dict__");
                        let Some(rendered) = self.scope.send(&md_inj) else {
                            self.state = ModuleState::Key { keys, pos: pos + 1 };
                            return Some(WalkEvent::failure(format!(
                                "Unable to recover expected module __dict__ via injection string {md_inj}"
                            )));
                        };
                        let child = Walker::Module(Box::new(Self::new(self.scope.clone(), md_inj, rendered)));
                        self.state = ModuleState::NestedModule {
                            keys,
                            pos,
                            child: Box::new(child),
                        };
                        continue;
                    }

                    let child = Walker::Attribute(AttributeWalker::new(k_inj, raw));
                    self.state = ModuleState::KeyChild {
                        keys,
                        pos,
                        child: Box::new(child),
                    };
                }
                ModuleState::KeyChild { keys, pos, mut child } => {
                    if let Some(event) = child.next() {
                        self.state = ModuleState::KeyChild { keys, pos, child };
                        return Some(event);
                    }
                    match child.finish() {
                        WalkOutcome::Class(class) => {
                            if let Some(src) = class.src_code {
                                self.classes.push(src);
                            }
                        }
                        WalkOutcome::Function(function) => {
                            if let Some(src) = function.src_code {
                                self.functions.push(src);
                            }
                        }
                        WalkOutcome::Attribute(attribute) => {
                            if let Some(src) = attribute.src_code {
                                self.attributes.push(src);
                            }
                        }
                        _ => {}
                    }
                    self.state = ModuleState::Key { keys, pos: pos + 1 };
                }
                ModuleState::NestedModule { keys, pos, mut child } => {
                    if let Some(event) = child.next() {
                        self.state = ModuleState::NestedModule { keys, pos, child };
                        return Some(event);
                    }
                    let _ = child.finish();
                    self.state = ModuleState::Key { keys, pos: pos + 1 };
                }
                ModuleState::Finish => {
                    let src_code = self.synthesize();
                    {
                        let mut state = self.scope.state.borrow_mut();
                        if let Some(name) = &self.name {
                            state.module_blacklist.insert(name.clone());
                        }
                        state.visited_modules.push(ModuleRecord {
                            name: self.name.clone(),
                            docstring: self.docstring.clone(),
                            attributes: self.attributes.clone(),
                            functions: self.functions.clone(),
                            classes: self.classes.clone(),
                            src_code: src_code.clone(),
                        });
                    }
                    self.state = ModuleState::Done;
                    return Some(WalkEvent::Module(ModuleEvent {
                        inj: self.inj.to_string(),
                        name: self.name.clone(),
                        src_code: Some(src_code),
                    }));
                }
                ModuleState::Done => return None,
            }
        }
    }
}
