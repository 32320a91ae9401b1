//! The engine: seeds the traversal, owns the shared state, drives walkers.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexSet;
use tracing::debug;

use crate::{
    classify::classify,
    decompile::{BytecodeVersion, Decompiler},
    defaults::{DEFAULT_ATTRIBUTE_BLACKLIST, DEFAULT_CLASS_BLACKLIST, DEFAULT_MODULE_BLACKLIST},
    event::WalkEvent,
    harness::InjectionHarness,
    inj::Injection,
    walkers::{FailedWalker, Walker},
};

/// Ordered name set used for the traversal blacklists.
pub(crate) type NameSet = IndexSet<String, ahash::RandomState>;

/// Record of one completed module walk, kept for the final dump.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModuleRecord {
    /// The module's `__name__`, when resolvable.
    pub name: Option<String>,
    /// The module's `__doc__`, when present.
    pub docstring: Option<String>,
    /// Synthesized `name = value` attribute lines.
    pub attributes: Vec<String>,
    /// Reconstructed function definitions.
    pub functions: Vec<String>,
    /// Synthesized class definitions.
    pub classes: Vec<String>,
    /// The synthesized module source.
    pub src_code: String,
}

/// State shared by every walker of an engine, mutated as the traversal
/// discovers names.
pub(crate) struct EngineState {
    /// Attribute names never traversed.
    pub attribute_blacklist: NameSet,
    /// Class short-names never recursed into; grows with discovery.
    pub class_blacklist: NameSet,
    /// Module names never recursed into; grows with discovery.
    pub module_blacklist: NameSet,
    /// Function qualified names already walked.
    pub function_blacklist: NameSet,
    /// Completed module walks, in completion order.
    pub visited_modules: Vec<ModuleRecord>,
}

/// Blacklist overrides for engine construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Attribute names never to traverse.
    pub attribute_blacklist: Vec<String>,
    /// Class short-names never to recurse into.
    pub class_blacklist: Vec<String>,
    /// Module names never to recurse into.
    pub module_blacklist: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attribute_blacklist: to_owned_vec(DEFAULT_ATTRIBUTE_BLACKLIST),
            class_blacklist: to_owned_vec(DEFAULT_CLASS_BLACKLIST),
            module_blacklist: to_owned_vec(DEFAULT_MODULE_BLACKLIST),
        }
    }
}

fn to_owned_vec(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

/// The shared handle a walker carries: the oracle, the decompiler, the
/// bytecode dialect, and the engine state. Cloning is cheap; execution is
/// serial, so the interior mutability is never contended.
#[derive(Clone)]
pub(crate) struct Scope {
    pub harness: Rc<dyn InjectionHarness>,
    pub decompiler: Rc<dyn Decompiler>,
    pub version: BytecodeVersion,
    pub state: Rc<RefCell<EngineState>>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("version", &self.version).finish_non_exhaustive()
    }
}

impl Scope {
    /// Sends a plain-rendered injection.
    pub fn send(&self, inj: &Injection) -> Option<String> {
        self.harness.send_injection(inj.payload())
    }

    /// Sends an injection with the `!r` conversion.
    pub fn send_repr(&self, inj: &Injection) -> Option<String> {
        self.harness.send_injection(&inj.repr_payload())
    }
}

/// Enumerates a vulnerable service via format-string injections.
pub struct InjectionEngine {
    scope: Scope,
}

impl InjectionEngine {
    /// Builds an engine with the default blacklists.
    pub fn new(
        harness: impl InjectionHarness + 'static,
        decompiler: impl Decompiler + 'static,
        version: BytecodeVersion,
    ) -> Self {
        Self::with_config(harness, decompiler, version, EngineConfig::default())
    }

    /// Builds an engine with explicit blacklist overrides.
    pub fn with_config(
        harness: impl InjectionHarness + 'static,
        decompiler: impl Decompiler + 'static,
        version: BytecodeVersion,
        config: EngineConfig,
    ) -> Self {
        let state = EngineState {
            attribute_blacklist: config.attribute_blacklist.into_iter().collect(),
            class_blacklist: config.class_blacklist.into_iter().collect(),
            module_blacklist: config.module_blacklist.into_iter().collect(),
            function_blacklist: NameSet::default(),
            visited_modules: Vec::new(),
        };
        Self {
            scope: Scope {
                harness: Rc::new(harness),
                decompiler: Rc::new(decompiler),
                version,
                state: Rc::new(RefCell::new(state)),
            },
        }
    }

    /// Runs the traversal for one format argument index, yielding events
    /// lazily. State (blacklists, visited modules) persists across runs of
    /// the same engine.
    #[must_use]
    pub fn run(&self, injection_index: u32) -> EngineRun {
        EngineRun {
            scope: self.scope.clone(),
            state: RunState::Seed { injection_index },
        }
    }

    /// Completed module walks, in completion order.
    #[must_use]
    pub fn modules(&self) -> Vec<ModuleRecord> {
        self.scope.state.borrow().visited_modules.clone()
    }

    /// The class names discovered or seeded so far.
    #[must_use]
    pub fn class_blacklist(&self) -> Vec<String> {
        self.scope.state.borrow().class_blacklist.iter().cloned().collect()
    }

    /// The module names blacklisted or completed so far.
    #[must_use]
    pub fn module_blacklist(&self) -> Vec<String> {
        self.scope.state.borrow().module_blacklist.iter().cloned().collect()
    }

    /// The function qualified names walked so far.
    #[must_use]
    pub fn function_blacklist(&self) -> Vec<String> {
        self.scope.state.borrow().function_blacklist.iter().cloned().collect()
    }

    /// Renders the final data dump: every recovered module's synthesized
    /// source, in completion order.
    #[must_use]
    pub fn render_dump(&self) -> String {
        let state = self.scope.state.borrow();
        if state.visited_modules.is_empty() {
            return "# no modules enumerated\n".to_owned();
        }
        let mut out = String::new();
        for record in &state.visited_modules {
            let name = record.name.as_deref().unwrap_or("<unknown module>");
            out.push_str(&format!("# ---- module {name} ----\n"));
            out.push_str(&record.src_code);
            if !record.src_code.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

/// One traversal: seed, classify, dispatch, drain.
pub struct EngineRun {
    scope: Scope,
    state: RunState,
}

enum RunState {
    Seed { injection_index: u32 },
    Draining(Walker),
    Done,
}

impl Iterator for EngineRun {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            match std::mem::replace(&mut self.state, RunState::Done) {
                RunState::Seed { injection_index } => {
                    let inj = Injection::seed(injection_index);
                    debug!(%inj, "seeding traversal");

                    let Some(response) = self.scope.send(&inj) else {
                        self.state = RunState::Draining(Walker::Failed(FailedWalker::msg(format!(
                            "Unable to trigger initial injection at index {injection_index}"
                        ))));
                        continue;
                    };

                    let walker = classify(inj.payload(), &response)
                        .and_then(|kind| Walker::from_classified(&self.scope, kind, inj, response.clone()))
                        .unwrap_or_else(|| {
                            Walker::Failed(FailedWalker::msg(format!(
                                "Unable to parse injection response: {response}"
                            )))
                        });
                    self.state = RunState::Draining(walker);
                }
                RunState::Draining(mut walker) => match walker.next() {
                    Some(event) => {
                        self.state = RunState::Draining(walker);
                        return Some(event);
                    }
                    None => return None,
                },
                RunState::Done => return None,
            }
        }
    }
}
