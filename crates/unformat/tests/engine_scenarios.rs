//! End-to-end traversals against a scripted oracle.
//!
//! Each scenario scripts the oracle with a fixture table of
//! `payload → response` pairs and drives a full engine run, asserting on
//! the event stream, the synthesized source, the blacklists, and (via the
//! recorded payload log) on which injections were and were not sent.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use pretty_assertions::assert_eq;
use unformat::{
    BytecodeVersion, CodeObject, DecompileError, Decompiler, InjectionEngine, InjectionHarness,
    RawBytecodeDecompiler, WalkEvent,
};

/// Fixture oracle: answers from a fixed table and records every payload.
struct ScriptedOracle {
    responses: HashMap<String, String>,
    sent: Rc<RefCell<Vec<String>>>,
}

impl ScriptedOracle {
    fn new(table: Vec<(String, String)>) -> (Self, Rc<RefCell<Vec<String>>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                responses: table.into_iter().collect(),
                sent: Rc::clone(&sent),
            },
            sent,
        )
    }
}

impl InjectionHarness for ScriptedOracle {
    fn send_injection(&self, payload: &str) -> Option<String> {
        self.sent.borrow_mut().push(payload.to_owned());
        self.responses.get(payload).cloned()
    }

    fn response_marker(&self) -> &str {
        "FIXTUREMARKER"
    }
}

/// Decompiler stub producing a fixed body for every code object.
struct FixedDecompiler(&'static str);

impl Decompiler for FixedDecompiler {
    fn supports(&self, _version: BytecodeVersion) -> bool {
        true
    }

    fn decompile(&self, _version: BytecodeVersion, _code: &CodeObject) -> Result<String, DecompileError> {
        Ok(self.0.to_owned())
    }
}

/// Decompiler stub that always fails.
struct BrokenDecompiler;

impl Decompiler for BrokenDecompiler {
    fn supports(&self, _version: BytecodeVersion) -> bool {
        true
    }

    fn decompile(&self, _version: BytecodeVersion, _code: &CodeObject) -> Result<String, DecompileError> {
        Err(DecompileError::Backend("fixture backend is broken".to_owned()))
    }
}

fn pair(payload: impl Into<String>, response: impl Into<String>) -> (String, String) {
    (payload.into(), response.into())
}

/// Entries for a complete code object at `base` with one parameter `x`.
fn code_fixture(base: &str, name: &str) -> Vec<(String, String)> {
    vec![
        pair(format!("{base}.co_argcount!r"), "1"),
        pair(format!("{base}.co_kwonlyargcount!r"), "0"),
        pair(format!("{base}.co_nlocals!r"), "1"),
        pair(format!("{base}.co_stacksize!r"), "2"),
        pair(format!("{base}.co_flags!r"), "67"),
        pair(format!("{base}.co_code!r"), "b'd\\x01S\\x00'"),
        pair(format!("{base}.co_consts[0]!r"), "None"),
        pair(format!("{base}.co_consts[1]!r"), "1"),
        pair(format!("{base}.co_names!r"), "()"),
        pair(format!("{base}.co_varnames!r"), "('x',)"),
        pair(format!("{base}.co_filename!r"), "'app.py'"),
        pair(format!("{base}.co_name!r"), format!("'{name}'")),
        pair(format!("{base}.co_firstlineno!r"), "4"),
        pair(format!("{base}.co_lnotab!r"), "b''"),
        pair(format!("{base}.co_freevars!r"), "()"),
        pair(format!("{base}.co_cellvars!r"), "()"),
    ]
}

fn version() -> BytecodeVersion {
    "3.7".parse().unwrap()
}

/// A class with a literal attribute and an `object` base.
#[test]
fn class_with_attribute_and_object_base() {
    let table = vec![
        pair("0.__class__", "<class 'X'>"),
        pair("0.__class__.__name__!r", "'X'"),
        pair("0.__class__.__doc__!r", "'d'"),
        pair("0.__class__.__bases__", "(<class 'object'>,)"),
        pair("0.__class__.__bases__[0]", "<class 'object'>"),
        pair("0.__class__.__bases__[0].__name__!r", "'object'"),
        pair("0.__class__.__dict__", "{'a': 1}"),
        pair("0.__class__.a!r", "1"),
    ];
    let (oracle, _sent) = ScriptedOracle::new(table);
    let engine = InjectionEngine::new(oracle, RawBytecodeDecompiler, version());

    let events: Vec<_> = engine.run(0).collect();
    assert!(!events.is_empty(), "every walk yields at least one event");
    assert!(events.iter().all(|event| !event.is_failure()), "unexpected failure event");

    let names: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            WalkEvent::Name(name) => name.value.clone(),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["X".to_owned(), "object".to_owned()]);

    let doc = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::DocString(doc) => doc.value.clone(),
            _ => None,
        })
        .unwrap();
    assert_eq!(doc, "d");

    let attribute = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::Attribute(attribute) => Some(attribute.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(attribute.src_code, "a = 1");

    let class_src = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::Class(class) => class.src_code.clone(),
            _ => None,
        })
        .unwrap();
    assert!(class_src.contains("class X(object):"), "got source:\n{class_src}");
    assert!(class_src.contains("a = 1"));
}

/// Base probing aborts after the first missing index and the
/// synthesized source carries an empty base list.
#[test]
fn missing_first_base_empties_the_inheritance_list() {
    let table = vec![
        pair("0.__class__", "<class 'Y'>"),
        pair("0.__class__.__name__!r", "'Y'"),
        pair("0.__class__.__doc__!r", "None"),
        pair("0.__class__.__bases__", "()"),
        pair("0.__class__.__dict__", "{}"),
    ];
    let (oracle, sent) = ScriptedOracle::new(table);
    let engine = InjectionEngine::new(oracle, RawBytecodeDecompiler, version());

    let events: Vec<_> = engine.run(0).collect();
    let class_src = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::Class(class) => class.src_code.clone(),
            _ => None,
        })
        .unwrap();
    assert!(class_src.starts_with("class Y():"), "got source:\n{class_src}");

    let sent = sent.borrow();
    assert!(sent.iter().any(|p| p == "0.__class__.__bases__[0]"));
    assert!(!sent.iter().any(|p| p == "0.__class__.__bases__[1]"));
}

/// A silent oracle produces exactly one failure naming the index.
#[test]
fn absent_seed_response_fails_once() {
    let (oracle, sent) = ScriptedOracle::new(vec![]);
    let engine = InjectionEngine::new(oracle, RawBytecodeDecompiler, version());

    let events: Vec<_> = engine.run(7).collect();
    assert_eq!(events.len(), 1);
    assert!(events[0].is_failure());
    assert_eq!(events[0].to_string(), "Unable to trigger initial injection at index 7");
    assert_eq!(sent.borrow().as_slice(), ["7.__class__"]);
}

fn function_table() -> Vec<(String, String)> {
    let mut table = vec![
        pair("0.__class__", "<function f at 0x1>"),
        pair("0.__class__.__qualname__!r", "'f'"),
        pair("0.__class__.__doc__!r", "''"),
        pair(
            "0.__class__.__code__",
            "<code object f at 0x2, file \"app.py\", line 4>",
        ),
    ];
    table.extend(code_fixture("0.__class__.__code__", "f"));
    table
}

/// A reachable function is fully reconstructed through its code object.
#[test]
fn function_reconstruction() {
    let (oracle, _sent) = ScriptedOracle::new(function_table());
    let engine = InjectionEngine::new(oracle, FixedDecompiler("return 1"), version());

    let events: Vec<_> = engine.run(0).collect();
    assert!(events.iter().all(|event| !event.is_failure()));

    let function_src = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::Function(function) => function.src_code.clone(),
            _ => None,
        })
        .unwrap();
    assert!(function_src.starts_with("def f(x):"), "got source:\n{function_src}");
    assert!(function_src.contains("    return 1"));
    // The empty docstring is omitted.
    assert!(!function_src.contains("\"\"\""));

    assert_eq!(engine.function_blacklist(), vec!["f".to_owned()]);
}

/// A failing decompiler bubbles a failure event and the function degrades
/// to the unknown-body placeholder.
#[test]
fn decompiler_failure_leaves_placeholder_body() {
    let (oracle, _sent) = ScriptedOracle::new(function_table());
    let engine = InjectionEngine::new(oracle, BrokenDecompiler, version());

    let events: Vec<_> = engine.run(0).collect();
    assert!(events.iter().any(WalkEvent::is_failure));

    let function_src = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::Function(function) => function.src_code.clone(),
            _ => None,
        })
        .unwrap();
    assert!(function_src.contains("<UNKNOWN BODY>"), "got source:\n{function_src}");
}

/// Fixture for the composite scenario: class `X` with method `run`, whose
/// `__globals__` pivot reaches module `app` containing a bytes secret and
/// the blacklisted `os` module.
fn composite_table() -> Vec<(String, String)> {
    let globals = "0.__class__.run.__globals__";
    let mut table = vec![
        pair("0.__class__", "<class 'X'>"),
        pair("0.__class__.__name__!r", "'X'"),
        pair("0.__class__.__doc__!r", "'d'"),
        pair("0.__class__.__bases__", "(<class 'object'>,)"),
        pair("0.__class__.__bases__[0]", "<class 'object'>"),
        pair("0.__class__.__bases__[0].__name__!r", "'object'"),
        pair(
            "0.__class__.__dict__",
            "{'a': 1, 'run': <function X.run at 0x3>}",
        ),
        pair("0.__class__.a!r", "1"),
        pair("0.__class__.run!r", "<function X.run at 0x3>"),
        pair("0.__class__.run.__qualname__!r", "'X.run'"),
        pair("0.__class__.run.__doc__!r", "'runs the thing'"),
        pair(
            "0.__class__.run.__code__",
            "<code object run at 0x4, file \"app.py\", line 9>",
        ),
        pair(
            globals,
            "{'__name__': 'app', '__doc__': None, 'MODULE_SECRET': b'swordfish', 'helper': <function helper at 0x6>, 'os': <module 'os'>}",
        ),
        pair(format!("{globals}[__name__]!r"), "'app'"),
        pair(format!("{globals}[__doc__]!r"), "None"),
        pair(format!("{globals}[MODULE_SECRET]!r"), "b'swordfish'"),
        pair(format!("{globals}[helper]!r"), "<function helper at 0x6>"),
        pair(format!("{globals}[helper].__qualname__!r"), "'helper'"),
        pair(format!("{globals}[helper].__doc__!r"), "None"),
        pair(
            format!("{globals}[helper].__code__"),
            "<code object helper at 0x7, file \"app.py\", line 2>",
        ),
        pair(
            format!("{globals}[os]!r"),
            "<module 'os' from '/usr/lib/python3.7/os.py'>",
        ),
    ];
    table.extend(code_fixture("0.__class__.run.__code__", "run"));
    table.extend(code_fixture(&format!("{globals}[helper].__code__"), "helper"));
    table
}

/// The composite scenario: class walk, method reconstruction, module
/// escape, and the blacklist skip, all in one stream.
#[test]
fn composite_class_method_module_walk() {
    let (oracle, sent) = ScriptedOracle::new(composite_table());
    let engine = InjectionEngine::new(oracle, FixedDecompiler("return self.key"), version());

    let events: Vec<_> = engine.run(0).collect();
    assert!(!events.is_empty());

    let class_src = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::Class(class) => class.src_code.clone(),
            _ => None,
        })
        .unwrap();
    assert!(class_src.contains("class X(object):"));
    assert!(class_src.contains("    a = 1"));
    assert!(class_src.contains("    def run(x):"), "got source:\n{class_src}");
    assert!(class_src.contains("\"\"\"runs the thing\"\"\""));

    // The module escape pivoted through run.__globals__ and recorded `app`.
    let modules = engine.modules();
    assert_eq!(modules.len(), 1);
    let record = &modules[0];
    assert_eq!(record.name.as_deref(), Some("app"));
    assert_eq!(record.attributes, vec!["MODULE_SECRET = b'swordfish'".to_owned()]);
    assert!(record.src_code.contains("<OMITTED IMPORTS>"));
    assert!(record.src_code.contains("def helper(x):"), "got dump:\n{}", record.src_code);

    // The blacklisted os module cost zero further injections.
    let sent = sent.borrow();
    assert!(sent.iter().any(|p| p.ends_with("[os]!r")));
    assert!(
        !sent.iter().any(|p| p.contains("[os].__dict__")),
        "no injections may be sent for a blacklisted module's __dict__"
    );

    // The dump renders the recovered module.
    let dump = engine.render_dump();
    assert!(dump.contains("# ---- module app ----"));
    assert!(dump.contains("MODULE_SECRET = b'swordfish'"));
}

/// Blacklist monotonicity: every successfully-named entity is a member of
/// its blacklist after its walk completes.
#[test]
fn blacklist_monotonicity() {
    let (oracle, _sent) = ScriptedOracle::new(composite_table());
    let engine = InjectionEngine::new(oracle, FixedDecompiler("return 1"), version());
    let _ = engine.run(0).count();

    let classes = engine.class_blacklist();
    assert!(classes.contains(&"X".to_owned()));
    assert!(classes.contains(&"object".to_owned()));
    assert!(engine.function_blacklist().contains(&"X.run".to_owned()));
    let modules = engine.module_blacklist();
    assert!(modules.contains(&"app".to_owned()));
    assert!(modules.contains(&"os".to_owned()));
}

/// No duplicate traversal: a second run over the same engine stops at the
/// class name, which is blacklisted by now.
#[test]
fn no_duplicate_traversal_across_runs() {
    let (oracle, sent) = ScriptedOracle::new(composite_table());
    let engine = InjectionEngine::new(oracle, FixedDecompiler("return 1"), version());
    let first_run_events = engine.run(0).count();
    assert!(first_run_events > 1);

    let sends_before = sent.borrow().len();
    let second_run_events = engine.run(0).count();
    assert_eq!(second_run_events, 1, "only the name event is expected");
    let sends_during_second = sent.borrow().len() - sends_before;
    // The seed and the single name read.
    assert_eq!(sends_during_second, 2);
}

/// A nested code-object constant is recovered recursively and probing
/// stops at the first missing index.
#[test]
fn nested_code_object_constant_joins_the_tuple() {
    let mut table = function_table();
    table.retain(|(k, _)| !k.starts_with("0.__class__.__code__.co_consts["));
    table.push(pair(
        "0.__class__.__code__.co_consts[0]!r",
        "<code object inner at 0x5, file \"app.py\", line 5>",
    ));
    table.push(pair("0.__class__.__code__.co_consts[1]!r", "42"));
    table.extend(code_fixture("0.__class__.__code__.co_consts[0]", "inner"));

    let (oracle, sent) = ScriptedOracle::new(table);
    let engine = InjectionEngine::new(oracle, FixedDecompiler("return 1"), version());

    let events: Vec<_> = engine.run(0).collect();
    assert!(events.iter().all(|event| !event.is_failure()));

    let consts_summary = events
        .iter()
        .find_map(|event| match event {
            WalkEvent::CodeObjectField(field)
                if field.field == "co_consts" && field.inj == "0.__class__.__code__.co_consts" =>
            {
                Some(field.value_repr.clone())
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(consts_summary, "(<code object inner>, 42)");

    let sent = sent.borrow();
    assert!(sent.iter().any(|p| p == "0.__class__.__code__.co_consts[2]!r"));
    assert!(
        !sent.iter().any(|p| p == "0.__class__.__code__.co_consts[3]!r"),
        "probing must stop at the first miss"
    );
}

/// Event totality: even a walk that goes wrong everywhere still yields an
/// event for every walker it spawns.
#[test]
fn event_totality_under_failures() {
    let table = vec![
        pair("0.__class__", "<class 'Broken'>"),
        pair("0.__class__.__name__!r", "'Broken'"),
        // __doc__, __bases__, __dict__ all missing.
    ];
    let (oracle, _sent) = ScriptedOracle::new(table);
    let engine = InjectionEngine::new(oracle, RawBytecodeDecompiler, version());

    let events: Vec<_> = engine.run(0).collect();
    assert!(events.len() >= 4, "expected name, doc failure, bases failure, dict failure, self");
    assert!(matches!(events.last(), Some(WalkEvent::Class(_))));
}
