#![doc = include_str!("../../../README.md")]

mod classify;
mod code_object;
mod decompile;
pub mod defaults;
mod engine;
mod event;
mod harness;
mod inj;
mod literal;
mod walkers;

pub use crate::{
    classify::{WalkerKind, classify},
    code_object::{CodeObject, Const},
    decompile::{
        BytecodeVersion, DecompileError, Decompiler, KNOWN_BYTECODE_VERSIONS, RawBytecodeDecompiler,
        VersionParseError, normalize_decompiled,
    },
    engine::{EngineConfig, EngineRun, InjectionEngine, ModuleRecord},
    event::{
        AttributeEvent, ClassEvent, CodeObjectEvent, CodeObjectFieldEvent, DocStringEvent, FailureEvent,
        FunctionEvent, ModuleEvent, NameEvent, SlotWrapperEvent, WalkEvent,
    },
    harness::{HarnessError, InjectionHarness, SubprocessHarness},
    inj::Injection,
    literal::{Literal, LiteralParseError, TypeFault, parse_literal},
};
