//! The traversal variants.
//!
//! Every walker is a hand-written pull iterator: each `next()` performs at
//! most a bounded handful of oracle calls and yields one [`WalkEvent`].
//! Child walkers are owned by their parent's continuation state and their
//! events are forwarded verbatim, so the whole traversal flattens into one
//! lazy stream. After exhaustion, a parent harvests what the child
//! recovered through [`Walker::finish`].
//!
//! Walkers never raise across the iterator boundary: every anticipated
//! fault becomes a `Failure` event and the traversal continues at the next
//! sibling (or stops, where the protocol says so).

pub(crate) mod attribute;
pub(crate) mod class;
pub(crate) mod code_object;
pub(crate) mod code_object_field;
pub(crate) mod doc_string;
pub(crate) mod failed;
pub(crate) mod function;
pub(crate) mod module;
pub(crate) mod name;
pub(crate) mod slot_wrapper;

use crate::{
    classify::WalkerKind,
    engine::Scope,
    event::WalkEvent,
    inj::Injection,
};
pub(crate) use self::{
    attribute::{AttributeOutcome, AttributeWalker},
    class::{ClassOutcome, ClassWalker},
    code_object::{CodeObjectOutcome, CodeObjectWalker},
    code_object_field::{CodeObjectFieldOutcome, CodeObjectFieldWalker},
    doc_string::{DocStringOutcome, DocStringWalker},
    failed::FailedWalker,
    function::{FunctionOutcome, FunctionWalker},
    module::{ModuleOutcome, ModuleWalker},
    name::{NameOutcome, NameWalker},
    slot_wrapper::SlotWrapperWalker,
};

/// The core sum type: one variant per traversal protocol.
///
/// A `Walker` is both the node and its event stream; iterate it to drive
/// the traversal, then call [`Walker::finish`] to harvest the recovered
/// data.
pub(crate) enum Walker {
    Class(Box<ClassWalker>),
    Function(Box<FunctionWalker>),
    CodeObject(Box<CodeObjectWalker>),
    Module(Box<ModuleWalker>),
    Attribute(AttributeWalker),
    SlotWrapper(SlotWrapperWalker),
    Name(NameWalker),
    DocString(DocStringWalker),
    CodeObjectField(CodeObjectFieldWalker),
    Failed(FailedWalker),
}

/// What a walker recovered, harvested after its stream is exhausted.
pub(crate) enum WalkOutcome {
    Class(ClassOutcome),
    Function(FunctionOutcome),
    CodeObject(CodeObjectOutcome),
    Module(ModuleOutcome),
    Attribute(AttributeOutcome),
    SlotWrapper,
    Name(NameOutcome),
    DocString(DocStringOutcome),
    CodeObjectField(CodeObjectFieldOutcome),
    Failed,
}

impl Walker {
    /// Builds the walker for a classified `(injection, response)` pair.
    ///
    /// Returns `None` for the kinds that are never pattern-dispatched
    /// (`Module`, `CodeObjectField`, `Failed`); callers treat that as a
    /// classification miss.
    pub(crate) fn from_classified(
        scope: &Scope,
        kind: WalkerKind,
        inj: Injection,
        response: String,
    ) -> Option<Self> {
        match kind {
            WalkerKind::Class => Some(Self::Class(Box::new(ClassWalker::new(scope.clone(), inj, response)))),
            WalkerKind::Function => Some(Self::Function(Box::new(FunctionWalker::new(
                scope.clone(),
                inj,
                response,
            )))),
            WalkerKind::CodeObject => Some(Self::CodeObject(Box::new(CodeObjectWalker::new(
                scope.clone(),
                inj,
                response,
            )))),
            WalkerKind::Attribute => Some(Self::Attribute(AttributeWalker::new(inj, response))),
            WalkerKind::SlotWrapper => Some(Self::SlotWrapper(SlotWrapperWalker::new(inj))),
            WalkerKind::Name => Some(Self::Name(NameWalker::new(inj, response))),
            WalkerKind::DocString => Some(Self::DocString(DocStringWalker::new(inj, response))),
            WalkerKind::Module | WalkerKind::CodeObjectField | WalkerKind::Failed => None,
        }
    }

    /// Harvests the recovered data. Only meaningful once the stream is
    /// exhausted.
    pub(crate) fn finish(self) -> WalkOutcome {
        match self {
            Self::Class(walker) => WalkOutcome::Class((*walker).finish()),
            Self::Function(walker) => WalkOutcome::Function((*walker).finish()),
            Self::CodeObject(walker) => WalkOutcome::CodeObject((*walker).finish()),
            Self::Module(walker) => WalkOutcome::Module((*walker).finish()),
            Self::Attribute(walker) => WalkOutcome::Attribute(walker.finish()),
            Self::SlotWrapper(_) => WalkOutcome::SlotWrapper,
            Self::Name(walker) => WalkOutcome::Name(walker.finish()),
            Self::DocString(walker) => WalkOutcome::DocString(walker.finish()),
            Self::CodeObjectField(walker) => WalkOutcome::CodeObjectField(walker.finish()),
            Self::Failed(_) => WalkOutcome::Failed,
        }
    }
}

impl Iterator for Walker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        match self {
            Self::Class(walker) => walker.next(),
            Self::Function(walker) => walker.next(),
            Self::CodeObject(walker) => walker.next(),
            Self::Module(walker) => walker.next(),
            Self::Attribute(walker) => walker.next(),
            Self::SlotWrapper(walker) => walker.next(),
            Self::Name(walker) => walker.next(),
            Self::DocString(walker) => walker.next(),
            Self::CodeObjectField(walker) => walker.next(),
            Self::Failed(walker) => walker.next(),
        }
    }
}
