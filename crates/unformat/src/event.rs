//! Events emitted while walking a target's object graph.
//!
//! Each walker yields events as it progresses; child walkers' events are
//! flattened into the parent's stream, so the consumer sees one serial
//! narration of the whole traversal. Events are snapshots: they carry the
//! injection that produced them and whatever was recovered by the time they
//! were emitted.

use std::fmt;

use crate::classify::WalkerKind;

/// One step of a traversal, as seen by the consumer.
#[derive(Debug, Clone, serde::Serialize)]
pub enum WalkEvent {
    /// A class walk reached its synthesis point.
    Class(ClassEvent),
    /// A function walk reached its synthesis point.
    Function(FunctionEvent),
    /// A code-object walk recovered all fields.
    CodeObject(CodeObjectEvent),
    /// A module walk completed.
    Module(ModuleEvent),
    /// An attribute literal was recovered.
    Attribute(AttributeEvent),
    /// A slot wrapper was recorded (not traversed).
    SlotWrapper(SlotWrapperEvent),
    /// A `__name__`-family read completed.
    Name(NameEvent),
    /// A `__doc__` read completed.
    DocString(DocStringEvent),
    /// A single code-object field was recovered.
    CodeObjectField(CodeObjectFieldEvent),
    /// Something along the way did not work out.
    Failure(FailureEvent),
}

/// Data for a completed class walk step.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClassEvent {
    /// The injection that produced the class.
    pub inj: String,
    /// The recovered class name, when resolvable.
    pub name: Option<String>,
    /// Synthesized class source.
    pub src_code: Option<String>,
}

/// Data for a completed function walk step.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FunctionEvent {
    /// The injection that produced the function.
    pub inj: String,
    /// The recovered qualified name, when resolvable.
    pub qualname: Option<String>,
    /// Reconstructed function definition.
    pub src_code: Option<String>,
}

/// Data for a completed code-object walk step.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CodeObjectEvent {
    /// The injection that produced the code object.
    pub inj: String,
    /// Decompiled body, when the backend succeeded.
    pub src_code: Option<String>,
}

/// Data for a completed module walk.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModuleEvent {
    /// The injection pointing at the module's rendered `__dict__`.
    pub inj: String,
    /// The recovered module name, when resolvable.
    pub name: Option<String>,
    /// Synthesized module source.
    pub src_code: Option<String>,
}

/// Data for a recovered attribute literal.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttributeEvent {
    /// The injection that produced the attribute.
    pub inj: String,
    /// The attribute's name (the last path segment).
    pub name: String,
    /// Repr of the recovered value.
    pub value_repr: String,
    /// Synthesized `name = value` line.
    pub src_code: String,
}

/// Data for a recorded slot wrapper.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SlotWrapperEvent {
    /// The injection that produced the slot wrapper.
    pub inj: String,
}

/// Data for a completed name read.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NameEvent {
    /// The injection that produced the name.
    pub inj: String,
    /// The recovered text, absent when parsing failed.
    pub value: Option<String>,
}

/// Data for a completed docstring read.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DocStringEvent {
    /// The injection that produced the docstring.
    pub inj: String,
    /// The recovered text, absent when parsing failed.
    pub value: Option<String>,
}

/// Data for a single recovered code-object field.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CodeObjectFieldEvent {
    /// The injection that produced the field.
    pub inj: String,
    /// The field name (`co_argcount`, `co_code`, …).
    pub field: String,
    /// Repr of the recovered value.
    pub value_repr: String,
}

/// Data for a failed step.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FailureEvent {
    /// Why the step failed.
    pub message: String,
}

impl WalkEvent {
    /// Which walker variant emitted this event.
    #[must_use]
    pub fn kind(&self) -> WalkerKind {
        match self {
            Self::Class(_) => WalkerKind::Class,
            Self::Function(_) => WalkerKind::Function,
            Self::CodeObject(_) => WalkerKind::CodeObject,
            Self::Module(_) => WalkerKind::Module,
            Self::Attribute(_) => WalkerKind::Attribute,
            Self::SlotWrapper(_) => WalkerKind::SlotWrapper,
            Self::Name(_) => WalkerKind::Name,
            Self::DocString(_) => WalkerKind::DocString,
            Self::CodeObjectField(_) => WalkerKind::CodeObjectField,
            Self::Failure(_) => WalkerKind::Failed,
        }
    }

    /// Whether this event reports a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Recovered source carried by this event, if any.
    #[must_use]
    pub fn src_code(&self) -> Option<&str> {
        match self {
            Self::Class(event) => event.src_code.as_deref(),
            Self::Function(event) => event.src_code.as_deref(),
            Self::CodeObject(event) => event.src_code.as_deref(),
            Self::Module(event) => event.src_code.as_deref(),
            Self::Attribute(event) => Some(&event.src_code),
            _ => None,
        }
    }

    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self::Failure(FailureEvent {
            message: message.into(),
        })
    }
}

impl fmt::Display for WalkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(event) => write!(f, "Injected class with string {}", event.inj),
            Self::Function(event) => write!(f, "Injected function with string {}", event.inj),
            Self::CodeObject(event) => write!(f, "Injected code object with string {}", event.inj),
            Self::Module(event) => write!(f, "Injected module with string {}", event.inj),
            Self::Attribute(event) => write!(f, "Injected attribute with string {}", event.inj),
            Self::SlotWrapper(event) => write!(f, "Injected slot wrapper with string {}", event.inj),
            Self::Name(event) => write!(f, "Injected name field with string {}", event.inj),
            Self::DocString(event) => write!(f, "Injected docstring with string {}", event.inj),
            Self::CodeObjectField(event) => {
                write!(f, "Injected code object field with string {}", event.inj)
            }
            Self::Failure(event) => f.write_str(&event.message),
        }
    }
}
