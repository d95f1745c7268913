//! Error types of the bridge.
//!
//! Compile and runtime failures come back as data; nothing unwinds across the
//! host boundary. [`Error`] wraps every category so hosts can use `?` across
//! all engine operations.

use std::fmt;

use lunar_vm::LuaError;
use thiserror::Error;

/// Syntax failure: `<chunkname>:<line>: <message> near '<token>'`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
}

/// Category of a failed protected call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The script raised an error; the message carries a traceback
    Runtime,
    /// An allocation was refused or the memory limit was hit
    Memory,
    /// The message handler raised while processing an error
    Handler,
    /// A `__gc` metamethod raised during a collection triggered by the call
    Collector,
}

impl FailureKind {
    /// Memory and collector failures leave the runtime in a state hosts
    /// should not keep running scripts on without intervention
    pub fn is_fatal(self) -> bool {
        matches!(self, FailureKind::Memory | FailureKind::Collector)
    }

    pub(crate) fn from_status(error: LuaError) -> Self {
        match error {
            LuaError::MemoryError => FailureKind::Memory,
            LuaError::ErrorInHandler => FailureKind::Handler,
            LuaError::GcMetamethod => FailureKind::Collector,
            LuaError::RuntimeError | LuaError::CompileError => FailureKind::Runtime,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Runtime => write!(f, "runtime error"),
            FailureKind::Memory => write!(f, "memory error"),
            FailureKind::Handler => write!(f, "error in message handler"),
            FailureKind::Collector => write!(f, "error in finalizer"),
        }
    }
}

/// Outcome of a protected call other than success
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct FailureReport {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReport {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        FailureReport {
            kind,
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("invalid registry identity {0}")]
    InvalidIdentity(i32),
    #[error("no free registry identity left")]
    Exhausted,
    #[error("working stack is empty")]
    EmptyStack,
    #[error("cannot reference a collected {0} value")]
    Collected(&'static str),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("not enough memory to push a {type_name}")]
    OutOfMemory { type_name: &'static str },
    #[error("{type_name} needs {required}-byte alignment, more than runtime storage provides")]
    Alignment {
        type_name: &'static str,
        required: usize,
    },
    #[error("{type_name} handle was already finalized or collected")]
    Stale { type_name: &'static str },
    #[error("error in finalizer: {0}")]
    Collector(String),
    #[error("conversion failed: {0}")]
    Conversion(String),
}

/// Any failure of an engine operation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Failure(#[from] FailureReport),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
