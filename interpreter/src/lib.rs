//! Interpreters for MidIR and for the generated assembly.
//!
//! Both share one word-addressed [`runtime::Runtime`], so a program prints
//! the same output under both whenever the backend is correct.
#![warn(rust_2018_idioms)]
#![warn(clippy::print_stdout)]
#![warn(clippy::all)]

pub mod asm_interpreter;
pub mod mir_interpreter;
pub mod runtime;

pub use self::{asm_interpreter::interpret_assembly, mir_interpreter::interpret_mir};
use failure::Fail;

#[derive(Debug, Fail, PartialEq, Eq)]
pub enum InterpretationError {
    /// The interpreted program panicked. This is user-visible behavior, not
    /// a fault of the interpreter or the compiler.
    #[fail(display = "{}", message)]
    Panic { message: String },
    #[fail(display = "unaligned memory access at {} (word size is 8)", address)]
    UnalignedAccess { address: i64 },
    #[fail(display = "segmentation fault at {}", address)]
    SegmentationFault { address: i64 },
    #[fail(display = "cannot allocate {} bytes", size)]
    BadAllocation { size: i64 },
    #[fail(display = "unknown label or symbol {}", label)]
    UnknownLabel { label: String },
    #[fail(display = "no function at address {}", address)]
    UnknownFunction { address: i64 },
    #[fail(display = "call with stack pointer {:#x}, which is not 16 byte aligned", rsp)]
    MisalignedCall { rsp: i64 },
    #[fail(display = "callee-saved register {} was not restored", register)]
    CalleeSavedClobbered { register: String },
    #[fail(display = "the program has no {} function", _0)]
    MissingMain(&'static str),
    #[fail(display = "cannot interpret {}", reason)]
    Malformed { reason: String },
}

impl InterpretationError {
    pub fn panic(message: impl Into<String>) -> Self {
        InterpretationError::Panic {
            message: message.into(),
        }
    }

    pub fn is_panic(&self) -> bool {
        match self {
            InterpretationError::Panic { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, InterpretationError>;
