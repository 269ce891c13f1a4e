//! The mid-level IR consumed by the backend.
//!
//! MidIR is a tree IR of side-effect free expressions and statements that
//! move values, call functions and transfer control. By the time a
//! compilation unit reaches the backend it has been lowered to a restricted
//! grammar: no `ExprSequence`, no `Call` expression, no nested `Sequence`
//! and only fall-through conditional jumps. The types here still model the
//! full grammar, so earlier phases (and tests) can construct it.
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]

#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate serde_derive;

mod expression;
mod statement;
mod unit;

pub use self::{
    expression::{Expression, Operator},
    statement::Statement,
    unit::{CompilationUnit, Function, GlobalVariable},
};

/// Name of the function a compiled program starts executing in.
pub const COMPILED_PROGRAM_MAIN: &str = "_compiled_program_main";
