//! The x86-64 backend: instruction selection by tiling MidIR trees, then
//! register allocation by iterated register coalescing.
#![warn(rust_2018_idioms)]
#![warn(clippy::print_stdout)]
#![warn(clippy::all)]

#[macro_use]
extern crate derive_more;

pub mod abstract_register;
pub mod allocator;
pub mod amd64;
pub mod function;
pub mod interference;
pub mod live_variable_analysis;
mod peephole;
pub mod tiling;

use crate::amd64::{Amd64Reg, AssemblyProgram};
use failure::Fail;
use mir::CompilationUnit;

/// Fatal internal compiler errors. Well-formed input never produces them.
#[derive(Debug, Fail)]
pub enum BackendError {
    #[fail(display = "backend invariant violated: {}", reason)]
    InvariantViolation { reason: String },
    #[fail(
        display = "register allocation for {} did not converge after {} rounds",
        function, rounds
    )]
    NonConvergence { function: String, rounds: usize },
}

#[derive(Debug, Clone)]
pub struct Options {
    /// Drop comments, fall-through jumps and unreferenced labels.
    pub remove_comments: bool,
    /// Verify the allocator's worklist invariants after every step.
    pub check_invariants: bool,
    /// The colors the allocator may use, in the order it tries them.
    pub available_registers: Vec<Amd64Reg>,
    /// Keep every temporary in a stack slot. Only the short-lived reload
    /// registers get colors. Slow, but easy to debug.
    pub naive_allocation: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            remove_comments: true,
            check_invariants: false,
            available_registers: Amd64Reg::all_but_rsp_and_rbp().collect(),
            naive_allocation: false,
        }
    }
}

impl Options {
    /// Restrict allocation to the first `count` default colors.
    pub fn with_register_count(mut self, count: usize) -> Self {
        self.available_registers = Amd64Reg::all_but_rsp_and_rbp().take(count).collect();
        self
    }
}

/// Compile every function of `unit` and assemble the result.
pub fn run_backend(
    unit: &CompilationUnit,
    options: &Options,
) -> Result<AssemblyProgram, BackendError> {
    let mut instructions = vec![];
    for function in &unit.functions {
        instructions.extend(function::generate_function(function, options)?);
    }
    let public_functions = unit
        .functions
        .iter()
        .filter(|function| function.is_public)
        .map(|function| function.function_name.clone())
        .collect();
    Ok(AssemblyProgram {
        global_variables: unit.global_variables.clone(),
        public_functions,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mir::{Expression as E, Function, GlobalVariable, Statement as S};

    #[test]
    fn options_default_works() {
        let options = Options::default();
        assert!(options.remove_comments);
        assert!(!options.check_invariants);
        assert_eq!(14, options.available_registers.len());
        assert_eq!(
            vec![Amd64Reg::Di, Amd64Reg::Si, Amd64Reg::D],
            Options::default().with_register_count(3).available_registers
        );
    }

    #[test]
    fn run_backend_works() {
        let unit = CompilationUnit {
            global_variables: vec![GlobalVariable {
                name: "GLOBAL_STRING_0".to_string(),
                content: "ok".to_string(),
            }],
            functions: vec![
                Function {
                    function_name: "helper".to_string(),
                    argument_temps: vec!["x".to_string()],
                    main_body_statements: vec![S::ret(Some(E::op(
                        mir::Operator::Add,
                        E::temp("x"),
                        E::constant(1),
                    )))],
                    has_return: true,
                    is_public: false,
                },
                Function {
                    function_name: mir::COMPILED_PROGRAM_MAIN.to_string(),
                    argument_temps: vec![],
                    main_body_statements: vec![S::call(
                        E::name("_builtin_println"),
                        vec![E::name("GLOBAL_STRING_0")],
                        None,
                    )],
                    has_return: false,
                    is_public: true,
                },
            ],
        };
        let program = run_backend(&unit, &Options::default()).unwrap();
        assert_eq!(
            vec![mir::COMPILED_PROGRAM_MAIN.to_string()],
            program.public_functions
        );
        let text = program.to_string();
        assert!(text.contains("\nhelper:\n"));
        assert!(text.contains("call _builtin_println"));
        assert!(text.contains("GLOBAL_STRING_0:"));
        assert!(!text.contains("_ABSTRACT_REG_"));
        assert!(!text.contains("prologue starts"));
    }
}
