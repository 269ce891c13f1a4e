//! Direct interpretation of a lowered MidIR compilation unit.

use crate::{
    runtime::{self, Runtime},
    InterpretationError, Result,
};
use mir::{CompilationUnit, Expression, Function, Statement, COMPILED_PROGRAM_MAIN};
use std::collections::HashMap;

/// Run `_compiled_program_main` and return everything it printed.
pub fn interpret_mir(unit: &CompilationUnit) -> Result<String> {
    let mut interpreter = MirInterpreter::new(unit)?;
    let main = unit
        .function(COMPILED_PROGRAM_MAIN)
        .ok_or(InterpretationError::MissingMain(COMPILED_PROGRAM_MAIN))?;
    interpreter.call(main, vec![])?;
    Ok(interpreter.runtime.into_printed())
}

struct MirInterpreter<'u> {
    functions: HashMap<&'u str, &'u Function>,
    /// Every function gets a word of its own, so its name has an address.
    function_addresses: HashMap<&'u str, i64>,
    functions_by_address: HashMap<i64, &'u Function>,
    runtime: Runtime,
}

#[derive(Default)]
struct StackFrame<'u> {
    locals: HashMap<&'u str, i64>,
}

impl<'u> StackFrame<'u> {
    fn get(&self, id: &str) -> i64 {
        self.locals.get(id).cloned().unwrap_or(0)
    }

    fn set(&mut self, id: &'u str, value: i64) {
        self.locals.insert(id, value);
    }
}

fn malformed<T>(reason: impl Into<String>) -> Result<T> {
    Err(InterpretationError::Malformed {
        reason: reason.into(),
    })
}

impl<'u> MirInterpreter<'u> {
    fn new(unit: &'u CompilationUnit) -> Result<Self> {
        let mut runtime = Runtime::new(&unit.global_variables)?;
        let mut functions = HashMap::new();
        let mut function_addresses = HashMap::new();
        let mut functions_by_address = HashMap::new();
        for function in &unit.functions {
            let address = runtime.malloc(8)?;
            functions.insert(function.function_name.as_str(), function);
            function_addresses.insert(function.function_name.as_str(), address);
            functions_by_address.insert(address, function);
        }
        Ok(MirInterpreter {
            functions,
            function_addresses,
            functions_by_address,
            runtime,
        })
    }

    fn eval(&self, frame: &StackFrame<'u>, expression: &Expression) -> Result<i64> {
        match expression {
            Expression::Constant { value } => Ok(*value),
            Expression::Name { name } => self
                .runtime
                .global(name)
                .or_else(|| self.function_addresses.get(name.as_str()).cloned())
                .ok_or_else(|| InterpretationError::UnknownLabel {
                    label: name.clone(),
                }),
            Expression::Temporary { id } => Ok(frame.get(id)),
            Expression::Op { operator, e1, e2 } => {
                let v1 = self.eval(frame, e1)?;
                let v2 = self.eval(frame, e2)?;
                operator
                    .evaluate(v1, v2)
                    .ok_or_else(|| InterpretationError::panic("Division by zero!"))
            }
            Expression::Mem { expression, .. } => {
                let address = self.eval(frame, expression)?;
                self.runtime.load(address)
            }
            Expression::Call { .. } | Expression::ExprSequence { .. } => {
                malformed(format!("unlowered expression {}", expression))
            }
        }
    }

    /// The function `expression` refers to, or `Err(name)` for a builtin.
    fn callee(
        &self,
        frame: &StackFrame<'u>,
        expression: &'u Expression,
    ) -> Result<std::result::Result<&'u Function, &'u str>> {
        if let Expression::Name { name } = expression {
            if runtime::is_builtin(name) {
                return Ok(Err(name.as_str()));
            }
            if let Some(function) = self.functions.get(name.as_str()) {
                return Ok(Ok(*function));
            }
        }
        let address = self.eval(frame, expression)?;
        self.functions_by_address
            .get(&address)
            .map(|function| Ok(*function))
            .ok_or(InterpretationError::UnknownFunction { address })
    }

    fn call(&mut self, function: &'u Function, arguments: Vec<i64>) -> Result<i64> {
        if arguments.len() != function.number_of_arguments() {
            return malformed(format!(
                "{} takes {} arguments but got {}",
                function.function_name,
                function.number_of_arguments(),
                arguments.len()
            ));
        }
        log::trace!("call {}{:?}", function.function_name, arguments);

        let mut frame = StackFrame::default();
        for (temp, value) in function.argument_temps.iter().zip(arguments) {
            frame.set(temp, value);
        }
        let statements = &function.main_body_statements;
        let labels = statements
            .iter()
            .enumerate()
            .filter_map(|(idx, statement)| match statement {
                Statement::Label { name } => Some((name.as_str(), idx)),
                _ => None,
            })
            .collect::<HashMap<_, _>>();
        let jump = |label: &str| {
            labels
                .get(label)
                .cloned()
                .ok_or_else(|| InterpretationError::UnknownLabel {
                    label: label.to_string(),
                })
        };

        let mut pc = 0;
        while let Some(statement) = statements.get(pc) {
            pc += 1;
            match statement {
                Statement::MoveTemp {
                    temporary_id,
                    source,
                } => {
                    let value = self.eval(&frame, source)?;
                    frame.set(temporary_id, value);
                }
                Statement::MoveMem {
                    memory_index_expression,
                    source,
                } => {
                    let address = self.eval(&frame, memory_index_expression)?;
                    let value = self.eval(&frame, source)?;
                    self.runtime.store(address, value)?;
                }
                Statement::CallFunction {
                    function_expression,
                    arguments,
                    return_collector,
                } => {
                    let mut values = Vec::with_capacity(arguments.len());
                    for argument in arguments {
                        values.push(self.eval(&frame, argument)?);
                    }
                    let result = match self.callee(&frame, function_expression)? {
                        Ok(callee) => self.call(callee, values)?,
                        Err(builtin) => match self.runtime.call_builtin(builtin, &values) {
                            Some(result) => result?,
                            None => return malformed(format!("{} is no builtin", builtin)),
                        },
                    };
                    if let Some(collector) = return_collector {
                        frame.set(collector, result);
                    }
                }
                Statement::Jump { label } => pc = jump(label)?,
                Statement::ConditionalJumpFallThrough { condition, label1 } => {
                    if self.eval(&frame, condition)? != 0 {
                        pc = jump(label1)?;
                    }
                }
                Statement::ConditionalJump {
                    condition,
                    label1,
                    label2,
                } => {
                    pc = if self.eval(&frame, condition)? != 0 {
                        jump(label1)?
                    } else {
                        jump(label2)?
                    };
                }
                Statement::Label { .. } => (),
                Statement::Return { return_value } => {
                    return match return_value {
                        Some(value) => self.eval(&frame, value),
                        None => Ok(0),
                    };
                }
                Statement::Sequence { .. } => {
                    return malformed(format!("unlowered statement {}", statement));
                }
            }
        }
        Ok(0)
    }
}
