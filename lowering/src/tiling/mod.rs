//! Instruction selection by tree tiling.
//!
//! Every MidIR statement is covered by a sequence of instruction patterns.
//! Binary expressions are tiled by several competing tilers and the one with
//! the lowest estimated cost wins. Results are memoized by structural
//! identity: expressions per statement, statements per function.

mod memory;

use crate::{
    abstract_register::{AbstractRegisterSource, ABSTRACT_REG_PREFIX},
    allocator::callee_saved::STORAGE_PREFIX,
    amd64::{
        AlBinaryOpType, Amd64Reg, Arg, Const, ConstOrReg, Instruction, JumpType, Mem, Reg,
        RegOrMem, ShiftType,
    },
    BackendError,
};
use mir::{Expression, Operator, Statement};
use std::collections::HashMap;

/// The label every `return` jumps to. The epilogue follows it.
pub fn epilogue_label(function_name: &str) -> String {
    format!("LABEL_FUNCTION_CALL_EPILOGUE_FOR_{}", function_name)
}

/// Estimated cost of executing an instruction.
pub fn instruction_cost(instr: &Instruction) -> u32 {
    use crate::amd64::Instruction::*;
    let memory_access = |is_mem: bool| if is_mem { 1 } else { 0 };
    match instr {
        Comment { .. } | Label { .. } => 0,
        MoveFromLong { .. } | LoadEffectiveAddress { .. } => 1,
        MoveToMem { .. } => 2,
        MoveToReg { src, .. } => 1 + memory_access(is_mem_arg(src)),
        CmpConstOrReg { minuend, .. } => 1 + memory_access(is_mem(minuend)),
        CmpMem { .. } => 2,
        AlBinaryOpMemDest { .. } => 2,
        AlBinaryOpRegDest { src, .. } => 1 + memory_access(is_mem_arg(src)),
        IMulOneArg { .. } | IMulTwoArgs { .. } | IMulThreeArgs { .. } => 3,
        IDiv { .. } => 25,
        CallAddress { .. } => 10,
        AlUnaryOp { dest, .. } | Shift { dest, .. } | Pop { dest } => {
            1 + memory_access(is_mem(dest))
        }
        Push { arg } | JumpAddress { arg, .. } => 1 + memory_access(is_mem_arg(arg)),
        SetOnFlag { .. } | JumpLabel { .. } | Return | Cqo => 1,
    }
}

fn is_mem(operand: &RegOrMem) -> bool {
    match operand {
        RegOrMem::Mem(_) => true,
        RegOrMem::Reg(_) => false,
    }
}

fn is_mem_arg(operand: &Arg) -> bool {
    match operand {
        Arg::Mem(_) => true,
        _ => false,
    }
}

pub fn instructions_cost(instructions: &[Instruction]) -> u32 {
    instructions.iter().map(instruction_cost).sum()
}

/// Instructions that compute an operand.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tiled<T> {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) operand: T,
}

impl<T> Tiled<T> {
    fn new(instructions: Vec<Instruction>, operand: T) -> Self {
        Tiled {
            instructions,
            operand,
        }
    }

    fn operand_only(operand: T) -> Self {
        Tiled::new(vec![], operand)
    }

    pub(crate) fn cost(&self) -> u32 {
        instructions_cost(&self.instructions)
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Tiled<U> {
        Tiled {
            instructions: self.instructions,
            operand: f(self.operand),
        }
    }
}

/// Keeps the cheaper of two candidates, preferring `current` on ties.
fn cheaper<T>(current: Option<Tiled<T>>, candidate: Tiled<T>) -> Tiled<T> {
    match current {
        Some(current) if current.cost() <= candidate.cost() => current,
        _ => candidate,
    }
}

fn invariant<T>(reason: impl Into<String>) -> Result<T, BackendError> {
    Err(BackendError::InvariantViolation {
        reason: reason.into(),
    })
}

/// The register a MidIR temporary lives in before allocation.
///
/// Temporaries must not use the names of machine registers or of registers
/// the backend generates itself.
pub(crate) fn temp_reg(id: &str) -> Result<Reg, BackendError> {
    if Reg::is_reserved_name(id) {
        return invariant(format!("temporary `{}` shadows a machine register", id));
    }
    if id.starts_with(ABSTRACT_REG_PREFIX) || id.starts_with(STORAGE_PREFIX) {
        return invariant(format!("temporary `{}` uses a backend register name", id));
    }
    Ok(Reg::new(id))
}

pub(crate) struct Tiler<'s> {
    function_name: String,
    source: &'s mut AbstractRegisterSource,
    expression_cache: HashMap<Expression, Tiled<Reg>>,
    statement_cache: HashMap<Statement, Vec<Instruction>>,
}

/// Tile the body of one function. The result ends with the function's
/// epilogue label and contains no `ret`.
pub fn tile_function(
    function_name: &str,
    statements: &[Statement],
    source: &mut AbstractRegisterSource,
) -> Result<Vec<Instruction>, BackendError> {
    let mut tiler = Tiler::new(function_name, source);
    let mut instructions = vec![];
    for statement in statements {
        instructions.extend(tiler.tile_statement(statement)?);
    }
    instructions.push(Instruction::label(epilogue_label(function_name)));
    Ok(instructions)
}

impl<'s> Tiler<'s> {
    pub(crate) fn new(function_name: &str, source: &'s mut AbstractRegisterSource) -> Self {
        Tiler {
            function_name: function_name.to_string(),
            source,
            expression_cache: HashMap::new(),
            statement_cache: HashMap::new(),
        }
    }

    fn next_reg(&mut self) -> Reg {
        self.source.next_reg()
    }

    pub(crate) fn tile_statement(
        &mut self,
        statement: &Statement,
    ) -> Result<Vec<Instruction>, BackendError> {
        if let Some(instructions) = self.statement_cache.get(statement) {
            return Ok(instructions.clone());
        }
        self.expression_cache.clear();
        let instructions = self.tile_statement_uncached(statement)?;
        log::debug!(
            "tiled `{}` into {} instructions",
            statement,
            instructions.len()
        );
        self.statement_cache
            .insert(statement.clone(), instructions.clone());
        Ok(instructions)
    }

    fn tile_statement_uncached(
        &mut self,
        statement: &Statement,
    ) -> Result<Vec<Instruction>, BackendError> {
        match statement {
            Statement::MoveTemp {
                temporary_id,
                source,
            } => {
                let dest = temp_reg(temporary_id)?;
                let Tiled {
                    mut instructions,
                    operand,
                } = self.tile_arg(source)?;
                instructions.push(Instruction::mov(dest, operand));
                Ok(instructions)
            }
            Statement::MoveMem {
                memory_index_expression,
                source,
            } => {
                let Tiled {
                    mut instructions,
                    operand: dest,
                } = self.tile_memory(memory_index_expression)?;
                let src = self.tile_const_or_reg(source)?;
                instructions.extend(src.instructions);
                instructions.push(Instruction::mov_to_mem(dest, src.operand));
                Ok(instructions)
            }
            Statement::CallFunction {
                function_expression,
                arguments,
                return_collector,
            } => self.tile_call(
                statement,
                function_expression,
                arguments,
                return_collector.as_ref().map(String::as_str),
            ),
            Statement::Jump { label } => Ok(vec![Instruction::jump(JumpType::Jmp, label.clone())]),
            Statement::Label { name } => Ok(vec![Instruction::label(name.clone())]),
            Statement::ConditionalJumpFallThrough { condition, label1 } => {
                let mut instructions = vec![Instruction::comment(statement.to_string())];
                if let Expression::Op { operator, e1, e2 } = condition {
                    if let Some(jump_type) = JumpType::for_comparison(*operator) {
                        let e1 = self.tile_expression(e1)?;
                        let e2 = self.tile_const_or_reg(e2)?;
                        instructions.extend(e1.instructions);
                        instructions.extend(e2.instructions);
                        instructions.push(Instruction::CmpConstOrReg {
                            minuend: RegOrMem::Reg(e1.operand),
                            subtrahend: e2.operand,
                        });
                        instructions.push(Instruction::jump(jump_type, label1.clone()));
                        return Ok(instructions);
                    }
                }
                let condition = self.tile_reg_or_mem(condition)?;
                instructions.extend(condition.instructions);
                instructions.push(Instruction::CmpConstOrReg {
                    minuend: condition.operand,
                    subtrahend: ConstOrReg::Const(Const::Int(0)),
                });
                instructions.push(Instruction::jump(JumpType::Jnz, label1.clone()));
                Ok(instructions)
            }
            Statement::Return { return_value } => {
                let mut instructions = vec![Instruction::comment(statement.to_string())];
                if let Some(value) = return_value {
                    let value = self.tile_arg(value)?;
                    instructions.extend(value.instructions);
                    instructions.push(Instruction::mov(Reg::machine(Amd64Reg::A), value.operand));
                }
                instructions.push(Instruction::jump(
                    JumpType::Jmp,
                    epilogue_label(&self.function_name),
                ));
                Ok(instructions)
            }
            Statement::Sequence { .. } => invariant(format!(
                "sequence statement reached the backend: {}",
                statement
            )),
            Statement::ConditionalJump { .. } => invariant(format!(
                "two-target conditional jump reached the backend: {}",
                statement
            )),
        }
    }

    /// Lays out a call following the System V calling convention: the first
    /// six arguments in registers, the rest pushed right to left with the
    /// stack kept 16 byte aligned.
    fn tile_call(
        &mut self,
        statement: &Statement,
        function_expression: &Expression,
        arguments: &[Expression],
        return_collector: Option<&str>,
    ) -> Result<Vec<Instruction>, BackendError> {
        let mut instructions = vec![Instruction::comment(statement.to_string())];
        let address = match function_expression {
            Expression::Name { name } => Arg::Const(Const::Name(name.clone())),
            _ => {
                let tiled = self.tile_arg(function_expression)?;
                instructions.extend(tiled.instructions);
                tiled.operand
            }
        };
        let mut tiled_arguments = Vec::with_capacity(arguments.len());
        for argument in arguments {
            let tiled = self.tile_arg(argument)?;
            instructions.extend(tiled.instructions);
            tiled_arguments.push(tiled.operand);
        }
        let collector = match return_collector {
            Some(id) => Some(temp_reg(id)?),
            None => None,
        };

        instructions.push(Instruction::comment(format!(
            "We are about to call {}",
            function_expression
        )));
        let stack_arguments = tiled_arguments.len().saturating_sub(6);
        let padding = stack_arguments % 2;
        let rsp = Reg::machine(Amd64Reg::Sp);
        if stack_arguments > 0 && padding > 0 {
            instructions.push(Instruction::binop(
                AlBinaryOpType::Sub,
                rsp.clone(),
                Const::Int(8 * padding as i32),
            ));
        }
        let arguments = tiled_arguments.len();
        for (idx, argument) in tiled_arguments.into_iter().enumerate().rev() {
            match Amd64Reg::arg(idx) {
                Some(reg) => instructions.push(Instruction::mov(Reg::machine(reg), argument)),
                None => instructions.push(Instruction::Push { arg: argument }),
            }
        }
        instructions.push(Instruction::CallAddress { address, arguments });
        if let Some(collector) = collector {
            instructions.push(Instruction::mov(collector, Reg::machine(Amd64Reg::A)));
        }
        if stack_arguments > 0 {
            instructions.push(Instruction::binop(
                AlBinaryOpType::Add,
                rsp,
                Const::Int(8 * (stack_arguments + padding) as i32),
            ));
        }
        instructions.push(Instruction::comment(format!(
            "We finished calling {}",
            function_expression
        )));
        Ok(instructions)
    }

    /// Tile an expression into a register.
    pub(crate) fn tile_expression(
        &mut self,
        expression: &Expression,
    ) -> Result<Tiled<Reg>, BackendError> {
        if let Some(tiled) = self.expression_cache.get(expression) {
            return Ok(tiled.clone());
        }
        let tiled = self.tile_expression_uncached(expression)?;
        self.expression_cache
            .insert(expression.clone(), tiled.clone());
        Ok(tiled)
    }

    fn tile_expression_uncached(
        &mut self,
        expression: &Expression,
    ) -> Result<Tiled<Reg>, BackendError> {
        match expression {
            Expression::Constant { value } => {
                let reg = self.next_reg();
                let instr = match expression.as_i32_constant() {
                    Some(value) => Instruction::mov(reg.clone(), Const::Int(value)),
                    None => Instruction::MoveFromLong {
                        dest: reg.clone(),
                        value: *value,
                    },
                };
                Ok(Tiled::new(vec![instr], reg))
            }
            Expression::Name { name } => {
                // a name only denotes an address relative to rip
                let reg = self.next_reg();
                Ok(Tiled::new(
                    vec![Instruction::LoadEffectiveAddress {
                        dest: reg.clone(),
                        mem: Mem::rip_relative(name.clone()),
                    }],
                    reg,
                ))
            }
            Expression::Temporary { id } => Ok(Tiled::operand_only(temp_reg(id)?)),
            Expression::Mem { expression: index, .. } => {
                let mem = self.tile_memory(index)?;
                let reg = self.next_reg();
                let mut instructions = vec![Instruction::comment(expression.to_string())];
                instructions.extend(mem.instructions);
                instructions.push(Instruction::mov(reg.clone(), mem.operand));
                Ok(Tiled::new(instructions, reg))
            }
            Expression::Op { operator, e1, e2 } => self.tile_binary(expression, *operator, e1, e2),
            Expression::Call { .. } => invariant(format!(
                "call expression reached the backend: {}",
                expression
            )),
            Expression::ExprSequence { .. } => invariant(format!(
                "expression sequence reached the backend: {}",
                expression
            )),
        }
    }

    /// Runs every binary tiler and keeps the cheapest result. Each tiler may
    /// allocate registers even if its result is discarded.
    fn tile_binary(
        &mut self,
        expression: &Expression,
        operator: Operator,
        e1: &Expression,
        e2: &Expression,
    ) -> Result<Tiled<Reg>, BackendError> {
        let candidates = vec![
            self.tile_generic(expression, operator, e1, e2)?,
            self.tile_commutative_reversed(expression, operator, e1, e2)?,
            self.tile_comparison(expression, operator, e1, e2)?,
            self.tile_lea(expression)?,
            self.tile_imul_three_args(expression, operator, e1, e2)?,
            self.tile_power_of_two_multiplication(expression, operator, e1, e2)?,
        ];
        let mut best: Option<Tiled<Reg>> = None;
        for candidate in candidates.into_iter().flatten() {
            best = match best {
                Some(best) if best.cost() <= candidate.cost() => Some(best),
                _ => Some(candidate),
            };
        }
        match best {
            Some(best) => Ok(best),
            None => invariant(format!("no tiling applies to {}", expression)),
        }
    }

    fn tile_generic(
        &mut self,
        expression: &Expression,
        operator: Operator,
        e1: &Expression,
        e2: &Expression,
    ) -> Result<Option<Tiled<Reg>>, BackendError> {
        match operator {
            Operator::Add
            | Operator::Sub
            | Operator::Xor
            | Operator::And
            | Operator::Or
            | Operator::Mul
            | Operator::Div
            | Operator::Mod => (),
            _ => return Ok(None),
        }
        let result = self.next_reg();
        let e1 = self.tile_arg(e1)?;
        let e2 = self.tile_reg_or_mem(e2)?;
        let mut instructions = vec![Instruction::comment(format!(
            "generic binary tiling: {}",
            expression
        ))];
        instructions.extend(e1.instructions);
        instructions.extend(e2.instructions);
        let rax = Reg::machine(Amd64Reg::A);
        match operator {
            Operator::Mul => {
                instructions.push(Instruction::mov(result.clone(), e1.operand));
                instructions.push(Instruction::IMulTwoArgs {
                    dest: result.clone(),
                    src: e2.operand,
                });
            }
            Operator::Div | Operator::Mod => {
                let quotient_or_remainder = if operator == Operator::Div {
                    rax.clone()
                } else {
                    Reg::machine(Amd64Reg::D)
                };
                instructions.push(Instruction::mov(rax, e1.operand));
                instructions.push(Instruction::Cqo);
                instructions.push(Instruction::IDiv {
                    divisor: e2.operand,
                });
                instructions.push(Instruction::mov(result.clone(), quotient_or_remainder));
            }
            _ => {
                let op = alu_op(operator)?;
                instructions.push(Instruction::mov(result.clone(), e1.operand));
                instructions.push(Instruction::binop(op, result.clone(), e2.operand));
            }
        }
        Ok(Some(Tiled::new(instructions, result)))
    }

    fn tile_commutative_reversed(
        &mut self,
        expression: &Expression,
        operator: Operator,
        e1: &Expression,
        e2: &Expression,
    ) -> Result<Option<Tiled<Reg>>, BackendError> {
        match operator {
            Operator::Add | Operator::Mul | Operator::Xor | Operator::And | Operator::Or => (),
            _ => return Ok(None),
        }
        let result = self.next_reg();
        let e2 = self.tile_expression(e2)?;
        let e1 = self.tile_reg_or_mem(e1)?;
        let mut instructions = vec![Instruction::comment(format!(
            "reversed commutative tiling: {}",
            expression
        ))];
        instructions.extend(e2.instructions);
        instructions.extend(e1.instructions);
        instructions.push(Instruction::mov(result.clone(), e2.operand));
        if operator == Operator::Mul {
            instructions.push(Instruction::IMulTwoArgs {
                dest: result.clone(),
                src: e1.operand,
            });
        } else {
            instructions.push(Instruction::binop(
                alu_op(operator)?,
                result.clone(),
                e1.operand,
            ));
        }
        Ok(Some(Tiled::new(instructions, result)))
    }

    fn tile_comparison(
        &mut self,
        expression: &Expression,
        operator: Operator,
        e1: &Expression,
        e2: &Expression,
    ) -> Result<Option<Tiled<Reg>>, BackendError> {
        let jump_type = match JumpType::for_comparison(operator) {
            Some(jump_type) => jump_type,
            None => return Ok(None),
        };
        let result = self.next_reg();
        let e1 = self.tile_expression(e1)?;
        let e2 = self.tile_expression(e2)?;
        let rax = Reg::machine(Amd64Reg::A);
        let mut instructions = vec![Instruction::comment(format!(
            "comparison tiling: {}",
            expression
        ))];
        instructions.extend(e1.instructions);
        instructions.extend(e2.instructions);
        instructions.push(Instruction::CmpConstOrReg {
            minuend: RegOrMem::Reg(e1.operand),
            subtrahend: ConstOrReg::Reg(e2.operand),
        });
        instructions.push(Instruction::SetOnFlag {
            jump_type,
            reg: rax.clone(),
        });
        instructions.push(Instruction::mov(result.clone(), rax));
        Ok(Some(Tiled::new(instructions, result)))
    }

    fn tile_lea(&mut self, expression: &Expression) -> Result<Option<Tiled<Reg>>, BackendError> {
        let result = self.next_reg();
        let mem = match memory::tile_address(self, expression)? {
            Some(mem) => mem,
            None => return Ok(None),
        };
        let mut instructions = vec![Instruction::comment(format!("lea tiling: {}", expression))];
        instructions.extend(mem.instructions);
        instructions.push(Instruction::LoadEffectiveAddress {
            dest: result.clone(),
            mem: mem.operand,
        });
        Ok(Some(Tiled::new(instructions, result)))
    }

    fn tile_imul_three_args(
        &mut self,
        expression: &Expression,
        operator: Operator,
        e1: &Expression,
        e2: &Expression,
    ) -> Result<Option<Tiled<Reg>>, BackendError> {
        let immediate = match (operator, e2.as_i32_constant()) {
            (Operator::Mul, Some(immediate)) => immediate,
            _ => return Ok(None),
        };
        let src = self.tile_reg_or_mem(e1)?;
        let result = self.next_reg();
        let mut instructions = vec![Instruction::comment(format!(
            "three operand imul tiling: {}",
            expression
        ))];
        instructions.extend(src.instructions);
        instructions.push(Instruction::IMulThreeArgs {
            dest: result.clone(),
            src: src.operand,
            immediate: Const::Int(immediate),
        });
        Ok(Some(Tiled::new(instructions, result)))
    }

    fn tile_power_of_two_multiplication(
        &mut self,
        expression: &Expression,
        operator: Operator,
        e1: &Expression,
        e2: &Expression,
    ) -> Result<Option<Tiled<Reg>>, BackendError> {
        let count = match (operator, e2) {
            (Operator::Mul, Expression::Constant { value })
                if *value > 0 && (*value & (*value - 1)) == 0 =>
            {
                value.trailing_zeros() as u8
            }
            _ => return Ok(None),
        };
        let result = self.next_reg();
        let e1 = self.tile_arg(e1)?;
        let mut instructions = vec![Instruction::comment(format!(
            "power of two multiplication tiling: {}",
            expression
        ))];
        instructions.extend(e1.instructions);
        instructions.push(Instruction::mov(result.clone(), e1.operand));
        instructions.push(Instruction::Shift {
            op: ShiftType::Shl,
            dest: RegOrMem::Reg(result.clone()),
            count,
        });
        Ok(Some(Tiled::new(instructions, result)))
    }

    /// Small constants become immediates, everything else a register.
    fn tile_const_or_reg(
        &mut self,
        expression: &Expression,
    ) -> Result<Tiled<ConstOrReg>, BackendError> {
        if let Some(value) = expression.as_i32_constant() {
            return Ok(Tiled::operand_only(ConstOrReg::Const(Const::Int(value))));
        }
        Ok(self.tile_expression(expression)?.map(ConstOrReg::Reg))
    }

    /// Loads become memory operands, everything else a register.
    fn tile_reg_or_mem(&mut self, expression: &Expression) -> Result<Tiled<RegOrMem>, BackendError> {
        if let Expression::Mem { expression, .. } = expression {
            return Ok(self.tile_memory(expression)?.map(RegOrMem::Mem));
        }
        Ok(self.tile_expression(expression)?.map(RegOrMem::Reg))
    }

    fn tile_arg(&mut self, expression: &Expression) -> Result<Tiled<Arg>, BackendError> {
        if let Some(value) = expression.as_i32_constant() {
            return Ok(Tiled::operand_only(Arg::Const(Const::Int(value))));
        }
        if let Expression::Mem { expression, .. } = expression {
            return Ok(self.tile_memory(expression)?.map(Arg::Mem));
        }
        Ok(self.tile_expression(expression)?.map(Arg::Reg))
    }

    /// The memory operand for the word at address `index`.
    fn tile_memory(&mut self, index: &Expression) -> Result<Tiled<Mem>, BackendError> {
        if let Expression::Name { name } = index {
            return Ok(Tiled::operand_only(Mem::rip_relative(name.clone())));
        }
        if let Some(mem) = memory::tile_address(self, index)? {
            return Ok(mem);
        }
        Ok(self.tile_expression(index)?.map(Mem::reg))
    }
}

fn alu_op(operator: Operator) -> Result<AlBinaryOpType, BackendError> {
    match AlBinaryOpType::for_operator(operator) {
        Some(op) => Ok(op),
        None => invariant(format!("`{}` is not an ALU operator", operator)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mir::Expression as E;

    fn tile(statement: Statement) -> Vec<String> {
        let mut source = AbstractRegisterSource::new();
        let mut tiler = Tiler::new("test", &mut source);
        tiler
            .tile_statement(&statement)
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn without_comments(lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .filter(|line| !line.starts_with("##"))
            .collect()
    }

    #[test]
    fn move_temp_works() {
        assert_eq!(
            vec!["mov foo, bar"],
            tile(Statement::move_temp("foo", E::temp("bar")))
        );
    }

    #[test]
    fn move_large_constant_works() {
        assert_eq!(
            vec![
                "movabs _ABSTRACT_REG_0, 1000000000000",
                "mov a, _ABSTRACT_REG_0"
            ],
            tile(Statement::move_temp("a", E::constant(1_000_000_000_000)))
        );
    }

    #[test]
    fn multiplication_by_power_of_two_uses_shift() {
        let lines = tile(Statement::move_temp(
            "t",
            E::op(Operator::Mul, E::constant(1), E::constant(65536)),
        ));
        assert!(lines.contains(&"shl _ABSTRACT_REG_6, 16".to_string()));
        assert!(!lines.iter().any(|line| line.starts_with("imul")));
        assert_eq!(
            vec![
                "mov _ABSTRACT_REG_6, 1",
                "shl _ABSTRACT_REG_6, 16",
                "mov t, _ABSTRACT_REG_6"
            ],
            without_comments(lines)
        );
    }

    #[test]
    fn move_mem_works() {
        assert_eq!(
            vec!["mov qword ptr [1], 0"],
            tile(Statement::move_mem(E::constant(1), E::constant(0)))
        );
        assert_eq!(
            vec!["mov qword ptr [a+8], b"],
            tile(Statement::move_mem(
                E::op(Operator::Add, E::temp("a"), E::constant(8)),
                E::temp("b")
            ))
        );
    }

    #[test]
    fn call_with_seven_arguments_works() {
        let arguments = (1..=7).map(E::constant).collect();
        let lines = without_comments(tile(Statement::call(
            E::name("f"),
            arguments,
            Some("r"),
        )));
        assert_eq!(
            vec![
                "sub rsp, 8",
                "push 7",
                "mov r9, 6",
                "mov r8, 5",
                "mov rcx, 4",
                "mov rdx, 3",
                "mov rsi, 2",
                "mov rdi, 1",
                "call f",
                "mov r, rax",
                "add rsp, 16",
            ],
            lines
        );
    }

    #[test]
    fn call_with_eight_arguments_works() {
        let arguments = (1..=8).map(E::constant).collect();
        let lines = without_comments(tile(Statement::call(E::name("f"), arguments, None)));
        assert_eq!(
            vec![
                "push 8",
                "push 7",
                "mov r9, 6",
                "mov r8, 5",
                "mov rcx, 4",
                "mov rdx, 3",
                "mov rsi, 2",
                "mov rdi, 1",
                "call f",
                "add rsp, 16",
            ],
            lines
        );
    }

    #[test]
    fn call_comments_work() {
        let lines = tile(Statement::call(E::name("f"), vec![], None));
        assert_eq!(
            vec![
                "## f();",
                "## We are about to call f",
                "call f",
                "## We finished calling f"
            ],
            lines
        );
    }

    #[test]
    fn call_through_register_works() {
        let lines = without_comments(tile(Statement::call(E::temp("fp"), vec![], None)));
        assert_eq!(vec!["call fp"], lines);
    }

    #[test]
    fn return_jumps_to_epilogue() {
        assert_eq!(
            vec![
                "## return 0;",
                "mov rax, 0",
                "jmp LABEL_FUNCTION_CALL_EPILOGUE_FOR_test"
            ],
            tile(Statement::ret(Some(E::constant(0))))
        );
        assert_eq!(
            vec!["## return;", "jmp LABEL_FUNCTION_CALL_EPILOGUE_FOR_test"],
            tile(Statement::ret(None))
        );
    }

    #[test]
    fn conditional_jump_on_comparison_works() {
        let lines = without_comments(tile(Statement::cjump_fallthrough(
            E::op(Operator::Lt, E::temp("a"), E::constant(3)),
            "l",
        )));
        assert_eq!(vec!["cmp a, 3", "jl l"], lines);
    }

    #[test]
    fn conditional_jump_on_value_works() {
        let lines = without_comments(tile(Statement::cjump_fallthrough(E::temp("a"), "l")));
        assert_eq!(vec!["cmp a, 0", "jnz l"], lines);
        let lines = without_comments(tile(Statement::cjump_fallthrough(
            E::mem(E::temp("p")),
            "l",
        )));
        assert_eq!(vec!["cmp qword ptr [p], 0", "jnz l"], lines);
    }

    #[test]
    fn comparison_value_uses_set() {
        let lines = without_comments(tile(Statement::move_temp(
            "x",
            E::op(Operator::Eq, E::temp("a"), E::temp("b")),
        )));
        assert_eq!(
            vec![
                "cmp a, b",
                "sete al\nmovzx rax, al",
                "mov _ABSTRACT_REG_0, rax",
                "mov x, _ABSTRACT_REG_0"
            ],
            lines
        );
    }

    #[test]
    fn division_uses_idiv() {
        let lines = without_comments(tile(Statement::move_temp(
            "q",
            E::op(Operator::Div, E::temp("a"), E::temp("b")),
        )));
        assert_eq!(
            vec![
                "mov rax, a",
                "cqo",
                "idiv b",
                "mov _ABSTRACT_REG_0, rax",
                "mov q, _ABSTRACT_REG_0"
            ],
            lines
        );
        let lines = without_comments(tile(Statement::move_temp(
            "r",
            E::op(Operator::Mod, E::temp("a"), E::temp("b")),
        )));
        assert!(lines.contains(&"mov _ABSTRACT_REG_0, rdx".to_string()));
    }

    #[test]
    fn addition_prefers_lea() {
        let lines = without_comments(tile(Statement::move_temp(
            "x",
            E::op(Operator::Add, E::temp("a"), E::constant(8)),
        )));
        assert_eq!(
            vec!["lea _ABSTRACT_REG_3, qword ptr [a+8]", "mov x, _ABSTRACT_REG_3"],
            lines
        );
    }

    #[test]
    fn load_with_scaled_index_works() {
        let address = E::op(
            Operator::Add,
            E::temp("a"),
            E::op(Operator::Mul, E::temp("i"), E::constant(8)),
        );
        let lines = without_comments(tile(Statement::move_temp("x", E::mem(address))));
        assert_eq!(vec!["mov x, qword ptr [a+i*8]"], lines);
    }

    #[test]
    fn name_is_addressed_through_rip() {
        let lines = tile(Statement::move_temp("x", E::name("GLOBAL_STRING_0")));
        assert_eq!(
            vec![
                "lea _ABSTRACT_REG_0, qword ptr [rip+GLOBAL_STRING_0]",
                "mov x, _ABSTRACT_REG_0"
            ],
            lines
        );
        let lines = tile(Statement::move_temp("x", E::mem(E::name("g"))));
        assert_eq!(vec!["mov x, qword ptr [rip+g]"], lines);
    }

    #[test]
    fn statement_cache_works() {
        let mut source = AbstractRegisterSource::new();
        let mut tiler = Tiler::new("test", &mut source);
        let statement = Statement::move_temp("a", E::constant(1_000_000_000_000));
        let first = tiler.tile_statement(&statement).unwrap();
        let second = tiler.tile_statement(&statement).unwrap();
        assert_eq!(first, second);
        drop(tiler);
        assert_eq!(1, source.count());
    }

    #[test]
    fn leftover_high_level_constructs_are_rejected() {
        let mut source = AbstractRegisterSource::new();
        let mut tiler = Tiler::new("test", &mut source);
        let eseq = E::ExprSequence {
            statements: vec![],
            expression: Box::new(E::constant(1)),
        };
        utils::assert_matches!(
            tiler.tile_statement(&Statement::move_temp("a", eseq)),
            Err(BackendError::InvariantViolation { .. })
        );
        utils::assert_matches!(
            tiler.tile_statement(&Statement::Sequence { statements: vec![] }),
            Err(BackendError::InvariantViolation { .. })
        );
        utils::assert_matches!(
            tiler.tile_statement(&Statement::ConditionalJump {
                condition: E::temp("a"),
                label1: "l1".to_string(),
                label2: "l2".to_string(),
            }),
            Err(BackendError::InvariantViolation { .. })
        );
        utils::assert_matches!(
            tiler.tile_statement(&Statement::move_temp("rax", E::constant(1))),
            Err(BackendError::InvariantViolation { .. })
        );
    }

    #[test]
    fn backend_register_names_are_rejected() {
        let mut source = AbstractRegisterSource::new();
        let mut tiler = Tiler::new("test", &mut source);
        for id in &["_ABSTRACT_REG_0", "_CALLEE_SAVED_STORAGE_rbx"] {
            utils::assert_matches!(
                tiler.tile_statement(&Statement::move_temp(*id, E::constant(1))),
                Err(BackendError::InvariantViolation { .. })
            );
            utils::assert_matches!(
                tiler.tile_statement(&Statement::ret(Some(E::temp(*id)))),
                Err(BackendError::InvariantViolation { .. })
            );
        }
        assert!(tiler
            .tile_statement(&Statement::move_temp("_ABSTRACT", E::constant(1)))
            .is_ok());
    }

    #[test]
    fn tile_function_ends_with_epilogue_label() {
        let mut source = AbstractRegisterSource::new();
        let instructions = tile_function(
            "f",
            &[Statement::ret(Some(E::temp("a")))],
            &mut source,
        )
        .unwrap();
        assert_eq!(
            Some(&Instruction::label("LABEL_FUNCTION_CALL_EPILOGUE_FOR_f")),
            instructions.last()
        );
        assert!(!instructions.contains(&Instruction::Return));
    }

    #[test]
    fn every_statement_produces_instructions() {
        let statements = vec![
            Statement::move_temp("a", E::op(Operator::Sub, E::temp("b"), E::temp("c"))),
            Statement::move_temp("a", E::op(Operator::And, E::temp("b"), E::constant(1))),
            Statement::move_temp("a", E::op(Operator::Or, E::temp("b"), E::temp("c"))),
            Statement::move_temp("a", E::op(Operator::Ge, E::temp("b"), E::constant(1))),
            Statement::move_mem(E::temp("p"), E::constant(1_000_000_000_000)),
            Statement::jump("l"),
            Statement::label("l"),
        ];
        for statement in statements {
            assert!(!tile(statement).is_empty());
        }
    }
}
