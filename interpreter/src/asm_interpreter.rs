//! Execution of an allocated [`AssemblyProgram`] on a simulated machine.
//!
//! Every instruction occupies 8 bytes of address space, so the address of
//! a label is eight times its index. `call` pushes the address of the next
//! instruction and `ret` pops it, which places the first stack argument of
//! a function at `[rbp+16]` once the callee has pushed `rbp`. Calls of
//! builtins are intercepted; they clobber the caller-saved registers the
//! way a real call would.
//!
//! The calling convention is enforced: `rsp` must be 16 byte aligned at
//! every call, and every function must hand back `rbp` and the
//! callee-saved registers the way it found them.

use crate::{
    runtime::{self, Runtime, STACK_TOP},
    InterpretationError, Result,
};
use lowering::amd64::{
    AlBinaryOpType, AlUnaryOpType, Amd64Reg, Arg, AssemblyProgram, Const, ConstOrReg, Instruction,
    JumpType, Mem, Reg, RegOrMem, ShiftType, Size,
};
use mir::COMPILED_PROGRAM_MAIN;
use std::collections::HashMap;

/// Popping this address ends the program.
const EXIT_ADDRESS: i64 = -1;
/// What builtins leave in the caller-saved registers.
const CLOBBERED: i64 = 0x0bad_ca11;
/// Initial value of the n-th callee-saved register.
const CALLEE_SAVED_SENTINEL: i64 = 0x5a7e_d000;

/// Run `_compiled_program_main` and return everything it printed.
pub fn interpret_assembly(program: &AssemblyProgram) -> Result<String> {
    let mut interpreter = AsmInterpreter::new(program)?;
    interpreter.run()?;
    Ok(interpreter.runtime.into_printed())
}

#[derive(Debug, Default)]
struct Flags {
    eq: bool,
    le: bool,
    lt: bool,
    z: bool,
}

impl Flags {
    fn compare(minuend: i64, subtrahend: i64) -> Self {
        Flags {
            eq: minuend == subtrahend,
            le: minuend <= subtrahend,
            lt: minuend < subtrahend,
            z: minuend.wrapping_sub(subtrahend) == 0,
        }
    }

    fn holds(&self, jump_type: JumpType) -> bool {
        match jump_type {
            JumpType::Jmp => true,
            JumpType::Je => self.eq,
            JumpType::Jne => !self.eq,
            JumpType::Jl => self.lt,
            JumpType::Jle => self.le,
            JumpType::Jg => !self.le,
            JumpType::Jge => !self.lt,
            JumpType::Jz => self.z,
            JumpType::Jnz => !self.z,
        }
    }
}

/// What a `ret` has to restore.
#[derive(Debug)]
struct CallRecord {
    return_address: i64,
    callee_saved: Vec<(Amd64Reg, i64)>,
}

fn callee_saved_with_rbp() -> impl Iterator<Item = Amd64Reg> {
    Amd64Reg::callee_saved().chain(std::iter::once(Amd64Reg::Bp))
}

struct AsmInterpreter<'p> {
    instructions: &'p [Instruction],
    labels: HashMap<&'p str, usize>,
    registers: HashMap<Amd64Reg, i64>,
    flags: Flags,
    /// Index of the next instruction.
    ip: usize,
    /// One record per active user function, `_compiled_program_main` first.
    calls: Vec<CallRecord>,
    runtime: Runtime,
}

fn malformed<T>(reason: impl Into<String>) -> Result<T> {
    Err(InterpretationError::Malformed {
        reason: reason.into(),
    })
}

impl<'p> AsmInterpreter<'p> {
    fn new(program: &'p AssemblyProgram) -> Result<Self> {
        let labels = program
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(idx, instr)| match instr {
                Instruction::Label { name } => Some((name.as_str(), idx)),
                _ => None,
            })
            .collect::<HashMap<_, _>>();
        let ip = *labels
            .get(COMPILED_PROGRAM_MAIN)
            .ok_or(InterpretationError::MissingMain(COMPILED_PROGRAM_MAIN))?;
        let mut interpreter = AsmInterpreter {
            instructions: &program.instructions,
            labels,
            registers: HashMap::new(),
            flags: Flags::default(),
            ip,
            calls: vec![],
            runtime: Runtime::new(&program.global_variables)?,
        };
        for (idx, reg) in callee_saved_with_rbp().enumerate() {
            interpreter.set_reg(reg, CALLEE_SAVED_SENTINEL + idx as i64);
        }
        interpreter.set_reg(Amd64Reg::Sp, STACK_TOP);
        interpreter.push(EXIT_ADDRESS)?;
        interpreter.record_call(EXIT_ADDRESS);
        Ok(interpreter)
    }

    fn run(&mut self) -> Result<()> {
        loop {
            let instructions = self.instructions;
            let instr = instructions.get(self.ip).ok_or_else(|| {
                InterpretationError::Malformed {
                    reason: format!("execution left the program at index {}", self.ip),
                }
            })?;
            self.ip += 1;
            log::trace!("{:>6}: {}", self.ip - 1, instr);
            if let Instruction::Return = instr {
                let address = self.pop()?;
                self.check_return(address)?;
                if address == EXIT_ADDRESS {
                    return Ok(());
                }
                self.jump_to(address)?;
            } else {
                self.step(instr)?;
            }
        }
    }

    fn reg(&self, reg: Amd64Reg) -> i64 {
        self.registers.get(&reg).cloned().unwrap_or(0)
    }

    fn set_reg(&mut self, reg: Amd64Reg, value: i64) {
        self.registers.insert(reg, value);
    }

    fn machine_reg(reg: &Reg) -> Result<Amd64Reg> {
        reg.machine_reg()
            .map_or_else(|| malformed(format!("{} is not a machine register", reg)), Ok)
    }

    fn read(&self, reg: &Reg) -> Result<i64> {
        if reg.is_rip() {
            return Ok(0);
        }
        Ok(self.reg(Self::machine_reg(reg)?))
    }

    fn write(&mut self, reg: &Reg, value: i64) -> Result<()> {
        let reg = Self::machine_reg(reg)?;
        self.set_reg(reg, value);
        Ok(())
    }

    fn constant(&self, constant: &Const) -> Result<i64> {
        match constant {
            Const::Int(value) => Ok(i64::from(*value)),
            Const::Name(name) => match self.runtime.global(name) {
                Some(address) => Ok(address),
                None => self
                    .labels
                    .get(name.as_str())
                    .map(|idx| 8 * *idx as i64)
                    .ok_or_else(|| InterpretationError::UnknownLabel {
                        label: name.clone(),
                    }),
            },
        }
    }

    fn address(&self, mem: &Mem) -> Result<i64> {
        let mut address = 0i64;
        if let Some(base) = &mem.base {
            address = address.wrapping_add(self.read(base)?);
        }
        if let Some((index, scale)) = &mem.multiple_of {
            address = address.wrapping_add(self.read(index)?.wrapping_mul(scale.value()));
        }
        if let Some(displacement) = &mem.displacement {
            address = address.wrapping_add(self.constant(displacement)?);
        }
        Ok(address)
    }

    fn arg(&self, arg: &Arg) -> Result<i64> {
        match arg {
            Arg::Const(constant) => self.constant(constant),
            Arg::Reg(reg) => self.read(reg),
            Arg::Mem(mem) => self.runtime.load(self.address(mem)?),
        }
    }

    fn const_or_reg(&self, operand: &ConstOrReg) -> Result<i64> {
        match operand {
            ConstOrReg::Const(constant) => self.constant(constant),
            ConstOrReg::Reg(reg) => self.read(reg),
        }
    }

    fn reg_or_mem(&self, operand: &RegOrMem) -> Result<i64> {
        match operand {
            RegOrMem::Reg(reg) => self.read(reg),
            RegOrMem::Mem(mem) => self.runtime.load(self.address(mem)?),
        }
    }

    fn set_reg_or_mem(&mut self, operand: &RegOrMem, value: i64) -> Result<()> {
        match operand {
            RegOrMem::Reg(reg) => self.write(reg, value),
            RegOrMem::Mem(mem) => {
                let address = self.address(mem)?;
                self.runtime.store(address, value)
            }
        }
    }

    fn push(&mut self, value: i64) -> Result<()> {
        let rsp = self.reg(Amd64Reg::Sp).wrapping_sub(8);
        self.set_reg(Amd64Reg::Sp, rsp);
        self.runtime.store(rsp, value)
    }

    fn pop(&mut self) -> Result<i64> {
        let rsp = self.reg(Amd64Reg::Sp);
        let value = self.runtime.load(rsp)?;
        self.set_reg(Amd64Reg::Sp, rsp.wrapping_add(8));
        Ok(value)
    }

    fn jump_to(&mut self, address: i64) -> Result<()> {
        if address < 0 || address % 8 != 0 || address / 8 >= self.instructions.len() as i64 {
            return malformed(format!("jump to {} outside of the program", address));
        }
        self.ip = (address / 8) as usize;
        Ok(())
    }

    fn jump_to_label(&mut self, label: &str) -> Result<()> {
        let idx = self
            .labels
            .get(label)
            .ok_or_else(|| InterpretationError::UnknownLabel {
                label: label.to_string(),
            })?;
        self.ip = *idx;
        Ok(())
    }

    fn record_call(&mut self, return_address: i64) {
        let callee_saved = callee_saved_with_rbp()
            .map(|reg| (reg, self.reg(reg)))
            .collect();
        self.calls.push(CallRecord {
            return_address,
            callee_saved,
        });
    }

    fn check_return(&mut self, address: i64) -> Result<()> {
        let record = match self.calls.pop() {
            Some(record) if record.return_address == address => record,
            _ => return malformed(format!("ret to {} does not match any call", address)),
        };
        for (reg, value) in record.callee_saved {
            if self.reg(reg) != value {
                return Err(InterpretationError::CalleeSavedClobbered {
                    register: reg.name(Size::Eight),
                });
            }
        }
        Ok(())
    }

    fn call(&mut self, address: &Arg) -> Result<()> {
        let rsp = self.reg(Amd64Reg::Sp);
        if rsp % 16 != 0 {
            return Err(InterpretationError::MisalignedCall { rsp });
        }
        if let Arg::Const(Const::Name(name)) = address {
            if runtime::is_builtin(name) {
                let arguments = [self.reg(Amd64Reg::Di), self.reg(Amd64Reg::Si)];
                let result = match self.runtime.call_builtin(name, &arguments) {
                    Some(result) => result?,
                    None => return malformed(format!("{} is no builtin", name)),
                };
                for reg in Amd64Reg::caller_saved() {
                    self.set_reg(reg, CLOBBERED);
                }
                self.set_reg(Amd64Reg::A, result);
                return Ok(());
            }
        }
        let target = self.arg(address)?;
        let return_address = 8 * self.ip as i64;
        self.push(return_address)?;
        self.record_call(return_address);
        self.jump_to(target)
    }

    fn step(&mut self, instr: &Instruction) -> Result<()> {
        use self::Instruction::*;
        match instr {
            MoveFromLong { dest, value } => self.write(dest, *value)?,
            MoveToMem { dest, src } => {
                let value = self.const_or_reg(src)?;
                let address = self.address(dest)?;
                self.runtime.store(address, value)?;
            }
            MoveToReg { dest, src } => {
                let value = self.arg(src)?;
                self.write(dest, value)?;
            }
            LoadEffectiveAddress { dest, mem } => {
                let address = self.address(mem)?;
                self.write(dest, address)?;
            }
            CmpConstOrReg {
                minuend,
                subtrahend,
            } => {
                self.flags =
                    Flags::compare(self.reg_or_mem(minuend)?, self.const_or_reg(subtrahend)?);
            }
            CmpMem {
                minuend,
                subtrahend,
            } => {
                let subtrahend = self.runtime.load(self.address(subtrahend)?)?;
                self.flags = Flags::compare(self.read(minuend)?, subtrahend);
            }
            SetOnFlag { jump_type, reg } => {
                let value = self.flags.holds(*jump_type) as i64;
                self.write(reg, value)?;
            }
            JumpLabel { jump_type, label } => {
                if self.flags.holds(*jump_type) {
                    self.jump_to_label(label)?;
                }
            }
            JumpAddress { jump_type, arg } => {
                if self.flags.holds(*jump_type) {
                    let target = self.arg(arg)?;
                    self.jump_to(target)?;
                }
            }
            CallAddress { address, .. } => self.call(address)?,
            Return => return malformed("ret is handled by the main loop"),
            AlBinaryOpMemDest { op, dest, src } => {
                let address = self.address(dest)?;
                let value = binary(*op, self.runtime.load(address)?, self.const_or_reg(src)?);
                self.runtime.store(address, value)?;
            }
            AlBinaryOpRegDest { op, dest, src } => {
                let value = binary(*op, self.read(dest)?, self.arg(src)?);
                self.write(dest, value)?;
            }
            IMulOneArg { arg } => {
                let product = i128::from(self.reg(Amd64Reg::A)) * i128::from(self.reg_or_mem(arg)?);
                self.set_reg(Amd64Reg::A, product as i64);
                self.set_reg(Amd64Reg::D, (product >> 64) as i64);
            }
            IMulTwoArgs { dest, src } => {
                let value = self.read(dest)?.wrapping_mul(self.reg_or_mem(src)?);
                self.write(dest, value)?;
            }
            IMulThreeArgs {
                dest,
                src,
                immediate,
            } => {
                let value = self.reg_or_mem(src)?.wrapping_mul(self.constant(immediate)?);
                self.write(dest, value)?;
            }
            Cqo => {
                let sign = if self.reg(Amd64Reg::A) < 0 { -1 } else { 0 };
                self.set_reg(Amd64Reg::D, sign);
            }
            IDiv { divisor } => {
                let divisor = self.reg_or_mem(divisor)?;
                if divisor == 0 {
                    return Err(InterpretationError::panic("Division by zero!"));
                }
                let dividend = self.reg(Amd64Reg::A);
                self.set_reg(Amd64Reg::A, dividend.wrapping_div(divisor));
                self.set_reg(Amd64Reg::D, dividend.wrapping_rem(divisor));
            }
            AlUnaryOp { op, dest } => {
                let value = self.reg_or_mem(dest)?;
                let value = match op {
                    AlUnaryOpType::Neg => value.wrapping_neg(),
                    AlUnaryOpType::Inc => value.wrapping_add(1),
                    AlUnaryOpType::Dec => value.wrapping_sub(1),
                };
                self.set_reg_or_mem(dest, value)?;
            }
            Shift { op, dest, count } => {
                let value = self.reg_or_mem(dest)?;
                let count = u32::from(*count) % 64;
                let value = match op {
                    ShiftType::Shl | ShiftType::Sal => value.wrapping_shl(count),
                    ShiftType::Shr => ((value as u64) >> count) as i64,
                    ShiftType::Sar => value >> count,
                };
                self.set_reg_or_mem(dest, value)?;
            }
            Push { arg } => {
                let value = self.arg(arg)?;
                self.push(value)?;
            }
            Pop { dest } => {
                let value = self.pop()?;
                self.set_reg_or_mem(dest, value)?;
            }
            Label { .. } | Comment { .. } => (),
        }
        Ok(())
    }
}

fn binary(op: AlBinaryOpType, dest: i64, src: i64) -> i64 {
    match op {
        AlBinaryOpType::Add => dest.wrapping_add(src),
        AlBinaryOpType::Sub => dest.wrapping_sub(src),
        AlBinaryOpType::And => dest & src,
        AlBinaryOpType::Or => dest | src,
        AlBinaryOpType::Xor => dest ^ src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mir::GlobalVariable;

    fn reg(id: &str) -> Reg {
        Reg::new(id)
    }

    fn program(instructions: Vec<Instruction>) -> AssemblyProgram {
        AssemblyProgram {
            global_variables: vec![GlobalVariable {
                name: "GLOBAL_STRING_0".to_string(),
                content: "ok".to_string(),
            }],
            public_functions: vec![COMPILED_PROGRAM_MAIN.to_string()],
            instructions,
        }
    }

    fn call(name: &str, arguments: usize) -> Instruction {
        Instruction::CallAddress {
            address: Arg::Const(Const::name(name)),
            arguments,
        }
    }

    fn print_rax() -> Vec<Instruction> {
        vec![
            Instruction::mov(reg("rdi"), reg("rax")),
            call(runtime::INT_TO_STRING, 1),
            Instruction::mov(reg("rdi"), reg("rax")),
            call(runtime::PRINTLN, 1),
        ]
    }

    #[test]
    fn calls_push_return_addresses() {
        let mut instructions = vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::Push {
                arg: reg("rbp").into(),
            },
            Instruction::mov(reg("rbp"), reg("rsp")),
            Instruction::binop(AlBinaryOpType::Sub, reg("rsp"), Const::Int(8)),
            Instruction::Push {
                arg: Const::Int(40).into(),
            },
            Instruction::mov(reg("rdi"), Const::Int(2)),
            call("add_stack_arg", 1),
        ];
        instructions.extend(print_rax());
        instructions.extend(vec![
            Instruction::mov(reg("rsp"), reg("rbp")),
            Instruction::Pop {
                dest: reg("rbp").into(),
            },
            Instruction::Return,
            Instruction::label("add_stack_arg"),
            Instruction::Push {
                arg: reg("rbp").into(),
            },
            Instruction::mov(reg("rbp"), reg("rsp")),
            Instruction::mov(
                reg("rax"),
                Mem::reg_with_displacement(reg("rbp"), Const::Int(16)),
            ),
            Instruction::binop(AlBinaryOpType::Add, reg("rax"), reg("rdi")),
            Instruction::Pop {
                dest: reg("rbp").into(),
            },
            Instruction::Return,
        ]);
        assert_eq!("42\n", interpret_assembly(&program(instructions)).unwrap());
    }

    #[test]
    fn flags_and_division_work() {
        let mut instructions = vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::Push {
                arg: reg("rbp").into(),
            },
            Instruction::mov(reg("rax"), Const::Int(-7)),
            Instruction::Cqo,
            Instruction::mov(reg("rcx"), Const::Int(2)),
            Instruction::IDiv {
                divisor: reg("rcx").into(),
            },
            Instruction::CmpConstOrReg {
                minuend: reg("rax").into(),
                subtrahend: Const::Int(-3).into(),
            },
            Instruction::SetOnFlag {
                jump_type: JumpType::Je,
                reg: reg("rax"),
            },
        ];
        instructions.extend(print_rax());
        instructions.push(Instruction::Pop {
            dest: reg("rbp").into(),
        });
        instructions.push(Instruction::Return);
        assert_eq!("1\n", interpret_assembly(&program(instructions)).unwrap());
    }

    #[test]
    fn builtins_clobber_caller_saved_registers() {
        let mut instructions = vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::Push {
                arg: reg("rbx").into(),
            },
            Instruction::mov(reg("r11"), Const::Int(5)),
            Instruction::mov(reg("rbx"), Const::Int(6)),
            Instruction::LoadEffectiveAddress {
                dest: reg("rdi"),
                mem: Mem::rip_relative("GLOBAL_STRING_0"),
            },
            call(runtime::PRINTLN, 1),
            Instruction::mov(reg("rax"), reg("r11")),
        ];
        instructions.extend(print_rax());
        instructions.push(Instruction::mov(reg("rax"), reg("rbx")));
        instructions.extend(print_rax());
        instructions.push(Instruction::Pop {
            dest: reg("rbx").into(),
        });
        instructions.push(Instruction::Return);
        assert_eq!(
            format!("ok\n{}\n6\n", CLOBBERED),
            interpret_assembly(&program(instructions)).unwrap()
        );
    }

    #[test]
    fn misaligned_calls_are_rejected() {
        let instructions = vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::mov(reg("rdi"), Const::Int(1)),
            call(runtime::INT_TO_STRING, 1),
            Instruction::Return,
        ];
        assert_eq!(
            Err(InterpretationError::MisalignedCall {
                rsp: STACK_TOP - 8
            }),
            interpret_assembly(&program(instructions))
        );
    }

    #[test]
    fn callee_saved_registers_must_be_restored() {
        let callee = |restore: bool| {
            let mut instructions = vec![
                Instruction::label(COMPILED_PROGRAM_MAIN),
                Instruction::Push {
                    arg: reg("rbp").into(),
                },
                call("callee", 0),
                Instruction::Pop {
                    dest: reg("rbp").into(),
                },
                Instruction::Return,
                Instruction::label("callee"),
                Instruction::Push {
                    arg: reg("r12").into(),
                },
                Instruction::mov(reg("r12"), Const::Int(3)),
            ];
            if restore {
                instructions.push(Instruction::Pop {
                    dest: reg("r12").into(),
                });
            } else {
                instructions.push(Instruction::binop(
                    AlBinaryOpType::Add,
                    reg("rsp"),
                    Const::Int(8),
                ));
            }
            instructions.push(Instruction::Return);
            program(instructions)
        };
        assert_eq!(Ok(String::new()), interpret_assembly(&callee(true)));
        assert_eq!(
            Err(InterpretationError::CalleeSavedClobbered {
                register: "r12".to_string()
            }),
            interpret_assembly(&callee(false))
        );

        let main_clobbers = program(vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::mov(reg("rbx"), Const::Int(0)),
            Instruction::Return,
        ]);
        assert_eq!(
            Err(InterpretationError::CalleeSavedClobbered {
                register: "rbx".to_string()
            }),
            interpret_assembly(&main_clobbers)
        );
    }

    #[test]
    fn faults_are_reported() {
        let unaligned = program(vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::mov(reg("rax"), Mem::constant(Const::Int(12))),
            Instruction::Return,
        ]);
        assert_eq!(
            Err(InterpretationError::UnalignedAccess { address: 12 }),
            interpret_assembly(&unaligned)
        );

        let division = program(vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::IDiv {
                divisor: reg("rcx").into(),
            },
        ]);
        assert_eq!(
            Err(InterpretationError::panic("Division by zero!")),
            interpret_assembly(&division)
        );

        let unallocated = program(vec![
            Instruction::label(COMPILED_PROGRAM_MAIN),
            Instruction::mov(reg("_ABSTRACT_REG_0"), Const::Int(1)),
        ]);
        utils::assert_matches!(
            interpret_assembly(&unallocated),
            Err(InterpretationError::Malformed { .. })
        );

        utils::assert_matches!(
            interpret_assembly(&program(vec![])),
            Err(InterpretationError::MissingMain(_))
        );
    }
}
