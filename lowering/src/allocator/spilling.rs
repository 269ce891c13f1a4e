//! Rewrites a function so that spilled registers live in stack slots.
//!
//! Each spilled register gets its own slot `[rbp-8k]`. Every instruction
//! mentioning a spilled register is replaced by an equivalent sequence that
//! is still legal x86: at most one memory operand per instruction, and
//! address computations only through registers. Reloads and stores go
//! through fresh short-lived registers.

use crate::{
    abstract_register::AbstractRegisterSource,
    amd64::{Arg, ConstOrReg, Instruction, Mem, Reg, RegOrMem},
    BackendError,
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct SpillRewrite {
    pub instructions: Vec<Instruction>,
    /// The slot index of every register spilled in this round.
    pub mappings: BTreeMap<Reg, usize>,
    /// Registers introduced for reloads and stores.
    pub new_temps: BTreeSet<Reg>,
}

/// Assign slots `slots_so_far + 1 ..` to `spilled` in ascending name order
/// and rewrite `instructions` accordingly.
pub fn rewrite_spilled(
    instructions: &[Instruction],
    spilled: &BTreeSet<Reg>,
    slots_so_far: usize,
    source: &mut AbstractRegisterSource,
) -> Result<SpillRewrite, BackendError> {
    let mappings = spilled
        .iter()
        .enumerate()
        .map(|(idx, reg)| (reg.clone(), slots_so_far + idx + 1))
        .collect::<BTreeMap<_, _>>();
    let mut rewriter = SpillingRewriter {
        mappings: &mappings,
        source,
        new_temps: BTreeSet::new(),
        out: Vec::with_capacity(instructions.len()),
    };
    for instr in instructions {
        rewriter.rewrite(instr.clone())?;
    }
    let SpillingRewriter { out, new_temps, .. } = rewriter;
    log::debug!(
        "spilled {} registers, {} new temporaries",
        mappings.len(),
        new_temps.len()
    );
    Ok(SpillRewrite {
        instructions: out,
        mappings,
        new_temps,
    })
}

struct SpillingRewriter<'a, 's> {
    mappings: &'a BTreeMap<Reg, usize>,
    source: &'s mut AbstractRegisterSource,
    new_temps: BTreeSet<Reg>,
    out: Vec<Instruction>,
}

impl SpillingRewriter<'_, '_> {
    fn slot(&self, reg: &Reg) -> Option<Mem> {
        self.mappings.get(reg).map(|k| Mem::stack_slot(*k))
    }

    fn fresh(&mut self) -> Reg {
        let reg = self.source.next_reg();
        self.new_temps.insert(reg.clone());
        reg
    }

    fn emit(&mut self, instr: Instruction) {
        self.out.push(instr);
    }

    /// A register that is read. Spilled registers are reloaded first.
    fn use_reg(&mut self, reg: Reg) -> Reg {
        match self.slot(&reg) {
            Some(slot) => {
                let temp = self.fresh();
                self.emit(Instruction::mov(temp.clone(), slot));
                temp
            }
            None => reg,
        }
    }

    /// The registers of an address are always forced through registers.
    fn memory(&mut self, mem: Mem) -> Mem {
        let Mem {
            base,
            multiple_of,
            displacement,
        } = mem;
        let base = base.map(|reg| self.use_reg(reg));
        let multiple_of = multiple_of.map(|(reg, scale)| (self.use_reg(reg), scale));
        Mem::new(base, multiple_of, displacement)
    }

    fn const_or_reg(&mut self, operand: ConstOrReg) -> ConstOrReg {
        match operand {
            ConstOrReg::Reg(reg) => ConstOrReg::Reg(self.use_reg(reg)),
            c => c,
        }
    }

    /// A spilled register becomes its slot.
    fn reg_or_mem(&mut self, operand: RegOrMem) -> RegOrMem {
        match operand {
            RegOrMem::Reg(reg) => match self.slot(&reg) {
                Some(slot) => RegOrMem::Mem(slot),
                None => RegOrMem::Reg(reg),
            },
            RegOrMem::Mem(mem) => RegOrMem::Mem(self.memory(mem)),
        }
    }

    fn arg(&mut self, operand: Arg) -> Arg {
        match operand {
            Arg::Reg(reg) => match self.slot(&reg) {
                Some(slot) => Arg::Mem(slot),
                None => Arg::Reg(reg),
            },
            Arg::Mem(mem) => Arg::Mem(self.memory(mem)),
            c => c,
        }
    }

    /// A register that is only written. A spilled destination is written
    /// through a fresh register and stored afterwards.
    fn reg_dest(&mut self, reg: Reg) -> (Reg, Option<Instruction>) {
        match self.slot(&reg) {
            Some(slot) => {
                let temp = self.fresh();
                (temp.clone(), Some(Instruction::mov_to_mem(slot, temp)))
            }
            None => (reg, None),
        }
    }

    fn emit_with_store(&mut self, instr: Instruction, store: Option<Instruction>) {
        self.emit(instr);
        if let Some(store) = store {
            self.emit(store);
        }
    }

    fn rewrite(&mut self, instr: Instruction) -> Result<(), BackendError> {
        use crate::amd64::Instruction::*;
        match instr {
            MoveFromLong { dest, value } => {
                let (dest, store) = self.reg_dest(dest);
                self.emit_with_store(MoveFromLong { dest, value }, store);
            }
            MoveToMem { dest, src } => {
                let dest = self.memory(dest);
                let src = self.const_or_reg(src);
                self.emit(MoveToMem { dest, src });
            }
            MoveToReg { dest, src } => {
                let src = self.arg(src);
                match (self.slot(&dest), src) {
                    (None, src) => self.emit(MoveToReg { dest, src }),
                    (Some(slot), Arg::Const(c)) => self.emit(Instruction::mov_to_mem(slot, c)),
                    (Some(slot), Arg::Reg(reg)) => self.emit(Instruction::mov_to_mem(slot, reg)),
                    (Some(slot), Arg::Mem(mem)) => {
                        let temp = self.fresh();
                        self.emit(Instruction::mov(temp.clone(), mem));
                        self.emit(Instruction::mov_to_mem(slot, temp));
                    }
                }
            }
            LoadEffectiveAddress { dest, mem } => {
                let mem = self.memory(mem);
                let (dest, store) = self.reg_dest(dest);
                self.emit_with_store(LoadEffectiveAddress { dest, mem }, store);
            }
            CmpMem {
                minuend,
                subtrahend,
            } => {
                let minuend = self.use_reg(minuend);
                let subtrahend = self.memory(subtrahend);
                self.emit(CmpMem {
                    minuend,
                    subtrahend,
                });
            }
            CmpConstOrReg {
                minuend,
                subtrahend,
            } => {
                let minuend = self.reg_or_mem(minuend);
                let subtrahend = self.const_or_reg(subtrahend);
                self.emit(CmpConstOrReg {
                    minuend,
                    subtrahend,
                });
            }
            SetOnFlag { jump_type, reg } => {
                if !reg.is_pre_colored() {
                    return Err(BackendError::InvariantViolation {
                        reason: format!("set{} targets non-machine register {}", jump_type, reg),
                    });
                }
                self.emit(SetOnFlag { jump_type, reg });
            }
            JumpAddress { jump_type, arg } => {
                let arg = self.arg(arg);
                self.emit(JumpAddress { jump_type, arg });
            }
            CallAddress { address, arguments } => {
                let address = self.arg(address);
                self.emit(CallAddress { address, arguments });
            }
            Push { arg } => {
                let arg = self.arg(arg);
                self.emit(Push { arg });
            }
            AlBinaryOpMemDest { op, dest, src } => {
                let dest = self.memory(dest);
                let src = self.const_or_reg(src);
                self.emit(AlBinaryOpMemDest { op, dest, src });
            }
            AlBinaryOpRegDest { op, dest, src } => {
                let src = self.arg(src);
                match (self.slot(&dest), src) {
                    (None, src) => self.emit(AlBinaryOpRegDest { op, dest, src }),
                    (Some(slot), Arg::Const(c)) => self.emit(AlBinaryOpMemDest {
                        op,
                        dest: slot,
                        src: ConstOrReg::Const(c),
                    }),
                    (Some(slot), Arg::Reg(reg)) => self.emit(AlBinaryOpMemDest {
                        op,
                        dest: slot,
                        src: ConstOrReg::Reg(reg),
                    }),
                    (Some(slot), Arg::Mem(mem)) => {
                        let temp = self.fresh();
                        self.emit(Instruction::mov(temp.clone(), slot.clone()));
                        self.emit(AlBinaryOpRegDest {
                            op,
                            dest: temp.clone(),
                            src: Arg::Mem(mem),
                        });
                        self.emit(Instruction::mov_to_mem(slot, temp));
                    }
                }
            }
            IMulOneArg { arg } => {
                let arg = self.reg_or_mem(arg);
                self.emit(IMulOneArg { arg });
            }
            IDiv { divisor } => {
                let divisor = self.reg_or_mem(divisor);
                self.emit(IDiv { divisor });
            }
            IMulTwoArgs { dest, src } => {
                let src = self.reg_or_mem(src);
                match self.slot(&dest) {
                    None => self.emit(IMulTwoArgs { dest, src }),
                    Some(slot) => {
                        let temp = self.fresh();
                        self.emit(Instruction::mov(temp.clone(), slot.clone()));
                        self.emit(IMulTwoArgs {
                            dest: temp.clone(),
                            src,
                        });
                        self.emit(Instruction::mov_to_mem(slot, temp));
                    }
                }
            }
            IMulThreeArgs {
                dest,
                src,
                immediate,
            } => {
                let src = self.reg_or_mem(src);
                let (dest, store) = self.reg_dest(dest);
                self.emit_with_store(
                    IMulThreeArgs {
                        dest,
                        src,
                        immediate,
                    },
                    store,
                );
            }
            AlUnaryOp { op, dest } => {
                let dest = self.reg_or_mem(dest);
                self.emit(AlUnaryOp { op, dest });
            }
            Shift { op, dest, count } => {
                let dest = self.reg_or_mem(dest);
                self.emit(Shift { op, dest, count });
            }
            Pop { dest } => {
                let dest = self.reg_or_mem(dest);
                self.emit(Pop { dest });
            }
            instr @ JumpLabel { .. }
            | instr @ Return
            | instr @ Cqo
            | instr @ Label { .. }
            | instr @ Comment { .. } => self.emit(instr),
        }
        Ok(())
    }
}
