//! Live-variable analysis over the instruction list of one function.
//!
//! Every instruction is a node of the control flow graph. The analysis is
//! the classic backward data-flow problem
//! `in[n] = use[n] ∪ (out[n] − def[n])`, `out[n] = ∪ in[s]` for every
//! successor `s`, solved with a worklist.

use crate::amd64::{Amd64Reg, Arg, ConstOrReg, Instruction, Mem, Reg, RegOrMem};
use std::collections::{BTreeSet, HashMap, VecDeque};

/// `rsp`, `rbp` and `rip` belong to the frame and are never allocated.
pub fn is_tracked(reg: &Reg) -> bool {
    match reg.machine_reg() {
        Some(Amd64Reg::Sp) | Some(Amd64Reg::Bp) => false,
        Some(_) => true,
        None => !reg.is_rip(),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UsesAndDefs {
    pub uses: BTreeSet<Reg>,
    pub defs: BTreeSet<Reg>,
}

impl UsesAndDefs {
    fn use_reg(&mut self, reg: &Reg) {
        if is_tracked(reg) {
            self.uses.insert(reg.clone());
        }
    }

    fn def_reg(&mut self, reg: &Reg) {
        if is_tracked(reg) {
            self.defs.insert(reg.clone());
        }
    }

    fn use_mem(&mut self, mem: &Mem) {
        for reg in mem.registers() {
            self.use_reg(reg);
        }
    }

    fn use_arg(&mut self, arg: &Arg) {
        match arg {
            Arg::Const(_) => (),
            Arg::Reg(reg) => self.use_reg(reg),
            Arg::Mem(mem) => self.use_mem(mem),
        }
    }

    fn use_const_or_reg(&mut self, operand: &ConstOrReg) {
        if let ConstOrReg::Reg(reg) = operand {
            self.use_reg(reg);
        }
    }

    fn use_reg_or_mem(&mut self, operand: &RegOrMem) {
        match operand {
            RegOrMem::Reg(reg) => self.use_reg(reg),
            RegOrMem::Mem(mem) => self.use_mem(mem),
        }
    }

    /// A destination that is read before it is written.
    fn update_reg_or_mem(&mut self, operand: &RegOrMem) {
        match operand {
            RegOrMem::Reg(reg) => {
                self.use_reg(reg);
                self.def_reg(reg);
            }
            RegOrMem::Mem(mem) => self.use_mem(mem),
        }
    }

    fn def_reg_or_mem(&mut self, operand: &RegOrMem) {
        match operand {
            RegOrMem::Reg(reg) => self.def_reg(reg),
            RegOrMem::Mem(mem) => self.use_mem(mem),
        }
    }
}

pub fn uses_and_defs(instr: &Instruction) -> UsesAndDefs {
    use crate::amd64::Instruction::*;
    let mut ud = UsesAndDefs::default();
    let rax = Reg::machine(Amd64Reg::A);
    let rdx = Reg::machine(Amd64Reg::D);
    match instr {
        MoveFromLong { dest, .. } => ud.def_reg(dest),
        MoveToMem { dest, src } => {
            ud.use_mem(dest);
            ud.use_const_or_reg(src);
        }
        MoveToReg { dest, src } => {
            ud.use_arg(src);
            ud.def_reg(dest);
        }
        LoadEffectiveAddress { dest, mem } => {
            ud.use_mem(mem);
            ud.def_reg(dest);
        }
        CmpConstOrReg {
            minuend,
            subtrahend,
        } => {
            ud.use_reg_or_mem(minuend);
            ud.use_const_or_reg(subtrahend);
        }
        CmpMem {
            minuend,
            subtrahend,
        } => {
            ud.use_reg(minuend);
            ud.use_mem(subtrahend);
        }
        SetOnFlag { reg, .. } => ud.def_reg(reg),
        JumpLabel { .. } | Return | Label { .. } | Comment { .. } => (),
        JumpAddress { arg, .. } | Push { arg } => ud.use_arg(arg),
        CallAddress { address, arguments } => {
            ud.use_arg(address);
            for reg in (0..*arguments).filter_map(Amd64Reg::arg) {
                ud.use_reg(&Reg::machine(reg));
            }
            for reg in Amd64Reg::caller_saved() {
                ud.def_reg(&Reg::machine(reg));
            }
        }
        AlBinaryOpMemDest { dest, src, .. } => {
            ud.use_mem(dest);
            ud.use_const_or_reg(src);
        }
        AlBinaryOpRegDest { dest, src, .. } => {
            ud.use_arg(src);
            ud.update_reg_or_mem(&RegOrMem::Reg(dest.clone()));
        }
        IMulOneArg { arg } => {
            ud.use_reg_or_mem(arg);
            ud.use_reg(&rax);
            ud.def_reg(&rax);
            ud.def_reg(&rdx);
        }
        IMulTwoArgs { dest, src } => {
            ud.use_reg_or_mem(src);
            ud.update_reg_or_mem(&RegOrMem::Reg(dest.clone()));
        }
        IMulThreeArgs { dest, src, .. } => {
            ud.use_reg_or_mem(src);
            ud.def_reg(dest);
        }
        Cqo => {
            ud.use_reg(&rax);
            ud.def_reg(&rdx);
        }
        IDiv { divisor } => {
            ud.use_reg_or_mem(divisor);
            ud.use_reg(&rax);
            ud.use_reg(&rdx);
            ud.def_reg(&rax);
            ud.def_reg(&rdx);
        }
        AlUnaryOp { dest, .. } | Shift { dest, .. } => ud.update_reg_or_mem(dest),
        Pop { dest } => ud.def_reg_or_mem(dest),
    }
    ud
}

/// The control flow successors of every instruction, by index.
pub fn successors(instructions: &[Instruction]) -> Vec<Vec<usize>> {
    let labels = instructions
        .iter()
        .enumerate()
        .filter_map(|(idx, instr)| match instr {
            Instruction::Label { name } => Some((name.as_str(), idx)),
            _ => None,
        })
        .collect::<HashMap<_, _>>();
    instructions
        .iter()
        .enumerate()
        .map(|(idx, instr)| {
            let next = Some(idx + 1).filter(|next| *next < instructions.len());
            match instr {
                Instruction::JumpLabel { jump_type, label } => {
                    let mut successors = labels
                        .get(label.as_str())
                        .cloned()
                        .into_iter()
                        .collect::<Vec<_>>();
                    if jump_type.is_conditional() {
                        successors.extend(next);
                    }
                    successors
                }
                Instruction::JumpAddress { jump_type, .. } if jump_type.is_conditional() => {
                    next.into_iter().collect()
                }
                Instruction::JumpAddress { .. } | Instruction::Return => vec![],
                _ => next.into_iter().collect(),
            }
        })
        .collect()
}

/// Registers live when control leaves the function: the return value and
/// everything the caller expects to be preserved.
pub fn exit_live_set(has_return: bool) -> BTreeSet<Reg> {
    let mut live = Amd64Reg::callee_saved()
        .map(Reg::machine)
        .collect::<BTreeSet<_>>();
    if has_return {
        live.insert(Reg::machine(Amd64Reg::A));
    }
    live
}

#[derive(Debug, Clone)]
pub struct Liveness {
    pub uses_and_defs: Vec<UsesAndDefs>,
    pub live_in: Vec<BTreeSet<Reg>>,
    pub live_out: Vec<BTreeSet<Reg>>,
}

pub fn live_variable_analysis(instructions: &[Instruction], has_return: bool) -> Liveness {
    let uses_and_defs = instructions.iter().map(uses_and_defs).collect::<Vec<_>>();
    let successors = successors(instructions);
    let mut predecessors = vec![vec![]; instructions.len()];
    for (idx, succs) in successors.iter().enumerate() {
        for succ in succs {
            predecessors[*succ].push(idx);
        }
    }
    let exit = exit_live_set(has_return);

    let mut live_in = vec![BTreeSet::new(); instructions.len()];
    let mut live_out = vec![BTreeSet::new(); instructions.len()];
    // backwards problem, so start at the end
    let mut worklist = (0..instructions.len()).rev().collect::<VecDeque<_>>();
    let mut queued = vec![true; instructions.len()];
    let mut steps = 0;
    while let Some(idx) = worklist.pop_front() {
        queued[idx] = false;
        steps += 1;

        let out = if successors[idx].is_empty() {
            exit.clone()
        } else {
            successors[idx]
                .iter()
                .flat_map(|succ| live_in[*succ].iter().cloned())
                .collect::<BTreeSet<_>>()
        };
        let mut new_in = uses_and_defs[idx].uses.clone();
        new_in.extend(out.difference(&uses_and_defs[idx].defs).cloned());
        live_out[idx] = out;

        if new_in != live_in[idx] {
            live_in[idx] = new_in;
            for pred in &predecessors[idx] {
                if !queued[*pred] {
                    queued[*pred] = true;
                    worklist.push_back(*pred);
                }
            }
        }
    }
    log::trace!(
        "liveness of {} instructions converged after {} steps",
        instructions.len(),
        steps
    );

    Liveness {
        uses_and_defs,
        live_in,
        live_out,
    }
}
