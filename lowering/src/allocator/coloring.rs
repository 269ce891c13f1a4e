//! Final rewrite of an allocated function: every abstract register is
//! replaced by its color and every stack slot moves to its compacted index.

use super::callee_saved::storage_owner;
use crate::{
    amd64::{Amd64Reg, Arg, ConstOrReg, Instruction, Mem, Reg},
    BackendError,
};
use std::collections::{BTreeMap, BTreeSet};

pub fn rewrite_colored(
    instructions: Vec<Instruction>,
    colors: &BTreeMap<Reg, Amd64Reg>,
    relocation: &BTreeMap<usize, usize>,
    unused_callee_saved: &BTreeSet<Amd64Reg>,
) -> Result<Vec<Instruction>, BackendError> {
    let mut rewritten = Vec::with_capacity(instructions.len());
    for instr in instructions {
        if is_pruned_move(&instr, relocation, unused_callee_saved) {
            rewritten.push(Instruction::comment(format!(
                "'{}' is optimized away.",
                instr
            )));
            continue;
        }
        let instr = substitute(instr, colors, relocation)?;
        match &instr {
            Instruction::MoveToReg {
                dest,
                src: Arg::Reg(src),
            } if dest == src => {
                rewritten.push(Instruction::comment(format!(
                    "'{}' is optimized away.",
                    instr
                )));
            }
            _ => rewritten.push(instr),
        }
    }
    Ok(rewritten)
}

fn substitute(
    instr: Instruction,
    colors: &BTreeMap<Reg, Amd64Reg>,
    relocation: &BTreeMap<usize, usize>,
) -> Result<Instruction, BackendError> {
    let mut uncolored = None;
    let instr = instr.map_registers(&mut |reg| {
        if !reg.is_abstract() {
            return reg;
        }
        match colors.get(&reg) {
            Some(color) => Reg::machine(*color),
            None => {
                uncolored = Some(reg.clone());
                reg
            }
        }
    });
    if let Some(reg) = uncolored {
        return Err(BackendError::InvariantViolation {
            reason: format!("{} has neither a color nor a stack slot", reg),
        });
    }

    let mut unknown_slot = None;
    let instr = instr.map_memory(&mut |mem| match mem.slot_index() {
        Some(slot) => match relocation.get(&slot) {
            Some(relocated) => Mem::stack_slot(*relocated),
            None => {
                unknown_slot = Some(slot);
                mem
            }
        },
        None => mem,
    });
    match unknown_slot {
        Some(slot) => Err(BackendError::InvariantViolation {
            reason: format!("stack slot {} was never assigned", slot),
        }),
        None => Ok(instr),
    }
}

/// The save or restore of a callee-saved register nobody uses, whether its
/// storage register got a color or a stack slot.
fn is_pruned_move(
    instr: &Instruction,
    relocation: &BTreeMap<usize, usize>,
    unused: &BTreeSet<Amd64Reg>,
) -> bool {
    let pruned = |reg: &Reg| reg.machine_reg().map_or(false, |reg| unused.contains(&reg));
    let pruned_storage = |storage: &Reg, reg: &Reg| {
        pruned(reg) && storage_owner(storage) == reg.machine_reg()
    };
    let pruned_slot = |mem: &Mem| {
        mem.slot_index()
            .map_or(false, |slot| !relocation.contains_key(&slot))
    };
    match instr {
        Instruction::MoveToReg {
            dest,
            src: Arg::Reg(src),
        } => pruned_storage(dest, src) || pruned_storage(src, dest),
        Instruction::MoveToReg {
            dest,
            src: Arg::Mem(mem),
        } => pruned(dest) && pruned_slot(mem),
        Instruction::MoveToMem {
            dest,
            src: ConstOrReg::Reg(src),
        } => pruned(src) && pruned_slot(dest),
        _ => false,
    }
}
