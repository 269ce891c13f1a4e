//! Saving and restoring the callee-saved registers.
//!
//! Before allocation every callee-saved register is moved into a storage
//! register at function entry and moved back at the very end. The storage
//! registers are ordinary abstract registers, so the allocator decides
//! whether they live in a register or in a stack slot. Afterwards the pairs
//! that guard a register nobody touched are pruned.

use crate::amd64::{Amd64Reg, Instruction, Reg};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) const STORAGE_PREFIX: &str = "_CALLEE_SAVED_STORAGE_";

/// `_CALLEE_SAVED_STORAGE_rbx` for `rbx`.
pub fn storage_reg(reg: Amd64Reg) -> Reg {
    Reg::new(format!("{}{}", STORAGE_PREFIX, Reg::machine(reg)))
}

/// The callee-saved register `storage` saves, if it is a storage register.
pub fn storage_owner(storage: &Reg) -> Option<Amd64Reg> {
    if !storage.id().starts_with(STORAGE_PREFIX) {
        return None;
    }
    Reg::new(&storage.id()[STORAGE_PREFIX.len()..])
        .machine_reg()
        .filter(|reg| reg.is_callee_save())
}

/// Prepend the saves and append the restores. The body ends with the
/// epilogue label, so the restores run on every path out of the function.
pub fn wrap(body: Vec<Instruction>) -> Vec<Instruction> {
    let mut instructions = Amd64Reg::callee_saved()
        .map(|reg| Instruction::mov(storage_reg(reg), Reg::machine(reg)))
        .collect::<Vec<_>>();
    instructions.extend(body);
    instructions.extend(
        Amd64Reg::callee_saved().map(|reg| Instruction::mov(Reg::machine(reg), storage_reg(reg))),
    );
    instructions
}

/// The callee-saved registers no value of the function ends up in.
///
/// A storage register that is kept writes its color, so the color counts as
/// used as well. This is iterated until nothing changes.
pub fn unused_callee_saved(colors: &BTreeMap<Reg, Amd64Reg>) -> BTreeSet<Amd64Reg> {
    let mut used = colors
        .iter()
        .filter(|(reg, _)| !reg.is_pre_colored() && storage_owner(reg).is_none())
        .map(|(_, color)| *color)
        .collect::<BTreeSet<_>>();
    loop {
        let mut changed = false;
        for (reg, color) in colors {
            if let Some(owner) = storage_owner(reg) {
                if used.contains(&owner) && used.insert(*color) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    Amd64Reg::callee_saved()
        .filter(|reg| !used.contains(reg))
        .collect()
}

/// Renumber the spill slots without the slots of pruned storage registers.
/// Returns the relocation `old slot -> new slot`; its length is the number of
/// slots the frame needs.
pub fn compact_slots(
    spill_slots: &BTreeMap<Reg, usize>,
    unused: &BTreeSet<Amd64Reg>,
) -> BTreeMap<usize, usize> {
    let mut kept = spill_slots
        .iter()
        .filter(|(reg, _)| match storage_owner(reg) {
            Some(owner) => !unused.contains(&owner),
            None => true,
        })
        .map(|(_, slot)| *slot)
        .collect::<Vec<_>>();
    kept.sort();
    kept.into_iter()
        .enumerate()
        .map(|(idx, slot)| (slot, idx + 1))
        .collect()
}
