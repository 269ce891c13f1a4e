use super::*;
use crate::amd64::{Arg, Const, ConstOrReg, Mem};
use std::collections::HashSet;

/// Removes labels nothing jumps to or takes the address of. The function
/// label is not part of the body this runs on.
pub struct UnreferencedLabels;

fn mem_name(mem: &Mem) -> Option<&str> {
    match &mem.displacement {
        Some(Const::Name(name)) => Some(name.as_str()),
        _ => None,
    }
}

fn arg_name(arg: &Arg) -> Option<&str> {
    match arg {
        Arg::Const(Const::Name(name)) => Some(name.as_str()),
        Arg::Mem(mem) => mem_name(mem),
        _ => None,
    }
}

fn referenced_label(instr: &Instruction) -> Option<&str> {
    use self::Instruction::*;
    match instr {
        JumpLabel { label, .. } => Some(label.as_str()),
        JumpAddress { arg, .. } | Push { arg } => arg_name(arg),
        CallAddress { address, .. } => arg_name(address),
        MoveToReg { src, .. } => arg_name(src),
        AlBinaryOpRegDest { src, .. } => arg_name(src),
        LoadEffectiveAddress { mem, .. } => mem_name(mem),
        MoveToMem { dest, src } => match src {
            ConstOrReg::Const(Const::Name(name)) => Some(name.as_str()),
            _ => mem_name(dest),
        },
        _ => None,
    }
}

impl GlobalPeepholeOptimization for UnreferencedLabels {
    fn run(&mut self, asm: &mut Vec<Instruction>) {
        let referenced = asm
            .iter()
            .filter_map(referenced_label)
            .map(str::to_string)
            .collect::<HashSet<_>>();
        asm.retain(|instr| match instr {
            Instruction::Label { name } => referenced.contains(name),
            _ => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amd64::{JumpType, Reg};

    #[test]
    fn unreferenced_labels_are_removed() {
        let mut asm = vec![
            Instruction::label("L1"),
            Instruction::label("L2"),
            Instruction::label("L3"),
            Instruction::jump(JumpType::Jne, "L2"),
            Instruction::LoadEffectiveAddress {
                dest: Reg::new("rax"),
                mem: Mem::rip_relative("L3"),
            },
        ];
        UnreferencedLabels.run(&mut asm);
        assert_eq!(
            vec!["L2:", "L3:", "jne L2", "lea rax, qword ptr [rip+L3]"],
            asm.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
    }
}
