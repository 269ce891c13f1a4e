use super::*;
use crate::amd64::JumpType;

/// Drops an unconditional `jmp L` that is directly followed by `L:`.
pub struct Fallthrough;

impl GlobalPeepholeOptimization for Fallthrough {
    fn run(&mut self, asm: &mut Vec<Instruction>) {
        let mut idx = 0;
        while idx + 1 < asm.len() {
            use self::Instruction::*;

            let falls_through = match (&asm[idx], &asm[idx + 1]) {
                (
                    JumpLabel {
                        jump_type: JumpType::Jmp,
                        label,
                    },
                    Label { name: next_block },
                ) => label == next_block,
                _ => false,
            };
            if falls_through {
                asm.remove(idx);
            } else {
                idx += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallthrough_works() {
        let mut asm = vec![
            Instruction::jump(JumpType::Jmp, "L1"),
            Instruction::label("L1"),
            Instruction::jump(JumpType::Je, "L2"),
            Instruction::label("L2"),
            Instruction::jump(JumpType::Jmp, "L1"),
            Instruction::label("L3"),
        ];
        Fallthrough.run(&mut asm);
        assert_eq!(
            vec!["L1:", "je L2", "L2:", "jmp L1", "L3:"],
            asm.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
    }
}
