use super::*;

pub struct RemoveComments;

impl GlobalPeepholeOptimization for RemoveComments {
    fn run(&mut self, asm: &mut Vec<Instruction>) {
        asm.retain(|instr| !instr.is_comment());
    }
}
