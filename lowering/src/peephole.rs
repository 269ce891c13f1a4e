//! Cleanups over the final instruction list of a function body.

use crate::amd64::Instruction;

pub(crate) fn optimize(function_asm: &mut Vec<Instruction>) {
    let peepholers: Vec<Box<dyn GlobalPeepholeOptimization>> = vec![
        Box::new(comments::RemoveComments),
        Box::new(jmp_targets::Fallthrough),
        Box::new(labels::UnreferencedLabels),
    ];
    peepholers.into_iter().for_each(|mut peepholer| {
        peepholer.run(function_asm);
    })
}

trait GlobalPeepholeOptimization {
    /// Run the optimization and modify the instruction list in place.
    fn run(&mut self, asm: &mut Vec<Instruction>);
}

mod comments;
mod jmp_targets;
mod labels;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amd64::{Instruction, JumpType, Reg};

    #[test]
    fn optimize_works() {
        let mut asm = vec![
            Instruction::comment("x = 1"),
            Instruction::mov(Reg::new("rax"), Reg::new("rdi")),
            Instruction::jump(JumpType::Jmp, "L1"),
            Instruction::comment("'mov rbx, rbx' is optimized away."),
            Instruction::label("L1"),
            Instruction::label("L2"),
            Instruction::jump(JumpType::Jl, "L2"),
        ];
        optimize(&mut asm);
        assert_eq!(
            vec!["mov rax, rdi", "L2:", "jl L2"],
            asm.iter().map(ToString::to_string).collect::<Vec<_>>()
        );
    }
}
