use super::instruction::Instruction;
use mir::GlobalVariable;
use std::fmt;

/// The assembly of a whole compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyProgram {
    pub global_variables: Vec<GlobalVariable>,
    pub public_functions: Vec<String>,
    pub instructions: Vec<Instruction>,
}

impl fmt::Display for AssemblyProgram {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(fmt, "    .text")?;
        writeln!(fmt, "    .intel_syntax noprefix")?;
        for function in &self.public_functions {
            writeln!(fmt, "    .globl {}", function)?;
        }
        for instr in &self.instructions {
            match instr {
                Instruction::Label { .. } => writeln!(fmt, "{}", instr)?,
                _ => writeln!(fmt, "    {}", instr.to_string().replace('\n', "\n    "))?,
            }
        }
        writeln!(fmt, "    .data")?;
        writeln!(fmt, "    .align 8")?;
        for global in &self.global_variables {
            writeln!(fmt, "{}:", global.name)?;
            writeln!(fmt, "    .quad {}", global.content.chars().count())?;
            for c in global.content.chars() {
                writeln!(fmt, "    .quad {} ## {}", c as u32, c.escape_default())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amd64::{JumpType, Reg};

    #[test]
    fn display_works() {
        let program = AssemblyProgram {
            global_variables: vec![GlobalVariable {
                name: "GLOBAL_STRING_0".to_string(),
                content: "hi".to_string(),
            }],
            public_functions: vec!["_compiled_program_main".to_string()],
            instructions: vec![
                Instruction::label("_compiled_program_main"),
                Instruction::SetOnFlag {
                    jump_type: JumpType::Je,
                    reg: Reg::new("rax"),
                },
                Instruction::Return,
            ],
        };
        let expected = "    .text
    .intel_syntax noprefix
    .globl _compiled_program_main
_compiled_program_main:
    sete al
    movzx rax, al
    ret
    .data
    .align 8
GLOBAL_STRING_0:
    .quad 2
    .quad 104 ## h
    .quad 105 ## i
";
        assert_eq!(expected, program.to_string());
    }
}
