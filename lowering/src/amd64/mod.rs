//! The x86-64 assembly model: registers, operands, instructions and the
//! final program.

mod instruction;
mod operand;
mod program;
mod register;

pub use self::{
    instruction::{AlBinaryOpType, AlUnaryOpType, Instruction, JumpType, ShiftType},
    operand::{Arg, Const, ConstOrReg, Mem, RegOrMem, Scale},
    program::AssemblyProgram,
    register::{Amd64Reg, Reg, Size},
};
