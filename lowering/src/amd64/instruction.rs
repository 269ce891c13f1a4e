use super::{
    operand::{Arg, Const, ConstOrReg, Mem, RegOrMem},
    register::Reg,
};
use std::fmt;
use strum_macros::EnumIter;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum JumpType {
    #[display(fmt = "jmp")]
    Jmp,
    #[display(fmt = "je")]
    Je,
    #[display(fmt = "jne")]
    Jne,
    #[display(fmt = "jg")]
    Jg,
    #[display(fmt = "jge")]
    Jge,
    #[display(fmt = "jl")]
    Jl,
    #[display(fmt = "jle")]
    Jle,
    #[display(fmt = "jz")]
    Jz,
    #[display(fmt = "jnz")]
    Jnz,
}

impl JumpType {
    pub fn is_conditional(self) -> bool {
        self != JumpType::Jmp
    }

    /// The condition code used by `setcc`; unconditional jumps have none.
    pub fn condition_code(self) -> Option<&'static str> {
        match self {
            JumpType::Jmp => None,
            JumpType::Je => Some("e"),
            JumpType::Jne => Some("ne"),
            JumpType::Jg => Some("g"),
            JumpType::Jge => Some("ge"),
            JumpType::Jl => Some("l"),
            JumpType::Jle => Some("le"),
            JumpType::Jz => Some("z"),
            JumpType::Jnz => Some("nz"),
        }
    }

    pub fn for_comparison(operator: mir::Operator) -> Option<Self> {
        use mir::Operator::*;
        match operator {
            Lt => Some(JumpType::Jl),
            Le => Some(JumpType::Jle),
            Gt => Some(JumpType::Jg),
            Ge => Some(JumpType::Jge),
            Eq => Some(JumpType::Je),
            Ne => Some(JumpType::Jne),
            _ => None,
        }
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum AlBinaryOpType {
    #[display(fmt = "add")]
    Add,
    #[display(fmt = "sub")]
    Sub,
    #[display(fmt = "and")]
    And,
    #[display(fmt = "or")]
    Or,
    #[display(fmt = "xor")]
    Xor,
}

impl AlBinaryOpType {
    pub fn for_operator(operator: mir::Operator) -> Option<Self> {
        match operator {
            mir::Operator::Add => Some(AlBinaryOpType::Add),
            mir::Operator::Sub => Some(AlBinaryOpType::Sub),
            mir::Operator::And => Some(AlBinaryOpType::And),
            mir::Operator::Or => Some(AlBinaryOpType::Or),
            mir::Operator::Xor => Some(AlBinaryOpType::Xor),
            _ => None,
        }
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum AlUnaryOpType {
    #[display(fmt = "neg")]
    Neg,
    #[display(fmt = "inc")]
    Inc,
    #[display(fmt = "dec")]
    Dec,
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum ShiftType {
    #[display(fmt = "shl")]
    Shl,
    #[display(fmt = "shr")]
    Shr,
    #[display(fmt = "sal")]
    Sal,
    #[display(fmt = "sar")]
    Sar,
}

/// An Intel syntax x86-64 instruction over machine and abstract registers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Instruction {
    /// `movabs dest, value` for values that do not fit an immediate.
    MoveFromLong {
        dest: Reg,
        value: i64,
    },
    MoveToMem {
        dest: Mem,
        src: ConstOrReg,
    },
    MoveToReg {
        dest: Reg,
        src: Arg,
    },
    LoadEffectiveAddress {
        dest: Reg,
        mem: Mem,
    },
    CmpConstOrReg {
        minuend: RegOrMem,
        subtrahend: ConstOrReg,
    },
    CmpMem {
        minuend: Reg,
        subtrahend: Mem,
    },
    /// `setcc` into the lowest byte of `reg`, followed by a zero extension
    /// into the whole register. `reg` must be a machine register.
    SetOnFlag {
        jump_type: JumpType,
        reg: Reg,
    },
    JumpLabel {
        jump_type: JumpType,
        label: String,
    },
    JumpAddress {
        jump_type: JumpType,
        arg: Arg,
    },
    /// `arguments` is the number of arguments passed, the first six of
    /// which live in the argument registers.
    CallAddress {
        address: Arg,
        arguments: usize,
    },
    Return,
    AlBinaryOpMemDest {
        op: AlBinaryOpType,
        dest: Mem,
        src: ConstOrReg,
    },
    AlBinaryOpRegDest {
        op: AlBinaryOpType,
        dest: Reg,
        src: Arg,
    },
    /// `rdx:rax = rax * arg`
    IMulOneArg {
        arg: RegOrMem,
    },
    IMulTwoArgs {
        dest: Reg,
        src: RegOrMem,
    },
    IMulThreeArgs {
        dest: Reg,
        src: RegOrMem,
        immediate: Const,
    },
    Cqo,
    IDiv {
        divisor: RegOrMem,
    },
    AlUnaryOp {
        op: AlUnaryOpType,
        dest: RegOrMem,
    },
    Shift {
        op: ShiftType,
        dest: RegOrMem,
        count: u8,
    },
    Push {
        arg: Arg,
    },
    Pop {
        dest: RegOrMem,
    },
    Label {
        name: String,
    },
    Comment {
        text: String,
    },
}

impl Instruction {
    pub fn mov(dest: Reg, src: impl Into<Arg>) -> Self {
        Instruction::MoveToReg {
            dest,
            src: src.into(),
        }
    }

    pub fn mov_to_mem(dest: Mem, src: impl Into<ConstOrReg>) -> Self {
        Instruction::MoveToMem {
            dest,
            src: src.into(),
        }
    }

    pub fn binop(op: AlBinaryOpType, dest: Reg, src: impl Into<Arg>) -> Self {
        Instruction::AlBinaryOpRegDest {
            op,
            dest,
            src: src.into(),
        }
    }

    pub fn jump(jump_type: JumpType, label: impl Into<String>) -> Self {
        Instruction::JumpLabel {
            jump_type,
            label: label.into(),
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Instruction::Label { name: name.into() }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Instruction::Comment { text: text.into() }
    }

    pub fn is_comment(&self) -> bool {
        match self {
            Instruction::Comment { .. } => true,
            _ => false,
        }
    }

    /// Apply `f` to every register operand, including the registers of
    /// memory operands.
    pub fn map_registers(self, f: &mut impl FnMut(Reg) -> Reg) -> Self {
        use self::Instruction::*;
        match self {
            MoveFromLong { dest, value } => MoveFromLong {
                dest: f(dest),
                value,
            },
            MoveToMem { dest, src } => MoveToMem {
                dest: dest.map_registers(f),
                src: src.map_registers(f),
            },
            MoveToReg { dest, src } => MoveToReg {
                dest: f(dest),
                src: src.map_registers(f),
            },
            LoadEffectiveAddress { dest, mem } => LoadEffectiveAddress {
                dest: f(dest),
                mem: mem.map_registers(f),
            },
            CmpConstOrReg {
                minuend,
                subtrahend,
            } => CmpConstOrReg {
                minuend: minuend.map_registers(f),
                subtrahend: subtrahend.map_registers(f),
            },
            CmpMem {
                minuend,
                subtrahend,
            } => CmpMem {
                minuend: f(minuend),
                subtrahend: subtrahend.map_registers(f),
            },
            SetOnFlag { jump_type, reg } => SetOnFlag {
                jump_type,
                reg: f(reg),
            },
            JumpAddress { jump_type, arg } => JumpAddress {
                jump_type,
                arg: arg.map_registers(f),
            },
            CallAddress { address, arguments } => CallAddress {
                address: address.map_registers(f),
                arguments,
            },
            AlBinaryOpMemDest { op, dest, src } => AlBinaryOpMemDest {
                op,
                dest: dest.map_registers(f),
                src: src.map_registers(f),
            },
            AlBinaryOpRegDest { op, dest, src } => AlBinaryOpRegDest {
                op,
                dest: f(dest),
                src: src.map_registers(f),
            },
            IMulOneArg { arg } => IMulOneArg {
                arg: arg.map_registers(f),
            },
            IMulTwoArgs { dest, src } => IMulTwoArgs {
                dest: f(dest),
                src: src.map_registers(f),
            },
            IMulThreeArgs {
                dest,
                src,
                immediate,
            } => IMulThreeArgs {
                dest: f(dest),
                src: src.map_registers(f),
                immediate,
            },
            IDiv { divisor } => IDiv {
                divisor: divisor.map_registers(f),
            },
            AlUnaryOp { op, dest } => AlUnaryOp {
                op,
                dest: dest.map_registers(f),
            },
            Shift { op, dest, count } => Shift {
                op,
                dest: dest.map_registers(f),
                count,
            },
            Push { arg } => Push {
                arg: arg.map_registers(f),
            },
            Pop { dest } => Pop {
                dest: dest.map_registers(f),
            },
            instr @ JumpLabel { .. }
            | instr @ Return
            | instr @ Cqo
            | instr @ Label { .. }
            | instr @ Comment { .. } => instr,
        }
    }

    /// Apply `f` to every memory operand.
    pub fn map_memory(self, f: &mut impl FnMut(Mem) -> Mem) -> Self {
        use self::Instruction::*;
        fn arg(arg: Arg, f: &mut dyn FnMut(Mem) -> Mem) -> Arg {
            match arg {
                Arg::Mem(mem) => Arg::Mem(f(mem)),
                a => a,
            }
        }
        fn reg_or_mem(rm: RegOrMem, f: &mut dyn FnMut(Mem) -> Mem) -> RegOrMem {
            match rm {
                RegOrMem::Mem(mem) => RegOrMem::Mem(f(mem)),
                r => r,
            }
        }
        match self {
            MoveToMem { dest, src } => MoveToMem { dest: f(dest), src },
            MoveToReg { dest, src } => MoveToReg {
                dest,
                src: arg(src, f),
            },
            LoadEffectiveAddress { dest, mem } => LoadEffectiveAddress { dest, mem: f(mem) },
            CmpConstOrReg {
                minuend,
                subtrahend,
            } => CmpConstOrReg {
                minuend: reg_or_mem(minuend, f),
                subtrahend,
            },
            CmpMem {
                minuend,
                subtrahend,
            } => CmpMem {
                minuend,
                subtrahend: f(subtrahend),
            },
            JumpAddress { jump_type, arg: a } => JumpAddress {
                jump_type,
                arg: arg(a, f),
            },
            CallAddress { address, arguments } => CallAddress {
                address: arg(address, f),
                arguments,
            },
            AlBinaryOpMemDest { op, dest, src } => AlBinaryOpMemDest {
                op,
                dest: f(dest),
                src,
            },
            AlBinaryOpRegDest { op, dest, src } => AlBinaryOpRegDest {
                op,
                dest,
                src: arg(src, f),
            },
            IMulOneArg { arg: a } => IMulOneArg {
                arg: reg_or_mem(a, f),
            },
            IMulTwoArgs { dest, src } => IMulTwoArgs {
                dest,
                src: reg_or_mem(src, f),
            },
            IMulThreeArgs {
                dest,
                src,
                immediate,
            } => IMulThreeArgs {
                dest,
                src: reg_or_mem(src, f),
                immediate,
            },
            IDiv { divisor } => IDiv {
                divisor: reg_or_mem(divisor, f),
            },
            AlUnaryOp { op, dest } => AlUnaryOp {
                op,
                dest: reg_or_mem(dest, f),
            },
            Shift { op, dest, count } => Shift {
                op,
                dest: reg_or_mem(dest, f),
                count,
            },
            Push { arg: a } => Push { arg: arg(a, f) },
            Pop { dest } => Pop {
                dest: reg_or_mem(dest, f),
            },
            instr => instr,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use self::Instruction::*;
        match self {
            MoveFromLong { dest, value } => write!(fmt, "movabs {}, {}", dest, value),
            MoveToMem { dest, src } => write!(fmt, "mov {}, {}", dest, src),
            MoveToReg { dest, src } => write!(fmt, "mov {}, {}", dest, src),
            LoadEffectiveAddress { dest, mem } => write!(fmt, "lea {}, {}", dest, mem),
            CmpConstOrReg {
                minuend,
                subtrahend,
            } => write!(fmt, "cmp {}, {}", minuend, subtrahend),
            CmpMem {
                minuend,
                subtrahend,
            } => write!(fmt, "cmp {}, {}", minuend, subtrahend),
            SetOnFlag { jump_type, reg } => {
                let cc = jump_type.condition_code().unwrap_or("");
                // unallocated registers have no byte name and print as is
                let byte = reg.byte_name().unwrap_or_else(|| reg.id().to_string());
                write!(fmt, "set{} {}\nmovzx {}, {}", cc, byte, reg, byte)
            }
            JumpLabel { jump_type, label } => write!(fmt, "{} {}", jump_type, label),
            JumpAddress { jump_type, arg } => write!(fmt, "{} {}", jump_type, arg),
            CallAddress { address, .. } => write!(fmt, "call {}", address),
            Return => write!(fmt, "ret"),
            AlBinaryOpMemDest { op, dest, src } => write!(fmt, "{} {}, {}", op, dest, src),
            AlBinaryOpRegDest { op, dest, src } => write!(fmt, "{} {}, {}", op, dest, src),
            IMulOneArg { arg } => write!(fmt, "imul {}", arg),
            IMulTwoArgs { dest, src } => write!(fmt, "imul {}, {}", dest, src),
            IMulThreeArgs {
                dest,
                src,
                immediate,
            } => write!(fmt, "imul {}, {}, {}", dest, src, immediate),
            Cqo => write!(fmt, "cqo"),
            IDiv { divisor } => write!(fmt, "idiv {}", divisor),
            AlUnaryOp { op, dest } => write!(fmt, "{} {}", op, dest),
            Shift { op, dest, count } => write!(fmt, "{} {}, {}", op, dest, count),
            Push { arg } => write!(fmt, "push {}", arg),
            Pop { dest } => write!(fmt, "pop {}", dest),
            Label { name } => write!(fmt, "{}:", name),
            Comment { text } => write!(fmt, "## {}", text),
        }
    }
}
