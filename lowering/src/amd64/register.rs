use lazy_static::lazy_static;
use std::{cmp::Ordering, collections::HashMap, convert::TryFrom, fmt};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

#[derive(Debug, Hash, PartialEq, Eq, Copy, Clone)]
pub enum Size {
    One,
    Eight,
}

#[derive(Display, Debug, Hash, PartialEq, Eq, Copy, Clone, EnumIter)]
pub enum Amd64Reg {
    #[display(fmt = "a")]
    A,
    #[display(fmt = "b")]
    B,
    #[display(fmt = "c")]
    C,
    #[display(fmt = "d")]
    D,

    #[display(fmt = "si")]
    Si,
    #[display(fmt = "di")]
    Di,
    #[display(fmt = "sp")]
    Sp,
    #[display(fmt = "bp")]
    Bp,

    #[display(fmt = "r8")]
    R8,
    #[display(fmt = "r9")]
    R9,
    #[display(fmt = "r10")]
    R10,
    #[display(fmt = "r11")]
    R11,
    #[display(fmt = "r12")]
    R12,
    #[display(fmt = "r13")]
    R13,
    #[display(fmt = "r14")]
    R14,
    #[display(fmt = "r15")]
    R15,
}

#[rustfmt::skip]
impl From<Amd64Reg> for usize {
    fn from(reg: Amd64Reg) -> usize {
        match reg {
            Amd64Reg::Di => 0,   // Caller-save
            Amd64Reg::Si => 1,   // Caller-save
            Amd64Reg::D => 2,    // Caller-save
            Amd64Reg::C => 3,    // Caller-save
            Amd64Reg::R8  => 4,  // Caller-save
            Amd64Reg::R9  => 5,  // Caller-save
            Amd64Reg::R10 => 6,  // Caller-save
            Amd64Reg::R11 => 7,  // Caller-save

            Amd64Reg::B => 8,    // Callee-save
            Amd64Reg::R12 => 9,  // Callee-save
            Amd64Reg::R13 => 10, // Callee-save
            Amd64Reg::R14 => 11, // Callee-save
            Amd64Reg::R15 => 12, // Callee-save

            Amd64Reg::A => 13,   // return value, caller-save
            Amd64Reg::Sp => 14,  // never allocated
            Amd64Reg::Bp => 15,  // never allocated
        }
    }
}

#[rustfmt::skip]
impl TryFrom<usize> for Amd64Reg {
    type Error = ();

    fn try_from(idx: usize) -> Result<Self, ()> {
        match idx {
            0  => Ok(Amd64Reg::Di),
            1  => Ok(Amd64Reg::Si),
            2  => Ok(Amd64Reg::D),
            3  => Ok(Amd64Reg::C),
            4  => Ok(Amd64Reg::R8),
            5  => Ok(Amd64Reg::R9),
            6  => Ok(Amd64Reg::R10),
            7  => Ok(Amd64Reg::R11),

            8  => Ok(Amd64Reg::B),
            9  => Ok(Amd64Reg::R12),
            10 => Ok(Amd64Reg::R13),
            11 => Ok(Amd64Reg::R14),
            12 => Ok(Amd64Reg::R15),

            13 => Ok(Amd64Reg::A),
            14 => Ok(Amd64Reg::Sp),
            15 => Ok(Amd64Reg::Bp),
            _  => Err(()),
        }
    }
}

impl Ord for Amd64Reg {
    fn cmp(&self, other: &Amd64Reg) -> Ordering {
        let l: usize = (*self).into();
        let r: usize = (*other).into();
        l.cmp(&r)
    }
}

impl PartialOrd for Amd64Reg {
    fn partial_cmp(&self, other: &Amd64Reg) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Amd64Reg {
    /// The name of the register when accessed with the given operand size,
    /// e.g. `rax`/`al` or `r8`/`r8b`.
    pub fn name(self, size: Size) -> String {
        use self::Amd64Reg::*;
        let (prefix, suffix) = match (self, size) {
            (A, Size::One) | (B, Size::One) | (C, Size::One) | (D, Size::One) => ("", "l"),
            (Si, Size::One) | (Di, Size::One) | (Sp, Size::One) | (Bp, Size::One) => ("", "l"),
            (_, Size::One) => ("", "b"),
            (A, Size::Eight) | (B, Size::Eight) | (C, Size::Eight) | (D, Size::Eight) => {
                ("r", "x")
            }
            (Si, Size::Eight) | (Di, Size::Eight) | (Sp, Size::Eight) | (Bp, Size::Eight) => {
                ("r", "")
            }
            (_, Size::Eight) => ("", ""),
        };
        format!("{}{}{}", prefix, self, suffix)
    }

    /// This function returns the `idx`th register reserved by the X86_64
    /// calling convention for funtion arguments. The order of these
    /// registers is:
    ///
    /// - %rdi
    /// - %rsi
    /// - %rdx
    /// - %rcx
    /// - %r8
    /// - %r9
    ///
    /// Arguments with `idx >= 6` are passed on the stack, so `None` is
    /// returned for them.
    pub fn arg(idx: usize) -> Option<Self> {
        match idx {
            0 => Some(Amd64Reg::Di),
            1 => Some(Amd64Reg::Si),
            2 => Some(Amd64Reg::D),
            3 => Some(Amd64Reg::C),
            4 => Some(Amd64Reg::R8),
            5 => Some(Amd64Reg::R9),
            _ => None,
        }
    }

    pub fn is_caller_save(self) -> bool {
        match self {
            Amd64Reg::A
            | Amd64Reg::Di
            | Amd64Reg::Si
            | Amd64Reg::D
            | Amd64Reg::C
            | Amd64Reg::R8
            | Amd64Reg::R9
            | Amd64Reg::R10
            | Amd64Reg::R11 => true,
            _ => false,
        }
    }

    pub fn is_callee_save(self) -> bool {
        match self {
            Amd64Reg::B | Amd64Reg::R12 | Amd64Reg::R13 | Amd64Reg::R14 | Amd64Reg::R15 => true,
            _ => false,
        }
    }

    /// The registers a function has to restore before returning, except for
    /// `rsp` and `rbp` which the prologue and epilogue take care of.
    pub fn callee_saved() -> impl Iterator<Item = Self> {
        Amd64Reg::all_but_rsp_and_rbp().filter(|reg| reg.is_callee_save())
    }

    pub fn caller_saved() -> impl Iterator<Item = Self> {
        Amd64Reg::all_but_rsp_and_rbp().filter(|reg| reg.is_caller_save())
    }

    /// All registers the allocator may assign, in the order it tries them:
    /// caller-save registers first, then callee-save registers, `rax` last.
    pub fn all_but_rsp_and_rbp() -> impl Iterator<Item = Self> {
        // inclusive range
        (0..=13).filter_map(|i| Amd64Reg::try_from(i).ok())
    }
}

lazy_static! {
    static ref PRE_COLORED: HashMap<String, Amd64Reg> = Amd64Reg::iter()
        .map(|reg| (reg.name(Size::Eight), reg))
        .collect();
}

const RIP: &str = "rip";

/// A register operand. Either one of the 16 machine registers (pre-colored)
/// or an abstract register that still has to be allocated. `rip` is neither:
/// it only appears as base of rip-relative addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg {
    id: String,
}

impl Reg {
    pub fn new(id: impl Into<String>) -> Self {
        Reg { id: id.into() }
    }

    pub fn machine(reg: Amd64Reg) -> Self {
        Reg::new(reg.name(Size::Eight))
    }

    pub fn rip() -> Self {
        Reg::new(RIP)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn machine_reg(&self) -> Option<Amd64Reg> {
        PRE_COLORED.get(&self.id).cloned()
    }

    pub fn is_pre_colored(&self) -> bool {
        PRE_COLORED.contains_key(&self.id)
    }

    pub fn is_rip(&self) -> bool {
        self.id == RIP
    }

    pub fn is_abstract(&self) -> bool {
        !self.is_pre_colored() && !self.is_rip()
    }

    /// Whether the register name collides with a name the backend reserves.
    pub fn is_reserved_name(id: &str) -> bool {
        id == RIP || PRE_COLORED.contains_key(id)
    }

    /// The name of the lowest byte of a machine register, e.g. `al`.
    pub fn byte_name(&self) -> Option<String> {
        self.machine_reg().map(|reg| reg.name(Size::One))
    }
}

impl From<Amd64Reg> for Reg {
    fn from(reg: Amd64Reg) -> Self {
        Reg::machine(reg)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.id)
    }
}
