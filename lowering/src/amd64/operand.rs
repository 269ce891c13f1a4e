use super::register::{Amd64Reg, Reg};
use std::fmt;

/// An immediate: either an integer or a symbol the assembler resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Const {
    Int(i32),
    Name(String),
}

impl Const {
    pub fn name(name: impl Into<String>) -> Self {
        Const::Name(name.into())
    }
}

impl fmt::Display for Const {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(value) => write!(fmt, "{}", value),
            Const::Name(name) => write!(fmt, "{}", name),
        }
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    #[display(fmt = "1")]
    One,
    #[display(fmt = "2")]
    Two,
    #[display(fmt = "4")]
    Four,
    #[display(fmt = "8")]
    Eight,
}

impl Scale {
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Scale::One),
            2 => Some(Scale::Two),
            4 => Some(Scale::Four),
            8 => Some(Scale::Eight),
            _ => None,
        }
    }

    pub fn value(self) -> i64 {
        match self {
            Scale::One => 1,
            Scale::Two => 2,
            Scale::Four => 4,
            Scale::Eight => 8,
        }
    }
}

/// A memory operand `[base + index * scale + displacement]`. At least one of
/// the components is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Option<Reg>,
    pub multiple_of: Option<(Reg, Scale)>,
    pub displacement: Option<Const>,
}

impl Mem {
    pub fn new(
        base: Option<Reg>,
        multiple_of: Option<(Reg, Scale)>,
        displacement: Option<Const>,
    ) -> Self {
        debug_assert!(base.is_some() || multiple_of.is_some() || displacement.is_some());
        Mem {
            base,
            multiple_of,
            displacement,
        }
    }

    pub fn reg(base: Reg) -> Self {
        Mem::new(Some(base), None, None)
    }

    pub fn constant(displacement: Const) -> Self {
        Mem::new(None, None, Some(displacement))
    }

    pub fn reg_with_displacement(base: Reg, displacement: Const) -> Self {
        Mem::new(Some(base), None, Some(displacement))
    }

    /// `[rip+name]`
    pub fn rip_relative(name: impl Into<String>) -> Self {
        Mem::reg_with_displacement(Reg::rip(), Const::name(name))
    }

    /// The `k`th 8 byte stack slot below the frame pointer, `[rbp-8k]`.
    pub fn stack_slot(k: usize) -> Self {
        Mem::reg_with_displacement(
            Reg::machine(Amd64Reg::Bp),
            Const::Int(-8 * k as i32),
        )
    }

    /// The inverse of [`Mem::stack_slot`].
    pub fn slot_index(&self) -> Option<usize> {
        match self {
            Mem {
                base: Some(base),
                multiple_of: None,
                displacement: Some(Const::Int(disp)),
            } if base.machine_reg() == Some(Amd64Reg::Bp) && *disp < 0 && *disp % 8 == 0 => {
                Some((-*disp / 8) as usize)
            }
            _ => None,
        }
    }

    /// The registers this operand reads to compute its address.
    pub fn registers(&self) -> impl Iterator<Item = &Reg> {
        self.base
            .iter()
            .chain(self.multiple_of.iter().map(|(reg, _)| reg))
    }

    pub fn map_registers(self, f: &mut impl FnMut(Reg) -> Reg) -> Self {
        Mem {
            base: self.base.map(&mut *f),
            multiple_of: self.multiple_of.map(|(reg, scale)| (f(reg), scale)),
            displacement: self.displacement,
        }
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut address = String::new();
        if let Some(base) = &self.base {
            address.push_str(base.id());
        }
        if let Some((reg, scale)) = &self.multiple_of {
            if !address.is_empty() {
                address.push('+');
            }
            address.push_str(&format!("{}*{}", reg, scale));
        }
        match &self.displacement {
            None => (),
            Some(disp) if address.is_empty() => address.push_str(&disp.to_string()),
            Some(Const::Int(value)) if *value < 0 => address.push_str(&value.to_string()),
            Some(disp) => address.push_str(&format!("+{}", disp)),
        }
        write!(fmt, "qword ptr [{}]", address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstOrReg {
    Const(Const),
    Reg(Reg),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegOrMem {
    Reg(Reg),
    Mem(Mem),
}

/// Any operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arg {
    Const(Const),
    Reg(Reg),
    Mem(Mem),
}

impl ConstOrReg {
    pub fn map_registers(self, f: &mut impl FnMut(Reg) -> Reg) -> Self {
        match self {
            ConstOrReg::Reg(reg) => ConstOrReg::Reg(f(reg)),
            c => c,
        }
    }
}

impl RegOrMem {
    pub fn map_registers(self, f: &mut impl FnMut(Reg) -> Reg) -> Self {
        match self {
            RegOrMem::Reg(reg) => RegOrMem::Reg(f(reg)),
            RegOrMem::Mem(mem) => RegOrMem::Mem(mem.map_registers(f)),
        }
    }
}

impl Arg {
    pub fn map_registers(self, f: &mut impl FnMut(Reg) -> Reg) -> Self {
        match self {
            Arg::Reg(reg) => Arg::Reg(f(reg)),
            Arg::Mem(mem) => Arg::Mem(mem.map_registers(f)),
            c => c,
        }
    }
}

impl From<Const> for ConstOrReg {
    fn from(c: Const) -> Self {
        ConstOrReg::Const(c)
    }
}

impl From<Reg> for ConstOrReg {
    fn from(reg: Reg) -> Self {
        ConstOrReg::Reg(reg)
    }
}

impl From<Reg> for RegOrMem {
    fn from(reg: Reg) -> Self {
        RegOrMem::Reg(reg)
    }
}

impl From<Mem> for RegOrMem {
    fn from(mem: Mem) -> Self {
        RegOrMem::Mem(mem)
    }
}

impl From<Const> for Arg {
    fn from(c: Const) -> Self {
        Arg::Const(c)
    }
}

impl From<Reg> for Arg {
    fn from(reg: Reg) -> Self {
        Arg::Reg(reg)
    }
}

impl From<Mem> for Arg {
    fn from(mem: Mem) -> Self {
        Arg::Mem(mem)
    }
}

impl From<ConstOrReg> for Arg {
    fn from(c: ConstOrReg) -> Self {
        match c {
            ConstOrReg::Const(c) => Arg::Const(c),
            ConstOrReg::Reg(reg) => Arg::Reg(reg),
        }
    }
}

impl From<RegOrMem> for Arg {
    fn from(r: RegOrMem) -> Self {
        match r {
            RegOrMem::Reg(reg) => Arg::Reg(reg),
            RegOrMem::Mem(mem) => Arg::Mem(mem),
        }
    }
}

impl fmt::Display for ConstOrReg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstOrReg::Const(c) => write!(fmt, "{}", c),
            ConstOrReg::Reg(reg) => write!(fmt, "{}", reg),
        }
    }
}

impl fmt::Display for RegOrMem {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegOrMem::Reg(reg) => write!(fmt, "{}", reg),
            RegOrMem::Mem(mem) => write!(fmt, "{}", mem),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Const(c) => write!(fmt, "{}", c),
            Arg::Reg(reg) => write!(fmt, "{}", reg),
            Arg::Mem(mem) => write!(fmt, "{}", mem),
        }
    }
}
