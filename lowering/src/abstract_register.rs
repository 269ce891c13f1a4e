use crate::amd64::Reg;

pub(crate) const ABSTRACT_REG_PREFIX: &str = "_ABSTRACT_REG_";

/// Hands out fresh abstract registers for one function.
///
/// Every function being compiled owns its own source, so numbering starts
/// at `_ABSTRACT_REG_0` for each function and no state is shared between
/// functions.
#[derive(Debug, Default)]
pub struct AbstractRegisterSource {
    next_id: usize,
}

impl AbstractRegisterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_reg(&mut self) -> Reg {
        let reg = Reg::new(format!("{}{}", ABSTRACT_REG_PREFIX, self.next_id));
        self.next_id += 1;
        reg
    }

    /// Number of registers handed out so far.
    pub fn count(&self) -> usize {
        self.next_id
    }
}
