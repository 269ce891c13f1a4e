//! Memory, strings and builtin functions shared by both interpreters.
//!
//! Memory is a sparse map of 8 byte words. A string is a length word
//! followed by one word per character.

use crate::{InterpretationError, Result};
use mir::GlobalVariable;
use std::collections::HashMap;

/// Highest valid address; `rsp` starts here.
pub const STACK_TOP: i64 = 0x7800_0000;
pub const GLOBALS_START: i64 = 10000;

pub const PRINTLN: &str = "_builtin_println";
pub const INT_TO_STRING: &str = "_builtin_intToString";
pub const STRING_TO_INT: &str = "_builtin_stringToInt";
pub const STRING_CONCAT: &str = "_builtin_stringConcat";
pub const MALLOC: &str = "_builtin_malloc";
pub const THROW: &str = "_builtin_throw";

pub fn is_builtin(name: &str) -> bool {
    [PRINTLN, INT_TO_STRING, STRING_TO_INT, STRING_CONCAT, MALLOC, THROW].contains(&name)
}

fn check_address(address: i64) -> Result<()> {
    if address % 8 != 0 {
        return Err(InterpretationError::UnalignedAccess { address });
    }
    if address < 0 || address > STACK_TOP {
        return Err(InterpretationError::SegmentationFault { address });
    }
    Ok(())
}

#[derive(Debug)]
pub struct Runtime {
    memory: HashMap<i64, i64>,
    globals: HashMap<String, i64>,
    heap_end: i64,
    printed: String,
}

impl Runtime {
    /// Lay out the global strings from [`GLOBALS_START`] on; the heap
    /// starts right after them.
    pub fn new(global_variables: &[GlobalVariable]) -> Result<Self> {
        let mut runtime = Runtime {
            memory: HashMap::new(),
            globals: HashMap::new(),
            heap_end: GLOBALS_START,
            printed: String::new(),
        };
        for global in global_variables {
            let address = runtime.new_string(&global.content)?;
            runtime.globals.insert(global.name.clone(), address);
        }
        Ok(runtime)
    }

    pub fn global(&self, name: &str) -> Option<i64> {
        self.globals.get(name).cloned()
    }

    /// Words that were never written read as zero.
    pub fn load(&self, address: i64) -> Result<i64> {
        check_address(address)?;
        Ok(self.memory.get(&address).cloned().unwrap_or(0))
    }

    pub fn store(&mut self, address: i64, value: i64) -> Result<()> {
        check_address(address)?;
        self.memory.insert(address, value);
        Ok(())
    }

    pub fn malloc(&mut self, size: i64) -> Result<i64> {
        let heap_end = match self.heap_end.checked_add(size) {
            Some(end) if size >= 0 && size % 8 == 0 && end <= STACK_TOP => end,
            _ => return Err(InterpretationError::BadAllocation { size }),
        };
        let pointer = self.heap_end;
        self.heap_end = heap_end;
        Ok(pointer)
    }

    /// The characters of a string must all lie below [`STACK_TOP`].
    pub fn read_string(&self, address: i64) -> Result<String> {
        let len = self.load(address)?;
        if len < 0 || len > (STACK_TOP - address) / 8 {
            return Err(InterpretationError::Malformed {
                reason: format!("string at {} has length {}", address, len),
            });
        }
        let mut string = String::new();
        for idx in 1..=len {
            let code = self.load(address + 8 * idx)?;
            let c = std::char::from_u32(code as u32).ok_or_else(|| {
                InterpretationError::Malformed {
                    reason: format!("character code {} at {}", code, address + 8 * idx),
                }
            })?;
            string.push(c);
        }
        Ok(string)
    }

    pub fn new_string(&mut self, content: &str) -> Result<i64> {
        let chars = content.chars().collect::<Vec<_>>();
        let address = self.malloc(8 * (chars.len() as i64 + 1))?;
        self.store(address, chars.len() as i64)?;
        for (idx, c) in chars.iter().enumerate() {
            self.store(address + 8 * (idx as i64 + 1), *c as i64)?;
        }
        Ok(address)
    }

    /// Run the builtin `name`, or return `None` if there is no such builtin.
    /// Missing arguments read as zero.
    pub fn call_builtin(&mut self, name: &str, arguments: &[i64]) -> Option<Result<i64>> {
        if !is_builtin(name) {
            return None;
        }
        log::trace!("builtin {}({:?})", name, arguments);
        let arg = |idx: usize| arguments.get(idx).cloned().unwrap_or(0);
        Some(match name {
            PRINTLN => self.read_string(arg(0)).map(|string| {
                self.printed.push_str(&string);
                self.printed.push('\n');
                0
            }),
            INT_TO_STRING => self.new_string(&arg(0).to_string()),
            STRING_TO_INT => self.read_string(arg(0)).and_then(|string| {
                string
                    .parse::<i64>()
                    .map_err(|_| InterpretationError::panic(format!("Bad string: {}", string)))
            }),
            STRING_CONCAT => self
                .read_string(arg(0))
                .and_then(|first| Ok(first + &self.read_string(arg(1))?))
                .and_then(|concatenated| self.new_string(&concatenated)),
            MALLOC => self.malloc(arg(0)),
            _ => self
                .read_string(arg(0))
                .and_then(|message| Err(InterpretationError::panic(message))),
        })
    }

    pub fn printed(&self) -> &str {
        &self.printed
    }

    pub fn into_printed(self) -> String {
        self.printed
    }
}
