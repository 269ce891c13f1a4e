//! Generation of one complete function: argument setup, tiling, register
//! allocation and the frame around the allocated body.

use crate::{
    abstract_register::AbstractRegisterSource,
    allocator::{self, callee_saved},
    amd64::{AlBinaryOpType, Amd64Reg, Const, Instruction, Mem, Reg, RegOrMem},
    peephole, tiling, BackendError, Options,
};

const NUM_ARG_REGS: usize = 6;

/// Round the frame of `slots` stack slots up to a multiple of 16 bytes.
pub fn frame_size(slots: usize) -> usize {
    (8 * slots + 15) / 16 * 16
}

/// Move every argument from its register or stack location into the
/// temporary the body expects it in.
fn argument_moves(function: &mir::Function) -> Result<Vec<Instruction>, BackendError> {
    let mut instructions = vec![];
    for (idx, temp) in function.argument_temps.iter().enumerate() {
        let dest = tiling::temp_reg(temp)?;
        match Amd64Reg::arg(idx) {
            Some(reg) => instructions.push(Instruction::mov(dest, Reg::machine(reg))),
            None => {
                let offset = 16 + 8 * (idx - NUM_ARG_REGS) as i32;
                instructions.push(Instruction::mov(
                    dest,
                    Mem::reg_with_displacement(Reg::machine(Amd64Reg::Bp), Const::Int(offset)),
                ));
            }
        }
    }
    Ok(instructions)
}

fn needs_frame(function: &mir::Function, stack_slots: usize, body: &[Instruction]) -> bool {
    stack_slots > 0
        || function.number_of_arguments() > NUM_ARG_REGS
        || body.iter().any(|instr| match instr {
            Instruction::CallAddress { .. } => true,
            _ => false,
        })
}

pub fn generate_function(
    function: &mir::Function,
    options: &Options,
) -> Result<Vec<Instruction>, BackendError> {
    let name = &function.function_name;
    log::info!(
        "generating {} with {} arguments",
        name,
        function.number_of_arguments()
    );

    let mut source = AbstractRegisterSource::new();
    let mut body = argument_moves(function)?;
    body.extend(tiling::tile_function(
        name,
        &function.main_body_statements,
        &mut source,
    )?);
    let body = callee_saved::wrap(body);
    let allocation = allocator::allocate(name, body, function.has_return, &mut source, options)?;
    log::debug!(
        "{} needs {} stack slots after {} allocation rounds",
        name,
        allocation.stack_slots,
        allocation.rounds
    );

    let mut body = allocation.instructions;
    if options.remove_comments {
        peephole::optimize(&mut body);
    }
    let frame = needs_frame(function, allocation.stack_slots, &body);
    let rbp = Reg::machine(Amd64Reg::Bp);
    let rsp = Reg::machine(Amd64Reg::Sp);

    let mut instructions = vec![Instruction::label(name.clone())];
    if !options.remove_comments {
        instructions.push(Instruction::comment(format!("{} prologue starts", name)));
    }
    if frame {
        instructions.push(Instruction::Push {
            arg: rbp.clone().into(),
        });
        instructions.push(Instruction::mov(rbp.clone(), rsp.clone()));
        if allocation.stack_slots > 0 {
            instructions.push(Instruction::binop(
                AlBinaryOpType::Sub,
                rsp.clone(),
                Const::Int(frame_size(allocation.stack_slots) as i32),
            ));
        }
    }
    if !options.remove_comments {
        instructions.push(Instruction::comment(format!("{} prologue ends", name)));
    }

    instructions.extend(body);

    if !options.remove_comments {
        instructions.push(Instruction::comment(format!("{} epilogue starts", name)));
    }
    if frame {
        instructions.push(Instruction::mov(rsp, rbp.clone()));
        instructions.push(Instruction::Pop {
            dest: RegOrMem::Reg(rbp),
        });
    }
    instructions.push(Instruction::Return);
    if !options.remove_comments {
        instructions.push(Instruction::comment(format!("{} epilogue ends", name)));
    }
    Ok(instructions)
}
