//! Addressing mode selection.
//!
//! Tries to express an address computation as a single x86 memory operand
//! `[base + index * scale + displacement]`. Of the seven combinations of
//! present components, the cheapest one wins; ties keep the candidate found
//! first. A rejected expression never allocates a register.

use super::{cheaper, Tiled, Tiler};
use crate::{
    amd64::{Const, Instruction, Mem, Reg, Scale},
    BackendError,
};
use mir::{Expression, Operator};

type TileResult = Result<Option<Tiled<Mem>>, BackendError>;

/// `index * scale`
struct MultipleOf {
    instructions: Vec<Instruction>,
    reg: Reg,
    scale: Scale,
}

fn scale_constant(expression: &Expression) -> Option<Scale> {
    expression
        .as_i32_constant()
        .and_then(|value| Scale::from_value(i64::from(value)))
}

fn multiple_of(
    tiler: &mut Tiler<'_>,
    expression: &Expression,
) -> Result<Option<MultipleOf>, BackendError> {
    match expression {
        Expression::Temporary { id } => Ok(Some(MultipleOf {
            instructions: vec![],
            reg: super::temp_reg(id)?,
            scale: Scale::One,
        })),
        Expression::Op {
            operator: Operator::Mul,
            e1,
            e2,
        } => match scale_constant(e2) {
            Some(scale) => {
                let e1 = tiler.tile_expression(e1)?;
                Ok(Some(MultipleOf {
                    instructions: e1.instructions,
                    reg: e1.operand,
                    scale,
                }))
            }
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

/// The displacement for `e1 + e2` or `e1 - e2` if `e2` is a suitable constant.
fn displacement_of(operator: Operator, e2: &Expression) -> Option<i32> {
    let value = e2.as_i32_constant()?;
    match operator {
        Operator::Add => Some(value),
        Operator::Sub => value.checked_neg(),
        _ => None,
    }
}

fn binary_parts(expression: &Expression) -> Option<(Operator, &Expression, &Expression)> {
    match expression {
        Expression::Op { operator, e1, e2 } => Some((*operator, &**e1, &**e2)),
        _ => None,
    }
}

fn is_op(expression: &Expression) -> bool {
    binary_parts(expression).is_some()
}

/// `[base + displacement]`
fn reg_with_displacement(tiler: &mut Tiler<'_>, expression: &Expression) -> TileResult {
    let (operator, e1, e2) = match binary_parts(expression) {
        Some(parts) => parts,
        None => return Ok(None),
    };
    let displacement = match displacement_of(operator, e2) {
        Some(displacement) => displacement,
        None => return Ok(None),
    };
    let base = tiler.tile_expression(e1)?;
    Ok(Some(Tiled::new(
        base.instructions,
        Mem::reg_with_displacement(base.operand, Const::Int(displacement)),
    )))
}

/// `[base + index * scale]`, trying both operand orders.
fn reg_with_multiple_of(tiler: &mut Tiler<'_>, expression: &Expression) -> TileResult {
    let (e1, e2) = match binary_parts(expression) {
        Some((Operator::Add, e1, e2)) => (e1, e2),
        _ => return Ok(None),
    };
    let mut result = None;
    if let Some(index) = multiple_of(tiler, e2)? {
        let base = tiler.tile_expression(e1)?;
        let mut instructions = index.instructions;
        instructions.extend(base.instructions);
        result = Some(Tiled::new(
            instructions,
            Mem::new(Some(base.operand), Some((index.reg, index.scale)), None),
        ));
    }
    if let Some(index) = multiple_of(tiler, e1)? {
        let base = tiler.tile_expression(e2)?;
        let mut instructions = index.instructions;
        instructions.extend(base.instructions);
        let candidate = Tiled::new(
            instructions,
            Mem::new(Some(base.operand), Some((index.reg, index.scale)), None),
        );
        result = Some(cheaper(result, candidate));
    }
    Ok(result)
}

/// `[index * scale + displacement]`
fn multiple_of_with_displacement(tiler: &mut Tiler<'_>, expression: &Expression) -> TileResult {
    let (e1, displacement) = match binary_parts(expression) {
        Some((Operator::Add, e1, e2)) => match e2.as_i32_constant() {
            Some(displacement) => (e1, displacement),
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    Ok(multiple_of(tiler, e1)?.map(|index| {
        Tiled::new(
            index.instructions,
            Mem::new(None, Some((index.reg, index.scale)), Some(Const::Int(displacement))),
        )
    }))
}

/// `[base + index * scale + displacement]`
fn complete(tiler: &mut Tiler<'_>, expression: &Expression) -> TileResult {
    let (e1, e2) = match binary_parts(expression) {
        Some((Operator::Add, e1, e2)) => (e1, e2),
        _ => return Ok(None),
    };

    // (base + index * scale) + displacement
    if let Some(displacement) = e2.as_i32_constant() {
        if is_op(e1) {
            return Ok(reg_with_multiple_of(tiler, e1)?.map(|tiled| {
                let Tiled {
                    instructions,
                    operand,
                } = tiled;
                Tiled::new(
                    instructions,
                    Mem::new(
                        operand.base,
                        operand.multiple_of,
                        Some(Const::Int(displacement)),
                    ),
                )
            }));
        }
    }

    // index * scale + (base + displacement), in either order
    let mut result = None;
    let mut split = None;
    if let Some(index) = multiple_of(tiler, e1)? {
        if is_op(e2) {
            split = Some((index, e2));
        }
    }
    if split.is_none() {
        if let Some(index) = multiple_of(tiler, e2)? {
            if is_op(e1) {
                split = Some((index, e1));
            }
        }
    }
    if let Some((index, rest)) = split {
        if let Some(base) = reg_with_displacement(tiler, rest)? {
            let mut instructions = index.instructions;
            instructions.extend(base.instructions);
            result = Some(Tiled::new(
                instructions,
                Mem::new(
                    base.operand.base,
                    Some((index.reg, index.scale)),
                    base.operand.displacement,
                ),
            ));
        }
    }

    // base + (index * scale + displacement), in either order
    let (scaled, base) = if is_op(e1) {
        (e1, e2)
    } else if is_op(e2) {
        (e2, e1)
    } else {
        return Ok(result);
    };
    let scaled = match multiple_of_with_displacement(tiler, scaled)? {
        Some(scaled) => scaled,
        None => return Ok(result),
    };
    let base = tiler.tile_expression(base)?;
    let mut instructions = scaled.instructions;
    instructions.extend(base.instructions);
    let candidate = Tiled::new(
        instructions,
        Mem::new(
            Some(base.operand),
            scaled.operand.multiple_of,
            scaled.operand.displacement,
        ),
    );
    Ok(Some(cheaper(result, candidate)))
}

/// Express the address `expression` evaluates to as a memory operand.
pub(super) fn tile_address(tiler: &mut Tiler<'_>, expression: &Expression) -> TileResult {
    match expression {
        Expression::Constant { .. } => Ok(expression
            .as_i32_constant()
            .map(|value| Tiled::operand_only(Mem::constant(Const::Int(value))))),
        Expression::Name { name } => Ok(Some(Tiled::new(
            vec![Instruction::comment(format!(
                "force named address with rip: {}",
                name
            ))],
            Mem::rip_relative(name.clone()),
        ))),
        Expression::Temporary { id } => Ok(Some(Tiled::operand_only(Mem::reg(super::temp_reg(
            id,
        )?)))),
        Expression::Op { .. } => {
            let mut result = complete(tiler, expression)?;
            if let Some(index) = multiple_of(tiler, expression)? {
                let candidate = Tiled::new(
                    index.instructions,
                    Mem::new(None, Some((index.reg, index.scale)), None),
                );
                result = Some(cheaper(result, candidate));
            }
            let rest = vec![
                reg_with_displacement(tiler, expression)?,
                reg_with_multiple_of(tiler, expression)?,
                multiple_of_with_displacement(tiler, expression)?,
            ];
            for candidate in rest.into_iter().flatten() {
                result = Some(cheaper(result, candidate));
            }
            Ok(result)
        }
        Expression::Mem { .. } | Expression::Call { .. } | Expression::ExprSequence { .. } => {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abstract_register::AbstractRegisterSource;
    use mir::Expression as E;

    fn address(expression: E) -> (Option<String>, usize) {
        let mut source = AbstractRegisterSource::new();
        let mut tiler = Tiler::new("test", &mut source);
        let result = tile_address(&mut tiler, &expression)
            .unwrap()
            .map(|tiled| tiled.operand.to_string());
        drop(tiler);
        (result, source.count())
    }

    fn add(e1: E, e2: E) -> E {
        E::op(Operator::Add, e1, e2)
    }

    fn mul(e1: E, e2: E) -> E {
        E::op(Operator::Mul, e1, e2)
    }

    #[test]
    fn leaves_work() {
        assert_eq!(Some("qword ptr [1]".to_string()), address(E::constant(1)).0);
        assert_eq!(None, address(E::constant(1 << 40)).0);
        assert_eq!(Some("qword ptr [t]".to_string()), address(E::temp("t")).0);
        assert_eq!(
            Some("qword ptr [rip+g]".to_string()),
            address(E::name("g")).0
        );
        assert_eq!(None, address(E::mem(E::temp("t"))).0);
    }

    #[test]
    fn base_with_displacement_works() {
        assert_eq!(
            Some("qword ptr [a+16]".to_string()),
            address(add(E::temp("a"), E::constant(16))).0
        );
        assert_eq!(
            Some("qword ptr [a-8]".to_string()),
            address(E::op(Operator::Sub, E::temp("a"), E::constant(8))).0
        );
    }

    #[test]
    fn scaled_index_works() {
        assert_eq!(
            Some("qword ptr [i*4]".to_string()),
            address(mul(E::temp("i"), E::constant(4))).0
        );
        assert_eq!(
            Some("qword ptr [i*8+8]".to_string()),
            address(add(mul(E::temp("i"), E::constant(8)), E::constant(8))).0
        );
        assert_eq!(
            Some("qword ptr [a+i*2]".to_string()),
            address(add(E::temp("a"), mul(E::temp("i"), E::constant(2)))).0
        );
    }

    #[test]
    fn complete_address_works() {
        let complete = add(
            add(E::temp("a"), mul(E::temp("i"), E::constant(8))),
            E::constant(8),
        );
        assert_eq!(Some("qword ptr [a+i*8+8]".to_string()), address(complete).0);

        let complete = add(
            mul(E::temp("i"), E::constant(8)),
            add(E::temp("a"), E::constant(24)),
        );
        assert_eq!(Some("qword ptr [a+i*8+24]".to_string()), address(complete).0);
    }

    #[test]
    fn rejected_expression_allocates_nothing() {
        assert_eq!(
            (None, 0),
            address(mul(E::constant(1), E::constant(65536)))
        );
        assert_eq!(
            (None, 0),
            address(E::op(Operator::Xor, E::temp("a"), E::temp("b")))
        );
    }
}
