use crate::statement::Statement;
use itertools::Itertools;
use std::{cmp::Ordering, fmt};
use strum_macros::EnumIter;

/// Binary operators. `&` and `|` are bitwise, comparisons evaluate to `0`
/// or `1`.
///
/// The declaration order is the canonical operator order used when
/// comparing two `Op` expressions.
#[derive(
    Debug,
    Display,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum Operator {
    #[display(fmt = "*")]
    #[serde(rename = "*")]
    Mul,
    #[display(fmt = "/")]
    #[serde(rename = "/")]
    Div,
    #[display(fmt = "%")]
    #[serde(rename = "%")]
    Mod,
    #[display(fmt = "+")]
    #[serde(rename = "+")]
    Add,
    #[display(fmt = "-")]
    #[serde(rename = "-")]
    Sub,
    #[display(fmt = "&")]
    #[serde(rename = "&")]
    And,
    #[display(fmt = "|")]
    #[serde(rename = "|")]
    Or,
    #[display(fmt = "^")]
    #[serde(rename = "^")]
    Xor,
    #[display(fmt = "<")]
    #[serde(rename = "<")]
    Lt,
    #[display(fmt = "<=")]
    #[serde(rename = "<=")]
    Le,
    #[display(fmt = ">")]
    #[serde(rename = ">")]
    Gt,
    #[display(fmt = ">=")]
    #[serde(rename = ">=")]
    Ge,
    #[display(fmt = "==")]
    #[serde(rename = "==")]
    Eq,
    #[display(fmt = "!=")]
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    pub fn is_comparison(self) -> bool {
        match self {
            Operator::Lt
            | Operator::Le
            | Operator::Gt
            | Operator::Ge
            | Operator::Eq
            | Operator::Ne => true,
            _ => false,
        }
    }

    /// Operators whose operands may be swapped freely.
    pub fn is_commutative(self) -> bool {
        match self {
            Operator::Add
            | Operator::Mul
            | Operator::And
            | Operator::Or
            | Operator::Xor
            | Operator::Eq
            | Operator::Ne => true,
            _ => false,
        }
    }

    /// Evaluate the operator on two 64 bit words with wrapping arithmetic.
    ///
    /// Returns `None` for a division or modulo by zero.
    pub fn evaluate(self, v1: i64, v2: i64) -> Option<i64> {
        let value = match self {
            Operator::Mul => v1.wrapping_mul(v2),
            Operator::Div if v2 == 0 => return None,
            Operator::Div => v1.wrapping_div(v2),
            Operator::Mod if v2 == 0 => return None,
            Operator::Mod => v1.wrapping_rem(v2),
            Operator::Add => v1.wrapping_add(v2),
            Operator::Sub => v1.wrapping_sub(v2),
            Operator::And => v1 & v2,
            Operator::Or => v1 | v2,
            Operator::Xor => v1 ^ v2,
            Operator::Lt => (v1 < v2) as i64,
            Operator::Le => (v1 <= v2) as i64,
            Operator::Gt => (v1 > v2) as i64,
            Operator::Ge => (v1 >= v2) as i64,
            Operator::Eq => (v1 == v2) as i64,
            Operator::Ne => (v1 != v2) as i64,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expression {
    Constant {
        value: i64,
    },
    /// A global symbol: a string constant or a function.
    Name {
        name: String,
    },
    /// A function-local variable.
    Temporary {
        id: String,
    },
    Op {
        operator: Operator,
        e1: Box<Expression>,
        e2: Box<Expression>,
    },
    /// Loads the 8 byte word at the address `expression` evaluates to.
    Mem {
        expression: Box<Expression>,
        #[serde(default)]
        immutable: bool,
    },
    Call {
        function_expression: Box<Expression>,
        arguments: Vec<Expression>,
    },
    ExprSequence {
        statements: Vec<Statement>,
        expression: Box<Expression>,
    },
}

impl Expression {
    pub fn constant(value: i64) -> Self {
        Expression::Constant { value }
    }

    pub fn name(name: impl Into<String>) -> Self {
        Expression::Name { name: name.into() }
    }

    pub fn temp(id: impl Into<String>) -> Self {
        Expression::Temporary { id: id.into() }
    }

    pub fn op(operator: Operator, e1: Expression, e2: Expression) -> Self {
        Expression::Op {
            operator,
            e1: Box::new(e1),
            e2: Box::new(e2),
        }
    }

    /// Like [`Expression::op`], but puts the operands of a commutative
    /// operator into canonical order (greater operand first), so that
    /// `a + b` and `b + a` become the same expression.
    pub fn op_flex_order(operator: Operator, e1: Expression, e2: Expression) -> Self {
        if operator.is_commutative() && e1 < e2 {
            Expression::op(operator, e2, e1)
        } else {
            Expression::op(operator, e1, e2)
        }
    }

    pub fn mem(expression: Expression) -> Self {
        Expression::Mem {
            expression: Box::new(expression),
            immutable: false,
        }
    }

    pub fn immutable_mem(expression: Expression) -> Self {
        Expression::Mem {
            expression: Box::new(expression),
            immutable: true,
        }
    }

    /// The constant value, if this is a constant that fits into a signed
    /// 32 bit immediate.
    pub fn as_i32_constant(&self) -> Option<i32> {
        match self {
            Expression::Constant { value } if i64::from(*value as i32) == *value => {
                Some(*value as i32)
            }
            _ => None,
        }
    }

    fn class_order(&self) -> u8 {
        match self {
            Expression::Constant { .. } => 0,
            Expression::Name { .. } => 1,
            Expression::Temporary { .. } => 2,
            Expression::Mem { .. } => 3,
            Expression::Op { .. } => 4,
            Expression::Call { .. } => 5,
            Expression::ExprSequence { .. } => 6,
        }
    }
}

impl Ord for Expression {
    fn cmp(&self, other: &Expression) -> Ordering {
        use self::Expression::*;
        match (self, other) {
            (Constant { value: v1 }, Constant { value: v2 }) => v1.cmp(v2),
            (Name { name: n1 }, Name { name: n2 }) => n1.cmp(n2),
            (Temporary { id: t1 }, Temporary { id: t2 }) => t1.cmp(t2),
            (
                Mem {
                    expression: e1,
                    immutable: i1,
                },
                Mem {
                    expression: e2,
                    immutable: i2,
                },
            ) => e1.cmp(e2).then(i1.cmp(i2)),
            (
                Op {
                    operator: o1,
                    e1: l1,
                    e2: r1,
                },
                Op {
                    operator: o2,
                    e1: l2,
                    e2: r2,
                },
            ) => o1.cmp(o2).then_with(|| l1.cmp(l2)).then_with(|| r1.cmp(r2)),
            (
                Call {
                    function_expression: f1,
                    arguments: a1,
                },
                Call {
                    function_expression: f2,
                    arguments: a2,
                },
            ) => f1.cmp(f2).then_with(|| a1.cmp(a2)),
            (
                ExprSequence {
                    statements: s1,
                    expression: e1,
                },
                ExprSequence {
                    statements: s2,
                    expression: e2,
                },
            ) => e1.cmp(e2).then_with(|| s1.cmp(s2)),
            _ => self.class_order().cmp(&other.class_order()),
        }
    }
}

impl PartialOrd for Expression {
    fn partial_cmp(&self, other: &Expression) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Constant { value } => write!(fmt, "{}", value),
            Expression::Name { name } => write!(fmt, "{}", name),
            Expression::Temporary { id } => write!(fmt, "{}", id),
            Expression::Op { operator, e1, e2 } => write!(fmt, "({} {} {})", e1, operator, e2),
            Expression::Mem { expression, .. } => write!(fmt, "MEM[{}]", expression),
            Expression::Call {
                function_expression,
                arguments,
            } => write!(fmt, "{}({})", function_expression, arguments.iter().join(", ")),
            Expression::ExprSequence {
                statements,
                expression,
            } => write!(
                fmt,
                "ESEQ([{}], {})",
                statements.iter().join(" "),
                expression
            ),
        }
    }
}
