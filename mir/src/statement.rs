use crate::expression::Expression;
use itertools::Itertools;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Statement {
    MoveTemp {
        temporary_id: String,
        source: Expression,
    },
    MoveMem {
        memory_index_expression: Expression,
        source: Expression,
    },
    CallFunction {
        function_expression: Expression,
        arguments: Vec<Expression>,
        #[serde(default)]
        return_collector: Option<String>,
    },
    Sequence {
        statements: Vec<Statement>,
    },
    Jump {
        label: String,
    },
    ConditionalJump {
        condition: Expression,
        label1: String,
        label2: String,
    },
    /// Jumps to `label1` if `condition` is non-zero, falls through otherwise.
    ConditionalJumpFallThrough {
        condition: Expression,
        label1: String,
    },
    Label {
        name: String,
    },
    Return {
        #[serde(default)]
        return_value: Option<Expression>,
    },
}

impl Statement {
    pub fn move_temp(temporary_id: impl Into<String>, source: Expression) -> Self {
        Statement::MoveTemp {
            temporary_id: temporary_id.into(),
            source,
        }
    }

    pub fn move_mem(memory_index_expression: Expression, source: Expression) -> Self {
        Statement::MoveMem {
            memory_index_expression,
            source,
        }
    }

    pub fn call(
        function_expression: Expression,
        arguments: Vec<Expression>,
        return_collector: Option<&str>,
    ) -> Self {
        Statement::CallFunction {
            function_expression,
            arguments,
            return_collector: return_collector.map(str::to_string),
        }
    }

    pub fn jump(label: impl Into<String>) -> Self {
        Statement::Jump {
            label: label.into(),
        }
    }

    pub fn cjump_fallthrough(condition: Expression, label1: impl Into<String>) -> Self {
        Statement::ConditionalJumpFallThrough {
            condition,
            label1: label1.into(),
        }
    }

    pub fn label(name: impl Into<String>) -> Self {
        Statement::Label { name: name.into() }
    }

    pub fn ret(return_value: Option<Expression>) -> Self {
        Statement::Return { return_value }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::MoveTemp {
                temporary_id,
                source,
            } => write!(fmt, "{} = {};", temporary_id, source),
            Statement::MoveMem {
                memory_index_expression,
                source,
            } => write!(fmt, "MEM[{}] = {};", memory_index_expression, source),
            Statement::CallFunction {
                function_expression,
                arguments,
                return_collector,
            } => {
                if let Some(collector) = return_collector {
                    write!(fmt, "{} = ", collector)?;
                }
                write!(fmt, "{}({});", function_expression, arguments.iter().join(", "))
            }
            Statement::Sequence { statements } => {
                write!(fmt, "{}", statements.iter().join("\n"))
            }
            Statement::Jump { label } => write!(fmt, "goto {};", label),
            Statement::ConditionalJump {
                condition,
                label1,
                label2,
            } => write!(
                fmt,
                "if ({}) goto {}; else goto {};",
                condition, label1, label2
            ),
            Statement::ConditionalJumpFallThrough { condition, label1 } => {
                write!(fmt, "if ({}) goto {};", condition, label1)
            }
            Statement::Label { name } => write!(fmt, "{}:", name),
            Statement::Return {
                return_value: Some(value),
            } => write!(fmt, "return {};", value),
            Statement::Return { return_value: None } => write!(fmt, "return;"),
        }
    }
}
