use crate::env::Environment;
use crate::error::{Result, SigilError};
use crate::lexer::Word;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn from_keyword(keyword: &str) -> Option<ArithOp> {
        Some(match keyword {
            "add" => ArithOp::Add,
            "sub" => ArithOp::Sub,
            "mul" => ArithOp::Mul,
            "div" => ArithOp::Div,
            _ => return None,
        })
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
        }
    }

    fn usage(self) -> &'static str {
        match self {
            ArithOp::Add => "add <n1> [n2 ...]",
            ArithOp::Sub => "sub <n1> [n2 ...]",
            ArithOp::Mul => "mul <n1> [n2 ...]",
            ArithOp::Div => "div <n1> <n2>",
        }
    }
}

/// Resolve `operands` to numbers and apply `op`.
///
/// `add`, `sub` and `mul` fold left to right over at least one operand; `div` takes
/// exactly two.
pub fn evaluate(op: ArithOp, operands: &[Word], env: &Environment) -> Result<Value> {
    let numbers = operands
        .iter()
        .map(|word| {
            let value = env.resolve(word);
            value
                .as_number()
                .ok_or_else(|| SigilError::NotNumeric(value.to_string()))
        })
        .collect::<Result<Vec<f64>>>()?;

    let Some((&first, rest)) = numbers.split_first() else {
        return Err(SigilError::Usage(op.usage()));
    };

    let result = match op {
        ArithOp::Add => rest.iter().fold(first, |acc, n| acc + n),
        ArithOp::Sub => rest.iter().fold(first, |acc, n| acc - n),
        ArithOp::Mul => rest.iter().fold(first, |acc, n| acc * n),
        ArithOp::Div => match rest {
            [divisor] if *divisor == 0.0 => return Err(SigilError::DivideByZero),
            [divisor] => first / divisor,
            _ => return Err(SigilError::Usage(op.usage())),
        },
    };
    Ok(Value::Number(result))
}
