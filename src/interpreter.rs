mod coerce;
mod compare;

use miette::Diagnostic;
use thiserror::Error;

use crate::{
    ast::{Expr, Op, OperatorExpr, Statement},
    value::{Lookup, Value},
};
use self::compare::Comparison;

#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Undefined parameter '{name}'")]
    UndefinedParameter { name: String },
    #[error("Undefined property '{key}'")]
    UndefinedProperty { key: String },
    #[error("No such function '{name}'")]
    NoSuchFunction { name: String },
    #[error("Internal: {what}")]
    Internal { what: String },
}

/// A fully evaluated statement: the command word plus its stringified
/// argument sequence, laid out name/value pairwise (a bare argument
/// contributes a single entry, so the list can be odd).
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub params: Vec<String>,
}

/// Tree-walking evaluator. One instance serves a whole stream; statements
/// execute strictly one at a time.
pub struct Interpreter<L: Lookup> {
    lookup: L,
}

impl<L: Lookup> Interpreter<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    pub fn lookup_mut(&mut self) -> &mut L {
        &mut self.lookup
    }

    /// Evaluate every argument of `statement` and stringify the results in
    /// order. The first failure aborts the statement; the stream itself is
    /// unaffected.
    pub fn exec(&mut self, statement: &Statement) -> Result<Command, EvalError> {
        let mut params = Vec::with_capacity(statement.args.len());
        for arg in &statement.args {
            let value = self.eval(arg)?;
            params.push(self.stringify(&value));
        }
        Ok(Command {
            name: statement.command.clone(),
            params,
        })
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value<L::Dict>, EvalError> {
        match expr {
            Expr::Str(value) => Ok(Value::str(value)),
            Expr::Bool(value) => Ok(Value::Bool(*value)),
            Expr::Int(value) => Ok(Value::Int(*value)),
            Expr::Float(value) => Ok(Value::Float(*value)),
            Expr::Parameter(name) => {
                match self.lookup.lookup(&Value::str(name), None) {
                    Value::Unknown => Err(EvalError::UndefinedParameter { name: name.clone() }),
                    value => Ok(value),
                }
            }
            // no functions exist; the node is parsed for forward
            // compatibility and rejected here
            Expr::Function(function) => Err(EvalError::NoSuchFunction {
                name: function.name.clone(),
            }),
            Expr::Operator(operator) => self.eval_operator(operator),
        }
    }

    fn eval_operator(&mut self, expr: &OperatorExpr) -> Result<Value<L::Dict>, EvalError> {
        match expr.op {
            Op::IfElse => {
                let (then, test, else_) = ternary_operands(expr)?;
                let test = self.eval(test)?;
                if coerce::to_bool(&test) {
                    self.eval(then)
                } else {
                    self.eval(else_)
                }
            }
            Op::Lookup => {
                let (base, key) = binary_operands(expr)?;
                let base = self.eval(base)?;
                let key = self.eval(key)?;
                let result = match &base {
                    Value::Dict(dict) => {
                        let dict = dict.clone();
                        self.lookup.lookup(&key, Some(&dict))
                    }
                    _ => Value::Unknown,
                };
                match result {
                    Value::Unknown => Err(EvalError::UndefinedProperty {
                        key: self.stringify(&key),
                    }),
                    value => Ok(value),
                }
            }
            Op::Not => {
                let value = self.eval(unary_operand(expr)?)?;
                Ok(Value::Bool(!coerce::to_bool(&value)))
            }
            // both sides evaluate eagerly; only the boolean combination
            // matters
            Op::And | Op::Or => {
                let (left, right) = binary_operands(expr)?;
                let left = coerce::to_bool(&self.eval(left)?);
                let right = coerce::to_bool(&self.eval(right)?);
                Ok(Value::Bool(if expr.op == Op::And {
                    left && right
                } else {
                    left || right
                }))
            }
            Op::Eq | Op::Lt | Op::Gt | Op::Le | Op::Ge => {
                let (left, right) = binary_operands(expr)?;
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let lookup = &mut self.lookup;
                let ordering = compare::compare(&left, &right, |dict| lookup.serialize(dict))
                    .ok_or_else(|| EvalError::Internal {
                        what: "comparison of an unknown value".to_string(),
                    })?;
                Ok(Value::Bool(satisfies(expr.op, ordering)))
            }
            Op::Concat => {
                let (left, right) = binary_operands(expr)?;
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let mut out = self.stringify(&left);
                out.push_str(&self.stringify(&right));
                Ok(out.into())
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Mod | Op::Pow => {
                let (left, right) = binary_operands(expr)?;
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                arith(expr.op, &left, &right)
            }
            Op::Neg => {
                let value = self.eval(unary_operand(expr)?)?;
                Ok(match Num::of(&value) {
                    Num::Int(value) => Value::Int(value.wrapping_neg()),
                    Num::Float(value) => Value::Float(-value),
                })
            }
            Op::CastStr => {
                let value = self.eval(unary_operand(expr)?)?;
                Ok(self.stringify(&value).into())
            }
            Op::CastInt => {
                let value = self.eval(unary_operand(expr)?)?;
                Ok(Value::Int(coerce::to_int(&value)))
            }
            Op::CastFloat => {
                let value = self.eval(unary_operand(expr)?)?;
                Ok(Value::Float(coerce::to_float(&value)))
            }
            Op::CastBool => {
                let value = self.eval(unary_operand(expr)?)?;
                Ok(Value::Bool(coerce::to_bool(&value)))
            }
        }
    }

    fn stringify(&mut self, value: &Value<L::Dict>) -> String {
        let lookup = &mut self.lookup;
        coerce::to_string(value, |dict| lookup.serialize(dict))
    }
}

/// One operand of an arithmetic operator after numeric coercion: everything
/// is an integer unless the original value was a string or a float, which
/// forces the float path for both sides.
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of<D>(value: &Value<D>) -> Self {
        match value {
            Value::Str(_) | Value::Float(_) => Self::Float(coerce::to_float(value)),
            _ => Self::Int(coerce::to_int(value)),
        }
    }
}

fn arith<D>(op: Op, left: &Value<D>, right: &Value<D>) -> Result<Value<D>, EvalError> {
    let float_path = matches!(left, Value::Str(_) | Value::Float(_))
        || matches!(right, Value::Str(_) | Value::Float(_));
    if float_path {
        let left = coerce::to_float(left);
        let right = coerce::to_float(right);
        Ok(Value::Float(match op {
            Op::Add => left + right,
            Op::Sub => left - right,
            Op::Mul => left * right,
            Op::Div if right == 0.0 => f64::NAN,
            Op::Div => left / right,
            Op::Mod if right == 0.0 => f64::NAN,
            Op::Mod => left % right,
            Op::Pow => left.powf(right),
            _ => return Err(malformed(op)),
        }))
    } else {
        let left = coerce::to_int(left);
        let right = coerce::to_int(right);
        Ok(match op {
            Op::Add => Value::Int(left.wrapping_add(right)),
            Op::Sub => Value::Int(left.wrapping_sub(right)),
            Op::Mul => Value::Int(left.wrapping_mul(right)),
            // a zero divisor degrades to the float NaN even on the
            // integer path
            Op::Div if right == 0 => Value::Float(f64::NAN),
            Op::Div => Value::Int(left.wrapping_div(right)),
            Op::Mod if right == 0 => Value::Float(f64::NAN),
            Op::Mod => Value::Int(left.wrapping_rem(right)),
            // integer pow goes through floating pow; the floor(x + 0.5)
            // rounding is load-bearing even where it is inexact for large
            // magnitudes
            Op::Pow => Value::Int(((left as f64).powf(right as f64) + 0.5).floor() as i64),
            _ => return Err(malformed(op)),
        })
    }
}

fn satisfies(op: Op, ordering: Comparison) -> bool {
    matches!(
        (op, ordering),
        (Op::Eq, Comparison::Equal)
            | (Op::Lt, Comparison::Less)
            | (Op::Gt, Comparison::Greater)
            | (Op::Le, Comparison::Less | Comparison::Equal)
            | (Op::Ge, Comparison::Greater | Comparison::Equal)
    )
}

fn unary_operand(expr: &OperatorExpr) -> Result<&Expr, EvalError> {
    match expr.operands.as_slice() {
        [operand] => Ok(operand),
        _ => Err(malformed(expr.op)),
    }
}

fn binary_operands(expr: &OperatorExpr) -> Result<(&Expr, &Expr), EvalError> {
    match expr.operands.as_slice() {
        [left, right] => Ok((left, right)),
        _ => Err(malformed(expr.op)),
    }
}

fn ternary_operands(expr: &OperatorExpr) -> Result<(&Expr, &Expr, &Expr), EvalError> {
    match expr.operands.as_slice() {
        [then, test, else_] => Ok((then, test, else_)),
        _ => Err(malformed(expr.op)),
    }
}

fn malformed(op: Op) -> EvalError {
    EvalError::Internal {
        what: format!("malformed '{}' operator node", op),
    }
}
