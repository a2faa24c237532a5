use std::fmt::{self, Display};

use itertools::Itertools;

/// Operators of the expression dialect. `IfElse` carries three operands in
/// the source order of `a if b else c` (then, test, else); `Lookup` carries
/// a base and a key; the casts and `Not`/`Neg` carry one operand; everything
/// else is binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Or,
    And,
    Not,
    Eq,
    Lt,
    Gt,
    Le,
    Ge,
    Concat,
    Add,
    Sub,
    Mod,
    Pow,
    Mul,
    Div,
    Neg,
    IfElse,
    Lookup,
    CastStr,
    CastInt,
    CastFloat,
    CastBool,
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Not => "not",
            Self::Eq => "==",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Concat => "~",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Neg => "neg",
            Self::IfElse => "if-else",
            Self::Lookup => "lookup",
            Self::CastStr => "str",
            Self::CastInt => "int",
            Self::CastFloat => "float",
            Self::CastBool => "boolean",
        })
    }
}

#[derive(Debug, PartialEq)]
pub struct OperatorExpr {
    pub op: Op,
    pub operands: Vec<Expr>,
}

impl Display for OperatorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {})", self.op, self.operands.iter().join(" "))
    }
}

#[derive(Debug, PartialEq)]
pub struct FunctionExpr {
    pub name: String,
    pub args: Vec<Expr>,
}

impl Display for FunctionExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "(call {})", self.name)
        } else {
            write!(f, "(call {} {})", self.name, self.args.iter().join(" "))
        }
    }
}

/// One expression node. Composite variants own their operands outright, so
/// dropping a node tears down the whole subtree.
#[derive(Debug, PartialEq)]
pub enum Expr {
    Parameter(String),
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Operator(OperatorExpr),
    Function(FunctionExpr),
}

impl Expr {
    pub fn op(op: Op, operands: Vec<Expr>) -> Self {
        Self::Operator(OperatorExpr { op, operands })
    }

    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(name) => write!(f, "{}", name),
            Self::Str(value) => write!(f, "{:?}", value),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Operator(expr) => Display::fmt(expr, f),
            Self::Function(expr) => Display::fmt(expr, f),
        }
    }
}

/// One parsed line: a command word plus the flattened argument sequence.
///
/// `args` holds name/value pairs laid out flat: a keyword argument `X=expr`
/// (or a bridged word `X{expr}`) contributes a `Str("X")` node immediately
/// followed by its value node, and the checksum word `*n` contributes
/// `Str("*")` then the value. A bare expression argument contributes a single
/// value node, so consumers must not assume the sequence is strictly even.
#[derive(Debug, PartialEq)]
pub struct Statement {
    pub command: String,
    pub args: Vec<Expr>,
}

impl Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "({})", self.command)
        } else {
            write!(f, "({} {})", self.command, self.args.iter().join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_forms() {
        let expr = Expr::op(
            Op::Add,
            vec![Expr::Int(1), Expr::op(Op::Neg, vec![Expr::Parameter("x".to_string())])],
        );
        assert_eq!(expr.to_string(), "(+ 1 (neg x))");

        let stmt = Statement {
            command: "G1".to_string(),
            args: vec![Expr::str("X"), Expr::Int(3)],
        };
        assert_eq!(stmt.to_string(), "(G1 \"X\" 3)");
    }

    #[test]
    fn deep_and_wide_trees_drop_cleanly() {
        // Composite nodes drop recursively; make sure a pathological tree
        // neither leaks (ownership guarantees that) nor blows the stack at
        // depths far beyond any real statement.
        let mut expr = Expr::Int(0);
        for _ in 0..2_000 {
            expr = Expr::op(Op::Neg, vec![expr]);
        }
        drop(expr);

        let wide = Expr::op(Op::Concat, (0..10_000).map(Expr::Int).collect());
        drop(wide);
    }
}
