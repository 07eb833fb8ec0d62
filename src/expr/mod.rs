//! Algebraic expression model
//!
//! Expressions name operands symbolically and are built once per test case.
//! The reference model evaluates them one statement at a time; backends are
//! free to fuse a whole [`CustomOperation`] into a single dispatch.
//!
//! ```
//! use fusion_oracle::expr::{shift, CustomOperation, Operand};
//!
//! let w = Operand::vector("w");
//! let x = Operand::vector("x");
//! let op = CustomOperation::new().with(w.assign(&x + shift(&x, -5) + shift(&x, 3)));
//! assert_eq!(op.to_string(), "w = x + shift(x, -5) + shift(x, 3)");
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::ops;

// ---------------------------------------------------------------------------
// Operands
// ---------------------------------------------------------------------------

/// Declared kind of a named operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Scalar,
    Vector,
    Matrix,
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperandKind::Scalar => write!(f, "scalar"),
            OperandKind::Vector => write!(f, "vector"),
            OperandKind::Matrix => write!(f, "matrix"),
        }
    }
}

/// Reference to a named buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operand {
    pub name: String,
    pub kind: OperandKind,
}

impl Operand {
    pub fn new(name: impl Into<String>, kind: OperandKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self::new(name, OperandKind::Scalar)
    }

    pub fn vector(name: impl Into<String>) -> Self {
        Self::new(name, OperandKind::Vector)
    }

    pub fn matrix(name: impl Into<String>) -> Self {
        Self::new(name, OperandKind::Matrix)
    }

    /// `self = value`
    pub fn assign(&self, value: impl Into<Expr>) -> Statement {
        Statement {
            dest: self.clone(),
            op: AssignOp::Assign,
            value: value.into(),
        }
    }

    /// `self += value`
    pub fn add_assign(&self, value: impl Into<Expr>) -> Statement {
        Statement {
            dest: self.clone(),
            op: AssignOp::AddAssign,
            value: value.into(),
        }
    }

    /// This operand as an expression leaf.
    pub fn expr(&self) -> Expr {
        Expr::Operand(self.clone())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Exp,
}

impl UnaryOp {
    pub fn apply(self, v: f64) -> f64 {
        match self {
            UnaryOp::Neg => -v,
            UnaryOp::Exp => v.exp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    /// Scaling; at least one side must be a scalar.
    Mul,
    /// Elementwise division with scalar broadcast.
    Div,
    /// Elementwise (Hadamard) product.
    ElementProd,
    /// 1 where the left side exceeds the right, else 0.
    Greater,
}

impl BinaryOp {
    pub fn apply(self, l: f64, r: f64) -> f64 {
        match self {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul | BinaryOp::ElementProd => l * r,
            BinaryOp::Div => l / r,
            BinaryOp::Greater => {
                if l > r {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::ElementProd => "element_prod",
            BinaryOp::Greater => ">",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Greater => 1,
            BinaryOp::Add | BinaryOp::Sub => 2,
            BinaryOp::Mul | BinaryOp::Div => 3,
            BinaryOp::ElementProd => 4,
        }
    }
}

/// Associative fold used by reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Max,
    Min,
}

impl ReduceOp {
    /// Neutral element of the fold.
    pub fn identity(self) -> f64 {
        match self {
            ReduceOp::Sum => 0.0,
            ReduceOp::Max => f64::NEG_INFINITY,
            ReduceOp::Min => f64::INFINITY,
        }
    }

    pub fn combine(self, acc: f64, v: f64) -> f64 {
        match self {
            ReduceOp::Sum => acc + v,
            ReduceOp::Max => acc.max(v),
            ReduceOp::Min => acc.min(v),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
        }
    }
}

// ---------------------------------------------------------------------------
// Expr
// ---------------------------------------------------------------------------

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Operand(Operand),
    Literal(f64),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `shift(v, k)[i] = v[clamp(i + k, 0, n - 1)]`
    Shift {
        arg: Box<Expr>,
        offset: isize,
    },
    /// Tile `arg` `rows × cols` times.
    Repmat {
        arg: Box<Expr>,
        rows: usize,
        cols: usize,
    },
    Trans(Box<Expr>),
    /// Main diagonal of a square matrix.
    Diag(Box<Expr>),
    Reduce {
        op: ReduceOp,
        arg: Box<Expr>,
    },
    InnerProd {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// `self > rhs` as a 0/1 valued expression.
    pub fn greater_than(self, rhs: impl Into<Expr>) -> Self {
        Expr::binary(BinaryOp::Greater, self, rhs.into())
    }

    /// Names of every operand read by this expression.
    pub fn operands(&self) -> BTreeSet<String> {
        self.operand_refs().into_iter().map(|o| o.name.clone()).collect()
    }

    /// Every operand occurrence in evaluation order, duplicates included.
    pub fn operand_refs(&self) -> Vec<&Operand> {
        let mut out = Vec::new();
        self.collect_operands(&mut out);
        out
    }

    fn collect_operands<'a>(&'a self, out: &mut Vec<&'a Operand>) {
        match self {
            Expr::Operand(o) => out.push(o),
            Expr::Literal(_) => {}
            Expr::Unary { arg, .. }
            | Expr::Shift { arg, .. }
            | Expr::Repmat { arg, .. }
            | Expr::Reduce { arg, .. }
            | Expr::Trans(arg)
            | Expr::Diag(arg) => arg.collect_operands(out),
            Expr::Binary { lhs, rhs, .. } | Expr::InnerProd { lhs, rhs } => {
                lhs.collect_operands(out);
                rhs.collect_operands(out);
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } if *op != BinaryOp::ElementProd => op.precedence(),
            _ => u8::MAX,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parent: u8, tight: bool) -> fmt::Result {
        let prec = self.precedence();
        if prec < parent || (tight && prec == parent) {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Operand(o) => write!(f, "{}", o),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::Unary { op: UnaryOp::Neg, arg } => {
                write!(f, "-")?;
                arg.fmt_child(f, u8::MAX, false)
            }
            Expr::Unary { op: UnaryOp::Exp, arg } => write!(f, "exp({})", arg),
            Expr::Binary {
                op: BinaryOp::ElementProd,
                lhs,
                rhs,
            } => write!(f, "element_prod({}, {})", lhs, rhs),
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                lhs.fmt_child(f, prec, false)?;
                write!(f, " {} ", op.symbol())?;
                let tight = matches!(op, BinaryOp::Sub | BinaryOp::Div | BinaryOp::Greater);
                rhs.fmt_child(f, prec, tight)
            }
            Expr::Shift { arg, offset } => write!(f, "shift({}, {})", arg, offset),
            Expr::Repmat { arg, rows, cols } => write!(f, "repmat({}, {}, {})", arg, rows, cols),
            Expr::Trans(arg) => write!(f, "trans({})", arg),
            Expr::Diag(arg) => write!(f, "diag({})", arg),
            Expr::Reduce { op, arg } => write!(f, "{}({})", op.name(), arg),
            Expr::InnerProd { lhs, rhs } => write!(f, "inner_prod({}, {})", lhs, rhs),
        }
    }
}

impl From<Operand> for Expr {
    fn from(o: Operand) -> Self {
        Expr::Operand(o)
    }
}

impl From<&Operand> for Expr {
    fn from(o: &Operand) -> Self {
        Expr::Operand(o.clone())
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Literal(v)
    }
}

// ---------------------------------------------------------------------------
// Operator overloading
// ---------------------------------------------------------------------------

macro_rules! impl_binary_ops {
    ($($ty:ty),*) => {$(
        impl<R: Into<Expr>> ops::Add<R> for $ty {
            type Output = Expr;
            fn add(self, rhs: R) -> Expr {
                Expr::binary(BinaryOp::Add, self.into(), rhs.into())
            }
        }

        impl<R: Into<Expr>> ops::Sub<R> for $ty {
            type Output = Expr;
            fn sub(self, rhs: R) -> Expr {
                Expr::binary(BinaryOp::Sub, self.into(), rhs.into())
            }
        }

        impl<R: Into<Expr>> ops::Mul<R> for $ty {
            type Output = Expr;
            fn mul(self, rhs: R) -> Expr {
                Expr::binary(BinaryOp::Mul, self.into(), rhs.into())
            }
        }

        impl<R: Into<Expr>> ops::Div<R> for $ty {
            type Output = Expr;
            fn div(self, rhs: R) -> Expr {
                Expr::binary(BinaryOp::Div, self.into(), rhs.into())
            }
        }

        impl ops::Neg for $ty {
            type Output = Expr;
            fn neg(self) -> Expr {
                Expr::Unary {
                    op: UnaryOp::Neg,
                    arg: Box::new(self.into()),
                }
            }
        }
    )*};
}

impl_binary_ops!(Expr, Operand, &Operand);

macro_rules! impl_literal_lhs {
    ($($trait:ident :: $method:ident => $op:expr),*) => {$(
        impl ops::$trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::binary($op, Expr::Literal(self), rhs)
            }
        }

        impl ops::$trait<&Operand> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Operand) -> Expr {
                Expr::binary($op, Expr::Literal(self), rhs.into())
            }
        }
    )*};
}

impl_literal_lhs!(
    Add::add => BinaryOp::Add,
    Sub::sub => BinaryOp::Sub,
    Mul::mul => BinaryOp::Mul,
    Div::div => BinaryOp::Div
);

// ---------------------------------------------------------------------------
// Builder functions
// ---------------------------------------------------------------------------

pub fn shift(arg: impl Into<Expr>, offset: isize) -> Expr {
    Expr::Shift {
        arg: Box::new(arg.into()),
        offset,
    }
}

pub fn repmat(arg: impl Into<Expr>, rows: usize, cols: usize) -> Expr {
    Expr::Repmat {
        arg: Box::new(arg.into()),
        rows,
        cols,
    }
}

pub fn trans(arg: impl Into<Expr>) -> Expr {
    Expr::Trans(Box::new(arg.into()))
}

pub fn diag(arg: impl Into<Expr>) -> Expr {
    Expr::Diag(Box::new(arg.into()))
}

pub fn exp(arg: impl Into<Expr>) -> Expr {
    Expr::Unary {
        op: UnaryOp::Exp,
        arg: Box::new(arg.into()),
    }
}

pub fn element_prod(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    Expr::binary(BinaryOp::ElementProd, lhs.into(), rhs.into())
}

pub fn reduce(op: ReduceOp, arg: impl Into<Expr>) -> Expr {
    Expr::Reduce {
        op,
        arg: Box::new(arg.into()),
    }
}

pub fn reduce_max(arg: impl Into<Expr>) -> Expr {
    reduce(ReduceOp::Max, arg)
}

pub fn reduce_min(arg: impl Into<Expr>) -> Expr {
    reduce(ReduceOp::Min, arg)
}

pub fn reduce_sum(arg: impl Into<Expr>) -> Expr {
    reduce(ReduceOp::Sum, arg)
}

pub fn inner_prod(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
    Expr::InnerProd {
        lhs: Box::new(lhs.into()),
        rhs: Box::new(rhs.into()),
    }
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    Assign,
    AddAssign,
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Assign => write!(f, "="),
            AssignOp::AddAssign => write!(f, "+="),
        }
    }
}

/// `dest = value` or `dest += value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub dest: Operand,
    pub op: AssignOp,
    pub value: Expr,
}

impl Statement {
    /// Operands read by this statement, including the destination for `+=`.
    pub fn reads(&self) -> BTreeSet<String> {
        let mut reads = self.value.operands();
        if self.op == AssignOp::AddAssign {
            reads.insert(self.dest.name.clone());
        }
        reads
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.dest, self.op, self.value)
    }
}

/// Ordered statements meant to run as one fused unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomOperation {
    statements: Vec<Statement>,
}

impl CustomOperation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn add(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Destination operands in first-write order, without repeats.
    pub fn destinations(&self) -> Vec<&Operand> {
        let mut seen = BTreeSet::new();
        self.statements
            .iter()
            .filter(|s| seen.insert(s.dest.name.as_str()))
            .map(|s| &s.dest)
            .collect()
    }

    /// Every operand name read or written by the operation.
    pub fn operands(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for s in &self.statements {
            out.extend(s.reads());
            out.insert(s.dest.name.clone());
        }
        out
    }
}

impl fmt::Display for CustomOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, s) in self.statements.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", s)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_display_simple_sum() {
        let (w, x, y) = (Operand::vector("w"), Operand::vector("x"), Operand::vector("y"));
        assert_eq!(w.assign(&x + &y).to_string(), "w = x + y");
    }

    #[test]
    fn test_display_parenthesizes_lower_precedence() {
        let (x, y) = (Operand::vector("x"), Operand::vector("y"));
        let e = 0.42 * (&x - &y);
        assert_eq!(e.to_string(), "0.42 * (x - y)");
        let e = &x - (&y - &x);
        assert_eq!(e.to_string(), "x - (y - x)");
        let e = (&x - &y) - &x;
        assert_eq!(e.to_string(), "x - y - x");
    }

    #[test]
    fn test_display_structural_ops() {
        let a = Operand::matrix("A");
        let p = Operand::matrix("P");
        let x = Operand::vector("x");
        assert_eq!(repmat(&p, 4, 8).to_string(), "repmat(P, 4, 8)");
        assert_eq!((1.0 / (1.0 + exp(-&a))).to_string(), "1 / (1 + exp(-A))");
        assert_eq!(trans(repmat(&x, 1, 16)).to_string(), "trans(repmat(x, 1, 16))");
        assert_eq!(reduce_max(&x).to_string(), "max(x)");
        assert_eq!(inner_prod(&x, &x).to_string(), "inner_prod(x, x)");
        assert_eq!(x.expr().greater_than(0.5).to_string(), "x > 0.5");
        assert_eq!(diag(&a).to_string(), "diag(A)");
    }

    #[test]
    fn test_operands_collected() {
        let (x, y, z) = (Operand::vector("x"), Operand::vector("y"), Operand::vector("z"));
        let e = element_prod(&x, &y) - 0.2 * &z;
        let names: Vec<_> = e.operands().into_iter().collect();
        assert_eq!(names, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_add_assign_reads_destination() {
        let (c, a) = (Operand::matrix("C"), Operand::matrix("A"));
        let s = c.add_assign(&a);
        assert!(s.reads().contains("C"));
        assert_eq!(s.to_string(), "C += A");
    }

    #[test]
    fn test_destinations_in_first_write_order() {
        let (w, y, z, x) = (
            Operand::vector("w"),
            Operand::vector("y"),
            Operand::vector("z"),
            Operand::vector("x"),
        );
        let op = CustomOperation::new()
            .with(w.assign(&x))
            .with(y.assign(&x))
            .with(w.assign(&y))
            .with(z.assign(&w));
        let names: Vec<_> = op.destinations().iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["w", "y", "z"]);
    }

    #[test]
    fn test_reduce_identities() {
        assert_eq!(ReduceOp::Sum.identity(), 0.0);
        assert_eq!(ReduceOp::Max.combine(ReduceOp::Max.identity(), -3.0), -3.0);
        assert_eq!(ReduceOp::Min.combine(ReduceOp::Min.identity(), 7.0), 7.0);
    }

    #[test]
    fn test_greater_is_numeric() {
        assert_eq!(BinaryOp::Greater.apply(0.5, 0.42), 1.0);
        assert_eq!(BinaryOp::Greater.apply(0.42, 0.42), 0.0);
    }
}
