//! Fused-kernel evaluation for the simulated device
//!
//! Each statement is lowered to a gather tree and evaluated once per output
//! element, the way a generated kernel computes one work item. Reductions are
//! lowered first and run as separate two-pass work-group tree reductions;
//! their results enter the element kernel as constants.

use crate::buffer::{HostBuffer, Shape};
use crate::error::{Error, Result};
use crate::expr::{AssignOp, BinaryOp, Expr, Operand, ReduceOp, Statement, UnaryOp};
use crate::numeric::NumericProfile;

/// Lowered expression node.
#[derive(Debug, Clone)]
enum Node {
    Load(HostBuffer),
    Const(f64),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Shift {
        arg: Box<Node>,
        offset: isize,
        last: usize,
    },
    Repmat {
        arg: Box<Node>,
        rows: usize,
        cols: usize,
    },
    Trans(Box<Node>),
    Diag(Box<Node>),
}

impl Node {
    /// Value of logical element `(i, j)`. Scalar nodes ignore the index.
    fn fetch(&self, i: usize, j: usize) -> f64 {
        match self {
            Node::Load(buf) => buf.at(i, j),
            Node::Const(v) => *v,
            Node::Unary(op, arg) => op.apply(arg.fetch(i, j)),
            Node::Binary(op, lhs, rhs) => op.apply(lhs.fetch(i, j), rhs.fetch(i, j)),
            Node::Shift { arg, offset, last } => {
                let src = (i as isize).saturating_add(*offset).clamp(0, *last as isize) as usize;
                arg.fetch(src, 0)
            }
            Node::Repmat { arg, rows, cols } => arg.fetch(i % rows, j % cols),
            Node::Trans(arg) => arg.fetch(j, i),
            Node::Diag(arg) => arg.fetch(i, i),
        }
    }
}

struct Lowered {
    node: Node,
    shape: Shape,
}

fn kernel_error(what: impl std::fmt::Display) -> Error {
    Error::device(format!("kernel generation failed: {}", what))
}

/// Per-device kernel generator.
#[derive(Debug, Clone, Copy)]
pub struct KernelGenerator {
    profile: NumericProfile,
    work_group_size: usize,
}

impl KernelGenerator {
    /// `work_group_size` is rounded down to a power of two.
    pub fn new(profile: NumericProfile, work_group_size: usize) -> Self {
        let wg = work_group_size.max(1);
        let wg = 1usize << (usize::BITS - 1 - wg.leading_zeros());
        Self {
            profile,
            work_group_size: wg,
        }
    }

    pub fn work_group_size(&self) -> usize {
        self.work_group_size
    }

    /// Compute the new contents of `statement`'s destination.
    ///
    /// `load` returns the current device contents of an operand.
    pub fn run_statement(
        &self,
        statement: &Statement,
        load: &dyn Fn(&Operand) -> Result<HostBuffer>,
    ) -> Result<HostBuffer> {
        let dest = load(&statement.dest)?;
        let value = self.lower(&statement.value, load)?;
        let target = dest.shape();
        if !value.shape.is_scalar() && !value.shape.same_dims(&target) {
            return Err(kernel_error(format!(
                "'{}' produces {} but destination is {}",
                statement, value.shape, target
            )));
        }

        let (rows, cols) = target.dims();
        let mut out = HostBuffer::zeros(target);
        for i in 0..rows {
            for j in 0..cols {
                let mut v = value.node.fetch(i, j);
                if statement.op == AssignOp::AddAssign {
                    v += dest.at(i, j);
                }
                out.set_at(i, j, self.profile.quantize(v));
            }
        }
        Ok(out)
    }

    fn lower(&self, expr: &Expr, load: &dyn Fn(&Operand) -> Result<HostBuffer>) -> Result<Lowered> {
        let lowered = match expr {
            Expr::Operand(o) => {
                let buf = load(o)?;
                let shape = buf.shape();
                Lowered {
                    node: Node::Load(buf),
                    shape,
                }
            }
            Expr::Literal(v) => Lowered {
                node: Node::Const(self.profile.quantize(*v)),
                shape: Shape::Scalar,
            },
            Expr::Unary { op, arg } => {
                let arg = self.lower(arg, load)?;
                Lowered {
                    node: Node::Unary(*op, Box::new(arg.node)),
                    shape: arg.shape,
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.lower(lhs, load)?;
                let r = self.lower(rhs, load)?;
                let shape = match (l.shape.is_scalar(), r.shape.is_scalar()) {
                    (true, _) => r.shape,
                    (false, true) => l.shape,
                    (false, false) if *op == BinaryOp::Mul => {
                        return Err(kernel_error(format!(
                            "'*' between {} and {} is not elementwise",
                            l.shape, r.shape
                        )))
                    }
                    (false, false) if l.shape.same_dims(&r.shape) => l.shape,
                    (false, false) => {
                        return Err(kernel_error(format!(
                            "'{}' between {} and {}",
                            op.symbol(),
                            l.shape,
                            r.shape
                        )))
                    }
                };
                Lowered {
                    node: Node::Binary(*op, Box::new(l.node), Box::new(r.node)),
                    shape,
                }
            }
            Expr::Shift { arg, offset } => {
                let arg = self.lower(arg, load)?;
                let n = match arg.shape {
                    Shape::Vector(n) => n,
                    other => return Err(kernel_error(format!("shift of {}", other))),
                };
                Lowered {
                    node: Node::Shift {
                        arg: Box::new(arg.node),
                        offset: *offset,
                        last: n.saturating_sub(1),
                    },
                    shape: arg.shape,
                }
            }
            Expr::Repmat { arg, rows, cols } => {
                let arg = self.lower(arg, load)?;
                if arg.shape.is_scalar() {
                    return Err(kernel_error("repmat of a scalar"));
                }
                let (r, c) = arg.shape.dims();
                Lowered {
                    node: Node::Repmat {
                        arg: Box::new(arg.node),
                        rows: r,
                        cols: c,
                    },
                    shape: Shape::matrix(r * rows, c * cols, arg.shape.layout()),
                }
            }
            Expr::Trans(arg) => {
                let arg = self.lower(arg, load)?;
                let shape = match arg.shape {
                    Shape::Matrix { rows, cols, layout } => Shape::matrix(cols, rows, layout),
                    other => return Err(kernel_error(format!("trans of {}", other))),
                };
                Lowered {
                    node: Node::Trans(Box::new(arg.node)),
                    shape,
                }
            }
            Expr::Diag(arg) => {
                let arg = self.lower(arg, load)?;
                let shape = match arg.shape {
                    Shape::Matrix { rows, cols, .. } => Shape::Vector(rows.min(cols)),
                    other => return Err(kernel_error(format!("diag of {}", other))),
                };
                Lowered {
                    node: Node::Diag(Box::new(arg.node)),
                    shape,
                }
            }
            Expr::Reduce { op, arg } => {
                let arg = self.lower(arg, load)?;
                self.reduction(*op, arg)?
            }
            Expr::InnerProd { lhs, rhs } => {
                let l = self.lower(lhs, load)?;
                let r = self.lower(rhs, load)?;
                match (l.shape, r.shape) {
                    (Shape::Vector(a), Shape::Vector(b)) if a == b => {}
                    (a, b) => return Err(kernel_error(format!("inner_prod of {} and {}", a, b))),
                }
                let products = Lowered {
                    node: Node::Binary(BinaryOp::ElementProd, Box::new(l.node), Box::new(r.node)),
                    shape: l.shape,
                };
                self.reduction(ReduceOp::Sum, products)?
            }
        };
        Ok(lowered)
    }

    fn reduction(&self, op: ReduceOp, arg: Lowered) -> Result<Lowered> {
        let n = arg.shape.len();
        if n == 0 && op != ReduceOp::Sum {
            return Err(kernel_error(format!("{} reduction over an empty operand", op.name())));
        }
        let (_, cols) = arg.shape.dims();
        let value = self.tree_reduce(op, n, |k| arg.node.fetch(k / cols, k % cols));
        Ok(Lowered {
            node: Node::Const(self.profile.quantize(value)),
            shape: Shape::Scalar,
        })
    }

    /// Two-pass reduction: a pairwise tree inside each work group, then a
    /// sequential fold over the per-group partials.
    fn tree_reduce(&self, op: ReduceOp, n: usize, value: impl Fn(usize) -> f64) -> f64 {
        let wg = self.work_group_size;
        let mut partials = Vec::with_capacity(n.div_ceil(wg));
        let mut local = vec![op.identity(); wg];
        for start in (0..n).step_by(wg) {
            for (t, slot) in local.iter_mut().enumerate() {
                let k = start + t;
                *slot = if k < n { value(k) } else { op.identity() };
            }
            let mut stride = wg / 2;
            while stride > 0 {
                for t in 0..stride {
                    local[t] = op.combine(local[t], local[t + stride]);
                }
                stride /= 2;
            }
            partials.push(local[0]);
        }
        partials
            .into_iter()
            .fold(op.identity(), |acc, p| op.combine(acc, p))
    }
}
