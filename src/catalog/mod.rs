//! Built-in test catalog
//!
//! The vector suite derives every operand from one random base vector `w0`
//! (`x = 2·w0`, `y = 3·w0`, `z = 4·w0`). The matrix suite is built once per
//! storage layout from a random matrix `A` and a random replication pattern
//! `P`. All randomness comes from one seeded generator, so a configuration
//! always produces the same inputs.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::debug;

use crate::buffer::{HostBuffer, Layout, Shape, Workspace};
use crate::config::{OracleConfig, SuiteKind};
use crate::expr::{
    diag, element_prod, exp, inner_prod, reduce_max, reduce_min, reduce_sum, repmat, shift,
    trans, CustomOperation, Operand, Statement,
};
use crate::numeric::NumericProfile;
use crate::suite::{Suite, TestCase};

/// Build every suite the configuration selects, in configuration order.
pub fn build_suites(config: &OracleConfig) -> Vec<Suite> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut suites = Vec::new();
    for kind in &config.suites {
        match kind {
            SuiteKind::Vector => suites.push(vector_suite(config, &mut rng)),
            SuiteKind::Matrix => {
                for &layout in &config.layouts {
                    suites.push(matrix_suite(config, layout, &mut rng));
                }
            }
        }
    }
    debug!(
        suites = suites.len(),
        cases = suites.iter().map(|s| s.cases.len()).sum::<usize>(),
        "built test catalog"
    );
    suites
}

fn single(statement: Statement) -> CustomOperation {
    CustomOperation::new().with(statement)
}

fn scaled(base: &HostBuffer, factor: f64, profile: NumericProfile) -> HostBuffer {
    base.map(|v| v * factor).quantized(profile)
}

// ---------------------------------------------------------------------------
// Vector suite
// ---------------------------------------------------------------------------

pub fn vector_suite(config: &OracleConfig, rng: &mut StdRng) -> Suite {
    let profile = config.profile;
    let n = config.vector_size;
    let w0 = HostBuffer::random(Shape::Vector(n), profile, rng);
    let inputs = Arc::new(
        Workspace::new()
            .with("x", scaled(&w0, 2.0, profile))
            .with("y", scaled(&w0, 3.0, profile))
            .with("z", scaled(&w0, 4.0, profile))
            .with("w", w0)
            .with("s", HostBuffer::scalar(0.0)),
    );

    let w = Operand::vector("w");
    let x = Operand::vector("x");
    let y = Operand::vector("y");
    let z = Operand::vector("z");
    let s = Operand::scalar("s");

    let operations = vec![
        ("vector-add", single(w.assign(&x + &y))),
        ("vector-add-into-input", single(x.assign(&w + &y))),
        ("vector-greater", single(w.assign(x.expr().greater_than(0.42)))),
        ("vector-negate", single(w.assign(-&w))),
        (
            "vector-shift",
            single(w.assign(&x + shift(&x, -5) + shift(&x, 3))),
        ),
        ("vector-inner-prod", single(s.assign(inner_prod(&x, &y)))),
        ("vector-reduce-max", single(s.assign(reduce_max(&x)))),
        ("vector-reduce-sum", single(s.assign(reduce_sum(&x)))),
        ("vector-reduce-min", single(s.assign(reduce_min(&x)))),
        (
            "vector-multiline",
            CustomOperation::new()
                .with(w.assign(0.42 * (&x - &y)))
                .with(y.assign(element_prod(&x, &x) - &y - element_prod(&x, &z)))
                .with(z.assign(element_prod(&x, &y) - 0.2 * &z)),
        ),
    ];

    let mut suite = Suite::new("vector")
        .with_setup("profile", profile)
        .with_setup("size", n)
        .with_setup("seed", config.seed);
    for (name, op) in operations {
        suite.add_case(TestCase::new(name, op, Arc::clone(&inputs)));
    }
    suite
}

// ---------------------------------------------------------------------------
// Matrix suite
// ---------------------------------------------------------------------------

pub fn matrix_suite(config: &OracleConfig, layout: Layout, rng: &mut StdRng) -> Suite {
    let profile = config.profile;
    let (rows, cols) = (config.matrix.rows, config.matrix.cols);
    let (m, n) = config.replication();

    let a = HostBuffer::random(Shape::matrix(rows, cols, layout), profile, rng);
    let pattern = HostBuffer::random(
        Shape::matrix(config.pattern.rows, config.pattern.cols, layout),
        profile,
        rng,
    );
    let inputs = Arc::new(
        Workspace::new()
            .with("B", a.clone())
            .with("C", a.clone())
            .with("A", a)
            .with("P", pattern)
            .with("x", HostBuffer::random(Shape::Vector(rows), profile, rng))
            .with("y", HostBuffer::random(Shape::Vector(cols), profile, rng))
            .with("d", HostBuffer::zeros(Shape::Vector(rows.min(cols)))),
    );

    let am = Operand::matrix("A");
    let bm = Operand::matrix("B");
    let cm = Operand::matrix("C");
    let pm = Operand::matrix("P");
    let x = Operand::vector("x");
    let y = Operand::vector("y");
    let d = Operand::vector("d");

    let operations = vec![
        ("matrix-add", cm.assign(&am + &bm)),
        ("matrix-repmat", cm.assign(repmat(&pm, m, n))),
        ("matrix-negate", cm.assign(-&am)),
        ("matrix-sigmoid", cm.assign(1.0 / (1.0 + exp(-&am)))),
        ("matrix-diag", d.assign(diag(&am))),
        ("matrix-add-assign", cm.add_assign(&am)),
        ("matrix-repmat-column", cm.assign(repmat(&x, 1, cols))),
        ("matrix-trans-repmat", cm.assign(trans(repmat(&y, 1, rows)))),
    ];

    let mut suite = Suite::new(format!("matrix ({})", layout))
        .with_setup("profile", profile)
        .with_setup("layout", layout)
        .with_setup("size", config.matrix)
        .with_setup("pattern", config.pattern)
        .with_setup("seed", config.seed);
    for (name, statement) in operations {
        suite.add_case(TestCase::new(name, single(statement), Arc::clone(&inputs)));
    }
    suite
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dims;

    fn small() -> OracleConfig {
        OracleConfig {
            vector_size: 16,
            matrix: Dims::new(8, 6),
            pattern: Dims::new(4, 3),
            ..OracleConfig::default()
        }
    }

    #[test]
    fn test_default_catalog_layout() {
        let suites = build_suites(&small());
        let names: Vec<_> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["vector", "matrix (row-major)", "matrix (column-major)"]);
        assert_eq!(suites[0].cases.len(), 10);
        assert_eq!(suites[1].cases.len(), 8);
    }

    #[test]
    fn test_vector_inputs_are_scaled_base() {
        let suites = build_suites(&small());
        let inputs = &suites[0].cases[0].inputs;
        let w0 = inputs.get("w").unwrap().as_slice();
        let y = inputs.get("y").unwrap().as_slice();
        for (b, v) in w0.iter().zip(y) {
            assert_eq!(*v, b * 3.0);
            assert!((0.0..1.0).contains(b));
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = build_suites(&small());
        let b = build_suites(&small());
        assert_eq!(a[1].cases[0].inputs, b[1].cases[0].inputs);
        let other = build_suites(&OracleConfig { seed: 1, ..small() });
        assert_ne!(a[0].cases[0].inputs, other[0].cases[0].inputs);
    }

    #[test]
    fn test_matrix_operands_use_suite_layout() {
        let cfg = OracleConfig {
            layouts: vec![Layout::ColumnMajor],
            suites: vec![SuiteKind::Matrix],
            ..small()
        };
        let suites = build_suites(&cfg);
        assert_eq!(suites.len(), 1);
        let a = suites[0].cases[0].inputs.get("A").unwrap();
        assert_eq!(a.shape(), Shape::matrix(8, 6, Layout::ColumnMajor));
    }

    #[test]
    fn test_cases_share_suite_inputs() {
        let suites = build_suites(&small());
        for suite in &suites {
            let first = &suite.cases[0].inputs;
            assert!(suite.cases.iter().all(|c| Arc::ptr_eq(&c.inputs, first)));
        }
        assert!(!Arc::ptr_eq(&suites[1].cases[0].inputs, &suites[2].cases[0].inputs));
    }

    #[test]
    fn test_case_names_are_unique() {
        let suites = build_suites(&small());
        let mut names: Vec<_> = suites[..2]
            .iter()
            .flat_map(|s| s.cases.iter().map(|c| c.name.clone()))
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
