//! Two-variable linear programs with box bounds and a single `a·x >= b` row.
//!
//! The optimiser only needs this shape, so the solver is a capability behind
//! [`LpSolver`]; [`VertexSolver`] solves it exactly by enumerating the vertices of the
//! feasible polygon.

use serde::Serialize;
use std::fmt;

const FEASIBILITY_TOLERANCE: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
}

/// `coefficients · x >= lower`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: [f64; 2],
    pub lower: f64,
}

/// Minimise `objective · x` subject to `bounds[i][0] <= x[i] <= bounds[i][1]` and one
/// linear constraint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundedLp {
    pub objective: [f64; 2],
    pub bounds: [[f64; 2]; 2],
    pub constraint: LinearConstraint,
}

impl BoundedLp {
    pub fn objective_value(&self, x: [f64; 2]) -> f64 {
        self.objective[0] * x[0] + self.objective[1] * x[1]
    }

    fn constraint_value(&self, x: [f64; 2]) -> f64 {
        let a = self.constraint.coefficients;
        a[0] * x[0] + a[1] * x[1]
    }

    fn is_finite(&self) -> bool {
        self.objective.iter().all(|v| v.is_finite())
            && self.constraint.coefficients.iter().all(|v| v.is_finite())
            && self.constraint.lower.is_finite()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LpSolution {
    pub x: [f64; 2],
    pub objective_value: f64,
    pub status: SolveStatus,
}

impl LpSolution {
    fn without_optimum(status: SolveStatus) -> Self {
        Self {
            x: [f64::NAN; 2],
            objective_value: f64::NAN,
            status,
        }
    }
}

/// Anything able to solve a [`BoundedLp`].
pub trait LpSolver: fmt::Debug + Send + Sync {
    fn solve(&self, problem: &BoundedLp) -> LpSolution;
}

/// Exact solver for the two-variable case.
///
/// Candidates are the box corners plus the points where the constraint line crosses a
/// box edge; the feasible candidate with the lowest objective wins, earlier candidates
/// winning ties. An open box is reported as unbounded without further analysis.
#[derive(Clone, Copy, Debug, Default)]
pub struct VertexSolver;

impl LpSolver for VertexSolver {
    fn solve(&self, problem: &BoundedLp) -> LpSolution {
        let [[x_lo, x_hi], [y_lo, y_hi]] = problem.bounds;
        if !problem.is_finite() || [x_lo, x_hi, y_lo, y_hi].iter().any(|v| v.is_nan()) {
            return LpSolution::without_optimum(SolveStatus::Infeasible);
        }
        if x_lo > x_hi || y_lo > y_hi {
            return LpSolution::without_optimum(SolveStatus::Infeasible);
        }
        if [x_lo, x_hi, y_lo, y_hi].iter().any(|v| v.is_infinite()) {
            return LpSolution::without_optimum(SolveStatus::Unbounded);
        }

        let [a, b] = problem.constraint.coefficients;
        let rhs = problem.constraint.lower;
        let mut candidates: Vec<[f64; 2]> = vec![
            [x_lo, y_lo],
            [x_lo, y_hi],
            [x_hi, y_lo],
            [x_hi, y_hi],
        ];
        if b != 0.0 {
            for x in [x_lo, x_hi] {
                let y = (rhs - a * x) / b;
                if within(y, y_lo, y_hi) {
                    candidates.push([x, y.clamp(y_lo, y_hi)]);
                }
            }
        }
        if a != 0.0 {
            for y in [y_lo, y_hi] {
                let x = (rhs - b * y) / a;
                if within(x, x_lo, x_hi) {
                    candidates.push([x.clamp(x_lo, x_hi), y]);
                }
            }
        }

        let mut best: Option<([f64; 2], f64)> = None;
        for point in candidates {
            let lhs = problem.constraint_value(point);
            let scale = 1.0_f64.max(rhs.abs()).max(lhs.abs());
            if lhs < rhs - FEASIBILITY_TOLERANCE * scale {
                continue;
            }
            let value = problem.objective_value(point);
            match best {
                Some((_, best_value)) if value >= best_value => {}
                _ => best = Some((point, value)),
            }
        }

        match best {
            Some((x, objective_value)) => LpSolution {
                x,
                objective_value,
                status: SolveStatus::Optimal,
            },
            None => LpSolution::without_optimum(SolveStatus::Infeasible),
        }
    }
}

fn within(value: f64, lo: f64, hi: f64) -> bool {
    let slack = FEASIBILITY_TOLERANCE * 1.0_f64.max(lo.abs()).max(hi.abs());
    value >= lo - slack && value <= hi + slack
}
