//! Objective functions evaluated by the harness.

use std::f64::consts::PI;

/// A deterministic black-box objective of fixed input dimension.
///
/// Implementations must be pure: the same input always yields the same
/// value. Passing a slice whose length differs from [`Objective::dim`] is a
/// caller error; the harness filters such queries out before evaluating.
pub trait Objective: Send + Sync {
    fn name(&self) -> &str;

    fn dim(&self) -> usize;

    fn evaluate(&self, x: &[f64]) -> f64;
}

/// Wraps a plain function or closure as an [`Objective`].
#[derive(Debug, Clone)]
pub struct FnObjective<F> {
    name: String,
    dim: usize,
    function: F,
}

impl<F> FnObjective<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    pub fn new(name: impl Into<String>, dim: usize, function: F) -> Self {
        Self {
            name: name.into(),
            dim,
            function,
        }
    }
}

impl<F> Objective for FnObjective<F>
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn evaluate(&self, x: &[f64]) -> f64 {
        (self.function)(x)
    }
}

/// The Forrester function, negated so that its global optimum is a maximum.
///
/// `f(x) = -(6x - 2)^2 * sin(12x - 4)` on `[0, 1]`.
/// See <https://www.sfu.ca/~ssurjano/forretal08.html>.
pub fn forrester(x: &[f64]) -> f64 {
    let x0 = x[0];
    -((6.0 * x0 - 2.0).powi(2) * (12.0 * x0 - 4.0).sin())
}

/// The Branin-Hoo function, negated, on `[-5, 10] x [0, 15]`.
pub fn branin(x: &[f64]) -> f64 {
    let (x1, x2) = (x[0], x[1]);
    let b = 5.1 / (4.0 * PI * PI);
    let c = 5.0 / PI;
    let t = 1.0 / (8.0 * PI);
    let value = (x2 - b * x1 * x1 + c * x1 - 6.0).powi(2) + 10.0 * (1.0 - t) * x1.cos() + 10.0;
    -value
}
