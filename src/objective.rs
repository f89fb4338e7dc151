use std::f64::consts::{E, PI};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a fallible objective.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ObjectiveError(pub String);

impl ObjectiveError {
    pub fn new(msg: impl Into<String>) -> Self {
        ObjectiveError(msg.into())
    }
}

/// Scalar function minimized by the swarm.
///
/// Must be deterministic: the same position always yields the same value.
/// Plain closures and `fn` items of type `Fn(&[f64]) -> f64` implement it
/// directly; wrap closures that can fail in [`Fallible`].
pub trait Objective: Sync {
    fn evaluate(&self, position: &[f64]) -> Result<f64, ObjectiveError>;
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn evaluate(&self, position: &[f64]) -> Result<f64, ObjectiveError> {
        Ok(self(position))
    }
}

/// Adapts a closure returning `Result<f64, ObjectiveError>`.
pub struct Fallible<F>(pub F);

impl<F> Objective for Fallible<F>
where
    F: Fn(&[f64]) -> Result<f64, ObjectiveError> + Sync,
{
    fn evaluate(&self, position: &[f64]) -> Result<f64, ObjectiveError> {
        (self.0)(position)
    }
}

/// Global minimum 0 at the origin.
pub fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|xi| xi * xi).sum()
}

/// Global minimum 0 at (1, ..., 1).
pub fn rosenbrock(x: &[f64]) -> f64 {
    x.windows(2)
        .map(|w| {
            let a = w[1] - w[0] * w[0];
            let b = 1.0 - w[0];
            100.0 * a * a + b * b
        })
        .sum()
}

/// Global minimum 0 at the origin, regular lattice of local minima.
pub fn rastrigin(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    10.0 * n
        + x.iter()
            .map(|xi| xi * xi - 10.0 * (2.0 * PI * xi).cos())
            .sum::<f64>()
}

/// Global minimum 0 at the origin.
pub fn ackley(x: &[f64]) -> f64 {
    let n = x.len() as f64;
    let sum_sq: f64 = x.iter().map(|xi| xi * xi).sum();
    let sum_cos: f64 = x.iter().map(|xi| (2.0 * PI * xi).cos()).sum();

    -20.0 * (-0.2 * (sum_sq / n).sqrt()).exp() - (sum_cos / n).exp() + 20.0 + E
}

/// Global minimum 0 at the origin.
pub fn griewank(x: &[f64]) -> f64 {
    let sum: f64 = x.iter().map(|xi| xi * xi).sum::<f64>() / 4000.0;
    let prod: f64 = x
        .iter()
        .enumerate()
        .map(|(i, xi)| (xi / ((i + 1) as f64).sqrt()).cos())
        .product();
    sum - prod + 1.0
}

/// Named reference objectives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Benchmark {
    #[default]
    Sphere,
    Rosenbrock,
    Rastrigin,
    Ackley,
    Griewank,
}

impl Benchmark {
    pub fn name(&self) -> &'static str {
        match self {
            Benchmark::Sphere => "sphere",
            Benchmark::Rosenbrock => "rosenbrock",
            Benchmark::Rastrigin => "rastrigin",
            Benchmark::Ackley => "ackley",
            Benchmark::Griewank => "griewank",
        }
    }
}

impl Objective for Benchmark {
    fn evaluate(&self, position: &[f64]) -> Result<f64, ObjectiveError> {
        let value = match self {
            Benchmark::Sphere => sphere(position),
            Benchmark::Rosenbrock => rosenbrock(position),
            Benchmark::Rastrigin => rastrigin(position),
            Benchmark::Ackley => ackley(position),
            Benchmark::Griewank => griewank(position),
        };
        Ok(value)
    }
}

impl fmt::Display for Benchmark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Benchmark {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sphere" => Ok(Benchmark::Sphere),
            "rosenbrock" => Ok(Benchmark::Rosenbrock),
            "rastrigin" => Ok(Benchmark::Rastrigin),
            "ackley" => Ok(Benchmark::Ackley),
            "griewank" => Ok(Benchmark::Griewank),
            other => Err(format!(
                "unknown objective '{other}' (expected sphere, rosenbrock, rastrigin, ackley or griewank)"
            )),
        }
    }
}
