use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PsoError, Result};

const DEFAULT_INERTIA_WEIGHT: f64 = 0.5;
const DEFAULT_ACCELERATION: f64 = 1.5;

/// A search-space bound given once for every dimension or per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Scalar(f64),
    PerDimension(Vec<f64>),
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Bound::Scalar(value)
    }
}

impl From<Vec<f64>> for Bound {
    fn from(values: Vec<f64>) -> Self {
        Bound::PerDimension(values)
    }
}

impl Bound {
    fn resolve(&self, name: &str, dim: usize) -> Result<Vec<f64>> {
        let values = match self {
            Bound::Scalar(v) => vec![*v; dim],
            Bound::PerDimension(vs) => {
                if vs.len() != dim {
                    return Err(PsoError::invalid(
                        name,
                        format!("{} values", vs.len()),
                        format!("one value per dimension ({dim})"),
                    ));
                }
                vs.clone()
            }
        };
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(PsoError::invalid(name, bad, "a finite number"));
        }
        Ok(values)
    }
}

/// What happens to a coordinate that leaves the search box after a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Particles roam freely outside the box.
    #[default]
    Unbounded,
    /// Coordinate is clamped onto the nearest face of the box.
    Clamp,
    /// Coordinate is redrawn inside the box and its velocity damped tenfold.
    Reinitialize,
}

impl fmt::Display for BoundaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BoundaryMode::Unbounded => "unbounded",
            BoundaryMode::Clamp => "clamp",
            BoundaryMode::Reinitialize => "reinitialize",
        })
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unbounded" | "none" => Ok(BoundaryMode::Unbounded),
            "clamp" => Ok(BoundaryMode::Clamp),
            "reinitialize" | "reinit" => Ok(BoundaryMode::Reinitialize),
            other => Err(format!(
                "unknown boundary mode '{other}' (expected unbounded, clamp or reinitialize)"
            )),
        }
    }
}

/// Everything a run needs, fixed at start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmConfig {
    pub dim: usize,
    pub num_particles: usize,
    pub max_iterations: usize,
    pub lower_bound: Bound,
    pub upper_bound: Bound,
    #[serde(default = "default_inertia_weight")]
    pub inertia_weight: f64,
    /// Attraction towards the particle's own best.
    #[serde(default = "default_acceleration")]
    pub c1: f64,
    /// Attraction towards the swarm's best.
    #[serde(default = "default_acceleration")]
    pub c2: f64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub boundary: BoundaryMode,
}

fn default_inertia_weight() -> f64 {
    DEFAULT_INERTIA_WEIGHT
}

fn default_acceleration() -> f64 {
    DEFAULT_ACCELERATION
}

fn default_workers() -> usize {
    1
}

impl SwarmConfig {
    pub fn new(
        dim: usize,
        num_particles: usize,
        max_iterations: usize,
        lower_bound: impl Into<Bound>,
        upper_bound: impl Into<Bound>,
    ) -> Self {
        SwarmConfig {
            dim,
            num_particles,
            max_iterations,
            lower_bound: lower_bound.into(),
            upper_bound: upper_bound.into(),
            inertia_weight: DEFAULT_INERTIA_WEIGHT,
            c1: DEFAULT_ACCELERATION,
            c2: DEFAULT_ACCELERATION,
            seed: None,
            workers: 1,
            boundary: BoundaryMode::Unbounded,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_coefficients(mut self, inertia_weight: f64, c1: f64, c2: f64) -> Self {
        self.inertia_weight = inertia_weight;
        self.c1 = c1;
        self.c2 = c2;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryMode) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks every constraint and resolves the bounds into a concrete box.
    pub fn validate(&self) -> Result<SearchBox> {
        if self.dim < 1 {
            return Err(PsoError::invalid("dim", self.dim, ">= 1"));
        }
        if self.num_particles < 1 {
            return Err(PsoError::invalid("num_particles", self.num_particles, ">= 1"));
        }
        if self.workers < 1 {
            return Err(PsoError::invalid("workers", self.workers, ">= 1"));
        }
        for (name, value) in [
            ("inertia_weight", self.inertia_weight),
            ("c1", self.c1),
            ("c2", self.c2),
        ] {
            if !value.is_finite() {
                return Err(PsoError::invalid(name, value, "a finite number"));
            }
        }

        let lower = self.lower_bound.resolve("lower_bound", self.dim)?;
        let upper = self.upper_bound.resolve("upper_bound", self.dim)?;
        for i in 0..self.dim {
            if lower[i] >= upper[i] {
                return Err(PsoError::invalid(
                    format!("lower_bound[{i}]"),
                    lower[i],
                    format!("< upper_bound[{i}] = {}", upper[i]),
                ));
            }
            if !(upper[i] - lower[i]).is_finite() {
                return Err(PsoError::invalid(
                    format!("upper_bound[{i}] - lower_bound[{i}]"),
                    upper[i] - lower[i],
                    "a finite width",
                ));
            }
        }

        Ok(SearchBox { lower, upper })
    }
}

/// Validated per-dimension box `[lower, upper)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchBox {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl SearchBox {
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower_bound(&self, i: usize) -> f64 {
        self.lower[i]
    }

    pub fn upper_bound(&self, i: usize) -> f64 {
        self.upper[i]
    }

    pub fn contains(&self, i: usize, x: f64) -> bool {
        x >= self.lower[i] && x <= self.upper[i]
    }

    pub(crate) fn sample<R: Rng>(&self, i: usize, rng: &mut R) -> f64 {
        rng.gen_range(self.lower[i]..self.upper[i])
    }
}
