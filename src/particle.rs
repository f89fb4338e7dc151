use nalgebra::DVector;
use rand::Rng;

use crate::config::{BoundaryMode, SearchBox};
use crate::error::EvaluationFailure;
use crate::objective::Objective;

/// One candidate solution together with the best place it has visited.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: DVector<f64>,
    pub velocity: DVector<f64>,
    pub best_position: DVector<f64>,
    pub best_fitness: f64,
    /// Objective value at `position` from the latest evaluation.
    pub fitness: f64,
}

impl Particle {
    pub fn new(position: &DVector<f64>) -> Self {
        Particle {
            position: position.clone(),
            velocity: DVector::zeros(position.len()),
            best_position: position.clone(),
            best_fitness: f64::INFINITY,
            fitness: f64::INFINITY,
        }
    }

    /// Uniform position inside `bounds`, uniform velocity in `[-1, 1]` per dimension.
    pub fn initialize<R: Rng>(bounds: &SearchBox, rng: &mut R) -> Self {
        let dim = bounds.dim();
        let position = DVector::from_iterator(dim, (0..dim).map(|i| bounds.sample(i, rng)));
        let mut particle = Particle::new(&position);
        particle.velocity = DVector::from_iterator(
            dim,
            std::iter::repeat_with(|| rng.gen_range(-1.0..=1.0)).take(dim),
        );
        particle
    }

    pub fn dim(&self) -> usize {
        self.position.len()
    }

    /// Objective value at the current position, without recording it.
    pub fn score<O: Objective + ?Sized>(&self, objective: &O) -> Result<f64, EvaluationFailure> {
        let value = objective.evaluate(self.position.as_slice())?;
        if !value.is_finite() {
            return Err(EvaluationFailure::NonFinite(value));
        }
        Ok(value)
    }

    /// Scores the current position. `fitness` is left untouched on failure.
    pub fn evaluate<O: Objective + ?Sized>(
        &mut self,
        objective: &O,
    ) -> Result<f64, EvaluationFailure> {
        let value = self.score(objective)?;
        self.fitness = value;
        Ok(value)
    }

    /// Returns true when the latest fitness strictly beat the recorded best.
    pub fn update_personal_best(&mut self) -> bool {
        if self.fitness < self.best_fitness {
            self.best_position.copy_from(&self.position);
            self.best_fitness = self.fitness;
            true
        } else {
            false
        }
    }

    /// `v' = w v + c1 r1 (pbest - x) + c2 r2 (gbest - x)` with fresh `r1`, `r2` in `[0, 1)`.
    pub fn update_velocity<R: Rng>(
        &mut self,
        global_best: &DVector<f64>,
        inertia_weight: f64,
        c1: f64,
        c2: f64,
        rng: &mut R,
    ) {
        let dim = self.dim();
        let r1: DVector<f64> =
            DVector::from_iterator(dim, std::iter::repeat_with(|| rng.gen::<f64>()).take(dim));
        let r2: DVector<f64> =
            DVector::from_iterator(dim, std::iter::repeat_with(|| rng.gen::<f64>()).take(dim));

        let cognitive = r1.component_mul(&(&self.best_position - &self.position)) * c1;
        let social = r2.component_mul(&(global_best - &self.position)) * c2;
        self.velocity = &self.velocity * inertia_weight + cognitive + social;
    }

    pub fn advance(&mut self) {
        self.position += &self.velocity;
    }

    pub(crate) fn confine<R: Rng>(&mut self, bounds: &SearchBox, mode: BoundaryMode, rng: &mut R) {
        match mode {
            BoundaryMode::Unbounded => {}
            BoundaryMode::Clamp => {
                for i in 0..self.dim() {
                    self.position[i] = self.position[i]
                        .max(bounds.lower_bound(i))
                        .min(bounds.upper_bound(i));
                }
            }
            BoundaryMode::Reinitialize => {
                for i in 0..self.dim() {
                    if !bounds.contains(i, self.position[i]) {
                        self.velocity[i] /= 10.;
                        self.position[i] = bounds.sample(i, rng);
                    }
                }
            }
        }
    }
}
