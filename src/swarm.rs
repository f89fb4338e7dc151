use std::panic;
use std::thread;

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace};

use crate::config::{SearchBox, SwarmConfig};
use crate::error::{PsoError, Result};
use crate::objective::Objective;
use crate::particle::Particle;
use crate::search_result::SearchResult;
use crate::snapshot::{Reporter, Snapshot, TracingReporter};

/// Final state of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub best: SearchResult,
    /// Seed that reproduces this run.
    pub seed: u64,
    pub iterations: usize,
}

/// A fixed population of particles evolved against one objective.
pub struct Swarm<O: Objective> {
    config: SwarmConfig,
    bounds: SearchBox,
    objective: O,
    particles: Vec<Particle>,
    // one generator per particle, derived from the master seed
    streams: Vec<StdRng>,
    global_best: SearchResult,
    iteration: usize,
    seed: u64,
}

impl<O: Objective> Swarm<O> {
    /// Validates `config` and scatters the particles. Nothing is evaluated yet.
    pub fn new(config: SwarmConfig, objective: O) -> Result<Self> {
        let bounds = config.validate()?;
        let seed = match config.seed {
            Some(seed) => seed,
            None => {
                let seed: u64 = rand::thread_rng().gen();
                info!(seed, "no seed configured, drew one");
                seed
            }
        };

        let mut master = StdRng::seed_from_u64(seed);
        let mut streams: Vec<StdRng> = (0..config.num_particles)
            .map(|_| StdRng::seed_from_u64(master.gen()))
            .collect();
        let particles: Vec<Particle> = streams
            .iter_mut()
            .map(|rng| Particle::initialize(&bounds, rng))
            .collect();
        let global_best = SearchResult::new(&particles[0].position, f64::INFINITY);

        Ok(Swarm {
            config,
            bounds,
            objective,
            particles,
            streams,
            global_best,
            iteration: 0,
            seed,
        })
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn global_best(&self) -> &SearchResult {
        &self.global_best
    }

    /// Number of completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs one iteration: evaluate and promote bests, then move every particle.
    pub fn step(&mut self) -> Result<Snapshot> {
        let iteration = self.iteration;
        self.evaluate_all(iteration)?;
        self.move_all();
        self.iteration += 1;
        Ok(Snapshot::capture(
            iteration,
            &self.particles,
            &self.global_best,
        ))
    }

    /// Steps until `max_iterations` iterations have completed.
    pub fn run(&mut self, reporter: &mut dyn Reporter) -> Result<Outcome> {
        info!(
            dim = self.config.dim,
            particles = self.config.num_particles,
            iterations = self.config.max_iterations,
            seed = self.seed,
            workers = self.config.workers,
            boundary = %self.config.boundary,
            "starting particle swarm"
        );

        while self.iteration < self.config.max_iterations {
            let snapshot = self.step()?;
            debug!(
                iteration = snapshot.iteration,
                best_fitness = snapshot.global_best_fitness
            );
            reporter.report(&snapshot);
        }

        info!(
            best_fitness = self.global_best.fitness,
            best_position = ?self.global_best.value(),
            iterations = self.iteration,
            "particle swarm finished"
        );
        Ok(self.outcome())
    }

    pub fn outcome(&self) -> Outcome {
        Outcome {
            best: self.global_best.clone(),
            seed: self.seed,
            iterations: self.iteration,
        }
    }

    fn workers(&self) -> usize {
        self.config.workers.min(self.particles.len())
    }

    fn chunk_len(&self) -> usize {
        let workers = self.workers();
        (self.particles.len() + workers - 1) / workers
    }

    fn evaluate_all(&mut self, iteration: usize) -> Result<()> {
        // nothing is recorded unless every particle scored
        let scores = self.score_all(iteration)?;

        let Swarm {
            particles,
            global_best,
            ..
        } = self;
        for (index, (particle, fitness)) in particles.iter_mut().zip(scores).enumerate() {
            particle.fitness = fitness;
            particle.update_personal_best();
            if global_best.offer(&particle.position, fitness, iteration, index) {
                trace!(iteration, particle = index, fitness, "new global best");
            }
        }
        Ok(())
    }

    fn score_all(&self, iteration: usize) -> Result<Vec<f64>> {
        let workers = self.workers();
        let chunk_len = self.chunk_len();
        let objective = &self.objective;

        if workers <= 1 {
            return score_chunk(&self.particles, 0, objective, iteration);
        }

        let results: Vec<Result<Vec<f64>>> = thread::scope(|s| {
            let handles: Vec<_> = self
                .particles
                .chunks(chunk_len)
                .enumerate()
                .map(|(c, chunk)| {
                    s.spawn(move || score_chunk(chunk, c * chunk_len, objective, iteration))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|e| panic::resume_unwind(e)))
                .collect()
        });

        // chunks are in particle order, so the first error has the lowest index
        let mut scores = Vec::with_capacity(self.particles.len());
        for chunk in results {
            scores.extend(chunk?);
        }
        Ok(scores)
    }

    fn move_all(&mut self) {
        let workers = self.workers();
        let chunk_len = self.chunk_len();
        let Swarm {
            config,
            bounds,
            particles,
            streams,
            global_best,
            ..
        } = self;
        let (config, bounds) = (&*config, &*bounds);
        let guide = &global_best.position;

        if workers <= 1 {
            move_chunk(particles, streams, guide, config, bounds);
            return;
        }

        thread::scope(|s| {
            for (chunk, rngs) in particles
                .chunks_mut(chunk_len)
                .zip(streams.chunks_mut(chunk_len))
            {
                s.spawn(move || move_chunk(chunk, rngs, guide, config, bounds));
            }
        });
    }
}

fn score_chunk<O: Objective + ?Sized>(
    particles: &[Particle],
    offset: usize,
    objective: &O,
    iteration: usize,
) -> Result<Vec<f64>> {
    particles
        .iter()
        .enumerate()
        .map(|(i, particle)| {
            particle
                .score(objective)
                .map_err(|cause| PsoError::Evaluation {
                    iteration,
                    particle: offset + i,
                    position: particle.position.as_slice().to_vec(),
                    cause,
                })
        })
        .collect()
}

// The global best is read-only here: it only moves during evaluation.
fn move_chunk(
    particles: &mut [Particle],
    streams: &mut [StdRng],
    guide: &DVector<f64>,
    config: &SwarmConfig,
    bounds: &SearchBox,
) {
    for (particle, rng) in particles.iter_mut().zip(streams.iter_mut()) {
        particle.update_velocity(guide, config.inertia_weight, config.c1, config.c2, rng);
        particle.advance();
        particle.confine(bounds, config.boundary, rng);
    }
}

/// Builds a swarm from `config` and runs it to completion.
pub fn run<O: Objective>(
    config: SwarmConfig,
    objective: O,
    reporter: &mut dyn Reporter,
) -> Result<Outcome> {
    Swarm::new(config, objective)?.run(reporter)
}

/// [`run`] with progress logged through `tracing`.
pub fn optimize<O: Objective>(config: SwarmConfig, objective: O) -> Result<Outcome> {
    run(config, objective, &mut TracingReporter::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoundaryMode;
    use crate::error::EvaluationFailure;
    use crate::objective::{rastrigin, sphere, Fallible, ObjectiveError};
    use crate::snapshot::{History, NoopReporter};

    fn config() -> SwarmConfig {
        SwarmConfig::new(2, 10, 30, -5.0, 5.0).with_seed(42)
    }

    fn min_personal_best<O: Objective>(swarm: &Swarm<O>) -> f64 {
        swarm
            .particles()
            .iter()
            .map(|p| p.best_fitness)
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn invalid_config_fails_before_any_evaluation() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let counting = |x: &[f64]| -> f64 {
            calls.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            sphere(x)
        };
        let err = run(
            SwarmConfig::new(2, 0, 10, -5.0, 5.0),
            counting,
            &mut NoopReporter,
        )
        .err()
        .unwrap();
        assert!(matches!(err, PsoError::InvalidConfig { .. }));
        assert_eq!(calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[test]
    fn new_swarm_is_unevaluated() {
        let swarm = Swarm::new(config(), sphere).unwrap();
        assert_eq!(swarm.config(), &config());
        assert_eq!(swarm.particles().len(), 10);
        assert_eq!(swarm.iteration(), 0);
        assert_eq!(swarm.seed(), 42);
        assert_eq!(swarm.global_best().fitness, f64::INFINITY);
        assert_eq!(swarm.global_best().iter, None);
        for p in swarm.particles() {
            assert_eq!(p.best_fitness, f64::INFINITY);
        }
    }

    #[test]
    fn first_step_promotes_same_iteration_best() {
        let mut swarm = Swarm::new(config(), sphere).unwrap();
        let initial: Vec<f64> = swarm
            .particles()
            .iter()
            .map(|p| sphere(p.position.as_slice()))
            .collect();
        let snap = swarm.step().unwrap();

        let (winner, fitness) = initial
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |acc, (i, f)| if f < acc.1 { (i, f) } else { acc });
        let best = swarm.global_best();
        assert_eq!(best.iter, Some(0));
        assert_eq!(best.particle, Some(winner));
        assert_eq!(best.fitness, fitness);
        assert_eq!(snap.iteration, 0);
        assert_eq!(snap.global_best_fitness, fitness);
        assert_eq!(swarm.iteration(), 1);
    }

    #[test]
    fn global_best_never_worsens_and_dominates() {
        let mut swarm = Swarm::new(config(), rastrigin).unwrap();
        let mut previous = f64::INFINITY;
        for _ in 0..40 {
            swarm.step().unwrap();
            let best = swarm.global_best();
            assert!(best.fitness <= previous);
            assert!(best.fitness <= min_personal_best(&swarm));
            assert_eq!(rastrigin(best.value()), best.fitness);
            previous = best.fitness;
        }
    }

    #[test]
    fn personal_bests_match_the_objective() {
        let mut swarm = Swarm::new(config(), sphere).unwrap();
        for _ in 0..15 {
            swarm.step().unwrap();
            for p in swarm.particles() {
                assert_eq!(sphere(p.best_position.as_slice()), p.best_fitness);
                assert!(p.best_fitness <= p.fitness);
            }
        }
    }

    #[test]
    fn update_pass_reads_the_pre_move_best() {
        let mut swarm = Swarm::new(config(), sphere).unwrap();
        swarm.step().unwrap();
        let before = swarm.global_best().clone();
        let snap = swarm.step().unwrap();
        // the snapshot reports the best that guided this iteration's moves
        assert_eq!(snap.global_best_position, swarm.global_best().value());
        assert!(swarm.global_best().fitness <= before.fitness);
    }

    #[test]
    fn zero_iterations_returns_the_untouched_swarm() {
        let outcome = run(
            SwarmConfig::new(3, 4, 0, -1.0, 1.0).with_seed(1),
            sphere,
            &mut NoopReporter,
        )
        .unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.best.fitness, f64::INFINITY);
        assert_eq!(outcome.best.iter, None);
        assert_eq!(outcome.best.position.len(), 3);
    }

    #[test]
    fn nan_objective_is_reported_with_context() {
        let mut swarm = Swarm::new(SwarmConfig::new(1, 20, 5, -5.0, 5.0).with_seed(9), |x: &[f64]| {
            if x[0] > 0.0 {
                f64::NAN
            } else {
                x[0] * x[0]
            }
        })
        .unwrap();
        let expected = swarm
            .particles()
            .iter()
            .position(|p| p.position[0] > 0.0)
            .expect("some particle starts on the positive side");
        let expected_position = swarm.particles()[expected].position[0];

        match swarm.step() {
            Err(PsoError::Evaluation {
                iteration,
                particle,
                position,
                cause: EvaluationFailure::NonFinite(v),
            }) => {
                assert_eq!(iteration, 0);
                assert_eq!(particle, expected);
                assert_eq!(position, vec![expected_position]);
                assert!(v.is_nan());
            }
            other => panic!("expected evaluation error, got {other:?}"),
        }
        assert!(!swarm.global_best().fitness.is_nan());
    }

    #[test]
    fn objective_errors_stop_the_run() {
        let failing = Fallible(|x: &[f64]| {
            if x.iter().any(|v| v.abs() > 1e6) {
                Err(ObjectiveError::new("out of range"))
            } else {
                Ok(sphere(x))
            }
        });
        let mut history = History::new();
        let outcome = run(config(), failing, &mut history).unwrap();
        assert_eq!(outcome.iterations, 30);
        assert_eq!(history.snapshots().len(), 30);

        let always = Fallible(|_: &[f64]| Err::<f64, _>(ObjectiveError::new("boom")));
        let mut history = History::new();
        let err = run(config(), always, &mut history).err().unwrap();
        assert!(matches!(
            err,
            PsoError::Evaluation {
                iteration: 0,
                particle: 0,
                cause: EvaluationFailure::Objective(_),
                ..
            }
        ));
        assert!(history.snapshots().is_empty());
    }

    #[test]
    fn workers_do_not_change_the_trajectory() {
        let mut sequential = History::new();
        let a = run(config(), rastrigin, &mut sequential).unwrap();
        for workers in [2, 3, 16] {
            let mut parallel = History::new();
            let b = run(config().with_workers(workers), rastrigin, &mut parallel).unwrap();
            assert_eq!(a, b);
            assert_eq!(sequential.snapshots(), parallel.snapshots());
        }
    }

    #[test]
    fn failed_pass_leaves_the_same_state_for_any_worker_count() {
        let config = SwarmConfig::new(1, 8, 5, -5.0, 5.0).with_seed(9);
        let bad = Swarm::new(config.clone(), sphere).unwrap().particles()[5].position[0];
        let poisoned = move |x: &[f64]| if x[0] == bad { f64::NAN } else { x[0] * x[0] };

        let mut states = Vec::new();
        for workers in [1, 4] {
            let mut swarm = Swarm::new(config.clone().with_workers(workers), poisoned).unwrap();
            let untouched = swarm.particles().to_vec();
            let err = swarm.step().err().unwrap();
            assert!(matches!(err, PsoError::Evaluation { particle: 5, .. }));
            assert_eq!(swarm.global_best().iter, None);
            assert_eq!(swarm.global_best().fitness, f64::INFINITY);
            assert_eq!(swarm.particles(), untouched.as_slice());
            assert_eq!(swarm.iteration(), 0);
            states.push((swarm.global_best().clone(), untouched));
        }
        assert_eq!(states[0], states[1]);
    }

    #[test]
    fn ties_resolve_to_the_first_particle_in_every_mode() {
        let flat = |_: &[f64]| 1.0;
        for workers in [1, 4] {
            let mut swarm = Swarm::new(config().with_workers(workers), flat).unwrap();
            swarm.step().unwrap();
            assert_eq!(swarm.global_best().particle, Some(0));
            swarm.step().unwrap();
            assert_eq!(swarm.global_best().iter, Some(0));
        }
    }

    #[test]
    fn clamp_and_reinitialize_keep_particles_in_the_box() {
        for mode in [BoundaryMode::Clamp, BoundaryMode::Reinitialize] {
            let mut swarm = Swarm::new(
                SwarmConfig::new(3, 15, 0, -1.0, 1.0)
                    .with_seed(5)
                    .with_coefficients(0.9, 2.5, 2.5)
                    .with_boundary(mode),
                |x: &[f64]| -> f64 { x.iter().map(|v| (v - 3.0).powi(2)).sum() },
            )
            .unwrap();
            for _ in 0..20 {
                swarm.step().unwrap();
                for p in swarm.particles() {
                    assert!(p.position.iter().all(|x| (-1.0..=1.0).contains(x)));
                }
            }
        }
    }

    #[test]
    fn optimize_reports_the_seed_it_drew() {
        let outcome = optimize(SwarmConfig::new(2, 5, 3, -1.0, 1.0), sphere).unwrap();
        let replay = optimize(
            SwarmConfig::new(2, 5, 3, -1.0, 1.0).with_seed(outcome.seed),
            sphere,
        )
        .unwrap();
        assert_eq!(outcome, replay);
    }
}
