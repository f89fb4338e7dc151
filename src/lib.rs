//! Particle swarm optimization over a continuous box.
//!
//! A [`Swarm`] scatters particles uniformly inside the configured bounds and,
//! for a fixed number of iterations, evaluates every particle, promotes
//! personal and global bests, then moves each particle with
//!
//! ```text
//! v' = w v + c1 r1 (pbest - x) + c2 r2 (gbest - x)
//! x' = x + v'
//! ```
//!
//! ```
//! use swarmopt::{optimize, sphere, SwarmConfig};
//!
//! let config = SwarmConfig::new(2, 20, 50, -5.0, 5.0).with_seed(7);
//! let outcome = optimize(config, sphere).unwrap();
//! assert!(outcome.best.fitness < 0.1);
//! ```

pub mod config;
pub mod error;
pub mod objective;
pub mod particle;
pub mod search_result;
pub mod snapshot;
pub mod swarm;

pub use config::{Bound, BoundaryMode, SearchBox, SwarmConfig};
pub use error::{EvaluationFailure, PsoError, Result};
pub use objective::{
    ackley, griewank, rastrigin, rosenbrock, sphere, Benchmark, Fallible, Objective,
    ObjectiveError,
};
pub use particle::Particle;
pub use search_result::SearchResult;
pub use snapshot::{History, JsonLinesReporter, NoopReporter, Reporter, Snapshot, TracingReporter};
pub use swarm::{optimize, run, Outcome, Swarm};
