use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::particle::Particle;
use crate::search_result::SearchResult;

/// Read-only picture of the swarm at the end of one iteration.
///
/// Non-finite coordinates serialize as the strings `"NaN"`, `"inf"` and
/// `"-inf"` so a diverged swarm still reads back. `null` reads as NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub iteration: usize,
    #[serde(with = "coordinates::rows")]
    pub positions: Vec<Vec<f64>>,
    #[serde(with = "coordinates::row")]
    pub global_best_position: Vec<f64>,
    #[serde(with = "coordinates::scalar")]
    pub global_best_fitness: f64,
}

impl Snapshot {
    pub(crate) fn capture(iteration: usize, particles: &[Particle], best: &SearchResult) -> Self {
        Snapshot {
            iteration,
            positions: particles
                .iter()
                .map(|p| p.position.as_slice().to_vec())
                .collect(),
            global_best_position: best.value().to_vec(),
            global_best_fitness: best.fitness,
        }
    }

    /// True once any particle coordinate has overflowed to a non-finite value.
    pub fn is_diverged(&self) -> bool {
        self.positions
            .iter()
            .flatten()
            .any(|x| !x.is_finite())
    }
}

mod coordinates {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    struct Coordinate(f64);

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
        Null(()),
    }

    impl Serialize for Coordinate {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            match self.0 {
                x if x.is_finite() => serializer.serialize_f64(x),
                x if x.is_nan() => serializer.serialize_str("NaN"),
                x if x > 0.0 => serializer.serialize_str("inf"),
                _ => serializer.serialize_str("-inf"),
            }
        }
    }

    impl<'de> Deserialize<'de> for Coordinate {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let value = match Repr::deserialize(deserializer)? {
                Repr::Number(x) => x,
                Repr::Null(()) => f64::NAN,
                Repr::Text(text) => match text.as_str() {
                    "NaN" | "nan" => f64::NAN,
                    "inf" | "+inf" | "Infinity" => f64::INFINITY,
                    "-inf" | "-Infinity" => f64::NEG_INFINITY,
                    other => {
                        return Err(D::Error::custom(format!("invalid coordinate '{other}'")))
                    }
                },
            };
            Ok(Coordinate(value))
        }
    }

    pub mod scalar {
        use super::*;

        pub fn serialize<S: Serializer>(x: &f64, serializer: S) -> Result<S::Ok, S::Error> {
            Coordinate(*x).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
            Coordinate::deserialize(deserializer).map(|c| c.0)
        }
    }

    pub mod row {
        use super::*;

        pub fn serialize<S: Serializer>(row: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(row.iter().map(|&x| Coordinate(x)))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<f64>, D::Error> {
            let row = Vec::<Coordinate>::deserialize(deserializer)?;
            Ok(row.into_iter().map(|c| c.0).collect())
        }
    }

    pub mod rows {
        use super::*;

        pub fn serialize<S: Serializer>(
            rows: &[Vec<f64>],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(
                rows.iter()
                    .map(|row| row.iter().map(|&x| Coordinate(x)).collect::<Vec<_>>()),
            )
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Vec<f64>>, D::Error> {
            let rows = Vec::<Vec<Coordinate>>::deserialize(deserializer)?;
            Ok(rows
                .into_iter()
                .map(|row| row.into_iter().map(|c| c.0).collect())
                .collect())
        }
    }
}

/// Receives one snapshot per iteration.
///
/// Reporting cannot fail the run: implementations deal with their own errors.
pub trait Reporter {
    fn report(&mut self, snapshot: &Snapshot);
}

impl<F> Reporter for F
where
    F: FnMut(&Snapshot),
{
    fn report(&mut self, snapshot: &Snapshot) {
        self(snapshot)
    }
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn report(&mut self, _snapshot: &Snapshot) {}
}

/// Logs every iteration's best through `tracing`, warning once on divergence.
#[derive(Debug, Default)]
pub struct TracingReporter {
    warned: bool,
}

impl Reporter for TracingReporter {
    fn report(&mut self, snapshot: &Snapshot) {
        info!(
            iteration = snapshot.iteration,
            best_fitness = snapshot.global_best_fitness,
            best_position = ?snapshot.global_best_position,
            "iteration finished"
        );
        if !self.warned && snapshot.is_diverged() {
            warn!(
                iteration = snapshot.iteration,
                "swarm diverged: non-finite particle coordinates"
            );
            self.warned = true;
        }
    }
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default, Clone)]
pub struct History {
    snapshots: Vec<Snapshot>,
}

impl History {
    pub fn new() -> Self {
        History::default()
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Best fitness after each iteration.
    pub fn best_fitness_trace(&self) -> Vec<f64> {
        self.snapshots
            .iter()
            .map(|s| s.global_best_fitness)
            .collect()
    }

    pub fn into_inner(self) -> Vec<Snapshot> {
        self.snapshots
    }
}

impl Reporter for History {
    fn report(&mut self, snapshot: &Snapshot) {
        self.snapshots.push(snapshot.clone());
    }
}

/// Writes each snapshot as one JSON document per line.
///
/// The first write failure is logged and further snapshots are dropped.
pub struct JsonLinesReporter<W: Write> {
    writer: W,
    failed: bool,
}

impl<W: Write> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesReporter {
            writer,
            failed: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write(&mut self, snapshot: &Snapshot) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> Reporter for JsonLinesReporter<W> {
    fn report(&mut self, snapshot: &Snapshot) {
        if self.failed {
            return;
        }
        if let Err(e) = self.write(snapshot) {
            warn!(iteration = snapshot.iteration, error = %e, "dropping snapshots");
            self.failed = true;
        }
    }
}
