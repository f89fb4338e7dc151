use nalgebra::DVector;

/// Best position seen by the swarm so far.
///
/// Always holds a copy, never a view into a live particle, so later moves
/// cannot rewrite a recorded best.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub position: DVector<f64>,
    pub fitness: f64,
    /// Iteration in which this best was found.
    pub iter: Option<usize>,
    /// Index of the particle that found it.
    pub particle: Option<usize>,
}

impl SearchResult {
    pub fn new(position: &DVector<f64>, fitness: f64) -> Self {
        SearchResult {
            position: position.clone(),
            fitness,
            iter: None,
            particle: None,
        }
    }

    /// Compare-and-set against the current best.
    ///
    /// A candidate wins when strictly fitter, or when equally fit and found
    /// earlier in the particle order of the same iteration. Offers can
    /// therefore arrive in any order and still leave the same winner a
    /// sequential left-to-right scan would pick.
    pub fn offer(
        &mut self,
        position: &DVector<f64>,
        fitness: f64,
        iter: usize,
        particle: usize,
    ) -> bool {
        let fitter = fitness < self.fitness;
        let earlier_tie = fitness == self.fitness
            && self.iter == Some(iter)
            && self.particle.map_or(false, |p| particle < p);
        if !(fitter || earlier_tie) {
            return false;
        }

        self.position.copy_from(position);
        self.fitness = fitness;
        self.iter = Some(iter);
        self.particle = Some(particle);
        true
    }

    pub fn value(&self) -> &[f64] {
        self.position.as_slice()
    }
}
