use super::{majority, Algorithm, Label};

/// k-nearest-neighbour vote under Euclidean distance.
///
/// When fewer than `k` training samples exist all of them vote. Equal
/// distances are ordered by training position; tied votes go to the
/// lexicographically smallest label.
#[derive(Debug, Clone)]
pub struct KNearestNeighbors {
    k: usize,
    samples: Vec<Vec<f64>>,
    labels: Vec<Label>,
}

impl KNearestNeighbors {
    pub const DEFAULT_K: usize = 5;

    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            samples: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }
}

impl Default for KNearestNeighbors {
    fn default() -> Self {
        Self::new(Self::DEFAULT_K)
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl Algorithm for KNearestNeighbors {
    fn name(&self) -> &'static str {
        "KNeighborsClassifier"
    }

    fn fit(&mut self, samples: &[Vec<f64>], labels: &[Label]) {
        self.samples = samples.to_vec();
        self.labels = labels.to_vec();
    }

    fn predict_one(&self, sample: &[f64]) -> Option<Label> {
        if self.samples.is_empty() {
            return None;
        }

        let mut neighbours: Vec<(f64, usize)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, s)| (squared_distance(s, sample), i))
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        majority(
            neighbours
                .iter()
                .take(self.k)
                .map(|&(_, i)| &self.labels[i]),
        )
    }
}
