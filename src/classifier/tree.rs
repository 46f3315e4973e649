use std::collections::BTreeMap;

use super::{majority, Algorithm, Label};

#[derive(Debug, Clone)]
enum Node {
    Leaf(Label),
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// CART decision tree using Gini impurity.
///
/// Fully deterministic: candidate thresholds are midpoints between adjacent
/// distinct values, and among equally good splits the lowest feature index
/// and lowest threshold win. Samples with `value <= threshold` go left.
#[derive(Debug, Clone, Default)]
pub struct DecisionTree {
    root: Option<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &Node) -> usize {
            match node {
                Node::Leaf(_) => 0,
                Node::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        self.root.as_ref().map_or(0, depth_of)
    }

    fn build(samples: &[Vec<f64>], labels: &[Label], indices: Vec<usize>) -> Node {
        let leaf = || Node::Leaf(majority(indices.iter().map(|&i| &labels[i])).unwrap_or_default());

        let pure = indices.iter().all(|&i| labels[i] == labels[indices[0]]);
        if pure || indices.len() < 2 {
            return leaf();
        }

        let Some(best) = best_split(samples, labels, &indices) else {
            return leaf();
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| samples[i][best.feature] <= best.threshold);

        Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(Self::build(samples, labels, left)),
            right: Box::new(Self::build(samples, labels, right)),
        }
    }
}

fn gini(counts: &BTreeMap<&Label, usize>, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .values()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

fn best_split(samples: &[Vec<f64>], labels: &[Label], indices: &[usize]) -> Option<Candidate> {
    let width = samples[indices[0]].len();
    let n = indices.len();
    let mut best: Option<Candidate> = None;

    for feature in 0..width {
        let mut ordered: Vec<usize> = indices.to_vec();
        ordered.sort_by(|&a, &b| samples[a][feature].total_cmp(&samples[b][feature]));

        let mut left: BTreeMap<&Label, usize> = BTreeMap::new();
        let mut right: BTreeMap<&Label, usize> = BTreeMap::new();
        for &i in &ordered {
            *right.entry(&labels[i]).or_insert(0) += 1;
        }

        for pos in 0..n - 1 {
            let label = &labels[ordered[pos]];
            *left.entry(label).or_insert(0) += 1;
            if let Some(count) = right.get_mut(label) {
                *count -= 1;
                if *count == 0 {
                    right.remove(label);
                }
            }

            let here = samples[ordered[pos]][feature];
            let next = samples[ordered[pos + 1]][feature];
            if here == next {
                continue;
            }

            let n_left = pos + 1;
            let n_right = n - n_left;
            let impurity = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / n as f64;

            if best.as_ref().map_or(true, |b| impurity < b.impurity - 1e-12) {
                best = Some(Candidate {
                    feature,
                    threshold: here + (next - here) / 2.0,
                    impurity,
                });
            }
        }
    }

    best
}

impl Algorithm for DecisionTree {
    fn name(&self) -> &'static str {
        "DecisionTreeClassifier"
    }

    fn fit(&mut self, samples: &[Vec<f64>], labels: &[Label]) {
        let indices: Vec<usize> = (0..samples.len()).collect();
        self.root = Some(Self::build(samples, labels, indices));
        tracing::debug!("Decision tree grown to depth {}", self.depth());
    }

    fn predict_one(&self, sample: &[f64]) -> Option<Label> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                Node::Leaf(label) => return Some(label.clone()),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}
