pub mod knn;
pub mod tree;

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::Feature;

pub use knn::KNearestNeighbors;
pub use tree::DecisionTree;

pub type Label = String;

/// A learning algorithm operating on validated numeric vectors.
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &'static str;

    /// Trains on non-empty samples of equal width, one label per sample.
    fn fit(&mut self, samples: &[Vec<f64>], labels: &[Label]);

    /// `None` until `fit` has been called.
    fn predict_one(&self, sample: &[f64]) -> Option<Label>;
}

/// Uniform fit/predict wrapper over interchangeable algorithms.
///
/// Inputs are validated here before the underlying model is touched.
pub struct Classifier {
    algorithm: Box<dyn Algorithm>,
    width: Option<usize>,
    feature_names: Option<Vec<String>>,
}

impl Classifier {
    pub fn new(algorithm: Box<dyn Algorithm>) -> Self {
        Self {
            algorithm,
            width: None,
            feature_names: None,
        }
    }

    pub fn decision_tree() -> Self {
        Self::new(Box::new(DecisionTree::new()))
    }

    pub fn k_nearest_neighbors() -> Self {
        Self::new(Box::new(KNearestNeighbors::new(KNearestNeighbors::DEFAULT_K)))
    }

    pub fn name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn is_fitted(&self) -> bool {
        self.width.is_some()
    }

    pub fn fit(&mut self, samples: &[Vec<Feature>], labels: &[Label]) -> Result<()> {
        let names = consistent_names(samples)?;
        let values = map_input(samples)?;
        self.fit_with_values(&values, labels)?;
        self.feature_names = names;
        Ok(())
    }

    /// Trains on raw vectors, e.g. features read back from storage.
    pub fn fit_with_values(&mut self, samples: &[Vec<f64>], labels: &[Label]) -> Result<()> {
        if samples.is_empty() {
            return Err(Error::InvalidInput("no training samples".to_string()));
        }
        if samples.len() != labels.len() {
            return Err(Error::InvalidInput(format!(
                "{} samples but {} labels",
                samples.len(),
                labels.len()
            )));
        }
        let width = check_vectors(samples, None)?;

        self.algorithm.fit(samples, labels);
        self.width = Some(width);
        self.feature_names = None;
        tracing::debug!(
            "Fitted {} on {} samples of width {}",
            self.algorithm.name(),
            samples.len(),
            width
        );
        Ok(())
    }

    pub fn predict(&self, samples: &[Vec<Feature>]) -> Result<Vec<Label>> {
        if let Some(expected) = &self.feature_names {
            for sample in samples {
                let names = sample.iter().map(|f| f.name.as_str());
                if !names.eq(expected.iter().map(String::as_str)) {
                    return Err(Error::InvalidInput(
                        "feature names differ from the training features".to_string(),
                    ));
                }
            }
        }
        self.predict_with_values(&map_input(samples)?)
    }

    pub fn predict_with_values(&self, samples: &[Vec<f64>]) -> Result<Vec<Label>> {
        let width = self.width.ok_or(Error::ModelNotFitted)?;
        check_vectors(samples, Some(width))?;

        samples
            .iter()
            .map(|sample| self.algorithm.predict_one(sample).ok_or(Error::ModelNotFitted))
            .collect()
    }
}

/// Drops feature names, keeping values in positional order.
fn map_input(samples: &[Vec<Feature>]) -> Result<Vec<Vec<f64>>> {
    samples
        .iter()
        .map(|sample| {
            sample
                .iter()
                .map(|feature| {
                    feature.value.ok_or_else(|| {
                        Error::InvalidInput(format!("feature '{}' has no value", feature.name))
                    })
                })
                .collect()
        })
        .collect()
}

fn consistent_names(samples: &[Vec<Feature>]) -> Result<Option<Vec<String>>> {
    let Some(first) = samples.first() else {
        return Ok(None);
    };
    let names: Vec<String> = first.iter().map(|f| f.name.clone()).collect();
    for (i, sample) in samples.iter().enumerate().skip(1) {
        if sample.len() == names.len()
            && !sample.iter().map(|f| &f.name).eq(names.iter())
        {
            return Err(Error::InvalidInput(format!(
                "sample {} lists its features in a different order",
                i
            )));
        }
    }
    Ok(Some(names))
}

/// Returns the common width, requiring `expected` when given.
fn check_vectors(samples: &[Vec<f64>], expected: Option<usize>) -> Result<usize> {
    let width = expected.or_else(|| samples.first().map(Vec::len)).unwrap_or(0);
    for (i, sample) in samples.iter().enumerate() {
        if sample.len() != width {
            return Err(Error::InvalidInput(format!(
                "sample {} has {} values, expected {}",
                i,
                sample.len(),
                width
            )));
        }
        if sample.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput(format!("sample {} has a non-finite value", i)));
        }
    }
    Ok(width)
}

/// Most frequent label; ties go to the lexicographically smallest one.
pub(crate) fn majority<'a>(labels: impl IntoIterator<Item = &'a Label>) -> Option<Label> {
    let mut counts: BTreeMap<&Label, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
    }

    let mut best: Option<(&Label, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f64, y: f64) -> Vec<Feature> {
        vec![Feature::with_value("x", x), Feature::with_value("y", y)]
    }

    fn labels(names: &[&str]) -> Vec<Label> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decision_tree_round_trip() {
        let mut clf = Classifier::decision_tree();
        clf.fit(&[sample(1.0, 2.0), sample(5.0, 6.0)], &labels(&["A", "B"]))
            .unwrap();
        assert_eq!(clf.predict(&[sample(1.0, 2.0)]).unwrap(), labels(&["A"]));
        assert_eq!(clf.name(), "DecisionTreeClassifier");
    }

    #[test]
    fn test_predict_matches_predict_with_values() {
        let training = vec![
            sample(1.0, 1.0),
            sample(1.5, 2.0),
            sample(2.0, 1.0),
            sample(8.0, 9.0),
            sample(9.0, 8.0),
            sample(8.5, 8.5),
        ];
        let targets = labels(&["edu", "edu", "edu", "prod", "prod", "prod"]);
        let queries = vec![sample(1.2, 1.4), sample(8.8, 8.1), sample(4.0, 6.0)];
        let raw: Vec<Vec<f64>> = queries
            .iter()
            .map(|s| s.iter().map(|f| f.value.unwrap()).collect())
            .collect();

        for mut clf in [Classifier::decision_tree(), Classifier::k_nearest_neighbors()] {
            clf.fit(&training, &targets).unwrap();
            let wrapped = clf.predict(&queries).unwrap();
            assert_eq!(wrapped, clf.predict_with_values(&raw).unwrap());
            assert_eq!(wrapped[0], "edu");
            assert_eq!(wrapped[1], "prod");
        }
    }

    #[test]
    fn test_mismatched_label_count() {
        let mut clf = Classifier::decision_tree();
        let err = clf
            .fit(&[sample(1.0, 2.0)], &labels(&["A", "B"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!clf.is_fitted());
    }

    #[test]
    fn test_inconsistent_vector_length() {
        let mut clf = Classifier::k_nearest_neighbors();
        let short = vec![Feature::with_value("x", 1.0)];
        let err = clf
            .fit(&[sample(1.0, 2.0), short], &labels(&["A", "B"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_inconsistent_feature_order() {
        let mut clf = Classifier::decision_tree();
        let swapped = vec![Feature::with_value("y", 2.0), Feature::with_value("x", 1.0)];
        let err = clf
            .fit(&[sample(1.0, 2.0), swapped], &labels(&["A", "B"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_unset_feature_rejected() {
        let mut clf = Classifier::decision_tree();
        let unset = vec![Feature::with_value("x", 1.0), Feature::new("y")];
        let err = clf
            .fit(&[sample(1.0, 2.0), unset], &labels(&["A", "B"]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_predict_requires_fit_and_matching_width() {
        let mut clf = Classifier::decision_tree();
        assert!(matches!(
            clf.predict_with_values(&[vec![1.0, 2.0]]),
            Err(Error::ModelNotFitted)
        ));

        clf.fit_with_values(&[vec![1.0, 2.0], vec![3.0, 4.0]], &labels(&["A", "B"]))
            .unwrap();
        assert!(matches!(
            clf.predict_with_values(&[vec![1.0]]),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            clf.predict_with_values(&[vec![f64::NAN, 1.0]]),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_predict_rejects_renamed_features() {
        let mut clf = Classifier::decision_tree();
        clf.fit(&[sample(1.0, 2.0), sample(5.0, 6.0)], &labels(&["A", "B"]))
            .unwrap();
        let renamed = vec![Feature::with_value("x", 1.0), Feature::with_value("z", 2.0)];
        assert!(matches!(clf.predict(&[renamed]), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_majority_tie_breaks_lexicographically() {
        let votes = labels(&["prod", "edu", "prod", "edu"]);
        assert_eq!(majority(&votes), Some("edu".to_string()));
        assert_eq!(majority(&Vec::<Label>::new()), None);
    }
}
