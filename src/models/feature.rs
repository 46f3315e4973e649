use serde::{Deserialize, Serialize};

/// A named numeric signal describing a repository.
///
/// `value` is `None` until the owning extractor has run successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub value: Option<f64>,
}

impl Feature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }

    pub fn flag(name: impl Into<String>, set: bool) -> Self {
        Self::with_value(name, if set { 1.0 } else { 0.0 })
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }
}
