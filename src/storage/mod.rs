pub mod sqlite;

pub use sqlite::FeatureStore;
