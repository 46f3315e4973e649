pub mod feature;
pub mod repository;

pub use feature::*;
pub use repository::*;
