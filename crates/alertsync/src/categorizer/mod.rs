//! Alert-type classification.

pub mod matcher;

pub use crate::config::schema::CategoryRule;
pub use matcher::{categorize, Categorizer};
