pub mod core;
pub mod models;

pub use crate::core::engine::{LoadTest, StopHandle};
pub use crate::models::config::LoadConfig;
pub use crate::models::error::{LoadError, Result};
pub use crate::models::result::TestSummary;
