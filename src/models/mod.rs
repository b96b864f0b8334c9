pub mod args;
pub mod assert_option;
pub mod check_stats;
pub mod config;
pub mod error;
pub mod http_error_stats;
pub mod metric_sample;
pub mod request_outcome;
pub mod result;
pub mod stage;
pub mod threshold;
