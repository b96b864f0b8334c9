pub mod aggregator;
pub mod checks;
pub mod console;
pub mod engine;
pub mod executor;
pub mod headers;
pub mod lifecycle;
pub mod live_monitor;
pub mod parse_duration;
pub mod reporter;
pub mod scheduler;
pub mod threshold_evaluator;
pub mod transport;
pub mod vu_pool;
