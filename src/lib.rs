pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod merge;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod pool;
pub mod resolver;
pub mod similarity;
pub mod storage;
pub mod types;
