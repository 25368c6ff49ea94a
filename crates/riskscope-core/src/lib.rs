pub mod aggregator;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod narrative;
pub mod normalizer;
pub mod pricing;
pub mod report;
pub mod tables;
pub mod types;

pub use error::RiskScopeError;
pub use types::*;

/// Standard result type for all riskscope operations
pub type RiskScopeResult<T> = Result<T, RiskScopeError>;
