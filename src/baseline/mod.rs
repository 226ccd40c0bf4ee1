//! Performance baselining: turns recorded per-run measurements into summary
//! statistics, flags outliers, persists named baselines, and classifies a
//! new run's regression severity against a stored baseline.

pub mod regression;
pub mod stats;
pub mod store;

pub use regression::{classify, RegressionReport, Severity};
pub use stats::{outliers, RunStatistics};
pub use store::{cleanup_old_baselines, BaselineStatus, PerformanceBaseline};
