//! Post-run analysis
//!
//! Root-cause grouping, trend/velocity and risk scoring. All three are pure
//! functions of step results and run history; nothing here touches a
//! connection or the recorder.

pub mod risk;
pub mod root_cause;
pub mod trend;

pub use risk::score;
pub use root_cause::{RULESET_VERSION, analyze, blocker_count};
pub use trend::{analytics_report, summarize, trend_report, velocity};
