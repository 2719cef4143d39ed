//! Pluggable pieces the simulator consults but doesn't own the policy of:
//! who a new job's campaign is, how long it's expected to run, what its
//! hard time limit is, and how much of the cluster its owner is entitled
//! to. Each is a closed set of implementations dispatched by value, not a
//! runtime plugin interface.

mod estimator;
mod selector;
mod shares;
mod submitter;

pub use estimator::{AverageOfLastNEstimator, DefaultEstimator, Estimator};
pub use selector::Selector;
pub use shares::{CustomShare, EqualShare, ShareAssigner};
pub use submitter::{ConstantTimeSubmitter, DefaultTimeSubmitter, OracleSubmitter, Submitter};
