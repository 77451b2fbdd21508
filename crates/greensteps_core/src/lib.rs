//! Pure carbon accounting rules for GreenSteps.
//!
//! Nothing in this crate performs I/O. Callers fetch rows, hand them to these
//! functions and persist whatever comes back.

pub mod activity;
pub mod emission;
pub mod factors;
pub mod quest;
pub mod ranking;
pub mod summary;

pub use activity::{Activity, ActivityForm, Category, Effect};
pub use emission::{Emission, EmissionError, QuantityLimits, compute_emission, round2};
pub use factors::EmissionFactorTable;
pub use quest::{QuestDefinition, QuestProgress};
pub use ranking::{ProfileSummary, RankedEntry, Scope, rank_profiles};
pub use summary::{DashboardSummary, LoggedActivity, current_streak, summarize};
