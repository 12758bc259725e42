//! Local admission control applied before any upstream call.
//!
//! Two budget shapes exist. [`TokenBudget`] chains one or more continuously refilling
//! [`TokenBucket`]s and suspends callers until every bucket admits. [`PointBudget`] mirrors the
//! hourly point allowance the analytics upstream reports and fails fast once it is spent. Both
//! support a punitive drain, applied when an upstream answers `429`, so the next local check
//! fails without contacting the upstream again.

mod points;
mod token_bucket;

pub use points::*;
pub use token_bucket::*;

// self
use crate::_prelude::*;

/// Outcome of a non-blocking admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
	/// The call may proceed.
	Allowed,
	/// The call must wait at least `retry_after` before the budget admits again.
	Denied {
		/// Time until the budget is expected to admit.
		retry_after: Duration,
	},
}
impl Admission {
	/// Returns true for [`Admission::Allowed`].
	pub fn is_allowed(&self) -> bool {
		matches!(self, Admission::Allowed)
	}
}
