// self
use crate::obs::{HookKind, HookOutcome};

/// Records a hook outcome via the global metrics recorder (when enabled).
pub fn record_hook_outcome(kind: HookKind, outcome: HookOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"token_cache_hook_total",
			"hook" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_hook_outcome_noop_without_recorder() {
		record_hook_outcome(HookKind::AfterAccess, HookOutcome::Suppressed);
	}
}
