//! Membership rebalancing
//!
//! Every instance of a service enforces its share of the cluster-wide
//! threshold: with `n` active instances each one admits `threshold / n`.

use gatehouse_types::rules::{FlowRule, RuleSet};

/// Flow rules of `rules` scaled for `members` active instances. Always
/// computed from the base thresholds of the document. `None` when there are no
/// members, in which case the previous thresholds should stay in force.
pub fn rebalance(rules: &RuleSet, members: usize) -> Option<Vec<FlowRule>> {
	if members == 0 {
		return None;
	}
	#[allow(clippy::cast_precision_loss)]
	let n = members as f64;
	Some(rules.flow_rules.iter().map(|rule| rule.with_threshold(rule.threshold / n)).collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn rules() -> RuleSet {
		RuleSet {
			flow_rules: vec![FlowRule::new("a", 30.0), FlowRule::new("b", 5.0)],
			..Default::default()
		}
	}

	#[test]
	fn test_three_members() {
		let scaled = rebalance(&rules(), 3).unwrap();
		assert_eq!(scaled[0], FlowRule::new("a", 10.0));
		assert!((scaled[1].threshold - 5.0 / 3.0).abs() < f64::EPSILON);
	}

	#[test]
	fn test_single_member_keeps_base() {
		assert_eq!(rebalance(&rules(), 1).unwrap(), rules().flow_rules);
	}

	#[test]
	fn test_no_members() {
		assert_eq!(rebalance(&rules(), 0), None);
	}

	#[test]
	fn test_repeated_rebalance_starts_from_base() {
		let base = rules();
		let _ = rebalance(&base, 3);
		assert_eq!(rebalance(&base, 2).unwrap()[0], FlowRule::new("a", 15.0));
	}
}

// vim: ts=4
