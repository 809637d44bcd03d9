//! Rule documents
//!
//! A rule document bundles the flow-control rules and the IP filter options
//! that are active at a point in time. Documents are fetched from the config
//! store as YAML (JSON is accepted as well) and always replace the previous
//! set as a whole.

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Flow-control sampling window in milliseconds. Fixed for all rules.
pub const FLOW_WINDOW_MS: u64 = 1000;

/// A single per-resource flow-control rule.
///
/// Counting is direct (every admitted request counts once against the
/// resource) and requests over the threshold are rejected.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlowRule {
	pub resource: Box<str>,
	/// Admitted requests per window
	pub threshold: f64,
}

impl FlowRule {
	pub fn new(resource: impl Into<Box<str>>, threshold: f64) -> Self {
		Self { resource: resource.into(), threshold }
	}

	pub fn with_threshold(&self, threshold: f64) -> Self {
		Self { resource: self.resource.clone(), threshold }
	}
}

/// IPs authorized to access one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Authorized {
	#[serde(default)]
	pub resource: Box<str>,
	#[serde(default)]
	pub ips: Vec<Box<str>>,
}

/// IP filter settings as written in the rule document.
///
/// Addresses are kept as strings here; they are parsed (and malformed
/// entries dropped) when the filter is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterOptions {
	pub allowed: Vec<Box<str>>,
	pub blocked: Vec<Box<str>>,
	/// Request path the filter guards
	#[serde(rename = "urlPath")]
	pub url_path: Box<str>,
	/// Query parameter carrying the resource identity
	#[serde(rename = "urlParam")]
	pub url_param: Box<str>,
	pub authorized: Vec<Authorized>,
	/// Block addresses that are in neither list
	#[serde(rename = "blockedDefault")]
	pub blocked_default: bool,
}

/// The complete admission configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RuleSet {
	#[serde(rename = "resource-param", default)]
	pub resource_param: Box<str>,
	#[serde(rename = "flow-control-rules", default)]
	pub flow_rules: Vec<FlowRule>,
	#[serde(rename = "ip-filter-rules", default)]
	pub ip_filter: FilterOptions,
}

impl RuleSet {
	/// Decode a rule document.
	///
	/// An empty (or whitespace-only) document is rejected: a config store
	/// returning nothing must not wipe the active rules.
	pub fn decode(doc: &str) -> ClResult<Self> {
		if doc.trim().is_empty() {
			return Err(Error::ConfigDecode("empty rule document".into()));
		}
		let rule_set: RuleSet = serde_yaml::from_str(doc)?;
		Ok(rule_set)
	}

	pub fn to_yaml(&self) -> ClResult<String> {
		Ok(serde_yaml::to_string(self)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const DOC: &str = r#"
resource-param: cid
flow-control-rules:
  - resource: alpha
    threshold: 30
  - resource: beta
    threshold: 2.5
ip-filter-rules:
  allowed: [10.0.0.1, 10.0.0.2]
  blocked: [10.0.0.9]
  urlPath: /q
  urlParam: cid
  authorized:
    - resource: alpha
      ips: [10.0.0.1]
  blockedDefault: true
"#;

	#[test]
	fn test_decode_yaml() {
		let rs = RuleSet::decode(DOC).unwrap();
		assert_eq!(&*rs.resource_param, "cid");
		assert_eq!(rs.flow_rules, vec![FlowRule::new("alpha", 30.0), FlowRule::new("beta", 2.5)]);
		assert_eq!(rs.ip_filter.allowed.len(), 2);
		assert_eq!(&*rs.ip_filter.url_path, "/q");
		assert_eq!(&*rs.ip_filter.authorized[0].resource, "alpha");
		assert!(rs.ip_filter.blocked_default);
	}

	#[test]
	fn test_decode_json() {
		let doc = r#"{"resource-param":"r","flow-control-rules":[{"resource":"a","threshold":1}],"ip-filter-rules":{"urlPath":"/x"}}"#;
		let rs = RuleSet::decode(doc).unwrap();
		assert_eq!(&*rs.flow_rules[0].resource, "a");
		assert_eq!(&*rs.ip_filter.url_path, "/x");
		assert!(!rs.ip_filter.blocked_default);
		assert!(rs.ip_filter.allowed.is_empty());
	}

	#[test]
	fn test_decode_rejects_garbage() {
		assert!(matches!(RuleSet::decode(""), Err(Error::ConfigDecode(_))));
		assert!(matches!(RuleSet::decode("flow-control-rules: 12"), Err(Error::ConfigDecode(_))));
		assert!(matches!(
			RuleSet::decode("flow-control-rules:\n  - resource: a\n    threshold: lots"),
			Err(Error::ConfigDecode(_))
		));
	}

	#[test]
	fn test_yaml_roundtrip_keeps_field_names() {
		let yaml = RuleSet::decode(DOC).unwrap().to_yaml().unwrap();
		assert!(yaml.contains("flow-control-rules"));
		assert!(yaml.contains("urlPath"));
		assert!(yaml.contains("blockedDefault"));
	}
}

// vim: ts=4
