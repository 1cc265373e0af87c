//! Permission structures shared by the trust-type registry and per-trust
//! overrides.
//!
//! The canonical serialized form of a category is a dict
//! (`{"patterns": [...], "operations": [...], "excluded_patterns": [...]}`).
//! A bare list of patterns is accepted on read for backward compatibility and
//! normalized on write.

use serde::{Deserialize, Deserializer, Serialize};
use serde_with::skip_serializing_none;

/// Operations a permission rule can grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
	Read,
	Write,
	Delete,
	Subscribe,
}

impl Operation {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::Delete => "delete",
			Self::Subscribe => "subscribe",
		}
	}
}

/// Permission categories. MCP surfaces (tools, resources, prompts) share the
/// same rule structure as the REST surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
	Properties,
	Methods,
	Actions,
	Tools,
	Resources,
	Prompts,
}

impl Category {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Properties => "properties",
			Self::Methods => "methods",
			Self::Actions => "actions",
			Self::Tools => "tools",
			Self::Resources => "resources",
			Self::Prompts => "prompts",
		}
	}
}

/// Rules for one category: allow patterns with operations, plus deny patterns.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CategoryRules {
	pub patterns: Vec<Box<str>>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub operations: Vec<Operation>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub excluded_patterns: Vec<Box<str>>,
}

impl<'de> Deserialize<'de> for CategoryRules {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		#[derive(Deserialize)]
		#[serde(untagged)]
		enum Raw {
			// Legacy form: a bare list of allow patterns.
			List(Vec<Box<str>>),
			Dict {
				#[serde(default, alias = "allowed")]
				patterns: Vec<Box<str>>,
				#[serde(default)]
				operations: Vec<Operation>,
				#[serde(default, alias = "denied")]
				excluded_patterns: Vec<Box<str>>,
			},
		}

		Ok(match Raw::deserialize(deserializer)? {
			Raw::List(patterns) => CategoryRules {
				patterns,
				operations: vec![Operation::Read],
				excluded_patterns: Vec::new(),
			},
			Raw::Dict { patterns, operations, excluded_patterns } => {
				CategoryRules { patterns, operations, excluded_patterns }
			}
		})
	}
}

impl CategoryRules {
	/// Merge an override on top of this base: allow patterns and operations
	/// union; exclusions union as well, so an override can never narrow the
	/// base exclusions.
	pub fn merge_override(&self, over: &CategoryRules) -> CategoryRules {
		let mut merged = self.clone();
		for p in &over.patterns {
			if !merged.patterns.contains(p) {
				merged.patterns.push(p.clone());
			}
		}
		for op in &over.operations {
			if !merged.operations.contains(op) {
				merged.operations.push(*op);
			}
		}
		for p in &over.excluded_patterns {
			if !merged.excluded_patterns.contains(p) {
				merged.excluded_patterns.push(p.clone());
			}
		}
		merged
	}
}

/// Full permission structure of a trust type or a per-trust override.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionSet {
	pub properties: Option<CategoryRules>,
	pub methods: Option<CategoryRules>,
	pub actions: Option<CategoryRules>,
	pub tools: Option<CategoryRules>,
	pub resources: Option<CategoryRules>,
	pub prompts: Option<CategoryRules>,
}

impl PermissionSet {
	pub fn category(&self, category: Category) -> Option<&CategoryRules> {
		match category {
			Category::Properties => self.properties.as_ref(),
			Category::Methods => self.methods.as_ref(),
			Category::Actions => self.actions.as_ref(),
			Category::Tools => self.tools.as_ref(),
			Category::Resources => self.resources.as_ref(),
			Category::Prompts => self.prompts.as_ref(),
		}
	}

	/// Merge `over` on top of `self` category by category. A category defined
	/// only in the override is taken as-is.
	pub fn merge_override(&self, over: &PermissionSet) -> PermissionSet {
		fn merge(
			base: Option<&CategoryRules>,
			over: Option<&CategoryRules>,
		) -> Option<CategoryRules> {
			match (base, over) {
				(Some(b), Some(o)) => Some(b.merge_override(o)),
				(Some(b), None) => Some(b.clone()),
				(None, Some(o)) => Some(o.clone()),
				(None, None) => None,
			}
		}

		PermissionSet {
			properties: merge(self.properties.as_ref(), over.properties.as_ref()),
			methods: merge(self.methods.as_ref(), over.methods.as_ref()),
			actions: merge(self.actions.as_ref(), over.actions.as_ref()),
			tools: merge(self.tools.as_ref(), over.tools.as_ref()),
			resources: merge(self.resources.as_ref(), over.resources.as_ref()),
			prompts: merge(self.prompts.as_ref(), over.prompts.as_ref()),
		}
	}
}

/// Glob match supporting `*` (any run) and `?` (any single char). A pattern
/// ending in `://` prefix form (e.g. `notes://travel/*`) is matched the same
/// way; URI prefixes without a wildcard match by prefix.
pub fn pattern_match(pattern: &str, target: &str) -> bool {
	if !pattern.contains('*') && !pattern.contains('?') && pattern.contains("://") {
		return target.starts_with(pattern);
	}
	glob_match(pattern.as_bytes(), target.as_bytes())
}

fn glob_match(pat: &[u8], text: &[u8]) -> bool {
	// Iterative matcher with single-star backtracking.
	let (mut p, mut t) = (0usize, 0usize);
	let (mut star, mut mark) = (usize::MAX, 0usize);

	while t < text.len() {
		if p < pat.len() && (pat[p] == b'?' || pat[p] == text[t]) {
			p += 1;
			t += 1;
		} else if p < pat.len() && pat[p] == b'*' {
			star = p;
			mark = t;
			p += 1;
		} else if star != usize::MAX {
			p = star + 1;
			mark += 1;
			t = mark;
		} else {
			return false;
		}
	}
	while p < pat.len() && pat[p] == b'*' {
		p += 1;
	}
	p == pat.len()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_glob_basics() {
		assert!(pattern_match("*", "anything"));
		assert!(pattern_match("memory_*", "memory_travel"));
		assert!(!pattern_match("memory_*", "settings"));
		assert!(pattern_match("a?c", "abc"));
		assert!(!pattern_match("a?c", "abbc"));
		assert!(pattern_match("private/*", "private/keys"));
		assert!(!pattern_match("private/*", "public/keys"));
	}

	#[test]
	fn test_uri_prefix() {
		assert!(pattern_match("notes://", "notes://travel/2024"));
		assert!(pattern_match("notes://travel/*", "notes://travel/2024"));
		assert!(!pattern_match("notes://", "files://travel"));
	}

	#[test]
	fn test_legacy_list_form() {
		let rules: CategoryRules = serde_json::from_str(r#"["memory_*", "note"]"#).unwrap();
		assert_eq!(rules.patterns.len(), 2);
		assert_eq!(rules.operations, vec![Operation::Read]);

		// Canonical form round-trips.
		let rules: CategoryRules = serde_json::from_str(
			r#"{"patterns": ["*"], "operations": ["read", "write"], "excluded_patterns": ["private/*"]}"#,
		)
		.unwrap();
		assert_eq!(rules.operations, vec![Operation::Read, Operation::Write]);
		assert_eq!(rules.excluded_patterns, vec!["private/*".into()]);
	}

	#[test]
	fn test_override_cannot_narrow_exclusions() {
		let base: CategoryRules = serde_json::from_str(
			r#"{"patterns": ["*"], "operations": ["read"], "excluded_patterns": ["private/*"]}"#,
		)
		.unwrap();
		let over: CategoryRules = serde_json::from_str(
			r#"{"patterns": ["memory_*"], "operations": ["write"], "excluded_patterns": ["memory_personal"]}"#,
		)
		.unwrap();
		let merged = base.merge_override(&over);
		assert!(merged.excluded_patterns.contains(&"private/*".into()));
		assert!(merged.excluded_patterns.contains(&"memory_personal".into()));
		assert!(merged.operations.contains(&Operation::Read));
		assert!(merged.operations.contains(&Operation::Write));
	}
}

// vim: ts=4
