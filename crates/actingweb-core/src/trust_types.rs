//! Trust-type registry: named templates of base permissions.
//!
//! Types live in the `_trust_types` bucket of the reserved system actor and
//! are loaded eagerly at startup so permission evaluation never cold-loads
//! storage in the middle of an OAuth2 flow.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use std::sync::Arc;

use crate::prelude::*;
use actingweb_types::SYSTEM_ACTOR;
use actingweb_types::permissions::{CategoryRules, Operation, PermissionSet};
use actingweb_types::store_adapter::StoreAdapter;

pub const TRUST_TYPE_BUCKET: &str = "_trust_types";

#[skip_serializing_none]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrustType {
	pub name: Box<str>,
	pub display_name: Box<str>,
	pub base_permissions: PermissionSet,
	#[serde(default)]
	pub allow_user_override: bool,
	pub oauth_scope: Option<Box<str>>,
	pub acl_rules: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
pub struct TrustTypeRegistry {
	types: HashMap<Box<str>, TrustType>,
}

impl TrustTypeRegistry {
	pub fn new() -> Self {
		Self { types: HashMap::new() }
	}

	pub fn get(&self, name: &str) -> Option<&TrustType> {
		self.types.get(name)
	}

	pub fn register(&mut self, tt: TrustType) {
		self.types.insert(tt.name.clone(), tt);
	}

	pub fn names(&self) -> Vec<&str> {
		let mut names: Vec<&str> = self.types.keys().map(AsRef::as_ref).collect();
		names.sort_unstable();
		names
	}

	pub fn list(&self) -> Vec<&TrustType> {
		let mut list: Vec<&TrustType> = self.types.values().collect();
		list.sort_unstable_by(|a, b| a.name.cmp(&b.name));
		list
	}

	/// Load every persisted trust type from the system actor's bucket.
	pub async fn load(&mut self, store: &Arc<dyn StoreAdapter>) -> AwResult<usize> {
		let rows = match store.read_bucket(SYSTEM_ACTOR, TRUST_TYPE_BUCKET).await {
			Ok(rows) => rows,
			Err(Error::NotFound) => Vec::new(),
			Err(err) => return Err(err),
		};
		let mut loaded = 0;
		for row in rows {
			match serde_json::from_value::<TrustType>(row.value) {
				Ok(tt) => {
					self.register(tt);
					loaded += 1;
				}
				Err(err) => warn!("Skipping malformed trust type {}: {}", row.name, err),
			}
		}
		Ok(loaded)
	}

	/// Persist the built-in trust types that are not already present, then
	/// register them.
	pub async fn ensure_defaults(&mut self, store: &Arc<dyn StoreAdapter>) -> AwResult<()> {
		for tt in builtin_trust_types() {
			if self.types.contains_key(&tt.name) {
				continue;
			}
			let value = serde_json::to_value(&tt)?;
			store.write_attr(SYSTEM_ACTOR, TRUST_TYPE_BUCKET, &tt.name, &value, None).await?;
			self.register(tt);
		}
		Ok(())
	}

	/// Register a custom type and persist it.
	pub async fn save(&mut self, store: &Arc<dyn StoreAdapter>, tt: TrustType) -> AwResult<()> {
		let value = serde_json::to_value(&tt)?;
		store.write_attr(SYSTEM_ACTOR, TRUST_TYPE_BUCKET, &tt.name, &value, None).await?;
		self.register(tt);
		Ok(())
	}
}

fn rules(patterns: &[&str], operations: &[Operation], excluded: &[&str]) -> Option<CategoryRules> {
	Some(CategoryRules {
		patterns: patterns.iter().map(|p| (*p).into()).collect(),
		operations: operations.to_vec(),
		excluded_patterns: excluded.iter().map(|p| (*p).into()).collect(),
	})
}

const PROTECTED: &[&str] = &["private/*", "security/*"];

/// The six built-in trust types.
pub fn builtin_trust_types() -> Vec<TrustType> {
	use Operation::{Delete, Read, Subscribe, Write};

	vec![
		TrustType {
			name: "associate".into(),
			display_name: "Associate".into(),
			base_permissions: PermissionSet {
				properties: rules(&["public/*"], &[Read], &[]),
				..Default::default()
			},
			allow_user_override: false,
			oauth_scope: None,
			acl_rules: None,
		},
		TrustType {
			name: "viewer".into(),
			display_name: "Viewer".into(),
			base_permissions: PermissionSet {
				properties: rules(&["*"], &[Read], PROTECTED),
				methods: rules(&["*"], &[Read], &[]),
				..Default::default()
			},
			allow_user_override: true,
			oauth_scope: None,
			acl_rules: None,
		},
		TrustType {
			name: "friend".into(),
			display_name: "Friend".into(),
			base_permissions: PermissionSet {
				properties: rules(&["*"], &[Read, Subscribe], PROTECTED),
				methods: rules(&["*"], &[Read], &[]),
				actions: rules(&["*"], &[Read], &[]),
				..Default::default()
			},
			allow_user_override: true,
			oauth_scope: None,
			acl_rules: None,
		},
		TrustType {
			name: "partner".into(),
			display_name: "Partner".into(),
			base_permissions: PermissionSet {
				properties: rules(&["*"], &[Read, Write, Subscribe], PROTECTED),
				methods: rules(&["*"], &[Read, Write], &[]),
				actions: rules(&["*"], &[Read, Write], &[]),
				resources: rules(&["*"], &[Read], &[]),
				..Default::default()
			},
			allow_user_override: true,
			oauth_scope: None,
			acl_rules: None,
		},
		TrustType {
			name: "admin".into(),
			display_name: "Administrator".into(),
			base_permissions: PermissionSet {
				properties: rules(&["*"], &[Read, Write, Delete, Subscribe], &[]),
				methods: rules(&["*"], &[Read, Write, Delete], &[]),
				actions: rules(&["*"], &[Read, Write, Delete], &[]),
				tools: rules(&["*"], &[Read, Write], &[]),
				resources: rules(&["*"], &[Read, Write], &[]),
				prompts: rules(&["*"], &[Read], &[]),
			},
			allow_user_override: false,
			oauth_scope: None,
			acl_rules: None,
		},
		TrustType {
			name: "mcp_client".into(),
			display_name: "MCP Client".into(),
			base_permissions: PermissionSet {
				properties: rules(&["*"], &[Read, Write], PROTECTED),
				tools: rules(&["*"], &[Read, Write], &[]),
				resources: rules(&["*"], &[Read], &[]),
				prompts: rules(&["*"], &[Read], &[]),
				..Default::default()
			},
			allow_user_override: true,
			oauth_scope: Some("mcp".into()),
			acl_rules: None,
		},
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builtin_names() {
		let mut registry = TrustTypeRegistry::new();
		for tt in builtin_trust_types() {
			registry.register(tt);
		}
		assert_eq!(
			registry.names(),
			vec!["admin", "associate", "friend", "mcp_client", "partner", "viewer"]
		);
	}

	#[test]
	fn test_friend_excludes_private() {
		let types = builtin_trust_types();
		let friend = types.iter().find(|t| t.name.as_ref() == "friend").unwrap();
		let props = friend.base_permissions.properties.as_ref().unwrap();
		assert!(props.excluded_patterns.iter().any(|p| p.as_ref() == "private/*"));
		assert!(!props.operations.contains(&Operation::Write));
	}
}

// vim: ts=4
