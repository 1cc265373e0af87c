//! Permission engine: evaluates `(accessor, category, target, operation)`
//! against the accessor's trust-type base permissions merged with any
//! per-relationship override.
//!
//! Deny patterns always win; overrides can widen allows but never narrow the
//! base exclusions (fail-safe union).

use std::collections::HashMap;

use crate::prelude::*;
use actingweb_types::auth_adapter::{Accessor, AuthCtx};
use actingweb_types::permissions::{Category, Operation, PermissionSet, pattern_match};
use actingweb_types::store_adapter::StoreAdapter;

pub const OVERRIDE_BUCKET: &str = "_trust_permissions";

/// Outcome of a permission evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
	Allowed,
	Denied,
	/// No rule said anything. Callers normally treat this as denied.
	NotFound,
}

/// Per-request memo of evaluated decisions and the merged permission set.
#[derive(Debug, Default)]
pub struct PermCache {
	effective: Option<PermissionSet>,
	trust_active: Option<bool>,
	decisions: HashMap<(Category, Box<str>, Operation), Decision>,
}

impl PermCache {
	pub fn new() -> Self {
		Self::default()
	}
}

/// An exclusion protects its whole subtree: a pattern under `target/` also
/// denies access to `target` itself, so a parent object can never expose an
/// excluded child.
fn excluded(pattern: &str, target: &str) -> bool {
	pattern_match(pattern, target)
		|| (pattern.len() > target.len()
			&& pattern.starts_with(target)
			&& pattern.as_bytes()[target.len()] == b'/')
}

/// Pure decision over one category's rules.
fn decide(set: &PermissionSet, category: Category, target: &str, op: Operation) -> Decision {
	let Some(rules) = set.category(category) else {
		return Decision::NotFound;
	};

	if rules.excluded_patterns.iter().any(|p| excluded(p, target)) {
		return Decision::Denied;
	}
	if rules.operations.contains(&op) && rules.patterns.iter().any(|p| pattern_match(p, target)) {
		return Decision::Allowed;
	}
	if rules.patterns.is_empty() && rules.excluded_patterns.is_empty() {
		Decision::NotFound
	} else {
		// Explicit patterns are defined for this category and none allowed
		// the request: no legacy fallback.
		Decision::Denied
	}
}

/// Read the per-relationship override, if any.
pub async fn read_override(
	store: &std::sync::Arc<dyn StoreAdapter>,
	actor_id: &str,
	peer_id: &str,
) -> AwResult<Option<PermissionSet>> {
	let key = format!("{}:{}", actor_id, peer_id);
	match store.read_attr(actor_id, OVERRIDE_BUCKET, &key).await {
		Ok(row) => Ok(Some(serde_json::from_value(row.value)?)),
		Err(Error::NotFound) => Ok(None),
		Err(err) => Err(err),
	}
}

/// Write (normalizing to the canonical dict form) the override for one peer.
pub async fn write_override(
	store: &std::sync::Arc<dyn StoreAdapter>,
	actor_id: &str,
	peer_id: &str,
	set: &PermissionSet,
) -> AwResult<()> {
	let key = format!("{}:{}", actor_id, peer_id);
	let value = serde_json::to_value(set)?;
	store.write_attr(actor_id, OVERRIDE_BUCKET, &key, &value, None).await
}

pub async fn delete_override(
	store: &std::sync::Arc<dyn StoreAdapter>,
	actor_id: &str,
	peer_id: &str,
) -> AwResult<()> {
	let key = format!("{}:{}", actor_id, peer_id);
	match store.delete_attr(actor_id, OVERRIDE_BUCKET, &key).await {
		Ok(()) | Err(Error::NotFound) => Ok(()),
		Err(err) => Err(err),
	}
}

/// The merged permission set a peer holds on an actor: trust-type base plus
/// override.
pub async fn effective_permissions(
	app: &App,
	actor_id: &str,
	peer_id: &str,
	relationship: &str,
) -> AwResult<PermissionSet> {
	let base = {
		let registry = app.trust_types.read().await;
		registry
			.get(relationship)
			.map(|tt| tt.base_permissions.clone())
			.ok_or_else(|| Error::ValidationError(format!("unknown trust type: {}", relationship)))?
	};
	match read_override(&app.store, actor_id, peer_id).await? {
		Some(over) => Ok(base.merge_override(&over)),
		None => Ok(base),
	}
}

/// Evaluate one request, memoizing both the merged set and the decision.
pub async fn evaluate(
	app: &App,
	auth: &AuthCtx,
	cache: &mut PermCache,
	category: Category,
	target: &str,
	op: Operation,
) -> AwResult<Decision> {
	let (peer_id, relationship) = match &auth.accessor {
		Accessor::Owner { .. } => return Ok(Decision::Allowed),
		Accessor::Peer { peer_id, relationship }
		| Accessor::Client { peer_id, relationship, .. } => (peer_id, relationship),
	};

	let key = (category, Box::from(target), op);
	if let Some(decision) = cache.decisions.get(&key) {
		return Ok(*decision);
	}

	// A trust that is not yet approved on both sides grants nothing.
	if cache.trust_active.is_none() {
		let active = match app.store.read_trust(&auth.actor_id, peer_id).await {
			Ok(trust) => trust.is_active(),
			Err(Error::NotFound) => false,
			Err(err) => return Err(err),
		};
		cache.trust_active = Some(active);
	}
	if cache.trust_active == Some(false) {
		cache.decisions.insert(key, Decision::Denied);
		return Ok(Decision::Denied);
	}

	if cache.effective.is_none() {
		cache.effective =
			Some(effective_permissions(app, &auth.actor_id, peer_id, relationship).await?);
	}
	let set = cache.effective.as_ref().ok_or(Error::Internal("perm cache".into()))?;

	let decision = decide(set, category, target, op);
	debug!(
		"perm {} {}:{} {} -> {:?}",
		auth.accessor.kind(),
		category.as_str(),
		target,
		op.as_str(),
		decision
	);
	cache.decisions.insert(key, decision);
	Ok(decision)
}

/// Evaluate and turn anything but `Allowed` into `PermissionDenied`.
pub async fn require(
	app: &App,
	auth: &AuthCtx,
	category: Category,
	target: &str,
	op: Operation,
) -> AwResult<()> {
	let mut cache = PermCache::new();
	match evaluate(app, auth, &mut cache, category, target, op).await? {
		Decision::Allowed => Ok(()),
		Decision::Denied | Decision::NotFound => Err(Error::PermissionDenied),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use actingweb_types::permissions::CategoryRules;

	fn set(patterns: &[&str], ops: &[Operation], excluded: &[&str]) -> PermissionSet {
		PermissionSet {
			properties: Some(CategoryRules {
				patterns: patterns.iter().map(|p| (*p).into()).collect(),
				operations: ops.to_vec(),
				excluded_patterns: excluded.iter().map(|p| (*p).into()).collect(),
			}),
			..Default::default()
		}
	}

	#[test]
	fn test_deny_wins() {
		let s = set(&["*"], &[Operation::Read], &["private/*"]);
		assert_eq!(
			decide(&s, Category::Properties, "private/keys", Operation::Read),
			Decision::Denied
		);
		assert_eq!(decide(&s, Category::Properties, "note", Operation::Read), Decision::Allowed);
	}

	#[test]
	fn test_exclusion_protects_subtree_root() {
		let s = set(&["*"], &[Operation::Read], &["private/*"]);
		// The parent object would expose the excluded children.
		assert_eq!(decide(&s, Category::Properties, "private", Operation::Read), Decision::Denied);
		assert_eq!(
			decide(&s, Category::Properties, "privateer", Operation::Read),
			Decision::Allowed
		);
	}

	#[test]
	fn test_no_match_with_patterns_is_denied() {
		let s = set(&["memory_*"], &[Operation::Read], &[]);
		assert_eq!(decide(&s, Category::Properties, "note", Operation::Read), Decision::Denied);
	}

	#[test]
	fn test_operation_mismatch_is_denied() {
		let s = set(&["*"], &[Operation::Read], &[]);
		assert_eq!(decide(&s, Category::Properties, "note", Operation::Write), Decision::Denied);
	}

	#[test]
	fn test_absent_category_is_not_found() {
		let s = set(&["*"], &[Operation::Read], &[]);
		assert_eq!(decide(&s, Category::Methods, "ping", Operation::Read), Decision::NotFound);
	}

	#[test]
	fn test_override_widens_but_keeps_base_exclusions() {
		let base = set(&["*"], &[Operation::Read], &["private/*", "security/*"]);
		let over = set(&["memory_*"], &[Operation::Write], &["memory_personal"]);
		let merged = base.merge_override(&over);

		assert_eq!(
			decide(&merged, Category::Properties, "memory_travel", Operation::Write),
			Decision::Allowed
		);
		assert_eq!(
			decide(&merged, Category::Properties, "memory_personal", Operation::Write),
			Decision::Denied
		);
		assert_eq!(
			decide(&merged, Category::Properties, "private/keys", Operation::Read),
			Decision::Denied
		);
	}
}

// vim: ts=4
