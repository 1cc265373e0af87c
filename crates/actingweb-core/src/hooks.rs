//! Typed hook registry.
//!
//! Applications register hooks at composition time; the runtime dispatches
//! them at well-defined points: lifecycle transitions, property access,
//! named callbacks, and the app-defined method/action/tool/resource/prompt
//! surfaces. Hooks run under the access-controlled view of the accessor and
//! never corrupt runtime state: a failing hook is logged, the triggering
//! operation still commits.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::app::App;
use crate::prelude::*;
use actingweb_types::auth_adapter::AuthCtx;
use actingweb_types::permissions::pattern_match;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Lifecycle hooks
//*****************

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
	ActorCreated,
	TrustInitiated,
	TrustRequestReceived,
	TrustApproved,
	TrustFullyApprovedLocal,
	TrustFullyApprovedRemote,
	TrustDeleted,
	OauthSuccess,
	EmailVerificationRequired,
	EmailVerified,
	SubscriptionDeleted,
}

/// Payload of a lifecycle dispatch.
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
	pub kind: LifecycleKind,
	pub actor_id: Box<str>,
	pub peer_id: Option<Box<str>>,
	pub detail: Option<serde_json::Value>,
}

impl LifecycleEvent {
	pub fn new(kind: LifecycleKind, actor_id: &str) -> Self {
		Self { kind, actor_id: actor_id.into(), peer_id: None, detail: None }
	}

	pub fn with_peer(mut self, peer_id: &str) -> Self {
		self.peer_id = Some(peer_id.into());
		self
	}

	pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
		self.detail = Some(detail);
		self
	}
}

pub type LifecycleHook =
	Arc<dyn Fn(App, LifecycleEvent) -> BoxFuture<'static, AwResult<()>> + Send + Sync>;

// Property hooks
//****************

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOp {
	Get,
	Put,
	Post,
	Delete,
}

#[derive(Debug, Clone)]
pub struct PropertyHookCtx {
	pub auth: AuthCtx,
	pub name: Box<str>,
	pub op: PropertyOp,
	pub value: Option<serde_json::Value>,
}

/// Property hooks may pass the value through, transform it, or reject the
/// operation outright.
#[derive(Debug, Clone)]
pub enum HookOutcome {
	Continue(Option<serde_json::Value>),
	Reject,
}

pub type PropertyHook =
	Arc<dyn Fn(App, PropertyHookCtx) -> BoxFuture<'static, AwResult<HookOutcome>> + Send + Sync>;

struct PropertyHookEntry {
	pattern: Box<str>,
	ops: Vec<PropertyOp>,
	hook: PropertyHook,
}

// Callback / surface hooks
//**************************

#[derive(Debug, Clone)]
pub struct CallbackHookCtx {
	/// Absent for app-level callbacks (`/bot`, `/oauth`).
	pub auth: Option<AuthCtx>,
	pub name: Box<str>,
	pub payload: serde_json::Value,
}

pub type CallbackHook = Arc<
	dyn Fn(App, CallbackHookCtx) -> BoxFuture<'static, AwResult<serde_json::Value>> + Send + Sync,
>;

/// Kind of an app-defined invokable surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
	Method,
	Action,
	Tool,
	Resource,
	Prompt,
}

#[derive(Debug, Clone)]
pub struct SurfaceCtx {
	pub auth: AuthCtx,
	pub name: Box<str>,
	pub params: serde_json::Value,
}

pub type SurfaceHook =
	Arc<dyn Fn(App, SurfaceCtx) -> BoxFuture<'static, AwResult<serde_json::Value>> + Send + Sync>;

// Registry
//**********

#[derive(Default)]
pub struct HookRegistry {
	lifecycle: HashMap<LifecycleKind, Vec<LifecycleHook>>,
	property: Vec<PropertyHookEntry>,
	callback: HashMap<Box<str>, CallbackHook>,
	surfaces: HashMap<(SurfaceKind, Box<str>), SurfaceHook>,
}

impl std::fmt::Debug for HookRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HookRegistry")
			.field("lifecycle", &self.lifecycle.len())
			.field("property", &self.property.len())
			.field("callback", &self.callback.len())
			.field("surfaces", &self.surfaces.len())
			.finish()
	}
}

impl HookRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on_lifecycle(&mut self, kind: LifecycleKind, hook: LifecycleHook) {
		self.lifecycle.entry(kind).or_default().push(hook);
	}

	pub fn on_property(&mut self, pattern: &str, ops: &[PropertyOp], hook: PropertyHook) {
		self.property.push(PropertyHookEntry {
			pattern: pattern.into(),
			ops: ops.to_vec(),
			hook,
		});
	}

	pub fn on_callback(&mut self, name: &str, hook: CallbackHook) {
		self.callback.insert(name.into(), hook);
	}

	pub fn on_surface(&mut self, kind: SurfaceKind, name: &str, hook: SurfaceHook) {
		self.surfaces.insert((kind, name.into()), hook);
	}

	pub fn surface_names(&self, kind: SurfaceKind) -> Vec<&str> {
		let mut names: Vec<&str> = self
			.surfaces
			.keys()
			.filter(|(k, _)| *k == kind)
			.map(|(_, name)| name.as_ref())
			.collect();
		names.sort_unstable();
		names
	}

	pub fn get_callback(&self, name: &str) -> Option<&CallbackHook> {
		self.callback.get(name)
	}

	pub fn get_surface(&self, kind: SurfaceKind, name: &str) -> Option<&SurfaceHook> {
		self.surfaces.get(&(kind, Box::from(name)))
	}

	/// Fire all hooks for a lifecycle event. Hook failures are logged, never
	/// propagated.
	pub async fn dispatch_lifecycle(&self, app: &App, event: LifecycleEvent) {
		let Some(hooks) = self.lifecycle.get(&event.kind) else {
			return;
		};
		for hook in hooks {
			if let Err(err) = hook(app.clone(), event.clone()).await {
				warn!("lifecycle hook {:?} failed: {}", event.kind, err);
			}
		}
	}

	/// Run matching property hooks in registration order, threading the value
	/// through. A rejection short-circuits.
	pub async fn dispatch_property(
		&self,
		app: &App,
		mut ctx: PropertyHookCtx,
	) -> AwResult<HookOutcome> {
		for entry in &self.property {
			if !entry.ops.contains(&ctx.op) || !pattern_match(&entry.pattern, &ctx.name) {
				continue;
			}
			match (entry.hook)(app.clone(), ctx.clone()).await {
				Ok(HookOutcome::Continue(value)) => ctx.value = value,
				Ok(HookOutcome::Reject) => return Ok(HookOutcome::Reject),
				Err(err) => {
					warn!("property hook on {} failed: {}", ctx.name, err);
				}
			}
		}
		Ok(HookOutcome::Continue(ctx.value))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_surface_names_sorted() {
		let mut registry = HookRegistry::new();
		let hook: SurfaceHook =
			Arc::new(|_, _| Box::pin(async { Ok(serde_json::Value::Null) }));
		registry.on_surface(SurfaceKind::Method, "zeta", hook.clone());
		registry.on_surface(SurfaceKind::Method, "alpha", hook.clone());
		registry.on_surface(SurfaceKind::Action, "other", hook);

		assert_eq!(registry.surface_names(SurfaceKind::Method), vec!["alpha", "zeta"]);
		assert_eq!(registry.surface_names(SurfaceKind::Action), vec!["other"]);
	}

	#[test]
	fn test_property_hook_selector() {
		let mut registry = HookRegistry::new();
		let hook: PropertyHook =
			Arc::new(|_, ctx| Box::pin(async move { Ok(HookOutcome::Continue(ctx.value)) }));
		registry.on_property("memory_*", &[PropertyOp::Put], hook);
		assert_eq!(registry.property.len(), 1);
		assert!(pattern_match(&registry.property[0].pattern, "memory_travel"));
	}
}

// vim: ts=4
