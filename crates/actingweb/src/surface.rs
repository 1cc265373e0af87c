//! App-defined surfaces: `/methods`, `/actions`, and `/resources`.
//!
//! These dispatch to hooks registered by the application and are filtered by
//! the accessor's permissions: listing shows only names the accessor can
//! read, invocation requires write on the name.

use axum::{
	Json,
	extract::{Path, State},
	response::IntoResponse,
};

use crate::prelude::*;
use actingweb_core::extract::Auth;
use actingweb_core::hooks::{SurfaceCtx, SurfaceKind};
use actingweb_core::perm::{self, Decision, PermCache};
use actingweb_types::permissions::{Category, Operation};

fn category_of(kind: SurfaceKind) -> Category {
	match kind {
		SurfaceKind::Method => Category::Methods,
		SurfaceKind::Action => Category::Actions,
		SurfaceKind::Tool => Category::Tools,
		SurfaceKind::Resource => Category::Resources,
		SurfaceKind::Prompt => Category::Prompts,
	}
}

async fn list_surface(app: &App, auth: &Auth, kind: SurfaceKind) -> AwResult<Vec<Box<str>>> {
	let mut cache = PermCache::new();
	let mut visible = Vec::new();
	for name in app.hooks.surface_names(kind) {
		let decision = perm::evaluate(
			app,
			&auth.0,
			&mut cache,
			category_of(kind),
			name,
			Operation::Read,
		)
		.await?;
		if decision == Decision::Allowed {
			visible.push(name.into());
		}
	}
	Ok(visible)
}

async fn invoke_surface(
	app: &App,
	auth: Auth,
	kind: SurfaceKind,
	name: &str,
	params: serde_json::Value,
) -> AwResult<serde_json::Value> {
	perm::require(app, &auth.0, category_of(kind), name, Operation::Write).await?;
	let hook = app.hooks.get_surface(kind, name).ok_or(Error::NotFound)?;
	hook(app.clone(), SurfaceCtx { auth: auth.0, name: name.into(), params }).await
}

macro_rules! surface_handlers {
	($list:ident, $invoke:ident, $kind:expr) => {
		pub async fn $list(
			State(app): State<App>,
			auth: Auth,
			Path(_actor_id): Path<String>,
		) -> AwResult<impl IntoResponse> {
			Ok(Json(list_surface(&app, &auth, $kind).await?))
		}

		pub async fn $invoke(
			State(app): State<App>,
			auth: Auth,
			Path((_actor_id, name)): Path<(String, String)>,
			Json(params): Json<serde_json::Value>,
		) -> AwResult<impl IntoResponse> {
			Ok(Json(invoke_surface(&app, auth, $kind, &name, params).await?))
		}
	};
}

surface_handlers!(get_methods, post_method, SurfaceKind::Method);
surface_handlers!(get_actions, post_action, SurfaceKind::Action);
surface_handlers!(get_resources, post_resource, SurfaceKind::Resource);

/// GET on a single resource reads rather than invokes.
pub async fn get_resource(
	State(app): State<App>,
	auth: Auth,
	Path((_actor_id, name)): Path<(String, String)>,
) -> AwResult<impl IntoResponse> {
	perm::require(&app, &auth.0, Category::Resources, &name, Operation::Read).await?;
	let hook = app.hooks.get_surface(SurfaceKind::Resource, &name).ok_or(Error::NotFound)?;
	let result = hook(
		app.clone(),
		SurfaceCtx { auth: auth.0, name: name.as_str().into(), params: serde_json::Value::Null },
	)
	.await?;
	Ok(Json(result))
}

// vim: ts=4
