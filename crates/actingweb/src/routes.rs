//! API routes

use axum::{
	Json, Router,
	extract::State,
	http::{HeaderMap, header},
	middleware,
	response::IntoResponse,
	routing::{delete, get, post},
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::devtest;
use crate::prelude::*;
use crate::surface;
use actingweb_actor::handler as actor;
use actingweb_core::auth::{request_id_middleware, require_auth};
use actingweb_core::hooks::CallbackHookCtx;
use actingweb_oauth::handler as oauth;
use actingweb_subscription::handler as subscription;
use actingweb_trust::handler as trust;

// POST /bot — app-level callback, authenticated by the configured bot token
async fn post_bot(
	State(app): State<App>,
	headers: HeaderMap,
	Json(payload): Json<serde_json::Value>,
) -> AwResult<impl IntoResponse> {
	let expected = app.config.bot_token.as_deref().ok_or(Error::NotFound)?;
	let presented = headers
		.get(header::AUTHORIZATION)
		.and_then(|h| h.to_str().ok())
		.and_then(|h| h.strip_prefix("Bearer "))
		.ok_or(Error::Unauthorized)?;
	if presented.trim() != expected {
		return Err(Error::Unauthorized);
	}

	let hook = app.hooks.get_callback("bot").ok_or(Error::NotFound)?;
	let result =
		hook(app.clone(), CallbackHookCtx { auth: None, name: "bot".into(), payload }).await?;
	Ok(Json(result))
}

// ============================================================================
// PUBLIC ROUTES - factory, OAuth2 server, discovery, inbound trust handshake
// ============================================================================
fn init_public_routes() -> Router<App> {
	Router::new()
		.route("/", post(actor::post_factory).get(actor::get_factory))
		.route("/bot", post(post_bot))
		// --- OAuth2 authorization server ---
		.route("/oauth/register", post(oauth::post_register))
		.route("/oauth/authorize", get(oauth::get_authorize).post(oauth::post_authorize))
		.route("/oauth/callback", get(oauth::get_callback))
		.route("/oauth/token", post(oauth::post_token))
		.route("/oauth/revoke", post(oauth::post_revoke))
		.route("/oauth/logout", post(oauth::post_logout))
		.route("/.well-known/oauth-authorization-server", get(oauth::get_discovery))
		// --- Actor discovery ---
		.route("/{actor_id}/meta", get(actor::get_meta))
		.route("/{actor_id}/meta/{*path}", get(actor::get_meta_path))
		// --- Inbound trust handshake (initiator has no credential yet) ---
		.route("/{actor_id}/trust/{relationship}", post(trust::post_trust_relationship))
}

// ============================================================================
// PROTECTED ROUTES - all routes require a resolved credential
// ============================================================================
fn init_protected_routes(app: App) -> Router<App> {
	Router::new()
		// --- Actor root ---
		.route("/{actor_id}", get(actor::get_actor).delete(actor::delete_actor))
		// --- Properties ---
		.route(
			"/{actor_id}/properties",
			get(actor::get_properties)
				.post(actor::post_properties)
				.delete(actor::delete_properties),
		)
		.route(
			"/{actor_id}/properties/{name}",
			get(actor::get_property).put(actor::put_property).delete(actor::delete_property),
		)
		.route(
			"/{actor_id}/properties/{name}/items",
			post(actor::post_list_items)
				.put(actor::put_list_item)
				.delete(actor::delete_list_items),
		)
		.route(
			"/{actor_id}/properties/{name}/metadata",
			get(actor::get_list_metadata).put(actor::put_list_metadata),
		)
		.route(
			"/{actor_id}/properties/{name}/{*path}",
			get(actor::get_property_path)
				.put(actor::put_property_path)
				.delete(actor::delete_property_path),
		)
		// --- Trust lifecycle ---
		.route("/{actor_id}/trust", get(trust::get_trusts).post(trust::post_trust))
		.route(
			"/{actor_id}/trust/{relationship}/{peerid}",
			get(trust::get_trust).put(trust::put_trust).delete(trust::delete_trust),
		)
		.route(
			"/{actor_id}/trust/{relationship}/{peerid}/permissions",
			get(trust::get_trust_permissions)
				.put(trust::put_trust_permissions)
				.delete(trust::delete_trust_permissions),
		)
		.route(
			"/{actor_id}/trust/{relationship}/{peerid}/shared_properties",
			get(trust::get_shared_properties),
		)
		.route("/{actor_id}/permissions/{peerid}", get(trust::get_effective_permissions))
		// --- Subscriptions ---
		.route(
			"/{actor_id}/subscriptions",
			get(subscription::get_subscriptions).post(subscription::post_subscription),
		)
		.route(
			"/{actor_id}/subscriptions/{peerid}",
			get(subscription::get_peer_subscriptions)
				.post(subscription::post_peer_subscription),
		)
		.route(
			"/{actor_id}/subscriptions/{peerid}/{subid}",
			get(subscription::get_subscription).delete(subscription::delete_subscription),
		)
		.route("/{actor_id}/subscriptions/{peerid}/{subid}/{seqnr}", get(subscription::get_diff))
		// --- Callbacks ---
		.route(
			"/{actor_id}/callbacks/subscriptions/{peerid}/{subid}",
			post(subscription::post_subscription_callback)
				.delete(subscription::delete_subscription_callback),
		)
		.route("/{actor_id}/callbacks/{name}", post(subscription::post_callback))
		// --- App-defined surfaces ---
		.route("/{actor_id}/methods", get(surface::get_methods))
		.route("/{actor_id}/methods/{name}", post(surface::post_method))
		.route("/{actor_id}/actions", get(surface::get_actions))
		.route("/{actor_id}/actions/{name}", post(surface::post_action))
		.route("/{actor_id}/resources", get(surface::get_resources))
		.route(
			"/{actor_id}/resources/{name}",
			get(surface::get_resource).post(surface::post_resource),
		)
		.route_layer(middleware::from_fn_with_state(app, require_auth))
}

fn init_devtest_routes() -> Router<App> {
	Router::new()
		.route("/devtest/ping", get(devtest::get_ping))
		.route("/devtest/actors", get(devtest::get_actors))
		.route("/devtest/wipe/{actor_id}", delete(devtest::delete_wipe))
}

pub fn init(app: App) -> Router {
	let mut router = init_public_routes().merge(init_protected_routes(app.clone()));

	if app.config.devtest {
		warn!("/devtest routes are enabled - do not run this in production");
		router = router.merge(init_devtest_routes());
	}

	router
		.layer(middleware::from_fn(request_id_middleware))
		.layer(CompressionLayer::new())
		.layer(TraceLayer::new_for_http())
		.with_state(app)
}

// vim: ts=4
