//! Axum handlers for the OAuth2 server endpoints.

use axum::{
	Form, Json,
	extract::{Query, State},
	http::{HeaderMap, StatusCode, header},
	response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use crate::{bind_client_trust, client_peer_id, provider, registration, state, token};
use crate::prelude::*;
use actingweb_actor::{actor, property};
use actingweb_types::auth_adapter::{Accessor, AuthCodeRecord, AuthCtx};
use actingweb_types::store_adapter::EstablishedVia;
use actingweb_types::utils::{random_token, verify_passphrase};

// RFC 6749 error envelope
//*************************

#[derive(Debug)]
pub struct OAuthError {
	status: StatusCode,
	error: &'static str,
	description: String,
}

impl OAuthError {
	fn invalid_request(description: impl Into<String>) -> Self {
		Self { status: StatusCode::BAD_REQUEST, error: "invalid_request", description: description.into() }
	}

	fn invalid_client(description: impl Into<String>) -> Self {
		Self {
			status: StatusCode::UNAUTHORIZED,
			error: "invalid_client",
			description: description.into(),
		}
	}

	fn invalid_grant(description: impl Into<String>) -> Self {
		Self { status: StatusCode::BAD_REQUEST, error: "invalid_grant", description: description.into() }
	}

	fn unsupported_grant_type() -> Self {
		Self {
			status: StatusCode::BAD_REQUEST,
			error: "unsupported_grant_type",
			description: "supported: authorization_code, refresh_token, client_credentials".into(),
		}
	}
}

impl From<Error> for OAuthError {
	fn from(err: Error) -> Self {
		match err {
			Error::NotFound => OAuthError::invalid_grant("unknown or expired grant"),
			Error::Unauthorized | Error::InvalidToken => {
				OAuthError::invalid_grant("grant is invalid, expired, or revoked")
			}
			Error::ValidationError(msg) => OAuthError::invalid_request(msg),
			other => {
				error!("oauth internal error: {}", other);
				OAuthError {
					status: StatusCode::INTERNAL_SERVER_ERROR,
					error: "server_error",
					description: "internal error".into(),
				}
			}
		}
	}
}

impl IntoResponse for OAuthError {
	fn into_response(self) -> Response {
		let body = serde_json::json!({
			"error": self.error,
			"error_description": self.description,
		});
		if self.status == StatusCode::UNAUTHORIZED {
			(
				self.status,
				[(header::WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
				Json(body),
			)
				.into_response()
		} else {
			(self.status, Json(body)).into_response()
		}
	}
}

// Registration
//**************

// POST /oauth/register
pub async fn post_register(
	State(app): State<App>,
	Json(body): Json<registration::RegisterRequest>,
) -> AwResult<impl IntoResponse> {
	let response = registration::register_client(&app, body).await?;
	Ok((StatusCode::CREATED, Json(response)))
}

// Authorize
//***********

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
	pub response_type: Option<String>,
	pub client_id: String,
	pub redirect_uri: String,
	pub state: Option<String>,
	pub scope: Option<String>,
	pub code_challenge: Option<String>,
	pub code_challenge_method: Option<String>,
	pub trust_type: Option<String>,
	pub provider: Option<String>,
	pub email: Option<String>,
}

fn wants_json(headers: &HeaderMap) -> bool {
	headers
		.get(header::ACCEPT)
		.and_then(|v| v.to_str().ok())
		.is_some_and(|v| v.contains("application/json"))
}

// GET /oauth/authorize — provider/email selection form
pub async fn get_authorize(
	State(app): State<App>,
	headers: HeaderMap,
	Query(query): Query<AuthorizeQuery>,
) -> Result<Response, OAuthError> {
	if query.response_type.as_deref() != Some("code") {
		return Err(OAuthError::invalid_request("response_type must be code"));
	}
	let client = app
		.auth_store
		.read_client(&query.client_id)
		.await
		.map_err(|_| OAuthError::invalid_client("unknown client_id"))?;
	registration::validate_redirect_uri(&client, &query.redirect_uri)
		.map_err(OAuthError::from)?;
	if let Some(method) = &query.code_challenge_method {
		if method != "S256" {
			return Err(OAuthError::invalid_request("only S256 code challenges are supported"));
		}
	}

	let providers = provider::configured(&app);
	if wants_json(&headers) {
		let body = serde_json::json!({
			"client_name": client.client_name,
			"providers": providers,
			"submit_to": format!("{}/oauth/authorize", app.config.base_uri),
		});
		return Ok(Json(body).into_response());
	}

	// Minimal HTML form; rendering beyond this is the embedding app's job.
	let mut options = String::new();
	for p in &providers {
		options.push_str(&format!("<option value=\"{}\">{}</option>", p, p));
	}
	let hidden = |name: &str, value: &str| {
		format!("<input type=\"hidden\" name=\"{}\" value=\"{}\"/>", name, value)
	};
	let mut fields = String::new();
	fields.push_str(&hidden("response_type", "code"));
	fields.push_str(&hidden("client_id", &query.client_id));
	fields.push_str(&hidden("redirect_uri", &query.redirect_uri));
	for (name, value) in [
		("state", &query.state),
		("scope", &query.scope),
		("code_challenge", &query.code_challenge),
		("code_challenge_method", &query.code_challenge_method),
		("trust_type", &query.trust_type),
	] {
		if let Some(value) = value {
			fields.push_str(&hidden(name, value));
		}
	}
	let html = format!(
		"<html><body><h1>Sign in to {}</h1>\
		<form method=\"post\" action=\"{}/oauth/authorize\">{}\
		<label>Email <input type=\"email\" name=\"email\" value=\"{}\"/></label>\
		<label>Provider <select name=\"provider\">{}</select></label>\
		<button type=\"submit\">Continue</button></form></body></html>",
		client.client_name,
		app.config.base_uri,
		fields,
		query.email.as_deref().unwrap_or(""),
		options
	);
	Ok(Html(html).into_response())
}

// POST /oauth/authorize — stash state, redirect to the chosen IdP
pub async fn post_authorize(
	State(app): State<App>,
	Form(form): Form<AuthorizeQuery>,
) -> Result<Response, OAuthError> {
	let client = app
		.auth_store
		.read_client(&form.client_id)
		.await
		.map_err(|_| OAuthError::invalid_client("unknown client_id"))?;
	registration::validate_redirect_uri(&client, &form.redirect_uri)
		.map_err(OAuthError::from)?;

	let provider_name = form.provider.as_deref().unwrap_or("google");
	let idp = provider::resolve(&app, provider_name).map_err(OAuthError::from)?;

	let authorize_state = state::AuthorizeState {
		client_id: form.client_id.clone().into(),
		mcp_state: form.state.map(Into::into),
		redirect_uri: form.redirect_uri.clone().into(),
		email_hint: form.email.clone().map(Into::into),
		provider: provider_name.into(),
		trust_type: form.trust_type.map(Into::into),
		scope: form.scope.map(Into::into),
		code_challenge: form.code_challenge.map(Into::into),
	};
	let handle = state::stash(&app, &authorize_state).await.map_err(OAuthError::from)?;

	let callback_uri = format!("{}/oauth/callback", app.config.base_uri);
	let redirect =
		provider::authorize_redirect(&idp, &callback_uri, &handle, form.email.as_deref())
			.map_err(OAuthError::from)?;
	Ok(Redirect::to(&redirect).into_response())
}

// Callback
//**********

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
	pub code: Option<String>,
	pub state: Option<String>,
	pub error: Option<String>,
}

// GET /oauth/callback — back from the upstream IdP
pub async fn get_callback(
	State(app): State<App>,
	Query(query): Query<CallbackQuery>,
) -> Result<Response, OAuthError> {
	if let Some(error) = query.error {
		return Err(OAuthError::invalid_grant(format!("identity provider error: {}", error)));
	}
	let (code, handle) = match (query.code, query.state) {
		(Some(code), Some(state)) => (code, state),
		_ => return Err(OAuthError::invalid_request("missing code or state")),
	};
	let stashed = state::take(&app, &handle)
		.await
		.map_err(|_| OAuthError::invalid_grant("unknown or expired state"))?;
	let client = app
		.auth_store
		.read_client(&stashed.client_id)
		.await
		.map_err(|_| OAuthError::invalid_client("client registration disappeared"))?;

	let idp = provider::resolve(&app, &stashed.provider).map_err(OAuthError::from)?;
	let callback_uri = format!("{}/oauth/callback", app.config.base_uri);
	let upstream_token = provider::exchange_code(&app, &idp, &code, &callback_uri)
		.await
		.map_err(OAuthError::from)?;
	let email = provider::fetch_verified_email(&app, &idp, &upstream_token)
		.await
		.map_err(|err| match err {
			Error::ValidationError(msg) => OAuthError::invalid_grant(msg),
			other => OAuthError::from(other),
		})?;
	let email = email.to_lowercase();

	// Bind to the existing actor for this email, or create one.
	let record = match actor::get_from_property(&app, "email", &email).await {
		Ok(record) => record,
		Err(Error::NotFound) => {
			let created = actor::create_actor(
				&app,
				actor::CreateActorOptions {
					actor_id: None,
					creator: &email,
					passphrase: None,
				},
			)
			.await
			.map_err(OAuthError::from)?;
			let owner = AuthCtx {
				actor_id: created.record.actor_id.clone(),
				accessor: Accessor::Owner { creator: created.record.creator.clone() },
			};
			property::set_property(&app, &owner, "email", serde_json::json!(email))
				.await
				.map_err(OAuthError::from)?;
			created.record
		}
		Err(err) => return Err(OAuthError::from(err)),
	};

	// MCP flows get a trust of the requested type bound to the client.
	let mut client_for_trust = client.clone();
	if let Some(trust_type) = &stashed.trust_type {
		client_for_trust.trust_type = trust_type.clone();
	}
	bind_client_trust(
		&app,
		&record.actor_id,
		&client_for_trust,
		&email,
		EstablishedVia::Oauth2Interactive,
	)
	.await
	.map_err(OAuthError::from)?;

	let auth_code = AuthCodeRecord {
		code: random_token("aw_ac_"),
		client_id: client.client_id.clone(),
		actor_id: record.actor_id.clone(),
		peer_id: client_peer_id(&client.client_id).into(),
		redirect_uri: stashed.redirect_uri.clone(),
		code_challenge: stashed.code_challenge.clone(),
		scope: stashed.scope.clone(),
		expires_at: Timestamp::from_now(actingweb_types::auth_adapter::AUTH_CODE_EXPIRY),
	};
	app.auth_store.create_auth_code(&auth_code).await.map_err(OAuthError::from)?;

	let mut params = vec![("code", auth_code.code.as_ref())];
	if let Some(mcp_state) = &stashed.mcp_state {
		params.push(("state", mcp_state.as_ref()));
	}
	let query = serde_urlencoded::to_string(&params)
		.map_err(|_| OAuthError::invalid_request("redirect encoding failed"))?;
	let sep = if stashed.redirect_uri.contains('?') { '&' } else { '?' };
	Ok(Redirect::to(&format!("{}{}{}", stashed.redirect_uri, sep, query)).into_response())
}

// Token endpoint
//****************

#[derive(Debug, Deserialize)]
pub struct TokenForm {
	pub grant_type: String,
	pub code: Option<String>,
	pub redirect_uri: Option<String>,
	pub client_id: Option<String>,
	pub client_secret: Option<String>,
	pub code_verifier: Option<String>,
	pub refresh_token: Option<String>,
	pub scope: Option<String>,
	// devtest passphrase grant
	pub username: Option<String>,
	pub password: Option<String>,
}

async fn authenticate_client(
	app: &App,
	form: &TokenForm,
	require_secret: bool,
) -> Result<actingweb_types::auth_adapter::ClientRecord, OAuthError> {
	let client_id =
		form.client_id.as_deref().ok_or_else(|| OAuthError::invalid_request("missing client_id"))?;
	let client = app
		.auth_store
		.read_client(client_id)
		.await
		.map_err(|_| OAuthError::invalid_client("unknown client_id"))?;
	match form.client_secret.as_deref() {
		Some(secret) if secret == client.client_secret.as_ref() => Ok(client),
		Some(_) => Err(OAuthError::invalid_client("bad client_secret")),
		// Public clients may rely on PKCE for the code grant.
		None if !require_secret && form.code_verifier.is_some() => Ok(client),
		None => Err(OAuthError::invalid_client("missing client_secret")),
	}
}

// POST /oauth/token
pub async fn post_token(
	State(app): State<App>,
	Form(form): Form<TokenForm>,
) -> Result<Response, OAuthError> {
	match form.grant_type.as_str() {
		"authorization_code" => {
			let client = authenticate_client(&app, &form, false).await?;
			let code = form
				.code
				.as_deref()
				.ok_or_else(|| OAuthError::invalid_request("missing code"))?;
			let redirect_uri = form
				.redirect_uri
				.as_deref()
				.ok_or_else(|| OAuthError::invalid_request("missing redirect_uri"))?;
			let tokens = token::redeem_auth_code(
				&app,
				code,
				&client.client_id,
				redirect_uri,
				form.code_verifier.as_deref(),
			)
			.await?;
			Ok(Json(tokens).into_response())
		}
		"refresh_token" => {
			let client = authenticate_client(&app, &form, true).await?;
			let refresh = form
				.refresh_token
				.as_deref()
				.ok_or_else(|| OAuthError::invalid_request("missing refresh_token"))?;
			let tokens = token::rotate_refresh(&app, refresh, &client.client_id).await?;
			Ok(Json(tokens).into_response())
		}
		"client_credentials" => {
			let client = authenticate_client(&app, &form, true).await?;
			let trust = app
				.store
				.read_trust_by_client_id(&client.client_id)
				.await
				.map_err(|_| OAuthError::invalid_grant("client has no bound actor"))?;
			let tokens = token::issue_pair(
				&app,
				&client.client_id,
				&trust.actor_id,
				&trust.peer_id,
				form.scope.as_deref(),
			)
			.await?;
			Ok(Json(tokens).into_response())
		}
		"password" => {
			if !app.config.devtest {
				return Err(OAuthError::unsupported_grant_type());
			}
			let client = authenticate_client(&app, &form, true).await?;
			let (actor_id, passphrase) = match (&form.username, &form.password) {
				(Some(u), Some(p)) => (u, p),
				_ => return Err(OAuthError::invalid_request("missing username or password")),
			};
			let record = app
				.store
				.read_actor(actor_id)
				.await
				.map_err(|_| OAuthError::invalid_grant("unknown actor"))?;
			if !verify_passphrase(passphrase, &record.passphrase_hash) {
				return Err(OAuthError::invalid_grant("bad passphrase"));
			}
			let trust = bind_client_trust(
				&app,
				&record.actor_id,
				&client,
				&record.creator,
				EstablishedVia::Oauth2Client,
			)
			.await?;
			let tokens = token::issue_pair(
				&app,
				&client.client_id,
				&record.actor_id,
				&trust.peer_id,
				form.scope.as_deref(),
			)
			.await?;
			Ok(Json(tokens).into_response())
		}
		_ => Err(OAuthError::unsupported_grant_type()),
	}
}

// Revocation & logout
//*********************

#[derive(Debug, Deserialize)]
pub struct RevokeForm {
	pub token: String,
}

// POST /oauth/revoke — RFC 7009: always 200
pub async fn post_revoke(
	State(app): State<App>,
	Form(form): Form<RevokeForm>,
) -> Result<Response, OAuthError> {
	token::revoke(&app, &form.token).await?;
	Ok(Json(serde_json::json!({})).into_response())
}

// POST /oauth/logout
pub async fn post_logout(
	State(app): State<App>,
	Form(form): Form<RevokeForm>,
) -> Result<Response, OAuthError> {
	// A refresh token logs out its whole family.
	if let Ok(record) = app.auth_store.read_refresh_token(&form.token).await {
		let _unused =
			app.auth_store.revoke_token_family(&record.client_id, &record.actor_id).await;
	}
	token::revoke(&app, &form.token).await?;
	Ok(StatusCode::NO_CONTENT.into_response())
}

// Discovery
//***********

// GET /.well-known/oauth-authorization-server — RFC 8414
pub async fn get_discovery(State(app): State<App>) -> impl IntoResponse {
	let base = &app.config.base_uri;
	Json(serde_json::json!({
		"issuer": base,
		"authorization_endpoint": format!("{}/oauth/authorize", base),
		"token_endpoint": format!("{}/oauth/token", base),
		"registration_endpoint": format!("{}/oauth/register", base),
		"revocation_endpoint": format!("{}/oauth/revoke", base),
		"response_types_supported": ["code"],
		"grant_types_supported": ["authorization_code", "refresh_token", "client_credentials"],
		"code_challenge_methods_supported": ["S256"],
		"token_endpoint_auth_methods_supported": ["client_secret_post", "none"],
	}))
}

// vim: ts=4
