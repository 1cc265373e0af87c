//! Dynamic client registration (RFC 7591).

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::prelude::*;
use actingweb_types::auth_adapter::ClientRecord;
use actingweb_types::utils::random_token;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
	pub client_name: Box<str>,
	#[serde(default)]
	pub redirect_uris: Vec<Box<str>>,
	pub client_version: Option<Box<str>>,
	pub client_platform: Option<Box<str>>,
	/// Trust type granted after the authorization flow; defaults to
	/// `mcp_client`.
	pub trust_type: Option<Box<str>>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
	pub client_id: Box<str>,
	pub client_secret: Box<str>,
	pub client_name: Box<str>,
	pub redirect_uris: Vec<Box<str>>,
	pub client_id_issued_at: i64,
	pub token_endpoint_auth_method: &'static str,
	pub grant_types: Vec<&'static str>,
	pub response_types: Vec<&'static str>,
}

pub async fn register_client(app: &App, req: RegisterRequest) -> AwResult<RegisterResponse> {
	if req.client_name.is_empty() {
		return Err(Error::ValidationError("client_name is required".into()));
	}
	for uri in &req.redirect_uris {
		if !uri.starts_with("https://") && !uri.starts_with("http://localhost") && !uri.starts_with("http://127.0.0.1") {
			return Err(Error::ValidationError(format!("insecure redirect uri: {}", uri)));
		}
	}
	let trust_type = req.trust_type.unwrap_or_else(|| "mcp_client".into());
	{
		let registry = app.trust_types.read().await;
		if registry.get(&trust_type).is_none() {
			return Err(Error::ValidationError(format!("unknown trust type: {}", trust_type)));
		}
	}

	let record = ClientRecord {
		client_id: random_token("aw_ci_"),
		client_secret: random_token("aw_cs_"),
		client_name: req.client_name,
		client_version: req.client_version,
		client_platform: req.client_platform,
		redirect_uris: req.redirect_uris,
		trust_type,
		created_at: Timestamp::now(),
	};
	app.auth_store.create_client(&record).await?;
	info!("registered OAuth2 client {} ({})", record.client_id, record.client_name);

	Ok(RegisterResponse {
		client_id: record.client_id,
		client_secret: record.client_secret,
		client_name: record.client_name,
		redirect_uris: record.redirect_uris,
		client_id_issued_at: Timestamp::now().0,
		token_endpoint_auth_method: "client_secret_post",
		grant_types: vec!["authorization_code", "refresh_token", "client_credentials"],
		response_types: vec!["code"],
	})
}

/// Validate a redirect uri against the registration. Clients registered
/// without redirect uris must supply one per request and get it echoed back.
pub fn validate_redirect_uri(client: &ClientRecord, redirect_uri: &str) -> AwResult<()> {
	if client.redirect_uris.is_empty() {
		return Ok(());
	}
	if client.redirect_uris.iter().any(|u| u.as_ref() == redirect_uri) {
		Ok(())
	} else {
		Err(Error::ValidationError("redirect_uri not registered".into()))
	}
}

// vim: ts=4
