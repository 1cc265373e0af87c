//! Upstream identity providers.
//!
//! The server never authenticates users itself: it proxies to Google or
//! GitHub and only accepts an email address those providers have verified.

use serde::Deserialize;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
	Google,
	Github,
}

#[derive(Debug, Clone)]
pub struct Provider {
	pub kind: ProviderKind,
	pub client_id: Box<str>,
	client_secret: Box<str>,
}

impl Provider {
	pub fn name(&self) -> &'static str {
		match self.kind {
			ProviderKind::Google => "google",
			ProviderKind::Github => "github",
		}
	}

	fn auth_url(&self) -> &'static str {
		match self.kind {
			ProviderKind::Google => "https://accounts.google.com/o/oauth2/v2/auth",
			ProviderKind::Github => "https://github.com/login/oauth/authorize",
		}
	}

	fn token_url(&self) -> &'static str {
		match self.kind {
			ProviderKind::Google => "https://oauth2.googleapis.com/token",
			ProviderKind::Github => "https://github.com/login/oauth/access_token",
		}
	}

	fn scope(&self) -> &'static str {
		match self.kind {
			ProviderKind::Google => "openid email",
			ProviderKind::Github => "user:email",
		}
	}
}

/// Resolve a configured provider by name.
pub fn resolve(app: &App, name: &str) -> AwResult<Provider> {
	let cfg = &app.config;
	match name {
		"google" => match (&cfg.google_client_id, &cfg.google_client_secret) {
			(Some(id), Some(secret)) => Ok(Provider {
				kind: ProviderKind::Google,
				client_id: id.clone(),
				client_secret: secret.clone(),
			}),
			_ => Err(Error::ConfigError("google identity provider not configured".into())),
		},
		"github" => match (&cfg.github_client_id, &cfg.github_client_secret) {
			(Some(id), Some(secret)) => Ok(Provider {
				kind: ProviderKind::Github,
				client_id: id.clone(),
				client_secret: secret.clone(),
			}),
			_ => Err(Error::ConfigError("github identity provider not configured".into())),
		},
		other => Err(Error::ValidationError(format!("unknown identity provider: {}", other))),
	}
}

/// Names of providers the instance has credentials for.
pub fn configured(app: &App) -> Vec<&'static str> {
	let mut names = Vec::new();
	if app.config.google_client_id.is_some() && app.config.google_client_secret.is_some() {
		names.push("google");
	}
	if app.config.github_client_id.is_some() && app.config.github_client_secret.is_some() {
		names.push("github");
	}
	names
}

/// URL the user's browser is redirected to for authentication.
pub fn authorize_redirect(
	provider: &Provider,
	callback_uri: &str,
	state_handle: &str,
	email_hint: Option<&str>,
) -> AwResult<String> {
	let mut params = vec![
		("client_id", provider.client_id.as_ref()),
		("redirect_uri", callback_uri),
		("response_type", "code"),
		("scope", provider.scope()),
		("state", state_handle),
	];
	if provider.kind == ProviderKind::Google {
		if let Some(hint) = email_hint {
			params.push(("login_hint", hint));
		}
	}
	let query = serde_urlencoded::to_string(&params)
		.map_err(|_| Error::ValidationError("query encoding failed".into()))?;
	Ok(format!("{}?{}", provider.auth_url(), query))
}

#[derive(Debug, Deserialize)]
struct UpstreamTokens {
	access_token: Box<str>,
}

/// Exchange the upstream authorization code for upstream tokens.
pub async fn exchange_code(
	app: &App,
	provider: &Provider,
	code: &str,
	callback_uri: &str,
) -> AwResult<Box<str>> {
	let params = [
		("client_id", provider.client_id.as_ref()),
		("client_secret", provider.client_secret.as_ref()),
		("code", code),
		("redirect_uri", callback_uri),
		("grant_type", "authorization_code"),
	];
	let tokens: UpstreamTokens = app.request.post_form(provider.token_url(), &params).await?;
	Ok(tokens.access_token)
}

#[derive(Debug, Deserialize)]
struct GoogleUserinfo {
	email: Option<Box<str>>,
	#[serde(default)]
	email_verified: bool,
	#[serde(default)]
	verified_email: bool,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
	email: Box<str>,
	primary: bool,
	verified: bool,
}

/// Extract a verified email for the authenticated user.
///
/// For GitHub: the primary+verified address, falling back to the first
/// verified one. No verified address at all is a hard failure that surfaces
/// as `invalid_grant` with a clear message.
pub async fn fetch_verified_email(
	app: &App,
	provider: &Provider,
	access_token: &str,
) -> AwResult<Box<str>> {
	let meta = actingweb_core::request::RequestMeta {
		bearer: Some(access_token),
		parent_request_id: None,
	};
	match provider.kind {
		ProviderKind::Google => {
			let info: GoogleUserinfo = app
				.request
				.get_json("https://openidconnect.googleapis.com/v1/userinfo", &meta)
				.await?;
			match info.email {
				Some(email) if info.email_verified || info.verified_email => Ok(email),
				Some(_) => {
					Err(Error::ValidationError("google account email is not verified".into()))
				}
				None => Err(Error::ValidationError("google account has no email".into())),
			}
		}
		ProviderKind::Github => {
			let emails: Vec<GithubEmail> =
				app.request.get_json("https://api.github.com/user/emails", &meta).await?;
			emails
				.iter()
				.find(|e| e.primary && e.verified)
				.or_else(|| emails.iter().find(|e| e.verified))
				.map(|e| e.email.clone())
				.ok_or_else(|| {
					Error::ValidationError(
						"github account has no verified email address; verify one and retry"
							.into(),
					)
				})
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn provider(kind: ProviderKind) -> Provider {
		Provider { kind, client_id: "cid".into(), client_secret: "cs".into() }
	}

	#[test]
	fn test_redirect_url_carries_state() {
		let url = authorize_redirect(
			&provider(ProviderKind::Google),
			"https://aw.example.com/oauth/callback",
			"aw_st_abc",
			Some("alice@example.com"),
		)
		.unwrap();
		assert!(url.starts_with("https://accounts.google.com/"));
		assert!(url.contains("state=aw_st_abc"));
		assert!(url.contains("login_hint=alice%40example.com"));
	}

	#[test]
	fn test_github_scope() {
		let url = authorize_redirect(
			&provider(ProviderKind::Github),
			"https://aw.example.com/oauth/callback",
			"s",
			None,
		)
		.unwrap();
		assert!(url.contains("scope=user%3Aemail"));
	}
}

// vim: ts=4
