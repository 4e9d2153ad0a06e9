//! Cached credential records and the queries used to find them.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Kind of credential held in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CredentialKind {
	/// Bearer token presented to resource APIs.
	AccessToken,
	/// Long-lived token used to mint new access tokens.
	RefreshToken,
	/// OpenID Connect identity token.
	IdToken,
}
impl CredentialKind {
	/// Returns the lowercase label used inside credential keys.
	pub const fn as_str(self) -> &'static str {
		match self {
			CredentialKind::AccessToken => "accesstoken",
			CredentialKind::RefreshToken => "refreshtoken",
			CredentialKind::IdToken => "idtoken",
		}
	}
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no secret was provided.
	#[error("Credential secret is required.")]
	MissingSecret,
	/// Issued when the client identifier is empty.
	#[error("Credential client identifier cannot be empty.")]
	MissingClientId,
}

/// A single cached credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
	/// Credential kind.
	pub kind: CredentialKind,
	/// Account the credential belongs to; `None` for app-only tokens.
	pub home_account_id: Option<String>,
	/// Client the credential was issued to.
	pub client_id: String,
	/// Tenant (realm) that issued the credential.
	pub realm: Option<String>,
	/// Space-delimited scopes the credential grants.
	pub target: Option<String>,
	/// Secret material; never logged.
	pub secret: TokenSecret,
	/// Instant the credential entered the cache.
	#[serde(with = "time::serde::timestamp")]
	pub cached_at: OffsetDateTime,
	/// Expiry instant, when the credential has one.
	#[serde(with = "time::serde::timestamp::option")]
	pub expires_at: Option<OffsetDateTime>,
}
impl Credential {
	/// Returns a builder for the provided kind and client.
	pub fn builder(kind: CredentialKind, client_id: impl Into<String>) -> CredentialBuilder {
		CredentialBuilder::new(kind, client_id.into())
	}

	/// Stable lookup key: lowercase `account-kind-client-realm-target`.
	pub fn cache_key(&self) -> String {
		[
			self.home_account_id.as_deref().unwrap_or(""),
			self.kind.as_str(),
			&self.client_id,
			self.realm.as_deref().unwrap_or(""),
			self.target.as_deref().unwrap_or(""),
		]
		.join("-")
		.to_lowercase()
	}

	/// Returns true if the credential has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expiry| instant >= expiry)
	}

	/// Returns true if every requested scope is granted by this credential.
	pub fn covers(&self, scopes: &[String]) -> bool {
		let granted: Vec<&str> = self.target.as_deref().unwrap_or("").split_whitespace().collect();

		scopes.iter().all(|scope| granted.iter().any(|g| g.eq_ignore_ascii_case(scope)))
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	kind: CredentialKind,
	client_id: String,
	home_account_id: Option<String>,
	realm: Option<String>,
	target: Option<String>,
	secret: Option<TokenSecret>,
	cached_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl CredentialBuilder {
	fn new(kind: CredentialKind, client_id: String) -> Self {
		Self {
			kind,
			client_id,
			home_account_id: None,
			realm: None,
			target: None,
			secret: None,
			cached_at: None,
			expires_at: None,
			expires_in: None,
		}
	}

	/// Binds the credential to an account.
	pub fn home_account_id(mut self, id: impl Into<String>) -> Self {
		self.home_account_id = Some(id.into());

		self
	}

	/// Sets the issuing tenant.
	pub fn realm(mut self, realm: impl Into<String>) -> Self {
		self.realm = Some(realm.into());

		self
	}

	/// Sets the granted scopes (space-delimited).
	pub fn target(mut self, target: impl Into<String>) -> Self {
		self.target = Some(target.into());

		self
	}

	/// Provides the secret value.
	pub fn secret(mut self, secret: impl Into<String>) -> Self {
		self.secret = Some(TokenSecret::new(secret));

		self
	}

	/// Sets the instant the credential was cached.
	pub fn cached_at(mut self, instant: OffsetDateTime) -> Self {
		self.cached_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets an expiry relative to the cached instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		if self.client_id.is_empty() {
			return Err(CredentialBuilderError::MissingClientId);
		}

		let secret =
			self.secret.filter(|s| !s.is_empty()).ok_or(CredentialBuilderError::MissingSecret)?;
		// Timestamps are persisted with whole-second precision.
		let cached_at = self
			.cached_at
			.unwrap_or_else(OffsetDateTime::now_utc)
			.replace_nanosecond(0)
			.unwrap_or(OffsetDateTime::UNIX_EPOCH);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(cached_at + delta),
			(None, None) => None,
		};

		Ok(Credential {
			kind: self.kind,
			home_account_id: self.home_account_id,
			client_id: self.client_id,
			realm: self.realm,
			target: self.target,
			secret,
			cached_at,
			expires_at: expires_at.map(|e| e.replace_nanosecond(0).unwrap_or(e)),
		})
	}
}

/// Filter used to look up a credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialQuery {
	/// Credential kind to match.
	pub kind: CredentialKind,
	/// Account to match; `None` matches app-only credentials.
	pub home_account_id: Option<String>,
	/// Scopes the credential must cover.
	pub scopes: Vec<String>,
	/// Instant used for expiry checks.
	pub now: OffsetDateTime,
}
impl CredentialQuery {
	/// Query for a credential of `kind` owned by `home_account_id`.
	pub fn new(kind: CredentialKind, home_account_id: Option<&str>) -> Self {
		Self {
			kind,
			home_account_id: home_account_id.map(str::to_owned),
			scopes: Vec::new(),
			now: OffsetDateTime::now_utc(),
		}
	}

	/// Requires the credential to cover the provided scopes.
	pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the instant used for expiry checks.
	pub fn at(mut self, now: OffsetDateTime) -> Self {
		self.now = now;

		self
	}

	/// Returns true if the credential satisfies the query.
	pub fn matches(&self, credential: &Credential) -> bool {
		credential.kind == self.kind
			&& credential.home_account_id == self.home_account_id
			&& !credential.is_expired_at(self.now)
			&& credential.covers(&self.scopes)
	}
}
