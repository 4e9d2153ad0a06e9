//! Serialized form of a token cache.

// self
use crate::{
	_prelude::*,
	cache::{Credential, CredentialKind, CredentialQuery},
	error::CacheCorruptionError,
	store::CacheBlob,
};

type Section = BTreeMap<String, Credential>;

const SECTIONS: [(CredentialKind, &str); 3] = [
	(CredentialKind::AccessToken, "AccessToken"),
	(CredentialKind::RefreshToken, "RefreshToken"),
	(CredentialKind::IdToken, "IdToken"),
];

/// Credentials held by one token cache, grouped by kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
	#[serde(rename = "AccessToken", default)]
	access_tokens: Section,
	#[serde(rename = "RefreshToken", default)]
	refresh_tokens: Section,
	#[serde(rename = "IdToken", default)]
	id_tokens: Section,
}
impl CacheState {
	/// Decodes a serialized cache, naming the failing JSON path on error.
	///
	/// Every credential must sit in the section of its kind, under its own
	/// [`Credential::cache_key`].
	pub fn from_blob(blob: &CacheBlob) -> Result<Self, CacheCorruptionError> {
		let mut de = serde_json::Deserializer::from_slice(blob.as_bytes());
		let state: Self =
			serde_path_to_error::deserialize(&mut de).map_err(CacheCorruptionError::from_json)?;

		de.end().map_err(|e| CacheCorruptionError { message: e.to_string() })?;
		state.check_placement()?;

		Ok(state)
	}

	/// Encodes the cache.
	pub fn to_blob(&self) -> Result<CacheBlob, serde_json::Error> {
		serde_json::to_vec(self).map(CacheBlob::new)
	}

	/// Total number of credentials.
	pub fn len(&self) -> usize {
		self.access_tokens.len() + self.refresh_tokens.len() + self.id_tokens.len()
	}

	/// Returns true when no credentials are cached.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Inserts or replaces a credential, returning true if the state changed.
	pub fn upsert(&mut self, credential: Credential) -> bool {
		let section = self.section_mut(credential.kind);
		let key = credential.cache_key();

		match section.get(&key) {
			Some(existing) if existing == &credential => false,
			_ => {
				section.insert(key, credential);

				true
			},
		}
	}

	/// Finds the first credential matching the query.
	pub fn find(&self, query: &CredentialQuery) -> Option<&Credential> {
		self.section(query.kind).values().find(|credential| query.matches(credential))
	}

	/// Removes every credential of an account, returning how many were removed.
	pub fn remove_account(&mut self, home_account_id: &str) -> usize {
		[&mut self.access_tokens, &mut self.refresh_tokens, &mut self.id_tokens]
			.into_iter()
			.map(|section| {
				let before = section.len();

				section.retain(|_, c| c.home_account_id.as_deref() != Some(home_account_id));

				before - section.len()
			})
			.sum()
	}

	/// Iterates over every credential.
	pub fn credentials(&self) -> impl Iterator<Item = &Credential> {
		self.access_tokens
			.values()
			.chain(self.refresh_tokens.values())
			.chain(self.id_tokens.values())
	}

	fn check_placement(&self) -> Result<(), CacheCorruptionError> {
		for (kind, name) in SECTIONS {
			for (key, credential) in self.section(kind) {
				if credential.kind != kind {
					return Err(CacheCorruptionError {
						message: format!(
							"{name}.{key}: credential of kind {} in the wrong section",
							credential.kind.as_str()
						),
					});
				}

				let expected = credential.cache_key();

				if *key != expected {
					return Err(CacheCorruptionError {
						message: format!("{name}.{key}: key does not match credential {expected}"),
					});
				}
			}
		}

		Ok(())
	}

	fn section(&self, kind: CredentialKind) -> &Section {
		match kind {
			CredentialKind::AccessToken => &self.access_tokens,
			CredentialKind::RefreshToken => &self.refresh_tokens,
			CredentialKind::IdToken => &self.id_tokens,
		}
	}

	fn section_mut(&mut self, kind: CredentialKind) -> &mut Section {
		match kind {
			CredentialKind::AccessToken => &mut self.access_tokens,
			CredentialKind::RefreshToken => &mut self.refresh_tokens,
			CredentialKind::IdToken => &mut self.id_tokens,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn credential(kind: CredentialKind, account: &str, secret: &str) -> Credential {
		Credential::builder(kind, "client")
			.home_account_id(account)
			.secret(secret)
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn upsert_reports_only_real_changes() {
		let mut state = CacheState::default();
		let at = credential(CredentialKind::AccessToken, "11.22", "at-1");

		assert!(state.upsert(at.clone()));
		assert!(!state.upsert(at));
		assert!(state.upsert(credential(CredentialKind::AccessToken, "11.22", "at-2")));
		assert_eq!(state.len(), 1);
	}

	#[test]
	fn remove_account_spans_all_sections() {
		let mut state = CacheState::default();

		state.upsert(credential(CredentialKind::AccessToken, "11.22", "at"));
		state.upsert(credential(CredentialKind::RefreshToken, "11.22", "rt"));
		state.upsert(credential(CredentialKind::IdToken, "33.44", "id"));

		assert_eq!(state.remove_account("11.22"), 2);
		assert_eq!(state.len(), 1);
	}

	#[test]
	fn blobs_use_sectioned_json() {
		let mut state = CacheState::default();

		state.upsert(credential(CredentialKind::RefreshToken, "11.22", "rt"));

		let blob = state.to_blob().expect("State should serialize.");
		let value: serde_json::Value =
			serde_json::from_slice(blob.as_bytes()).expect("Blob should be JSON.");

		assert_eq!(value["RefreshToken"].as_object().map(|m| m.len()), Some(1));
		assert_eq!(CacheState::from_blob(&blob).expect("Blob should decode."), state);
	}

	#[test]
	fn corrupt_blobs_name_the_failing_path() {
		let blob = CacheBlob::new(br#"{"AccessToken":{"k":{"kind":"Bogus"}}}"#.to_vec());
		let err = CacheState::from_blob(&blob).expect_err("Unknown kinds must be rejected.");

		assert!(err.message.starts_with("AccessToken.k.kind"), "{}", err.message);
		assert!(CacheState::from_blob(&CacheBlob::new(b"{} trailing".to_vec())).is_err());
	}

	#[test]
	fn misplaced_credentials_are_rejected() {
		let rt = credential(CredentialKind::RefreshToken, "11.22", "rt");
		let misfiled = serde_json::json!({ "AccessToken": { rt.cache_key(): rt } });
		let err = CacheState::from_blob(&CacheBlob::new(misfiled.to_string().into_bytes()))
			.expect_err("A refresh token in the access token section must be rejected.");

		assert!(err.message.starts_with("AccessToken."), "{}", err.message);
		assert!(err.message.contains("wrong section"), "{}", err.message);

		let at = credential(CredentialKind::AccessToken, "11.22", "at");
		let rekeyed = serde_json::json!({ "AccessToken": { "someone-else": at } });
		let err = CacheState::from_blob(&CacheBlob::new(rekeyed.to_string().into_bytes()))
			.expect_err("A key that disagrees with its credential must be rejected.");

		assert!(err.message.starts_with("AccessToken.someone-else"), "{}", err.message);
	}
}
