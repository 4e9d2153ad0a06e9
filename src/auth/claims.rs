//! Claim sets produced by upstream token validation and the identity lookups the cache needs.

// self
use crate::{
	_prelude::*,
	auth::{ObjectId, TenantId},
};

/// Short-form object identifier claim.
pub const CLAIM_OBJECT_ID: &str = "oid";
/// Legacy URI form of the object identifier claim.
pub const CLAIM_OBJECT_ID_URI: &str =
	"http://schemas.microsoft.com/identity/claims/objectidentifier";
/// Short-form tenant identifier claim.
pub const CLAIM_TENANT_ID: &str = "tid";
/// Legacy URI form of the tenant identifier claim.
pub const CLAIM_TENANT_ID_URI: &str = "http://schemas.microsoft.com/identity/claims/tenantid";

/// Claims of an authenticated principal, keyed by claim type.
///
/// Only the first value of each claim type is kept; later duplicates are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPrincipal {
	claims: BTreeMap<String, String>,
}
impl ClaimsPrincipal {
	/// Builds a principal from `(type, value)` pairs.
	pub fn from_claims<I, K, V>(claims: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		let mut principal = Self::default();

		for (kind, value) in claims {
			principal.claims.entry(kind.into()).or_insert_with(|| value.into());
		}

		principal
	}

	/// Returns the raw value for a claim type.
	pub fn claim(&self, kind: &str) -> Option<&str> {
		self.claims.get(kind).map(String::as_str)
	}

	/// Object identifier from `oid`, falling back to the legacy URI claim.
	///
	/// Values that fail identifier validation are treated as absent.
	pub fn object_id(&self) -> Option<ObjectId> {
		self.first_of([CLAIM_OBJECT_ID, CLAIM_OBJECT_ID_URI]).find_map(|v| ObjectId::new(v).ok())
	}

	/// Tenant identifier from `tid`, falling back to the legacy URI claim.
	pub fn tenant_id(&self) -> Option<TenantId> {
		self.first_of([CLAIM_TENANT_ID, CLAIM_TENANT_ID_URI]).find_map(|v| TenantId::new(v).ok())
	}

	/// Returns true if the principal carries no claims.
	pub fn is_empty(&self) -> bool {
		self.claims.is_empty()
	}

	fn first_of<'a>(&'a self, kinds: [&'a str; 2]) -> impl Iterator<Item = &'a str> {
		kinds.into_iter().filter_map(|kind| self.claim(kind))
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn short_claims_take_precedence() {
		let principal = ClaimsPrincipal::from_claims([
			(CLAIM_OBJECT_ID_URI, "legacy-oid"),
			(CLAIM_OBJECT_ID, "11"),
			(CLAIM_TENANT_ID, "22"),
		]);

		assert_eq!(principal.object_id().as_deref(), Some("11"));
		assert_eq!(principal.tenant_id().as_deref(), Some("22"));
	}

	#[test]
	fn legacy_uri_claims_are_used_as_fallback() {
		let principal = ClaimsPrincipal::from_claims([
			(CLAIM_OBJECT_ID_URI, "11"),
			(CLAIM_TENANT_ID_URI, "22"),
		]);

		assert_eq!(principal.object_id().as_deref(), Some("11"));
		assert_eq!(principal.tenant_id().as_deref(), Some("22"));
	}

	#[test]
	fn blank_claims_count_as_missing() {
		let principal =
			ClaimsPrincipal::from_claims([(CLAIM_OBJECT_ID, ""), (CLAIM_TENANT_ID, "22")]);

		assert!(principal.object_id().is_none());
		assert!(ClaimsPrincipal::default().is_empty());
	}
}
