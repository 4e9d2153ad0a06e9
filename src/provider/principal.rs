//! Sources of the authenticated principal used to derive per-user cache keys.

// self
use crate::{_prelude::*, auth::ClaimsPrincipal};

/// Resolves the principal of the request currently being served.
pub trait PrincipalAccessor
where
	Self: Send + Sync,
{
	/// Returns the current principal, or `None` for anonymous contexts.
	fn current_principal(&self) -> Option<ClaimsPrincipal>;
}

/// Request-scoped accessor holding the principal validated for one request.
#[derive(Debug, Default)]
pub struct FixedPrincipal(RwLock<Option<ClaimsPrincipal>>);
impl FixedPrincipal {
	/// Binds the accessor to `principal`.
	pub fn new(principal: Option<ClaimsPrincipal>) -> Self {
		Self(RwLock::new(principal))
	}

	/// Replaces the bound principal (e.g. after sign-in completes mid-request).
	pub fn set(&self, principal: Option<ClaimsPrincipal>) {
		*self.0.write() = principal;
	}
}
impl PrincipalAccessor for FixedPrincipal {
	fn current_principal(&self) -> Option<ClaimsPrincipal> {
		self.0.read().clone()
	}
}

/// Accessor for hosts that only use the application-wide cache.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoPrincipal;
impl PrincipalAccessor for NoPrincipal {
	fn current_principal(&self) -> Option<ClaimsPrincipal> {
		None
	}
}
