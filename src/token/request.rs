//! Ambient request state and the host's referer/token verification primitives.

use crate::error::{OptionsError, OptionsResult};
use crate::token::authority::TokenAuthority;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// What the token gate needs to know about the current request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Background (machine-readable) request rather than an interactive form post
    pub background: bool,
    /// Raw submitted fields
    pub fields: HashMap<String, String>,
    /// `Referer` header, falling back to `Origin`
    pub referer: Option<String>,
}

impl RequestContext {
    pub fn interactive(fields: HashMap<String, String>, referer: Option<String>) -> Self {
        Self {
            background: false,
            fields,
            referer,
        }
    }

    pub fn background(fields: HashMap<String, String>, referer: Option<String>) -> Self {
        Self {
            background: true,
            fields,
            referer,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Host-provided request authenticity checks.
pub trait RequestVerifier: Send + Sync {
    /// Check that an interactive submission came from the admin area and
    /// carries a valid token under `field` for `action`.
    fn verify_admin_referer(&self, ctx: &RequestContext, action: &str, field: &str) -> bool;

    /// Check the token of a background request.
    ///
    /// With `send_error_on_failure` set, a failed check is returned as
    /// [`OptionsError::TokenRejected`], which the HTTP layer turns into the
    /// final error response. Otherwise failure is reported as `Ok(false)`.
    fn verify_async_token(
        &self,
        ctx: &RequestContext,
        action: &str,
        field: &str,
        send_error_on_failure: bool,
    ) -> OptionsResult<bool>;
}

/// Verifier backed by a [`TokenAuthority`] and the configured admin origin.
pub struct HostVerifier {
    authority: Arc<dyn TokenAuthority>,
    admin_origin: String,
}

impl HostVerifier {
    pub fn new(authority: Arc<dyn TokenAuthority>, admin_origin: impl Into<String>) -> Self {
        Self {
            authority,
            admin_origin: admin_origin.into(),
        }
    }

    fn token_valid(&self, ctx: &RequestContext, action: &str, field: &str) -> bool {
        ctx.field(field)
            .map(|token| self.authority.validate_token(token, action))
            .unwrap_or(false)
    }

    fn referer_allowed(&self, ctx: &RequestContext) -> bool {
        let origin = self.admin_origin.trim_end_matches('/');
        match ctx.referer.as_deref() {
            Some(referer) if !origin.is_empty() => {
                referer == origin
                    || referer
                        .strip_prefix(origin)
                        .is_some_and(|rest| rest.starts_with(['/', '?', '#']))
            }
            _ => false,
        }
    }
}

impl RequestVerifier for HostVerifier {
    fn verify_admin_referer(&self, ctx: &RequestContext, action: &str, field: &str) -> bool {
        if !self.referer_allowed(ctx) {
            debug!(action, referer = ?ctx.referer, "Referer outside admin origin");
            return false;
        }
        self.token_valid(ctx, action, field)
    }

    fn verify_async_token(
        &self,
        ctx: &RequestContext,
        action: &str,
        field: &str,
        send_error_on_failure: bool,
    ) -> OptionsResult<bool> {
        if self.token_valid(ctx, action, field) {
            return Ok(true);
        }
        if send_error_on_failure {
            return Err(OptionsError::token_rejected(action));
        }
        Ok(false)
    }
}

impl std::fmt::Debug for HostVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostVerifier")
            .field("admin_origin", &self.admin_origin)
            .finish_non_exhaustive()
    }
}
