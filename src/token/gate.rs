//! Per-plugin request token gate.

use crate::error::OptionsResult;
use crate::token::authority::TokenAuthority;
use crate::token::request::{RequestContext, RequestVerifier};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Appended to the plugin name to form the default field and action names
pub const TOKEN_SUFFIX: &str = "_nonce";

/// Lifecycle of a [`TokenGate`]. `TokenIssued` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePhase {
    Configured,
    TokenIssued,
}

/// Token handed out to forms, with the authority epoch it was created in
#[derive(Debug, Clone)]
struct IssuedToken {
    epoch: i64,
    value: String,
}

/// Issues the plugin's form token and verifies mutation requests.
#[derive(Debug)]
pub struct TokenGate {
    plugin_name: String,
    field_name: String,
    action: String,
    issued: Mutex<Option<IssuedToken>>,
}

impl TokenGate {
    /// Create a gate with field and action names derived from the plugin name.
    pub fn new(plugin_name: impl Into<String>) -> Self {
        let plugin_name = plugin_name.into();
        let default_name = format!("{}{}", plugin_name, TOKEN_SUFFIX);
        Self {
            field_name: default_name.clone(),
            action: default_name,
            plugin_name,
            issued: Mutex::new(None),
        }
    }

    fn resolve(&self, name: &str) -> String {
        if name.is_empty() {
            format!("{}{}", self.plugin_name, TOKEN_SUFFIX)
        } else {
            name.to_string()
        }
    }

    fn issued(&self) -> MutexGuard<'_, Option<IssuedToken>> {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn warn_if_issued(&self, what: &str) {
        if self.issued().is_some() {
            warn!(
                plugin = %self.plugin_name,
                "Token {} changed after a token was issued; the issued token keeps its original action until it is refreshed",
                what
            );
        }
    }

    /// Set the request field the token is read from. Empty resets to the default.
    pub fn set_token_name(&mut self, name: &str) {
        self.warn_if_issued("field name");
        self.field_name = self.resolve(name);
    }

    /// Set the action tokens are bound to. Empty resets to the default.
    pub fn set_token_action(&mut self, action: &str) {
        self.warn_if_issued("action");
        self.action = self.resolve(action);
    }

    pub fn set_token(&mut self, name: &str, action: &str) {
        self.set_token_name(name);
        self.set_token_action(action);
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn phase(&self) -> GatePhase {
        if self.issued().is_some() {
            GatePhase::TokenIssued
        } else {
            GatePhase::Configured
        }
    }

    /// Return the token for the current action, creating it on first use.
    ///
    /// The same string is returned for as long as the authority's epoch
    /// stays the same. Once the epoch moves on, a new token is created for
    /// the current action so forms never receive an expired token.
    pub fn issue_token(&self, authority: &dyn TokenAuthority) -> String {
        let epoch = authority.token_epoch();
        let mut issued = self.issued();

        if let Some(token) = issued.as_ref().filter(|t| t.epoch == epoch) {
            return token.value.clone();
        }

        let refresh = issued.is_some();
        info!(
            plugin = %self.plugin_name,
            action = %self.action,
            refresh,
            "Issuing request token"
        );
        let value = authority.create_token(&self.action);
        *issued = Some(IssuedToken {
            epoch,
            value: value.clone(),
        });
        value
    }

    /// Decide whether a mutation request is authentic.
    ///
    /// Background requests must first pass the host's async token check;
    /// a failure there is returned as an error and the caller must not
    /// continue handling the request. Every request then has to pass the
    /// admin referer check, and finally the submitted token is validated
    /// against the configured action.
    pub fn verify(
        &self,
        ctx: &RequestContext,
        verifier: &dyn RequestVerifier,
        authority: &dyn TokenAuthority,
    ) -> OptionsResult<bool> {
        if ctx.background
            && !verifier.verify_async_token(ctx, &self.action, &self.field_name, true)?
        {
            return Ok(false);
        }

        if !verifier.verify_admin_referer(ctx, &self.action, &self.field_name) {
            warn!(action = %self.action, background = ctx.background, "Admin referer check failed");
            return Ok(false);
        }

        let valid = ctx
            .field(&self.field_name)
            .map(|token| authority.validate_token(token, &self.action))
            .unwrap_or(false);

        debug!(action = %self.action, valid, "Submitted token checked");
        Ok(valid)
    }
}
