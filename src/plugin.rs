//! Public options API for a plugin.
//!
//! ## Usage
//!
//! ```ignore
//! let options = PluginOptions::new(
//!     PluginIdentity::from(&config.plugin),
//!     Arc::new(AuthSettings),
//!     Arc::new(SqliteBackend::new(pool)),
//!     authority.clone(),
//!     Arc::new(HostVerifier::new(authority, &config.web.admin_origin)),
//! );
//!
//! let method = options.get_option("auth_method", None).await?;
//! if options.check(&ctx)? {
//!     options.update(new_options).await?;
//! }
//! ```

use crate::config::PluginConfig;
use crate::error::OptionsResult;
use crate::settings::{ConfigMap, PluginSettings};
use crate::store::{ConfigStore, OptionsBackend};
use crate::token::{RequestContext, RequestVerifier, TokenAuthority, TokenGate};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Stable name and version of the plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginIdentity {
    pub name: String,
    pub version: String,
}

impl From<&PluginConfig> for PluginIdentity {
    fn from(config: &PluginConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version.clone(),
        }
    }
}

/// Options store, defaults and token gate for one plugin.
pub struct PluginOptions {
    identity: PluginIdentity,
    store: ConfigStore,
    gate: TokenGate,
    authority: Arc<dyn TokenAuthority>,
    verifier: Arc<dyn RequestVerifier>,
}

impl PluginOptions {
    pub fn new(
        identity: PluginIdentity,
        settings: Arc<dyn PluginSettings>,
        backend: Arc<dyn OptionsBackend>,
        authority: Arc<dyn TokenAuthority>,
        verifier: Arc<dyn RequestVerifier>,
    ) -> Self {
        Self {
            store: ConfigStore::new(identity.name.clone(), settings, backend),
            gate: TokenGate::new(identity.name.clone()),
            identity,
            authority,
            verifier,
        }
    }

    pub async fn get_option(&self, key: &str, default: Option<Value>) -> OptionsResult<Option<Value>> {
        self.store.get(key, default).await
    }

    pub async fn get_options(&self, fresh: bool) -> OptionsResult<ConfigMap> {
        self.store.get_all(fresh).await
    }

    pub fn get_default(&self, key: &str) -> Option<Value> {
        self.store.settings().default(key)
    }

    pub fn get_defaults(&self) -> ConfigMap {
        self.store.settings().defaults()
    }

    pub fn sanitize(&self, input: ConfigMap) -> ConfigMap {
        self.store.settings().sanitize(input)
    }

    pub async fn update(&self, options: ConfigMap) -> OptionsResult<()> {
        self.store.update(options).await
    }

    /// Modify the options under the store lock. See [`ConfigStore::update_with`].
    pub async fn update_with<F>(&self, modify: F) -> OptionsResult<ConfigMap>
    where
        F: FnOnce(ConfigMap) -> ConfigMap + Send,
    {
        self.store.update_with(modify).await
    }

    /// Verify a mutation request. See [`TokenGate::verify`].
    pub fn check(&self, ctx: &RequestContext) -> OptionsResult<bool> {
        self.gate
            .verify(ctx, self.verifier.as_ref(), self.authority.as_ref())
    }

    pub fn issue_token(&self) -> String {
        self.gate.issue_token(self.authority.as_ref())
    }

    pub fn token_gate(&self) -> &TokenGate {
        &self.gate
    }

    pub fn set_token_name(&mut self, name: &str) {
        self.gate.set_token_name(name);
    }

    pub fn set_token_action(&mut self, action: &str) {
        self.gate.set_token_action(action);
    }

    pub fn set_token(&mut self, name: &str, action: &str) {
        self.gate.set_token(name, action);
    }

    pub fn get_plugin_name(&self) -> &str {
        &self.identity.name
    }

    pub fn get_version(&self) -> &str {
        &self.identity.version
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }
}

impl std::fmt::Debug for PluginOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginOptions")
            .field("identity", &self.identity)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AuthSettings;
    use crate::store::MemoryBackend;
    use crate::token::{HostVerifier, KeyedTokenAuthority};
    use serde_json::json;
    use std::collections::HashMap;

    const ORIGIN: &str = "https://example.com/admin";

    fn setup(backend: Arc<MemoryBackend>) -> PluginOptions {
        let authority = Arc::new(KeyedTokenAuthority::new("secret", 3600));
        PluginOptions::new(
            PluginIdentity {
                name: "login_guard".to_string(),
                version: "1.2.3".to_string(),
            },
            Arc::new(AuthSettings),
            backend,
            authority.clone(),
            Arc::new(HostVerifier::new(authority, ORIGIN)),
        )
    }

    #[tokio::test]
    async fn test_identity_and_defaults() {
        let options = setup(Arc::new(MemoryBackend::new()));
        assert_eq!(options.get_plugin_name(), "login_guard");
        assert_eq!(options.get_version(), "1.2.3");
        assert_eq!(options.get_default("auth_method"), Some(json!("standard")));
        assert_eq!(options.get_defaults(), AuthSettings.defaults());
    }

    #[tokio::test]
    async fn test_options_are_keyed_by_plugin_name() {
        let backend = Arc::new(MemoryBackend::new());
        let options = setup(backend.clone());

        let mut new_options = options.get_defaults();
        new_options.insert("auth_method".into(), json!("sso"));
        options.update(new_options.clone()).await.unwrap();

        assert_eq!(backend.stored("login_guard"), Some(new_options));
        assert_eq!(
            options.get_option("auth_method", None).await.unwrap(),
            Some(json!("sso"))
        );
    }

    #[tokio::test]
    async fn test_check_accepts_issued_token_from_admin() {
        let options = setup(Arc::new(MemoryBackend::new()));
        let token = options.issue_token();
        let field = options.token_gate().field_name().to_string();

        let ctx = RequestContext::interactive(
            HashMap::from([(field, token)]),
            Some(format!("{}/settings", ORIGIN)),
        );
        assert!(options.check(&ctx).unwrap());
    }

    #[tokio::test]
    async fn test_check_uses_reconfigured_names() {
        let mut options = setup(Arc::new(MemoryBackend::new()));
        options.set_token("_token", "login_guard_save");
        let token = options.issue_token();

        let ctx = RequestContext::interactive(
            HashMap::from([("_token".to_string(), token.clone())]),
            Some(ORIGIN.to_string()),
        );
        assert!(options.check(&ctx).unwrap());

        let wrong_field = RequestContext::interactive(
            HashMap::from([("login_guard_nonce".to_string(), token)]),
            Some(ORIGIN.to_string()),
        );
        assert!(!options.check(&wrong_field).unwrap());
    }

    #[tokio::test]
    async fn test_check_interactive_failure_is_boolean() {
        let options = setup(Arc::new(MemoryBackend::new()));
        let ctx = RequestContext::interactive(HashMap::new(), Some(ORIGIN.to_string()));
        assert!(!options.check(&ctx).unwrap());
    }

    #[tokio::test]
    async fn test_check_background_failure_is_error() {
        let options = setup(Arc::new(MemoryBackend::new()));
        let ctx = RequestContext::background(HashMap::new(), Some(ORIGIN.to_string()));
        assert!(options.check(&ctx).is_err());
    }
}
