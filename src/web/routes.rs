use crate::error::{OptionsError, OptionsResult};
use crate::plugin::PluginOptions;
use crate::settings::ConfigMap;
use crate::token::RequestContext;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Application state for web handlers
#[derive(Clone)]
pub struct AppState {
    pub options: Arc<PluginOptions>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub plugin: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        plugin: state.options.get_plugin_name().to_string(),
        version: state.options.get_version().to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct OptionsQuery {
    #[serde(default)]
    pub fresh: bool,
}

/// All options
pub async fn list_options(
    State(state): State<AppState>,
    Query(query): Query<OptionsQuery>,
) -> OptionsResult<Json<ConfigMap>> {
    Ok(Json(state.options.get_options(query.fresh).await?))
}

/// Single option response
#[derive(Serialize)]
pub struct OptionResponse {
    pub key: String,
    pub value: Option<Value>,
}

/// One option, falling back to its declared default
pub async fn get_option(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> OptionsResult<Json<OptionResponse>> {
    let default = state.options.get_default(&key);
    let value = state.options.get_option(&key, default).await?;
    Ok(Json(OptionResponse { key, value }))
}

/// Token response for rendering forms
#[derive(Serialize)]
pub struct TokenResponse {
    pub field: String,
    pub action: String,
    pub token: String,
}

pub async fn get_token(State(state): State<AppState>) -> Json<TokenResponse> {
    let gate = state.options.token_gate();
    Json(TokenResponse {
        field: gate.field_name().to_string(),
        action: gate.action().to_string(),
        token: state.options.issue_token(),
    })
}

/// Response for save endpoints
#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ConfigMap>,
}

fn referer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::REFERER)
        .or_else(|| headers.get(header::ORIGIN))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Handler: POST /admin/options
///
/// Interactive form submission. Verification failure is a plain 403.
pub async fn save_options_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> OptionsResult<Response> {
    save_options(&state, RequestContext::interactive(fields, referer(&headers))).await
}

/// Handler: POST /ajax/options
///
/// Background submission. A bad token ends the request with the
/// structured error body from [`crate::error::OptionsError`].
pub async fn save_options_ajax(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(fields): Form<HashMap<String, String>>,
) -> OptionsResult<Response> {
    save_options(&state, RequestContext::background(fields, referer(&headers))).await
}

async fn save_options(state: &AppState, ctx: RequestContext) -> OptionsResult<Response> {
    let options = &state.options;

    if !options.check(&ctx)? {
        warn!(plugin = %options.get_plugin_name(), "Rejected options submission");
        let body = SaveResponse {
            success: false,
            message: Some("Request could not be verified".to_string()),
            options: None,
        };
        return Ok((StatusCode::FORBIDDEN, Json(body)).into_response());
    }

    let token_field = options.token_gate().field_name();
    let submitted: Vec<(String, String)> = ctx
        .fields
        .into_iter()
        .filter(|(key, _)| key != token_field)
        .collect();
    if submitted.is_empty() {
        return Err(OptionsError::invalid_request("No options submitted"));
    }

    let sanitized = options
        .update_with(|mut current| {
            for (key, value) in submitted {
                current.insert(key, Value::String(value));
            }
            options.sanitize(current)
        })
        .await?;
    info!(plugin = %options.get_plugin_name(), background = ctx.background, "Options updated");

    Ok(Json(SaveResponse {
        success: true,
        message: None,
        options: Some(sanitized),
    })
    .into_response())
}

/// Scheme, host and port of a URL, e.g. `https://example.com` for
/// `https://example.com/admin/page`.
fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map(|i| i + 3).unwrap_or(0);
    match url[after_scheme..].find('/') {
        Some(i) => &url[..after_scheme + i],
        None => url,
    }
}

/// Cross-origin access is limited to the admin origin.
fn admin_cors(admin_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    match HeaderValue::from_str(origin_of(admin_origin)) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!("Admin origin {:?} is not a valid header value, CORS disabled: {}", admin_origin, e);
            cors
        }
    }
}

/// Create the web router
pub fn create_router(state: AppState, admin_origin: &str) -> Router {
    let cors = admin_cors(admin_origin);

    Router::new()
        .route("/health", get(health))
        .route("/api/options", get(list_options))
        .route("/api/options/{key}", get(get_option))
        .route("/api/token", get(get_token))
        .route("/admin/options", post(save_options_form))
        .route("/ajax/options", post(save_options_ajax))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referer_prefers_referer_over_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, "https://origin.example".parse().unwrap());
        assert_eq!(referer(&headers).as_deref(), Some("https://origin.example"));

        headers.insert(header::REFERER, "https://referer.example/admin".parse().unwrap());
        assert_eq!(
            referer(&headers).as_deref(),
            Some("https://referer.example/admin")
        );

        assert_eq!(referer(&HeaderMap::new()), None);
    }

    #[test]
    fn test_origin_of_strips_path() {
        assert_eq!(origin_of("https://example.com/admin/x"), "https://example.com");
        assert_eq!(origin_of("http://127.0.0.1:8080/admin"), "http://127.0.0.1:8080");
        assert_eq!(origin_of("https://example.com"), "https://example.com");
    }
}
