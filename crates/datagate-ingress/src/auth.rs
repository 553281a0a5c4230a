//! Tenant resolution
//!
//! The first path segment under the mount prefix is the tenant token. An
//! empty segment is rejected as unauthenticated unless a default tenant is
//! configured, in which case the path is rewritten to name it. An unknown
//! token is always rejected; it never falls back to the default.

use axum::{
    extract::{Request, State},
    http::{Uri, uri::PathAndQuery},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use datagate_core::{AuthError, Error, Result, TenantContext};

use crate::{envelope::stamp_identity, state::GatewayState, types::ApiError};

/// Split `path` into `(token, rest)` when it lies under `prefix`. `rest` is
/// empty or starts with `/`.
pub fn split_tenant_path<'a>(prefix: &str, path: &'a str) -> Option<(&'a str, &'a str)> {
    let after = path.strip_prefix(prefix)?;
    if after.is_empty() {
        return Some(("", ""));
    }
    let tail = after.strip_prefix('/')?;
    match tail.find('/') {
        Some(idx) => Some((&tail[..idx], &tail[idx..])),
        None => Some((tail, "")),
    }
}

fn rewrite_token(uri: &Uri, prefix: &str, token: &str, rest: &str) -> Result<Uri> {
    let mut target = format!("{}/{}{}", prefix, token, rest);
    if let Some(query) = uri.query() {
        target.push('?');
        target.push_str(query);
    }

    let mut parts = uri.clone().into_parts();
    parts.path_and_query =
        Some(PathAndQuery::try_from(target).map_err(|e| Error::malformed(e.to_string()))?);
    Uri::from_parts(parts).map_err(|e| Error::malformed(e.to_string()))
}

fn resolve(state: &GatewayState, req: &mut Request) -> Result<Option<TenantContext>> {
    let prefix = state.settings.mount_prefix.as_str();
    let path = req.uri().path().to_string();
    let Some((token, rest)) = split_tenant_path(prefix, &path) else {
        return Ok(None);
    };

    let descriptor = if token.is_empty() {
        let default = state
            .settings
            .default_token
            .as_ref()
            .ok_or(AuthError::Missing)?;
        debug!("Empty token segment, using default tenant");
        let uri = rewrite_token(req.uri(), prefix, default.as_str(), rest)?;
        *req.uri_mut() = uri;
        state.registry.lookup(default.as_str())?
    } else {
        state.registry.lookup(token)?
    };

    Ok(Some(TenantContext::new(descriptor)))
}

/// Resolve the tenant, put its [`TenantContext`] in the request extensions
/// and stamp the identity headers on the response
pub async fn tenant_auth(
    State(state): State<Arc<GatewayState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let tenant = match resolve(&state, &mut req) {
        Ok(Some(tenant)) => tenant,
        Ok(None) => return next.run(req).await,
        Err(err) => {
            warn!("Tenant resolution failed for {}: {}", req.uri().path(), err);
            return ApiError(err).into_response();
        }
    };

    req.extensions_mut().insert(tenant.clone());
    let mut response = next.run(req).await;
    stamp_identity(response.headers_mut(), &tenant);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tenant_path() {
        assert_eq!(split_tenant_path("/api", "/api/tok/users"), Some(("tok", "/users")));
        assert_eq!(split_tenant_path("/api", "/api/tok"), Some(("tok", "")));
        assert_eq!(split_tenant_path("/api", "/api//users"), Some(("", "/users")));
        assert_eq!(split_tenant_path("/api", "/api/"), Some(("", "")));
        assert_eq!(split_tenant_path("/api", "/api"), Some(("", "")));
        assert_eq!(split_tenant_path("/api", "/apix/tok"), None);
        assert_eq!(split_tenant_path("/api", "/healthz"), None);
        assert_eq!(split_tenant_path("", "/tok/users/1"), Some(("tok", "/users/1")));
    }

    #[test]
    fn test_rewrite_keeps_rest_and_query() {
        let uri: Uri = "/api//users/42?join=tags&sub=tags".parse().unwrap();
        let rewritten = rewrite_token(&uri, "/api", "main", "/users/42").unwrap();
        assert_eq!(rewritten.path(), "/api/main/users/42");
        assert_eq!(rewritten.query(), Some("join=tags&sub=tags"));
    }
}
