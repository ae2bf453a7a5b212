//! Bearer-token authentication and panic recovery for the gRPC server
//!
//! `AuthLayer` runs on the HTTP/2 request that opens every call, so a
//! single check covers unary and streaming methods alike. A rejected
//! stream is answered with `Unauthenticated` before any message is read
//! or written. An accepted call carries an [`AuthenticatedUser`] in its
//! request extensions for the rest of its lifetime.

use futures::future::BoxFuture;
use lockbox_core::types::UserId;
use std::any::Any;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::Status;
use tower::{Layer, Service};
use tracing::{error, warn};

use crate::metrics::Metrics;
use crate::session::Authenticator;

/// Methods callable without a session, by full gRPC path
pub const PUBLIC_METHODS: [&str; 3] = [
    "/lockbox.Lockbox/RegisterUser",
    "/lockbox.Lockbox/LoginUser",
    "/lockbox.Lockbox/Ping",
];

pub const BEARER_PREFIX: &str = "Bearer ";

/// Identity bound to a call by [`AuthLayer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

pub fn is_public_method(path: &str) -> bool {
    PUBLIC_METHODS.contains(&path)
}

/// Decide whether a call may proceed.
///
/// `Ok(None)` for public methods, `Ok(Some(user))` for a valid bearer
/// token, `Err(Unauthenticated)` otherwise.
pub fn authorize(
    auth: &dyn Authenticator,
    path: &str,
    headers: &http::HeaderMap,
) -> Result<Option<AuthenticatedUser>, Status> {
    if is_public_method(path) {
        return Ok(None);
    }

    let value = headers
        .get(http::header::AUTHORIZATION)
        .ok_or_else(|| Status::unauthenticated("missing authorization header"))?;
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Status::unauthenticated("missing or invalid token"))?;

    let claims = auth
        .validate_token(token)
        .map_err(|e| Status::unauthenticated(format!("invalid token: {e}")))?;
    Ok(Some(AuthenticatedUser {
        user_id: claims.user_id,
    }))
}

/// The caller's identity, if [`AuthLayer`] bound one
pub fn authenticated_user<T>(request: &tonic::Request<T>) -> Option<UserId> {
    request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.user_id)
}

/// Like [`authenticated_user`], but a missing identity is `Unauthenticated`
pub fn require_user<T>(request: &tonic::Request<T>) -> Result<UserId, Status> {
    authenticated_user(request).ok_or_else(|| Status::unauthenticated("no authenticated user"))
}

#[derive(Clone)]
pub struct AuthLayer {
    auth: Arc<dyn Authenticator>,
    metrics: Metrics,
}

impl AuthLayer {
    pub fn new(auth: Arc<dyn Authenticator>, metrics: Metrics) -> Self {
        Self { auth, metrics }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService {
            inner,
            auth: self.auth.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthService<S> {
    inner: S,
    auth: Arc<dyn Authenticator>,
    metrics: Metrics,
}

impl<S, ReqBody, ResBody> Service<http::Request<ReqBody>> for AuthService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<ReqBody>) -> Self::Future {
        match authorize(self.auth.as_ref(), req.uri().path(), req.headers()) {
            Ok(Some(user)) => {
                req.extensions_mut().insert(user);
            }
            Ok(None) => {}
            Err(status) => {
                self.metrics.auth_failures.inc();
                warn!(method = %req.uri().path(), reason = %status.message(), "call rejected");
                return Box::pin(async move { Ok(status.into_http()) });
            }
        }

        // the ready service goes to this call; a fresh clone stays behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(inner.call(req))
    }
}

/// Response for a panicking handler: a fixed `Internal` status, details
/// only in the log.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> http::Response<tonic::body::Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    error!(panic = detail, "handler panicked");
    Status::internal("internal error").into_http()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::JwtAuthenticator;
    use chrono::TimeDelta;
    use http::HeaderValue;
    use std::convert::Infallible;
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn auth() -> JwtAuthenticator {
        JwtAuthenticator::new(SECRET).unwrap()
    }

    fn headers(value: &str) -> http::HeaderMap {
        let mut h = http::HeaderMap::new();
        h.insert(
            http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        h
    }

    fn code(result: Result<Option<AuthenticatedUser>, Status>) -> tonic::Code {
        result.unwrap_err().code()
    }

    #[test]
    fn test_public_methods_skip_auth() {
        for path in PUBLIC_METHODS {
            assert_eq!(authorize(&auth(), path, &http::HeaderMap::new()).unwrap(), None);
        }
    }

    #[test]
    fn test_protected_method_requires_header() {
        let res = authorize(&auth(), "/lockbox.Lockbox/GetVaults", &http::HeaderMap::new());
        assert_eq!(code(res), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_prefix_must_match() {
        let token = auth().create_token(1, TimeDelta::hours(1)).unwrap();
        for value in [token.clone(), format!("bearer {token}"), "Bearer ".into()] {
            let res = authorize(&auth(), "/lockbox.Lockbox/GetVaults", &headers(&value));
            assert_eq!(code(res), tonic::Code::Unauthenticated, "{value:?}");
        }
    }

    #[test]
    fn test_valid_token_binds_user() {
        let token = auth().create_token(17, TimeDelta::hours(1)).unwrap();
        let res = authorize(
            &auth(),
            "/lockbox.Lockbox/UploadFile",
            &headers(&format!("Bearer {token}")),
        );
        assert_eq!(res.unwrap(), Some(AuthenticatedUser { user_id: 17 }));
    }

    #[test]
    fn test_invalid_token_rejected() {
        let res = authorize(
            &auth(),
            "/lockbox.Lockbox/GetStreamedVaults",
            &headers("Bearer abc.def.ghi"),
        );
        assert_eq!(code(res), tonic::Code::Unauthenticated);
    }

    #[test]
    fn test_accessor_reads_extension() {
        let mut req = tonic::Request::new(());
        assert_eq!(authenticated_user(&req), None);
        assert_eq!(require_user(&req).unwrap_err().code(), tonic::Code::Unauthenticated);

        req.extensions_mut().insert(AuthenticatedUser { user_id: 5 });
        assert_eq!(authenticated_user(&req), Some(5));
    }

    async fn exploding(
        _req: http::Request<()>,
    ) -> Result<http::Response<tonic::body::Body>, Infallible> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_layer_rejects_before_inner_service() {
        // would panic if reached
        let inner = tower::service_fn(exploding);
        let metrics = Metrics::default();
        let svc = AuthLayer::new(Arc::new(auth()), metrics.clone()).layer(inner);

        let req = http::Request::builder()
            .uri("/lockbox.Lockbox/GetVaults")
            .body(())
            .unwrap();
        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["grpc-status"], "16");
        assert_eq!(metrics.auth_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_layer_passes_identity_through() {
        let inner = tower::service_fn(|req: http::Request<()>| async move {
            let user = req.extensions().get::<AuthenticatedUser>().copied();
            assert_eq!(user, Some(AuthenticatedUser { user_id: 3 }));
            Ok::<_, Infallible>(http::Response::new(tonic::body::Body::empty()))
        });
        let token = auth().create_token(3, TimeDelta::hours(1)).unwrap();
        let svc = AuthLayer::new(Arc::new(auth()), Metrics::default()).layer(inner);

        let req = http::Request::builder()
            .uri("/lockbox.Lockbox/GetVaults")
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap();
        let resp = svc.oneshot(req).await.unwrap();
        assert!(resp.headers().get("grpc-status").is_none());
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_status() {
        let svc = CatchPanicLayer::custom(panic_response).layer(tower::service_fn(exploding));

        let resp = svc.oneshot(http::Request::new(())).await.unwrap();
        assert_eq!(resp.headers()["grpc-status"], "13");
        assert!(resp.headers().contains_key("grpc-message"));
    }
}
