use actix_web::dev::{Service, ServiceRequest, Transform};
use actix_web::http::header::HeaderMap;
use actix_web::HttpMessage;
use jsonwebtoken::errors::ErrorKind;
use std::future::{ready, Future, Ready};
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::context::UserInfo;
use crate::error::Error;
use crate::tokener::{Jwt, Tokener};

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("Authorization")?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value).trim())
}

/// Best-effort identity resolution for routes that accept guests: any
/// missing or unverifiable credential yields None instead of an error.
pub fn resolve_identity(headers: &HeaderMap, tokener: &Jwt) -> Option<UserInfo> {
    let token = bearer_token(headers)?;
    let claim = tokener.verify_token(token).ok()?;
    let id = claim.sub.parse::<i32>().ok()?;
    Some(UserInfo { id })
}

fn reject_reason(err: &Error) -> &'static str {
    match err {
        Error::Token(e) => match e.kind() {
            ErrorKind::ExpiredSignature => "credential expired",
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => "malformed credential",
            _ => "credential rejected",
        },
        _ => "credential rejected",
    }
}

pub struct JwtGuard {
    tokener: Jwt,
}

impl JwtGuard {
    pub fn new(tokener: Jwt) -> Self {
        Self { tokener }
    }
}

impl<S> Transform<S, ServiceRequest> for JwtGuard
where
    S: Service<ServiceRequest, Error = actix_web::Error> + 'static,
    S::Future: 'static,
{
    type Response = S::Response;
    type Error = actix_web::Error;
    type Transform = JwtGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtGuardService {
            tokener: self.tokener.clone(),
            next_service: service,
        }))
    }
}

pub struct JwtGuardService<S> {
    tokener: Jwt,
    next_service: S,
}

impl<S> Service<ServiceRequest> for JwtGuardService<S>
where
    S: Service<ServiceRequest, Error = actix_web::Error>,
    S::Future: 'static,
{
    type Response = S::Response;
    type Error = actix_web::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next_service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = match bearer_token(req.headers()) {
            Some(token) => token.to_owned(),
            None => {
                return Box::pin(ready(Err(
                    Error::Unauthorized("no credential in Authorization header".into()).into()
                )))
            }
        };
        match self.tokener.verify_token(&token) {
            Err(e) => Box::pin(ready(Err(Error::Unauthorized(reject_reason(&e).into()).into()))),
            Ok(claim) => match claim.sub.parse::<i32>() {
                Err(_) => Box::pin(ready(Err(Error::Unauthorized("malformed credential".into()).into()))),
                Ok(id) => {
                    req.extensions_mut().insert(UserInfo { id });
                    Box::pin(self.next_service.call(req))
                }
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use actix_web::http::header::{HeaderName, HeaderValue};
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpResponse};

    use crate::tokener::Claim;

    fn secret() -> Vec<u8> {
        b"guard test secret".to_vec()
    }

    async fn whoami(user: UserInfo) -> HttpResponse {
        HttpResponse::Ok().body(user.id.to_string())
    }

    async fn guarded_call(token: Option<&str>) -> (StatusCode, Option<String>) {
        let app = test::init_service(
            App::new().service(
                web::resource("/whoami")
                    .wrap(JwtGuard::new(Jwt::new(secret())))
                    .route(web::get().to(whoami)),
            ),
        )
        .await;
        let mut req = test::TestRequest::get().uri("/whoami");
        if let Some(token) = token {
            req = req.insert_header(("Authorization", format!("Bearer {}", token)));
        }
        match test::try_call_service(&app, req.to_request()).await {
            Ok(resp) => {
                let status = resp.status();
                let body = test::read_body(resp).await;
                (status, Some(String::from_utf8(body.to_vec()).unwrap()))
            }
            Err(err) => (err.error_response().status(), None),
        }
    }

    #[actix_web::test]
    async fn missing_credential_is_unauthorized() {
        let (status, _) = guarded_call(None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn garbage_credential_is_unauthorized() {
        let (status, _) = guarded_call(Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn expired_credential_is_unauthorized() {
        let jwt = Jwt::new(secret());
        let token = jwt
            .gen_token(&Claim {
                sub: "7".into(),
                exp: chrono::Utc::now().timestamp() - 3600,
            })
            .unwrap();
        let (status, _) = guarded_call(Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn valid_credential_attaches_identity() {
        let jwt = Jwt::new(secret());
        let token = jwt
            .gen_token(&Claim {
                sub: "7".into(),
                exp: chrono::Utc::now().timestamp() + 3600,
            })
            .unwrap();
        let (status, body) = guarded_call(Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_deref(), Some("7"));
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_static("Bearer abc"),
        );
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(HeaderName::from_static("authorization"), HeaderValue::from_static("abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
