/// JWT Authentication Middleware
///
/// Fully verifies the bearer access token (signature, issuer, audience,
/// expiry) and injects its claims into request extensions.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;

use crate::auth::JwtSigner;
use crate::error::{AppError, AuthError};

pub struct JwtMiddleware {
    signer: JwtSigner,
}

impl JwtMiddleware {
    pub fn new(signer: JwtSigner) -> Self {
        Self { signer }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            signer: self.signer.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    signer: JwtSigner,
}

fn unauthorized(reason: AuthError) -> Error {
    AppError::Auth(reason).into()
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        let Some(token) = bearer else {
            tracing::debug!("Missing or malformed Authorization header");
            return Box::pin(async { Err(unauthorized(AuthError::MissingToken)) });
        };

        match self.signer.verify(&token) {
            Ok(claims) => {
                tracing::debug!(user_id = %claims.sub, "Access token verified");
                req.extensions_mut().insert(claims);

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(_) => Box::pin(async { Err(unauthorized(AuthError::TokenInvalid)) }),
        }
    }
}
