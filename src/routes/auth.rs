/// Authentication Routes
///
/// Registration, login, token refresh, revocation and the current user's claims.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims};
use crate::error::{AppError, ErrorContext, ValidationError};
use crate::users::{NewUser, DEFAULT_ROLE};
use crate::validators::{is_valid_email, is_valid_name, require_token};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of refresh and revoke: the access token issued with the refresh token
#[derive(Deserialize)]
pub struct TokenPairRequest {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct ClaimsResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub roles: Vec<String>,
    pub expires_at: i64,
}

/// POST /auth/register
///
/// # Errors
/// - 400: invalid email, name or weak password
/// - 409: email already registered
/// - 503: user store unavailable
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    let new_user = NewUser {
        email: is_valid_email(&form.email)?,
        name: is_valid_name(&form.name)?,
        password: form.password,
        roles: vec![DEFAULT_ROLE.to_string()],
    };

    let user = auth.register(new_user).await?;

    Ok(HttpResponse::Created().json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        name: user.name,
    }))
}

/// POST /auth/login
///
/// Starts a new refresh family and returns its first token pair.
///
/// # Errors
/// - 400: malformed email
/// - 401: unknown email, wrong password or inactive account (indistinguishable)
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;
    if form.password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()).into());
    }

    let pair = auth.login(&email, &form.password).await?;
    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/refresh
///
/// Rotates the refresh token. Every protocol rejection answers the same
/// 401 `TOKEN_INVALID`; replaying a consumed refresh token also revokes
/// every token of its family.
pub async fn refresh(
    form: web::Json<TokenPairRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");
    let access_token = require_token("access_token", &form.access_token)?;
    let refresh_token = require_token("refresh_token", &form.refresh_token)?;

    match auth.refresh(access_token, refresh_token).await {
        Ok(pair) => Ok(HttpResponse::Ok().json(pair)),
        Err(e) => {
            context.log_error(&e);
            Err(e)
        }
    }
}

/// POST /auth/revoke
///
/// Logout: ends the whole refresh family of the presented pair.
pub async fn revoke(
    form: web::Json<TokenPairRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_revoke");
    let access_token = require_token("access_token", &form.access_token)?;
    let refresh_token = require_token("refresh_token", &form.refresh_token)?;

    match auth.revoke(access_token, refresh_token).await {
        Ok(()) => Ok(HttpResponse::NoContent().finish()),
        Err(e) => {
            context.log_error(&e);
            Err(e)
        }
    }
}

/// GET /api/me
///
/// Claims of the verified access token; injected by `JwtMiddleware`.
pub async fn get_current_user(claims: web::ReqData<Claims>) -> Result<HttpResponse, AppError> {
    let claims = claims.into_inner();
    let user_id = claims.user_id()?;

    Ok(HttpResponse::Ok().json(ClaimsResponse {
        id: user_id.to_string(),
        email: claims.email,
        name: claims.name,
        roles: claims.role,
        expires_at: claims.exp,
    }))
}
