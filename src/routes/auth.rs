use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    mail::{strip_html, OutgoingEmail},
    models::{NewUser, User},
    schema::users::dsl,
    state::AppState,
    verification::{self, RateLimitDecision, VerifyError},
};

/// Account lookups answer identically whether or not the address exists, so
/// the endpoints cannot be used to enumerate registered emails.
const GENERIC_SENT_MESSAGE: &str =
    "if the account exists, an email has been sent with further instructions";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub recaptcha_token: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    pub access_token: String,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    Token {
        access_token: String,
        token_type: String,
        expires_in: i64,
    },
    VerificationRequired {
        verification_required: bool,
        message: String,
    },
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: String,
    pub is_verified: bool,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            user_type: user.user_type,
            is_verified: user.is_verified,
            created_at: user.created_at.and_utc().to_rfc3339(),
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    if payload.username.trim().is_empty() || payload.email.trim().is_empty() {
        return Err(AppError::bad_request("username and email are required"));
    }
    if payload.password.len() < 8 {
        return Err(AppError::bad_request(
            "password must be at least 8 characters",
        ));
    }

    if let Some(secret) = &state.config.recaptcha_secret_key {
        let token = payload
            .recaptcha_token
            .as_deref()
            .ok_or_else(|| AppError::bad_request("recaptcha token is required"))?;
        if !crate::recaptcha::verify_recaptcha(&state.http, secret, token).await {
            return Err(AppError::bad_request("recaptcha verification failed"));
        }
    }

    let password_hash = password::hash_password(&payload.password)?;
    let code = verification::generate_verification_code();
    let now = Utc::now().naive_utc();

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: payload.username.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        password_hash,
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        user_type: "standard".to_string(),
        is_verified: false,
        verification_token: Some(code.clone()),
        verification_token_created_at: Some(now),
    };

    let mut conn = state.db()?;
    let user: User = diesel::insert_into(dsl::users)
        .values(&new_user)
        .get_result(&mut conn)?;

    info!(user_id = %user.id, "registered new account, verification pending");
    send_verification_email(&state, &user, &code).await?;

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, &user.user_type)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: user.into(),
            access_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    let needle = payload.username_or_email.trim();
    let user: User = dsl::users
        .filter(dsl::username.eq(needle).or(dsl::email.eq(needle.to_lowercase())))
        .first(&mut conn)
        .map_err(|_| AppError::unauthorized())?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    if !user.is_verified {
        // A fresh code goes out on every login attempt against an unverified
        // account; the caller gets told to verify instead of a token.
        let code = verification::generate_verification_code();
        let now = Utc::now().naive_utc();
        diesel::update(dsl::users.find(user.id))
            .set((
                dsl::verification_token.eq(Some(code.clone())),
                dsl::verification_token_created_at.eq(Some(now)),
            ))
            .execute(&mut conn)?;
        send_verification_email(&state, &user, &code).await?;
        return Ok(Json(LoginResponse::VerificationRequired {
            verification_required: true,
            message: "email not verified, a new verification code has been sent".to_string(),
        }));
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.email, &user.user_type)?;

    Ok(Json(LoginResponse::Token {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_minutes * 60,
    }))
}

#[derive(Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
    pub email: String,
}

pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> AppResult<Json<MessageResponse>> {
    let email = query.email.trim().to_lowercase();

    if let RateLimitDecision::Blocked { retry_after } = state.rate_limiter().check(&email).await {
        warn!(%email, "verification attempts blocked");
        return Err(AppError::too_many_requests(
            "too many verification attempts, try again later",
            retry_after.as_secs(),
        ));
    }

    let mut conn = state.db()?;
    let user: User = dsl::users.filter(dsl::email.eq(&email)).first(&mut conn)?;

    if user.is_verified {
        return Ok(Json(MessageResponse {
            message: "email already verified".to_string(),
        }));
    }

    let now = Utc::now().naive_utc();
    match verification::evaluate_token(
        user.verification_token.as_deref(),
        user.verification_token_created_at,
        &query.token,
        now,
    ) {
        Ok(()) => {}
        Err(VerifyError::Expired) => {
            return Err(AppError::bad_request("verification code has expired"))
        }
        Err(VerifyError::Mismatch) | Err(VerifyError::NoPendingToken) => {
            return Err(AppError::bad_request("invalid verification code"))
        }
    }

    // One-time use: the code is cleared the moment it succeeds.
    diesel::update(dsl::users.find(user.id))
        .set((
            dsl::is_verified.eq(true),
            dsl::verification_token.eq(None::<String>),
            dsl::verification_token_created_at.eq(None::<chrono::NaiveDateTime>),
        ))
        .execute(&mut conn)?;

    state.rate_limiter().reset(&email).await;
    info!(user_id = %user.id, "email verified");

    Ok(Json(MessageResponse {
        message: "email verified".to_string(),
    }))
}

#[derive(Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    let mut conn = state.db()?;

    match dsl::users
        .filter(dsl::email.eq(&email))
        .first::<User>(&mut conn)
    {
        Ok(user) if !user.is_verified => {
            let code = verification::generate_verification_code();
            let now = Utc::now().naive_utc();
            diesel::update(dsl::users.find(user.id))
                .set((
                    dsl::verification_token.eq(Some(code.clone())),
                    dsl::verification_token_created_at.eq(Some(now)),
                ))
                .execute(&mut conn)?;
            send_verification_email(&state, &user, &code).await?;
        }
        Ok(_) | Err(diesel::result::Error::NotFound) => {}
        Err(err) => return Err(AppError::from(err)),
    }

    Ok(Json(MessageResponse {
        message: GENERIC_SENT_MESSAGE.to_string(),
    }))
}

#[derive(Deserialize)]
pub struct UserByTokenQuery {
    pub token: String,
}

/// Resolves the account that owns a still-pending verification code, so the
/// frontend can prefill the verification form from the emailed link.
pub async fn user_by_token(
    State(state): State<AppState>,
    Query(query): Query<UserByTokenQuery>,
) -> AppResult<Json<UserResponse>> {
    let token = query.token.trim();
    if token.is_empty() {
        return Err(AppError::bad_request("token is required"));
    }

    let mut conn = state.db()?;
    let user: User = dsl::users
        .filter(dsl::verification_token.eq(token))
        .first(&mut conn)?;
    Ok(Json(user.into()))
}

#[derive(Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    let email = payload.email.trim().to_lowercase();
    let mut conn = state.db()?;

    match dsl::users
        .filter(dsl::email.eq(&email))
        .first::<User>(&mut conn)
    {
        Ok(user) => {
            let token = state.jwt.generate_reset_token(user.id, &user.email)?;
            let base = state.config.frontend_base_url.trim_end_matches('/');
            let link = format!("{base}/auth/reset-password?token={token}");
            let html = format!(
                "<p>A password reset was requested for your account.</p>\
                 <p><a href=\"{link}\">Reset your password</a></p>\
                 <p>The link expires in {} minutes. If you did not request this, ignore this message.</p>",
                state.config.reset_token_expiry_minutes
            );
            deliver(&state, &user.email, "Password reset", html).await?;
        }
        Err(diesel::result::Error::NotFound) => {}
        Err(err) => return Err(AppError::from(err)),
    }

    Ok(Json(MessageResponse {
        message: GENERIC_SENT_MESSAGE.to_string(),
    }))
}

#[derive(Deserialize)]
pub struct PasswordResetConfirm {
    pub token: String,
    pub new_password: String,
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirm>,
) -> AppResult<Json<MessageResponse>> {
    if payload.new_password.len() < 8 {
        return Err(AppError::bad_request(
            "password must be at least 8 characters",
        ));
    }

    let claims = state
        .jwt
        .verify_reset_token(&payload.token)
        .map_err(|_| AppError::bad_request("invalid or expired reset token"))?;

    let password_hash = password::hash_password(&payload.new_password)?;
    let mut conn = state.db()?;
    diesel::update(dsl::users.find(claims.user_id))
        .set(dsl::password_hash.eq(password_hash))
        .execute(&mut conn)?;

    info!(user_id = %claims.user_id, "password reset completed");
    Ok(Json(MessageResponse {
        message: "password updated".to_string(),
    }))
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    if payload.new_password.len() < 8 {
        return Err(AppError::bad_request(
            "password must be at least 8 characters",
        ));
    }

    let mut conn = state.db()?;
    let record: User = dsl::users.find(user.user_id).first(&mut conn)?;

    let valid = password::verify_password(&payload.current_password, &record.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let password_hash = password::hash_password(&payload.new_password)?;
    diesel::update(dsl::users.find(user.user_id))
        .set(dsl::password_hash.eq(password_hash))
        .execute(&mut conn)?;

    Ok(Json(MessageResponse {
        message: "password updated".to_string(),
    }))
}

#[derive(Serialize)]
pub struct RecaptchaKeyResponse {
    pub site_key: Option<String>,
}

pub async fn recaptcha_key(State(state): State<AppState>) -> Json<RecaptchaKeyResponse> {
    Json(RecaptchaKeyResponse {
        site_key: state.config.recaptcha_site_key.clone(),
    })
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<UserResponse>> {
    let mut conn = state.db()?;
    let record: User = dsl::users.find(user.user_id).first(&mut conn)?;
    Ok(Json(record.into()))
}

async fn send_verification_email(state: &AppState, user: &User, code: &str) -> AppResult<()> {
    let link = verification::verification_link(
        &state.config.frontend_base_url,
        code,
        user.id,
        &user.email,
    );
    let html = state
        .email_template
        .render(&link, code, &user.email, user.id);
    deliver(state, &user.email, "Verify your email address", html).await
}

/// Delivery failures abort the request that triggered the mail; a caller who
/// never receives a code should see an error, not a success message.
async fn deliver(state: &AppState, to: &str, subject: &str, html: String) -> AppResult<()> {
    let email = OutgoingEmail {
        to: to.to_string(),
        subject: subject.to_string(),
        text_body: strip_html(&html),
        html_body: html,
    };
    state.mailer.send(email).await.map_err(|err| {
        error!(error = ?err, %to, "failed to send email");
        AppError::from(err)
    })
}
