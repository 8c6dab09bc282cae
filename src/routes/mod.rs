use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod companies;
pub mod documents;
pub mod employees;
pub mod employment_history;
pub mod health;
pub mod verify;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/verify-email", get(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/user-by-token", get(auth::user_by_token))
        .route(
            "/password-reset",
            post(auth::request_password_reset).put(auth::confirm_password_reset),
        )
        .route("/recaptcha-key", get(auth::recaptcha_key))
        .route("/me", get(auth::me));

    let companies_routes = Router::new()
        .route(
            "/",
            get(companies::list_companies).post(companies::create_company),
        )
        .route(
            "/:id",
            get(companies::get_company)
                .patch(companies::update_company)
                .delete(companies::delete_company),
        )
        .route("/:id/documents", get(companies::list_company_documents));

    let employees_routes = Router::new()
        .route(
            "/",
            get(employees::list_employees).post(employees::create_employee),
        )
        .route("/:id", get(employees::get_employee));

    let employment_history_routes = Router::new().route(
        "/",
        get(employment_history::list_records).post(employment_history::create_record),
    );

    let documents_routes = Router::new()
        .route("/", post(documents::upload_document))
        .route("/:id", get(documents::get_document))
        .route(
            "/identifier/:identifier",
            get(documents::get_document_by_identifier),
        )
        .route("/:id/download", get(documents::download_document))
        .route(
            "/:id/copies",
            get(documents::list_copies).post(documents::create_copy),
        );

    let verify_routes = Router::new().route("/:identifier", get(verify::verify_document));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/companies", companies_routes)
        .nest("/api/employees", employees_routes)
        .nest("/api/employment-history", employment_history_routes)
        .nest("/api/documents", documents_routes)
        .route("/api/auth/change-password", put(auth::change_password))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/verify", verify_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
