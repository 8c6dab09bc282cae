pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod mail;
pub mod models;
pub mod recaptcha;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod stamp;
pub mod state;
pub mod storage;
pub mod verification;

pub use routes::create_router;
