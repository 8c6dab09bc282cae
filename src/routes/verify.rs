use axum::extract::{Path, State};
use axum::Json;
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;

use crate::error::AppResult;
use crate::models::{Company, Document};
use crate::schema::{companies, documents};
use crate::state::AppState;

#[derive(Serialize)]
pub struct VerificationResponse {
    pub unique_identifier: String,
    pub document_hash: String,
    pub title: String,
    pub company_name: String,
    pub issued_date: NaiveDate,
    pub issued_at: String,
}

/// Public check of a stamped document. Given the identifier printed on the
/// footer, returns the issuing company and the hash to compare against the
/// `Hash:` line. Unknown identifiers answer 404.
pub async fn verify_document(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
) -> AppResult<Json<VerificationResponse>> {
    let mut conn = state.db()?;

    let document: Document = documents::table
        .filter(documents::unique_identifier.eq(identifier.trim()))
        .first(&mut conn)?;
    let company: Company = companies::table.find(document.company_id).first(&mut conn)?;

    Ok(Json(VerificationResponse {
        unique_identifier: document.unique_identifier,
        document_hash: document.document_hash,
        title: document.title,
        company_name: company.name,
        issued_date: document.issued_date,
        issued_at: document.created_at.and_utc().to_rfc3339(),
    }))
}
