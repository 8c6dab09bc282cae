use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Company, Document, NewCompany},
    schema::{companies, documents},
    state::AppState,
};

use super::documents::DocumentResponse;

const COMPANY_DOCUMENTS_CACHE_TTL: Duration = Duration::from_secs(300);

pub fn company_documents_cache_key(company_id: Uuid) -> String {
    format!("company_documents_{company_id}")
}

pub async fn invalidate_company_documents(state: &AppState, company_id: Uuid) {
    state
        .cache
        .delete(&company_documents_cache_key(company_id))
        .await;
}

#[derive(Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub registration_number: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
}

#[derive(Serialize)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    pub registration_number: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub owner_id: Uuid,
    pub created_at: String,
}

impl From<Company> for CompanyResponse {
    fn from(company: Company) -> Self {
        Self {
            id: company.id,
            name: company.name,
            registration_number: company.registration_number,
            address: company.address,
            city: company.city,
            country: company.country,
            contact_email: company.contact_email,
            contact_phone: company.contact_phone,
            owner_id: company.owner_id,
            created_at: company.created_at.and_utc().to_rfc3339(),
        }
    }
}

/// Loads a company the caller may act on. Admins see everything, other users
/// only companies they own.
pub fn load_owned_company(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    company_id: Uuid,
) -> AppResult<Company> {
    let company: Company = companies::table.find(company_id).first(conn)?;
    if user.user_type != "admin" && company.owner_id != user.user_id {
        return Err(AppError::not_found());
    }
    Ok(company)
}

pub async fn list_companies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<CompanyResponse>>> {
    let mut conn = state.db()?;

    let rows: Vec<Company> = if user.user_type == "admin" {
        companies::table
            .order(companies::created_at.desc())
            .load(&mut conn)?
    } else {
        companies::table
            .filter(companies::owner_id.eq(user.user_id))
            .order(companies::created_at.desc())
            .load(&mut conn)?
    };

    Ok(Json(rows.into_iter().map(CompanyResponse::from).collect()))
}

pub async fn create_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<CompanyResponse>)> {
    if payload.name.trim().is_empty() || payload.registration_number.trim().is_empty() {
        return Err(AppError::bad_request(
            "name and registration_number are required",
        ));
    }

    let new_company = NewCompany {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        registration_number: payload.registration_number.trim().to_string(),
        address: payload.address,
        city: payload.city,
        country: payload.country,
        contact_email: payload.contact_email,
        contact_phone: payload.contact_phone,
        owner_id: user.user_id,
    };

    let mut conn = state.db()?;
    let company: Company = diesel::insert_into(companies::table)
        .values(&new_company)
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(company.into())))
}

pub async fn get_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<CompanyResponse>> {
    let mut conn = state.db()?;
    let company = load_owned_company(&mut conn, &user, company_id)?;
    Ok(Json(company.into()))
}

pub async fn update_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> AppResult<Json<CompanyResponse>> {
    let mut conn = state.db()?;
    let company = load_owned_company(&mut conn, &user, company_id)?;

    let no_changes = payload.name.is_none()
        && payload.address.is_none()
        && payload.city.is_none()
        && payload.country.is_none()
        && payload.contact_email.is_none()
        && payload.contact_phone.is_none();
    if no_changes {
        return Ok(Json(company.into()));
    }

    let updated: Company = diesel::update(companies::table.find(company.id))
        .set((
            payload
                .name
                .as_deref()
                .map(|v| companies::name.eq(v.trim().to_string())),
            payload.address.map(|v| companies::address.eq(Some(v))),
            payload.city.map(|v| companies::city.eq(Some(v))),
            payload.country.map(|v| companies::country.eq(Some(v))),
            payload
                .contact_email
                .map(|v| companies::contact_email.eq(Some(v))),
            payload
                .contact_phone
                .map(|v| companies::contact_phone.eq(Some(v))),
        ))
        .get_result(&mut conn)?;

    invalidate_company_documents(&state, company.id).await;
    Ok(Json(updated.into()))
}

pub async fn delete_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    let company = load_owned_company(&mut conn, &user, company_id)?;

    diesel::delete(companies::table.find(company.id)).execute(&mut conn)?;
    invalidate_company_documents(&state, company.id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// Documents issued by a company, newest first. Responses are cached for five
/// minutes; issuing a document invalidates the entry.
pub async fn list_company_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(company_id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let cache_key = company_documents_cache_key(company_id);

    let mut conn = state.db()?;
    load_owned_company(&mut conn, &user, company_id)?;

    if let Some(cached) = state.cache.get(&cache_key).await {
        if let Ok(responses) = serde_json::from_str::<Vec<DocumentResponse>>(&cached) {
            debug!(%company_id, "serving company documents from cache");
            return Ok(Json(responses));
        }
    }

    let rows: Vec<Document> = documents::table
        .filter(documents::company_id.eq(company_id))
        .order(documents::created_at.desc())
        .load(&mut conn)?;

    let responses: Vec<DocumentResponse> =
        rows.into_iter().map(DocumentResponse::from).collect();

    if let Ok(serialized) = serde_json::to_string(&responses) {
        state
            .cache
            .set(&cache_key, serialized, COMPANY_DOCUMENTS_CACHE_TTL)
            .await;
    }

    Ok(Json(responses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Cache, MemoryCache};

    #[tokio::test]
    async fn company_documents_round_trip_through_the_cache() {
        let cache = MemoryCache::new();
        let key = company_documents_cache_key(Uuid::nil());
        cache
            .set(&key, "[]".to_string(), COMPANY_DOCUMENTS_CACHE_TTL)
            .await;
        assert_eq!(cache.get(&key).await.as_deref(), Some("[]"));

        cache.delete(&key).await;
        assert_eq!(cache.get(&key).await, None);
    }
}
