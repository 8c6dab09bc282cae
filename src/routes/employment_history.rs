use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Employee, EmploymentRecord, NewEmploymentRecord},
    schema::{employees, employment_history},
    state::AppState,
};

use super::companies::load_owned_company;

#[derive(Deserialize)]
pub struct RecordListQuery {
    pub employee_id: Uuid,
}

#[derive(Deserialize)]
pub struct CreateRecordRequest {
    pub employee_id: Uuid,
    pub position: String,
    pub department: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub company_id: Uuid,
    pub position: String,
    pub department: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub record_hash: String,
    pub created_at: String,
}

impl From<EmploymentRecord> for RecordResponse {
    fn from(record: EmploymentRecord) -> Self {
        Self {
            id: record.id,
            employee_id: record.employee_id,
            company_id: record.company_id,
            position: record.position,
            department: record.department,
            start_date: record.start_date,
            end_date: record.end_date,
            description: record.description,
            record_hash: record.record_hash,
            created_at: record.created_at.and_utc().to_rfc3339(),
        }
    }
}

/// Fingerprint of the record's content. A random salt keeps two identical
/// employment stints from colliding on the unique hash column.
fn record_hash(request: &CreateRecordRequest, company_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.employee_id.as_bytes());
    hasher.update(company_id.as_bytes());
    hasher.update(request.position.as_bytes());
    if let Some(department) = &request.department {
        hasher.update(department.as_bytes());
    }
    hasher.update(request.start_date.to_string().as_bytes());
    if let Some(end_date) = request.end_date {
        hasher.update(end_date.to_string().as_bytes());
    }
    if let Some(description) = &request.description {
        hasher.update(description.as_bytes());
    }
    hasher.update(Uuid::new_v4().as_bytes());
    hex::encode(hasher.finalize())
}

pub async fn list_records(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<RecordListQuery>,
) -> AppResult<Json<Vec<RecordResponse>>> {
    let mut conn = state.db()?;
    let employee: Employee = employees::table.find(query.employee_id).first(&mut conn)?;
    load_owned_company(&mut conn, &user, employee.company_id)?;

    let rows: Vec<EmploymentRecord> = employment_history::table
        .filter(employment_history::employee_id.eq(query.employee_id))
        .order(employment_history::start_date.desc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(RecordResponse::from).collect()))
}

pub async fn create_record(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateRecordRequest>,
) -> AppResult<(StatusCode, Json<RecordResponse>)> {
    if payload.position.trim().is_empty() {
        return Err(AppError::bad_request("position is required"));
    }
    if let Some(end_date) = payload.end_date {
        if end_date < payload.start_date {
            return Err(AppError::bad_request("end_date must not precede start_date"));
        }
    }

    let mut conn = state.db()?;
    let employee: Employee = employees::table.find(payload.employee_id).first(&mut conn)?;
    load_owned_company(&mut conn, &user, employee.company_id)?;

    let new_record = NewEmploymentRecord {
        id: Uuid::new_v4(),
        employee_id: payload.employee_id,
        company_id: employee.company_id,
        position: payload.position.trim().to_string(),
        department: payload
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        start_date: payload.start_date,
        end_date: payload.end_date,
        description: payload.description.clone(),
        record_hash: record_hash(&payload, employee.company_id),
    };

    let record: EmploymentRecord = diesel::insert_into(employment_history::table)
        .values(&new_record)
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(record.into())))
}
