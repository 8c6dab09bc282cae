use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Employee, NewEmployee},
    schema::employees,
    state::AppState,
};

use super::companies::load_owned_company;

#[derive(Deserialize)]
pub struct EmployeeListQuery {
    pub company_id: Uuid,
}

#[derive(Deserialize)]
pub struct CreateEmployeeRequest {
    pub company_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
}

#[derive(Serialize)]
pub struct EmployeeResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub created_at: String,
}

impl From<Employee> for EmployeeResponse {
    fn from(employee: Employee) -> Self {
        Self {
            id: employee.id,
            company_id: employee.company_id,
            user_id: employee.user_id,
            first_name: employee.first_name,
            last_name: employee.last_name,
            email: employee.email,
            phone: employee.phone,
            position: employee.position,
            created_at: employee.created_at.and_utc().to_rfc3339(),
        }
    }
}

pub async fn list_employees(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<EmployeeListQuery>,
) -> AppResult<Json<Vec<EmployeeResponse>>> {
    let mut conn = state.db()?;
    load_owned_company(&mut conn, &user, query.company_id)?;

    let rows: Vec<Employee> = employees::table
        .filter(employees::company_id.eq(query.company_id))
        .order((employees::last_name.asc(), employees::first_name.asc()))
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(EmployeeResponse::from).collect()))
}

pub async fn create_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateEmployeeRequest>,
) -> AppResult<(StatusCode, Json<EmployeeResponse>)> {
    if payload.first_name.trim().is_empty()
        || payload.last_name.trim().is_empty()
        || payload.email.trim().is_empty()
    {
        return Err(AppError::bad_request(
            "first_name, last_name and email are required",
        ));
    }

    let mut conn = state.db()?;
    load_owned_company(&mut conn, &user, payload.company_id)?;

    let new_employee = NewEmployee {
        id: Uuid::new_v4(),
        company_id: payload.company_id,
        user_id: None,
        first_name: payload.first_name.trim().to_string(),
        last_name: payload.last_name.trim().to_string(),
        email: payload.email.trim().to_lowercase(),
        phone: payload.phone,
        position: payload.position,
    };

    let employee: Employee = diesel::insert_into(employees::table)
        .values(&new_employee)
        .get_result(&mut conn)?;

    Ok((StatusCode::CREATED, Json(employee.into())))
}

pub async fn get_employee(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(employee_id): Path<Uuid>,
) -> AppResult<Json<EmployeeResponse>> {
    let mut conn = state.db()?;
    let employee: Employee = employees::table.find(employee_id).first(&mut conn)?;
    load_owned_company(&mut conn, &user, employee.company_id)?;
    Ok(Json(employee.into()))
}
