use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: String,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_created_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub user_type: String,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub verification_token_created_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = companies)]
#[diesel(belongs_to(User, foreign_key = owner_id))]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub registration_number: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub owner_id: Uuid,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub name: String,
    pub registration_number: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub owner_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = employees)]
#[diesel(belongs_to(Company))]
pub struct Employee {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employees)]
pub struct NewEmployee {
    pub id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = employment_history)]
#[diesel(belongs_to(Employee))]
pub struct EmploymentRecord {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub company_id: Uuid,
    pub position: String,
    pub department: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub record_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = employment_history)]
pub struct NewEmploymentRecord {
    pub id: Uuid,
    pub employee_id: Uuid,
    pub company_id: Uuid,
    pub position: String,
    pub department: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub record_hash: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Company))]
pub struct Document {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub uploaded_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub s3_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub document_hash: String,
    pub document_hash_previous: Option<String>,
    pub unique_identifier: String,
    pub copy_id: Uuid,
    pub issued_date: NaiveDate,
    pub is_signed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub uploaded_by: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub s3_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub document_hash: String,
    pub document_hash_previous: Option<String>,
    pub unique_identifier: String,
    pub copy_id: Uuid,
    pub issued_date: NaiveDate,
    pub is_signed: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = document_copies)]
#[diesel(belongs_to(Document))]
pub struct DocumentCopy {
    pub id: Uuid,
    pub document_id: Uuid,
    pub employment_history_id: Option<Uuid>,
    pub copy_hash: String,
    pub s3_key: String,
    pub requested_by: Uuid,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_copies)]
pub struct NewDocumentCopy {
    pub id: Uuid,
    pub document_id: Uuid,
    pub employment_history_id: Option<Uuid>,
    pub copy_hash: String,
    pub s3_key: String,
    pub requested_by: Uuid,
}
