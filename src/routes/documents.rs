use std::time::Duration;

use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::identity;
use crate::models::{Document, DocumentCopy, NewDocument, NewDocumentCopy};
use crate::schema::{document_copies, documents, employees, employment_history};
use crate::stamp;
use crate::state::AppState;
use crate::storage::{copy_key, document_key, inline_disposition};

use super::companies::{invalidate_company_documents, load_owned_company};

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;

#[derive(Serialize, Deserialize, Clone)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub employee_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub document_hash: String,
    pub document_hash_previous: Option<String>,
    pub unique_identifier: String,
    pub copy_id: Uuid,
    pub issued_date: NaiveDate,
    pub is_signed: bool,
    pub created_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            company_id: document.company_id,
            employee_id: document.employee_id,
            title: document.title,
            description: document.description,
            content_type: document.content_type,
            size_bytes: document.size_bytes,
            document_hash: document.document_hash,
            document_hash_previous: document.document_hash_previous,
            unique_identifier: document.unique_identifier,
            copy_id: document.copy_id,
            issued_date: document.issued_date,
            is_signed: document.is_signed,
            created_at: document.created_at.and_utc().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
}

#[derive(Deserialize, Default)]
pub struct CreateCopyRequest {
    pub employment_history_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct DocumentCopyResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub employment_history_id: Option<Uuid>,
    pub copy_hash: String,
    pub created_at: String,
}

impl From<DocumentCopy> for DocumentCopyResponse {
    fn from(copy: DocumentCopy) -> Self {
        Self {
            id: copy.id,
            document_id: copy.document_id,
            employment_history_id: copy.employment_history_id,
            copy_hash: copy.copy_hash,
            created_at: copy.created_at.and_utc().to_rfc3339(),
        }
    }
}

struct UploadRequest {
    bytes: Vec<u8>,
    company_id: Uuid,
    employee_id: Uuid,
    title: String,
    description: Option<String>,
    issued_date: NaiveDate,
}

pub async fn upload_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;
    let mut company_id: Option<Uuid> = None;
    let mut employee_id: Option<Uuid> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut issued_date: Option<NaiveDate> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                original_name = field.file_name().map(|n| n.to_string());
                let data = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(format!("failed to read file bytes: {err}"))
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("company_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid company id: {err}")))?;
                company_id = Some(
                    Uuid::parse_str(value.trim())
                        .map_err(|_| AppError::bad_request("company_id must be a valid UUID"))?,
                );
            }
            Some("employee_id") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(format!("invalid employee id: {err}")))?;
                employee_id = Some(
                    Uuid::parse_str(value.trim())
                        .map_err(|_| AppError::bad_request("employee_id must be a valid UUID"))?,
                );
            }
            Some("issued_date") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid issued_date field: {err}"))
                })?;
                if !value.trim().is_empty() {
                    issued_date =
                        Some(NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(
                            |_| AppError::bad_request("issued_date must be YYYY-MM-DD"),
                        )?);
                }
            }
            Some("title") => {
                title = Some(field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid title field: {err}"))
                })?);
            }
            Some("description") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("invalid description field: {err}"))
                })?;
                if !value.trim().is_empty() {
                    description = Some(value);
                }
            }
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| AppError::bad_request("file field is required"))?;
    if file_bytes.is_empty() {
        return Err(AppError::bad_request("file field must not be empty"));
    }
    let company_id =
        company_id.ok_or_else(|| AppError::bad_request("company_id field is required"))?;
    let employee_id =
        employee_id.ok_or_else(|| AppError::bad_request("employee_id field is required"))?;
    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .or(original_name)
        .ok_or_else(|| AppError::bad_request("title or filename is required"))?;

    let request = UploadRequest {
        bytes: file_bytes,
        company_id,
        employee_id,
        title,
        description,
        issued_date: issued_date.unwrap_or_else(|| Utc::now().date_naive()),
    };

    let document = issue_document(&state, request, &user).await?;
    info!(
        document_id = %document.id,
        company_id = %document.company_id,
        document_hash = %document.document_hash,
        unique_identifier = %document.unique_identifier,
        "document issued"
    );

    Ok((StatusCode::CREATED, Json(document.into())))
}

/// Issues a document: derives its identity fields exactly once, chains it to
/// the company's latest document, stamps the PDF and persists file and row.
/// The stamp happens before any persistence, so a malformed PDF aborts the
/// whole operation.
async fn issue_document(
    state: &AppState,
    request: UploadRequest,
    user: &AuthenticatedUser,
) -> AppResult<Document> {
    let mut conn = state.db()?;
    load_owned_company(&mut conn, user, request.company_id)?;

    let employee_company: Uuid = employees::table
        .find(request.employee_id)
        .select(employees::company_id)
        .first(&mut conn)?;
    if employee_company != request.company_id {
        return Err(AppError::bad_request(
            "employee does not belong to this company",
        ));
    }

    let identity = identity::document_identity(&mut conn, &request.bytes, request.company_id)?;

    let stamped = stamp::stamp_document(
        &request.bytes,
        &identity.document_hash,
        &identity.unique_identifier,
    )?;
    let size_bytes = stamped.len() as i64;

    let s3_key = document_key(request.company_id, &identity.document_hash);
    state
        .storage
        .put_object(
            &s3_key,
            stamped,
            "application/pdf",
            Some(inline_disposition(&format!("{}.pdf", request.title))),
        )
        .await?;

    let new_document = NewDocument {
        id: Uuid::new_v4(),
        company_id: request.company_id,
        employee_id: request.employee_id,
        uploaded_by: user.user_id,
        title: request.title,
        description: request.description,
        s3_key: s3_key.clone(),
        content_type: "application/pdf".to_string(),
        size_bytes,
        document_hash: identity.document_hash,
        document_hash_previous: identity.document_hash_previous,
        unique_identifier: identity.unique_identifier,
        copy_id: identity.copy_id,
        issued_date: request.issued_date,
        is_signed: false,
    };

    let document: Document = match diesel::insert_into(documents::table)
        .values(&new_document)
        .get_result(&mut conn)
    {
        Ok(document) => document,
        Err(err) => {
            // the commit lost; remove the orphaned object best-effort
            if let Err(cleanup) = state.storage.delete_object(&s3_key).await {
                error!(error = ?cleanup, key = %s3_key, "failed to remove orphaned upload");
            }
            if let diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                _,
            ) = err
            {
                return Err(AppError::conflict(
                    "a document with this hash already exists",
                ));
            }
            return Err(AppError::from(err));
        }
    };

    invalidate_company_documents(state, document.company_id).await;
    Ok(document)
}

/// Loads a document the caller may act on, via ownership of its company.
fn load_owned_document(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    document_id: Uuid,
) -> AppResult<Document> {
    let document: Document = documents::table.find(document_id).first(conn)?;
    load_owned_company(conn, user, document.company_id)?;
    Ok(document)
}

pub async fn get_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document = load_owned_document(&mut conn, &user, document_id)?;
    Ok(Json(document.into()))
}

pub async fn get_document_by_identifier(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(identifier): Path<String>,
) -> AppResult<Json<DocumentResponse>> {
    let mut conn = state.db()?;
    let document: Document = documents::table
        .filter(documents::unique_identifier.eq(identifier.trim()))
        .first(&mut conn)?;
    load_owned_company(&mut conn, &user, document.company_id)?;
    Ok(Json(document.into()))
}

pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let mut conn = state.db()?;
    let document = load_owned_document(&mut conn, &user, document_id)?;

    let url = state
        .storage
        .presign_get_object(
            &document.s3_key,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
        )
        .await?;

    Ok(Json(DocumentDownloadResponse {
        url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
        filename: format!("{}.pdf", document.title),
        content_type: document.content_type,
        size_bytes: document.size_bytes,
    }))
}

/// Materializes an authorized copy of the stored (already stamped) document.
/// The copy shares the original's bytes and stamp but carries its own hash,
/// derived from the content plus the copy row's id.
pub async fn create_copy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
    payload: Option<Json<CreateCopyRequest>>,
) -> AppResult<(StatusCode, Json<DocumentCopyResponse>)> {
    let Json(payload) = payload.unwrap_or_default();

    let mut conn = state.db()?;
    let document = load_owned_document(&mut conn, &user, document_id)?;

    if let Some(record_id) = payload.employment_history_id {
        let record_company: Uuid = employment_history::table
            .find(record_id)
            .select(employment_history::company_id)
            .first(&mut conn)?;
        if record_company != document.company_id {
            return Err(AppError::bad_request(
                "employment record does not belong to this company",
            ));
        }
    }

    let bytes = state.storage.get_object(&document.s3_key).await?;
    let copy_row_id = Uuid::new_v4();
    let copy_hash = copy_content_hash(&bytes, copy_row_id);
    let s3_key = copy_key(&document.document_hash, copy_row_id);

    state
        .storage
        .put_object(
            &s3_key,
            bytes,
            "application/pdf",
            Some(inline_disposition(&format!("{}-copy.pdf", document.title))),
        )
        .await?;

    let new_copy = NewDocumentCopy {
        id: copy_row_id,
        document_id: document.id,
        employment_history_id: payload.employment_history_id,
        copy_hash,
        s3_key,
        requested_by: user.user_id,
    };

    let copy: DocumentCopy = diesel::insert_into(document_copies::table)
        .values(&new_copy)
        .get_result(&mut conn)?;

    info!(
        document_id = %document.id,
        copy_id = %copy.id,
        "document copy created"
    );

    Ok((StatusCode::CREATED, Json(copy.into())))
}

pub async fn list_copies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Vec<DocumentCopyResponse>>> {
    let mut conn = state.db()?;
    let document = load_owned_document(&mut conn, &user, document_id)?;

    let rows: Vec<DocumentCopy> = document_copies::table
        .filter(document_copies::document_id.eq(document.id))
        .order(document_copies::created_at.desc())
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter().map(DocumentCopyResponse::from).collect(),
    ))
}

/// Copies are byte-identical to their original, so the copy hash mixes the
/// copy's own id into the digest to stay unique per copy.
fn copy_content_hash(bytes: &[u8], copy_row_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update(copy_row_id.as_bytes());
    hex::encode(hasher.finalize())
}
