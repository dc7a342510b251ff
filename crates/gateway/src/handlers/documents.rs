//! Document handlers
//!
//! Documents are metadata records pointing at a stored file; the bytes
//! live wherever `file_url` points.

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::{clean, log_fan_out_failure, required, MessageResponse};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::AppState;
use casefile_common::{
    auth::{AuthUser, MaybeAuthUser, Viewer},
    db::models::{Case, Document, DocumentType, NotificationType, UserRole},
    db::{DocumentFilter, DocumentUpdateFields, NewDocument, Page, Pagination, Repository},
    errors::{AppError, Result},
    notifications::Announcement,
};

const DEFAULT_LIMIT: u64 = 20;

/// Largest accepted file, 50 MiB
pub const MAX_FILE_SIZE: i64 = 50 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct ListDocumentsQuery {
    pub case_id: Option<Uuid>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<Document>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: String,

    pub description: Option<String>,

    pub case_id: Uuid,

    pub document_type: DocumentType,

    #[validate(length(min = 1, max = 255))]
    pub file_name: String,

    #[validate(url)]
    pub file_url: String,

    #[validate(length(min = 1, max = 100))]
    pub file_type: String,

    #[validate(range(min = 1, max = MAX_FILE_SIZE))]
    pub file_size: i64,

    #[serde(default)]
    pub is_public: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDocumentRequest {
    #[validate(length(min = 1, max = 300))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub document_type: Option<DocumentType>,
    pub is_public: Option<bool>,
}

async fn find_document(repo: &Repository, id: Uuid) -> Result<Document> {
    repo.find_document_by_id(id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
}

async fn parent_case(repo: &Repository, document: &Document) -> Result<Case> {
    repo.find_case_by_id(document.case_id)
        .await?
        .ok_or_else(|| AppError::CaseNotFound {
            id: document.case_id.to_string(),
        })
}

/// Document, when the viewer may see it
async fn visible_document(repo: &Repository, id: Uuid, viewer: &Viewer) -> Result<Document> {
    let document = find_document(repo, id).await?;
    let case = parent_case(repo, &document).await?;

    if !viewer.can_view(document.is_public, case.journalist_id) {
        return Err(AppError::forbidden("This document is not public"));
    }
    Ok(document)
}

/// Document the signed-in user may change
async fn editable_document(repo: &Repository, id: Uuid, user: &AuthUser) -> Result<Document> {
    let document = find_document(repo, id).await?;
    let case = parent_case(repo, &document).await?;

    if !user.viewer().can_edit_case(case.journalist_id) {
        return Err(AppError::forbidden(
            "Only the owning journalist or staff can change this document",
        ));
    }
    Ok(document)
}

/// ASCII-only filename for the Content-Disposition hint
fn download_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AppError::Internal {
        message: format!("Invalid header value: {}", e),
    })
}

/// List documents visible to the caller
pub async fn list_documents(
    State(state): State<AppState>,
    user: AuthUser,
    ApiQuery(query): ApiQuery<ListDocumentsQuery>,
) -> Result<Json<DocumentListResponse>> {
    let page = Page::new(query.page, query.limit, DEFAULT_LIMIT);
    let filter = DocumentFilter {
        case_id: query.case_id,
    };

    let (documents, total) = state
        .repo()
        .list_documents(&filter, &user.viewer(), page)
        .await?;

    Ok(Json(DocumentListResponse {
        documents,
        pagination: page.pagination(total),
    }))
}

/// Attach a document to a case
pub async fn create_document(
    State(state): State<AppState>,
    user: AuthUser,
    ApiJson(req): ApiJson<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<Document>)> {
    user.require_role(&[UserRole::Journalist, UserRole::Admin], "upload documents")?;

    let repo = state.repo();
    let case = repo
        .find_case_by_id(req.case_id)
        .await?
        .ok_or_else(|| AppError::CaseNotFound {
            id: req.case_id.to_string(),
        })?;

    if !user.viewer().can_edit_case(case.journalist_id) {
        return Err(AppError::forbidden(
            "Documents can only be added to your own cases",
        ));
    }

    let document = repo
        .create_document(NewDocument {
            case_id: case.id,
            title: required(req.title, "title")?,
            description: clean(req.description),
            file_name: required(req.file_name, "file_name")?,
            file_url: req.file_url,
            file_type: required(req.file_type, "file_type")?,
            file_size: req.file_size,
            document_type: req.document_type,
            is_public: req.is_public,
            uploaded_by: user.user_id,
        })
        .await?;

    info!(
        document_id = %document.id,
        case_id = %case.id,
        file_size = document.file_size,
        "Document uploaded"
    );

    if document.is_public {
        let announcement = Announcement::new(
            NotificationType::DocumentUploaded,
            "New document",
            format!("\"{}\" was added to \"{}\"", document.title, case.title),
        )
        .with_data(json!({ "document_id": document.id, "document_title": document.title }));

        log_fan_out_failure(
            state
                .notifier
                .notify_case_subscribers(&case, &announcement)
                .await,
            "document_uploaded",
        );
    }

    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn get_document(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Document>> {
    let document = visible_document(&state.repo(), id, &Viewer::from(&user)).await?;
    Ok(Json(document))
}

pub async fn update_document(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateDocumentRequest>,
) -> Result<Json<Document>> {
    let repo = state.repo();
    let document = editable_document(&repo, id, &user).await?;

    let fields = DocumentUpdateFields {
        title: req.title.map(|t| required(t, "title")).transpose()?,
        description: req.description,
        document_type: req.document_type,
        is_public: req.is_public,
    };

    let updated = repo.update_document(document, fields).await?;
    info!(document_id = %updated.id, "Document updated");

    Ok(Json(updated))
}

pub async fn delete_document(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<MessageResponse>> {
    let repo = state.repo();
    let document = editable_document(&repo, id, &user).await?;

    if !repo.delete_document(document.id).await? {
        return Err(AppError::DocumentNotFound { id: id.to_string() });
    }

    info!(document_id = %id, user_id = %user.user_id, "Document deleted");
    Ok(Json(MessageResponse::new("Document deleted")))
}

/// Redirect to the stored file
pub async fn download_document(
    State(state): State<AppState>,
    user: MaybeAuthUser,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response> {
    let document = visible_document(&state.repo(), id, &Viewer::from(&user)).await?;

    let location = header_value(&document.file_url)?;
    let disposition = header_value(&format!(
        "attachment; filename=\"{}\"",
        download_filename(&document.file_name)
    ))?;

    Ok((
        StatusCode::TEMPORARY_REDIRECT,
        [(header::LOCATION, location), (header::CONTENT_DISPOSITION, disposition)],
    )
        .into_response())
}
