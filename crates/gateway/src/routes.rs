//! Route handlers. Every handler here runs behind the auth middleware and
//! reads the caller from the `UserId` extension.

use crate::SharedState;
use crate::error::ApiError;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::{Extension, Json};
use diarist_core::auth::UserId;
use diarist_core::chat::ChatExchange;
use diarist_core::journal::{ContentBlock, DateId, EntryDraft, EntrySummary, JournalEntry};
use diarist_core::media::Upload;
use diarist_core::persona::Persona;
use diarist_core::profile::VirtualProfile;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Upper bound for `GET /history/{persona}?limit=`.
pub const MAX_HISTORY_PAGE: usize = 200;

// --- Conversation ---

#[derive(Debug, Deserialize)]
pub struct ConversationRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "chat_id")]
    pub thread_id: Option<String>,
    /// Entry text the user currently has open.
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationResponse {
    pub response: String,
    pub persona: Persona,
}

pub async fn converse(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
    Path(persona): Path<String>,
    req: Request,
) -> Result<Json<ConversationResponse>, ApiError> {
    let persona: Persona = persona.parse()?;
    let Json(body) = Json::<ConversationRequest>::from_request(req, &state)
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;

    let reply = state
        .conversation
        .handle(&user, persona, &body.message, body.thread_id, body.context.as_deref())
        .await?;

    Ok(Json(ConversationResponse {
        response: reply.response,
        persona: reply.persona,
    }))
}

// --- History ---

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub persona: Persona,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Serialize)]
pub struct HistoryMessage {
    pub id: Option<String>,
    #[serde(flatten)]
    pub exchange: ChatExchange,
}

pub async fn history(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
    Path(persona): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let persona: Persona = persona.parse()?;
    let limit = params
        .limit
        .unwrap_or(state.history_page_size)
        .clamp(1, MAX_HISTORY_PAGE);

    let messages = state
        .history
        .recent(&user, persona, limit)
        .await?
        .into_iter()
        .map(|exchange| HistoryMessage {
            id: exchange.id.clone(),
            exchange,
        })
        .collect();

    Ok(Json(HistoryResponse { persona, messages }))
}

// --- Entries ---

/// JSON form of a save. `blocks` may arrive as an array or as a JSON-encoded
/// string, the way multipart clients send it.
#[derive(Debug, Default, Deserialize)]
pub struct EntryPayload {
    #[serde(default)]
    pub date_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default, deserialize_with = "blocks_field")]
    pub blocks: Option<Vec<ContentBlock>>,
}

impl EntryPayload {
    fn into_draft(self) -> (String, EntryDraft) {
        let draft = EntryDraft {
            title: self.title,
            blocks: self.blocks,
            theme: self.theme,
            font: self.font,
        };
        (self.date_id, draft)
    }
}

fn blocks_field<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<ContentBlock>>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => parse_blocks(&s).map_err(serde::de::Error::custom),
        Some(other) => serde_json::from_value(other).map(Some).map_err(serde::de::Error::custom),
    }
}

fn parse_blocks(raw: &str) -> Result<Option<Vec<ContentBlock>>, String> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| format!("blocks is not a valid block list: {e}"))
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub date_id: DateId,
    pub blocks_saved: usize,
    pub message: &'static str,
}

pub async fn save_entry(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
    req: Request,
) -> Result<(StatusCode, Json<SaveResponse>), ApiError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let (payload, uploads) = if is_multipart {
        let multipart = Multipart::from_request(req, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        read_multipart(multipart).await?
    } else {
        let Json(payload) = Json::<EntryPayload>::from_request(req, &state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        (payload, Vec::new())
    };

    let (date_id, draft) = payload.into_draft();
    let outcome = state.entries.save(&user, &date_id, draft, uploads).await?;

    Ok((
        StatusCode::CREATED,
        Json(SaveResponse {
            date_id: outcome.date_id,
            blocks_saved: outcome.blocks_saved,
            message: "Entry saved successfully",
        }),
    ))
}

/// Text fields fill the payload; `file_{i}` parts become uploads.
async fn read_multipart(mut multipart: Multipart) -> Result<(EntryPayload, Vec<Upload>), ApiError> {
    let mut payload = EntryPayload::default();
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name.starts_with("file_") {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Failed to read part {name}: {e}")))?;
            let mut upload = Upload::new(name, bytes.to_vec());
            upload.file_name = file_name;
            upload.content_type = content_type;
            uploads.push(upload);
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read field {name}: {e}")))?;
        match name.as_str() {
            "date_id" => payload.date_id = text,
            "title" => payload.title = Some(text),
            "theme" => payload.theme = Some(text),
            "font" => payload.font = Some(text),
            "blocks" => payload.blocks = parse_blocks(&text).map_err(ApiError::bad_request)?,
            other => debug!(field = %other, "Ignoring unknown multipart field"),
        }
    }

    Ok((payload, uploads))
}

pub async fn list_entries(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
) -> Result<Json<Vec<EntrySummary>>, ApiError> {
    Ok(Json(state.entries.entries().list_entries(&user).await?))
}

pub async fn get_entry(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
    Path(date_id): Path<String>,
) -> Result<Json<JournalEntry>, ApiError> {
    let date_id = DateId::parse(&date_id)?;
    Ok(Json(state.entries.entries().get_entry(&user, &date_id).await?))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn delete_entry(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
    Path(date_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let date_id = DateId::parse(&date_id)?;
    state.entries.entries().delete_entry(&user, &date_id).await?;
    info!(user = %user, date_id = %date_id, "Entry deleted");
    Ok(Json(MessageResponse {
        message: "Entry deleted successfully",
    }))
}

// --- Profile ---

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub analysis: VirtualProfile,
    pub message: &'static str,
}

pub async fn analyze_now(
    State(state): State<SharedState>,
    Extension(user): Extension<UserId>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let analysis = state.analyzer.derive_and_store_profile(&user).await?;
    Ok(Json(AnalysisResponse {
        analysis,
        message: "Profile analysis completed",
    }))
}
