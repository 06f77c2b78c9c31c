use crate::{
    conversation::ConversationPair,
    error::AppError,
    middleware::Viewer,
    models::{Message, NewMessage, Profile},
    reconciler::{ConversationView, DeliveryReconciler, Source},
    state::AppState,
};
use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Sent by the requesting viewer
    pub is_own: bool,
}

impl MessageResponse {
    fn for_viewer(message: Message, viewer: Uuid) -> Self {
        Self {
            is_own: ConversationView::is_own(&message, viewer),
            id: message.id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CounterpartResponse {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_initial: Option<char>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub counterpart: CounterpartResponse,
    pub messages: Vec<MessageResponse>,
}

/// GET /api/v1/conversations/{counterpart_id}/messages
/// Full history between the viewer and the counterpart, oldest first
#[get("/api/v1/conversations/{counterpart_id}/messages")]
pub async fn get_history(
    state: web::Data<AppState>,
    viewer: Viewer,
    counterpart_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let pair = ConversationPair::resolve(viewer.id, counterpart_id.into_inner())?;

    let (history, profile) = tokio::join!(
        state.store.fetch_history(&pair),
        state.store.find_profile(pair.counterpart()),
    );
    let history = history.map_err(|e| AppError::HistoryFetchFailed(e.to_string()))?;
    let profile = profile.unwrap_or_else(|e| {
        tracing::warn!(counterpart_id = %pair.counterpart(), error = %e, "Counterpart profile unavailable");
        None
    });

    let mut reconciler = DeliveryReconciler::new(pair);
    reconciler.accept_all(history, Source::History);

    let profile = profile.unwrap_or(Profile {
        id: pair.counterpart(),
        full_name: None,
    });

    let messages = reconciler
        .view()
        .messages()
        .iter()
        .cloned()
        .map(|m| MessageResponse::for_viewer(m, viewer.id))
        .collect();

    Ok(HttpResponse::Ok().json(HistoryResponse {
        counterpart: CounterpartResponse {
            id: profile.id,
            display_name: profile.display_name().to_string(),
            avatar_initial: profile.avatar_initial(),
        },
        messages,
    }))
}

/// POST /api/v1/conversations/{counterpart_id}/messages
/// Store a message from the viewer; the change feed carries it to the counterpart.
#[post("/api/v1/conversations/{counterpart_id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    viewer: Viewer,
    counterpart_id: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let pair = ConversationPair::resolve(viewer.id, counterpart_id.into_inner())?;
    let message = NewMessage::parse(pair.viewer(), pair.counterpart(), &body.content)?;

    let row = state.store.insert(message).await.map_err(|e| match e {
        AppError::BadRequest(_) => e,
        other => AppError::SendFailed(other.to_string()),
    })?;

    tracing::info!(
        message_id = %row.id,
        sender_id = %row.sender_id,
        receiver_id = %row.receiver_id,
        "Message sent"
    );

    Ok(HttpResponse::Created().json(MessageResponse::for_viewer(row, viewer.id)))
}
