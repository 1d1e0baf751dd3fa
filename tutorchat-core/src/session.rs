//! One chat turn end-to-end: shape the request, drive the SSE loop, persist
//! the finished message.
//!
//! Contract:
//! - A session processes one turn at a time, strictly in chunk arrival order.
//! - Exactly one user row and one assistant row are written per successful
//!   turn; zero rows on any failure.
//! - The conversation row is created lazily, on the first successful turn.
//! - The phase always returns to `Idle`, whatever the exit path.
//! - Dropping the `send_turn` future cancels the turn: no further chunks are
//!   read and the draft is discarded.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;

use crate::config::{Flow, PayloadShape};
use crate::error::{CoreResult, TutorChatError};
use crate::http_client::HttpClient;
use crate::model::{
    ChatMessage, Conversation, DraftSnapshot, ExpertiseLevel, Mode, NewConversation, NewMessage,
    Role, TurnOutcome,
};
use crate::normalizer;
use crate::reducer::{FinalDraft, MessageDraft, Step};
use crate::sse::{FrameDecoder, ParseOutcome, StreamEvent, parse_line};
use crate::store::ConversationStore;
use crate::telemetry::{self, TurnLog};

/// Everything a session needs besides the flow itself. The session id is an
/// explicit constructor parameter so turns correlate with backend-side
/// context without any ambient global.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub class_id: String,
    pub mode: Mode,
    pub cohort_id: Option<String>,
    pub lecture: Option<String>,
    pub expertise_level: Option<ExpertiseLevel>,
    pub session_id: String,
}

/// Uploaded file carried as context for the next turn, cleared once a turn
/// succeeds.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
    Finalizing,
}

/// Fresh per-visit session correlation id.
pub fn random_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug)]
pub struct ChatSession<S: ConversationStore> {
    http: HttpClient,
    flow: Arc<Flow>,
    store: Arc<S>,
    params: SessionParams,
    transcript: Vec<ChatMessage>,
    conversation: Option<Conversation>,
    attachment: Option<Attachment>,
    phase: Phase,
}

impl<S: ConversationStore> ChatSession<S> {
    pub fn new(
        http: HttpClient,
        flow: Arc<Flow>,
        store: Arc<S>,
        params: SessionParams,
    ) -> CoreResult<Self> {
        if params.class_id.trim().is_empty() {
            return Err(TutorChatError::Validation(
                "a course must be selected before chatting".to_string(),
            ));
        }
        if params.session_id.trim().is_empty() {
            return Err(TutorChatError::Validation(
                "session_id must not be empty".to_string(),
            ));
        }
        Ok(Self {
            http,
            flow,
            store,
            params,
            transcript: Vec::new(),
            conversation: None,
            attachment: None,
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn attach_file(&mut self, attachment: Option<Attachment>) {
        self.attachment = attachment;
    }

    /// Switch the session onto an existing conversation, replaying its
    /// messages into the outgoing transcript.
    pub async fn load_conversation(&mut self, conversation: Conversation) -> CoreResult<()> {
        let messages = self.store.load_messages(&conversation.id).await?;
        self.transcript = messages
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
            })
            .collect();
        self.conversation = Some(conversation);
        Ok(())
    }

    /// Start over: forget the transcript and active conversation. Passing a
    /// new session id isolates backend-side context from the previous course.
    pub fn reset(&mut self, new_session_id: Option<String>) {
        self.transcript.clear();
        self.conversation = None;
        self.attachment = None;
        if let Some(id) = new_session_id {
            self.params.session_id = id;
        }
    }

    /// Run one user turn. `on_snapshot` receives every UI-visible state of the
    /// growing assistant message; each snapshot replaces the previous one.
    pub async fn send_turn(
        &mut self,
        user_text: &str,
        on_snapshot: &mut dyn FnMut(DraftSnapshot),
    ) -> CoreResult<TurnOutcome> {
        if self.phase != Phase::Idle {
            return Err(TutorChatError::Validation(
                "a turn is already in flight".to_string(),
            ));
        }
        let cleaned = normalizer::clean_outgoing(user_text);
        if cleaned.is_empty() {
            return Err(TutorChatError::Validation(
                "message must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        self.phase = Phase::Sending;
        let result = self.run_turn(&cleaned, on_snapshot).await;
        // The loading state clears on every exit path, error or not.
        self.phase = Phase::Idle;

        let mut log = TurnLog::new()
            .flow(&self.flow.name)
            .session_id(&self.params.session_id)
            .latency_ms(started.elapsed().as_millis() as u64);
        match &result {
            Ok(outcome) => {
                self.transcript.push(ChatMessage {
                    role: Role::User,
                    content: outcome.user_message.content.clone(),
                });
                self.transcript.push(ChatMessage {
                    role: Role::Assistant,
                    content: outcome.assistant_message.content.clone(),
                });
                self.attachment = None;
                log = log
                    .conversation_id_opt(Some(&outcome.conversation.id))
                    .content_chars(outcome.assistant_message.content.chars().count() as u32)
                    .source_count(
                        outcome
                            .assistant_message
                            .sources
                            .as_ref()
                            .map_or(0, |s| s.len()) as u32,
                    )
                    .outcome("persisted");
                tracing::debug!(conversation = %outcome.conversation.id, "turn persisted");
            }
            Err(err) => {
                log = log.outcome(err.kind());
                tracing::warn!(error = %err, flow = %self.flow.name, "turn failed");
            }
        }
        telemetry::emit_turn(log);
        result
    }

    async fn run_turn(
        &mut self,
        user_text: &str,
        on_snapshot: &mut dyn FnMut(DraftSnapshot),
    ) -> CoreResult<TurnOutcome> {
        let body = self.build_body(user_text)?;
        let owned_headers = self.headers();
        let hdrs: Vec<(&str, &str)> = owned_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let resp = self
            .http
            .post_chat(&self.flow.cfg.chat_url, &body, &hdrs)
            .await?;

        self.phase = Phase::Streaming;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let final_draft =
            if content_type.contains("text/event-stream") || content_type.contains("text/plain") {
                drain_stream(resp, on_snapshot).await?
            } else {
                decode_json_fallback(resp).await?
            };

        self.phase = Phase::Finalizing;
        let (content, detected_level, calibration_topic) = match self.flow.cfg.shape {
            PayloadShape::Professor => {
                let cleaned = normalizer::strip_response_tags(&final_draft.content);
                (
                    cleaned.content,
                    cleaned.detected_level,
                    cleaned.calibration_topic,
                )
            }
            PayloadShape::Tutor => (final_draft.content, None, None),
        };

        let conversation = match &self.conversation {
            Some(c) => c.clone(),
            None => {
                let created = self
                    .store
                    .create_conversation(NewConversation {
                        title: normalizer::derive_title(user_text),
                        class_id: self.params.class_id.clone(),
                        mode: self.params.mode,
                    })
                    .await?;
                self.conversation = Some(created.clone());
                created
            }
        };
        let user_message = self
            .store
            .insert_message(NewMessage {
                conversation_id: conversation.id.clone(),
                role: Role::User,
                content: user_text.to_string(),
                sources: None,
            })
            .await?;
        let sources = (!final_draft.sources.is_empty()).then(|| final_draft.sources.clone());
        let assistant_message = self
            .store
            .insert_message(NewMessage {
                conversation_id: conversation.id.clone(),
                role: Role::Assistant,
                content,
                sources,
            })
            .await?;

        Ok(TurnOutcome {
            conversation,
            user_message,
            assistant_message,
            detected_level,
            calibration_topic,
        })
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut h = vec![(
            self.flow.cfg.key_header.name().to_string(),
            self.flow.api_key.expose_secret().to_string(),
        )];
        if self.flow.cfg.cohort_header
            && let Some(cohort) = &self.params.cohort_id
        {
            h.push(("x-cohort-id".to_string(), cohort.clone()));
        }
        h
    }

    fn build_body(&self, user_text: &str) -> CoreResult<Value> {
        // The wire message may carry file context; the persisted user message
        // never does.
        let wire_content = match (&self.flow.cfg.shape, &self.attachment) {
            (PayloadShape::Professor, Some(file)) => format!(
                "[CONTEXT FROM FILE: {}]\n{}\n\n[USER QUERY]\n{}",
                file.name, file.content, user_text
            ),
            _ => user_text.to_string(),
        };
        let mut messages = self.transcript.clone();
        messages.push(ChatMessage {
            role: Role::User,
            content: wire_content,
        });

        let value = match self.flow.cfg.shape {
            PayloadShape::Tutor => serde_json::to_value(TutorWireReq {
                messages: &messages,
                class_id: &self.params.class_id,
                persona: self.params.mode.as_str(),
                cohort_id: self.params.cohort_id.as_deref(),
                file_content: self.attachment.as_ref().map(|a| a.content.as_str()),
            }),
            PayloadShape::Professor => serde_json::to_value(ProfessorWireReq {
                messages: &messages,
                mode: self.params.mode.as_str(),
                selected_course: &self.params.class_id,
                selected_lecture: self.params.lecture.as_deref(),
                session_id: &self.params.session_id,
                cohort_id: self.params.cohort_id.as_deref(),
                expertise_level: self.params.expertise_level.map(|l| l.as_str()),
            }),
        };
        value.map_err(|e| TutorChatError::Other(e.into()))
    }
}

// ---- Wire structs ----

#[derive(Serialize)]
struct TutorWireReq<'a> {
    messages: &'a [ChatMessage],
    class_id: &'a str,
    persona: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cohort_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_content: Option<&'a str>,
}

#[derive(Serialize)]
struct ProfessorWireReq<'a> {
    messages: &'a [ChatMessage],
    mode: &'a str,
    #[serde(rename = "selectedCourse")]
    selected_course: &'a str,
    // Explicit null when no single lecture is selected.
    #[serde(rename = "selectedLecture")]
    selected_lecture: Option<&'a str>,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cohort_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expertise_level: Option<&'a str>,
}

fn apply_events(
    draft: &mut MessageDraft,
    events: Vec<StreamEvent>,
    on_snapshot: &mut dyn FnMut(DraftSnapshot),
) -> CoreResult<Step> {
    for event in events {
        match draft.apply(event)? {
            Step::Done => return Ok(Step::Done),
            Step::Continue(changed) => {
                if changed {
                    on_snapshot(draft.snapshot());
                }
            }
        }
    }
    Ok(Step::Continue(false))
}

/// Read the SSE body to completion, folding events into one draft.
async fn drain_stream(
    resp: reqwest::Response,
    on_snapshot: &mut dyn FnMut(DraftSnapshot),
) -> CoreResult<FinalDraft> {
    let mut byte_stream = resp.bytes_stream();
    let mut decoder = FrameDecoder::new();
    let mut draft = MessageDraft::new();

    'read: while let Some(chunk) = byte_stream.next().await {
        let chunk: bytes::Bytes = chunk.map_err(|e| {
            tracing::warn!(error = %e, "stream read failed");
            TutorChatError::send_failed()
        })?;
        decoder.push(&chunk);
        while let Some(line) = decoder.next_line() {
            match parse_line(&line) {
                ParseOutcome::NeedsMoreData(raw) => {
                    // The payload was cut mid-JSON: put the line back and wait
                    // for the next chunk to complete it.
                    decoder.requeue(&raw);
                    continue 'read;
                }
                ParseOutcome::Parsed(events) => {
                    if apply_events(&mut draft, events, on_snapshot)? == Step::Done {
                        return draft.finalize();
                    }
                }
            }
        }
    }

    // The connection closed without `[DONE]`: replay the residual buffer once
    // more. A payload still incomplete at this point is truly truncated and is
    // dropped.
    while let Some(line) = decoder.next_line() {
        if let ParseOutcome::Parsed(events) = parse_line(&line)
            && apply_events(&mut draft, events, on_snapshot)? == Step::Done
        {
            return draft.finalize();
        }
    }
    if let Some(tail) = decoder.flush_tail()
        && let ParseOutcome::Parsed(events) = parse_line(&tail)
        && apply_events(&mut draft, events, on_snapshot)? == Step::Done
    {
        return draft.finalize();
    }
    draft.finalize()
}

/// Non-streaming backends answer with one JSON object; `response` wins over
/// `content`.
async fn decode_json_fallback(resp: reqwest::Response) -> CoreResult<FinalDraft> {
    let value: Value = resp.json().await.map_err(|e| {
        tracing::warn!(error = %e, "fallback body was not valid json");
        TutorChatError::send_failed()
    })?;
    let content = value
        .get("response")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            value
                .get("content")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
        })
        .map(str::to_string)
        .ok_or(TutorChatError::EmptyContent)?;
    Ok(FinalDraft {
        content,
        sources: Vec::new(),
    })
}
