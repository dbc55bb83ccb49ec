//! The grounded chat pipeline.
//!
//! One request walks the stages in order with no branching back:
//! resolve identity, resolve session, load history, load catalog,
//! compose prompt, invoke model, persist turns, touch session. Reads and
//! the model call are fatal on failure. Writes happen only after a
//! successful generation, and a failed write is logged without failing
//! the request.

use chrono::Utc;

use crate::auth::AuthService;
use crate::error::{ClubChatError, Result};
use crate::identity::{resolve_identity, ConnectionMeta, Identity};
use crate::llm::ModelInvoker;
use crate::model::{Role, Turn};
use crate::prompt::{compose, CATALOG_EXCERPT_LIMIT};
use crate::sessions;
use crate::storage::StorageBackend;
use crate::turns::{self, assistant_turn_at, next_user_turn_at, HISTORY_WINDOW};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    ReceiveMessage,
    ResolveIdentity,
    ResolveSession,
    LoadHistory,
    LoadCatalog,
    ComposePrompt,
    InvokeModel,
    PersistTurns,
    TouchSession,
    RespondSuccess,
}

impl ChatStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceiveMessage => "receive_message",
            Self::ResolveIdentity => "resolve_identity",
            Self::ResolveSession => "resolve_session",
            Self::LoadHistory => "load_history",
            Self::LoadCatalog => "load_catalog",
            Self::ComposePrompt => "compose_prompt",
            Self::InvokeModel => "invoke_model",
            Self::PersistTurns => "persist_turns",
            Self::TouchSession => "touch_session",
            Self::RespondSuccess => "respond_success",
        }
    }
}

impl std::fmt::Display for ChatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound chat request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub session_id: Option<String>,
    /// Raw bearer token, if the caller sent one.
    pub bearer: Option<String>,
    pub connection: ConnectionMeta,
}

/// Result of a successful exchange.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub response: String,
    pub session_id: String,
    pub identity: Identity,
    /// False when the exchange could not be written to memory.
    pub memory_saved: bool,
}

/// Runs one chat exchange against borrowed collaborators.
pub struct ChatOrchestrator<'a, S, M> {
    storage: &'a S,
    auth: &'a AuthService,
    model: &'a M,
}

impl<'a, S: StorageBackend, M: ModelInvoker> ChatOrchestrator<'a, S, M> {
    pub fn new(storage: &'a S, auth: &'a AuthService, model: &'a M) -> Self {
        Self {
            storage,
            auth,
            model,
        }
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply> {
        let message = match request.message.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => {
                tracing::debug!(stage = %ChatStage::ReceiveMessage, "rejecting empty message");
                return Err(ClubChatError::InvalidInput("message is required".into()));
            }
        };

        let identity = resolve_identity(
            self.auth,
            self.storage,
            request.bearer.as_deref(),
            &request.connection,
        )
        .await;
        tracing::debug!(
            stage = %ChatStage::ResolveIdentity,
            identity = %identity,
            anonymous = identity.is_anonymous(),
            "caller resolved"
        );

        let session_id = sessions::resolve_or_create(
            self.storage,
            &identity,
            request.session_id.as_deref(),
            Utc::now(),
        )
        .await
        .map_err(|e| upstream(ChatStage::ResolveSession, e))?;

        let history = turns::recent_window(self.storage, &identity, &session_id, HISTORY_WINDOW)
            .await
            .map_err(|e| upstream(ChatStage::LoadHistory, e))?;

        let catalog = self
            .storage
            .list_clubs(Some(CATALOG_EXCERPT_LIMIT))
            .await
            .map_err(|e| upstream(ChatStage::LoadCatalog, e))?;

        let prompt = compose(&catalog, &history, &message);
        tracing::debug!(
            stage = %ChatStage::ComposePrompt,
            clubs = catalog.len(),
            history = history.len(),
            prompt_chars = prompt.chars().count(),
            "prompt composed"
        );

        let response = self.model.invoke(&prompt).await.map_err(|e| {
            tracing::error!(stage = %ChatStage::InvokeModel, error = %e, "chat request failed");
            ClubChatError::Model(e)
        })?;

        let memory_saved = self
            .remember(&identity, &session_id, &history, &message, &response)
            .await;

        tracing::debug!(
            stage = %ChatStage::RespondSuccess,
            identity = %identity,
            session_id = %session_id,
            history = history.len(),
            memory_saved,
            "chat exchange complete"
        );

        Ok(ChatReply {
            response,
            session_id,
            identity,
            memory_saved,
        })
    }

    /// Persist both turns and touch the session. Failures are logged and
    /// reported through the return value only.
    async fn remember(
        &self,
        identity: &Identity,
        session_id: &str,
        history: &[Turn],
        message: &str,
        response: &str,
    ) -> bool {
        let user_at = next_user_turn_at(history, Utc::now());
        let assistant_at = assistant_turn_at(user_at);

        let persisted = async {
            turns::append(self.storage, identity, session_id, Role::User, message, user_at)
                .await?;
            turns::append(
                self.storage,
                identity,
                session_id,
                Role::Assistant,
                response,
                assistant_at,
            )
            .await
        }
        .await;
        if let Err(e) = persisted {
            persistence_warning(ChatStage::PersistTurns, identity, session_id, &e);
            return false;
        }

        if let Err(e) =
            sessions::touch(self.storage, identity, session_id, assistant_at, Some(message)).await
        {
            persistence_warning(ChatStage::TouchSession, identity, session_id, &e);
            return false;
        }
        true
    }
}

fn upstream(stage: ChatStage, err: ClubChatError) -> ClubChatError {
    tracing::error!(stage = %stage, error = %err, "chat request failed");
    ClubChatError::Upstream(format!("{stage}: {err}"))
}

fn persistence_warning(stage: ChatStage, identity: &Identity, session_id: &str, err: &ClubChatError) {
    tracing::warn!(
        stage = %stage,
        identity = %identity,
        session_id,
        error = %err,
        "chat memory not saved for this exchange"
    );
}
