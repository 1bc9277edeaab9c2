//! Conversation controller: turns inbound chat events into session transitions.
//!
//! One event is handled to completion before its handler returns; the
//! transport feeds events for a chat in order. Every failure inside a
//! transition ends as a screen and a return to the main menu, never as an
//! error out of [`Conversation::handle`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use icebox_common::{ChatIdentity, Dimensions, GenerationError, GenerationRequest, ProviderError};

use crate::gatekeeper::Gatekeeper;
use crate::orchestrator::{GenerationOutcome, Orchestrator};
use crate::profile::ProfileReporter;
use crate::screens::{self, CallbackAction, Screen};
use crate::session::{ConversationSession, SessionState, SessionStore};
use crate::traits::{AccountingBackend, ChatTransport, ImageProvider};

/// Literal text that abandons the current cycle.
const CANCEL_TEXT: &str = "cancel";

/// What the user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// The `/start` command.
    Start,
    /// Any other text message.
    Text(String),
    /// A button press on message `message_id`.
    Action {
        message_id: i32,
        action: CallbackAction,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub identity: ChatIdentity,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn start(identity: ChatIdentity) -> Self {
        Self {
            identity,
            kind: EventKind::Start,
        }
    }

    pub fn text(identity: ChatIdentity, text: impl Into<String>) -> Self {
        Self {
            identity,
            kind: EventKind::Text(text.into()),
        }
    }

    pub fn action(identity: ChatIdentity, message_id: i32, action: CallbackAction) -> Self {
        Self {
            identity,
            kind: EventKind::Action { message_id, action },
        }
    }
}

/// Static texts that vary per deployment.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub bot_handle: String,
    pub support_contact: String,
}

pub struct Conversation {
    backend: Arc<dyn AccountingBackend>,
    transport: Arc<dyn ChatTransport>,
    gatekeeper: Gatekeeper,
    orchestrator: Orchestrator,
    profiles: ProfileReporter,
    sessions: SessionStore,
    settings: BotSettings,
}

impl Conversation {
    pub fn new(
        backend: Arc<dyn AccountingBackend>,
        provider: Arc<dyn ImageProvider>,
        transport: Arc<dyn ChatTransport>,
        settings: BotSettings,
    ) -> Self {
        let gatekeeper = Gatekeeper::new(backend.clone());
        Self {
            orchestrator: Orchestrator::new(provider, backend.clone(), gatekeeper.clone()),
            profiles: ProfileReporter::new(backend.clone(), gatekeeper.clone()),
            gatekeeper,
            backend,
            transport,
            sessions: SessionStore::new(),
            settings,
        }
    }

    /// Current session for `chat_id`, created on first contact.
    pub fn session(&self, chat_id: i64) -> ConversationSession {
        self.sessions.get(chat_id)
    }

    pub async fn handle(&self, event: InboundEvent) {
        self.handle_at(event, Utc::now()).await
    }

    /// `handle` with an explicit clock, which drives the seed and reset time.
    pub async fn handle_at(&self, event: InboundEvent, now: DateTime<Utc>) {
        let chat_id = event.identity.chat_id;
        let state = self.sessions.get(chat_id).state;
        debug!(chat_id, ?state, kind = ?event.kind, "Inbound event");

        match event.kind {
            EventKind::Start => self.start(&event.identity).await,
            EventKind::Text(text) => self.on_text(&event.identity, state, text).await,
            EventKind::Action { message_id, action } => {
                self.on_action(&event.identity, state, message_id, action, now)
                    .await
            }
        }
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Any state → main menu, re-registering the identity first.
    async fn start(&self, identity: &ChatIdentity) {
        let chat_id = identity.chat_id;
        match self.backend.upsert_identity(identity).await {
            Ok(()) => info!(chat_id, "Identity registered"),
            Err(e) => error!(chat_id, error = %e, "Identity upsert failed"),
        }
        self.sessions.reset(chat_id);
        self.send(chat_id, &self.menu_screen(identity)).await;
    }

    async fn on_text(&self, identity: &ChatIdentity, state: SessionState, text: String) {
        let chat_id = identity.chat_id;
        let prompt = text.trim();
        // Honored in every state, size picker included.
        if prompt.eq_ignore_ascii_case(CANCEL_TEXT) {
            info!(chat_id, ?state, "Cycle cancelled");
            return self.start(identity).await;
        }
        if state != SessionState::AwaitingPrompt {
            debug!(chat_id, "Text outside prompt entry, ignored");
            return;
        }

        if prompt.is_empty() || prompt.starts_with('/') {
            debug!(chat_id, "Command or empty text during prompt entry, ignored");
            return;
        }

        if self.sessions.store_prompt(chat_id, prompt) {
            self.send(chat_id, &screens::size_picker()).await;
        }
    }

    async fn on_action(
        &self,
        identity: &ChatIdentity,
        state: SessionState,
        message_id: i32,
        action: CallbackAction,
        now: DateTime<Utc>,
    ) {
        let chat_id = identity.chat_id;
        match (state, action) {
            (SessionState::AwaitingSize { .. }, CallbackAction::Size(dimensions)) => {
                self.generate(chat_id, message_id, dimensions, now).await
            }
            (SessionState::AwaitingSize { .. }, CallbackAction::Other(payload)) => {
                let dimensions = Dimensions::from_payload_or_default(&payload);
                self.generate(chat_id, message_id, dimensions, now).await
            }
            (_, CallbackAction::GenerateMode) => {
                self.sessions.begin_prompt(chat_id);
                self.show(chat_id, message_id, &screens::prompt_entry()).await;
            }
            (_, CallbackAction::Profile) => {
                self.sessions.reset(chat_id);
                let screen = self.profiles.render_profile(chat_id, now).await;
                self.show(chat_id, message_id, &screen).await;
            }
            (_, CallbackAction::Help) => {
                self.sessions.reset(chat_id);
                let screen = screens::help(&self.settings.support_contact);
                self.show(chat_id, message_id, &screen).await;
            }
            // Explicit back, or a size button left over from an earlier cycle.
            (_, CallbackAction::MainMenu | CallbackAction::Size(_) | CallbackAction::Other(_)) => {
                self.sessions.reset(chat_id);
                self.show(chat_id, message_id, &self.menu_screen(identity)).await;
            }
        }
    }

    /// Awaiting size → main menu. The prompt is taken before any network call,
    /// so the cycle ends here whatever the outcome.
    async fn generate(
        &self,
        chat_id: i64,
        message_id: i32,
        dimensions: Dimensions,
        now: DateTime<Utc>,
    ) {
        let Some(prompt) = self.sessions.take_prompt(chat_id) else {
            return;
        };

        let progress = self
            .show(chat_id, message_id, &screens::processing(&prompt))
            .await;
        let Some(progress) = progress else {
            return;
        };

        let request = GenerationRequest::new(prompt, dimensions, now);
        match self.run_generation(chat_id, progress, &request, now).await {
            Ok(outcome) => {
                if let Err(e) = self.transport.delete(chat_id, progress).await {
                    warn!(chat_id, error = %e, "Could not delete progress message");
                }
                if let Err(e) = self.transport.send_photo(chat_id, outcome.image.clone()).await {
                    error!(chat_id, error = %e, "Photo delivery failed");
                }
                self.send(chat_id, &screens::generation_summary(&outcome)).await;
            }
            Err(e) => {
                let screen = failure_screen(&e);
                match &e {
                    GenerationError::QuotaDenied { .. } => {}
                    GenerationError::IdentityNotFound => warn!(chat_id, "No account for chat"),
                    other => error!(chat_id, error = %other, "Generation failed"),
                }
                self.edit(chat_id, progress, &screen).await;
            }
        }
    }

    async fn run_generation(
        &self,
        chat_id: i64,
        progress: i32,
        request: &GenerationRequest,
        now: DateTime<Utc>,
    ) -> Result<GenerationOutcome, GenerationError> {
        let account = self
            .backend
            .find_account(chat_id)
            .await?
            .ok_or(GenerationError::IdentityNotFound)?;

        self.gatekeeper.admit(account.id).await?;

        self.edit(chat_id, progress, &screens::generating(request.dimensions))
            .await;
        self.orchestrator
            .generate(request, account.id, chat_id, now)
            .await
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn menu_screen(&self, identity: &ChatIdentity) -> Screen {
        screens::main_menu(&identity.display_name(), &self.settings.bot_handle)
    }

    async fn send(&self, chat_id: i64, screen: &Screen) -> Option<i32> {
        self.transport
            .send(chat_id, screen)
            .await
            .inspect_err(|e| error!(chat_id, error = %e, "Send failed"))
            .ok()
    }

    async fn edit(&self, chat_id: i64, message_id: i32, screen: &Screen) {
        if let Err(e) = self.transport.edit(chat_id, message_id, screen).await {
            warn!(chat_id, message_id, error = %e, "Edit failed");
        }
    }

    /// Edit the pressed message in place, or send a fresh one if it cannot be
    /// edited. Returns the id of the message now showing `screen`.
    async fn show(&self, chat_id: i64, message_id: i32, screen: &Screen) -> Option<i32> {
        match self.transport.edit(chat_id, message_id, screen).await {
            Ok(()) => Some(message_id),
            Err(e) => {
                debug!(chat_id, message_id, error = %e, "Edit failed, sending new message");
                self.send(chat_id, screen).await
            }
        }
    }
}

fn failure_screen(error: &GenerationError) -> Screen {
    match error {
        GenerationError::IdentityNotFound => screens::identity_missing(),
        GenerationError::QuotaDenied { reason } => screens::denied(reason),
        GenerationError::Provider(ProviderError::Timeout(_)) => screens::provider_timed_out(),
        GenerationError::Provider(_) => screens::provider_failed(),
        GenerationError::Backend(_) => screens::system_error(),
    }
}
