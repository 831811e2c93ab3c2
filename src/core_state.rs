//! Transport-agnostic application state.
//!
//! Owns the database handle, the session registry, the event hub and the
//! appointment service. The HTTP and WebSocket layers share it via `Arc`.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::booking::{AppointmentService, Clock, LogNotifier, MailRelayNotifier, Notifier, NotifyError, SystemClock};
use crate::config::{self, AppConfig};
use crate::db::{self, Database};
use crate::events::EventHub;
use crate::sessions::SessionStore;
use crate::webhook::WebhookVerifier;

pub struct CoreState {
    config: AppConfig,
    db: Database,
    events: Arc<EventHub>,
    appointments: AppointmentService,
    sessions: RwLock<SessionStore>,
    webhook: WebhookVerifier,
}

impl CoreState {
    /// Production wiring: system clock, and a mail relay when one is configured.
    pub fn new(config: AppConfig) -> Result<Self, CoreError> {
        let notifier: Arc<dyn Notifier> = match &config.mail_relay_url {
            Some(url) => {
                tracing::info!(relay = %url, "Approval emails go through mail relay");
                Arc::new(MailRelayNotifier::new(url, config::MAIL_RELAY_TIMEOUT)?)
            }
            None => {
                tracing::warn!("No mail relay configured; approval emails are only logged");
                Arc::new(LogNotifier)
            }
        };
        Self::with_collaborators(config, notifier, Arc::new(SystemClock))
    }

    pub fn with_collaborators(
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let db = Database::initialize(&config.database_path())?;
        let events = Arc::new(EventHub::new());
        let appointments = AppointmentService::new(
            db.clone(),
            events.clone(),
            notifier,
            clock,
            &config.public_url,
        );
        let webhook = WebhookVerifier::new(config.webhook_secret.as_deref());
        if !webhook.is_configured() {
            tracing::warn!("CARESYNC_WEBHOOK_SECRET unset; video-session webhooks will be rejected");
        }

        Ok(Self {
            sessions: RwLock::new(SessionStore::new(config.session_ttl)),
            config,
            db,
            events,
            appointments,
            webhook,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Open a fresh connection to the shared database.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        self.db.open().map_err(CoreError::Database)
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn appointments(&self) -> &AppointmentService {
        &self.appointments
    }

    pub fn webhook(&self) -> &WebhookVerifier {
        &self.webhook
    }

    pub fn read_sessions(&self) -> Result<RwLockReadGuard<'_, SessionStore>, CoreError> {
        self.sessions.read().map_err(|_| CoreError::LockPoisoned)
    }

    pub fn write_sessions(&self) -> Result<RwLockWriteGuard<'_, SessionStore>, CoreError> {
        self.sessions.write().map_err(|_| CoreError::LockPoisoned)
    }
}

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Notifier setup failed: {0}")]
    Notifier(#[from] NotifyError),
}
