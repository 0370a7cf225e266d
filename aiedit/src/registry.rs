//! Process-wide session registry and resource ownership.
//!
//! The registry is an explicit struct handed by reference into every entry
//! point — there are no module-level statics. It maps session ids to live
//! [`EditSession`]s and enforces the single-writer rule: a working buffer
//! for a resource belongs to exactly one session at a time. A second
//! session claiming a resource is rejected with `ResourceLocked` at claim
//! time, never silently interleaved.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;

use aiedit_core::error::EngineError;
use aiedit_core::types::TextEditBatch;

use crate::config::EngineConfig;
use crate::event::SessionEvent;
use crate::session::EditSession;

/// Tracks which resource is owned by which live session.
#[derive(Debug, Default)]
pub struct ResourceClaims {
    inner: Mutex<HashMap<String, String>>,
}

impl ResourceClaims {
    /// Claims `resource` for `session_id`. Re-claiming by the same session
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// [`EngineError::ResourceLocked`] when another session holds the claim.
    pub(crate) fn claim(&self, resource: &str, session_id: &str) -> Result<(), EngineError> {
        let mut map = self.inner.lock();
        match map.get(resource) {
            Some(owner) if owner != session_id => Err(EngineError::ResourceLocked {
                resource: resource.to_owned(),
                owner: owner.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                map.insert(resource.to_owned(), session_id.to_owned());
                Ok(())
            }
        }
    }

    /// Releases every claim held by `session_id`.
    pub(crate) fn release_session(&self, session_id: &str) {
        self.inner.lock().retain(|_, owner| owner != session_id);
    }

    /// The session currently owning `resource`, if any.
    pub fn owner(&self, resource: &str) -> Option<String> {
        self.inner.lock().get(resource).cloned()
    }
}

/// Process-wide map from session identity to [`EditSession`] instances.
pub struct SessionRegistry {
    config: EngineConfig,
    events: UnboundedSender<SessionEvent>,
    claims: Arc<ResourceClaims>,
    sessions: Mutex<HashMap<String, Arc<EditSession>>>,
}

impl SessionRegistry {
    /// Creates a registry. `events` is the send half of the host's
    /// [`EventHandler`](crate::event::EventHandler); it is cloned into every
    /// session the registry creates.
    pub fn new(config: EngineConfig, events: UnboundedSender<SessionEvent>) -> Self {
        Self {
            config,
            events,
            claims: Arc::new(ResourceClaims::default()),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a session. With `None` a fresh UUID v4 id is generated.
    ///
    /// # Errors
    ///
    /// [`EngineError::SessionExists`] when the id is already registered.
    pub fn create(&self, session_id: Option<&str>) -> Result<Arc<EditSession>, EngineError> {
        let id = match session_id {
            Some(id) => id.to_owned(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&id) {
            return Err(EngineError::SessionExists { session_id: id });
        }
        let session =
            EditSession::new(id.clone(), self.config.clone(), self.events.clone(), Arc::clone(&self.claims));
        sessions.insert(id.clone(), Arc::clone(&session));
        tracing::debug!(session = %id, "session created");
        Ok(session)
    }

    /// Looks up a live session.
    pub fn get(&self, session_id: &str) -> Option<Arc<EditSession>> {
        self.sessions.lock().get(session_id).cloned()
    }

    /// Looks up a live session, erring instead of returning `None`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`].
    pub fn resolve(&self, session_id: &str) -> Result<Arc<EditSession>, EngineError> {
        self.get(session_id)
            .ok_or_else(|| EngineError::UnknownSession { session_id: session_id.to_owned() })
    }

    /// The session for `session_id`, created on first sight.
    pub fn resolve_or_create(&self, session_id: &str) -> Result<Arc<EditSession>, EngineError> {
        if let Some(session) = self.get(session_id) {
            return Ok(session);
        }
        match self.create(Some(session_id)) {
            Ok(session) => Ok(session),
            // lost a create race — someone else registered it in between
            Err(EngineError::SessionExists { .. }) => self.resolve(session_id),
            Err(e) => Err(e),
        }
    }

    /// Routes one inbound batch: resolves (or creates) its session and
    /// applies it. This is the registry-level entry point matching the
    /// engine's data flow; hosts that hold session handles directly can
    /// call [`EditSession::apply_progress`] themselves.
    pub async fn dispatch(&self, batch: TextEditBatch) -> Result<(), EngineError> {
        let session = self.resolve_or_create(&batch.session_id)?;
        session
            .apply_progress(&batch.resource, &batch.iteration_id, batch.edits)
            .await
    }

    /// Cancels a session: no further batches are applied; applied edits
    /// remain pending accept/reject.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`].
    pub fn cancel(&self, session_id: &str) -> Result<(), EngineError> {
        self.resolve(session_id)?.cancel();
        Ok(())
    }

    /// Finalizes and removes a session: cancel, complete (emitting
    /// `SessionCompleted`), release its claims, forget it. Returns the
    /// `(accepted, rejected)` resource lists.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownSession`].
    pub async fn dispose(&self, session_id: &str) -> Result<(Vec<String>, Vec<String>), EngineError> {
        let session = self.resolve(session_id)?;
        session.cancel();
        let outcome = session.complete().await;
        self.sessions.lock().remove(session_id);
        tracing::debug!(session = %session_id, "session disposed");
        Ok(outcome)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
