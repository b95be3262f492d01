//! Registry operations, ownership checks, and the expiry sweeper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use berth_events::{topics, Event, EventBus};
use berth_types::{ContextOptions, Error, Principal, Protocol, Result};
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{watch, Mutex};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::store::RegistryStore;
use crate::types::{Context, ContextState, Page, Session, SessionFilter};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub max_sessions: usize,
    pub default_ttl: Duration,
    /// Ceiling for any session TTL, requested or extended.
    pub max_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_contexts_per_session: usize,
    pub max_pages_per_context: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(60),
            max_contexts_per_session: 16,
            max_pages_per_context: 32,
        }
    }
}

/// What a cascading delete tore down; the caller releases the browser and
/// proxy resources these contexts held.
#[derive(Debug)]
pub struct CascadeOutcome {
    pub session_id: String,
    pub contexts: Vec<Context>,
    pub pages_closed: usize,
}

pub struct SessionRegistry {
    store: Arc<dyn RegistryStore>,
    config: RegistryConfig,
    bus: EventBus,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
    context_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig, store: Arc<dyn RegistryStore>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            bus,
            session_locks: DashMap::new(),
            context_locks: DashMap::new(),
        })
    }

    /// Serialization point for one session's mutations.
    pub fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Serialization point for one context's actions.
    pub fn context_lock(&self, context_id: &str) -> Arc<Mutex<()>> {
        self.context_locks
            .entry(context_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn authorize(principal: &Principal, session: &Session) -> Result<()> {
        if principal.is_admin() || principal.user_id == session.principal.user_id {
            Ok(())
        } else {
            Err(Error::permission_denied(format!(
                "session {} belongs to another principal",
                session.id
            )))
        }
    }

    // Sessions

    pub async fn create_session(
        &self,
        principal: &Principal,
        ttl: Option<Duration>,
        metadata: HashMap<String, serde_json::Value>,
        origin: Protocol,
    ) -> Result<Session> {
        if self.store.count_sessions().await? >= self.config.max_sessions {
            return Err(Error::resource_exhausted(format!(
                "session limit reached ({})",
                self.config.max_sessions
            )));
        }
        let ttl = ttl.unwrap_or(self.config.default_ttl).min(self.config.max_ttl);
        let now = Utc::now();
        let session = Session {
            id: berth_types::session_id(),
            principal: principal.clone(),
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(1)),
            metadata,
            context_ids: Vec::new(),
        };
        self.store.put_session(session.clone()).await?;
        info!(session_id = %session.id, user_id = %principal.user_id, "session created");
        self.bus.publish(
            Event::new(topics::SESSION_CREATED, origin).with_fields(serde_json::json!({
                "session_id": session.id,
                "user_id": principal.user_id,
            })),
        );
        Ok(session)
    }

    pub async fn get_session(&self, principal: &Principal, id: &str) -> Result<Session> {
        let session = self
            .store
            .get_session(id)
            .await?
            .filter(|s| !s.is_expired())
            .ok_or_else(|| Error::not_found(format!("session {id}")))?;
        Self::authorize(principal, &session)?;
        Ok(session)
    }

    pub async fn list_sessions(
        &self,
        principal: &Principal,
        filter: &SessionFilter,
    ) -> Result<Vec<Session>> {
        let sessions = self.store.list_sessions().await?;
        Ok(sessions
            .into_iter()
            .filter(|s| !s.is_expired())
            .filter(|s| {
                if principal.is_admin() {
                    filter
                        .user_id
                        .as_ref()
                        .is_none_or(|u| &s.principal.user_id == u)
                } else {
                    s.principal.user_id == principal.user_id
                }
            })
            .filter(|s| {
                filter.metadata_contains.as_ref().is_none_or(|needle| {
                    s.metadata
                        .values()
                        .any(|v| v.to_string().contains(needle.as_str()))
                })
            })
            .collect())
    }

    pub async fn update_metadata(
        &self,
        principal: &Principal,
        id: &str,
        patch: HashMap<String, serde_json::Value>,
        _origin: Protocol,
    ) -> Result<Session> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;
        let mut session = self.get_session(principal, id).await?;
        for (key, value) in patch {
            if value.is_null() {
                session.metadata.remove(&key);
            } else {
                session.metadata.insert(key, value);
            }
        }
        self.store.put_session(session.clone()).await?;
        Ok(session)
    }

    /// Extend a session's absolute expiry, capped at `max_ttl` from now.
    pub async fn extend_session(
        &self,
        principal: &Principal,
        id: &str,
        additional: Duration,
        origin: Protocol,
    ) -> Result<Session> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;
        let mut session = self.get_session(principal, id).await?;
        let cap = Utc::now()
            + chrono::Duration::from_std(self.config.max_ttl)
                .unwrap_or(chrono::Duration::hours(24));
        let extended = session.expires_at
            + chrono::Duration::from_std(additional).unwrap_or(chrono::Duration::zero());
        session.expires_at = extended.min(cap);
        self.store.put_session(session.clone()).await?;
        self.bus.publish(
            Event::new(topics::SESSION_EXTENDED, origin).with_fields(serde_json::json!({
                "session_id": session.id,
                "expires_at": session.expires_at.to_rfc3339(),
            })),
        );
        Ok(session)
    }

    /// Touch: push expiry out to at least `default_ttl` from now.
    pub async fn touch_session(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<Session> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;
        let mut session = self.get_session(principal, id).await?;
        let floor = Utc::now()
            + chrono::Duration::from_std(self.config.default_ttl)
                .unwrap_or(chrono::Duration::hours(1));
        if session.expires_at < floor {
            session.expires_at = floor;
            self.store.put_session(session.clone()).await?;
            self.bus.publish(
                Event::new(topics::SESSION_EXTENDED, origin).with_fields(serde_json::json!({
                    "session_id": session.id,
                    "expires_at": session.expires_at.to_rfc3339(),
                })),
            );
        }
        Ok(session)
    }

    pub async fn delete_session(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<CascadeOutcome> {
        {
            // Authorization outside the cascade; expired sessions may still
            // be deleted explicitly by their owner.
            let session = self
                .store
                .get_session(id)
                .await?
                .ok_or_else(|| Error::not_found(format!("session {id}")))?;
            Self::authorize(principal, &session)?;
        }
        let outcome = self.cascade_delete(id, origin, topics::SESSION_DELETED).await?;
        Ok(outcome)
    }

    async fn cascade_delete(
        &self,
        id: &str,
        origin: Protocol,
        topic: &str,
    ) -> Result<CascadeOutcome> {
        let lock = self.session_lock(id);
        let _guard = lock.lock().await;
        let session = self
            .store
            .remove_session(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("session {id}")))?;

        let mut contexts = Vec::new();
        let mut pages_closed = 0usize;
        for context_id in &session.context_ids {
            if let Some(context) = self.store.remove_context(context_id).await? {
                for page_id in &context.page_ids {
                    if self.store.remove_page(page_id).await?.is_some() {
                        pages_closed += 1;
                    }
                }
                self.bus.publish(
                    Event::new(topics::CONTEXT_CLOSED, origin).with_fields(serde_json::json!({
                        "context_id": context.id,
                        "session_id": session.id,
                        "cascade": true,
                    })),
                );
                self.context_locks.remove(context_id);
                contexts.push(context);
            }
        }
        self.session_locks.remove(id);

        info!(
            session_id = %session.id,
            contexts = contexts.len(),
            pages = pages_closed,
            "session removed"
        );
        self.bus.publish(
            Event::new(topic, origin).with_fields(serde_json::json!({
                "session_id": session.id,
                "context_ids": contexts.iter().map(|c| c.id.clone()).collect::<Vec<_>>(),
            })),
        );
        Ok(CascadeOutcome {
            session_id: session.id,
            contexts,
            pages_closed,
        })
    }

    // Contexts

    pub async fn create_context(
        &self,
        principal: &Principal,
        session_id: &str,
        options: ContextOptions,
        origin: Protocol,
    ) -> Result<Context> {
        options.validate()?;
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;
        let mut session = self.get_session(principal, session_id).await?;
        if session.context_ids.len() >= self.config.max_contexts_per_session {
            return Err(Error::resource_exhausted(format!(
                "context limit per session reached ({})",
                self.config.max_contexts_per_session
            )));
        }
        let now = Utc::now();
        let context = Context {
            id: berth_types::context_id(),
            session_id: session_id.to_string(),
            options,
            state: ContextState::Pending,
            page_ids: Vec::new(),
            assigned_instance: None,
            created_at: now,
            last_used_at: now,
            last_action_at: None,
            actions_executed: 0,
        };
        self.store.put_context(context.clone()).await?;
        session.context_ids.push(context.id.clone());
        self.store.put_session(session).await?;

        debug!(context_id = %context.id, session_id, "context created");
        self.bus.publish(
            Event::new(topics::CONTEXT_CREATED, origin).with_fields(serde_json::json!({
                "context_id": context.id,
                "session_id": session_id,
            })),
        );
        Ok(context)
    }

    pub async fn get_context(&self, principal: &Principal, id: &str) -> Result<Context> {
        let context = self
            .store
            .get_context(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("context {id}")))?;
        // Ownership flows through the owning session.
        self.get_session(principal, &context.session_id).await?;
        Ok(context)
    }

    pub async fn list_contexts(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> Result<Vec<Context>> {
        let session = self.get_session(principal, session_id).await?;
        let mut contexts = Vec::with_capacity(session.context_ids.len());
        for id in &session.context_ids {
            if let Some(context) = self.store.get_context(id).await? {
                contexts.push(context);
            }
        }
        Ok(contexts)
    }

    pub async fn close_context(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<(Context, usize)> {
        let context = self.get_context(principal, id).await?;
        let session_lock = self.session_lock(&context.session_id);
        let _session_guard = session_lock.lock().await;
        let context_lock = self.context_lock(id);
        let _context_guard = context_lock.lock().await;

        let context = self
            .store
            .remove_context(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("context {id}")))?;
        let mut pages_closed = 0usize;
        for page_id in &context.page_ids {
            if self.store.remove_page(page_id).await?.is_some() {
                pages_closed += 1;
            }
        }
        if let Some(mut session) = self.store.get_session(&context.session_id).await? {
            session.context_ids.retain(|c| c != id);
            self.store.put_session(session).await?;
        }
        self.context_locks.remove(id);

        debug!(context_id = %id, pages = pages_closed, "context closed");
        self.bus.publish(
            Event::new(topics::CONTEXT_CLOSED, origin).with_fields(serde_json::json!({
                "context_id": id,
                "session_id": context.session_id,
            })),
        );
        Ok((context, pages_closed))
    }

    /// Bind or unbind a browser instance. `Some` moves the context to
    /// `Active`; `None` to `Paused`.
    pub async fn bind_instance(&self, context_id: &str, instance: Option<String>) -> Result<Context> {
        let mut context = self
            .store
            .get_context(context_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("context {context_id}")))?;
        let assigned = instance.is_some();
        context.assigned_instance = instance;
        context.state = if assigned {
            ContextState::Active
        } else {
            ContextState::Paused
        };
        context.last_used_at = Utc::now();
        self.store.put_context(context.clone()).await?;
        if assigned {
            self.bus.publish(
                Event::new(topics::CONTEXT_ASSIGNED, Protocol::Internal).with_fields(
                    serde_json::json!({
                        "context_id": context_id,
                        "instance_id": context.assigned_instance,
                    }),
                ),
            );
        }
        Ok(context)
    }

    /// Crash recovery: detach the named contexts and drop their pages. The
    /// contexts re-bind on their next acquisition.
    pub async fn mark_recovering(&self, context_ids: &[String]) -> Vec<Context> {
        let mut affected = Vec::new();
        for id in context_ids {
            let Ok(Some(mut context)) = self.store.get_context(id).await else {
                continue;
            };
            if context.state == ContextState::Closed {
                continue;
            }
            context.state = ContextState::Recovering;
            context.assigned_instance = None;
            let pages = std::mem::take(&mut context.page_ids);
            for page_id in &pages {
                let _ = self.store.remove_page(page_id).await;
            }
            if self.store.put_context(context.clone()).await.is_ok() {
                warn!(context_id = %id, dropped_pages = pages.len(), "context recovering after crash");
                self.bus.publish(
                    Event::new(topics::CONTEXT_STATE_CHANGED, Protocol::Internal).with_fields(
                        serde_json::json!({ "context_id": id, "state": "recovering" }),
                    ),
                );
                affected.push(context);
            }
        }
        affected
    }

    // Pages

    pub async fn create_page(&self, context_id: &str, origin: Protocol) -> Result<Page> {
        let mut context = self
            .store
            .get_context(context_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("context {context_id}")))?;
        if context.page_ids.len() >= self.config.max_pages_per_context {
            return Err(Error::resource_exhausted(format!(
                "page limit per context reached ({})",
                self.config.max_pages_per_context
            )));
        }
        let page = Page {
            id: berth_types::page_id(),
            context_id: context_id.to_string(),
            url: String::new(),
            ready: false,
            created_at: Utc::now(),
            last_action_at: None,
        };
        self.store.put_page(page.clone()).await?;
        context.page_ids.push(page.id.clone());
        self.store.put_context(context).await?;
        self.bus.publish(
            Event::new(topics::PAGE_CREATED, origin).with_fields(serde_json::json!({
                "page_id": page.id,
                "context_id": context_id,
            })),
        );
        Ok(page)
    }

    pub async fn get_page(&self, principal: &Principal, id: &str) -> Result<Page> {
        let page = self
            .store
            .get_page(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("page {id}")))?;
        self.get_context(principal, &page.context_id).await?;
        Ok(page)
    }

    pub async fn close_page(
        &self,
        principal: &Principal,
        id: &str,
        origin: Protocol,
    ) -> Result<Page> {
        let page = self.get_page(principal, id).await?;
        let lock = self.context_lock(&page.context_id);
        let _guard = lock.lock().await;
        let page = self
            .store
            .remove_page(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("page {id}")))?;
        if let Some(mut context) = self.store.get_context(&page.context_id).await? {
            context.page_ids.retain(|p| p != id);
            self.store.put_context(context).await?;
        }
        self.bus.publish(
            Event::new(topics::PAGE_CLOSED, origin).with_fields(serde_json::json!({
                "page_id": id,
                "context_id": page.context_id,
            })),
        );
        Ok(page)
    }

    /// Record a navigation result on a page.
    pub async fn set_page_url(&self, page_id: &str, url: &str, ready: bool) -> Result<()> {
        if let Some(mut page) = self.store.get_page(page_id).await? {
            page.url = url.to_string();
            page.ready = ready;
            page.last_action_at = Some(Utc::now());
            self.store.put_page(page).await?;
        }
        Ok(())
    }

    /// Bump per-context and per-page action counters.
    pub async fn note_action(&self, context_id: &str, page_id: &str) -> Result<()> {
        if let Some(mut context) = self.store.get_context(context_id).await? {
            context.actions_executed += 1;
            context.last_action_at = Some(Utc::now());
            context.last_used_at = Utc::now();
            self.store.put_context(context).await?;
        }
        if let Some(mut page) = self.store.get_page(page_id).await? {
            page.last_action_at = Some(Utc::now());
            self.store.put_page(page).await?;
        }
        Ok(())
    }

    /// Remove sessions past their expiry; returns the torn-down cascades so
    /// the caller can release held resources.
    pub async fn sweep_expired(&self) -> Vec<CascadeOutcome> {
        let sessions = match self.store.list_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "expiry sweep failed to list sessions");
                return Vec::new();
            }
        };
        let mut outcomes = Vec::new();
        for session in sessions.into_iter().filter(|s| s.is_expired()) {
            match self
                .cascade_delete(&session.id, Protocol::Internal, topics::SESSION_EXPIRED)
                .await
            {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => debug!(session_id = %session.id, error = %e, "expired session vanished mid-sweep"),
            }
        }
        if !outcomes.is_empty() {
            info!(swept = outcomes.len(), "expired sessions removed");
        }
        outcomes
    }

    /// Background sweeper loop. Cascade outcomes are forwarded to `on_sweep`
    /// so the owner can release browser leases and proxy assignments.
    pub fn spawn_sweeper<F>(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
        on_sweep: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(Vec<CascadeOutcome>) + Send + Sync + 'static,
    {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(registry.config.sweep_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcomes = registry.sweep_expired().await;
                        if !outcomes.is_empty() {
                            on_sweep(outcomes);
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use berth_types::ErrorKind;

    fn registry() -> Arc<SessionRegistry> {
        SessionRegistry::new(
            RegistryConfig::default(),
            Arc::new(InMemoryStore::new()),
            EventBus::new(),
        )
    }

    fn alice() -> Principal {
        Principal::new("u1", "Alice")
    }

    fn bob() -> Principal {
        Principal::new("u2", "Bob")
    }

    #[tokio::test]
    async fn session_roundtrip() {
        let registry = registry();
        let session = registry
            .create_session(&alice(), None, HashMap::new(), Protocol::Http)
            .await
            .unwrap();

        let fetched = registry.get_session(&alice(), &session.id).await.unwrap();
        assert_eq!(fetched.id, session.id);
        assert_eq!(fetched.principal.user_id, "u1");

        registry
            .delete_session(&alice(), &session.id, Protocol::Http)
            .await
            .unwrap();
        let err = registry.get_session(&alice(), &session.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn cross_principal_access_denied() {
        let registry = registry();
        let session = registry
            .create_session(&alice(), None, HashMap::new(), Protocol::Http)
            .await
            .unwrap();

        let err = registry.get_session(&bob(), &session.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let admin = Principal::new("root", "Root").with_roles(vec!["admin".to_string()]);
        assert!(registry.get_session(&admin, &session.id).await.is_ok());
    }

    #[tokio::test]
    async fn listing_is_scoped_to_principal() {
        let registry = registry();
        registry
            .create_session(&alice(), None, HashMap::new(), Protocol::Http)
            .await
            .unwrap();
        registry
            .create_session(&bob(), None, HashMap::new(), Protocol::Http)
            .await
            .unwrap();

        let mine = registry
            .list_sessions(&alice(), &SessionFilter::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].principal.user_id, "u1");

        let admin = Principal::new("root", "Root").with_roles(vec!["admin".to_string()]);
        let all = registry
            .list_sessions(&admin, &SessionFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn metadata_patch_merges_and_removes() {
        let registry = registry();
        let mut initial = HashMap::new();
        initial.insert("a".to_string(), serde_json::json!(1));
        let session = registry
            .create_session(&alice(), None, initial, Protocol::Http)
            .await
            .unwrap();

        let mut patch = HashMap::new();
        patch.insert("b".to_string(), serde_json::json!("two"));
        patch.insert("a".to_string(), serde_json::Value::Null);
        let updated = registry
            .update_metadata(&alice(), &session.id, patch, Protocol::Http)
            .await
            .unwrap();
        assert!(!updated.metadata.contains_key("a"));
        assert_eq!(updated.metadata["b"], "two");
    }

    #[tokio::test]
    async fn context_and_page_ownership_bijection() {
        let registry = registry();
        let session = registry
            .create_session(&alice(), None, HashMap::new(), Protocol::Http)
            .await
            .unwrap();
        let context = registry
            .create_context(&alice(), &session.id, ContextOptions::default(), Protocol::Http)
            .await
            .unwrap();

        let p1 = registry.create_page(&context.id, Protocol::Http).await.unwrap();
        let p2 = registry.create_page(&context.id, Protocol::Http).await.unwrap();

        let fetched = registry.get_context(&alice(), &context.id).await.unwrap();
        assert_eq!(fetched.page_ids, vec![p1.id.clone(), p2.id.clone()]);
        for page_id in &fetched.page_ids {
            let page = registry.get_page(&alice(), page_id).await.unwrap();
            assert_eq!(page.context_id, context.id);
        }

        registry
            .close_page(&alice(), &p1.id, Protocol::Http)
            .await
            .unwrap();
        let fetched = registry.get_context(&alice(), &context.id).await.unwrap();
        assert_eq!(fetched.page_ids, vec![p2.id.clone()]);
    }

    #[tokio::test]
    async fn delete_cascades_to_contexts_and_pages() {
        let registry = registry();
        let session = registry
            .create_session(&alice(), None, HashMap::new(), Protocol::Http)
            .await
            .unwrap();
        let context = registry
            .create_context(&alice(), &session.id, ContextOptions::default(), Protocol::Http)
            .await
            .unwrap();
        registry.create_page(&context.id, Protocol::Http).await.unwrap();

        let outcome = registry
            .delete_session(&alice(), &session.id, Protocol::Http)
            .await
            .unwrap();
        assert_eq!(outcome.contexts.len(), 1);
        assert_eq!(outcome.pages_closed, 1);

        let err = registry.get_context(&alice(), &context.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn expired_sessions_are_swept() {
        let registry = registry();
        let session = registry
            .create_session(&alice(), Some(Duration::from_millis(10)), HashMap::new(), Protocol::Http)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let outcomes = registry.sweep_expired().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].session_id, session.id);

        let err = registry.get_session(&alice(), &session.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn recovering_contexts_lose_pages_and_binding() {
        let registry = registry();
        let session = registry
            .create_session(&alice(), None, HashMap::new(), Protocol::Http)
            .await
            .unwrap();
        let context = registry
            .create_context(&alice(), &session.id, ContextOptions::default(), Protocol::Http)
            .await
            .unwrap();
        registry
            .bind_instance(&context.id, Some("browser_1".to_string()))
            .await
            .unwrap();
        registry.create_page(&context.id, Protocol::Http).await.unwrap();

        let affected = registry.mark_recovering(&[context.id.clone()]).await;
        assert_eq!(affected.len(), 1);
        let context = registry.get_context(&alice(), &context.id).await.unwrap();
        assert_eq!(context.state, ContextState::Recovering);
        assert!(context.assigned_instance.is_none());
        assert!(context.page_ids.is_empty());
    }
}
