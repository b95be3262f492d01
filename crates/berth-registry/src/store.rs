//! Storage behind the registry.
//!
//! The registry talks to this trait so a durable backend can replace the
//! in-memory default without touching callers. The in-memory store shards on
//! `dashmap` and keeps a secondary index by principal.

use std::collections::HashSet;

use async_trait::async_trait;
use berth_types::Result;
use dashmap::DashMap;

use crate::types::{Context, Page, Session};

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn put_session(&self, session: Session) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<Option<Session>>;
    async fn remove_session(&self, id: &str) -> Result<Option<Session>>;
    /// All sessions, ordered by id.
    async fn list_sessions(&self) -> Result<Vec<Session>>;
    async fn session_ids_for_principal(&self, user_id: &str) -> Result<Vec<String>>;
    async fn count_sessions(&self) -> Result<usize>;

    async fn put_context(&self, context: Context) -> Result<()>;
    async fn get_context(&self, id: &str) -> Result<Option<Context>>;
    async fn remove_context(&self, id: &str) -> Result<Option<Context>>;

    async fn put_page(&self, page: Page) -> Result<()>;
    async fn get_page(&self, id: &str) -> Result<Option<Page>>;
    async fn remove_page(&self, id: &str) -> Result<Option<Page>>;
}

#[derive(Default)]
pub struct InMemoryStore {
    sessions: DashMap<String, Session>,
    contexts: DashMap<String, Context>,
    pages: DashMap<String, Page>,
    by_principal: DashMap<String, HashSet<String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for InMemoryStore {
    async fn put_session(&self, session: Session) -> Result<()> {
        self.by_principal
            .entry(session.principal.user_id.clone())
            .or_default()
            .insert(session.id.clone());
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|s| s.clone()))
    }

    async fn remove_session(&self, id: &str) -> Result<Option<Session>> {
        let removed = self.sessions.remove(id).map(|(_, s)| s);
        if let Some(session) = &removed {
            if let Some(mut ids) = self.by_principal.get_mut(&session.principal.user_id) {
                ids.remove(id);
            }
        }
        Ok(removed)
    }

    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions: Vec<Session> =
            self.sessions.iter().map(|entry| entry.clone()).collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    async fn session_ids_for_principal(&self, user_id: &str) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .by_principal
            .get(user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    async fn count_sessions(&self) -> Result<usize> {
        Ok(self.sessions.len())
    }

    async fn put_context(&self, context: Context) -> Result<()> {
        self.contexts.insert(context.id.clone(), context);
        Ok(())
    }

    async fn get_context(&self, id: &str) -> Result<Option<Context>> {
        Ok(self.contexts.get(id).map(|c| c.clone()))
    }

    async fn remove_context(&self, id: &str) -> Result<Option<Context>> {
        Ok(self.contexts.remove(id).map(|(_, c)| c))
    }

    async fn put_page(&self, page: Page) -> Result<()> {
        self.pages.insert(page.id.clone(), page);
        Ok(())
    }

    async fn get_page(&self, id: &str) -> Result<Option<Page>> {
        Ok(self.pages.get(id).map(|p| p.clone()))
    }

    async fn remove_page(&self, id: &str) -> Result<Option<Page>> {
        Ok(self.pages.remove(id).map(|(_, p)| p))
    }
}
