//! Live per-context state: the browser lease and the open page handles.
//!
//! The registry owns identities; this arena owns the handles. Page handles
//! are `Arc`ed out of the map before any await so the sync map lock is
//! never held across a suspension point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use berth_driver::PageHandle;
use berth_pool::Lease;
use berth_types::ContextOptions;
use tokio::sync::Mutex;

use crate::history::HistoryRing;

#[derive(Default)]
pub(crate) struct PagesState {
    map: HashMap<String, Arc<dyn PageHandle>>,
    /// Creation order; the newest page is the default action target.
    order: Vec<String>,
}

impl PagesState {
    pub fn get(&self, page_id: &str) -> Option<Arc<dyn PageHandle>> {
        self.map.get(page_id).cloned()
    }

    pub fn newest(&self) -> Option<(String, Arc<dyn PageHandle>)> {
        let id = self.order.last()?;
        Some((id.clone(), self.map.get(id)?.clone()))
    }

    pub fn insert(&mut self, page_id: String, handle: Arc<dyn PageHandle>) {
        self.order.push(page_id.clone());
        self.map.insert(page_id, handle);
    }

    pub fn remove(&mut self, page_id: &str) -> Option<Arc<dyn PageHandle>> {
        self.order.retain(|id| id != page_id);
        self.map.remove(page_id)
    }

    pub fn drain(&mut self) -> Vec<Arc<dyn PageHandle>> {
        self.order.clear();
        self.map.drain().map(|(_, handle)| handle).collect()
    }
}

pub(crate) struct ContextRuntime {
    pub context_id: String,
    pub options: ContextOptions,
    /// `None` while paused or recovering; refilled on next use.
    pub lease: Mutex<Option<Lease>>,
    pub pages: StdMutex<PagesState>,
    pub ring: StdMutex<HistoryRing>,
    /// Serializes whole actions on this context.
    pub serial: Arc<Mutex<()>>,
    /// Serializes only the record/metrics/event tail (parallel batches).
    pub record_lock: StdMutex<()>,
}

impl ContextRuntime {
    pub fn new(
        context_id: String,
        options: ContextOptions,
        serial: Arc<Mutex<()>>,
        history_capacity: usize,
    ) -> Self {
        Self {
            context_id,
            options,
            lease: Mutex::new(None),
            pages: StdMutex::new(PagesState::default()),
            ring: StdMutex::new(HistoryRing::new(history_capacity)),
            serial,
            record_lock: StdMutex::new(()),
        }
    }
}
