//! Conversation table keyed by conversation id.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use vchat_models::{ConversationId, JobId};

use crate::context::ConversationContext;
use crate::error::{WorkerError, WorkerResult};

/// Shared handle to one conversation.
///
/// The mutex admits one in-flight turn per conversation; turns on
/// different conversations proceed independently.
pub type ConversationHandle = Arc<Mutex<ConversationContext>>;

#[derive(Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<ConversationId, (JobId, ConversationHandle)>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, context: ConversationContext) -> ConversationId {
        let id = context.id().clone();
        let job_id = context.job_id().clone();
        self.conversations
            .write()
            .await
            .insert(id.clone(), (job_id, Arc::new(Mutex::new(context))));
        id
    }

    pub async fn get(&self, id: &ConversationId) -> WorkerResult<ConversationHandle> {
        self.conversations
            .read()
            .await
            .get(id)
            .map(|(_, handle)| Arc::clone(handle))
            .ok_or_else(|| WorkerError::ConversationNotFound(id.clone()))
    }

    /// Drop every conversation bound to `job_id`. Returns how many were removed.
    pub async fn remove_for_job(&self, job_id: &JobId) -> usize {
        let mut conversations = self.conversations.write().await;
        let before = conversations.len();
        conversations.retain(|_, (owner, _)| owner != job_id);
        before - conversations.len()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}
