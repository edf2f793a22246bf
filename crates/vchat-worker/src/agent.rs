//! Conversational agent answering questions about an analyzed video.

use std::sync::Arc;
use tracing::{info, warn};

use vchat_models::{ConversationId, ConversationTurn, JobId};
use vchat_vlm_client::{ModelParams, VisionModel, VlmRequest};

use crate::config::ChatConfig;
use crate::context::ConversationContext;
use crate::conversations::ConversationStore;
use crate::error::WorkerResult;
use crate::prompts::{chat_preamble, chat_prompt};
use crate::relevance::select_relevant_events;
use crate::store::JobStore;

/// Runs chat turns against the results of finished jobs.
#[derive(Clone)]
pub struct ChatAgent {
    jobs: Arc<JobStore>,
    conversations: Arc<ConversationStore>,
    model: Arc<dyn VisionModel>,
    config: ChatConfig,
}

impl ChatAgent {
    pub fn new(
        jobs: Arc<JobStore>,
        conversations: Arc<ConversationStore>,
        model: Arc<dyn VisionModel>,
        config: ChatConfig,
    ) -> Self {
        Self {
            jobs,
            conversations,
            model,
            config,
        }
    }

    /// Open a conversation about a finished job.
    pub async fn start_conversation(&self, job_id: &JobId) -> WorkerResult<ConversationId> {
        let results = self.jobs.results(job_id).await?;
        let preamble = chat_preamble(
            &results.summary,
            &results.events,
            results.asset.duration_secs,
        );
        let context = ConversationContext::new(
            ConversationId::new(),
            job_id.clone(),
            preamble,
            self.config.context_budget,
        );
        let id = self.conversations.insert(context).await;
        info!(conversation_id = %id, job_id = %job_id, "Conversation started");
        Ok(id)
    }

    /// Answer one user message.
    ///
    /// On failure the user turn stays recorded; calling again with the same
    /// text retries it without recording it twice.
    pub async fn respond(
        &self,
        conversation_id: &ConversationId,
        user_text: &str,
    ) -> WorkerResult<String> {
        let handle = self.conversations.get(conversation_id).await?;
        let mut context = handle.lock().await;

        let job_id = context.job_id().clone();
        let results = self.jobs.results(&job_id).await?;
        let cancel = self.jobs.cancel_receiver(&job_id).await?;

        let retrying = context.is_pending_user_text(user_text);
        if !retrying {
            context.add_turn(ConversationTurn::user(user_text));
        }

        let grounding = select_relevant_events(
            user_text,
            &results.events,
            self.config.grounding_events,
            self.config.relevance_floor,
        );
        let question = context
            .pending_user_turn()
            .map(|turn| turn.text.clone())
            .unwrap_or_else(|| user_text.to_string());
        let history_len = context.turns().len().saturating_sub(1);
        let prompt = chat_prompt(context.turns().take(history_len), &grounding, &question);

        let request = VlmRequest::new(prompt, ModelParams::chat())
            .with_system(context.preamble().text.clone());

        let reply = match self.model.query(&request, &cancel).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    conversation_id = %conversation_id,
                    job_id = %job_id,
                    error = %e,
                    "Chat turn failed, user turn kept for retry"
                );
                return Err(e.into());
            }
        };

        let report = context.add_turn(ConversationTurn::assistant(reply.clone()));
        info!(
            conversation_id = %conversation_id,
            job_id = %job_id,
            grounding_events = grounding.len(),
            evicted = report.evicted,
            retry = retrying,
            "Chat turn answered"
        );
        Ok(reply)
    }

    /// Snapshot of the retained turns, oldest first.
    pub async fn turns(&self, conversation_id: &ConversationId) -> WorkerResult<Vec<ConversationTurn>> {
        let handle = self.conversations.get(conversation_id).await?;
        let context = handle.lock().await;
        Ok(context.turns().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Mutex;
    use tokio::sync::watch;
    use vchat_analysis::build_digest;
    use vchat_models::{
        AnalysisJob, Event, EventDraft, EventId, EventType, JobState, Role, Severity, VideoAsset,
        VideoFormat,
    };
    use vchat_vlm_client::{VlmError, VlmResult};

    use crate::error::WorkerError;

    /// Replays scripted results and records every prompt it receives.
    struct ScriptedModel {
        replies: Mutex<Vec<VlmResult<String>>>,
        prompts: Mutex<Vec<VlmRequest>>,
    }

    impl ScriptedModel {
        fn new(mut replies: Vec<VlmResult<String>>) -> Self {
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VisionModel for ScriptedModel {
        async fn query(
            &self,
            request: &VlmRequest,
            _cancel: &watch::Receiver<bool>,
        ) -> VlmResult<String> {
            self.prompts.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok("ok".to_string()))
        }
    }

    fn walk_event() -> Event {
        Event::new(EventDraft {
            event_type: EventType::Action,
            start_ts: 0.0,
            end_ts: 4.0,
            description: "a person walks".into(),
            confidence: 0.9,
            severity: Severity::Medium,
            objects: vec!["person".into()],
            source_frames: BTreeSet::new(),
        })
        .unwrap()
        .with_id(EventId(1))
    }

    async fn job(store: &JobStore, finish: bool) -> JobId {
        let asset = VideoAsset::new("/tmp/walk.mp4", 10.0, 30.0, VideoFormat::Mp4);
        let job = AnalysisJob::new(asset.id.clone());
        let id = job.id.clone();
        store.insert(job, asset).await;
        if finish {
            for stage in [
                JobState::Sampling,
                JobState::Querying,
                JobState::Extracting,
                JobState::Summarizing,
            ] {
                store.advance(&id, stage).await.unwrap();
            }
            let events = vec![walk_event()];
            let summary = build_digest(&events, 10.0, 5);
            store.complete(&id, events, summary).await.unwrap();
        }
        id
    }

    fn agent(jobs: Arc<JobStore>, model: Arc<ScriptedModel>) -> ChatAgent {
        ChatAgent::new(
            jobs,
            Arc::new(ConversationStore::new()),
            model,
            ChatConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_job_not_ready() {
        let jobs = Arc::new(JobStore::new());
        let id = job(&jobs, false).await;
        let agent = agent(jobs, Arc::new(ScriptedModel::new(vec![])));

        let err = agent.start_conversation(&id).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobNotReady { state: JobState::Pending, .. }));
    }

    #[tokio::test]
    async fn test_respond_grounds_prompt() {
        let jobs = Arc::new(JobStore::new());
        let id = job(&jobs, true).await;
        let model = Arc::new(ScriptedModel::new(vec![Ok("They walk in.".to_string())]));
        let agent = agent(jobs, model.clone());

        let conversation = agent.start_conversation(&id).await.unwrap();
        let reply = agent
            .respond(&conversation, "Is anyone walking?")
            .await
            .unwrap();
        assert_eq!(reply, "They walk in.");

        let prompts = model.prompts.lock().unwrap();
        let request = &prompts[0];
        assert!(request.images.is_empty());
        assert!(request.system.as_deref().unwrap().contains("Timeline:"));
        assert!(request.prompt.contains("Relevant events:"));
        assert!(request.prompt.contains("a person walks"));
        assert!(request.prompt.ends_with("User question: Is anyone walking?"));
        drop(prompts);

        let turns = agent.turns(&conversation).await.unwrap();
        let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_retry_after_unavailable_does_not_duplicate() {
        let jobs = Arc::new(JobStore::new());
        let id = job(&jobs, true).await;
        let model = Arc::new(ScriptedModel::new(vec![
            Err(VlmError::Unavailable {
                attempts: 3,
                last: Box::new(VlmError::Timeout(60)),
            }),
            Ok("A person walks from 00:00 to 00:04.".to_string()),
        ]));
        let agent = agent(jobs, model.clone());
        let conversation = agent.start_conversation(&id).await.unwrap();

        let err = agent
            .respond(&conversation, "what happens?")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        let turns = agent.turns(&conversation).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, Role::User);

        agent.respond(&conversation, "what happens?").await.unwrap();
        let turns = agent.turns(&conversation).await.unwrap();
        let texts: Vec<(Role, &str)> = turns.iter().map(|t| (t.role, t.text.as_str())).collect();
        assert_eq!(
            texts,
            [
                (Role::User, "what happens?"),
                (Role::Assistant, "A person walks from 00:00 to 00:04."),
            ]
        );

        // The retried prompt carries no history line for the pending question
        let prompts = model.prompts.lock().unwrap();
        assert!(!prompts[1].prompt.contains("Conversation so far"));
    }

    #[tokio::test]
    async fn test_retry_of_truncated_question_does_not_duplicate() {
        let jobs = Arc::new(JobStore::new());
        let id = job(&jobs, true).await;
        let model = Arc::new(ScriptedModel::new(vec![
            Err(VlmError::Unavailable {
                attempts: 3,
                last: Box::new(VlmError::Timeout(60)),
            }),
            Ok("Someone walks.".to_string()),
        ]));
        let agent = ChatAgent::new(
            jobs,
            Arc::new(ConversationStore::new()),
            model.clone(),
            ChatConfig {
                context_budget: 1000,
                ..ChatConfig::default()
            },
        );
        let conversation = agent.start_conversation(&id).await.unwrap();
        let question = "is anyone walking ".repeat(311);
        assert!(question.len() > 5000);

        assert!(agent.respond(&conversation, &question).await.is_err());
        agent.respond(&conversation, &question).await.unwrap();

        let turns = agent.turns(&conversation).await.unwrap();
        let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant]);
        assert!(turns[0].text.ends_with('…'));
        assert!(turns[0].text.len() < question.len());
        assert_eq!(model.prompts.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let jobs = Arc::new(JobStore::new());
        let agent = agent(jobs, Arc::new(ScriptedModel::new(vec![])));
        let err = agent
            .respond(&ConversationId::from_string("missing"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ConversationNotFound(_)));
    }
}
