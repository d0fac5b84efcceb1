//! One conversation turn, end to end.
//!
//! A [`SessionOrchestrator`] is built per chat session. It owns that
//! session's [`ConversationMemory`] outright and shares the retriever and
//! answer generator (and through them the document store) with every
//! other session.
//!
//! # Turn protocol
//!
//! 1. The user message is appended to memory as soon as
//!    [`run`](SessionOrchestrator::run) is called.
//! 2. Retrieval runs against the history as it was before step 1.
//! 3. Answer fragments are forwarded to the caller as they arrive.
//! 4. Only once the fragment stream is exhausted without error is the
//!    assistant message appended and the session file rewritten.
//!
//! A failure in step 2 or 3 is yielded as the stream's last item and
//! step 4 is skipped. Dropping the stream early behaves the same way. A
//! failure to write the session file in step 4 is yielded as a final
//! `Err(Error::Persistence { .. })` after every fragment, so callers can
//! tell an unsaved answer from a saved one.

use std::sync::Arc;

use docchat_core::models::{ChatHistory, Message, Role};
use docchat_core::Result;
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::answer::AnswerGenerator;
use crate::memory::ConversationMemory;
use crate::retriever::HistoryAwareRetriever;

pub struct SessionOrchestrator {
    session_id: String,
    memory: ConversationMemory,
    retriever: Arc<HistoryAwareRetriever>,
    answerer: Arc<AnswerGenerator>,
}

impl SessionOrchestrator {
    /// Drive turns for `session_id`. If `memory` does not hold the session
    /// yet, an empty log is created for it.
    pub fn new(
        session_id: impl Into<String>,
        mut memory: ConversationMemory,
        retriever: Arc<HistoryAwareRetriever>,
        answerer: Arc<AnswerGenerator>,
    ) -> Self {
        let session_id = session_id.into();
        memory.get_or_create(&session_id);
        Self {
            session_id,
            memory,
            retriever,
            answerer,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current in-memory log, including any unanswered user message.
    pub fn history(&self) -> &[Message] {
        self.memory
            .history(&self.session_id)
            .map(ChatHistory::messages)
            .unwrap_or(&[])
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Run one turn and stream the answer fragments.
    pub fn run(&mut self, utterance: &str) -> impl Stream<Item = Result<String>> + Send + '_ {
        let utterance = utterance.to_string();
        let prior: Vec<Message> = self.history().to_vec();
        let appended = self
            .memory
            .append(&self.session_id, Role::User, utterance.clone());

        let session_id = self.session_id.as_str();
        let memory = &mut self.memory;
        let retriever = Arc::clone(&self.retriever);
        let answerer = Arc::clone(&self.answerer);

        async_stream::stream! {
            if let Err(e) = appended {
                yield Err(e);
                return;
            }

            let retrieval = match retriever.retrieve_for_turn(&prior, &utterance).await {
                Ok(retrieval) => retrieval,
                Err(e) => {
                    warn!(session = session_id, error = %e, "retrieval failed");
                    yield Err(e);
                    return;
                }
            };

            let mut fragments = match answerer.generate(&prior, &utterance, &retrieval.chunks).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!(session = session_id, error = %e, "generation failed to start");
                    yield Err(e);
                    return;
                }
            };

            let mut answer = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        answer.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        warn!(session = session_id, error = %e, "generation failed mid-stream");
                        yield Err(e);
                        return;
                    }
                }
            }

            if let Err(e) = memory.append(session_id, Role::Assistant, answer) {
                yield Err(e);
                return;
            }
            match memory.persist(session_id).await {
                Ok(()) => info!(
                    session = session_id,
                    query = %retrieval.query,
                    chunks = retrieval.chunks.len(),
                    "turn complete"
                ),
                Err(e) => {
                    warn!(session = session_id, error = %e, "answer generated but not saved");
                    yield Err(e);
                }
            }
        }
    }

    /// Run one turn to completion and return the full answer.
    pub async fn ask(&mut self, utterance: &str) -> Result<String> {
        let stream = self.run(utterance);
        futures::pin_mut!(stream);
        let mut answer = String::new();
        while let Some(fragment) = stream.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }
}
