//! Chat session state machine.
//!
//! ```text
//! Idle ──first use──▶ Provisioning ──pull complete──▶ Ready
//!   ▲                      │
//!   └──────failure─────────┘
//! ```
//!
//! Every completion re-sends the transcript's System turns before the
//! question, because the backend conversation is stateful and ordered.

use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use ragloop_core::{
    ChatError, ChatHandle, ChatTurn, FragmentStream, ModelPresence, ModelRegistry,
    ProvisionUpdate, Role, Transcript, ensure_model,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Capacity of the provisioning progress channel.
const PROGRESS_CAPACITY: usize = 64;

/// Lifecycle of a [`ChatSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No model confirmed yet
    Idle,
    /// Checking the registry or pulling the model
    Provisioning,
    /// Accepts turns
    Ready,
}

/// One conversation with a chat backend.
///
/// The session owns its backend handle; operations take `&mut self`, so at
/// most one is in flight at a time.
pub struct ChatSession {
    registry: Arc<dyn ModelRegistry>,
    handle: Box<dyn ChatHandle>,
    model: String,
    state: SessionState,
    updates: broadcast::Sender<ProvisionUpdate>,
}

impl ChatSession {
    /// Session for the model `handle` is configured with.
    pub fn new(registry: Arc<dyn ModelRegistry>, handle: Box<dyn ChatHandle>) -> Self {
        let (updates, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            model: handle.model().to_string(),
            registry,
            handle,
            state: SessionState::Idle,
            updates,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Subscribe to model pull progress.
    pub fn subscribe(&self) -> broadcast::Receiver<ProvisionUpdate> {
        self.updates.subscribe()
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("Chat session {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }

    /// Provision the model if the backend has none, then select it.
    pub async fn ensure_ready(&mut self, cancel: &CancellationToken) -> Result<(), ChatError> {
        if self.state == SessionState::Ready {
            return Ok(());
        }
        self.transition(SessionState::Provisioning);

        let outcome = ensure_model(
            self.registry.as_ref(),
            &self.model,
            ModelPresence::AnyModel,
            Some(&self.updates),
            cancel,
        )
        .await;
        match outcome {
            Ok(outcome) => {
                self.handle.select_model(&self.model);
                info!("Chat model {} ready ({:?})", self.model, outcome);
                self.transition(SessionState::Ready);
                Ok(())
            }
            Err(err) => {
                self.transition(SessionState::Idle);
                Err(err.into())
            }
        }
    }

    /// Send every System turn to the backend, draining each reply.
    pub async fn prime_system(
        &mut self,
        turns: &[ChatTurn],
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        let mut primed = 0usize;
        for turn in turns.iter().filter(|turn| turn.role == Role::System) {
            let mut reply = self.handle.send_as(Role::System, &turn.content, cancel);
            while let Some(fragment) = reply.next().await {
                fragment?;
            }
            primed += 1;
        }
        debug!("Primed {} system turns", primed);
        Ok(())
    }

    /// Make the session ready and prime the transcript's System turns.
    pub async fn init(
        &mut self,
        transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<(), ChatError> {
        self.ensure_ready(cancel).await?;
        self.prime_system(transcript.turns(), cancel).await
    }

    /// Answer the last turn and append the full reply as an Assistant turn.
    pub async fn complete_non_streaming(
        &mut self,
        transcript: &mut Transcript,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        let mut fragments = self.complete_streaming(transcript, cancel);
        let mut reply = String::new();
        while let Some(fragment) = fragments.next().await {
            reply.push_str(&fragment?);
        }
        Ok(reply)
    }

    /// Answer the last turn, streaming reply fragments as they arrive.
    ///
    /// The Assistant turn is appended only when the backend stream completes;
    /// a cancelled, failed or dropped stream leaves the transcript untouched.
    pub fn complete_streaming<'a>(
        &'a mut self,
        transcript: &'a mut Transcript,
        cancel: &'a CancellationToken,
    ) -> FragmentStream<'a> {
        Box::pin(stream! {
            let Some(question) = transcript.last().map(|turn| turn.content.clone()) else {
                yield Err(ChatError::EmptyTranscript);
                return;
            };
            if let Err(err) = self.ensure_ready(cancel).await {
                yield Err(err);
                return;
            }
            if let Err(err) = self.prime_system(transcript.turns(), cancel).await {
                yield Err(err);
                return;
            }

            let mut reply = String::new();
            {
                let mut fragments = self.handle.send_as(Role::User, &question, cancel);
                while let Some(fragment) = fragments.next().await {
                    match fragment {
                        Ok(fragment) => {
                            reply.push_str(&fragment);
                            yield Ok(fragment);
                        }
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
            }
            if cancel.is_cancelled() {
                yield Err(ChatError::Cancelled);
                return;
            }

            debug!("Committing {} char reply", reply.len());
            transcript.add_assistant_message(reply);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use ragloop_core::{ModelInfo, ProvisionError, PullProgress};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<(Role, String)>>>;

    struct Registry {
        models: Vec<String>,
        pulls: AtomicUsize,
        fail: bool,
    }

    impl Registry {
        fn new(models: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                models: models.iter().map(|m| (*m).to_string()).collect(),
                pulls: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                models: Vec::new(),
                pulls: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl ModelRegistry for Registry {
        async fn list_local_models(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ModelInfo>, ProvisionError> {
            Ok(self
                .models
                .iter()
                .map(|name| ModelInfo { name: name.clone() })
                .collect())
        }

        fn pull_model<'a>(
            &'a self,
            model: &'a str,
            _cancel: &'a CancellationToken,
        ) -> BoxStream<'a, Result<PullProgress, ProvisionError>> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            let event = if self.fail {
                Err(ProvisionError::failed(model, "file does not exist"))
            } else {
                Ok(PullProgress::new("success", 0, 0))
            };
            futures::stream::iter(vec![event]).boxed()
        }
    }

    /// Records every send and replies with fixed fragments.
    struct ScriptedHandle {
        model: String,
        selected: Arc<Mutex<Vec<String>>>,
        sent: Log,
        reply: Vec<&'static str>,
    }

    impl ChatHandle for ScriptedHandle {
        fn model(&self) -> &str {
            &self.model
        }

        fn select_model(&mut self, model: &str) {
            self.selected.lock().unwrap().push(model.to_string());
            self.model = model.to_string();
        }

        fn send_as<'a>(
            &'a mut self,
            role: Role,
            content: &'a str,
            cancel: &'a CancellationToken,
        ) -> FragmentStream<'a> {
            self.sent.lock().unwrap().push((role, content.to_string()));
            let reply = self.reply.clone();
            Box::pin(stream! {
                for fragment in reply {
                    if cancel.is_cancelled() {
                        yield Err(ChatError::Cancelled);
                        return;
                    }
                    yield Ok(fragment.to_string());
                }
            })
        }
    }

    struct Fixture {
        session: ChatSession,
        sent: Log,
        selected: Arc<Mutex<Vec<String>>>,
    }

    fn fixture(registry: Arc<Registry>) -> Fixture {
        let sent = Log::default();
        let selected = Arc::new(Mutex::new(Vec::new()));
        let handle = ScriptedHandle {
            model: "llama3.2:1b".to_string(),
            selected: selected.clone(),
            sent: sent.clone(),
            reply: vec!["Don ", "Ni ", "is a hero."],
        };
        Fixture {
            session: ChatSession::new(registry, Box::new(handle)),
            sent,
            selected,
        }
    }

    fn transcript() -> Transcript {
        let mut transcript = Transcript::new();
        transcript.add_system_message("You are a storyteller.");
        transcript.add_system_message("Here's what you know: Don Ni lives on DS9.");
        transcript.add_user_message("Who is Don Ni?");
        transcript
    }

    #[tokio::test]
    async fn test_system_turns_reach_backend_before_question() {
        let mut f = fixture(Registry::new(&["llama3.2:1b"]));
        let mut transcript = transcript();

        f.session
            .complete_non_streaming(&mut transcript, &CancellationToken::new())
            .await
            .unwrap();

        let sent = f.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (Role::System, "You are a storyteller.".to_string()),
                (
                    Role::System,
                    "Here's what you know: Don Ni lives on DS9.".to_string()
                ),
                (Role::User, "Who is Don Ni?".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_streaming_appends_assistant_turn() {
        let mut f = fixture(Registry::new(&["llama3.2:1b"]));
        let mut transcript = transcript();

        let reply = f
            .session
            .complete_non_streaming(&mut transcript, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply, "Don Ni is a hero.");
        assert_eq!(transcript.len(), 4);
        assert_eq!(
            transcript.last(),
            Some(&ChatTurn::assistant("Don Ni is a hero."))
        );
    }

    #[tokio::test]
    async fn test_streaming_commits_after_completion() {
        let mut f = fixture(Registry::new(&["llama3.2:1b"]));
        let mut transcript = transcript();
        let cancel = CancellationToken::new();

        let fragments: Vec<String> = f
            .session
            .complete_streaming(&mut transcript, &cancel)
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["Don ", "Ni ", "is a hero."]);
        assert_eq!(transcript.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_leaves_transcript_unchanged() {
        let mut f = fixture(Registry::new(&["llama3.2:1b"]));
        let mut transcript = transcript();
        let before = transcript.clone();
        let cancel = CancellationToken::new();

        {
            let mut fragments = f.session.complete_streaming(&mut transcript, &cancel);
            assert_eq!(fragments.next().await.unwrap().unwrap(), "Don ");
            cancel.cancel();
            let rest: Vec<_> = fragments.collect().await;
            assert!(matches!(rest.as_slice(), [Err(ChatError::Cancelled)]));
        }

        assert_eq!(transcript, before);
    }

    #[tokio::test]
    async fn test_dropped_stream_leaves_transcript_unchanged() {
        let mut f = fixture(Registry::new(&["llama3.2:1b"]));
        let mut transcript = transcript();
        let before = transcript.clone();
        let cancel = CancellationToken::new();

        drop(f.session.complete_streaming(&mut transcript, &cancel));
        {
            let mut fragments = f.session.complete_streaming(&mut transcript, &cancel);
            fragments.next().await;
        }

        assert_eq!(transcript, before);
    }

    #[tokio::test]
    async fn test_empty_registry_is_provisioned_once() {
        let registry = Registry::new(&[]);
        let mut f = fixture(registry.clone());
        let cancel = CancellationToken::new();
        assert_eq!(f.session.state(), SessionState::Idle);

        f.session.ensure_ready(&cancel).await.unwrap();
        f.session.ensure_ready(&cancel).await.unwrap();

        assert_eq!(f.session.state(), SessionState::Ready);
        assert_eq!(registry.pulls.load(Ordering::SeqCst), 1);
        assert_eq!(*f.selected.lock().unwrap(), vec!["llama3.2:1b".to_string()]);
    }

    #[tokio::test]
    async fn test_populated_registry_skips_pull() {
        let registry = Registry::new(&["some-other-model"]);
        let mut f = fixture(registry.clone());

        f.session
            .init(&transcript(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(f.session.state(), SessionState::Ready);
        assert_eq!(registry.pulls.load(Ordering::SeqCst), 0);
        let roles: Vec<Role> = f.sent.lock().unwrap().iter().map(|(r, _)| *r).collect();
        assert_eq!(roles, vec![Role::System, Role::System]);
    }

    #[tokio::test]
    async fn test_failed_provisioning_returns_to_idle() {
        let mut f = fixture(Registry::failing());
        let mut transcript = transcript();

        let err = f
            .session
            .complete_non_streaming(&mut transcript, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Provisioning { .. }));
        assert_eq!(f.session.state(), SessionState::Idle);
        assert!(f.sent.lock().unwrap().is_empty());
        assert_eq!(transcript.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_transcript() {
        let mut f = fixture(Registry::new(&["llama3.2:1b"]));
        let err = f
            .session
            .complete_non_streaming(&mut Transcript::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyTranscript));
    }
}
