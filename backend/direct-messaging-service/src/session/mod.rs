//! Conversation session
//!
//! Binds one viewer to one counterpart at a time. The session owns the
//! conversation view, the two feed legs and the draft input.
//!
//! ```text
//!   Idle ──select(Some)──▶ Loading ──legs, then history──▶ Live
//!    ▲                        │                             │
//!    └──────select(None)──────┴─────────────────────────────┘
//!                      close() from any state ──▶ Closed
//! ```
//!
//! Every counterpart change and `close` advances the session epoch. Feed
//! callbacks, send results and history results carry the epoch they were
//! started under and are discarded when it no longer matches.

mod legs;

pub use legs::Leg;

use crate::conversation::ConversationPair;
use crate::error::{AppError, AppResult};
use crate::models::{Message, NewMessage, Profile};
use crate::reconciler::{DeliveryReconciler, MergeOutcome, Source};
use crate::store::MessageStore;
use change_feed::ChangeFeed;
use legs::Legs;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No counterpart selected
    Idle,
    /// History fetch or leg subscription in flight
    Loading,
    Live,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStatus {
    Pending,
    Loaded,
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStatus {
    Pending,
    Connected,
    /// Live delivery off until `resubscribe` succeeds
    Degraded(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing was sent
    Ignored,
    Delivered(Message),
    /// Stored, but the session moved to another counterpart meanwhile
    Stale(Message),
}

struct SessionState {
    phase: SessionPhase,
    epoch: u64,
    reconciler: Option<DeliveryReconciler>,
    legs: Option<Legs>,
    history: HistoryStatus,
    feed: FeedStatus,
    profile: Option<Profile>,
    draft: String,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            epoch: 0,
            reconciler: None,
            legs: None,
            history: HistoryStatus::Pending,
            feed: FeedStatus::Pending,
            profile: None,
            draft: String::new(),
        }
    }

    /// The only path by which messages enter the view.
    fn apply(&mut self, epoch: u64, message: Message, source: Source) -> Option<MergeOutcome> {
        if epoch != self.epoch {
            debug!(
                message_id = %message.id,
                source = %source,
                delivery_epoch = epoch,
                current_epoch = self.epoch,
                "Stale delivery discarded"
            );
            return None;
        }
        let reconciler = self.reconciler.as_mut()?;
        Some(reconciler.accept(message, source))
    }

    /// Epoch and pair of the conversation currently selected
    fn current(&self) -> AppResult<(u64, ConversationPair)> {
        if self.phase == SessionPhase::Closed {
            return Err(AppError::SessionClosed);
        }
        let reconciler = self
            .reconciler
            .as_ref()
            .ok_or(AppError::NoConversationSelected)?;
        Ok((self.epoch, *reconciler.pair()))
    }

    fn install_history(&mut self, result: AppResult<Vec<Message>>) -> AppResult<usize> {
        match result {
            Ok(messages) => {
                let inserted = match self.reconciler.as_mut() {
                    Some(reconciler) => reconciler.accept_all(messages, Source::History),
                    None => 0,
                };
                self.history = HistoryStatus::Loaded;
                Ok(inserted)
            }
            Err(e) => {
                warn!(error = %e, epoch = self.epoch, "History unavailable");
                // A failed retry does not take back history already merged.
                if self.history != HistoryStatus::Loaded {
                    self.history = HistoryStatus::Unavailable(e.to_string());
                }
                Err(AppError::HistoryFetchFailed(e.to_string()))
            }
        }
    }

    /// Adopt freshly opened legs, releasing any previous pair.
    fn install_legs(&mut self, legs: Legs) {
        if let Some(old) = self.legs.replace(legs) {
            old.release();
        }
        self.feed = FeedStatus::Connected;
    }

    /// Release both legs, then drop the view.
    fn teardown(&mut self) {
        if let Some(legs) = self.legs.take() {
            legs.release();
        }
        self.reconciler = None;
        self.epoch += 1;
        self.history = HistoryStatus::Pending;
        self.feed = FeedStatus::Pending;
        self.profile = None;
        self.draft.clear();
    }
}

pub struct ConversationSession {
    viewer: Uuid,
    store: Arc<dyn MessageStore>,
    feed: Arc<dyn ChangeFeed>,
    // Feed callbacks only hold a Weak reference, so dropping the session
    // drops the legs and releases them.
    state: Arc<Mutex<SessionState>>,
}

impl ConversationSession {
    /// Refuses to open without a viewer.
    pub fn open(
        viewer: Option<Uuid>,
        store: Arc<dyn MessageStore>,
        feed: Arc<dyn ChangeFeed>,
    ) -> AppResult<Self> {
        let viewer = viewer
            .filter(|id| !id.is_nil())
            .ok_or(AppError::Unauthorized)?;

        Ok(Self {
            viewer,
            store,
            feed,
            state: Arc::new(Mutex::new(SessionState::new())),
        })
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    /// Switch to `counterpart` (or to no conversation).
    ///
    /// The previous legs are released before the old view is dropped. Both
    /// new legs are open before history is read, so a row written during the
    /// load arrives through one path or the other. History and subscription
    /// failures do not fail this call; they are recorded in [`HistoryStatus`]
    /// and [`FeedStatus`] and the session still goes live.
    ///
    /// Selecting the counterpart that is already live is a no-op. Selecting
    /// it while it is still loading restarts the load, and this call returns
    /// once that load is done; the superseded call returns early.
    pub async fn select_counterpart(&self, counterpart: Option<Uuid>) -> AppResult<()> {
        let pair = counterpart
            .map(|id| ConversationPair::resolve(self.viewer, id))
            .transpose()?;

        let epoch = {
            let mut state = self.state.lock().await;
            if state.phase == SessionPhase::Closed {
                return Err(AppError::SessionClosed);
            }
            let same_pair = matches!(
                (pair.as_ref(), state.reconciler.as_ref()),
                (Some(pair), Some(reconciler)) if reconciler.pair() == pair
            );
            if same_pair && state.phase == SessionPhase::Live {
                return Ok(());
            }

            let draft = std::mem::take(&mut state.draft);
            state.teardown();
            if same_pair {
                state.draft = draft;
            }
            match pair {
                Some(pair) => {
                    state.phase = SessionPhase::Loading;
                    state.reconciler = Some(DeliveryReconciler::new(pair));
                }
                None => state.phase = SessionPhase::Idle,
            }
            state.epoch
        };

        let Some(pair) = pair else {
            debug!(viewer_id = %self.viewer, "No conversation selected");
            return Ok(());
        };

        info!(
            viewer_id = %self.viewer,
            counterpart_id = %pair.counterpart(),
            epoch,
            "Opening conversation"
        );

        let (history, profile) = tokio::join!(
            self.attach_then_fetch(epoch, pair),
            self.store.find_profile(pair.counterpart()),
        );

        let mut state = self.state.lock().await;
        let Some(history) = history.filter(|_| state.epoch == epoch) else {
            debug!(epoch, current_epoch = state.epoch, "Conversation load superseded");
            return Ok(());
        };

        let _ = state.install_history(history);

        state.profile = profile.unwrap_or_else(|e| {
            warn!(counterpart_id = %pair.counterpart(), error = %e, "Counterpart profile unavailable");
            None
        });

        state.phase = SessionPhase::Live;
        Ok(())
    }

    /// Open both legs, then read history.
    ///
    /// `None` when the session moved on before the legs were up; the legs are
    /// dropped and released on the way out.
    async fn attach_then_fetch(
        &self,
        epoch: u64,
        pair: ConversationPair,
    ) -> Option<AppResult<Vec<Message>>> {
        let legs = Legs::open(self.feed.as_ref(), Arc::downgrade(&self.state), epoch, pair).await;

        {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                return None;
            }
            match legs {
                Ok(legs) => state.install_legs(legs),
                Err(e) => {
                    warn!(counterpart_id = %pair.counterpart(), error = %e, "Live delivery degraded");
                    state.feed = FeedStatus::Degraded(e.to_string());
                }
            }
        }

        Some(self.store.fetch_history(&pair).await)
    }

    /// Send `content` to the current counterpart.
    ///
    /// Blank input is a no-op. On failure nothing enters the view.
    pub async fn send(&self, content: &str) -> AppResult<SendOutcome> {
        if content.trim().is_empty() {
            return Ok(SendOutcome::Ignored);
        }

        let (epoch, pair) = self.state.lock().await.current()?;
        let message = NewMessage::parse(self.viewer, pair.counterpart(), content)?;

        let row = self.store.insert(message).await.map_err(|e| {
            warn!(counterpart_id = %pair.counterpart(), error = %e, "Send failed");
            AppError::SendFailed(e.to_string())
        })?;

        let mut state = self.state.lock().await;
        match state.apply(epoch, row.clone(), Source::LocalSend) {
            Some(_) => Ok(SendOutcome::Delivered(row)),
            None => Ok(SendOutcome::Stale(row)),
        }
    }

    pub async fn set_draft(&self, text: impl Into<String>) {
        self.state.lock().await.draft = text.into();
    }

    pub async fn draft(&self) -> String {
        self.state.lock().await.draft.clone()
    }

    /// Send the draft; it is cleared only once the send is delivered.
    pub async fn send_draft(&self) -> AppResult<SendOutcome> {
        let draft = self.draft().await;
        let outcome = self.send(&draft).await?;

        if let SendOutcome::Delivered(_) = &outcome {
            let mut state = self.state.lock().await;
            // Edits made while the send was in flight are kept.
            if state.draft == draft {
                state.draft.clear();
            }
        }
        Ok(outcome)
    }

    /// Fetch history again, merging whatever is new.
    pub async fn retry_history(&self) -> AppResult<usize> {
        let (epoch, pair) = self.state.lock().await.current()?;
        let result = self.store.fetch_history(&pair).await;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return Ok(0);
        }
        state.install_history(result)
    }

    /// Replace both legs with fresh subscriptions, then catch up.
    ///
    /// The new legs are open before the old ones are released, and history is
    /// read once they are, so rows written while delivery was down are merged.
    /// When the new legs cannot be opened the current ones stay in place.
    pub async fn resubscribe(&self) -> AppResult<()> {
        let (epoch, pair) = self.state.lock().await.current()?;

        let result = Legs::open(self.feed.as_ref(), Arc::downgrade(&self.state), epoch, pair).await;

        {
            let mut state = self.state.lock().await;
            if state.epoch != epoch {
                return Ok(());
            }
            match result {
                Ok(legs) => {
                    state.install_legs(legs);
                    info!(counterpart_id = %pair.counterpart(), "Live delivery restored");
                }
                Err(e) => {
                    if state.legs.is_none() {
                        state.feed = FeedStatus::Degraded(e.to_string());
                    }
                    return Err(e);
                }
            }
        }

        let history = self.store.fetch_history(&pair).await;

        let mut state = self.state.lock().await;
        if state.epoch != epoch {
            return Ok(());
        }
        match history {
            Ok(messages) => {
                state.install_history(Ok(messages))?;
                Ok(())
            }
            Err(e) => {
                // Rows may have been missed while delivery was down.
                warn!(counterpart_id = %pair.counterpart(), error = %e, "Catch-up after resubscribe failed");
                state.history = HistoryStatus::Unavailable(e.to_string());
                Err(AppError::HistoryFetchFailed(e.to_string()))
            }
        }
    }

    /// Release the legs and discard the view. Terminal.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.phase == SessionPhase::Closed {
            return;
        }
        state.teardown();
        state.phase = SessionPhase::Closed;
        info!(viewer_id = %self.viewer, "Conversation session closed");
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn counterpart(&self) -> Option<Uuid> {
        let state = self.state.lock().await;
        state.reconciler.as_ref().map(|r| r.pair().counterpart())
    }

    /// Snapshot of the view, oldest first
    pub async fn messages(&self) -> Vec<Message> {
        let state = self.state.lock().await;
        state
            .reconciler
            .as_ref()
            .map(|r| r.view().messages().to_vec())
            .unwrap_or_default()
    }

    pub async fn history_status(&self) -> HistoryStatus {
        self.state.lock().await.history.clone()
    }

    pub async fn feed_status(&self) -> FeedStatus {
        self.state.lock().await.feed.clone()
    }

    pub async fn profile(&self) -> Option<Profile> {
        self.state.lock().await.profile.clone()
    }

    /// Live, history loaded and both legs connected; only then is the view
    /// gap-free.
    pub async fn is_consistent(&self) -> bool {
        let state = self.state.lock().await;
        state.phase == SessionPhase::Live
            && state.history == HistoryStatus::Loaded
            && state.feed == FeedStatus::Connected
    }
}
