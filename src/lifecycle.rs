//! Lifecycle state machine for the user's container.
//!
//! This is the only place container state transitions happen. Commands are
//! validated against the current state before any network call; after a
//! successful command the state is updated optimistically and then corrected
//! by reconciling against a fresh snapshot, which always wins. The backend
//! may accept a command and still reject it asynchronously, so command
//! response bodies are never trusted.

use crate::gateway::{ApiError, ContainerAction, ContainerApi, ContainerRecord};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// What the client believes about the container. `running` implies `exists`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    pub exists: bool,
    pub running: bool,
    pub id: Option<String>,
}

/// A point-in-time fetch result used to reconcile [`ContainerState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    pub exists: bool,
    pub running: bool,
    pub id: Option<String>,
}

impl ContainerSnapshot {
    /// A snapshot for an identity the backend knows nothing about.
    pub fn absent() -> Self {
        Self {
            exists: false,
            running: false,
            id: None,
        }
    }

    pub fn from_record(record: &ContainerRecord) -> Self {
        Self {
            exists: true,
            running: record.is_running(),
            id: Some(record.id.clone()),
        }
    }
}

/// Errors from lifecycle commands.
#[derive(Debug, Clone)]
pub enum LifecycleError {
    /// The command is not valid in the current state; nothing was sent.
    Precondition { message: String },
    /// The command reached the backend and failed there, or never reached it.
    Api(ApiError),
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Precondition { message } => write!(f, "{}", message),
            Self::Api(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<ApiError> for LifecycleError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

/// Optimistic transitions applied right after a command is accepted.
#[derive(Debug, Clone, Copy)]
enum Optimistic {
    Created,
    Started,
    Stopped,
    Removed,
}

/// Drives the container through its lifecycle and owns the client-side state.
pub struct LifecycleController<A: ContainerApi> {
    api: Arc<A>,
    identity: String,
    state: ContainerState,
}

impl<A: ContainerApi> LifecycleController<A> {
    pub fn new(api: Arc<A>, identity: String) -> Self {
        Self {
            api,
            identity,
            state: ContainerState::default(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> &ContainerState {
        &self.state
    }

    /// Fetches a fresh snapshot and reconciles. A fetch failure leaves the
    /// previous state untouched; stale state beats no state on a transient
    /// error.
    pub async fn refresh(&mut self) -> Result<ContainerState, LifecycleError> {
        let snapshot = match self.api.container_info(&self.identity).await? {
            Some(record) => ContainerSnapshot::from_record(&record),
            None => ContainerSnapshot::absent(),
        };
        self.reconcile(&snapshot);
        Ok(self.state.clone())
    }

    /// Overwrites state from a snapshot. Idempotent; the single source of
    /// truth for state corrections. A snapshot that claims `running` without
    /// `exists` is normalized rather than trusted.
    pub fn reconcile(&mut self, snapshot: &ContainerSnapshot) {
        self.state = ContainerState {
            exists: snapshot.exists,
            running: snapshot.exists && snapshot.running,
            id: if snapshot.exists {
                snapshot.id.clone()
            } else {
                None
            },
        };
    }

    /// Creates the container. Valid only while none exists.
    pub async fn create(
        &mut self,
        username: &str,
        session_token: &str,
    ) -> Result<(), LifecycleError> {
        if self.state.exists {
            return Err(LifecycleError::Precondition {
                message: "A container already exists for this user; remove it before creating a new one".to_string(),
            });
        }
        self.api.create_container(username, session_token).await?;
        self.apply_optimistic(Optimistic::Created);
        self.refresh_after_command().await;
        Ok(())
    }

    /// Starts a stopped container.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        self.require_stopped("start")?;
        self.run_action(ContainerAction::Start, Optimistic::Started)
            .await
    }

    /// Stops a running container.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        self.require_running("stop")?;
        self.run_action(ContainerAction::Stop, Optimistic::Stopped)
            .await
    }

    /// Restarts a running container.
    pub async fn restart(&mut self) -> Result<(), LifecycleError> {
        self.require_running("restart")?;
        self.run_action(ContainerAction::Restart, Optimistic::Started)
            .await
    }

    /// Removes a stopped container.
    pub async fn remove(&mut self) -> Result<(), LifecycleError> {
        self.require_stopped("remove")?;
        self.run_action(ContainerAction::Remove, Optimistic::Removed)
            .await
    }

    fn require_stopped(&self, verb: &str) -> Result<(), LifecycleError> {
        if !self.state.exists {
            return Err(LifecycleError::Precondition {
                message: format!("No container exists to {}; create one first", verb),
            });
        }
        if self.state.running {
            return Err(LifecycleError::Precondition {
                message: format!("Cannot {} while the container is running; stop it first", verb),
            });
        }
        Ok(())
    }

    fn require_running(&self, verb: &str) -> Result<(), LifecycleError> {
        if !self.state.exists {
            return Err(LifecycleError::Precondition {
                message: format!("No container exists to {}; create one first", verb),
            });
        }
        if !self.state.running {
            return Err(LifecycleError::Precondition {
                message: format!("Cannot {} a stopped container; start it first", verb),
            });
        }
        Ok(())
    }

    async fn run_action(
        &mut self,
        action: ContainerAction,
        optimistic: Optimistic,
    ) -> Result<(), LifecycleError> {
        self.api.container_action(&self.identity, action).await?;
        self.apply_optimistic(optimistic);
        self.refresh_after_command().await;
        Ok(())
    }

    fn apply_optimistic(&mut self, transition: Optimistic) {
        match transition {
            Optimistic::Created => {
                self.state.exists = true;
                self.state.running = false;
            }
            Optimistic::Started => {
                self.state.exists = true;
                self.state.running = true;
            }
            Optimistic::Stopped => {
                self.state.running = false;
            }
            Optimistic::Removed => {
                self.state = ContainerState::default();
            }
        }
    }

    /// The command succeeded; the follow-up fetch is corrective only, so its
    /// failure keeps the optimistic state.
    async fn refresh_after_command(&mut self) {
        if let Err(err) = self.refresh().await {
            tracing::warn!("State refresh after command failed: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{PortInfo, StatsPayload};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Container API stub with scripted info responses and a call counter.
    #[derive(Default)]
    struct StubApi {
        info: Mutex<Vec<Result<Option<ContainerRecord>, ApiError>>>,
        calls: AtomicU64,
    }

    impl StubApi {
        fn pushing_info(responses: Vec<Result<Option<ContainerRecord>, ApiError>>) -> Self {
            Self {
                info: Mutex::new(responses),
                calls: AtomicU64::new(0),
            }
        }

        fn total_calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn record(id: &str, status: &str) -> ContainerRecord {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": "code-server-alice-0123456789abcdef",
            "status": status,
        }))
        .unwrap()
    }

    #[async_trait]
    impl ContainerApi for StubApi {
        async fn container_info(&self, _: &str) -> Result<Option<ContainerRecord>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut info = self.info.lock().unwrap();
            if info.is_empty() {
                Ok(None)
            } else {
                info.remove(0)
            }
        }

        async fn container_stats(&self, _: &str) -> Result<StatsPayload, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            unimplemented!("not used by lifecycle tests")
        }

        async fn container_action(&self, _: &str, _: ContainerAction) -> Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn create_container(&self, _: &str, _: &str) -> Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn container_ports(&self, _: &str) -> Result<PortInfo, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            unimplemented!("not used by lifecycle tests")
        }
    }

    fn controller(api: StubApi) -> LifecycleController<StubApi> {
        LifecycleController::new(Arc::new(api), "code-server-alice-0123456789abcdef".to_string())
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut ctl = controller(StubApi::default());
        let snapshot = ContainerSnapshot {
            exists: true,
            running: true,
            id: Some("abc".to_string()),
        };

        ctl.reconcile(&snapshot);
        let once = ctl.state().clone();
        ctl.reconcile(&snapshot);
        assert_eq!(*ctl.state(), once);
    }

    #[test]
    fn reconcile_normalizes_running_without_exists() {
        let mut ctl = controller(StubApi::default());
        ctl.reconcile(&ContainerSnapshot {
            exists: false,
            running: true,
            id: Some("ghost".to_string()),
        });
        assert!(!ctl.state().exists);
        assert!(!ctl.state().running);
        assert!(ctl.state().id.is_none());
    }

    #[tokio::test]
    async fn refresh_for_never_existing_identity_is_not_an_error() {
        let mut ctl = controller(StubApi::pushing_info(vec![Ok(None)]));
        let state = ctl.refresh().await.unwrap();
        assert!(!state.exists);
        assert!(!state.running);
    }

    #[tokio::test]
    async fn refresh_failure_keeps_previous_state() {
        let mut ctl = controller(StubApi::pushing_info(vec![
            Ok(Some(record("abc", "running"))),
            Err(ApiError::Transport {
                message: "connection refused".to_string(),
            }),
        ]));

        ctl.refresh().await.unwrap();
        assert!(ctl.state().running);

        let err = ctl.refresh().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Api(_)));
        assert!(ctl.state().running, "stale state must survive a fetch error");
    }

    #[tokio::test]
    async fn create_from_running_is_a_local_precondition_error() {
        let mut ctl = controller(StubApi::pushing_info(vec![Ok(Some(record(
            "abc", "running",
        )))]));
        ctl.refresh().await.unwrap();
        let calls_before = ctl.api.total_calls();

        let err = ctl.create("alice", "tok").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Precondition { .. }));
        assert_eq!(
            ctl.api.total_calls(),
            calls_before,
            "precondition errors must not issue network calls"
        );
    }

    #[tokio::test]
    async fn start_requires_a_stopped_container() {
        let mut ctl = controller(StubApi::default());
        let err = ctl.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Precondition { .. }));

        let mut ctl = controller(StubApi::pushing_info(vec![Ok(Some(record(
            "abc", "running",
        )))]));
        ctl.refresh().await.unwrap();
        let err = ctl.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Precondition { .. }));
    }

    #[tokio::test]
    async fn stop_then_reconcile_confirms_stopped() {
        let mut ctl = controller(StubApi::pushing_info(vec![
            Ok(Some(record("abc", "running"))),
            Ok(Some(record("abc", "exited"))),
        ]));
        ctl.refresh().await.unwrap();

        ctl.stop().await.unwrap();
        assert!(ctl.state().exists);
        assert!(!ctl.state().running);
    }

    #[tokio::test]
    async fn reconcile_wins_over_optimistic_state() {
        // Backend accepts the start but the follow-up snapshot says the
        // container is still stopped; the snapshot is the source of truth.
        let mut ctl = controller(StubApi::pushing_info(vec![
            Ok(Some(record("abc", "exited"))),
            Ok(Some(record("abc", "exited"))),
        ]));
        ctl.refresh().await.unwrap();

        ctl.start().await.unwrap();
        assert!(!ctl.state().running);
    }

    #[tokio::test]
    async fn remove_moves_back_to_absent() {
        let mut ctl = controller(StubApi::pushing_info(vec![
            Ok(Some(record("abc", "exited"))),
            Ok(None),
        ]));
        ctl.refresh().await.unwrap();

        ctl.remove().await.unwrap();
        assert!(!ctl.state().exists);
        assert!(ctl.state().id.is_none());
    }

    #[tokio::test]
    async fn running_implies_exists_across_command_sequences() {
        // Walk Absent -> create -> start -> stop -> remove, checking the
        // invariant after every step.
        let mut ctl = controller(StubApi::pushing_info(vec![
            Ok(None),
            Ok(Some(record("abc", "created"))),
            Ok(Some(record("abc", "running"))),
            Ok(Some(record("abc", "exited"))),
            Ok(None),
        ]));

        let invariant = |state: &ContainerState| !state.running || state.exists;

        ctl.refresh().await.unwrap();
        assert!(invariant(ctl.state()));

        ctl.create("alice", "tok").await.unwrap();
        assert!(invariant(ctl.state()));

        ctl.start().await.unwrap();
        assert!(invariant(ctl.state()));

        ctl.stop().await.unwrap();
        assert!(invariant(ctl.state()));

        ctl.remove().await.unwrap();
        assert!(invariant(ctl.state()));
    }
}
