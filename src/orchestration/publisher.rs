//! Publish orchestrator
//!
//! Drives a single publish run through the workflow:
//!
//! ```text
//! INIT -> AUTHENTICATED -> DRAFT_CREATED -> UPLOADED -> SUBMITTED -> POLLING
//!      -> PUBLISHED | REJECTED | TIMED_OUT | FAILED
//! ```
//!
//! Draft creation is retried on server errors, the upload is retried once,
//! submission is never retried. Polling runs against an absolute deadline
//! computed when polling starts.

use super::draft::DraftBuilder;
use super::report::{PublishEvent, PublishOutcome, PublishReport};
use crate::core::config::{PublishConfig, PublishType};
use crate::core::error::{PublishError, PublishStep, Result};
use crate::core::retry::{RetryManager, RetryOptions};
use crate::core::state_machine::{PublishState, PublishStateMachine};
use crate::core::traits::{BuildArtifact, DraftId, DraftStatus, RemoteState, StoreApi};
use crate::security::{AccessToken, Credentials};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Interval between status checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Tokens expiring within this margin are renewed before the next call
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Main publish orchestrator
pub struct PublishOrchestrator {
    api: Arc<dyn StoreApi>,
    config: PublishConfig,
    credentials: Credentials,
    cancel: CancellationToken,
    events: Option<UnboundedSender<PublishEvent>>,
    poll_interval: Duration,
    draft_retry: RetryOptions,
    upload_retry: RetryOptions,
    state_machine: PublishStateMachine,
    draft_id: Option<DraftId>,
}

impl PublishOrchestrator {
    pub fn new(api: Arc<dyn StoreApi>, config: PublishConfig, credentials: Credentials) -> Self {
        Self {
            api,
            config,
            credentials,
            cancel: CancellationToken::new(),
            events: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            draft_retry: RetryOptions::default(),
            upload_retry: RetryOptions::once(),
            state_machine: PublishStateMachine::new(),
            draft_id: None,
        }
    }

    /// Abort the run when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send progress events to `events`
    pub fn with_events(mut self, events: UnboundedSender<PublishEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Interval between status checks, 5s unless set
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Retry policy for draft creation, 3 attempts with 2s steps unless set
    pub fn with_draft_retry(mut self, options: RetryOptions) -> Self {
        self.draft_retry = options;
        self
    }

    /// Run the workflow to a terminal outcome
    ///
    /// Errors never escape; they end up in [`PublishOutcome::Failed`].
    pub async fn run(mut self) -> PublishReport {
        let started = Instant::now();
        info!(
            "Publishing {} ({}, {})",
            self.config.application_id(),
            self.config.build_file().display(),
            self.config.publish_type().as_wire()
        );

        let outcome = match self.drive(started).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.state_machine.fail(error.to_string());
                self.emit_state(PublishState::Failed);
                PublishOutcome::Failed { error }
            }
        };

        PublishReport {
            outcome,
            application_id: self.config.application_id().to_string(),
            draft_id: self.draft_id,
            final_state: self.state_machine.state(),
            last_active_state: self.state_machine.last_active_state(),
            transitions: self.state_machine.transitions().to_vec(),
            duration: started.elapsed(),
        }
    }

    async fn drive(&mut self, started: Instant) -> Result<PublishOutcome> {
        let timeout = self.config.request_timeout();
        let app_id = self.config.application_id().to_string();

        // Release notes are read before any network call
        let request = DraftBuilder::new(&self.config).build().await?;

        // INIT -> AUTHENTICATED
        let token = self
            .cancellable(self.api.authenticate(&self.credentials))
            .await?;
        self.transition(PublishState::Authenticated, None);

        // AUTHENTICATED -> DRAFT_CREATED
        let token = self.refresh(token).await?;
        let draft_id = {
            let (api, events) = (&self.api, &self.events);
            let (token, app_id, request) = (&token, app_id.as_str(), &request);
            RetryManager::new(self.draft_retry.clone())
                .retry(
                    PublishStep::CreateDraft,
                    started + timeout,
                    &self.cancel,
                    PublishError::is_retryable,
                    move |attempt| {
                        if attempt > 1 {
                            emit(events, PublishEvent::Retrying {
                                step: PublishStep::CreateDraft,
                                attempt,
                            });
                        }
                        api.create_draft(token, app_id, request)
                    },
                )
                .await?
        };
        self.draft_id = Some(draft_id);
        self.transition(PublishState::DraftCreated, Some(draft_metadata(draft_id)));

        // DRAFT_CREATED -> UPLOADED
        let artifact = BuildArtifact {
            path: self.config.build_file().to_path_buf(),
            format: self.config.build_format(),
            services_type: self.config.services_type(),
        };
        let token = self.refresh(token).await?;
        {
            let (api, events) = (&self.api, &self.events);
            let (token, app_id, artifact) = (&token, app_id.as_str(), &artifact);
            RetryManager::new(self.upload_retry.clone())
                .retry(
                    PublishStep::Upload,
                    Instant::now() + timeout,
                    &self.cancel,
                    |e| matches!(e, PublishError::Upload { .. }),
                    move |attempt| {
                        if attempt > 1 {
                            emit(events, PublishEvent::Retrying {
                                step: PublishStep::Upload,
                                attempt,
                            });
                        }
                        api.upload_build_file(token, app_id, draft_id, artifact)
                    },
                )
                .await?;
        }
        self.transition(PublishState::Uploaded, None);

        // UPLOADED -> SUBMITTED
        let token = self.refresh(token).await?;
        self.cancellable(self.api.submit_draft(
            &token,
            &app_id,
            draft_id,
            self.config.release_phase(),
        ))
        .await?;
        self.transition(PublishState::Submitted, None);

        if self.config.publish_type() == PublishType::Manual {
            info!("Draft {} submitted, manual publication requested", draft_id);
            return Ok(PublishOutcome::Submitted);
        }

        // SUBMITTED -> POLLING -> terminal
        self.transition(PublishState::Polling, None);
        self.poll(token, &app_id, draft_id).await
    }

    async fn poll(
        &mut self,
        mut token: AccessToken,
        app_id: &str,
        draft_id: DraftId,
    ) -> Result<PublishOutcome> {
        let poll_start = Instant::now();
        let deadline = poll_start + self.config.request_timeout();
        let mut last_state = None;

        loop {
            token = match timeout_at(deadline, self.refresh(token)).await {
                Ok(token) => token?,
                Err(_) => break,
            };

            let check = timeout_at(deadline, self.api.check_status(&token, app_id, draft_id));
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PublishError::Cancelled),
                result = check => result,
            };

            match result {
                Err(_) => break,
                Ok(Ok(status)) => {
                    debug!("Draft {} is {}", draft_id, status.state);
                    last_state = Some(status.state);
                    emit(&self.events, PublishEvent::StatusPolled { state: status.state });
                    if let Some(outcome) = self.finish(status)? {
                        return Ok(outcome);
                    }
                }
                Ok(Err(error)) if error.is_retryable() => {
                    warn!("Status check failed, polling continues: {}", error);
                }
                Ok(Err(error)) => return Err(error),
            }

            let wake = (Instant::now() + self.poll_interval).min(deadline);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PublishError::Cancelled),
                _ = sleep_until(wake) => {}
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        let elapsed = poll_start.elapsed();
        warn!(
            "Draft {} has no final status after {}s",
            draft_id,
            elapsed.as_secs()
        );
        self.transition(PublishState::TimedOut, None);
        Ok(PublishOutcome::TimedOut {
            elapsed,
            last_state,
        })
    }

    /// Map a terminal remote status onto the outcome; `None` keeps polling
    fn finish(&mut self, status: DraftStatus) -> Result<Option<PublishOutcome>> {
        if !status.state.is_terminal() {
            return Ok(None);
        }
        if status.state.is_success() {
            self.transition(PublishState::Published, None);
            return Ok(Some(PublishOutcome::Published {
                state: status.state,
            }));
        }

        match status.state {
            RemoteState::Rejected => {
                let reason = status
                    .details
                    .unwrap_or_else(|| "no reason given".to_string());
                let mut metadata = HashMap::new();
                metadata.insert("reason".to_string(), serde_json::json!(reason));
                self.transition(PublishState::Rejected, Some(metadata));
                Ok(Some(PublishOutcome::Rejected { reason }))
            }
            _ => Err(PublishError::RemoteFailed {
                details: status
                    .details
                    .unwrap_or_else(|| "no details given".to_string()),
            }),
        }
    }

    /// Re-authenticate when `token` is about to expire
    async fn refresh(&self, token: AccessToken) -> Result<AccessToken> {
        if !token.expires_within(TOKEN_REFRESH_MARGIN) {
            return Ok(token);
        }
        debug!("Access token {} is about to expire, renewing", token.masked());
        self.cancellable(self.api.authenticate(&self.credentials))
            .await
    }

    /// Await `future` unless the run is cancelled first
    async fn cancellable<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PublishError::Cancelled),
            result = future => result,
        }
    }

    fn transition(
        &mut self,
        to: PublishState,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) {
        self.state_machine.transition(to, metadata);
        self.emit_state(to);
    }

    fn emit_state(&self, to: PublishState) {
        let from = self
            .state_machine
            .transitions()
            .last()
            .map(|t| t.from)
            .unwrap_or(PublishState::Init);
        emit(&self.events, PublishEvent::StateChanged { from, to });
    }
}

fn emit(events: &Option<UnboundedSender<PublishEvent>>, event: PublishEvent) {
    if let Some(sender) = events {
        // The receiver going away only stops progress display
        let _ = sender.send(event);
    }
}

fn draft_metadata(draft_id: DraftId) -> HashMap<String, serde_json::Value> {
    let mut metadata = HashMap::new();
    metadata.insert("draftId".to_string(), serde_json::json!(draft_id.0));
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{BuildFormat, RawPublishConfig, ReleasePhase};
    use crate::core::traits::DraftRequest;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    /// Scripted store: each queue is consumed before falling back to success
    #[derive(Default)]
    struct MockApi {
        auth_status: Option<u16>,
        token_ttl: Option<Duration>,
        /// Authentications from this call number on take the given time
        slow_auth: Option<(u32, Duration)>,
        draft_delay: Duration,
        draft_errors: Mutex<VecDeque<u16>>,
        upload_failures: AtomicU32,
        statuses: Mutex<VecDeque<RemoteState>>,
        default_status: Option<RemoteState>,
        status_details: Option<String>,
        status_errors: Mutex<VecDeque<u16>>,
        submitted_phase: Mutex<Option<ReleasePhase>>,
        auth_calls: AtomicU32,
        draft_calls: AtomicU32,
        upload_calls: AtomicU32,
        submit_calls: AtomicU32,
        status_calls: AtomicU32,
    }

    impl MockApi {
        fn with_statuses(statuses: &[RemoteState]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn calls(counter: &AtomicU32) -> u32 {
            counter.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StoreApi for MockApi {
        async fn authenticate(&self, _credentials: &Credentials) -> Result<AccessToken> {
            let call = self.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((from_call, delay)) = self.slow_auth {
                if call >= from_call {
                    tokio::time::sleep(delay).await;
                }
            }
            match self.auth_status {
                Some(status) => Err(PublishError::Auth {
                    status: Some(status),
                    message: "invalid signature".to_string(),
                }),
                None => Ok(AccessToken::new("token-value-123", self.token_ttl)),
            }
        }

        async fn create_draft(
            &self,
            _token: &AccessToken,
            _app_id: &str,
            _draft: &DraftRequest,
        ) -> Result<DraftId> {
            self.draft_calls.fetch_add(1, Ordering::SeqCst);
            if !self.draft_delay.is_zero() {
                tokio::time::sleep(self.draft_delay).await;
            }
            match self.draft_errors.lock().unwrap().pop_front() {
                Some(status) => Err(PublishError::Api {
                    step: PublishStep::CreateDraft,
                    status,
                    body: format!("{{\"code\":\"ERROR\",\"message\":\"status {}\"}}", status),
                }),
                None => Ok(DraftId(42)),
            }
        }

        async fn upload_build_file(
            &self,
            _token: &AccessToken,
            _app_id: &str,
            _draft_id: DraftId,
            _artifact: &BuildArtifact,
        ) -> Result<()> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.upload_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.upload_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(PublishError::Upload {
                    status: None,
                    message: "connection reset".to_string(),
                });
            }
            Ok(())
        }

        async fn submit_draft(
            &self,
            _token: &AccessToken,
            _app_id: &str,
            _draft_id: DraftId,
            release_phase: Option<ReleasePhase>,
        ) -> Result<()> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            *self.submitted_phase.lock().unwrap() = release_phase;
            Ok(())
        }

        async fn check_status(
            &self,
            _token: &AccessToken,
            _app_id: &str,
            _draft_id: DraftId,
        ) -> Result<DraftStatus> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.status_errors.lock().unwrap().pop_front() {
                return Err(PublishError::Api {
                    step: PublishStep::Poll,
                    status,
                    body: "status error".to_string(),
                });
            }
            let state = self
                .statuses
                .lock()
                .unwrap()
                .pop_front()
                .or(self.default_status)
                .unwrap_or(RemoteState::Published);
            Ok(DraftStatus {
                state,
                details: self.status_details.clone(),
            })
        }
    }

    fn config_with(publish_type: PublishType, phase: Option<ReleasePhase>) -> PublishConfig {
        PublishConfig::try_from(RawPublishConfig {
            application_id: Some("ru.example.app".to_string()),
            build_format: Some(BuildFormat::Aab),
            request_timeout: Some(300),
            publish_type: Some(publish_type),
            release_phase: phase,
            ..Default::default()
        })
        .unwrap()
    }

    fn orchestrator(api: Arc<MockApi>, publish_type: PublishType) -> PublishOrchestrator {
        PublishOrchestrator::new(
            api,
            config_with(publish_type, None),
            Credentials::from_parts("1234", "secret").unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_after_review() {
        let api = Arc::new(MockApi::with_statuses(&[
            RemoteState::Pending,
            RemoteState::InReview,
            RemoteState::Published,
        ]));

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Published { state: RemoteState::Published }
        ));
        assert_eq!(report.final_state, PublishState::Published);
        assert_eq!(report.draft_id, Some(DraftId(42)));
        assert_eq!(report.transitions.len(), 6);
        let draft_created = report
            .transitions
            .iter()
            .find(|t| t.to == PublishState::DraftCreated)
            .unwrap();
        assert_eq!(draft_created.metadata.as_ref().unwrap()["draftId"], 42);
        assert_eq!(MockApi::calls(&api.status_calls), 3);
        assert_eq!(report.duration, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_server_errors_are_retried_with_backoff() {
        let api = Arc::new(MockApi {
            draft_errors: Mutex::new(VecDeque::from([503, 500])),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(report.outcome.is_success());
        assert_eq!(MockApi::calls(&api.draft_calls), 3);
        // 2s after the first failure, 4s after the second
        assert_eq!(report.duration, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_server_errors_exhaust_attempts() {
        let api = Arc::new(MockApi {
            draft_errors: Mutex::new(VecDeque::from([503, 503, 503])),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Failed { error: PublishError::Api { status: 503, .. } }
        ));
        assert_eq!(MockApi::calls(&api.draft_calls), 3);
        assert_eq!(MockApi::calls(&api.upload_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_draft_attempts_stop_at_time_budget() {
        let api = Arc::new(MockApi {
            draft_delay: Duration::from_secs(100),
            draft_errors: Mutex::new(VecDeque::from([503, 503])),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        // attempts at 0s and 102s fail, the one started at 206s is cut at 300s
        match &report.outcome {
            PublishOutcome::Failed {
                error: PublishError::Timeout { step, .. },
            } => assert_eq!(*step, PublishStep::CreateDraft),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(MockApi::calls(&api.draft_calls), 3);
        assert_eq!(MockApi::calls(&api.upload_calls), 0);
        assert_eq!(report.draft_id, None);
        assert_eq!(report.last_active_state, PublishState::Authenticated);
        assert_eq!(report.duration, Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_draft_client_error_fails_immediately() {
        let api = Arc::new(MockApi {
            draft_errors: Mutex::new(VecDeque::from([400])),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        match &report.outcome {
            PublishOutcome::Failed { error } => {
                assert_eq!(error.status(), Some(400));
                assert_eq!(error.step(), Some(PublishStep::CreateDraft));
                assert!(error.to_string().contains("status 400"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.final_state, PublishState::Failed);
        assert_eq!(report.draft_id, None);
        assert_eq!(MockApi::calls(&api.draft_calls), 1);
        assert_eq!(report.duration, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_is_retried_once() {
        let api = Arc::new(MockApi {
            upload_failures: AtomicU32::new(1),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(report.outcome.is_success());
        assert_eq!(MockApi::calls(&api.upload_calls), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_upload_failure_is_fatal() {
        let api = Arc::new(MockApi {
            upload_failures: AtomicU32::new(2),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Failed { error: PublishError::Upload { .. } }
        ));
        assert_eq!(MockApi::calls(&api.upload_calls), 2);
        assert_eq!(MockApi::calls(&api.submit_calls), 0);
        assert_eq!(report.draft_id, Some(DraftId(42)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_forever_times_out_at_deadline() {
        let api = Arc::new(MockApi {
            default_status: Some(RemoteState::Pending),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        match report.outcome {
            PublishOutcome::TimedOut { elapsed, last_state } => {
                assert_eq!(elapsed, Duration::from_secs(300));
                assert_eq!(last_state, Some(RemoteState::Pending));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.final_state, PublishState::TimedOut);
        // polls at 0s, 5s, ..., 295s
        assert_eq!(MockApi::calls(&api.status_calls), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_publication_skips_polling() {
        let api = Arc::new(MockApi::default());

        let report = orchestrator(api.clone(), PublishType::Manual).run().await;

        assert!(matches!(report.outcome, PublishOutcome::Submitted));
        assert_eq!(report.final_state, PublishState::Submitted);
        assert_eq!(MockApi::calls(&api.status_calls), 0);
        assert_eq!(report.outcome.exit_code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_carries_reason() {
        let api = Arc::new(MockApi {
            default_status: Some(RemoteState::Rejected),
            status_details: Some("policy violation".to_string()),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Rejected { ref reason } if reason == "policy violation"
        ));
        assert_eq!(report.final_state, PublishState::Rejected);
        assert_eq!(report.outcome.exit_code(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_failure_is_failed_outcome() {
        let api = Arc::new(MockApi {
            default_status: Some(RemoteState::Failed),
            status_details: Some("signature mismatch".to_string()),
            ..Default::default()
        });

        let report = orchestrator(api, PublishType::Instantly).run().await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Failed { error: PublishError::RemoteFailed { ref details } }
                if details == "signature mismatch"
        ));
        assert_eq!(report.final_state, PublishState::Failed);
        assert_eq!(report.last_active_state, PublishState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_stops_before_draft() {
        let api = Arc::new(MockApi {
            auth_status: Some(401),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Failed { error: PublishError::Auth { status: Some(401), .. } }
        ));
        assert_eq!(MockApi::calls(&api.auth_calls), 1);
        assert_eq!(MockApi::calls(&api.draft_calls), 0);
        assert_eq!(report.transitions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_release_note_fails_before_network() {
        let api = Arc::new(MockApi::default());
        let config = PublishConfig::try_from(RawPublishConfig {
            application_id: Some("ru.example.app".to_string()),
            build_format: Some(BuildFormat::Aab),
            release_notes: Some(vec![crate::core::config::ReleaseNote {
                lang: "ru".to_string(),
                file_path: "/nonexistent/whatsnew-ru.txt".into(),
            }]),
            ..Default::default()
        })
        .unwrap();

        let report = PublishOrchestrator::new(
            api.clone(),
            config,
            Credentials::from_parts("1234", "secret").unwrap(),
        )
        .run()
        .await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Failed { error: PublishError::Config { .. } }
        ));
        assert_eq!(report.outcome.exit_code(), 4);
        assert_eq!(MockApi::calls(&api.auth_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_poll_errors_do_not_stop_polling() {
        let api = Arc::new(MockApi {
            status_errors: Mutex::new(VecDeque::from([502])),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(report.outcome.is_success());
        assert_eq!(MockApi::calls(&api.status_calls), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_poll_error_is_fatal() {
        let api = Arc::new(MockApi {
            status_errors: Mutex::new(VecDeque::from([404])),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Failed { error: PublishError::Api { status: 404, .. } }
        ));
        assert_eq!(MockApi::calls(&api.status_calls), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_polling() {
        let api = Arc::new(MockApi {
            default_status: Some(RemoteState::InReview),
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(12)).await;
            trigger.cancel();
        });

        let report = orchestrator(api.clone(), PublishType::Instantly)
            .with_cancellation(cancel)
            .run()
            .await;

        assert!(matches!(
            report.outcome,
            PublishOutcome::Failed { error: PublishError::Cancelled }
        ));
        assert_eq!(report.final_state, PublishState::Failed);
        assert_eq!(report.duration, Duration::from_secs(12));
        // polls at 0s, 5s, 10s
        assert_eq!(MockApi::calls(&api.status_calls), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_phase_is_submitted() {
        let api = Arc::new(MockApi::default());
        let publisher = PublishOrchestrator::new(
            api.clone(),
            config_with(PublishType::Instantly, Some(ReleasePhase { percent: 25.0 })),
            Credentials::from_parts("1234", "secret").unwrap(),
        );

        publisher.run().await;

        assert_eq!(
            *api.submitted_phase.lock().unwrap(),
            Some(ReleasePhase { percent: 25.0 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiring_token_is_renewed_before_each_call() {
        let api = Arc::new(MockApi {
            token_ttl: Some(Duration::from_secs(10)),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        assert!(report.outcome.is_success());
        // initial, then before draft, upload, submit and the status check
        assert_eq!(MockApi::calls(&api.auth_calls), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_token_renewal_does_not_extend_polling() {
        // renewals before draft, upload and submit are fast; the ones
        // during polling take 200s each
        let api = Arc::new(MockApi {
            token_ttl: Some(Duration::from_secs(10)),
            slow_auth: Some((5, Duration::from_secs(200))),
            default_status: Some(RemoteState::Pending),
            ..Default::default()
        });

        let report = orchestrator(api.clone(), PublishType::Instantly).run().await;

        // renewal 0s..200s, check at 200s, next renewal from 205s is cut at 300s
        match report.outcome {
            PublishOutcome::TimedOut { elapsed, last_state } => {
                assert_eq!(elapsed, Duration::from_secs(300));
                assert_eq!(last_state, Some(RemoteState::Pending));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.final_state, PublishState::TimedOut);
        assert_eq!(MockApi::calls(&api.status_calls), 1);
        assert_eq!(report.duration, Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_follow_transitions() {
        let api = Arc::new(MockApi::default());
        let (tx, mut rx) = mpsc::unbounded_channel();

        orchestrator(api, PublishType::Instantly)
            .with_events(tx)
            .run()
            .await;

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let PublishEvent::StateChanged { to, .. } = event {
                states.push(to);
            }
        }
        assert_eq!(
            states,
            vec![
                PublishState::Authenticated,
                PublishState::DraftCreated,
                PublishState::Uploaded,
                PublishState::Submitted,
                PublishState::Polling,
                PublishState::Published,
            ]
        );
    }
}
