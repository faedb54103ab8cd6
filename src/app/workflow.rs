//! Network work behind the lab results window: uploads, status refresh,
//! downloads and the detail view. Every result goes through
//! [`Workflow::apply`], which refuses to touch state once the window is gone.

use crate::api::LabApiClient;
use crate::app::state::{Banner, BannerKind, DetailView, PageState, SharedState};
use crate::config::{DOWNLOAD_ERROR_BANNER, UPLOAD_ERROR_BANNER, UPLOAD_SUCCESS_BANNER};
use crate::error::{AppError, ValidationError};
use crate::session::TokenProvider;
use crate::upload::download::{filename_from_disposition, FileSaver};
use crate::upload::{BatchOutcome, UploadSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct WorkflowOptions {
    pub refresh_delay: Duration,
    pub open_after_download: bool,
}

#[derive(Clone)]
pub struct Workflow {
    inner: Arc<Inner>,
}

struct Inner {
    api: LabApiClient,
    tokens: TokenProvider,
    state: SharedState,
    saver: Arc<dyn FileSaver>,
    shutdown: CancellationToken,
    runtime: Handle,
    options: WorkflowOptions,
}

impl Workflow {
    pub fn new(
        api: LabApiClient,
        tokens: TokenProvider,
        state: SharedState,
        saver: Arc<dyn FileSaver>,
        runtime: Handle,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                tokens,
                state,
                saver,
                shutdown: CancellationToken::new(),
                runtime,
                options,
            }),
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.inner.state
    }

    pub fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stops the poller and any deferred refresh. Results that arrive later
    /// are dropped.
    pub fn dispose(&self) {
        if !self.inner.shutdown.is_cancelled() {
            info!("Disposing upload workflow");
            self.inner.shutdown.cancel();
        }
    }

    /// Runs `f` against the page state unless the workflow was disposed.
    pub fn apply<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> Result<R, AppError> {
        let mut guard = self.inner.state.lock();
        if self.inner.shutdown.is_cancelled() {
            debug!("Discarding result after dispose");
            return Err(AppError::Disposed);
        }
        Ok(f(&mut guard))
    }

    /// Uploads every `Selected` item as one batch.
    ///
    /// The items are claimed (moved to `Uploading`) under the same lock that
    /// reads them, so a second call made while this one is running finds
    /// nothing to send.
    pub async fn confirm_upload(&self) -> Result<BatchOutcome, AppError> {
        let claimed = self.apply(|s| {
            if !s.buffer.has_selected() {
                return Err(AppError::from(ValidationError::NoFilesSelected));
            }
            let token = self.inner.tokens.require()?;
            let sources = s.buffer.claim_selected();
            s.is_uploading = true;
            s.upload_banner = None;
            Ok((token, sources))
        })?;
        let (token, sources) = match claimed {
            Ok(claimed) => claimed,
            Err(e) => return Err(self.upload_error(e)),
        };
        let local_ids: Vec<String> = sources.iter().map(|s| s.local_id.clone()).collect();

        let files = match read_sources(&sources).await {
            Ok(files) => files,
            Err((missing_id, e)) => {
                self.apply(|s| {
                    let detail = e.user_message(&s.content);
                    s.buffer.mark_upload_failed(&missing_id, &detail);
                    s.buffer.release(&local_ids);
                    s.is_uploading = false;
                })?;
                return Err(self.upload_error(e));
            }
        };

        let result = self.inner.api.upload_batch(&token, files).await;

        let remote_ids = match result {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Batch upload of {} files failed: {}", local_ids.len(), e);
                self.apply(|s| {
                    let detail = upload_failure_detail(&e, s);
                    s.buffer.fail_batch(&local_ids, &detail);
                    s.is_uploading = false;
                })?;
                return Err(self.upload_error(e));
            }
        };

        let assignments: Vec<(String, Option<String>)> =
            local_ids.into_iter().zip(remote_ids).collect();
        let outcome = self.apply(|s| {
            let outcome = s
                .buffer
                .apply_batch_ids(assignments, &s.content.no_submission_id_error);
            s.is_uploading = false;
            s.upload_banner = if outcome.total == 0 {
                None
            } else if outcome.is_complete_success() {
                Some(Banner::new(
                    BannerKind::Success,
                    s.content.upload_success_message.clone(),
                    UPLOAD_SUCCESS_BANNER,
                ))
            } else {
                let err = AppError::PartialBatchFailure {
                    failed: outcome.failed,
                    total: outcome.total,
                };
                Some(Banner::new(
                    BannerKind::Error,
                    err.user_message(&s.content),
                    UPLOAD_ERROR_BANNER,
                ))
            };
            outcome
        })?;

        self.schedule_refresh();
        Ok(outcome)
    }

    fn upload_error(&self, e: AppError) -> AppError {
        let _ = self.apply(|s| {
            s.upload_banner = Some(Banner::new(
                BannerKind::Error,
                e.user_message(&s.content),
                UPLOAD_ERROR_BANNER,
            ));
        });
        e
    }

    fn schedule_refresh(&self) {
        let workflow = self.clone();
        let delay = self.inner.options.refresh_delay;
        let shutdown = self.inner.shutdown.clone();
        self.inner.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => debug!("Deferred refresh cancelled"),
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = workflow.refresh(false).await {
                        debug!("Deferred refresh failed: {}", e);
                    }
                }
            }
        });
    }

    /// Fetches the submission list and reconciles tracked uploads with it.
    /// Returns how many tracked items changed.
    pub async fn refresh(&self, show_loading: bool) -> Result<usize, AppError> {
        let Some(token) = self.inner.tokens.get() else {
            self.apply(|s| {
                s.submissions.clear();
                s.fetch_error = Some(s.content.authentication_required.clone());
            })?;
            return Err(AppError::AuthRequired);
        };

        let requested = self.apply(|s| {
            if show_loading {
                s.is_loading_submissions = true;
            }
            s.buffer.remote_ids()
        })?;

        match self.inner.api.list_submissions(&token).await {
            Ok(list) => self.apply(|s| {
                let changed = s.buffer.reconcile(
                    &list,
                    &requested,
                    &s.content.submission_not_found_error,
                );
                s.submissions = list;
                s.fetch_error = None;
                s.is_loading_submissions = false;
                if changed > 0 {
                    debug!("Refresh updated {} tracked uploads", changed);
                }
                changed
            }),
            Err(e) => {
                warn!("Could not fetch submissions: {}", e);
                self.apply(|s| {
                    s.fetch_error = Some(format!(
                        "{} {}",
                        s.content.fetch_submissions_error_message,
                        e.user_message(&s.content)
                    ));
                    s.is_loading_submissions = false;
                })?;
                Err(e)
            }
        }
    }

    /// Starts the repeating status refresh. The first tick waits a full
    /// interval.
    pub fn spawn_poller(&self, interval: Duration) -> PollerHandle {
        let cancel = self.inner.shutdown.child_token();
        let stop = cancel.clone();
        let workflow = self.clone();

        let task = self.inner.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => match workflow.refresh(false).await {
                        Ok(_) => {}
                        Err(AppError::Disposed) => break,
                        Err(AppError::AuthRequired) => debug!("Poll skipped, not logged in"),
                        Err(e) => debug!("Poll failed: {}", e),
                    },
                }
            }
            debug!("Status poller stopped");
        });

        info!("Status poller started, every {:?}", interval);
        PollerHandle {
            cancel,
            task: Some(task),
        }
    }

    /// Downloads one submission's file and saves it through the
    /// configured [`FileSaver`].
    pub async fn download(
        &self,
        remote_id: &str,
        suggested: Option<&str>,
    ) -> Result<PathBuf, AppError> {
        let token = match self.inner.tokens.require() {
            Ok(token) => token,
            Err(e) => return Err(self.download_error(e)),
        };

        let started = self.apply(|s| s.downloads_in_flight.insert(remote_id.to_string()))?;
        if !started {
            return Err(ValidationError::DownloadInProgress(remote_id.to_string()).into());
        }
        let _in_flight = InFlightGuard {
            state: self.inner.state.clone(),
            remote_id: remote_id.to_string(),
        };

        let file = match self.inner.api.download(&token, remote_id).await {
            Ok(file) => file,
            Err(e) => return Err(self.download_error(e)),
        };
        if self.is_disposed() {
            return Err(AppError::Disposed);
        }

        let name = filename_from_disposition(file.content_disposition.as_deref(), suggested);
        let saver = self.inner.saver.clone();
        let saved = tokio::task::spawn_blocking(move || saver.save(&name, &file.bytes))
            .await
            .map_err(|e| AppError::Internal(format!("Save task failed: {}", e)))
            .and_then(|r| r);

        let path = match saved {
            Ok(path) => path,
            Err(e) => {
                error!("Could not save download {}: {}", remote_id, e);
                return Err(self.download_error(e));
            }
        };

        self.apply(|s| {
            s.download_banner = Some(Banner::new(
                BannerKind::Success,
                format!("{} {}", s.content.download_saved_message, path.display()),
                UPLOAD_SUCCESS_BANNER,
            ));
        })?;

        if self.inner.options.open_after_download {
            if let Err(e) = open::that(&path) {
                warn!("Could not open {}: {}", path.display(), e);
            }
        }
        Ok(path)
    }

    fn download_error(&self, e: AppError) -> AppError {
        let _ = self.apply(|s| {
            s.download_banner = Some(Banner::new(
                BannerKind::Error,
                e.user_message(&s.content),
                DOWNLOAD_ERROR_BANNER,
            ));
        });
        e
    }

    /// Loads one submission with its analyte results into the detail view.
    pub async fn load_detail(&self, id: &str) -> Result<(), AppError> {
        let token = self.inner.tokens.require()?;
        self.apply(|s| s.detail = Some(DetailView::Loading(id.to_string())))?;

        let result = self.inner.api.submission_detail(&token, id).await;
        self.apply(|s| {
            // The user may have closed the panel or opened another one.
            if !matches!(&s.detail, Some(DetailView::Loading(current)) if current == id) {
                return;
            }
            s.detail = Some(match &result {
                Ok(detail) => DetailView::Loaded(detail.clone()),
                Err(e) => DetailView::Failed {
                    id: id.to_string(),
                    message: format!(
                        "{} {}",
                        s.content.detail_error_message,
                        e.user_message(&s.content)
                    ),
                },
            });
        })?;
        result.map(|_| ())
    }
}

/// Error text stored on items of a batch the server refused.
fn upload_failure_detail(e: &AppError, state: &PageState) -> String {
    match e {
        AppError::Server { detail, .. } => {
            format!("{} {}", state.content.upload_error_message, detail)
        }
        other => other.user_message(&state.content),
    }
}

async fn read_sources(
    sources: &[UploadSource],
) -> Result<Vec<(String, Vec<u8>)>, (String, AppError)> {
    let mut files = Vec::with_capacity(sources.len());
    for source in sources {
        let missing = || {
            (
                source.local_id.clone(),
                AppError::from(ValidationError::FileMissing(source.file_name.clone())),
            )
        };
        let Some(path) = &source.path else {
            return Err(missing());
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => files.push((source.file_name.clone(), bytes)),
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                return Err(missing());
            }
        }
    }
    Ok(files)
}

struct InFlightGuard {
    state: SharedState,
    remote_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.state.lock().downloads_in_flight.remove(&self.remote_id);
    }
}

/// Owns the repeating refresh task. Dropping the handle stops it.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancels the task and waits for it to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Status poller ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::build_http_client;
    use crate::content::LabResultsContent;
    use crate::session::{KeyValueStore, Locale, MemoryStore, AUTH_TOKEN_KEY};
    use crate::upload::download::DirectorySaver;
    use crate::upload::{SelectedFile, UploadStatus};
    use std::fs;
    use tempfile::{tempdir, TempDir};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        workflow: Workflow,
        store: Arc<MemoryStore>,
        dir: TempDir,
    }

    fn fixture(server: &MockServer, refresh_delay: Duration) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.set(AUTH_TOKEN_KEY, "tok").unwrap();
        let dir = tempdir().unwrap();
        let http = build_http_client(Duration::from_secs(5)).unwrap();
        let api = LabApiClient::new(http, server.uri());
        let state = PageState::new(LabResultsContent::fallback(), Locale::En).shared();
        let workflow = Workflow::new(
            api,
            TokenProvider::new(store.clone()),
            state,
            Arc::new(DirectorySaver::new(dir.path().join("downloads"))),
            Handle::current(),
            WorkflowOptions {
                refresh_delay,
                open_after_download: false,
            },
        );
        Fixture { workflow, store, dir }
    }

    fn select_pdfs(fx: &Fixture, names: &[&str]) -> Vec<String> {
        let files: Vec<SelectedFile> = names
            .iter()
            .map(|name| {
                let path = fx.dir.path().join(name);
                fs::write(&path, b"%PDF-1.4").unwrap();
                SelectedFile::from_path(path)
            })
            .collect();
        fx.workflow
            .apply(|s| {
                s.buffer.select(files).unwrap();
                s.buffer.items().iter().map(|i| i.local_id().to_string()).collect()
            })
            .unwrap()
    }

    fn status_of(fx: &Fixture, local_id: &str) -> (UploadStatus, Option<String>, Option<String>) {
        fx.workflow
            .apply(|s| {
                let item = s.buffer.get(local_id).unwrap();
                (
                    item.status(),
                    item.remote_id().map(str::to_string),
                    item.error_detail().map(str::to_string),
                )
            })
            .unwrap()
    }

    fn submissions_body(items: &[(&str, &str)]) -> serde_json::Value {
        serde_json::Value::Array(
            items
                .iter()
                .map(|(id, status)| serde_json::json!({"id": id, "processing_status": status}))
                .collect(),
        )
    }

    #[tokio::test]
    async fn single_file_becomes_pending() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .and(header("authorization", "Token tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"submission_ids": ["abc-123"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["report.pdf"]);

        let outcome = fx.workflow.confirm_upload().await.unwrap();
        assert!(outcome.is_complete_success());
        assert_eq!(
            status_of(&fx, &ids[0]),
            (UploadStatus::Pending, Some("abc-123".into()), None)
        );
        let banner = fx.workflow.apply(|s| s.upload_banner.clone()).unwrap().unwrap();
        assert_eq!(banner.kind, BannerKind::Success);
    }

    #[tokio::test]
    async fn missing_second_id_fails_only_that_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"submission_ids": ["id1"]})),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["a.pdf", "b.pdf"]);

        let outcome = fx.workflow.confirm_upload().await.unwrap();
        assert_eq!((outcome.succeeded, outcome.failed), (1, 1));
        assert!(matches!(
            outcome.into_result(),
            Err(AppError::PartialBatchFailure { failed: 1, total: 2 })
        ));

        assert_eq!(status_of(&fx, &ids[0]).0, UploadStatus::Pending);
        let (status, remote, detail) = status_of(&fx, &ids[1]);
        assert_eq!(status, UploadStatus::UploadFailed);
        assert!(remote.is_none());
        assert_eq!(
            detail.as_deref(),
            Some(LabResultsContent::fallback().no_submission_id_error.as_str())
        );
    }

    #[tokio::test]
    async fn rejected_batch_fails_every_item_with_server_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(
                ResponseTemplate::new(413)
                    .set_body_json(serde_json::json!({"detail": "Too large"})),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["a.pdf", "b.pdf"]);

        let err = fx.workflow.confirm_upload().await.unwrap_err();
        assert!(matches!(err, AppError::Server { status: 413, .. }));
        for id in &ids {
            let (status, remote, detail) = status_of(&fx, id);
            assert_eq!(status, UploadStatus::UploadFailed);
            assert!(remote.is_none());
            assert!(detail.unwrap().ends_with("Too large"));
        }
        assert!(!fx.workflow.apply(|s| s.is_uploading).unwrap());
    }

    #[tokio::test]
    async fn upload_without_token_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        fx.store.remove(AUTH_TOKEN_KEY).unwrap();
        let ids = select_pdfs(&fx, &["a.pdf"]);

        assert!(matches!(fx.workflow.confirm_upload().await, Err(AppError::AuthRequired)));
        assert_eq!(status_of(&fx, &ids[0]).0, UploadStatus::Selected);
    }

    #[tokio::test]
    async fn empty_selection_is_rejected() {
        let server = MockServer::start().await;
        let fx = fixture(&server, Duration::from_secs(60));
        assert!(matches!(
            fx.workflow.confirm_upload().await,
            Err(AppError::Validation(ValidationError::NoFilesSelected))
        ));
        assert!(fx.workflow.apply(|s| s.upload_banner.is_some()).unwrap());
    }

    #[tokio::test]
    async fn unreadable_file_aborts_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["present.pdf", "gone.pdf"]);
        fs::remove_file(fx.dir.path().join("gone.pdf")).unwrap();

        let err = fx.workflow.confirm_upload().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::FileMissing(ref n)) if n == "gone.pdf"
        ));
        assert_eq!(status_of(&fx, &ids[0]).0, UploadStatus::Selected);
        assert_eq!(status_of(&fx, &ids[1]).0, UploadStatus::UploadFailed);
    }

    #[tokio::test]
    async fn concurrent_confirms_send_one_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"submission_ids": ["r1", "r2"]}))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["a.pdf", "b.pdf"]);

        let (first, second) = tokio::join!(
            fx.workflow.confirm_upload(),
            fx.workflow.confirm_upload()
        );
        let (sent, rejected) = match (first, second) {
            (Ok(outcome), Err(e)) | (Err(e), Ok(outcome)) => (outcome, e),
            other => panic!("expected one batch and one rejection, got {:?}", other),
        };
        assert_eq!(sent.total, 2);
        assert!(matches!(
            rejected,
            AppError::Validation(ValidationError::NoFilesSelected)
        ));
        for id in &ids {
            assert_eq!(status_of(&fx, id).0, UploadStatus::Pending);
        }
        assert!(!fx.workflow.apply(|s| s.is_uploading).unwrap());
    }

    #[tokio::test]
    async fn upload_finishing_during_refresh_stays_pending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([]))
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"submission_ids": ["new-1"]})),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["a.pdf"]);

        let workflow = fx.workflow.clone();
        let refresh = tokio::spawn(async move { workflow.refresh(false).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.workflow.confirm_upload().await.unwrap();

        assert_eq!(refresh.await.unwrap().unwrap(), 0);
        assert_eq!(
            status_of(&fx, &ids[0]),
            (UploadStatus::Pending, Some("new-1".into()), None)
        );
    }

    #[tokio::test]
    async fn successful_upload_schedules_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"submission_ids": ["r1"]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(submissions_body(&[("r1", "completed")])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_millis(20));
        let ids = select_pdfs(&fx, &["a.pdf"]);
        fx.workflow.confirm_upload().await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(status_of(&fx, &ids[0]).0, UploadStatus::Completed);
    }

    #[tokio::test]
    async fn refresh_marks_vanished_submissions_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/upload/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"submission_ids": ["keep", "gone"]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(submissions_body(&[("keep", "processing")])),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["a.pdf", "b.pdf"]);
        fx.workflow.confirm_upload().await.unwrap();

        assert_eq!(fx.workflow.refresh(true).await.unwrap(), 2);
        assert_eq!(status_of(&fx, &ids[0]).0, UploadStatus::Processing);
        let (status, remote, detail) = status_of(&fx, &ids[1]);
        assert_eq!(status, UploadStatus::Failed);
        assert_eq!(remote.as_deref(), Some("gone"));
        assert_eq!(
            detail.as_deref(),
            Some(LabResultsContent::fallback().submission_not_found_error.as_str())
        );
        assert!(!fx.workflow.apply(|s| s.is_loading_submissions).unwrap());

        // A second pass with the same list changes nothing.
        assert_eq!(fx.workflow.refresh(false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_items_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let ids = select_pdfs(&fx, &["a.pdf"]);

        assert!(fx.workflow.refresh(true).await.is_err());
        assert_eq!(status_of(&fx, &ids[0]).0, UploadStatus::Selected);
        let (error, loading) = fx
            .workflow
            .apply(|s| (s.fetch_error.clone(), s.is_loading_submissions))
            .unwrap();
        assert!(error.is_some());
        assert!(!loading);
    }

    #[tokio::test]
    async fn poller_ticks_until_stopped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let poller = fx.workflow.spawn_poller(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(poller.is_running());
        poller.stop().await;

        let seen = server.received_requests().await.unwrap().len();
        assert!(seen >= 2, "expected several polls, saw {}", seen);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), seen);
    }

    #[tokio::test]
    async fn dispose_stops_poller_and_discards_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let poller = fx.workflow.spawn_poller(Duration::from_millis(20));
        fx.workflow.dispose();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!poller.is_running());
        assert!(matches!(fx.workflow.refresh(false).await, Err(AppError::Disposed)));
        assert!(matches!(fx.workflow.apply(|_| ()), Err(AppError::Disposed)));
    }

    #[tokio::test]
    async fn download_saves_under_header_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/submission/abc/download/"))
            .and(header("authorization", "Token tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"cbc%202024.pdf\"")
                    .set_body_bytes(b"%PDF-data".to_vec()),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let path = fx.workflow.download("abc", Some("fallback.pdf")).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "cbc 2024.pdf");
        assert_eq!(fs::read(&path).unwrap(), b"%PDF-data");
        assert!(fx.workflow.apply(|s| s.downloads_in_flight.is_empty()).unwrap());
    }

    #[tokio::test]
    async fn download_not_found_saves_nothing_and_clears_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/submission/abc/download/"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({"detail": "Not found."})),
            )
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let err = fx.workflow.download("abc", Some("a.pdf")).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Download {
                kind: crate::error::DownloadErrorKind::NotFound,
                ..
            }
        ));
        assert!(!fx.dir.path().join("downloads").exists());
        let (in_flight, banner) = fx
            .workflow
            .apply(|s| (s.downloads_in_flight.len(), s.download_banner.clone()))
            .unwrap();
        assert_eq!(in_flight, 0);
        assert_eq!(banner.unwrap().kind, BannerKind::Error);
    }

    #[tokio::test]
    async fn download_without_token_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        fx.store.remove(AUTH_TOKEN_KEY).unwrap();
        assert!(matches!(fx.workflow.download("abc", None).await, Err(AppError::AuthRequired)));
    }

    #[tokio::test]
    async fn second_download_of_same_submission_is_refused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/submission/abc/download/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"%PDF".to_vec())
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        let first = {
            let workflow = fx.workflow.clone();
            tokio::spawn(async move { workflow.download("abc", Some("a.pdf")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = fx.workflow.download("abc", Some("a.pdf")).await;
        assert!(matches!(
            second,
            Err(AppError::Validation(ValidationError::DownloadInProgress(_)))
        ));
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn detail_view_loads_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/submissions/abc/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "abc",
                "processing_status": "completed",
                "results": [
                    {
                        "id": "r1",
                        "analyte_name": "Hemoglobin",
                        "value": "13.5",
                        "unit": "g/dL",
                        "is_abnormal": false
                    }
                ]
            })))
            .mount(&server)
            .await;

        let fx = fixture(&server, Duration::from_secs(60));
        fx.workflow.load_detail("abc").await.unwrap();
        match fx.workflow.apply(|s| s.detail.clone()).unwrap() {
            Some(DetailView::Loaded(detail)) => {
                assert_eq!(detail.results.len(), 1);
                assert_eq!(detail.results[0].analyte_name.as_deref(), Some("Hemoglobin"));
            }
            other => panic!("expected loaded detail, got {:?}", other),
        }
    }
}
