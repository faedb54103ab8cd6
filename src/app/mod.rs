mod state;
mod ui;
mod workflow;

use crate::api::{build_http_client, AuthClient, LabApiClient};
use crate::config::{AppConfig, UPLOAD_ERROR_BANNER, UPLOAD_SUCCESS_BANNER};
use crate::content::load_content;
use crate::error::AppError;
use crate::session::{FileStore, KeyValueStore, Locale, LocaleProvider};
use crate::upload::download::DirectorySaver;
use crate::upload::SelectedFile;
use eframe::{egui, App};
use rfd::FileDialog;
use state::{Banner, BannerKind, PageState};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{info, warn};
use workflow::{PollerHandle, Workflow, WorkflowOptions};

const BUSY_REPAINT: Duration = Duration::from_millis(100);

/// Text typed into the login and password reset forms.
#[derive(Default)]
struct AuthForm {
    identifier: String,
    password: String,
    reset_email: String,
    show_reset: bool,
}

/// Something the user asked for while the page state was locked for drawing.
#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    SetLocale(Locale),
    Login,
    Logout,
    RequestReset,
    Refresh,
    Download { id: String, suggested: Option<String> },
    ViewDetails(String),
    CloseDetails,
    PickFiles,
    Remove(String),
    ClearSelected,
    ClearFinished,
    ConfirmUpload,
}

pub struct LabResultsApp {
    workflow: Workflow,
    auth: AuthClient,
    locales: LocaleProvider,
    content_dir: PathBuf,
    form: AuthForm,
    _poller: Option<PollerHandle>,
}

impl LabResultsApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: &AppConfig,
        runtime: Handle,
    ) -> Result<Self, AppError> {
        info!("Initializing lab results uploader against {}", config.api_base_url);
        let session = FileStore::open(config.session_file.clone());
        info!("Session stored in {}", session.path().display());
        let store: Arc<dyn KeyValueStore> = Arc::new(session);
        let http = build_http_client(config.request_timeout)?;
        let auth = AuthClient::new(http.clone(), config.api_base_url.clone(), store.clone());
        let locales = LocaleProvider::new(store);

        let locale = locales.get();
        let mut page = PageState::new(load_content(&config.content_dir, locale), locale);
        page.login_identifier = auth.login_identifier();

        let workflow = Workflow::new(
            LabApiClient::new(http, config.api_base_url.clone()),
            auth.tokens().clone(),
            page.shared(),
            Arc::new(DirectorySaver::new(config.download_dir.clone())),
            runtime,
            WorkflowOptions {
                refresh_delay: config.refresh_delay,
                open_after_download: config.open_after_download,
            },
        );

        let poller = config.poll_interval.map(|every| workflow.spawn_poller(every));

        let app = Self {
            workflow,
            auth,
            locales,
            content_dir: config.content_dir.clone(),
            form: AuthForm::default(),
            _poller: poller,
        };
        if app.is_logged_in() {
            let workflow = app.workflow.clone();
            app.workflow.runtime().spawn(async move {
                let _ = workflow.refresh(true).await;
            });
        }
        Ok(app)
    }

    fn is_logged_in(&self) -> bool {
        self.auth.tokens().get().is_some()
    }

    /// Runs `task` on the runtime and repaints once it is done.
    fn spawn<F>(&self, ctx: &egui::Context, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ctx = ctx.clone();
        self.workflow.runtime().spawn(async move {
            task.await;
            ctx.request_repaint();
        });
    }

    fn handle(&mut self, ctx: &egui::Context, action: UiAction) {
        match action {
            UiAction::SetLocale(locale) => self.set_locale(locale),
            UiAction::Login => self.login(ctx),
            UiAction::Logout => self.logout(ctx),
            UiAction::RequestReset => self.request_reset(ctx),
            UiAction::Refresh => {
                let workflow = self.workflow.clone();
                self.spawn(ctx, async move {
                    let _ = workflow.refresh(true).await;
                });
            }
            UiAction::Download { id, suggested } => {
                let workflow = self.workflow.clone();
                self.spawn(ctx, async move {
                    let _ = workflow.download(&id, suggested.as_deref()).await;
                });
            }
            UiAction::ViewDetails(id) => {
                let workflow = self.workflow.clone();
                self.spawn(ctx, async move {
                    let _ = workflow.load_detail(&id).await;
                });
            }
            UiAction::CloseDetails => {
                let _ = self.workflow.apply(|s| s.detail = None);
            }
            UiAction::PickFiles => self.pick_files(),
            UiAction::Remove(local_id) => {
                let _ = self.workflow.apply(|s| s.buffer.remove(&local_id));
            }
            UiAction::ClearSelected => {
                let _ = self.workflow.apply(|s| s.buffer.clear_selected());
            }
            UiAction::ClearFinished => {
                let _ = self.workflow.apply(|s| s.buffer.clear_finished());
            }
            UiAction::ConfirmUpload => {
                let workflow = self.workflow.clone();
                self.spawn(ctx, async move {
                    let _ = workflow.confirm_upload().await;
                });
            }
        }
    }

    fn pick_files(&mut self) {
        let Some(paths) = FileDialog::new().add_filter("PDF", &["pdf"]).pick_files() else {
            return;
        };
        let files: Vec<SelectedFile> = paths.into_iter().map(SelectedFile::from_path).collect();
        let _ = self.workflow.apply(|s| match s.buffer.select(files) {
            Ok(count) => {
                info!("Selected {} files", count);
                s.upload_banner = None;
            }
            Err(e) => {
                let message = AppError::from(e).user_message(&s.content);
                s.upload_banner =
                    Some(Banner::new(BannerKind::Error, message, UPLOAD_ERROR_BANNER));
            }
        });
    }

    fn set_locale(&mut self, locale: Locale) {
        if let Err(e) = self.locales.set(locale) {
            warn!("Could not remember locale: {}", e);
        }
        let content = load_content(&self.content_dir, locale);
        let _ = self.workflow.apply(|s| {
            s.locale = locale;
            s.content = content;
        });
    }

    fn login(&mut self, ctx: &egui::Context) {
        let identifier = self.form.identifier.trim().to_string();
        let password = std::mem::take(&mut self.form.password);
        let auth = self.auth.clone();
        let workflow = self.workflow.clone();

        self.spawn(ctx, async move {
            match auth.login(&identifier, &password).await {
                Ok(()) => {
                    let _ = workflow.apply(|s| {
                        s.login_identifier = Some(identifier);
                        s.auth_banner = None;
                    });
                    let _ = workflow.refresh(true).await;
                }
                Err(e) => {
                    let _ = workflow.apply(|s| {
                        s.auth_banner = Some(Banner::new(
                            BannerKind::Error,
                            e.user_message(&s.content),
                            UPLOAD_ERROR_BANNER,
                        ));
                    });
                }
            }
        });
    }

    fn logout(&mut self, ctx: &egui::Context) {
        let auth = self.auth.clone();
        let workflow = self.workflow.clone();
        self.spawn(ctx, async move {
            if let Err(e) = auth.logout().await {
                warn!("Could not clear session: {}", e);
            }
            let _ = workflow.apply(|s| {
                s.login_identifier = None;
                s.submissions.clear();
                s.detail = None;
                s.fetch_error = None;
            });
        });
    }

    fn request_reset(&mut self, ctx: &egui::Context) {
        let email = self.form.reset_email.trim().to_string();
        let auth = self.auth.clone();
        let workflow = self.workflow.clone();
        self.spawn(ctx, async move {
            let result = auth.request_password_reset(&email).await;
            let _ = workflow.apply(|s| {
                s.auth_banner = Some(match result {
                    Ok(()) => Banner::new(
                        BannerKind::Success,
                        s.content.reset_success_message.clone(),
                        UPLOAD_SUCCESS_BANNER,
                    ),
                    Err(e) => Banner::new(
                        BannerKind::Error,
                        e.user_message(&s.content),
                        UPLOAD_ERROR_BANNER,
                    ),
                });
            });
        });
    }
}

impl App for LabResultsApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let logged_in = self.is_logged_in();
        let state = self.workflow.state().clone();

        let (actions, busy, next_expiry) = {
            let mut page = state.lock();
            page.expire_banners(Instant::now());
            let actions = ui::render(ctx, &page, &mut self.form, logged_in);
            (actions, page.is_busy(), page.next_banner_expiry())
        };

        for action in actions {
            self.handle(ctx, action);
        }

        if busy {
            ctx.request_repaint_after(BUSY_REPAINT);
        } else if let Some(at) = next_expiry {
            ctx.request_repaint_after(at.saturating_duration_since(Instant::now()));
        }
    }
}

impl Drop for LabResultsApp {
    fn drop(&mut self) {
        self.workflow.dispose();
    }
}
