use super::state::{Banner, BannerKind, DetailView, PageState};
use super::{AuthForm, UiAction};
use crate::api::{RemoteSubmission, SubmissionDetail, SubmissionStatus};
use crate::content::LabResultsContent;
use crate::session::Locale;
use crate::upload::presenter::{self, AnalyteFlag};
use crate::upload::{TrackedUpload, UploadStatus};
use eframe::egui::{self, Color32, RichText};

const ACCENT: Color32 = Color32::from_rgb(161, 89, 225);
const SUCCESS: Color32 = Color32::from_rgb(0, 180, 0);
const ERROR: Color32 = Color32::from_rgb(220, 50, 50);
const MUTED: Color32 = Color32::from_rgb(150, 150, 150);

/// Draws the whole page and returns what the user clicked.
pub(super) fn render(
    ctx: &egui::Context,
    page: &PageState,
    form: &mut AuthForm,
    logged_in: bool,
) -> Vec<UiAction> {
    let mut actions = Vec::new();
    let content = &page.content;

    egui::CentralPanel::default().show(ctx, |ui| {
        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.add_space(20.0);
            render_header(ui, page, &mut actions);
            ui.add_space(10.0);

            ui.group(|ui| render_auth(ui, page, form, logged_in, &mut actions));
            render_banner(ui, page.auth_banner.as_ref());
            ui.add_space(20.0);

            if logged_in {
                ui.group(|ui| render_submissions(ui, page, &mut actions));
                render_banner(ui, page.download_banner.as_ref());
                ui.add_space(20.0);
            }

            ui.group(|ui| render_upload(ui, page, &mut actions));
            ui.add_space(10.0);
            render_status_list(ui, page, &mut actions);
            render_banner(ui, page.upload_banner.as_ref());
            ui.add_space(20.0);
        });
    });

    if let Some(detail) = &page.detail {
        let mut open = true;
        egui::Window::new(content.detail_title.as_str())
            .id(egui::Id::new("submission_detail"))
            .open(&mut open)
            .collapsible(false)
            .default_width(520.0)
            .show(ctx, |ui| render_detail(ui, page, detail, &mut actions));
        if !open {
            actions.push(UiAction::CloseDetails);
        }
    }

    actions
}

fn render_header(ui: &mut egui::Ui, page: &PageState, actions: &mut Vec<UiAction>) {
    let content = &page.content;
    ui.vertical_centered(|ui| {
        ui.heading(&content.page_title);
    });
    ui.add_space(8.0);
    ui.horizontal(|ui| {
        ui.label(&content.language_label);
        egui::ComboBox::from_id_source("locale")
            .selected_text(page.locale.native_name())
            .show_ui(ui, |ui| {
                for locale in Locale::ALL {
                    if ui
                        .selectable_label(page.locale == locale, locale.native_name())
                        .clicked()
                        && page.locale != locale
                    {
                        actions.push(UiAction::SetLocale(locale));
                    }
                }
            });
    });
}

fn render_auth(
    ui: &mut egui::Ui,
    page: &PageState,
    form: &mut AuthForm,
    logged_in: bool,
    actions: &mut Vec<UiAction>,
) {
    let content = &page.content;

    if logged_in {
        ui.horizontal(|ui| {
            if let Some(who) = &page.login_identifier {
                ui.label(format!("{} {}", content.logged_in_as, who));
            }
            if ui.button(&content.logout_button).clicked() {
                actions.push(UiAction::Logout);
            }
        });
        return;
    }

    ui.label(RichText::new(&content.login_title).strong());
    ui.add_space(4.0);
    ui.add(
        egui::TextEdit::singleline(&mut form.identifier)
            .hint_text(content.login_label.as_str())
            .desired_width(280.0),
    );
    let password = ui.add(
        egui::TextEdit::singleline(&mut form.password)
            .hint_text(content.password_label.as_str())
            .password(true)
            .desired_width(280.0),
    );

    let can_login = !form.identifier.trim().is_empty() && !form.password.is_empty();
    let submitted = password.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
    ui.horizontal(|ui| {
        if ui.add_enabled(can_login, egui::Button::new(&content.login_button)).clicked()
            || (submitted && can_login)
        {
            actions.push(UiAction::Login);
        }
        if ui.link(&content.forgot_password_title).clicked() {
            form.show_reset = !form.show_reset;
        }
    });

    if form.show_reset {
        ui.add_space(6.0);
        ui.horizontal(|ui| {
            ui.add(
                egui::TextEdit::singleline(&mut form.reset_email)
                    .hint_text(content.email_label.as_str())
                    .desired_width(220.0),
            );
            let can_reset = !form.reset_email.trim().is_empty();
            if ui.add_enabled(can_reset, egui::Button::new(&content.reset_button)).clicked() {
                actions.push(UiAction::RequestReset);
            }
        });
    }
}

fn render_submissions(ui: &mut egui::Ui, page: &PageState, actions: &mut Vec<UiAction>) {
    let content = &page.content;

    ui.horizontal(|ui| {
        ui.label(RichText::new(&content.page_title).strong());
        let refresh = egui::Button::new(format!("🔄 {}", content.refresh_list_button));
        if ui.add_enabled(!page.is_loading_submissions, refresh).clicked() {
            actions.push(UiAction::Refresh);
        }
        if page.is_loading_submissions {
            ui.spinner();
        }
    });
    ui.add_space(6.0);

    if let Some(error) = &page.fetch_error {
        ui.colored_label(ERROR, error);
    }
    if page.is_loading_submissions && page.submissions.is_empty() {
        ui.label(&content.loading_submissions_message);
        return;
    }
    if page.submissions.is_empty() {
        ui.label(
            RichText::new(&content.no_documents_message)
                .color(ui.visuals().text_color().gamma_multiply(0.7)),
        );
        return;
    }

    let groups = presenter::group_by_test_type(&page.submissions, &content.unknown_test_type);
    for (test_type, rows) in groups {
        egui::CollapsingHeader::new(RichText::new(&test_type).color(ACCENT))
            .id_source(("group", &test_type))
            .default_open(true)
            .show(ui, |ui| {
                for submission in rows {
                    render_submission_row(ui, page, submission, actions);
                }
            });
    }
}

fn render_submission_row(
    ui: &mut egui::Ui,
    page: &PageState,
    submission: &RemoteSubmission,
    actions: &mut Vec<UiAction>,
) {
    let content = &page.content;
    let status = UploadStatus::from(submission.processing_status);

    ui.horizontal(|ui| {
        ui.label(presenter::display_name(submission, &content.submission_fallback_name));
        ui.colored_label(status_color(status), content.status_label(status));
        if let Some(date) = &submission.test_date {
            ui.label(date_text(date, page));
        }

        let in_flight = page.downloads_in_flight.contains(&submission.id);
        let label = if in_flight {
            content.downloading_message.as_str()
        } else {
            content.download_file_action.as_str()
        };
        if ui.add_enabled(!in_flight, egui::Button::new(label)).clicked() {
            actions.push(UiAction::Download {
                id: submission.id.clone(),
                suggested: submission.file_name.clone(),
            });
        }

        if submission.processing_status == SubmissionStatus::Completed
            && ui.button(&content.view_details_action).clicked()
        {
            actions.push(UiAction::ViewDetails(submission.id.clone()));
        }
    });

    if submission.processing_status == SubmissionStatus::Failed {
        if let Some(detail) = &submission.processing_details {
            ui.colored_label(ERROR, format!("{}: {}", content.file_status_error_details, detail));
        }
    }
}

fn render_upload(ui: &mut egui::Ui, page: &PageState, actions: &mut Vec<UiAction>) {
    let content = &page.content;
    let items = page.buffer.items();
    let selected = presenter::selected(items);

    ui.label(RichText::new(&content.upload_section_title).strong());
    ui.label(&content.upload_form_prompt);
    ui.add_space(6.0);

    ui.horizontal(|ui| {
        if ui
            .add_enabled(
                !page.is_uploading,
                egui::Button::new(format!("📁 {}", content.select_files_button)),
            )
            .clicked()
        {
            actions.push(UiAction::PickFiles);
        }
        if !selected.is_empty() && ui.button(&content.clear_selected_button).clicked() {
            actions.push(UiAction::ClearSelected);
        }
    });

    if !selected.is_empty() {
        ui.add_space(6.0);
        ui.label(&content.selected_files_title);
        for item in &selected {
            ui.horizontal(|ui| {
                ui.label("📄");
                ui.label(item.file_name());
                if ui.small_button(&content.remove_button).clicked() {
                    actions.push(UiAction::Remove(item.local_id().to_string()));
                }
            });
        }
    }

    ui.add_space(10.0);
    ui.vertical_centered(|ui| {
        let can_upload = !selected.is_empty() && !page.is_uploading;
        let button = egui::Button::new(format!("📤 {}", content.confirm_upload_button_text))
            .min_size(egui::vec2(200.0, 40.0));
        if ui.add_enabled(can_upload, button).clicked() {
            actions.push(UiAction::ConfirmUpload);
        }
        if page.is_uploading {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(&content.uploading_message);
            });
        }
    });
}

fn render_status_list(ui: &mut egui::Ui, page: &PageState, actions: &mut Vec<UiAction>) {
    let content = &page.content;
    let items = page.buffer.items();
    let tracked = presenter::in_progress(items);
    if tracked.is_empty() {
        return;
    }

    ui.horizontal(|ui| {
        ui.label(RichText::new(&content.upload_status_section_title).strong());
        if presenter::has_clearable(items)
            && ui.button(&content.clear_completed_failed_button).clicked()
        {
            actions.push(UiAction::ClearFinished);
        }
    });

    egui::ScrollArea::vertical()
        .id_source("upload_status")
        .max_height(200.0)
        .show(ui, |ui| {
            egui::Frame::none()
                .fill(ui.style().visuals.extreme_bg_color)
                .show(ui, |ui| {
                    ui.add_space(8.0);
                    for item in tracked {
                        render_tracked(ui, content, item, actions);
                        ui.add_space(4.0);
                    }
                    ui.add_space(8.0);
                });
        });
}

fn render_tracked(
    ui: &mut egui::Ui,
    content: &LabResultsContent,
    item: &TrackedUpload,
    actions: &mut Vec<UiAction>,
) {
    let status = item.status();
    let icon = match status {
        s if s.is_active() => "⏳",
        UploadStatus::Completed => "✅",
        UploadStatus::UploadFailed | UploadStatus::Failed => "❌",
        _ => "📄",
    };

    ui.horizontal(|ui| {
        ui.label(icon);
        ui.colored_label(
            status_color(status),
            format!("{} - {}", item.file_name(), content.status_label(status)),
        );
        if status.is_clearable() && ui.small_button(&content.remove_button).clicked() {
            actions.push(UiAction::Remove(item.local_id().to_string()));
        }
    });
    if let Some(detail) = item.error_detail() {
        ui.colored_label(ERROR, format!("   {}: {}", content.file_status_error_details, detail));
    }
}

fn render_detail(
    ui: &mut egui::Ui,
    page: &PageState,
    view: &DetailView,
    actions: &mut Vec<UiAction>,
) {
    let content = &page.content;
    match view {
        DetailView::Loading(_) => {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label(&content.detail_loading_message);
            });
        }
        DetailView::Failed { message, .. } => {
            ui.colored_label(ERROR, message);
        }
        DetailView::Loaded(detail) => render_detail_body(ui, page, detail),
    }

    ui.add_space(10.0);
    if ui.button(&content.back_button_text).clicked() {
        actions.push(UiAction::CloseDetails);
    }
}

fn render_detail_body(ui: &mut egui::Ui, page: &PageState, detail: &SubmissionDetail) {
    let content = &page.content;

    if let Some(name) = &detail.test_type_name {
        ui.label(RichText::new(name).strong().color(ACCENT));
    }
    if let Some(date) = &detail.test_date {
        ui.label(format!("{}: {}", content.test_date_label, date_text(date, page)));
    }
    if let Some(notes) = detail.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        ui.label(format!("{}: {}", content.notes_label, notes));
    }
    ui.add_space(8.0);

    egui::Grid::new("analytes").striped(true).show(ui, |ui| {
        for heading in [
            &content.analyte_column,
            &content.value_column,
            &content.unit_column,
            &content.reference_range_column,
            &content.status_column,
        ] {
            ui.label(RichText::new(heading).strong());
        }
        ui.end_row();

        for result in &detail.results {
            let flag = AnalyteFlag::from_abnormal(result.is_abnormal);
            ui.label(result.analyte_name.as_deref().unwrap_or("-"));
            ui.label(result.value.as_deref().unwrap_or("-"));
            ui.label(result.unit.as_deref().unwrap_or(""));
            ui.label(result.reference_range.as_deref().unwrap_or(""));
            let color = match flag {
                AnalyteFlag::Normal => SUCCESS,
                AnalyteFlag::Abnormal => ERROR,
                AnalyteFlag::Unknown => MUTED,
            };
            ui.colored_label(color, flag.label(content));
            ui.end_row();
        }
    });
}

fn render_banner(ui: &mut egui::Ui, banner: Option<&Banner>) {
    let Some(banner) = banner else {
        return;
    };
    let color = match banner.kind {
        BannerKind::Success => SUCCESS,
        BannerKind::Error => ERROR,
    };
    ui.add_space(5.0);
    ui.vertical_centered(|ui| {
        ui.colored_label(color, &banner.message);
    });
}

fn date_text(raw: &str, page: &PageState) -> String {
    presenter::format_test_date(raw, page.locale)
        .unwrap_or_else(|_| page.content.invalid_date_format.clone())
}

fn status_color(status: UploadStatus) -> Color32 {
    match status {
        UploadStatus::Completed => SUCCESS,
        UploadStatus::Failed | UploadStatus::UploadFailed => ERROR,
        _ => MUTED,
    }
}
