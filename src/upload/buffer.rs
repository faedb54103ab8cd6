use crate::api::RemoteSubmission;
use crate::error::ValidationError;
use crate::upload::types::{SelectedFile, TrackedUpload, UploadStatus};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info};
use uuid::Uuid;

/// A selected item handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSource {
    pub local_id: String,
    pub file_name: String,
    pub path: Option<PathBuf>,
}

/// Per-batch result counts. `total` covers only items still tracked when
/// the response arrived; the rest are counted in `skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchOutcome {
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total
    }

    /// `Ok(succeeded)` if every file got an id, otherwise a partial failure.
    pub fn into_result(self) -> Result<usize, crate::error::AppError> {
        if self.failed == 0 {
            Ok(self.succeeded)
        } else {
            Err(crate::error::AppError::PartialBatchFailure {
                failed: self.failed,
                total: self.total,
            })
        }
    }
}

/// Tracked uploads in display order.
#[derive(Debug, Default, Clone)]
pub struct UploadBuffer {
    items: Vec<TrackedUpload>,
}

impl UploadBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TrackedUpload] {
        &self.items
    }

    pub fn get(&self, local_id: &str) -> Option<&TrackedUpload> {
        self.items.iter().find(|i| i.local_id() == local_id)
    }

    /// Replaces the current selection. If any file is not a PDF, nothing
    /// changes and the whole batch is rejected.
    pub fn select(&mut self, files: Vec<SelectedFile>) -> Result<usize, ValidationError> {
        if files.iter().any(|f| !f.is_pdf()) {
            return Err(ValidationError::PdfOnly);
        }

        self.items.retain(|i| i.status() != UploadStatus::Selected);
        let count = files.len();
        for file in files {
            let local_id = Uuid::new_v4().to_string();
            debug!("Selected {} as {}", file.name, local_id);
            self.items.push(TrackedUpload::selected(local_id, file));
        }
        Ok(count)
    }

    pub fn remove(&mut self, local_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.local_id() != local_id);
        self.items.len() != before
    }

    pub fn clear_selected(&mut self) -> usize {
        self.remove_where(|s| s == UploadStatus::Selected)
    }

    /// Removes completed, failed and upload-failed items.
    pub fn clear_finished(&mut self) -> usize {
        self.remove_where(UploadStatus::is_clearable)
    }

    fn remove_where(&mut self, pred: impl Fn(UploadStatus) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|i| !pred(i.status()));
        before - self.items.len()
    }

    pub fn has_selected(&self) -> bool {
        self.items.iter().any(|i| i.status() == UploadStatus::Selected)
    }

    /// Moves every `Selected` item to `Uploading` and returns them. A second
    /// call before the batch settles gets nothing.
    pub fn claim_selected(&mut self) -> Vec<UploadSource> {
        let sources = self.selected_sources();
        let ids: Vec<String> = sources.iter().map(|s| s.local_id.clone()).collect();
        self.mark_uploading(&ids);
        sources
    }

    /// Returns claimed items that were never sent to `Selected`.
    pub fn release(&mut self, local_ids: &[String]) -> usize {
        let mut released = 0;
        for item in self.items.iter_mut() {
            if item.status() == UploadStatus::Uploading
                && local_ids.iter().any(|id| id == item.local_id())
            {
                item.release();
                released += 1;
            }
        }
        released
    }

    pub fn selected_sources(&self) -> Vec<UploadSource> {
        self.items
            .iter()
            .filter(|i| i.status() == UploadStatus::Selected)
            .map(|i| UploadSource {
                local_id: i.local_id().to_string(),
                file_name: i.file_name().to_string(),
                path: i.source().map(|p| p.to_path_buf()),
            })
            .collect()
    }

    pub fn mark_uploading(&mut self, local_ids: &[String]) {
        for item in self.items.iter_mut() {
            if item.status() == UploadStatus::Selected
                && local_ids.iter().any(|id| id == item.local_id())
            {
                item.mark_uploading();
            }
        }
    }

    /// Fails one item that has not reached the server yet.
    pub fn mark_upload_failed(&mut self, local_id: &str, detail: &str) -> bool {
        match self.items.iter_mut().find(|i| i.local_id() == local_id) {
            Some(item) if !item.status().has_remote_id() => {
                item.mark_upload_failed(detail.to_string());
                true
            }
            _ => false,
        }
    }

    /// Fails every still-uploading item of a batch.
    pub fn fail_batch(&mut self, local_ids: &[String], detail: &str) -> usize {
        let mut failed = 0;
        for item in self.items.iter_mut() {
            if item.status() == UploadStatus::Uploading
                && local_ids.iter().any(|id| id == item.local_id())
            {
                item.mark_upload_failed(detail.to_string());
                failed += 1;
            }
        }
        failed
    }

    /// Applies the server's ids, which arrive in the same order as the files
    /// were sent. A `None` id fails that item with `missing_id_detail`.
    /// Items removed while the request was in flight are only counted as
    /// skipped.
    pub fn apply_batch_ids(
        &mut self,
        assignments: Vec<(String, Option<String>)>,
        missing_id_detail: &str,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (local_id, remote_id) in assignments {
            let Some(item) = self
                .items
                .iter_mut()
                .find(|i| i.local_id() == local_id && i.status() == UploadStatus::Uploading)
            else {
                debug!("Upload {} was removed before its result arrived", local_id);
                outcome.skipped += 1;
                continue;
            };

            match remote_id {
                Some(id) => {
                    item.mark_submitted(id);
                    outcome.succeeded += 1;
                }
                None => {
                    item.mark_upload_failed(missing_id_detail.to_string());
                    outcome.failed += 1;
                }
            }
        }

        outcome.total = outcome.succeeded + outcome.failed;
        info!(
            "Batch applied: {} submitted, {} failed of {}, {} skipped",
            outcome.succeeded, outcome.failed, outcome.total, outcome.skipped
        );
        outcome
    }

    /// Remote ids currently tracked. Taken before a list request so that
    /// [`UploadBuffer::reconcile`] knows which ids the list can vouch for.
    pub fn remote_ids(&self) -> HashSet<String> {
        self.items
            .iter()
            .filter_map(|i| i.remote_id().map(str::to_owned))
            .collect()
    }

    /// Brings every item that has a remote id in line with the server list.
    /// An item missing from the list becomes `Failed` with `not_found_detail`,
    /// but only if its id is in `requested`: ids assigned after the list was
    /// requested cannot be judged by it. Returns how many items changed.
    pub fn reconcile(
        &mut self,
        remote: &[RemoteSubmission],
        requested: &HashSet<String>,
        not_found_detail: &str,
    ) -> usize {
        let by_id: HashMap<&str, &RemoteSubmission> =
            remote.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut changed = 0;
        for item in self.items.iter_mut() {
            let Some(remote_id) = item.remote_id().map(str::to_owned) else {
                continue;
            };
            let before = item.clone();
            match by_id.get(remote_id.as_str()) {
                Some(sub) => {
                    item.set_remote_status(sub.processing_status, sub.processing_details.clone())
                }
                None if requested.contains(&remote_id) => item.set_remote_status(
                    crate::api::SubmissionStatus::Failed,
                    Some(not_found_detail.to_string()),
                ),
                None => {
                    debug!("Submission {} is newer than the list, left as is", remote_id);
                }
            }
            if *item != before {
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SubmissionStatus;

    fn files(names: &[&str]) -> Vec<SelectedFile> {
        names
            .iter()
            .map(|n| SelectedFile::from_path(format!("/tmp/{}", n)))
            .collect()
    }

    fn remote(id: &str, status: SubmissionStatus, detail: Option<&str>) -> RemoteSubmission {
        RemoteSubmission {
            id: id.to_string(),
            processing_status: status,
            processing_details: detail.map(str::to_string),
            test_type_name: None,
            file_name: None,
            test_date: None,
            submission_date: None,
        }
    }

    fn reconcile_all(
        buffer: &mut UploadBuffer,
        list: &[RemoteSubmission],
        detail: &str,
    ) -> usize {
        let requested = buffer.remote_ids();
        buffer.reconcile(list, &requested, detail)
    }

    fn all_hold_invariant(buffer: &UploadBuffer) -> bool {
        buffer.items().iter().all(TrackedUpload::invariant_holds)
    }

    /// Selects `names`, uploads them, and assigns `ids` in order.
    fn submitted(names: &[&str], ids: Vec<Option<&str>>) -> UploadBuffer {
        let mut buffer = UploadBuffer::new();
        buffer.select(files(names)).unwrap();
        let sources = buffer.selected_sources();
        let local_ids: Vec<String> = sources.iter().map(|s| s.local_id.clone()).collect();
        buffer.mark_uploading(&local_ids);
        let assignments = local_ids
            .into_iter()
            .zip(ids.into_iter().map(|id| id.map(str::to_string)))
            .collect();
        buffer.apply_batch_ids(assignments, "missing id");
        buffer
    }

    #[test]
    fn selecting_a_pdf_adds_a_selected_item() {
        let mut buffer = UploadBuffer::new();
        assert_eq!(buffer.select(files(&["report.pdf"])).unwrap(), 1);

        let item = &buffer.items()[0];
        assert_eq!(item.file_name(), "report.pdf");
        assert_eq!(item.status(), UploadStatus::Selected);
        assert_eq!(item.remote_id(), None);
        assert!(all_hold_invariant(&buffer));
    }

    #[test]
    fn any_non_pdf_rejects_the_whole_batch() {
        let mut buffer = UploadBuffer::new();
        assert_eq!(buffer.select(files(&["image.png"])), Err(ValidationError::PdfOnly));
        assert!(buffer.items().is_empty());

        buffer.select(files(&["a.pdf"])).unwrap();
        let err = buffer.select(files(&["b.pdf", "notes.txt", "c.pdf"]));
        assert_eq!(err, Err(ValidationError::PdfOnly));
        assert_eq!(buffer.items().len(), 1);
        assert_eq!(buffer.items()[0].file_name(), "a.pdf");
    }

    #[test]
    fn new_selection_replaces_only_selected_items() {
        let mut buffer = submitted(&["done.pdf"], vec![Some("r1")]);
        buffer.select(files(&["a.pdf", "b.pdf"])).unwrap();
        buffer.select(files(&["c.pdf"])).unwrap();

        let names: Vec<&str> = buffer.items().iter().map(|i| i.file_name()).collect();
        assert_eq!(names, vec!["done.pdf", "c.pdf"]);
    }

    #[test]
    fn local_ids_are_unique() {
        let mut buffer = UploadBuffer::new();
        buffer.select(files(&["same.pdf", "same.pdf"])).unwrap();
        assert_ne!(buffer.items()[0].local_id(), buffer.items()[1].local_id());
    }

    #[test]
    fn remove_and_clear_selected() {
        let mut buffer = UploadBuffer::new();
        buffer.select(files(&["a.pdf", "b.pdf"])).unwrap();
        let first = buffer.items()[0].local_id().to_string();

        assert!(buffer.remove(&first));
        assert!(!buffer.remove(&first));
        assert_eq!(buffer.items().len(), 1);
        assert_eq!(buffer.clear_selected(), 1);
        assert!(buffer.items().is_empty());
    }

    #[test]
    fn ids_are_assigned_in_order_and_missing_ids_fail() {
        let buffer = submitted(&["one.pdf", "two.pdf"], vec![Some("id1"), None]);

        let first = &buffer.items()[0];
        assert_eq!(first.status(), UploadStatus::Pending);
        assert_eq!(first.remote_id(), Some("id1"));
        assert_eq!(first.error_detail(), None);

        let second = &buffer.items()[1];
        assert_eq!(second.status(), UploadStatus::UploadFailed);
        assert_eq!(second.remote_id(), None);
        assert_eq!(second.error_detail(), Some("missing id"));
        assert!(all_hold_invariant(&buffer));
    }

    #[test]
    fn no_item_is_left_uploading_after_a_batch() {
        let buffer = submitted(&["a.pdf", "b.pdf", "c.pdf"], vec![Some("x"), None, Some("z")]);
        let pending = buffer.items().iter().filter(|i| i.status() == UploadStatus::Pending).count();
        let failed = buffer
            .items()
            .iter()
            .filter(|i| i.status() == UploadStatus::UploadFailed)
            .count();
        assert_eq!(pending + failed, 3);
        assert!(buffer.items().iter().all(|i| i.status() != UploadStatus::Uploading));
    }

    #[test]
    fn removed_items_are_skipped_when_results_arrive() {
        let mut buffer = UploadBuffer::new();
        buffer.select(files(&["a.pdf", "b.pdf"])).unwrap();
        let ids: Vec<String> = buffer.selected_sources().into_iter().map(|s| s.local_id).collect();
        buffer.mark_uploading(&ids);
        buffer.remove(&ids[0]);

        let outcome = buffer.apply_batch_ids(
            vec![
                (ids[0].clone(), Some("r0".into())),
                (ids[1].clone(), Some("r1".into())),
            ],
            "missing",
        );
        assert_eq!(
            outcome,
            BatchOutcome { total: 1, succeeded: 1, failed: 0, skipped: 1 }
        );
        assert_eq!(buffer.items().len(), 1);
        assert_eq!(buffer.items()[0].remote_id(), Some("r1"));
    }

    #[test]
    fn fail_batch_only_touches_uploading_items() {
        let mut buffer = submitted(&["old.pdf"], vec![Some("r-old")]);
        buffer.select(files(&["a.pdf"])).unwrap();
        let ids: Vec<String> = buffer.selected_sources().into_iter().map(|s| s.local_id).collect();
        buffer.mark_uploading(&ids);

        let all_ids: Vec<String> =
            buffer.items().iter().map(|i| i.local_id().to_string()).collect();
        assert_eq!(buffer.fail_batch(&all_ids, "Upload failed: Bad Request"), 1);
        assert_eq!(buffer.items()[0].status(), UploadStatus::Pending);
        assert_eq!(buffer.items()[1].status(), UploadStatus::UploadFailed);
        assert!(all_hold_invariant(&buffer));
    }

    #[test]
    fn reconcile_copies_remote_status_and_failure_detail() {
        let mut buffer = submitted(&["a.pdf", "b.pdf"], vec![Some("r1"), Some("r2")]);
        let remote_list = vec![
            remote("r1", SubmissionStatus::Completed, Some("ignored")),
            remote("r2", SubmissionStatus::Failed, Some("unreadable scan")),
        ];

        assert_eq!(reconcile_all(&mut buffer, &remote_list, "not found"), 2);
        assert_eq!(buffer.items()[0].status(), UploadStatus::Completed);
        assert_eq!(buffer.items()[0].error_detail(), None);
        assert_eq!(buffer.items()[1].status(), UploadStatus::Failed);
        assert_eq!(buffer.items()[1].error_detail(), Some("unreadable scan"));
        assert!(all_hold_invariant(&buffer));
    }

    #[test]
    fn reconcile_degrades_missing_submissions_only() {
        let mut buffer = submitted(&["a.pdf", "b.pdf"], vec![Some("r1"), Some("r2")]);
        let list = [remote("r2", SubmissionStatus::Processing, None)];
        reconcile_all(&mut buffer, &list, "not found");

        assert_eq!(buffer.items()[0].status(), UploadStatus::Failed);
        assert_eq!(buffer.items()[0].error_detail(), Some("not found"));
        assert_eq!(buffer.items()[0].remote_id(), Some("r1"));
        assert_eq!(buffer.items()[1].status(), UploadStatus::Processing);
        assert!(all_hold_invariant(&buffer));
    }

    #[test]
    fn reconcile_leaves_local_only_items_alone() {
        let mut buffer = submitted(&["bad.pdf"], vec![None]);
        buffer.select(files(&["new.pdf"])).unwrap();
        let before = buffer.items().to_vec();

        assert_eq!(reconcile_all(&mut buffer, &[], "not found"), 0);
        assert_eq!(buffer.items(), before.as_slice());
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut buffer = submitted(&["a.pdf", "b.pdf"], vec![Some("r1"), Some("gone")]);
        let remote_list = vec![remote("r1", SubmissionStatus::Processing, None)];

        reconcile_all(&mut buffer, &remote_list, "not found");
        let after_first = buffer.items().to_vec();
        assert_eq!(reconcile_all(&mut buffer, &remote_list, "not found"), 0);
        assert_eq!(buffer.items(), after_first.as_slice());
    }

    #[test]
    fn clear_finished_keeps_active_and_selected_items() {
        let mut buffer =
            submitted(&["a.pdf", "b.pdf", "c.pdf"], vec![Some("r1"), Some("r2"), None]);
        reconcile_all(
            &mut buffer,
            &[
                remote("r1", SubmissionStatus::Completed, None),
                remote("r2", SubmissionStatus::Processing, None),
            ],
            "not found",
        );
        buffer.select(files(&["d.pdf"])).unwrap();

        assert_eq!(buffer.clear_finished(), 2);
        let statuses: Vec<UploadStatus> = buffer.items().iter().map(|i| i.status()).collect();
        assert_eq!(statuses, vec![UploadStatus::Processing, UploadStatus::Selected]);
    }

    #[test]
    fn batch_outcome_reports_partial_failure() {
        let ok = BatchOutcome { total: 2, succeeded: 2, failed: 0, skipped: 0 };
        assert!(ok.is_complete_success());
        assert_eq!(ok.into_result().unwrap(), 2);

        let partial = BatchOutcome { total: 2, succeeded: 1, failed: 1, skipped: 0 };
        assert!(matches!(
            partial.into_result(),
            Err(crate::error::AppError::PartialBatchFailure { failed: 1, total: 2 })
        ));
    }

    #[test]
    fn claiming_twice_yields_nothing_the_second_time() {
        let mut buffer = UploadBuffer::new();
        buffer.select(files(&["a.pdf", "b.pdf"])).unwrap();

        let first = buffer.claim_selected();
        assert_eq!(first.len(), 2);
        assert!(buffer.claim_selected().is_empty());
        assert!(!buffer.has_selected());
        assert!(buffer.items().iter().all(|i| i.status() == UploadStatus::Uploading));
    }

    #[test]
    fn released_items_can_be_claimed_again() {
        let mut buffer = UploadBuffer::new();
        buffer.select(files(&["a.pdf", "b.pdf"])).unwrap();
        let ids: Vec<String> = buffer.claim_selected().into_iter().map(|s| s.local_id).collect();

        buffer.mark_upload_failed(&ids[1], "gone");
        assert_eq!(buffer.release(&ids), 1);
        assert_eq!(buffer.items()[0].status(), UploadStatus::Selected);
        assert!(buffer.items()[0].source().is_some());
        assert_eq!(buffer.items()[1].status(), UploadStatus::UploadFailed);
        assert_eq!(buffer.claim_selected().len(), 1);
        assert!(all_hold_invariant(&buffer));
    }

    #[test]
    fn ids_assigned_after_the_request_are_not_downgraded() {
        let mut buffer = submitted(&["old.pdf"], vec![Some("r-old")]);
        let requested = buffer.remote_ids();

        buffer.select(files(&["new.pdf"])).unwrap();
        let ids: Vec<String> = buffer.claim_selected().into_iter().map(|s| s.local_id).collect();
        buffer.apply_batch_ids(vec![(ids[0].clone(), Some("r-new".into()))], "missing");

        assert_eq!(buffer.reconcile(&[], &requested, "not found"), 1);
        assert_eq!(buffer.items()[0].status(), UploadStatus::Failed);
        assert_eq!(buffer.items()[1].status(), UploadStatus::Pending);
        assert_eq!(buffer.items()[1].error_detail(), None);
    }
}
