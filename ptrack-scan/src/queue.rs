//! Continuous-scan queue
//!
//! Used at stations where a whole tray is completed before any network round
//! trip. Codes accumulate client-side and are uploaded as one batch.
//!
//! Failed codes of a batch are not retained: the operator rescans them.

use ptrack_common::codes::{dedupe_ordered, normalize_code, split_code_lines};
use ptrack_common::events::BatchLine;

/// Result of adding one code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// New code appended at 1-based `position`
    Added { code: String, position: usize },
    /// Code already waiting in the queue
    AlreadyQueued { code: String },
    /// Blank after normalization
    Invalid,
}

impl EnqueueOutcome {
    pub fn added(&self) -> bool {
        matches!(self, EnqueueOutcome::Added { .. })
    }
}

/// Codes taken out of the queue for one upload
///
/// Not `Clone`: holding it is what keeps the upload guard engaged.
#[derive(Debug, PartialEq, Eq)]
pub struct UploadBatch {
    codes: Vec<String>,
}

impl UploadBatch {
    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Per-code outcome of one upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub lines: Vec<BatchLine>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.lines.iter().filter(|l| l.success).count()
    }

    pub fn failed(&self) -> usize {
        self.lines.len() - self.succeeded()
    }

    pub fn failed_codes(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter(|l| !l.success)
            .map(|l| l.code.as_str())
            .collect()
    }
}

/// Ordered, duplicate-free list of pending codes
#[derive(Debug, Clone, Default)]
pub struct ContinuousQueue {
    codes: Vec<String>,
    uploading: bool,
}

impl ContinuousQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    /// Append a code unless it is already queued
    pub fn enqueue(&mut self, raw: &str) -> EnqueueOutcome {
        let code = normalize_code(raw);
        if code.is_empty() {
            return EnqueueOutcome::Invalid;
        }

        let next = dedupe_ordered(self.codes.iter().map(String::as_str).chain([code]));
        if next.len() == self.codes.len() {
            return EnqueueOutcome::AlreadyQueued {
                code: code.to_string(),
            };
        }
        self.codes = next;
        EnqueueOutcome::Added {
            code: code.to_string(),
            position: self.codes.len(),
        }
    }

    /// Enqueue a block of manually entered codes, one per line
    pub fn enqueue_lines(&mut self, text: &str) -> Vec<EnqueueOutcome> {
        split_code_lines(text)
            .iter()
            .map(|code| self.enqueue(code))
            .collect()
    }

    /// Take the current codes for upload
    ///
    /// `None` while another upload is in flight or when nothing valid is queued.
    pub fn begin_upload(&mut self) -> Option<UploadBatch> {
        if self.uploading {
            return None;
        }
        self.codes = dedupe_ordered(&self.codes);
        if self.codes.is_empty() {
            return None;
        }
        self.uploading = true;
        Some(UploadBatch {
            codes: self.codes.clone(),
        })
    }

    /// Close an upload: the queue is emptied, failed codes included
    ///
    /// Callers must not enqueue while [`is_uploading`](Self::is_uploading).
    pub fn finish_upload(&mut self, batch: UploadBatch, results: &[(String, bool)]) -> BatchReport {
        self.uploading = false;
        self.codes.clear();

        let lines = batch
            .codes
            .into_iter()
            .map(|code| {
                let success = results
                    .iter()
                    .any(|(c, ok)| *c == code && *ok);
                BatchLine { code, success }
            })
            .collect();
        BatchReport { lines }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_new_and_repeated() {
        let mut queue = ContinuousQueue::new();
        assert_eq!(
            queue.enqueue(" P-002 "),
            EnqueueOutcome::Added {
                code: "P-002".into(),
                position: 1
            }
        );
        assert_eq!(
            queue.enqueue("P-002"),
            EnqueueOutcome::AlreadyQueued {
                code: "P-002".into()
            }
        );
        assert_eq!(queue.codes(), ["P-002"]);
    }

    #[test]
    fn test_blank_code_is_invalid() {
        let mut queue = ContinuousQueue::new();
        assert_eq!(queue.enqueue("  \r\n"), EnqueueOutcome::Invalid);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_lines_keeps_order() {
        let mut queue = ContinuousQueue::new();
        queue.enqueue("B");
        let outcomes = queue.enqueue_lines("A\nB\n\nC\nA\n");
        assert_eq!(outcomes.iter().filter(|o| o.added()).count(), 2);
        assert_eq!(queue.codes(), ["B", "A", "C"]);
    }

    #[test]
    fn test_second_upload_refused_while_in_flight() {
        let mut queue = ContinuousQueue::new();
        queue.enqueue("A");
        let batch = queue.begin_upload().unwrap();
        assert!(queue.is_uploading());
        assert!(queue.begin_upload().is_none());

        queue.finish_upload(batch, &[("A".into(), true)]);
        assert!(!queue.is_uploading());
    }

    #[test]
    fn test_empty_queue_has_nothing_to_upload() {
        let mut queue = ContinuousQueue::new();
        assert!(queue.begin_upload().is_none());
        assert!(!queue.is_uploading());
    }

    #[test]
    fn test_finish_clears_uploaded_codes_even_on_failure() {
        let mut queue = ContinuousQueue::new();
        queue.enqueue_lines("A\nB\nC");
        let batch = queue.begin_upload().unwrap();

        let report = queue.finish_upload(batch, &[("A".into(), true), ("B".into(), false)]);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.failed_codes(), vec!["B", "C"]);
        assert!(queue.is_empty());
    }
}
