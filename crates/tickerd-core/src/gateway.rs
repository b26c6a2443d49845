//! Submission gateway: normalization, validation, admission.

use std::sync::Arc;

use crate::domain::{Subject, TaskId};
use crate::error::SubmitError;
use crate::store::TaskStore;

/// Split a raw subject string on commas and whitespace, trim, drop empties,
/// and deduplicate preserving first-seen order.
pub fn split_subjects(raw: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for part in raw.split([',', ' ', '\t', '\n', '\r']) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !seen.iter().any(|s: &String| s.eq_ignore_ascii_case(part)) {
            seen.push(part.to_string());
        }
    }
    seen
}

/// Validates submissions and hands admitted batches to the store.
#[derive(Clone)]
pub struct Gateway {
    store: Arc<TaskStore>,
}

impl Gateway {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    /// Submit one ticker or a delimited batch.
    ///
    /// The whole batch is rejected if any entry fails validation; the error
    /// lists every offending entry, nothing is silently skipped.
    pub async fn submit_tickers(&self, raw: &str) -> Result<Vec<TaskId>, SubmitError> {
        let parts = split_subjects(raw);
        if parts.is_empty() {
            return Err(SubmitError::EmptyBatch);
        }

        let mut subjects = Vec::with_capacity(parts.len());
        let mut invalid = Vec::new();
        for part in &parts {
            match Subject::parse_ticker(part) {
                Ok(subject) => subjects.push(subject),
                Err(e) => invalid.push(format!("{part}: {e}")),
            }
        }
        if !invalid.is_empty() {
            return Err(SubmitError::InvalidSubjects(invalid));
        }

        // Normalization can collapse case variants into duplicates.
        subjects.dedup();

        let ids = self.store.submit(subjects).await?;
        tracing::info!(count = ids.len(), "admitted analysis batch");
        Ok(ids)
    }

    /// Submit a market-review task (fixed designator, no validation).
    pub async fn submit_market_review(&self) -> Result<TaskId, SubmitError> {
        let ids = self.store.submit(vec![Subject::MarketReview]).await?;
        tracing::info!(task_id = %ids[0], "admitted market review");
        Ok(ids[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;
    use crate::store::Limits;

    fn gateway() -> (Gateway, Arc<TaskStore>) {
        let store = Arc::new(TaskStore::new(Limits::default()));
        (Gateway::new(Arc::clone(&store)), store)
    }

    #[test]
    fn splits_on_commas_and_whitespace() {
        assert_eq!(
            split_subjects("AAPL, msft  tsla"),
            vec!["AAPL", "msft", "tsla"]
        );
        assert_eq!(split_subjects("600519\nhk00700"), vec!["600519", "hk00700"]);
        assert_eq!(split_subjects("  ,, \n "), Vec::<String>::new());
    }

    #[test]
    fn dedup_preserves_first_seen_order() {
        assert_eq!(split_subjects("AAPL, AAPL"), vec!["AAPL"]);
        assert_eq!(split_subjects("msft, AAPL, MSFT"), vec!["msft", "AAPL"]);
    }

    #[tokio::test]
    async fn mixed_batch_creates_tasks_in_input_order() {
        let (gateway, store) = gateway();
        let ids = gateway.submit_tickers("AAPL, msft  tsla").await.unwrap();
        assert_eq!(ids.len(), 3);

        let subjects: Vec<String> = subjects_of(&store, &ids).await;
        assert_eq!(subjects, vec!["AAPL", "MSFT", "TSLA"]);
        for id in ids {
            assert_eq!(store.get(id).await.unwrap().state, TaskState::Queued);
        }
    }

    async fn subjects_of(store: &TaskStore, ids: &[TaskId]) -> Vec<String> {
        let mut out = Vec::new();
        for id in ids {
            out.push(store.get(*id).await.unwrap().subject.to_string());
        }
        out
    }

    #[tokio::test]
    async fn duplicate_subject_collapses_to_one_task() {
        let (gateway, _) = gateway();
        let ids = gateway.submit_tickers("AAPL, AAPL").await.unwrap();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn any_invalid_entry_rejects_the_whole_batch() {
        let (gateway, store) = gateway();
        let err = gateway
            .submit_tickers("AAPL, not!!valid, 12")
            .await
            .unwrap_err();

        match err {
            SubmitError::InvalidSubjects(entries) => {
                assert_eq!(entries.len(), 2);
                assert!(entries[0].starts_with("not!!valid"));
            }
            other => panic!("expected InvalidSubjects, got {other:?}"),
        }
        assert!(store.list(20).await.is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let (gateway, _) = gateway();
        assert_eq!(
            gateway.submit_tickers("  , ").await.unwrap_err(),
            SubmitError::EmptyBatch
        );
    }

    #[tokio::test]
    async fn market_review_takes_the_same_path() {
        let (gateway, store) = gateway();
        let id = gateway.submit_market_review().await.unwrap();
        let snap = store.get(id).await.unwrap();
        assert_eq!(snap.subject, Subject::MarketReview);
        assert_eq!(snap.state, TaskState::Queued);
    }
}
