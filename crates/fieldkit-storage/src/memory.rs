//! In-memory local store
//!
//! Backed by `DashMap`s keyed by survey id so every operation is atomic per
//! entry. Used directly in tests and as the cache behind the persistent store.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use fieldkit_core::{LocalStore, LocationOfInterest, StorageError, Submission, Survey};

/// `(survey_id, entity_id)`
type ScopedKey = (String, String);

fn key(survey_id: &str, id: &str) -> ScopedKey {
    (survey_id.to_string(), id.to_string())
}

/// In-memory implementation of [`LocalStore`]
#[derive(Debug, Default)]
pub struct InMemoryLocalStore {
    surveys: DashMap<String, Survey>,
    lois: DashMap<ScopedKey, LocationOfInterest>,
    submissions: DashMap<ScopedKey, Submission>,
}

impl InMemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn survey_count(&self) -> usize {
        self.surveys.len()
    }

    pub fn loi_count(&self) -> usize {
        self.lois.len()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.len()
    }

    pub(crate) fn put_survey_sync(&self, survey: Survey) {
        trace!(survey_id = %survey.id, "Storing survey");
        self.surveys.insert(survey.id.clone(), survey);
    }

    /// Remove a survey with everything collected under it
    pub(crate) fn delete_survey_sync(&self, survey_id: &str) {
        self.surveys.remove(survey_id);
        let lois_before = self.lois.len();
        self.lois.retain(|(sid, _), _| sid != survey_id);
        let submissions_before = self.submissions.len();
        self.submissions.retain(|(sid, _), _| sid != survey_id);
        debug!(
            survey_id,
            lois = lois_before - self.lois.len(),
            submissions = submissions_before - self.submissions.len(),
            "Deleted survey"
        );
    }

    pub(crate) fn put_loi_sync(&self, loi: LocationOfInterest) {
        trace!(survey_id = %loi.survey_id, loi_id = %loi.id, "Storing LOI");
        self.lois.insert(key(&loi.survey_id, &loi.id), loi);
    }

    /// Removes the LOI and its submissions
    pub(crate) fn delete_loi_sync(&self, survey_id: &str, loi_id: &str) {
        self.lois.remove(&key(survey_id, loi_id));
        self.submissions
            .retain(|(sid, _), s| !(sid == survey_id && s.loi_id == loi_id));
    }

    pub(crate) fn put_submission_sync(&self, submission: Submission) {
        trace!(
            survey_id = %submission.survey_id,
            submission_id = %submission.id,
            "Storing submission"
        );
        self.submissions
            .insert(key(&submission.survey_id, &submission.id), submission);
    }

    pub(crate) fn delete_submission_sync(&self, survey_id: &str, submission_id: &str) {
        self.submissions.remove(&key(survey_id, submission_id));
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn get_survey(&self, survey_id: &str) -> Result<Option<Survey>, StorageError> {
        Ok(self.surveys.get(survey_id).map(|s| s.clone()))
    }

    async fn put_survey(&self, survey: Survey) -> Result<(), StorageError> {
        self.put_survey_sync(survey);
        Ok(())
    }

    async fn delete_survey(&self, survey_id: &str) -> Result<(), StorageError> {
        self.delete_survey_sync(survey_id);
        Ok(())
    }

    async fn surveys(&self) -> Result<Vec<Survey>, StorageError> {
        let mut surveys: Vec<Survey> = self.surveys.iter().map(|s| s.value().clone()).collect();
        surveys.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(surveys)
    }

    async fn get_offline_loi(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Option<LocationOfInterest>, StorageError> {
        Ok(self.lois.get(&key(survey_id, loi_id)).map(|l| l.clone()))
    }

    async fn put_loi(&self, loi: LocationOfInterest) -> Result<(), StorageError> {
        self.put_loi_sync(loi);
        Ok(())
    }

    async fn delete_loi(&self, survey_id: &str, loi_id: &str) -> Result<(), StorageError> {
        self.delete_loi_sync(survey_id, loi_id);
        Ok(())
    }

    async fn lois(&self, survey_id: &str) -> Result<Vec<LocationOfInterest>, StorageError> {
        let mut lois: Vec<LocationOfInterest> = self
            .lois
            .iter()
            .filter(|entry| entry.key().0 == survey_id)
            .map(|entry| entry.value().clone())
            .collect();
        lois.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(lois)
    }

    async fn get_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
    ) -> Result<Option<Submission>, StorageError> {
        Ok(self
            .submissions
            .get(&key(survey_id, submission_id))
            .map(|s| s.clone()))
    }

    async fn put_submission(&self, submission: Submission) -> Result<(), StorageError> {
        self.put_submission_sync(submission);
        Ok(())
    }

    async fn delete_submission(
        &self,
        survey_id: &str,
        submission_id: &str,
    ) -> Result<(), StorageError> {
        self.delete_submission_sync(survey_id, submission_id);
        Ok(())
    }

    async fn submissions(
        &self,
        survey_id: &str,
        loi_id: &str,
    ) -> Result<Vec<Submission>, StorageError> {
        let mut submissions: Vec<Submission> = self
            .submissions
            .iter()
            .filter(|entry| entry.key().0 == survey_id && entry.value().loi_id == loi_id)
            .map(|entry| entry.value().clone())
            .collect();
        submissions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(submissions)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fieldkit_core::{AuditInfo, Geometry, Point, SubmissionData};

    pub(crate) fn make_loi(survey_id: &str, id: &str) -> LocationOfInterest {
        LocationOfInterest {
            id: id.to_string(),
            survey_id: survey_id.to_string(),
            job_id: "job-1".to_string(),
            geometry: Geometry::Point(Point::new(1.0, 2.0)),
            custom_id: None,
            caption: None,
            created: AuditInfo::fallback(),
            last_modified: AuditInfo::fallback(),
        }
    }

    pub(crate) fn make_submission(survey_id: &str, loi_id: &str, id: &str) -> Submission {
        Submission {
            id: id.to_string(),
            survey_id: survey_id.to_string(),
            loi_id: loi_id.to_string(),
            job_id: "job-1".to_string(),
            created: AuditInfo::fallback(),
            last_modified: AuditInfo::fallback(),
            data: SubmissionData::new(),
        }
    }

    #[tokio::test]
    async fn test_survey_put_get() {
        let store = InMemoryLocalStore::new();
        store.put_survey(Survey::new("s1", "One")).await.unwrap();
        store.put_survey(Survey::new("s1", "One, renamed")).await.unwrap();

        let survey = store.get_survey("s1").await.unwrap().unwrap();
        assert_eq!(survey.title, "One, renamed");
        assert_eq!(store.survey_count(), 1);
        assert!(store.get_survey("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lois_scoped_by_survey() {
        let store = InMemoryLocalStore::new();
        store.put_loi(make_loi("s1", "a")).await.unwrap();
        store.put_loi(make_loi("s2", "a")).await.unwrap();

        assert_eq!(store.lois("s1").await.unwrap().len(), 1);
        assert!(store.get_offline_loi("s2", "a").await.unwrap().is_some());
        assert!(store.get_offline_loi("s3", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_survey_cascades() {
        let store = InMemoryLocalStore::new();
        store.put_survey(Survey::new("s1", "One")).await.unwrap();
        store.put_survey(Survey::new("s2", "Two")).await.unwrap();
        store.put_loi(make_loi("s1", "l1")).await.unwrap();
        store.put_loi(make_loi("s2", "l2")).await.unwrap();
        store
            .put_submission(make_submission("s1", "l1", "sub1"))
            .await
            .unwrap();

        store.delete_survey("s1").await.unwrap();

        assert!(store.get_survey("s1").await.unwrap().is_none());
        assert_eq!(store.loi_count(), 1);
        assert_eq!(store.submission_count(), 0);
        assert!(store.get_survey("s2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_loi_removes_its_submissions() {
        let store = InMemoryLocalStore::new();
        store.put_loi(make_loi("s1", "l1")).await.unwrap();
        store.put_submission(make_submission("s1", "l1", "a")).await.unwrap();
        store.put_submission(make_submission("s1", "l2", "b")).await.unwrap();

        store.delete_loi("s1", "l1").await.unwrap();

        assert!(store.submissions("s1", "l1").await.unwrap().is_empty());
        assert_eq!(store.submissions("s1", "l2").await.unwrap().len(), 1);
    }
}
