//! Statistical prediction enrichment.
//!
//! Predictions decorate an answer and are never required for one: every
//! failure, including a timeout, resolves to `None` and the professor is left
//! out of the [`PredictionSet`].

use crate::runtime::{ScriptError, ScriptOutput, ScriptRunner};
use crate::types::{PredictionResult, PredictionSet, RetrievedReview};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Subject used when none of a professor's reviews names one.
pub const DEFAULT_SUBJECT: &str = "General";

/// Review list sent when a professor has no review text.
pub const NO_REVIEWS_SENTINEL: &str = "No specific reviews available";

/// Payload handed to the prediction model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub professor: String,
    pub subject: String,
    pub reviews: Vec<String>,
}

impl PredictionRequest {
    /// Build a request, substituting defaults for an empty subject or review list.
    pub fn new(
        professor: impl Into<String>,
        subject: impl Into<String>,
        reviews: Vec<String>,
    ) -> Self {
        let subject = subject.into();
        Self {
            professor: professor.into(),
            subject: if subject.trim().is_empty() {
                DEFAULT_SUBJECT.to_string()
            } else {
                subject
            },
            reviews: if reviews.is_empty() {
                vec![NO_REVIEWS_SENTINEL.to_string()]
            } else {
                reviews
            },
        }
    }
}

/// A model that turns a professor's reviews into a [`PredictionResult`].
#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(
        &self,
        request: &PredictionRequest,
        timeout: Duration,
    ) -> Result<PredictionResult, ScriptError>;
}

/// Predictor backed by the external prediction script.
#[derive(Debug, Clone)]
pub struct SubprocessPredictor {
    runner: ScriptRunner,
}

impl SubprocessPredictor {
    pub fn new(runner: ScriptRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Predictor for SubprocessPredictor {
    async fn predict(
        &self,
        request: &PredictionRequest,
        timeout: Duration,
    ) -> Result<PredictionResult, ScriptError> {
        self.runner.run_json(request, timeout).await
    }
}

/// Per-request enrichment over a [`Predictor`] with a per-professor deadline.
#[derive(Clone)]
pub struct PredictionEnricher {
    predictor: Arc<dyn Predictor>,
    timeout: Duration,
}

impl PredictionEnricher {
    pub fn new(predictor: Arc<dyn Predictor>, timeout: Duration) -> Self {
        Self { predictor, timeout }
    }

    /// Predict for one professor. Resolves within the deadline; failures are `None`.
    pub async fn enrich(
        &self,
        professor: &str,
        subject: &str,
        review_texts: Vec<String>,
    ) -> Option<PredictionResult> {
        let request = PredictionRequest::new(professor, subject, review_texts);
        let call = self.predictor.predict(&request, self.timeout);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(prediction)) => {
                debug!(professor, confidence = prediction.confidence, "Prediction received");
                Some(prediction)
            }
            Ok(Err(e)) => {
                warn!(professor, error = %e, "Prediction failed, skipping");
                None
            }
            Err(_) => {
                warn!(
                    professor,
                    timeout_secs = self.timeout.as_secs(),
                    "Prediction timed out, skipping"
                );
                None
            }
        }
    }

    /// Enrich each mentioned professor in turn from their retrieved reviews.
    pub async fn enrich_all(
        &self,
        professors: &[String],
        reviews: &[RetrievedReview],
    ) -> PredictionSet {
        let mut predictions = PredictionSet::new();
        for name in professors {
            let own: Vec<&RetrievedReview> =
                reviews.iter().filter(|r| r.professor() == name).collect();
            let subject = own
                .first()
                .map(|r| r.record.subject.as_str())
                .unwrap_or(DEFAULT_SUBJECT);
            let texts = own.iter().map(|r| r.record.review.clone()).collect();
            if let Some(prediction) = self.enrich(name, subject, texts).await {
                predictions.insert(name.clone(), prediction);
            }
        }
        info!(
            requested = professors.len(),
            enriched = predictions.len(),
            "Prediction enrichment complete"
        );
        predictions
    }
}

/// Runs the model training script.
#[derive(Debug, Clone)]
pub struct ModelTrainer {
    runner: ScriptRunner,
    timeout: Duration,
}

impl ModelTrainer {
    pub fn new(runner: ScriptRunner, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn train(&self) -> Result<ScriptOutput, ScriptError> {
        info!(script = %self.runner.script().display(), "Starting model training");
        let output = self.runner.run_plain(self.timeout).await?;
        info!("Model training finished");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReviewRecord;
    use std::sync::Mutex;
    use std::time::Instant;

    fn sample_prediction() -> PredictionResult {
        PredictionResult {
            avg_rating: 4.2,
            avg_difficulty: 2.9,
            confidence: 0.81,
            rating_consistency: 0.4,
            insights: vec!["Engaging lecturer".into()],
            individual_predictions: None,
        }
    }

    /// Records every request and answers with a fixed prediction.
    #[derive(Default)]
    struct RecordingPredictor {
        seen: Mutex<Vec<PredictionRequest>>,
    }

    #[async_trait]
    impl Predictor for RecordingPredictor {
        async fn predict(
            &self,
            request: &PredictionRequest,
            _timeout: Duration,
        ) -> Result<PredictionResult, ScriptError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(sample_prediction())
        }
    }

    /// Never answers.
    struct HangingPredictor;

    #[async_trait]
    impl Predictor for HangingPredictor {
        async fn predict(
            &self,
            _request: &PredictionRequest,
            _timeout: Duration,
        ) -> Result<PredictionResult, ScriptError> {
            std::future::pending().await
        }
    }

    struct FailingPredictor;

    #[async_trait]
    impl Predictor for FailingPredictor {
        async fn predict(
            &self,
            _request: &PredictionRequest,
            _timeout: Duration,
        ) -> Result<PredictionResult, ScriptError> {
            Err(ScriptError::Exited {
                code: Some(1),
                stderr: "Traceback".into(),
            })
        }
    }

    #[test]
    fn test_request_defaults() {
        let req = PredictionRequest::new("Dr. X", "", vec![]);
        assert_eq!(req.subject, "General");
        assert_eq!(req.reviews, vec!["No specific reviews available".to_string()]);
    }

    #[tokio::test]
    async fn test_enrich_times_out_within_budget() {
        let enricher =
            PredictionEnricher::new(Arc::new(HangingPredictor), Duration::from_millis(150));
        let start = Instant::now();
        let result = enricher.enrich("Dr. X", "Math", vec!["ok".into()]).await;
        assert!(result.is_none());
        assert!(start.elapsed() < Duration::from_millis(150) + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_enrich_failure_is_none() {
        let enricher = PredictionEnricher::new(Arc::new(FailingPredictor), Duration::from_secs(1));
        assert!(enricher.enrich("Dr. X", "Math", vec![]).await.is_none());
    }

    #[tokio::test]
    async fn test_enrich_all_uses_only_each_professors_reviews() {
        let predictor = Arc::new(RecordingPredictor::default());
        let enricher = PredictionEnricher::new(predictor.clone(), Duration::from_secs(1));
        let reviews = RetrievedReview::ranked(vec![
            ReviewRecord::new("A. Smith", "Algorithms", 5.0, "Great explanations"),
            ReviewRecord::new("B. Jones", "", 2.0, "Hard exams"),
            ReviewRecord::new("A. Smith", "Data Structures", 4.0, "Fair"),
        ]);
        let names = vec!["A. Smith".to_string(), "B. Jones".to_string()];
        let set = enricher.enrich_all(&names, &reviews).await;

        assert_eq!(set.len(), 2);
        let seen = predictor.seen.lock().unwrap();
        assert_eq!(seen[0].subject, "Algorithms");
        assert_eq!(seen[0].reviews, vec!["Great explanations", "Fair"]);
        assert_eq!(seen[1].subject, "General");
        assert_eq!(seen[1].reviews, vec!["Hard exams"]);
    }

    #[tokio::test]
    async fn test_enrich_all_drops_failures() {
        let enricher = PredictionEnricher::new(Arc::new(FailingPredictor), Duration::from_secs(1));
        let reviews = RetrievedReview::ranked(vec![ReviewRecord::new("P", "S", 3.0, "R")]);
        let set = enricher.enrich_all(&["P".to_string()], &reviews).await;
        assert!(set.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_subprocess_predictor_decodes_script_output() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("predict.sh");
        std::fs::write(
            &script,
            "cat >/dev/null\nprintf '%s' '{\"avg_rating\":3.5,\"avg_difficulty\":4.0,\"confidence\":0.6,\"rating_consistency\":0.2,\"insights\":[\"Tough grader\"]}'\n",
        )
        .unwrap();
        let predictor = SubprocessPredictor::new(ScriptRunner::new("sh", script, dir.path()));
        let request = PredictionRequest::new("Dr. Y", "Chem", vec!["Hard".into()]);
        let p = predictor.predict(&request, Duration::from_secs(5)).await.unwrap();
        assert_eq!(p.avg_rating, 3.5);
        assert_eq!(p.insights, vec!["Tough grader".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trainer_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("train.sh");
        std::fs::write(&script, "echo trained 12 samples\n").unwrap();
        let trainer = ModelTrainer::new(
            ScriptRunner::new("sh", script, dir.path()),
            Duration::from_secs(5),
        );
        let out = trainer.train().await.unwrap();
        assert_eq!(out.stdout.trim(), "trained 12 samples");
    }
}
