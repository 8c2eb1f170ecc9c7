use crate::{
    config::EngineConfig,
    error::{EngineError, PredictionError},
    features::{FeatureExtractor, PageDocument, FEATURE_COUNT},
    fetch::{FetchOutcome, HttpFetcher, PageFetcher},
    normalize::normalize,
    registry::ModelRegistry,
    types::*,
};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    time::Instant,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs one URL through fetch, extraction, normalization and prediction.
///
/// Every failure along the way ends up as a [`Verdict`]; `check` itself
/// never returns an error.
pub struct PhishingEngine<F = HttpFetcher> {
    fetcher: F,
    extractor: FeatureExtractor,
    registry: Arc<ModelRegistry>,
}

impl PhishingEngine<HttpFetcher> {
    pub async fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        info!("Initializing phishing engine...");

        let fetcher = HttpFetcher::from_config(config)?;
        let registry = Arc::new(ModelRegistry::open(&config.model_dir).await?);
        if config.preload_models {
            registry.preload().await?;
            info!("Preloaded {} models", ModelId::COUNT);
        }

        Ok(Self::new(fetcher, registry))
    }
}

impl<F: PageFetcher> PhishingEngine<F> {
    pub fn new(fetcher: F, registry: Arc<ModelRegistry>) -> Self {
        Self {
            fetcher,
            extractor: FeatureExtractor::new(),
            registry,
        }
    }

    pub async fn check(&self, url: &str, model: ModelId) -> CheckReport {
        let start_time = Instant::now();
        let check_id = Uuid::new_v4();
        let url = url.trim();
        info!(%check_id, "Checking {} with {}", url, model);

        let (verdict, feature_count) = self.run(url, model).await;

        let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        metrics::counter!("checks_total", "verdict" => verdict.tag()).increment(1);
        metrics::histogram!("check_duration_ms").record(elapsed_ms);
        info!(%check_id, verdict = verdict.tag(), "Check finished in {:.1}ms", elapsed_ms);

        CheckReport {
            check_id,
            url: url.to_string(),
            model,
            verdict,
            feature_count,
            elapsed_ms,
            checked_at: chrono::Utc::now(),
        }
    }

    async fn run(&self, url: &str, model: ModelId) -> (Verdict, Option<usize>) {
        if let Err(reason) = validate_url(url) {
            return (Verdict::InvalidInput(reason), None);
        }

        let body = match self.fetcher.fetch(url).await {
            FetchOutcome::Success(body) => body,
            FetchOutcome::NonSuccessStatus(status) => return (Verdict::NonSuccessHttp { status }, None),
            FetchOutcome::ConnectionFailure(reason) => return (Verdict::Unreachable(reason), None),
            FetchOutcome::Timeout => return (Verdict::Timeout, None),
            FetchOutcome::OtherFailure(reason) => return (Verdict::OtherError(reason), None),
        };

        let features = extract_guarded(&body, url, |doc| self.extractor.extract(doc));

        let classifier = match self.registry.resolve(model).await {
            Ok(classifier) => classifier,
            Err(e) => {
                warn!("Could not load {}: {}", model, e);
                return (Verdict::ModelLoadFailure(e.to_string()), None);
            }
        };

        let features = match classifier.expected_features() {
            Some(required) if required != features.len() => {
                debug!("Re-normalizing {} features to {} for {}", features.len(), required, model);
                normalize(features, required)
            }
            _ => features,
        };

        let prediction = catch_unwind(AssertUnwindSafe(|| classifier.predict(&features)))
            .unwrap_or_else(|_| Err(PredictionError::Degenerate("classifier panicked".to_string())));
        let verdict = match prediction {
            Ok(0) => Verdict::Legitimate,
            Ok(label) => {
                debug!("{} predicted label {}", model, label);
                Verdict::Phishing
            }
            Err(e) => {
                warn!("{} failed to predict: {}", model, e);
                Verdict::PredictionError(e.to_string())
            }
        };
        (verdict, Some(features.len()))
    }
}

/// Accepts only absolute `http://` / `https://` URLs. The scheme check is
/// case-insensitive; nothing else about the URL is validated here.
pub fn validate_url(url: &str) -> Result<(), String> {
    if url.is_empty() {
        return Err("empty URL".to_string());
    }
    let lowered = url.to_ascii_lowercase();
    if lowered.starts_with("http://") || lowered.starts_with("https://") {
        Ok(())
    } else {
        Err(format!("'{}' does not start with http:// or https://", url))
    }
}

/// Parse `body` and run `extract` on it, normalized to [`FEATURE_COUNT`].
/// A panicking extractor yields the all-zero vector instead.
///
/// The parsed document is not `Send`, so it lives and dies in here.
pub fn extract_guarded<E>(body: &[u8], url: &str, extract: E) -> Vec<f64>
where
    E: FnOnce(&PageDocument) -> Vec<f64>,
{
    let features = catch_unwind(AssertUnwindSafe(|| {
        let doc = PageDocument::parse(body, Some(url));
        extract(&doc)
    }))
    .unwrap_or_else(|_| {
        warn!("Feature extraction panicked for {}, using an all-zero vector", url);
        vec![0.0; FEATURE_COUNT]
    });
    normalize(features, FEATURE_COUNT)
}
