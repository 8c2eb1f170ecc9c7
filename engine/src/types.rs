use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Closed set of classifiers a caller can pick from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ModelId {
    #[default]
    KNeighbours,
    RandomForest,
    DecisionTree,
    GaussianNaiveBayes,
    SupportVectorMachine,
    AdaBoost,
    NeuralNetwork,
}

impl ModelId {
    pub const COUNT: usize = 7;

    pub const ALL: [ModelId; Self::COUNT] = [
        ModelId::KNeighbours,
        ModelId::RandomForest,
        ModelId::DecisionTree,
        ModelId::GaussianNaiveBayes,
        ModelId::SupportVectorMachine,
        ModelId::AdaBoost,
        ModelId::NeuralNetwork,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            ModelId::KNeighbours => "K-Neighbours",
            ModelId::RandomForest => "Random Forest",
            ModelId::DecisionTree => "Decision Tree",
            ModelId::GaussianNaiveBayes => "Gaussian Naive Bayes",
            ModelId::SupportVectorMachine => "Support Vector Machine",
            ModelId::AdaBoost => "AdaBoost",
            ModelId::NeuralNetwork => "Neural Network",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ModelId::KNeighbours => "k-neighbours",
            ModelId::RandomForest => "random-forest",
            ModelId::DecisionTree => "decision-tree",
            ModelId::GaussianNaiveBayes => "gaussian-naive-bayes",
            ModelId::SupportVectorMachine => "support-vector-machine",
            ModelId::AdaBoost => "ada-boost",
            ModelId::NeuralNetwork => "neural-network",
        }
    }

    /// File name of the serialized classifier inside the model directory.
    pub fn artifact_name(&self) -> &'static str {
        match self {
            ModelId::KNeighbours => "kn_model.json",
            ModelId::RandomForest => "rf_model.json",
            ModelId::DecisionTree => "dt_model.json",
            ModelId::GaussianNaiveBayes => "nb_model.json",
            ModelId::SupportVectorMachine => "svm_model.json",
            ModelId::AdaBoost => "ab_model.json",
            ModelId::NeuralNetwork => "nn_model.json",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ModelId::ALL
            .into_iter()
            .find(|id| {
                id.display_name().to_lowercase() == wanted
                    || id.slug() == wanted
                    || id.slug().replace('-', "") == wanted.replace(['-', ' ', '_'], "")
            })
            .ok_or_else(|| {
                let known: Vec<&str> = ModelId::ALL.iter().map(|id| id.slug()).collect();
                format!("unknown model '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

/// Outcome of a single URL check.
///
/// Only `Legitimate` and `Phishing` carry a label. The fetch-layer variants
/// (`NonSuccessHttp`, `Unreachable`, `Timeout`) are inconclusive and say
/// nothing about the site either way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum Verdict {
    Legitimate,
    Phishing,
    InvalidInput(String),
    NonSuccessHttp { status: u16 },
    Unreachable(String),
    Timeout,
    OtherError(String),
    ModelLoadFailure(String),
    PredictionError(String),
}

impl Verdict {
    pub fn is_label(&self) -> bool {
        matches!(self, Verdict::Legitimate | Verdict::Phishing)
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            Verdict::NonSuccessHttp { .. } | Verdict::Unreachable(_) | Verdict::Timeout
        )
    }

    /// Stable tag used for metrics labels and log fields.
    pub fn tag(&self) -> &'static str {
        match self {
            Verdict::Legitimate => "legitimate",
            Verdict::Phishing => "phishing",
            Verdict::InvalidInput(_) => "invalid_input",
            Verdict::NonSuccessHttp { .. } => "non_success_http",
            Verdict::Unreachable(_) => "unreachable",
            Verdict::Timeout => "timeout",
            Verdict::OtherError(_) => "other_error",
            Verdict::ModelLoadFailure(_) => "model_load_failure",
            Verdict::PredictionError(_) => "prediction_error",
        }
    }

    pub fn message(&self, url: &str) -> String {
        match self {
            Verdict::Legitimate => "This website seems LEGITIMATE!".to_string(),
            Verdict::Phishing => "Attention! This website is a potential PHISHING site!".to_string(),
            Verdict::InvalidInput(reason) => {
                format!("Please enter a valid URL starting with http:// or https:// ({})", reason)
            }
            Verdict::NonSuccessHttp { status } => format!(
                "HTTP connection was not successful for the URL: {} (status {})",
                url, status
            ),
            Verdict::Unreachable(_) => "Could not reach this website (domain unreachable, not registered, or does not exist).".to_string(),
            Verdict::Timeout => "Connection timed out when trying to reach the site.".to_string(),
            Verdict::OtherError(reason) => format!("Could not analyze the URL: {}", reason),
            Verdict::ModelLoadFailure(reason) => format!("Could not load the selected model: {}", reason),
            Verdict::PredictionError(reason) => format!("Prediction error: {}", reason),
        }
    }

    pub fn advice(&self) -> Option<&'static str> {
        match self {
            Verdict::Legitimate | Verdict::Phishing | Verdict::InvalidInput(_) => None,
            Verdict::NonSuccessHttp { .. } => Some(
                "The website is unreachable or offline. This does NOT mean it is phishing or legitimate. \
                 Many phishing sites go offline quickly, but some legitimate sites disappear too. Try another URL.",
            ),
            Verdict::Unreachable(_) => Some(
                "The website appears to be expired or offline. This does NOT mean it is phishing. \
                 Many phishing domains go offline, but some legitimate sites also expire.",
            ),
            Verdict::Timeout => Some("The site may be down or very slow. No label is assigned!"),
            Verdict::OtherError(_) => Some("Please check your internet connection or try a different URL."),
            Verdict::ModelLoadFailure(_) => Some(
                "The model artifact is missing or corrupt. Check the model directory of this installation.",
            ),
            Verdict::PredictionError(_) => Some(
                "There was an issue with the model prediction. Please try a different model or site.",
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub check_id: Uuid,
    pub url: String,
    pub model: ModelId,
    pub verdict: Verdict,
    /// Length of the vector handed to the classifier, when prediction ran.
    pub feature_count: Option<usize>,
    pub elapsed_ms: f64,
    pub checked_at: DateTime<Utc>,
}

impl CheckReport {
    pub fn message(&self) -> String {
        self.verdict.message(&self.url)
    }
}
