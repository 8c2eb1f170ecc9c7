use crate::{
    bayes::GaussianNbArtifact,
    error::{ModelLoadError, PredictionError},
    kernel_models::{KnnArtifact, SvmArtifact},
    neural::MlpArtifact,
    tree_models::{AdaBoostArtifact, ForestArtifact, TreeArtifact},
    types::ModelId,
};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// A pre-trained classifier. Instances are immutable once loaded and may be
/// shared between concurrent checks.
pub trait Classifier: Send + Sync {
    /// Predict the class label for a single feature vector.
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError>;

    /// Input width the model was fitted on, when it declares one.
    fn expected_features(&self) -> Option<usize>;

    fn kind(&self) -> ModelKind;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    KNeighbors,
    DecisionTree,
    RandomForest,
    GaussianNb,
    Svm,
    AdaBoost,
    Mlp,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::KNeighbors => "k_neighbors",
            ModelKind::DecisionTree => "decision_tree",
            ModelKind::RandomForest => "random_forest",
            ModelKind::GaussianNb => "gaussian_nb",
            ModelKind::Svm => "svm",
            ModelKind::AdaBoost => "ada_boost",
            ModelKind::Mlp => "mlp",
        }
    }

    /// Artifact format expected behind each selectable identifier.
    pub fn for_model(model: ModelId) -> Self {
        match model {
            ModelId::KNeighbours => ModelKind::KNeighbors,
            ModelId::RandomForest => ModelKind::RandomForest,
            ModelId::DecisionTree => ModelKind::DecisionTree,
            ModelId::GaussianNaiveBayes => ModelKind::GaussianNb,
            ModelId::SupportVectorMachine => ModelKind::Svm,
            ModelId::AdaBoost => ModelKind::AdaBoost,
            ModelId::NeuralNetwork => ModelKind::Mlp,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// On-disk classifier document, tagged by `kind`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind")]
pub enum ModelArtifact {
    #[serde(rename = "k_neighbors")]
    KNeighbors(KnnArtifact),
    #[serde(rename = "decision_tree")]
    DecisionTree(TreeArtifact),
    #[serde(rename = "random_forest")]
    RandomForest(ForestArtifact),
    #[serde(rename = "gaussian_nb")]
    GaussianNb(GaussianNbArtifact),
    #[serde(rename = "svm")]
    Svm(SvmArtifact),
    #[serde(rename = "ada_boost")]
    AdaBoost(AdaBoostArtifact),
    #[serde(rename = "mlp")]
    Mlp(MlpArtifact),
}

impl ModelArtifact {
    pub fn from_json(model: ModelId, bytes: &[u8]) -> Result<Self, ModelLoadError> {
        serde_json::from_slice(bytes).map_err(|source| ModelLoadError::Decode { model, source })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelArtifact::KNeighbors(_) => ModelKind::KNeighbors,
            ModelArtifact::DecisionTree(_) => ModelKind::DecisionTree,
            ModelArtifact::RandomForest(_) => ModelKind::RandomForest,
            ModelArtifact::GaussianNb(_) => ModelKind::GaussianNb,
            ModelArtifact::Svm(_) => ModelKind::Svm,
            ModelArtifact::AdaBoost(_) => ModelKind::AdaBoost,
            ModelArtifact::Mlp(_) => ModelKind::Mlp,
        }
    }

    /// Validate the artifact for `model` and turn it into a ready classifier.
    pub fn into_classifier(self, model: ModelId) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let expected = ModelKind::for_model(model);
        if self.kind() != expected {
            return Err(ModelLoadError::KindMismatch {
                model,
                expected: expected.as_str(),
                found: self.kind().as_str(),
            });
        }

        let classifier: Arc<dyn Classifier> = match self {
            ModelArtifact::KNeighbors(a) => Arc::new(a.build(model)?),
            ModelArtifact::DecisionTree(a) => Arc::new(a.build(model)?),
            ModelArtifact::RandomForest(a) => Arc::new(a.build(model)?),
            ModelArtifact::GaussianNb(a) => Arc::new(a.build(model)?),
            ModelArtifact::Svm(a) => Arc::new(a.build(model)?),
            ModelArtifact::AdaBoost(a) => Arc::new(a.build(model)?),
            ModelArtifact::Mlp(a) => Arc::new(a.build(model)?),
        };
        Ok(classifier)
    }
}

/// Reject vectors of the wrong width or holding NaN/inf.
pub(crate) fn check_input(features: &[f64], width: usize) -> Result<(), PredictionError> {
    if features.len() != width {
        return Err(PredictionError::DimensionMismatch {
            expected: width,
            actual: features.len(),
        });
    }
    if let Some(index) = features.iter().position(|v| !v.is_finite()) {
        return Err(PredictionError::NonFinite { index });
    }
    Ok(())
}

/// Index of the first maximum; ties resolve to the lowest index.
pub(crate) fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i)
}

/// Label at `index`, or a prediction error when the model's own output
/// points past its class list.
pub(crate) fn class_label(classes: &[i64], index: usize) -> Result<i64, PredictionError> {
    classes
        .get(index)
        .copied()
        .ok_or_else(|| PredictionError::Degenerate(format!("class index {} out of range", index)))
}

/// Checks shared by every adapter: a non-empty class list and, when given,
/// a positive declared width.
pub(crate) fn check_header(
    model: ModelId,
    classes: &[i64],
    n_features_in: Option<usize>,
) -> Result<(), ModelLoadError> {
    if classes.is_empty() {
        return Err(crate::error::malformed(model, "class list is empty"));
    }
    if n_features_in == Some(0) {
        return Err(crate::error::malformed(model, "n_features_in must be positive"));
    }
    Ok(())
}

/// Declared width must agree with the width the parameters imply.
pub(crate) fn resolve_width(
    model: ModelId,
    declared: Option<usize>,
    intrinsic: usize,
) -> Result<usize, ModelLoadError> {
    match declared {
        Some(width) if width != intrinsic => Err(crate::error::malformed(
            model,
            format!("declares {} features but parameters are {} wide", width, intrinsic),
        )),
        _ => Ok(intrinsic),
    }
}
