use crate::{
    error::{malformed, ModelLoadError, PredictionError},
    models::{argmax, check_header, check_input, class_label, resolve_width, Classifier, ModelKind},
    types::ModelId,
};
use serde::Deserialize;
use std::f64::consts::PI;

#[derive(Debug, Deserialize)]
pub struct GaussianNbArtifact {
    #[serde(default)]
    pub n_features_in: Option<usize>,
    pub classes: Vec<i64>,
    pub class_prior: Vec<f64>,
    /// Per-class feature means.
    pub theta: Vec<Vec<f64>>,
    /// Per-class feature variances, smoothing already applied.
    pub var: Vec<Vec<f64>>,
}

pub struct GaussianNbClassifier {
    classes: Vec<i64>,
    log_prior: Vec<f64>,
    theta: Vec<Vec<f64>>,
    var: Vec<Vec<f64>>,
    /// -0.5 * sum(ln(2πσ²)) per class, independent of the input.
    log_norm: Vec<f64>,
    width: usize,
}

impl GaussianNbArtifact {
    pub fn build(self, model: ModelId) -> Result<GaussianNbClassifier, ModelLoadError> {
        check_header(model, &self.classes, self.n_features_in)?;
        let n_classes = self.classes.len();
        if self.class_prior.len() != n_classes || self.theta.len() != n_classes || self.var.len() != n_classes {
            return Err(malformed(model, "per-class arrays differ from the class count"));
        }

        let width = self.theta[0].len();
        if width == 0 || self.theta.iter().chain(&self.var).any(|row| row.len() != width) {
            return Err(malformed(model, "mean and variance rows differ in width"));
        }
        let width = resolve_width(model, self.n_features_in, width)?;

        if self.var.iter().flatten().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(malformed(model, "variances must be positive"));
        }
        if self.theta.iter().flatten().any(|m| !m.is_finite()) {
            return Err(malformed(model, "means must be finite"));
        }
        if self.class_prior.iter().any(|p| !(p.is_finite() && *p >= 0.0)) {
            return Err(malformed(model, "class priors must be non-negative"));
        }

        let log_prior = self.class_prior.iter().map(|p| p.ln()).collect();
        let log_norm = self
            .var
            .iter()
            .map(|row| -0.5 * row.iter().map(|v| (2.0 * PI * v).ln()).sum::<f64>())
            .collect();

        Ok(GaussianNbClassifier {
            classes: self.classes,
            log_prior,
            theta: self.theta,
            var: self.var,
            log_norm,
            width,
        })
    }
}

impl GaussianNbClassifier {
    /// Joint log-likelihood of `features` under each class.
    pub fn joint_log_likelihood(&self, features: &[f64]) -> Vec<f64> {
        (0..self.classes.len())
            .map(|c| {
                let spread: f64 = features
                    .iter()
                    .zip(&self.theta[c])
                    .zip(&self.var[c])
                    .map(|((x, mean), var)| (x - mean).powi(2) / var)
                    .sum();
                self.log_prior[c] + self.log_norm[c] - 0.5 * spread
            })
            .collect()
    }
}

impl Classifier for GaussianNbClassifier {
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError> {
        check_input(features, self.width)?;
        let jll = self.joint_log_likelihood(features);
        // a zero prior gives -inf, which argmax simply never picks
        let index = argmax(&jll)
            .filter(|&i| jll[i] > f64::NEG_INFINITY)
            .ok_or_else(|| PredictionError::Degenerate("every class has zero likelihood".to_string()))?;
        class_label(&self.classes, index)
    }

    fn expected_features(&self) -> Option<usize> {
        Some(self.width)
    }

    fn kind(&self) -> ModelKind {
        ModelKind::GaussianNb
    }
}
