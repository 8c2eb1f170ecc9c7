use crate::{
    error::{malformed, ModelLoadError, PredictionError},
    models::{argmax, check_header, check_input, class_label, resolve_width, Classifier, ModelKind},
    types::ModelId,
};
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

/// Row-major rows into a matrix, checking they are all `width` wide.
fn rows_to_matrix(
    model: ModelId,
    rows: &[Vec<f64>],
    what: &str,
) -> Result<DMatrix<f64>, ModelLoadError> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    if rows.is_empty() || width == 0 {
        return Err(malformed(model, format!("{} are empty", what)));
    }
    if rows.iter().any(|row| row.len() != width) {
        return Err(malformed(model, format!("{} differ in width", what)));
    }
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(malformed(model, format!("{} hold non-finite values", what)));
    }
    Ok(DMatrix::from_fn(rows.len(), width, |r, c| rows[r][c]))
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NeighbourWeights {
    #[default]
    Uniform,
    Distance,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
}

#[derive(Debug, Deserialize)]
pub struct KnnArtifact {
    #[serde(default)]
    pub n_features_in: Option<usize>,
    pub classes: Vec<i64>,
    pub n_neighbors: usize,
    #[serde(default)]
    pub weights: NeighbourWeights,
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Training samples, one row per sample.
    pub fit_x: Vec<Vec<f64>>,
    /// Class index (into `classes`) of each training sample.
    pub fit_y: Vec<usize>,
}

pub struct KNeighborsClassifier {
    classes: Vec<i64>,
    k: usize,
    weights: NeighbourWeights,
    metric: DistanceMetric,
    samples: DMatrix<f64>,
    targets: Vec<usize>,
}

impl KnnArtifact {
    pub fn build(self, model: ModelId) -> Result<KNeighborsClassifier, ModelLoadError> {
        check_header(model, &self.classes, self.n_features_in)?;
        let samples = rows_to_matrix(model, &self.fit_x, "training samples")?;
        resolve_width(model, self.n_features_in, samples.ncols())?;

        if self.fit_y.len() != samples.nrows() {
            return Err(malformed(model, "sample and target counts differ"));
        }
        if self.fit_y.iter().any(|&y| y >= self.classes.len()) {
            return Err(malformed(model, "target refers to an unknown class"));
        }
        if self.n_neighbors == 0 || self.n_neighbors > samples.nrows() {
            return Err(malformed(
                model,
                format!("n_neighbors {} outside 1..={}", self.n_neighbors, samples.nrows()),
            ));
        }

        Ok(KNeighborsClassifier {
            classes: self.classes,
            k: self.n_neighbors,
            weights: self.weights,
            metric: self.metric,
            samples,
            targets: self.fit_y,
        })
    }
}

impl KNeighborsClassifier {
    fn distance(&self, row: usize, x: &DVector<f64>) -> f64 {
        let diff = self.samples.row(row).transpose() - x;
        match self.metric {
            DistanceMetric::Euclidean => diff.norm(),
            DistanceMetric::Manhattan => diff.abs().sum(),
        }
    }
}

impl Classifier for KNeighborsClassifier {
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError> {
        check_input(features, self.samples.ncols())?;
        let x = DVector::from_column_slice(features);

        let mut ranked: Vec<(f64, usize)> = (0..self.samples.nrows())
            .map(|row| (self.distance(row, &x), self.targets[row]))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        let nearest = &ranked[..self.k];

        let mut votes = vec![0.0; self.classes.len()];
        let exact: Vec<usize> = nearest.iter().filter(|(d, _)| *d == 0.0).map(|(_, y)| *y).collect();
        match self.weights {
            // exact matches take all the weight under inverse-distance voting
            NeighbourWeights::Distance if !exact.is_empty() => {
                for y in exact {
                    votes[y] += 1.0;
                }
            }
            NeighbourWeights::Distance => {
                for (d, y) in nearest {
                    votes[*y] += 1.0 / d;
                }
            }
            NeighbourWeights::Uniform => {
                for (_, y) in nearest {
                    votes[*y] += 1.0;
                }
            }
        }

        let index = argmax(&votes).ok_or_else(|| PredictionError::Degenerate("no neighbours".to_string()))?;
        class_label(&self.classes, index)
    }

    fn expected_features(&self) -> Option<usize> {
        Some(self.samples.ncols())
    }

    fn kind(&self) -> ModelKind {
        ModelKind::KNeighbors
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Poly { gamma: f64, coef0: f64, degree: i32 },
    Sigmoid { gamma: f64, coef0: f64 },
}

#[derive(Debug, Deserialize)]
pub struct SvmArtifact {
    #[serde(default)]
    pub n_features_in: Option<usize>,
    /// Exactly two labels: negative side first, positive side second.
    pub classes: Vec<i64>,
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f64>>,
    /// Signed dual coefficients, one per support vector.
    pub dual_coef: Vec<f64>,
    pub intercept: f64,
}

/// Binary kernel SVM evaluated from its support vectors.
pub struct SvmClassifier {
    classes: [i64; 2],
    kernel: Kernel,
    support_vectors: DMatrix<f64>,
    sv_sq_norms: DVector<f64>,
    dual_coef: DVector<f64>,
    intercept: f64,
}

impl SvmArtifact {
    pub fn build(self, model: ModelId) -> Result<SvmClassifier, ModelLoadError> {
        check_header(model, &self.classes, self.n_features_in)?;
        let classes: [i64; 2] = self
            .classes
            .as_slice()
            .try_into()
            .map_err(|_| malformed(model, "only binary SVMs are supported"))?;
        let support_vectors = rows_to_matrix(model, &self.support_vectors, "support vectors")?;
        resolve_width(model, self.n_features_in, support_vectors.ncols())?;

        if self.dual_coef.len() != support_vectors.nrows() {
            return Err(malformed(model, "dual coefficient count differs from support vectors"));
        }
        if !self.intercept.is_finite() || self.dual_coef.iter().any(|c| !c.is_finite()) {
            return Err(malformed(model, "coefficients must be finite"));
        }
        match self.kernel {
            Kernel::Linear => {}
            Kernel::Rbf { gamma } | Kernel::Poly { gamma, .. } | Kernel::Sigmoid { gamma, .. } => {
                if !(gamma.is_finite() && gamma > 0.0) {
                    return Err(malformed(model, "kernel gamma must be positive"));
                }
            }
        }

        let sv_sq_norms = DVector::from_iterator(
            support_vectors.nrows(),
            support_vectors.row_iter().map(|row| row.norm_squared()),
        );

        Ok(SvmClassifier {
            classes,
            kernel: self.kernel,
            support_vectors,
            sv_sq_norms,
            dual_coef: DVector::from_vec(self.dual_coef),
            intercept: self.intercept,
        })
    }
}

impl SvmClassifier {
    pub fn decision_function(&self, x: &DVector<f64>) -> f64 {
        let dots = &self.support_vectors * x;
        let kernel_values = match self.kernel {
            Kernel::Linear => dots,
            Kernel::Rbf { gamma } => {
                let x_sq = x.norm_squared();
                DVector::from_iterator(
                    dots.len(),
                    dots.iter()
                        .zip(self.sv_sq_norms.iter())
                        .map(|(dot, sv_sq)| (-gamma * (sv_sq - 2.0 * dot + x_sq).max(0.0)).exp()),
                )
            }
            Kernel::Poly { gamma, coef0, degree } => dots.map(|dot| (gamma * dot + coef0).powi(degree)),
            Kernel::Sigmoid { gamma, coef0 } => dots.map(|dot| (gamma * dot + coef0).tanh()),
        };
        self.dual_coef.dot(&kernel_values) + self.intercept
    }
}

impl Classifier for SvmClassifier {
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError> {
        check_input(features, self.support_vectors.ncols())?;
        let decision = self.decision_function(&DVector::from_column_slice(features));
        if !decision.is_finite() {
            return Err(PredictionError::Degenerate("decision value overflowed".to_string()));
        }
        Ok(if decision > 0.0 { self.classes[1] } else { self.classes[0] })
    }

    fn expected_features(&self) -> Option<usize> {
        Some(self.support_vectors.ncols())
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Svm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knn(k: usize, weights: NeighbourWeights) -> KNeighborsClassifier {
        KnnArtifact {
            n_features_in: Some(2),
            classes: vec![0, 1],
            n_neighbors: k,
            weights,
            metric: DistanceMetric::Euclidean,
            fit_x: vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![10.0, 10.0],
                vec![10.0, 11.0],
            ],
            fit_y: vec![0, 0, 0, 1, 1],
        }
        .build(ModelId::KNeighbours)
        .unwrap()
    }

    #[test]
    fn knn_majority_vote() {
        let model = knn(3, NeighbourWeights::Uniform);
        assert_eq!(model.predict(&[0.2, 0.2]), Ok(0));
        assert_eq!(model.predict(&[9.0, 9.0]), Ok(1));
        assert_eq!(model.expected_features(), Some(2));
    }

    #[test]
    fn knn_distance_weighting_favours_close_points() {
        // uniform k=5 → three zeros outvote; distance-weighted → the two close ones win
        assert_eq!(knn(5, NeighbourWeights::Uniform).predict(&[9.5, 10.5]), Ok(0));
        assert_eq!(knn(5, NeighbourWeights::Distance).predict(&[9.5, 10.5]), Ok(1));
        assert_eq!(knn(5, NeighbourWeights::Distance).predict(&[10.0, 10.0]), Ok(1));
    }

    #[test]
    fn knn_rejects_wrong_width() {
        assert!(matches!(
            knn(1, NeighbourWeights::Uniform).predict(&[1.0, 2.0, 3.0]),
            Err(PredictionError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn knn_declared_width_must_match_samples() {
        let err = KnnArtifact {
            n_features_in: Some(45),
            classes: vec![0, 1],
            n_neighbors: 1,
            weights: NeighbourWeights::Uniform,
            metric: DistanceMetric::Manhattan,
            fit_x: vec![vec![0.0, 1.0]],
            fit_y: vec![0],
        }
        .build(ModelId::KNeighbours)
        .err()
        .unwrap();
        assert!(matches!(err, ModelLoadError::Malformed { .. }));
    }

    fn svm(kernel: Kernel) -> SvmClassifier {
        SvmArtifact {
            n_features_in: None,
            classes: vec![0, 1],
            kernel,
            support_vectors: vec![vec![1.0, 1.0], vec![-1.0, -1.0]],
            dual_coef: vec![1.0, -1.0],
            intercept: 0.0,
        }
        .build(ModelId::SupportVectorMachine)
        .unwrap()
    }

    #[test]
    fn linear_svm_sign_picks_class() {
        let model = svm(Kernel::Linear);
        assert_eq!(model.predict(&[2.0, 2.0]), Ok(1));
        assert_eq!(model.predict(&[-2.0, -1.0]), Ok(0));
        // on the boundary the negative class wins
        assert_eq!(model.predict(&[0.0, 0.0]), Ok(0));
    }

    #[test]
    fn rbf_svm_matches_closed_form() {
        let model = svm(Kernel::Rbf { gamma: 0.5 });
        let x = DVector::from_vec(vec![1.0, 0.0]);
        let expected = (-0.5f64 * 1.0).exp() - (-0.5f64 * 5.0).exp();
        assert!((model.decision_function(&x) - expected).abs() < 1e-12);
        assert_eq!(model.predict(&[1.0, 0.0]), Ok(1));
    }

    #[test]
    fn svm_must_be_binary() {
        let err = SvmArtifact {
            n_features_in: None,
            classes: vec![0, 1, 2],
            kernel: Kernel::Linear,
            support_vectors: vec![vec![1.0]],
            dual_coef: vec![1.0],
            intercept: 0.0,
        }
        .build(ModelId::SupportVectorMachine)
        .err()
        .unwrap();
        assert!(matches!(err, ModelLoadError::Malformed { .. }));
    }

    #[test]
    fn svm_kernel_deserializes_from_tagged_json() {
        let kernel: Kernel = serde_json::from_str(r#"{"type":"rbf","gamma":0.1}"#).unwrap();
        assert_eq!(kernel, Kernel::Rbf { gamma: 0.1 });
    }
}
