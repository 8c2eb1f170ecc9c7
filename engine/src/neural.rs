use crate::{
    error::{malformed, ModelLoadError, PredictionError},
    models::{argmax, check_header, check_input, class_label, resolve_width, Classifier, ModelKind},
    types::ModelId,
};
use nalgebra::{DMatrix, DVector};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Logistic,
    Tanh,
    #[default]
    Relu,
}

impl Activation {
    fn apply(&self, v: f64) -> f64 {
        match self {
            Activation::Identity => v,
            Activation::Logistic => logistic(v),
            Activation::Tanh => v.tanh(),
            Activation::Relu => v.max(0.0),
        }
    }
}

fn logistic(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

#[derive(Debug, Deserialize)]
pub struct LayerArtifact {
    /// `inputs × outputs`, one row per input unit.
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

#[derive(Debug, Deserialize)]
pub struct MlpArtifact {
    #[serde(default)]
    pub n_features_in: Option<usize>,
    pub classes: Vec<i64>,
    #[serde(default)]
    pub activation: Activation,
    pub layers: Vec<LayerArtifact>,
}

struct Layer {
    /// Stored transposed (`outputs × inputs`) so a forward step is `W·h + b`.
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

/// Feed-forward network. Hidden layers use the configured activation; a
/// single output unit is read as a logistic probability of `classes[1]`,
/// several outputs as one score per class.
pub struct MlpClassifier {
    classes: Vec<i64>,
    activation: Activation,
    layers: Vec<Layer>,
    width: usize,
}

impl MlpArtifact {
    pub fn build(self, model: ModelId) -> Result<MlpClassifier, ModelLoadError> {
        check_header(model, &self.classes, self.n_features_in)?;
        if self.layers.is_empty() {
            return Err(malformed(model, "network has no layers"));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut fan_in: Option<usize> = None;
        for (i, layer) in self.layers.into_iter().enumerate() {
            let inputs = layer.weights.len();
            let outputs = layer.weights.first().map(Vec::len).unwrap_or(0);
            if inputs == 0 || outputs == 0 || layer.weights.iter().any(|row| row.len() != outputs) {
                return Err(malformed(model, format!("layer {} weight matrix is ragged or empty", i)));
            }
            if layer.bias.len() != outputs {
                return Err(malformed(model, format!("layer {} bias does not match its outputs", i)));
            }
            if let Some(previous) = fan_in {
                if previous != inputs {
                    return Err(malformed(
                        model,
                        format!("layer {} takes {} inputs but previous layer emits {}", i, inputs, previous),
                    ));
                }
            }
            if layer.weights.iter().flatten().chain(&layer.bias).any(|v| !v.is_finite()) {
                return Err(malformed(model, format!("layer {} holds non-finite values", i)));
            }

            let rows = &layer.weights;
            layers.push(Layer {
                weights: DMatrix::from_fn(outputs, inputs, |o, n| rows[n][o]),
                bias: DVector::from_vec(layer.bias),
            });
            fan_in = Some(outputs);
        }

        let outputs = fan_in.unwrap_or(0);
        let n_classes = self.classes.len();
        if outputs == 1 && n_classes != 2 {
            return Err(malformed(
                model,
                format!("a single output unit needs exactly 2 classes, found {}", n_classes),
            ));
        }
        if outputs > 1 && outputs != n_classes {
            return Err(malformed(
                model,
                format!("output layer has {} units for {} classes", outputs, n_classes),
            ));
        }

        let width = resolve_width(model, self.n_features_in, layers[0].weights.ncols())?;
        Ok(MlpClassifier {
            classes: self.classes,
            activation: self.activation,
            layers,
            width,
        })
    }
}

impl MlpClassifier {
    /// Raw output-layer values before the final squashing.
    fn forward(&self, features: &[f64]) -> DVector<f64> {
        let mut h = DVector::from_column_slice(features);
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            h = &layer.weights * h + &layer.bias;
            if i < last {
                h.apply(|v| *v = self.activation.apply(*v));
            }
        }
        h
    }
}

impl Classifier for MlpClassifier {
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError> {
        check_input(features, self.width)?;
        let output = self.forward(features);
        if output.iter().any(|v| !v.is_finite()) {
            return Err(PredictionError::Degenerate("network output overflowed".to_string()));
        }

        let index = if output.len() == 1 {
            usize::from(logistic(output[0]) > 0.5)
        } else {
            argmax(output.as_slice()).ok_or_else(|| PredictionError::Degenerate("empty output".to_string()))?
        };
        class_label(&self.classes, index)
    }

    fn expected_features(&self) -> Option<usize> {
        Some(self.width)
    }

    fn kind(&self) -> ModelKind {
        ModelKind::Mlp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2 → 2 (relu) → 1: fires when x0 exceeds x1 by more than 1
    fn binary_net() -> MlpClassifier {
        MlpArtifact {
            n_features_in: Some(2),
            classes: vec![0, 1],
            activation: Activation::Relu,
            layers: vec![
                LayerArtifact {
                    weights: vec![vec![1.0, -1.0], vec![-1.0, 1.0]],
                    bias: vec![0.0, 0.0],
                },
                LayerArtifact {
                    weights: vec![vec![1.0], vec![-1.0]],
                    bias: vec![-1.0],
                },
            ],
        }
        .build(ModelId::NeuralNetwork)
        .unwrap()
    }

    #[test]
    fn binary_output_uses_logistic_threshold() {
        let net = binary_net();
        assert_eq!(net.predict(&[3.0, 0.0]), Ok(1));
        assert_eq!(net.predict(&[0.5, 0.0]), Ok(0));
        assert_eq!(net.predict(&[0.0, 3.0]), Ok(0));
        assert_eq!(net.expected_features(), Some(2));
    }

    #[test]
    fn softmax_style_output_takes_argmax() {
        let net = MlpArtifact {
            n_features_in: None,
            classes: vec![0, 1, 7],
            activation: Activation::Identity,
            layers: vec![LayerArtifact {
                weights: vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0]],
                bias: vec![0.0, 0.5, 0.0],
            }],
        }
        .build(ModelId::NeuralNetwork)
        .unwrap();
        assert_eq!(net.predict(&[0.0, 2.0]), Ok(7));
        assert_eq!(net.predict(&[0.0, 0.0]), Ok(1));
    }

    #[test]
    fn mismatched_layer_chain_is_rejected() {
        let err = MlpArtifact {
            n_features_in: None,
            classes: vec![0, 1],
            activation: Activation::Tanh,
            layers: vec![
                LayerArtifact { weights: vec![vec![1.0, 1.0]], bias: vec![0.0, 0.0] },
                LayerArtifact { weights: vec![vec![1.0]], bias: vec![0.0] },
            ],
        }
        .build(ModelId::NeuralNetwork)
        .err()
        .unwrap();
        assert!(matches!(err, ModelLoadError::Malformed { .. }));
    }

    #[test]
    fn single_output_requires_two_classes() {
        let err = MlpArtifact {
            n_features_in: None,
            classes: vec![5],
            activation: Activation::Relu,
            layers: vec![LayerArtifact { weights: vec![vec![1.0]], bias: vec![10.0] }],
        }
        .build(ModelId::NeuralNetwork)
        .err()
        .unwrap();
        assert!(matches!(err, ModelLoadError::Malformed { .. }));
    }

    #[test]
    fn wrong_width_is_a_prediction_error() {
        assert!(matches!(
            binary_net().predict(&[1.0; 45]),
            Err(PredictionError::DimensionMismatch { expected: 2, actual: 45 })
        ));
    }
}
