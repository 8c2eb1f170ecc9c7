use crate::{
    error::{malformed, ModelLoadError, PredictionError},
    models::{argmax, check_header, check_input, class_label, Classifier, ModelKind},
    types::ModelId,
};
use serde::Deserialize;

const LEAF: i64 = -1;

/// Flattened binary tree in the usual parallel-array layout: node `i`
/// splits on `feature[i] <= threshold[i]`, leaves have `children_left[i] ==
/// -1` and carry per-class weights in `value[i]`.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeNodes {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: TreeNodes,
    /// Highest feature index referenced by a split.
    max_feature: Option<usize>,
}

impl Tree {
    fn build(model: ModelId, nodes: TreeNodes, n_classes: usize) -> Result<Self, ModelLoadError> {
        let n = nodes.children_left.len();
        if n == 0 {
            return Err(malformed(model, "tree has no nodes"));
        }
        if nodes.children_right.len() != n
            || nodes.feature.len() != n
            || nodes.threshold.len() != n
            || nodes.value.len() != n
        {
            return Err(malformed(model, "tree arrays differ in length"));
        }

        let mut max_feature: Option<usize> = None;
        for i in 0..n {
            let (left, right) = (nodes.children_left[i], nodes.children_right[i]);
            if nodes.value[i].len() != n_classes {
                return Err(malformed(
                    model,
                    format!("node {} has {} class weights, expected {}", i, nodes.value[i].len(), n_classes),
                ));
            }
            if left == LEAF && right == LEAF {
                continue;
            }
            // children always sit after their parent, which also rules out cycles
            for child in [left, right] {
                if child <= i as i64 || child >= n as i64 {
                    return Err(malformed(model, format!("node {} has invalid child {}", i, child)));
                }
            }
            let feature = usize::try_from(nodes.feature[i])
                .map_err(|_| malformed(model, format!("node {} splits on a negative feature", i)))?;
            max_feature = Some(max_feature.map_or(feature, |m| m.max(feature)));
        }

        Ok(Self { nodes, max_feature })
    }

    fn leaf_weights(&self, features: &[f64]) -> Result<&[f64], PredictionError> {
        let mut node = 0usize;
        loop {
            let left = self.nodes.children_left[node];
            if left == LEAF {
                return Ok(&self.nodes.value[node]);
            }
            // validated at build time: non-negative and in range
            let feature = self.nodes.feature[node] as usize;
            let value = *features.get(feature).ok_or(PredictionError::DimensionMismatch {
                expected: feature + 1,
                actual: features.len(),
            })?;
            node = if value <= self.nodes.threshold[node] {
                left as usize
            } else {
                self.nodes.children_right[node] as usize
            };
        }
    }

    /// Leaf class distribution scaled to sum to one.
    fn proba(&self, features: &[f64]) -> Result<Vec<f64>, PredictionError> {
        let weights = self.leaf_weights(features)?;
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(PredictionError::Degenerate("leaf carries no class weight".to_string()));
        }
        Ok(weights.iter().map(|w| w / total).collect())
    }

    fn predict_index(&self, features: &[f64]) -> Result<usize, PredictionError> {
        let weights = self.leaf_weights(features)?;
        argmax(weights).ok_or_else(|| PredictionError::Degenerate("empty leaf".to_string()))
    }
}

/// Width check for tree ensembles: exact when declared, otherwise the input
/// only has to cover every split feature.
fn check_tree_input(
    features: &[f64],
    declared: Option<usize>,
    max_feature: Option<usize>,
) -> Result<(), PredictionError> {
    match declared {
        Some(width) => check_input(features, width),
        None => {
            let needed = max_feature.map_or(0, |m| m + 1);
            if features.len() < needed {
                return Err(PredictionError::DimensionMismatch {
                    expected: needed,
                    actual: features.len(),
                });
            }
            check_input(features, features.len())
        }
    }
}

fn check_declared_covers(
    model: ModelId,
    declared: Option<usize>,
    max_feature: Option<usize>,
) -> Result<(), ModelLoadError> {
    if let (Some(width), Some(max)) = (declared, max_feature) {
        if max >= width {
            return Err(malformed(
                model,
                format!("splits on feature {} but declares only {} features", max, width),
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct TreeArtifact {
    #[serde(default)]
    pub n_features_in: Option<usize>,
    pub classes: Vec<i64>,
    #[serde(flatten)]
    pub tree: TreeNodes,
}

pub struct DecisionTreeClassifier {
    n_features_in: Option<usize>,
    classes: Vec<i64>,
    tree: Tree,
}

impl TreeArtifact {
    pub fn build(self, model: ModelId) -> Result<DecisionTreeClassifier, ModelLoadError> {
        check_header(model, &self.classes, self.n_features_in)?;
        let tree = Tree::build(model, self.tree, self.classes.len())?;
        check_declared_covers(model, self.n_features_in, tree.max_feature)?;
        Ok(DecisionTreeClassifier {
            n_features_in: self.n_features_in,
            classes: self.classes,
            tree,
        })
    }
}

impl Classifier for DecisionTreeClassifier {
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError> {
        check_tree_input(features, self.n_features_in, self.tree.max_feature)?;
        class_label(&self.classes, self.tree.predict_index(features)?)
    }

    fn expected_features(&self) -> Option<usize> {
        self.n_features_in
    }

    fn kind(&self) -> ModelKind {
        ModelKind::DecisionTree
    }
}

#[derive(Debug, Deserialize)]
pub struct ForestArtifact {
    #[serde(default)]
    pub n_features_in: Option<usize>,
    pub classes: Vec<i64>,
    pub trees: Vec<TreeNodes>,
}

/// Soft-voting forest: averages the leaf distributions of its trees.
pub struct RandomForestClassifier {
    n_features_in: Option<usize>,
    classes: Vec<i64>,
    trees: Vec<Tree>,
    max_feature: Option<usize>,
}

impl ForestArtifact {
    pub fn build(self, model: ModelId) -> Result<RandomForestClassifier, ModelLoadError> {
        check_header(model, &self.classes, self.n_features_in)?;
        if self.trees.is_empty() {
            return Err(malformed(model, "forest has no trees"));
        }
        let n_classes = self.classes.len();
        let trees = self
            .trees
            .into_iter()
            .map(|nodes| Tree::build(model, nodes, n_classes))
            .collect::<Result<Vec<_>, _>>()?;
        let max_feature = trees.iter().filter_map(|t| t.max_feature).max();
        check_declared_covers(model, self.n_features_in, max_feature)?;

        Ok(RandomForestClassifier {
            n_features_in: self.n_features_in,
            classes: self.classes,
            trees,
            max_feature,
        })
    }
}

impl Classifier for RandomForestClassifier {
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError> {
        check_tree_input(features, self.n_features_in, self.max_feature)?;
        let mut mean = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in mean.iter_mut().zip(tree.proba(features)?) {
                *acc += p;
            }
        }
        let index = argmax(&mean).ok_or_else(|| PredictionError::Degenerate("no votes".to_string()))?;
        class_label(&self.classes, index)
    }

    fn expected_features(&self) -> Option<usize> {
        self.n_features_in
    }

    fn kind(&self) -> ModelKind {
        ModelKind::RandomForest
    }
}

#[derive(Debug, Deserialize)]
pub struct AdaBoostArtifact {
    #[serde(default)]
    pub n_features_in: Option<usize>,
    pub classes: Vec<i64>,
    pub estimators: Vec<TreeNodes>,
    pub estimator_weights: Vec<f64>,
}

/// Discrete (SAMME) boosting: each weak tree casts its weight for the class
/// it predicts.
pub struct AdaBoostClassifier {
    n_features_in: Option<usize>,
    classes: Vec<i64>,
    estimators: Vec<(Tree, f64)>,
    max_feature: Option<usize>,
}

impl AdaBoostArtifact {
    pub fn build(self, model: ModelId) -> Result<AdaBoostClassifier, ModelLoadError> {
        check_header(model, &self.classes, self.n_features_in)?;
        if self.estimators.is_empty() {
            return Err(malformed(model, "ensemble has no estimators"));
        }
        if self.estimators.len() != self.estimator_weights.len() {
            return Err(malformed(model, "estimator and weight counts differ"));
        }
        if self.estimator_weights.iter().any(|w| !w.is_finite()) {
            return Err(malformed(model, "estimator weights must be finite"));
        }

        let n_classes = self.classes.len();
        let estimators = self
            .estimators
            .into_iter()
            .zip(self.estimator_weights)
            .map(|(nodes, weight)| Tree::build(model, nodes, n_classes).map(|t| (t, weight)))
            .collect::<Result<Vec<_>, _>>()?;
        let max_feature = estimators.iter().filter_map(|(t, _)| t.max_feature).max();
        check_declared_covers(model, self.n_features_in, max_feature)?;

        Ok(AdaBoostClassifier {
            n_features_in: self.n_features_in,
            classes: self.classes,
            estimators,
            max_feature,
        })
    }
}

impl Classifier for AdaBoostClassifier {
    fn predict(&self, features: &[f64]) -> Result<i64, PredictionError> {
        check_tree_input(features, self.n_features_in, self.max_feature)?;
        let mut votes = vec![0.0; self.classes.len()];
        for (tree, weight) in &self.estimators {
            votes[tree.predict_index(features)?] += weight;
        }
        let index = argmax(&votes).ok_or_else(|| PredictionError::Degenerate("no votes".to_string()))?;
        class_label(&self.classes, index)
    }

    fn expected_features(&self) -> Option<usize> {
        self.n_features_in
    }

    fn kind(&self) -> ModelKind {
        ModelKind::AdaBoost
    }
}
