use crate::{
    error::ModelLoadError,
    models::{Classifier, ModelArtifact},
    types::ModelId,
};
use sha2::{Digest, Sha256};
use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const MANIFEST_FILE: &str = "manifest.json";

type Slot = OnceCell<Arc<dyn Classifier>>;

/// Holds at most one loaded classifier per [`ModelId`].
///
/// Artifacts are read from `<model_dir>/<artifact_name>` the first time an
/// identifier is resolved (or all at once via [`ModelRegistry::preload`])
/// and are never replaced afterwards. When the directory carries a
/// `manifest.json` mapping file names to SHA-256 digests, every artifact
/// is verified against it before decoding.
pub struct ModelRegistry {
    model_dir: Option<PathBuf>,
    manifest: Option<HashMap<String, String>>,
    slots: [Slot; ModelId::COUNT],
}

impl ModelRegistry {
    pub async fn open(model_dir: impl Into<PathBuf>) -> Result<Self, ModelLoadError> {
        let model_dir = model_dir.into();
        let manifest = Self::read_manifest(&model_dir).await?;
        match &manifest {
            Some(entries) => info!(
                "Model registry at {} with {} manifest digests",
                model_dir.display(),
                entries.len()
            ),
            None => info!("Model registry at {} (no manifest, digests not verified)", model_dir.display()),
        }

        Ok(Self {
            model_dir: Some(model_dir),
            manifest,
            slots: std::array::from_fn(|_| OnceCell::new()),
        })
    }

    /// Registry backed only by classifiers handed in by the caller.
    pub fn in_memory() -> Self {
        Self {
            model_dir: None,
            manifest: None,
            slots: std::array::from_fn(|_| OnceCell::new()),
        }
    }

    /// Install `classifier` for `model` unless one is already loaded.
    pub fn with_classifier(self, model: ModelId, classifier: Arc<dyn Classifier>) -> Self {
        if self.slot(model).set(classifier).is_err() {
            warn!("{} already loaded, keeping the existing classifier", model);
        }
        self
    }

    pub fn artifact_path(&self, model: ModelId) -> Option<PathBuf> {
        self.model_dir.as_ref().map(|dir| dir.join(model.artifact_name()))
    }

    pub fn is_loaded(&self, model: ModelId) -> bool {
        self.slot(model).initialized()
    }

    pub async fn resolve(&self, model: ModelId) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let classifier = self.slot(model).get_or_try_init(|| self.load(model)).await?;
        Ok(Arc::clone(classifier))
    }

    /// Load every artifact up front, stopping at the first failure.
    pub async fn preload(&self) -> Result<(), ModelLoadError> {
        for model in ModelId::ALL {
            self.resolve(model).await?;
        }
        Ok(())
    }

    fn slot(&self, model: ModelId) -> &Slot {
        &self.slots[model as usize]
    }

    async fn load(&self, model: ModelId) -> Result<Arc<dyn Classifier>, ModelLoadError> {
        let Some(path) = self.artifact_path(model) else {
            return Err(ModelLoadError::Missing {
                model,
                path: "<in-memory registry>".to_string(),
            });
        };

        let bytes = tokio::fs::read(&path).await.map_err(|source| match source.kind() {
            ErrorKind::NotFound => ModelLoadError::Missing {
                model,
                path: path.display().to_string(),
            },
            _ => ModelLoadError::Io { model, source },
        })?;

        self.verify_digest(model, &bytes)?;

        let classifier = ModelArtifact::from_json(model, &bytes)?.into_classifier(model)?;
        metrics::counter!("model_loads_total", "model" => model.slug()).increment(1);
        info!(
            "Loaded {} ({}, expects {:?} features) from {}",
            model,
            classifier.kind(),
            classifier.expected_features(),
            path.display()
        );
        Ok(classifier)
    }

    fn verify_digest(&self, model: ModelId, bytes: &[u8]) -> Result<(), ModelLoadError> {
        let Some(manifest) = &self.manifest else {
            return Ok(());
        };
        let expected = manifest.get(model.artifact_name()).ok_or_else(|| {
            ModelLoadError::Manifest(format!("no digest listed for {}", model.artifact_name()))
        })?;

        let actual = hex::encode(Sha256::digest(bytes));
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(ModelLoadError::DigestMismatch {
                model,
                expected: expected.clone(),
                actual,
            });
        }
        debug!("Digest verified for {}", model.artifact_name());
        Ok(())
    }

    async fn read_manifest(dir: &Path) -> Result<Option<HashMap<String, String>>, ModelLoadError> {
        let path = dir.join(MANIFEST_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| ModelLoadError::Manifest(format!("{}: {}", path.display(), e))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ModelLoadError::Manifest(format!("{}: {}", path.display(), e))),
        }
    }
}

/// SHA-256 of an artifact, in the form `manifest.json` expects.
pub fn artifact_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
