//! Content-based phishing page classification.
//!
//! A check fetches the page, derives a fixed vector of markup signals from
//! it and hands that vector to one of several pre-trained classifiers.
//! Fetch-layer failures are reported as inconclusive, never as a label.

pub mod bayes;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod fetch;
pub mod kernel_models;
pub mod models;
pub mod neural;
pub mod normalize;
pub mod registry;
pub mod tree_models;
pub mod types;

pub use config::EngineConfig;
pub use engine::PhishingEngine;
pub use error::{EngineError, ModelLoadError, PredictionError};
pub use features::{FeatureExtractor, PageDocument, FEATURE_COUNT};
pub use fetch::{FetchOutcome, HttpFetcher, PageFetcher};
pub use models::{Classifier, ModelKind};
pub use registry::ModelRegistry;
pub use types::{CheckReport, ModelId, Verdict};
