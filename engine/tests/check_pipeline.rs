use phishscan_engine::{
    registry::{artifact_digest, MANIFEST_FILE},
    EngineConfig, EngineError, ModelId, PhishingEngine, Verdict, FEATURE_COUNT,
};
use std::{path::Path, time::Duration};
use tempfile::TempDir;
use tokio_test::assert_ok;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One-split forest: pages with a password field (signal 6) are phishing.
const FOREST: &str = r#"{
    "kind": "random_forest",
    "n_features_in": 45,
    "classes": [0, 1],
    "trees": [{
        "children_left": [1, -1, -1],
        "children_right": [2, -1, -1],
        "feature": [6, -2, -2],
        "threshold": [0.5, -2.0, -2.0],
        "value": [[5.0, 5.0], [9.0, 1.0], [1.0, 9.0]]
    }]
}"#;

/// Tree fitted on an older 30-signal layout; splits on signal 1 (inputs).
const NARROW_TREE: &str = r#"{
    "kind": "decision_tree",
    "n_features_in": 30,
    "classes": [0, 1],
    "children_left": [1, -1, -1],
    "children_right": [2, -1, -1],
    "feature": [1, -2, -2],
    "threshold": [0.5, -2.0, -2.0],
    "value": [[1.0, 1.0], [1.0, 0.0], [0.0, 1.0]]
}"#;

const ENCYCLOPEDIA: &str = r#"<html><head><title>Wikipedia</title></head>
<body><nav><a href="/wiki/Main">Main</a></nav><h1>Welcome</h1>
<p>The free encyclopedia.</p><footer>Text is available under a licence.</footer></body></html>"#;

const LOGIN: &str = r#"<html><head><title>PayPaI - Sign in</title></head>
<body><form action="https://collector.example.net/post">
<input type="email" name="user"><input type="password" name="pass">
<button type="submit">Log in</button></form></body></html>"#;

fn model_dir(artifacts: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, body) in artifacts {
        std::fs::write(dir.path().join(name), body).unwrap();
    }
    dir
}

fn config(dir: &Path) -> EngineConfig {
    EngineConfig {
        model_dir: dir.to_path_buf(),
        fetch_timeout_secs: 1,
        ..EngineConfig::default()
    }
}

async fn serve(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(template).mount(&server).await;
    server
}

#[tokio::test]
async fn plain_page_is_legitimate_with_random_forest() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let server = serve(ResponseTemplate::new(200).set_body_string(ENCYCLOPEDIA)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&server.uri(), ModelId::RandomForest).await;
    assert_eq!(report.verdict, Verdict::Legitimate);
    assert_eq!(report.feature_count, Some(FEATURE_COUNT));
    assert_eq!(report.model, ModelId::RandomForest);
}

#[tokio::test]
async fn credential_form_is_phishing() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let server = serve(ResponseTemplate::new(200).set_body_string(LOGIN)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&format!("{}/signin", server.uri()), ModelId::RandomForest).await;
    assert_eq!(report.verdict, Verdict::Phishing);
    assert!(report.message().contains("PHISHING"));
}

#[tokio::test]
async fn narrow_model_receives_truncated_vector() {
    let dir = model_dir(&[("dt_model.json", NARROW_TREE)]);
    let server = serve(ResponseTemplate::new(200).set_body_string(LOGIN)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&server.uri(), ModelId::DecisionTree).await;
    assert_eq!(report.feature_count, Some(30));
    assert_eq!(report.verdict, Verdict::Phishing);
}

#[tokio::test]
async fn error_status_is_inconclusive_for_every_model() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let server = serve(ResponseTemplate::new(503)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    for model in ModelId::ALL {
        let report = engine.check(&server.uri(), model).await;
        assert_eq!(report.verdict, Verdict::NonSuccessHttp { status: 503 });
        assert!(report.verdict.advice().unwrap().contains("does NOT mean"));
    }
}

#[tokio::test]
async fn slow_site_times_out() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let server = serve(ResponseTemplate::new(200).set_delay(Duration::from_secs(3))).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&server.uri(), ModelId::RandomForest).await;
    assert_eq!(report.verdict, Verdict::Timeout);
    assert!(!report.verdict.is_label());
}

#[tokio::test]
async fn dead_host_is_unreachable_regardless_of_model() {
    let dir = model_dir(&[]);
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    for model in [ModelId::RandomForest, ModelId::KNeighbours, ModelId::NeuralNetwork] {
        let report = engine.check(&format!("http://127.0.0.1:{}/", port), model).await;
        assert!(matches!(report.verdict, Verdict::Unreachable(_)), "{:?}", report.verdict);
    }
}

#[tokio::test]
async fn bare_domain_is_rejected_before_fetching() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check("www.example.com", ModelId::RandomForest).await;
    assert!(matches!(report.verdict, Verdict::InvalidInput(_)));
    assert_eq!(report.feature_count, None);
}

#[tokio::test]
async fn missing_artifact_is_reported_as_load_failure() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let server = serve(ResponseTemplate::new(200).set_body_string(ENCYCLOPEDIA)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&server.uri(), ModelId::SupportVectorMachine).await;
    assert!(matches!(report.verdict, Verdict::ModelLoadFailure(_)));
}

#[tokio::test]
async fn wrong_artifact_kind_is_a_load_failure() {
    // a forest saved under the decision tree's file name
    let dir = model_dir(&[("dt_model.json", FOREST)]);
    let server = serve(ResponseTemplate::new(200).set_body_string(ENCYCLOPEDIA)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&server.uri(), ModelId::DecisionTree).await;
    assert!(matches!(report.verdict, Verdict::ModelLoadFailure(_)));
}

#[tokio::test]
async fn single_class_network_is_refused_not_run() {
    let single_class = r#"{
        "kind": "mlp",
        "classes": [1],
        "layers": [{ "weights": [[1.0]], "bias": [10.0] }]
    }"#;
    let dir = model_dir(&[("nn_model.json", single_class)]);
    let server = serve(ResponseTemplate::new(200).set_body_string(ENCYCLOPEDIA)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&server.uri(), ModelId::NeuralNetwork).await;
    assert!(matches!(report.verdict, Verdict::ModelLoadFailure(_)), "{:?}", report.verdict);
}

#[tokio::test]
async fn preload_fails_fast_on_incomplete_model_dir() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let config = EngineConfig {
        preload_models: true,
        ..config(dir.path())
    };
    let result = PhishingEngine::from_config(&config).await;
    assert!(matches!(result, Err(EngineError::ModelLoad(_))));
}

#[tokio::test]
async fn tampered_artifact_is_refused() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let digest = artifact_digest(FOREST.as_bytes());
    std::fs::write(
        dir.path().join(MANIFEST_FILE),
        serde_json::json!({ "rf_model.json": digest }).to_string(),
    )
    .unwrap();
    // a single flipped split threshold
    std::fs::write(dir.path().join("rf_model.json"), FOREST.replace("0.5", "7.5")).unwrap();

    let server = serve(ResponseTemplate::new(200).set_body_string(LOGIN)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);
    let report = engine.check(&server.uri(), ModelId::RandomForest).await;
    assert!(matches!(report.verdict, Verdict::ModelLoadFailure(_)));
}

#[tokio::test]
async fn report_serializes_with_verdict_tag() {
    let dir = model_dir(&[("rf_model.json", FOREST)]);
    let server = serve(ResponseTemplate::new(404)).await;
    let engine = assert_ok!(PhishingEngine::from_config(&config(dir.path())).await);

    let report = engine.check(&server.uri(), ModelId::RandomForest).await;
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["verdict"]["verdict"], "non_success_http");
    assert_eq!(json["model"], "random-forest");
}
