/// Integration tests for the prediction service
///
/// Run with: cargo test --test integration_tests -- --nocapture
use std::path::PathBuf;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use config::{File, FileFormat};
use taxipred::{
    api::{router, AppState},
    artifact::{ModelLoadError, PipelineModel},
    config::{defaults, ServiceConfig},
    dataset::{DatasetError, TaxiData},
    model::InferenceEngine,
    schema, server,
};

/// Unit scaling and weights that make every price easy to compute by hand.
const TEST_ARTIFACT: &str = r#"{
    "format_version": 1,
    "model_name": "hand-weighted",
    "numeric_features": [
        {"name": "Trip_Distance_km", "mean": 0.0, "scale": 1.0},
        {"name": "Base_Fare", "mean": 0.0, "scale": 1.0},
        {"name": "Per_Km_Rate", "mean": 0.0, "scale": 1.0},
        {"name": "Per_Minute_Rate", "mean": 0.0, "scale": 1.0},
        {"name": "Trip_Duration_Minutes", "mean": 0.0, "scale": 1.0}
    ],
    "categorical_features": [
        {"name": "Time_of_Day", "categories": ["Unknown", "Evening", "Morning"]},
        {"name": "Day_of_Week", "categories": ["Unknown", "Friday"]},
        {"name": "Weather", "categories": ["Unknown", "Clear", "Rain"]},
        {"name": "Traffic_Conditions", "categories": ["Unknown", "Moderate", "High"]}
    ],
    "regressor": {
        "type": "linear",
        "intercept": 0.004,
        "coefficients": [
            1.0, 1.0, 1.0, 1.0, 1.0,
            0.0, 2.5, 1.0,
            0.0, 0.3333,
            0.0, 0.0, 1.5,
            0.0, 0.75, 3.0
        ]
    }
}"#;

const TEST_DATASET: &str = "\
Trip_Distance_km,Time_of_Day,Day_of_Week,Traffic_Conditions,Weather,Trip_Price
19.35,Morning,Weekday,Low,Clear,36.26
47.59,Afternoon,Weekday,High,Clear,
36.87,Evening,Weekend,High,Snow,52.9
30.33,Evening,Weekday,Low,,36.47
";

fn app() -> Router {
    let engine = InferenceEngine::new(PipelineModel::from_json(TEST_ARTIFACT).unwrap());
    let dataset = TaxiData::from_reader(TEST_DATASET.as_bytes()).unwrap();
    router(AppState::new(engine, dataset))
}

fn repo_file(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn predict_request(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

async fn predict(app: &Router, body: Value) -> (StatusCode, Value) {
    send(app, predict_request(body.to_string())).await
}

fn example_trip() -> Value {
    json!({
        "Trip_Distance_km": 5.2,
        "Base_Fare": 35.0,
        "Per_Km_Rate": 12.0,
        "Per_Minute_Rate": 2.5,
        "Trip_Duration_Minutes": 18,
        "Time_of_Day": "Evening",
        "Day_of_Week": "Friday",
        "Weather": "Clear",
        "Traffic_Conditions": "Moderate"
    })
}

fn decimals(price: &Value) -> usize {
    let text = price.to_string();
    text.split_once('.').map_or(0, |(_, frac)| frac.len())
}

#[tokio::test]
async fn test_health_check() {
    println!("\n=== Test: Health Check ===");
    let (status, body) = send(&app(), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    println!("✓ {}", body["message"]);
}

#[tokio::test]
async fn test_example_trip_prediction() {
    println!("\n=== Test: Example Trip ===");
    let (status, body) = predict(&app(), example_trip()).await;
    assert_eq!(status, StatusCode::OK);

    // 72.7 numeric + 2.5 evening + 0.3333 friday + 0.75 moderate + 0.004
    assert_eq!(body, json!({"predicted_price": 76.29}));
    println!("✓ predicted_price={}", body["predicted_price"]);
}

#[tokio::test]
async fn test_empty_request_uses_defaults() {
    println!("\n=== Test: Empty Request ===");
    let (status, body) = predict(&app(), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_price"], json!(0.0));
    println!("✓ all-default row accepted");
}

#[tokio::test]
async fn test_default_fill_equivalence() {
    println!("\n=== Test: Default Fill ===");
    let app = app();

    let mut nulls = serde_json::Map::new();
    let mut explicit = serde_json::Map::new();
    for name in schema::NUMERIC_FEATURES {
        nulls.insert(name.to_string(), Value::Null);
        explicit.insert(name.to_string(), json!(0));
    }
    for name in schema::CATEGORICAL_FEATURES {
        nulls.insert(name.to_string(), Value::Null);
        explicit.insert(name.to_string(), json!("Unknown"));
    }

    let (_, absent) = predict(&app, json!({"Base_Fare": 4.0})).await;
    let mut partial_nulls = nulls.clone();
    partial_nulls.insert("Base_Fare".into(), json!(4.0));
    let (_, with_nulls) = predict(&app, Value::Object(partial_nulls)).await;
    let mut partial_explicit = explicit.clone();
    partial_explicit.insert("Base_Fare".into(), json!(4.0));
    let (_, with_defaults) = predict(&app, Value::Object(partial_explicit)).await;

    assert_eq!(absent, json!({"predicted_price": 4.0}));
    assert_eq!(absent, with_nulls);
    assert_eq!(absent, with_defaults);
    println!("✓ absent == null == explicit default");
}

#[tokio::test]
async fn test_prediction_is_idempotent() {
    println!("\n=== Test: Idempotence ===");
    let app = app();
    let (_, first) = predict(&app, example_trip()).await;
    let (_, second) = predict(&app, example_trip()).await;
    assert_eq!(first, second);
    println!("✓ repeated call gives {}", first["predicted_price"]);
}

#[tokio::test]
async fn test_extra_fields_are_ignored() {
    println!("\n=== Test: Extra Fields ===");
    let app = app();
    let mut noisy = example_trip();
    noisy["Passenger_Count"] = json!(3);
    noisy["origin"] = json!("Vasagatan 1, Göteborg");
    noisy["currency"] = json!({"code": "SEK", "rate": 9.5});

    let (status, with_extra) = predict(&app, noisy).await;
    let (_, plain) = predict(&app, example_trip()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(with_extra, plain);
    println!("✓ unknown keys have no effect");
}

#[tokio::test]
async fn test_price_has_at_most_two_decimals() {
    println!("\n=== Test: Rounding ===");
    let app = app();
    for distance in [0.001, 1.23456, 7.777777, 123.4549, -2.0051] {
        let (status, body) = predict(
            &app,
            json!({"Trip_Distance_km": distance, "Day_of_Week": "Friday"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let price = &body["predicted_price"];
        assert!(price.is_number());
        assert!(decimals(price) <= 2, "too many decimals in {price}");
    }
    println!("✓ all prices rounded to cents");
}

#[tokio::test]
async fn test_huge_estimate_stays_a_number() {
    println!("\n=== Test: Huge Estimate ===");
    let (status, body) = predict(&app(), json!({"Trip_Distance_km": 1e307})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["predicted_price"].is_number(), "got {body}");
    assert_eq!(body["predicted_price"].as_f64(), Some(1e307));
    println!("✓ {} survives rounding", body["predicted_price"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_predictions_agree() {
    println!("\n=== Test: Concurrent Predictions ===");
    let app = app();
    let (_, expected) = predict(&app, example_trip()).await;

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..32 {
        let app = app.clone();
        tasks.spawn(async move { predict(&app, example_trip()).await });
    }
    let mut seen = 0;
    while let Some(joined) = tasks.join_next().await {
        let (status, body) = joined.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, expected);
        seen += 1;
    }
    assert_eq!(seen, 32);
    println!("✓ {seen} parallel requests returned {}", expected["predicted_price"]);
}

#[tokio::test]
async fn test_unknown_category_is_server_error() {
    println!("\n=== Test: Unknown Category ===");
    let (status, body) = predict(&app(), json!({"Weather": "Hail"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("Hail"));
    assert!(detail.contains("Weather"));
    println!("✓ detail: {detail}");
}

#[tokio::test]
async fn test_non_numeric_value_is_server_error() {
    println!("\n=== Test: Non-numeric Numeric Field ===");
    let (status, body) = predict(&app(), json!({"Base_Fare": "thirty-five"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("Base_Fare"));

    let (status, _) = predict(&app(), json!({"Traffic_Conditions": true})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    println!("✓ type mismatches surface as inference failures");
}

#[tokio::test]
async fn test_failure_isolation() {
    println!("\n=== Test: Failure Isolation ===");
    let app = app();
    let (bad, _) = predict(&app, json!({"Time_of_Day": "Dusk"})).await;
    let (good, body) = predict(&app, example_trip()).await;
    assert_eq!(bad, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(good, StatusCode::OK);
    assert_eq!(body["predicted_price"], json!(76.29));
    println!("✓ failed request did not poison the next one");
}

#[tokio::test]
async fn test_malformed_bodies_are_client_errors() {
    println!("\n=== Test: Malformed Bodies ===");
    let app = app();

    let (status, body) = send(&app, predict_request("{\"Base_Fare\": ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());

    let (status, body) = send(&app, predict_request("[5.2, 35.0]")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].is_string());

    let no_content_type = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(&app, no_content_type).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    println!("✓ bad bodies rejected before inference");
}

#[tokio::test]
async fn test_schema_endpoint() {
    println!("\n=== Test: Schema ===");
    let (status, body) = send(&app(), get("/schema")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model"], "hand-weighted");

    let fields = body["fields"].as_array().unwrap();
    assert_eq!(fields.len(), schema::FEATURE_COUNT);
    assert_eq!(fields[0]["name"], "Trip_Distance_km");
    assert_eq!(fields[0]["fill"], json!(0.0));
    assert_eq!(fields[0]["example"], json!(5.2));
    assert_eq!(fields[6]["example"], "Friday");
    assert_eq!(fields[6]["fill"], "Unknown");
    println!("✓ {} fields published", fields.len());
}

#[tokio::test]
async fn test_dataset_listing() {
    println!("\n=== Test: Dataset Listing ===");
    let (status, body) = send(&app(), get("/taxi")).await;
    assert_eq!(status, StatusCode::OK);

    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["Weather"], "Clear");
    assert_eq!(rows[0]["Trip_Price"], json!(36.26));
    assert_eq!(rows[1]["Trip_Price"], Value::Null);
    let keys: Vec<_> = rows[0].as_object().unwrap().keys().cloned().collect();
    assert_eq!(keys.first().map(String::as_str), Some("Trip_Distance_km"));
    assert_eq!(keys.last().map(String::as_str), Some("Trip_Price"));
    println!("✓ {} records", rows.len());
}

#[tokio::test]
async fn test_dataset_summary() {
    println!("\n=== Test: Dataset Summary ===");
    let (status, body) = send(&app(), get("/summary")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "antal resor": 4,
            // (36.26 + 52.9 + 36.47) / 3 = 41.8766...
            "medelpris": 41.88,
            "unika_väder": 2,
            "unika_tidpunkter": 3
        })
    );
    println!("✓ summary: {body}");
}

#[tokio::test]
async fn test_shipped_model_and_dataset() {
    println!("\n=== Test: Shipped Artifact ===");
    let engine = InferenceEngine::load(repo_file("models/taxi_price_model.json")).unwrap();
    engine.warm_up().unwrap();
    let dataset = TaxiData::load(repo_file("data/taxi_trip_pricing.csv")).unwrap();
    let app = router(AppState::new(engine, dataset).with_prediction_logging(true));

    let (status, body) = predict(&app, example_trip()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["predicted_price"].is_number());

    let (status, body) = predict(&app, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(decimals(&body["predicted_price"]) <= 2);

    let (_, summary) = send(&app, get("/summary")).await;
    assert_eq!(summary["antal resor"], 20);
    assert_eq!(summary["medelpris"], json!(52.22));
    assert_eq!(summary["unika_väder"], 3);
    assert_eq!(summary["unika_tidpunkter"], 4);
    println!("✓ shipped model predicts {}", body["predicted_price"]);
}

#[test]
fn test_startup_failures() {
    println!("\n=== Test: Startup Failures ===");
    let dir = tempfile::tempdir().unwrap();

    let missing = InferenceEngine::load(dir.path().join("model.json"));
    assert!(matches!(missing, Err(ModelLoadError::Read { .. })));

    let corrupt = dir.path().join("corrupt.json");
    std::fs::write(&corrupt, b"\x80\x04\x95pickled-sklearn").unwrap();
    assert!(matches!(
        InferenceEngine::load(&corrupt),
        Err(ModelLoadError::Parse(_))
    ));

    let truncated = dir.path().join("truncated.json");
    std::fs::write(&truncated, &TEST_ARTIFACT[..TEST_ARTIFACT.len() / 2]).unwrap();
    assert!(InferenceEngine::load(&truncated).is_err());

    let csv = dir.path().join("taxi.csv");
    std::fs::write(&csv, "Trip_Distance_km,Weather\n1.0,Clear\n").unwrap();
    assert!(matches!(
        TaxiData::load(&csv),
        Err(DatasetError::MissingColumn(_))
    ));
    assert!(matches!(
        TaxiData::load(dir.path().join("absent.csv")),
        Err(DatasetError::Read { .. })
    ));
    println!("✓ every startup failure is a typed error");
}

fn service_config(model: PathBuf, dataset: PathBuf) -> ServiceConfig {
    let overrides = json!({
        "server": {"host": "127.0.0.1", "port": 0},
        "model": {"path": model},
        "dataset": {"path": dataset}
    })
    .to_string();
    ServiceConfig::from_builder(
        defaults()
            .unwrap()
            .add_source(File::from_str(&overrides, FileFormat::Json)),
    )
    .unwrap()
}

#[tokio::test]
async fn test_startup_wiring() {
    println!("\n=== Test: Startup Wiring ===");
    let cfg = service_config(
        repo_file("models/taxi_price_model.json"),
        repo_file("data/taxi_trip_pricing.csv"),
    );
    let (addr, app) = server::build(&cfg).unwrap();
    assert_eq!(addr.to_string(), "127.0.0.1:0");

    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    let (status, body) = predict(&app, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["predicted_price"].is_number());

    let cfg = service_config(
        repo_file("models/no_such_model.json"),
        repo_file("data/taxi_trip_pricing.csv"),
    );
    assert!(server::build(&cfg).is_err());

    let dir = tempfile::tempdir().unwrap();
    let cfg = service_config(
        repo_file("models/taxi_price_model.json"),
        dir.path().join("absent.csv"),
    );
    assert!(server::build(&cfg).is_err());
    println!("✓ server::build serves and refuses bad paths");
}
