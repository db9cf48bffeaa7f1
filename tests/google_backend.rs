use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{ImageFormat, Rgb, RgbImage};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ocr_translator_rust::credentials::{ServiceAccountKey, parse_service_account};
use ocr_translator_rust::data::load_attachment_from_bytes;
use ocr_translator_rust::settings::Settings;
use ocr_translator_rust::{
    Config, Interaction, Pipeline, PipelineError, TextExport, init_clients, run,
};

const PRIVATE_KEY: &str = include_str!("fixtures/test_service_account_key.pem");
const PUBLIC_KEY: &str = include_str!("fixtures/test_service_account_pub.pem");
const CLIENT_EMAIL: &str = "ocr@bengali-ocr.iam.gserviceaccount.com";
const ACCESS_TOKEN: &str = "ya29.test-token";

#[derive(Default)]
struct FakeGoogle {
    token_uri: Mutex<String>,
    reject_tokens: bool,
    annotate_failures: usize,
    annotate_rejection: Option<(StatusCode, Value)>,
    annotate_body: Value,
    token_calls: AtomicUsize,
    annotate_calls: AtomicUsize,
    translate_requests: Mutex<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
}

async fn token(
    State(google): State<Arc<FakeGoogle>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    google.token_calls.fetch_add(1, Ordering::SeqCst);
    if google.reject_tokens {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Invalid JWT Signature."})),
        );
    }
    assert_eq!(
        form.get("grant_type").map(String::as_str),
        Some("urn:ietf:params:oauth:grant-type:jwt-bearer")
    );
    let assertion = form.get("assertion").expect("assertion");
    let token_uri = google.token_uri.lock().unwrap().clone();
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    let decoded = jsonwebtoken::decode::<AssertionClaims>(
        assertion,
        &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
        &validation,
    )
    .expect("valid assertion");
    assert_eq!(decoded.claims.iss, CLIENT_EMAIL);
    assert_eq!(decoded.claims.aud, token_uri);
    assert_eq!(
        decoded.claims.scope,
        "https://www.googleapis.com/auth/cloud-platform"
    );
    assert_eq!(decoded.header.kid.as_deref(), Some("test-key-id"));
    (
        StatusCode::OK,
        Json(json!({"access_token": ACCESS_TOKEN, "expires_in": 3600, "token_type": "Bearer"})),
    )
}

fn assert_bearer(headers: &HeaderMap) {
    assert_eq!(
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok()),
        Some(format!("Bearer {}", ACCESS_TOKEN).as_str())
    );
}

async fn annotate(
    State(google): State<Arc<FakeGoogle>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    assert_bearer(&headers);
    let call = google.annotate_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let request = &body["requests"][0];
    assert_eq!(request["features"][0]["type"], "TEXT_DETECTION");
    let content = BASE64
        .decode(request["image"]["content"].as_str().expect("content"))
        .expect("base64 content");
    assert_eq!(&content[..8], b"\x89PNG\r\n\x1a\n");
    if let Some((status, body)) = &google.annotate_rejection {
        return (*status, Json(body.clone()));
    }
    if call <= google.annotate_failures {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"code": 503, "message": "The service is currently unavailable.", "status": "UNAVAILABLE"}})),
        );
    }
    (StatusCode::OK, Json(google.annotate_body.clone()))
}

async fn translate(
    State(google): State<Arc<FakeGoogle>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    assert_bearer(&headers);
    google.translate_requests.lock().unwrap().push(body);
    Json(json!({
        "data": {
            "translations": [
                {"translatedText": "hello", "detectedSourceLanguage": "bn"}
            ]
        }
    }))
}

async fn start(google: Arc<FakeGoogle>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    *google.token_uri.lock().unwrap() = format!("{}/token", base);
    let app = Router::new()
        .route("/token", post(token))
        .route("/v1/images:annotate", post(annotate))
        .route("/language/translate/v2", post(translate))
        .with_state(google);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

fn secrets_toml(base: &str) -> String {
    let mut account = toml::Table::new();
    account.insert("type".into(), "service_account".into());
    account.insert("project_id".into(), "bengali-ocr".into());
    account.insert("private_key_id".into(), "test-key-id".into());
    account.insert("private_key".into(), PRIVATE_KEY.into());
    account.insert("client_email".into(), CLIENT_EMAIL.into());
    account.insert("token_uri".into(), format!("{}/token", base).into());
    let mut secrets = toml::Table::new();
    secrets.insert("gcp_service_account".into(), toml::Value::Table(account));
    toml::to_string(&secrets).unwrap()
}

fn service_account(base: &str) -> ServiceAccountKey {
    parse_service_account(&secrets_toml(base), "gcp_service_account").unwrap()
}

fn settings(base: &str) -> Settings {
    Settings {
        vision_endpoint: format!("{}/v1/images:annotate", base),
        translate_endpoint: format!("{}/language/translate/v2", base),
        retry_max_retries: 2,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..Settings::default()
    }
}

async fn pipeline_for(google: &Arc<FakeGoogle>) -> Pipeline {
    let base = start(google.clone()).await;
    let settings = settings(&base);
    let clients = init_clients(&service_account(&base), &settings).unwrap();
    Pipeline::from_clients(clients, settings.target_lang.clone())
}

fn png_upload() -> ocr_translator_rust::data::DataAttachment {
    let image = RgbImage::from_pixel(16, 8, Rgb([250, 250, 250]));
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png).unwrap();
    load_attachment_from_bytes(buffer.into_inner(), Some("hello.png")).unwrap()
}

fn annotations(texts: &[&str]) -> Value {
    let items = texts
        .iter()
        .map(|text| json!({"locale": "bn", "description": text}))
        .collect::<Vec<_>>();
    json!({"responses": [{"textAnnotations": items}]})
}

#[tokio::test]
async fn hello_image_is_translated_end_to_end() {
    let google = Arc::new(FakeGoogle {
        annotate_body: annotations(&["হ্যালো", "হ্যালো"]),
        ..FakeGoogle::default()
    });
    let pipeline = pipeline_for(&google).await;

    let Interaction::Presented(presented) = pipeline.process(png_upload()).await else {
        panic!("expected a translation");
    };
    assert_eq!(presented.original, "হ্যালো");
    assert_eq!(presented.translated, "hello");
    assert_eq!(presented.detected_source_language.as_deref(), Some("bn"));

    let export = TextExport::new(&presented.translated, "translated_text.txt");
    assert_eq!(export.bytes, b"hello");

    let requests = google.translate_requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        json!({"q": ["হ্যালো"], "target": "en", "format": "text"})
    );
}

#[tokio::test]
async fn access_token_is_reused_across_uploads() {
    let google = Arc::new(FakeGoogle {
        annotate_body: annotations(&["হ্যালো"]),
        ..FakeGoogle::default()
    });
    let pipeline = pipeline_for(&google).await;
    for _ in 0..3 {
        assert!(matches!(
            pipeline.process(png_upload()).await,
            Interaction::Presented(_)
        ));
    }
    assert_eq!(google.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(google.annotate_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn image_without_text_warns_and_skips_translation() {
    let google = Arc::new(FakeGoogle {
        annotate_body: json!({"responses": [{}]}),
        ..FakeGoogle::default()
    });
    let pipeline = pipeline_for(&google).await;
    let interaction = pipeline.process(png_upload()).await;
    assert!(matches!(interaction, Interaction::Warned { .. }));
    assert!(google.translate_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transient_ocr_failures_are_retried() {
    let google = Arc::new(FakeGoogle {
        annotate_failures: 2,
        annotate_body: annotations(&["হ্যালো"]),
        ..FakeGoogle::default()
    });
    let pipeline = pipeline_for(&google).await;
    let interaction = pipeline.process(png_upload()).await;
    assert!(matches!(interaction, Interaction::Presented(_)));
    assert_eq!(google.annotate_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_unavailability_is_reported_as_retryable() {
    let google = Arc::new(FakeGoogle {
        annotate_failures: usize::MAX,
        annotate_body: annotations(&["হ্যালো"]),
        ..FakeGoogle::default()
    });
    let pipeline = pipeline_for(&google).await;
    let Interaction::ErrorDisplayed { error, preview } = pipeline.process(png_upload()).await
    else {
        panic!("expected an error");
    };
    assert!(preview.is_some());
    assert!(matches!(
        error,
        PipelineError::ServiceUnavailable {
            service: "vision",
            ..
        }
    ));
    assert!(error.is_retryable());
    assert_eq!(google.annotate_calls.load(Ordering::SeqCst), 3);
    assert!(google.translate_requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_credentials_are_not_retried() {
    let google = Arc::new(FakeGoogle {
        reject_tokens: true,
        annotate_body: annotations(&["হ্যালো"]),
        ..FakeGoogle::default()
    });
    let pipeline = pipeline_for(&google).await;
    let Interaction::ErrorDisplayed { error, .. } = pipeline.process(png_upload()).await else {
        panic!("expected an error");
    };
    assert!(matches!(error, PipelineError::Credential(_)));
    assert!(error.to_string().contains("invalid_grant"));
    assert_eq!(google.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(google.annotate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn permission_denied_is_a_credential_error_without_retry() {
    let google = Arc::new(FakeGoogle {
        annotate_rejection: Some((
            StatusCode::FORBIDDEN,
            json!({"error": {
                "code": 403,
                "message": "The vision.googleapis.com API requires a quota project, which is not set by default.",
                "status": "PERMISSION_DENIED"
            }}),
        )),
        annotate_body: annotations(&["হ্যালো"]),
        ..FakeGoogle::default()
    });
    let pipeline = pipeline_for(&google).await;
    let Interaction::ErrorDisplayed { error, .. } = pipeline.process(png_upload()).await else {
        panic!("expected an error");
    };
    assert!(matches!(error, PipelineError::Credential(_)), "{:?}", error);
    assert!(!error.is_retryable());
    assert!(error.to_string().contains("quota project"));
    assert_eq!(google.annotate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn one_shot_run_writes_the_export_file() {
    let google = Arc::new(FakeGoogle {
        annotate_body: annotations(&["হ্যালো"]),
        ..FakeGoogle::default()
    });
    let base = start(google.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let secrets = dir.path().join("secrets.toml");
    std::fs::write(&secrets, secrets_toml(&base)).unwrap();
    let settings = dir.path().join("settings.toml");
    std::fs::write(
        &settings,
        format!(
            "[google]\nvision_endpoint = \"{base}/v1/images:annotate\"\ntranslate_endpoint = \"{base}/language/translate/v2\"\n\n[retry]\nbase_delay_ms = 1\n"
        ),
    )
    .unwrap();
    let image = dir.path().join("hello.png");
    std::fs::write(&image, png_upload().bytes).unwrap();
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let translated = run(Config {
        data: Some(image.to_string_lossy().into_owned()),
        out: Some(out.to_string_lossy().into_owned()),
        secrets_path: Some(secrets.to_string_lossy().into_owned()),
        settings_path: Some(settings.to_string_lossy().into_owned()),
        ..Config::default()
    })
    .await
    .unwrap();

    assert_eq!(translated, "hello");
    assert_eq!(
        std::fs::read(out.join("translated_text.txt")).unwrap(),
        b"hello"
    );
    assert_eq!(google.translate_requests.lock().unwrap().len(), 1);
}
