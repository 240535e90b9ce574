use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::Engine as _;
use chrono::NaiveDate;
use http_body_util::BodyExt;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use engine::Engine;
use server::{ServerState, router};

const USER: &str = "alice";
const PASSWORD: &str = "s3cret";

struct Fixture {
    app: Router,
    category_id: Uuid,
    wallet_id: Uuid,
}

async fn fixture() -> Fixture {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db.execute_unprepared(&format!(
        "INSERT INTO users (username, password) VALUES ('{USER}', '{PASSWORD}')"
    ))
    .await
    .unwrap();

    let engine = Engine::builder()
        .database(db.clone())
        .today(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
        .build()
        .await
        .unwrap();
    engine.bootstrap_user(USER).await.unwrap();

    let category_id = engine
        .list_categories(USER, false)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Outros")
        .unwrap()
        .id;
    let wallet_id = engine
        .list_accounts(USER, false)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.account.name == engine::WALLET_ACCOUNT_NAME)
        .unwrap()
        .account
        .id;

    let app = router(ServerState {
        engine: Arc::new(engine),
        db,
    });
    Fixture {
        app,
        category_id,
        wallet_id,
    }
}

fn basic(username: &str, password: &str) -> String {
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {token}")
}

fn post(path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::AUTHORIZATION, basic(USER, PASSWORD))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn requests_without_valid_credentials_are_rejected() {
    let fx = fixture().await;

    let anonymous = Request::builder()
        .method("POST")
        .uri("/categories/list")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = call(&fx.app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let wrong = Request::builder()
        .method("POST")
        .uri("/categories/list")
        .header(header::AUTHORIZATION, basic(USER, "nope"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = call(&fx.app, wrong).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn created_transaction_is_wrapped_in_an_envelope() {
    let fx = fixture().await;

    let (status, body) = call(
        &fx.app,
        post(
            "/transactions/new",
            json!({
                "date": "2025-03-10",
                "kind": "EXPENSE",
                "amount_cents": 45_90,
                "description": "Lanche",
                "category_id": fx.category_id,
                "from_account_id": fx.wallet_id,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(&fx.app, post("/transactions/get", json!({ "id": id }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], json!("Lanche"));
    assert_eq!(body["data"]["kind"], json!("EXPENSE"));
    assert_eq!(body["data"]["payment_status"], json!("PAID"));
    assert_eq!(body["data"]["recurrence"], json!("SINGLE"));

    let (status, body) = call(
        &fx.app,
        post("/transactions/delete", json!({ "id": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], json!(true));
}

#[tokio::test]
async fn installment_plans_answer_with_the_group() {
    let fx = fixture().await;

    let (status, body) = call(
        &fx.app,
        post(
            "/transactions/new",
            json!({
                "date": "2025-01-31",
                "kind": "EXPENSE",
                "amount_cents": 100_00,
                "description": "Pneus",
                "category_id": fx.category_id,
                "installments": 3,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["installment_count"], json!(3));
    assert_eq!(body["data"]["ids"].as_array().unwrap().len(), 3);

    let group_id = body["data"]["group_id"].clone();
    let (status, body) = call(
        &fx.app,
        post("/installments/group", json!({ "group_id": group_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["stats"]["total"], json!(3));
    // The first installment is dated in the past and starts paid.
    assert_eq!(body["data"]["stats"]["paid"], json!(1));
    assert_eq!(body["data"]["stats"]["pending"], json!(2));
}

#[tokio::test]
async fn validation_failures_carry_a_code() {
    let fx = fixture().await;

    let (status, body) = call(
        &fx.app,
        post(
            "/transactions/new",
            json!({
                "date": "2025-03-10",
                "kind": "EXPENSE",
                "amount_cents": 0,
                "description": "Nada",
                "category_id": fx.category_id,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION"));

    let (status, body) = call(
        &fx.app,
        post("/transactions/get", json!({ "id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn malformed_bodies_answer_with_the_error_envelope() {
    let fx = fixture().await;

    let broken = Request::builder()
        .method("POST")
        .uri("/transactions/new")
        .header(header::AUTHORIZATION, basic(USER, PASSWORD))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{bad json"))
        .unwrap();
    let (status, body) = call(&fx.app, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION"));
    assert!(body["error"]["message"].is_string());

    // Well-formed but missing a required field.
    let (status, body) = call(
        &fx.app,
        post("/cards/get", json!({ "id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION"));
}

#[tokio::test]
async fn card_answers_carry_meta_and_conflict_details() {
    let fx = fixture().await;

    let (status, body) = call(
        &fx.app,
        post(
            "/cards/save",
            json!({
                "name": "Roxinho",
                "total_limit_cents": 1000_00,
                "closing_day": 10,
                "due_day": 20,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], json!(true));
    assert!(body["meta"]["server_time"].is_string());
    assert!(body["meta"]["latency_ms"].is_u64());
    assert_eq!(body["data"]["version"], json!(1));
    let card_id = body["data"]["id"].clone();

    let (status, body) = call(
        &fx.app,
        post(
            "/cards/save",
            json!({
                "id": card_id,
                "name": "Roxinho Gold",
                "total_limit_cents": 2000_00,
                "closing_day": 10,
                "due_day": 20,
                "version": 5,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], json!(false));
    assert_eq!(body["error"]["code"], json!("CONFLICT"));
    assert_eq!(body["error"]["details"]["expected_version"], json!(5));
    assert_eq!(body["error"]["details"]["current_version"], json!(1));
    assert!(body["meta"]["server_time"].is_string());

    let (status, body) = call(
        &fx.app,
        post("/cards/get", json!({ "card_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
    assert!(body["error"]["details"].is_null());
}

#[tokio::test]
async fn config_round_trips_through_the_api() {
    let fx = fixture().await;

    let (status, body) = call(
        &fx.app,
        post(
            "/config/save",
            json!({ "entries": [{ "key": "RESERVA_MANUTENCAO_MENSAL", "value": "300" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert!(
        entries
            .iter()
            .any(|e| e["key"] == json!("RESERVA_MANUTENCAO_MENSAL") && e["value"] == json!("300"))
    );

    let (status, body) = call(
        &fx.app,
        post(
            "/config/save",
            json!({ "entries": [{ "key": "no_such_key", "value": "1" }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], json!("VALIDATION"));
}
