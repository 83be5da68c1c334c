//! REST client tests against a local mock server

use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_test::{assert_err, assert_ok};
use trail_api::models::{ControlCommandRequest, CreateDeviceRequest, LoginRequest};

use trailcommand::authn::auth_code::AuthCode;
use trailcommand::errors::TrailError;
use trailcommand::http::client::HttpClient;
use trailcommand::http::devices::DeviceCreation;

async fn serve(router: Router) -> HttpClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    HttpClient::new(&format!("http://{}/", addr)).unwrap()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn device_request(device_id: &str) -> CreateDeviceRequest {
    CreateDeviceRequest {
        device_id: device_id.to_string(),
        name: "Rig".to_string(),
        device_type: "raspberry_pi".to_string(),
        description: "test rig".to_string(),
        uuid: "u-1".to_string(),
    }
}

#[tokio::test]
async fn test_login_posts_credentials() {
    let router = Router::new().route(
        "/api/auth/login",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body, json!({"email": "op@example.com", "password": "pw"}));
            Json(json!({"token": "user-token", "user": {"id": 1}}))
        }),
    );
    let client = serve(router).await;

    let response = client
        .login(&LoginRequest {
            email: Some("op@example.com".to_string()),
            username: None,
            password: "pw".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(response.token, "user-token");
}

#[tokio::test]
async fn test_create_device_conflict_means_already_exists() {
    let router = Router::new().route(
        "/api/devices",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            assert_eq!(bearer(&headers).as_deref(), Some("Bearer user-token"));
            assert_eq!(body["type"], "raspberry_pi");
            if body["device_id"] == "taken" {
                (StatusCode::CONFLICT, Json(json!({"error": "exists"})))
            } else {
                (StatusCode::CREATED, Json(json!({"ok": true})))
            }
        }),
    );
    let client = serve(router).await;

    assert_eq!(
        client.create_device("user-token", &device_request("fresh")).await.unwrap(),
        DeviceCreation::Created
    );
    assert_eq!(
        client.create_device("user-token", &device_request("taken")).await.unwrap(),
        DeviceCreation::AlreadyExists
    );
}

#[tokio::test]
async fn test_create_device_other_errors_propagate() {
    let router = Router::new().route(
        "/api/devices",
        post(|| async { (StatusCode::FORBIDDEN, "quota exceeded") }),
    );
    let client = serve(router).await;

    let result = client.create_device("user-token", &device_request("x")).await;
    match result {
        Err(TrailError::StatusError { status, body }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "quota exceeded");
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_auth_code_accepts_both_expiry_formats() {
    let router = Router::new().route(
        "/api/devices/{id}/auth-code",
        post(|Path(id): Path<String>| async move {
            if id == "iso" {
                Json(json!({"authCode": "code-iso", "expires": "2030-01-01T00:00:00Z"}))
            } else {
                Json(json!({"authCode": "code-ms", "expires": 1893456000000_i64}))
            }
        }),
    );
    let client = serve(router).await;

    let iso = client.request_auth_code("t", "iso").await.unwrap();
    let ms = client.request_auth_code("t", "ms").await.unwrap();
    let iso = AuthCode::from_response(&iso).unwrap();
    let ms = AuthCode::from_response(&ms).unwrap();
    assert_eq!(iso.expose(), "code-iso");
    assert_eq!(iso.expires_at(), ms.expires_at());
}

#[tokio::test]
async fn test_device_details_and_sensor_values() {
    let router = Router::new()
        .route(
            "/api/devices/{id}",
            get(|Path(id): Path<String>| async move {
                Json(json!({
                    "device": {"device_id": id, "name": "Rig", "status": "online"},
                    "controls": [{"control_id": "relay_1", "current_value": "true"}]
                }))
            }),
        )
        .route(
            "/api/sensors/{id}",
            get(|| async {
                Json(json!({"sensors": [{"sensor_id": "temperature", "value": 21.5}]}))
            }),
        );
    let client = serve(router).await;

    let details = client.get_device("t", "dev-1").await.unwrap();
    assert_eq!(details.device.unwrap().device_id, "dev-1");
    assert_eq!(details.controls[0].current_value, Some(json!("true")));

    let sensors = client.latest_sensor_values("t", "dev-1").await.unwrap();
    assert_eq!(sensors.sensors[0].value, json!(21.5));
}

#[tokio::test]
async fn test_control_command_and_delete() {
    let router = Router::new()
        .route(
            "/api/devices/{id}/control",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body, json!({"controlId": "relay_1", "value": true}));
                StatusCode::OK
            }),
        )
        .route(
            "/api/devices/{id}",
            delete(|Path(id): Path<String>| async move {
                if id == "dev-1" {
                    StatusCode::NO_CONTENT
                } else {
                    StatusCode::NOT_FOUND
                }
            }),
        );
    let client = serve(router).await;

    let command = ControlCommandRequest {
        control_id: "relay_1".to_string(),
        value: json!(true),
    };
    assert_ok!(client.send_control_command("t", "dev-1", &command).await);
    assert_ok!(client.delete_device("t", "dev-1").await);
    assert!(matches!(
        client.delete_device("t", "ghost").await,
        Err(TrailError::StatusError { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_device_ids_stay_one_path_segment() {
    let router = Router::new()
        .route(
            "/api/sensors/{id}",
            get(|Path(id): Path<String>| async move {
                assert_eq!(id, "rig 1/../admin?x");
                Json(json!({"sensors": []}))
            }),
        )
        .route(
            "/api/devices/{id}/control",
            post(|Path(id): Path<String>| async move {
                assert_eq!(id, "rig#2");
                StatusCode::OK
            }),
        );
    let client = serve(router).await;

    let sensors = assert_ok!(client.latest_sensor_values("t", "rig 1/../admin?x").await);
    assert!(sensors.sensors.is_empty());

    let command = ControlCommandRequest {
        control_id: "relay_1".to_string(),
        value: json!(false),
    };
    assert_ok!(client.send_control_command("t", "rig#2", &command).await);
}

#[tokio::test]
async fn test_health_check() {
    let router = Router::new().route("/health", get(|| async { "ok" }));
    let client = serve(router).await;
    assert_ok!(client.health(Duration::from_secs(2)).await);

    let router = Router::new().route(
        "/health",
        get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let client = serve(router).await;
    assert_err!(client.health(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_unreachable_server_is_a_request_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpClient::new(&format!("http://{}", addr)).unwrap();
    assert_err!(client.health(Duration::from_secs(1)).await);
    assert_eq!(client.base_url(), format!("http://{}/api", addr));
}
