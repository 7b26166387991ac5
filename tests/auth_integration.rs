use sessiond::configuration::{get_configuration, DatabaseSettings};
use sessiond::startup::run;
use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let jwt_config = configuration.jwt.clone();
    let server =
        run(listener, connection_pool.clone(), jwt_config).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn register_user(app: &TestApp, client: &reqwest::Client, email: &str) -> Value {
    let body = json!({
        "name": "Test User",
        "email": email,
        "password": "SecurePass123"
    });

    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(201, response.status().as_u16());

    response.json().await.expect("Failed to parse response")
}

// --- Registration Tests ---

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn register_returns_201_and_a_token_pair() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let body = register_user(&app, &client, "john@example.com").await;

    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());
    assert_eq!(body["token_type"], "Bearer");

    // Registration opens exactly one session.
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count sessions");
    assert_eq!(count.0, 1);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn register_returns_400_for_invalid_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let invalid_emails = vec!["notanemail", "user@", "@example.com", "user@@example.com"];

    for invalid_email in invalid_emails {
        let body = json!({
            "name": "Test User",
            "email": invalid_email,
            "password": "SecurePass123"
        });

        let response = client
            .post(&format!("{}/auth/register", &app.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(
            400,
            response.status().as_u16(),
            "Should reject invalid email: {}",
            invalid_email
        );
    }
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn register_returns_409_for_duplicate_email() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "john@example.com").await;

    let body = json!({
        "name": "John Again",
        "email": "john@example.com",
        "password": "OtherPass456"
    });
    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(
        409,
        response.status().as_u16(),
        "Should reject duplicate email with 409 Conflict"
    );
}

// --- Login Tests ---

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn login_returns_200_for_valid_credentials() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "alice@example.com").await;

    let response = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "alice@example.com", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn login_failure_is_identical_for_unknown_email_and_wrong_password() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "alice@example.com").await;

    let unknown_email = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "nobody@example.com", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");
    let wrong_password = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "alice@example.com", "password": "WrongPass123"}))
        .send()
        .await
        .expect("Failed to execute request.");

    // Anti-enumeration: same status and same error code either way.
    assert_eq!(401, unknown_email.status().as_u16());
    assert_eq!(401, wrong_password.status().as_u16());

    let body_a: Value = unknown_email.json().await.unwrap();
    let body_b: Value = wrong_password.json().await.unwrap();
    assert_eq!(body_a["code"], body_b["code"]);
    assert_eq!(body_a["message"], body_b["message"]);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn two_logins_create_two_independent_sessions() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "alice@example.com").await;

    for _ in 0..2 {
        let response = client
            .post(&format!("{}/auth/login", &app.address))
            .json(&json!({"email": "alice@example.com", "password": "SecurePass123"}))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(200, response.status().as_u16());
    }

    // register + 2 logins
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count sessions");
    assert_eq!(count.0, 3);
}

// --- Refresh / Rotation Tests ---

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn refresh_rotates_the_token_and_consumes_the_old_one() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let registered = register_user(&app, &client, "alice@example.com").await;
    let token_a = registered["refresh_token"].as_str().unwrap();

    // First rotation succeeds.
    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": token_a }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    let token_b = body["refresh_token"].as_str().unwrap();
    assert_ne!(token_a, token_b);

    // Replaying the consumed token fails like any bad credential.
    let replay = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": token_a }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, replay.status().as_u16());

    let replay_body: Value = replay.json().await.unwrap();
    assert_eq!(replay_body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn replaying_a_consumed_token_revokes_every_device() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register_user(&app, &client, "alice@example.com").await;

    // Two devices log in.
    let mut tokens = Vec::new();
    for _ in 0..2 {
        let response = client
            .post(&format!("{}/auth/login", &app.address))
            .json(&json!({"email": "alice@example.com", "password": "SecurePass123"}))
            .send()
            .await
            .expect("Failed to execute request.");
        let body: Value = response.json().await.unwrap();
        tokens.push(body["refresh_token"].as_str().unwrap().to_string());
    }

    // Device 1 rotates, then its old token is replayed.
    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": &tokens[0] }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let replay = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": &tokens[0] }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, replay.status().as_u16());

    // Device 2's still-unrotated token is dead too: mass revocation fired.
    let device_2 = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": &tokens[1] }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, device_2.status().as_u16());

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count sessions");
    assert_eq!(count.0, 0);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn refresh_with_garbage_token_returns_401() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": "not-a-real-token" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

// --- Logout Tests ---

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn logout_is_idempotent_and_closes_only_one_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let registered = register_user(&app, &client, "alice@example.com").await;
    let refresh_token = registered["refresh_token"].as_str().unwrap();

    for _ in 0..2 {
        let response = client
            .post(&format!("{}/auth/logout", &app.address))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .expect("Failed to execute request.");
        assert_eq!(200, response.status().as_u16());
    }

    // The logged-out token no longer refreshes.
    let response = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": refresh_token }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn logout_all_revokes_every_session() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let registered = register_user(&app, &client, "alice@example.com").await;
    let access_token = registered["access_token"].as_str().unwrap();

    let login: Value = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "alice@example.com", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .unwrap();

    let response = client
        .post(&format!("{}/auth/logout-all", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["revoked_sessions"], 2);

    let refresh = client
        .post(&format!("{}/auth/refresh", &app.address))
        .json(&json!({ "refresh_token": login["refresh_token"].as_str().unwrap() }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, refresh.status().as_u16());
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn logout_all_requires_authentication() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(&format!("{}/auth/logout-all", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

// --- Current User Tests ---

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn me_returns_current_user_with_valid_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let registered = register_user(&app, &client, "alice@example.com").await;
    let access_token = registered["access_token"].as_str().unwrap();

    let response = client
        .get(&format!("{}/auth/me", &app.address))
        .header("Authorization", format!("Bearer {}", access_token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["name"], "Test User");
}

#[tokio::test]
#[ignore = "requires running PostgreSQL database"]
async fn me_returns_401_without_token() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!("{}/auth/me", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}
