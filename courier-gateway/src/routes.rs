//! HTTP routes: user lookups, registration, login and static assets.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::auth::{create_token, hash_password, sanitize_file_name, verify_password};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::store::{IdentityStore, StoreError, UserProfile, UserRecord};

/// Shared handler state.
pub struct GatewayState<S> {
    pub store: Arc<S>,
    pub config: Arc<GatewayConfig>,
}

impl<S> GatewayState<S> {
    pub fn new(store: S, config: GatewayConfig) -> Self {
        Self {
            store: Arc::new(store),
            config: Arc::new(config),
        }
    }
}

impl<S> Clone for GatewayState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Build the gateway router for `state`.
pub fn router<S: IdentityStore>(state: GatewayState<S>) -> Router {
    let assets = ServeDir::new(&state.config.assets_dir);
    let body_limit = state.config.body_limit_bytes;

    Router::new()
        .route("/getFriends", get(get_friends::<S>))
        .route("/getFullname", get(get_full_name::<S>))
        .route("/getID", get(get_id::<S>))
        .route("/auth/checkUsername", get(check_username::<S>))
        .route("/auth/checkEmail", get(check_email::<S>))
        .route("/auth/register", post(register::<S>))
        .route("/auth/login", post(login::<S>))
        .nest_service("/assets", assets)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn lookup<S: IdentityStore>(store: &S, username: &str) -> Result<UserRecord, GatewayError> {
    store
        .find_by_username(username)
        .await
        .ok_or_else(|| GatewayError::UserNotFound(username.to_string()))
}

async fn get_friends<S: IdentityStore>(
    State(state): State<GatewayState<S>>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<Value>, GatewayError> {
    let user = lookup(&*state.store, &query.username).await?;
    Ok(Json(json!({ "friends": user.friends })))
}

async fn get_full_name<S: IdentityStore>(
    State(state): State<GatewayState<S>>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<Value>, GatewayError> {
    let user = lookup(&*state.store, &query.username).await?;
    Ok(Json(json!({ "fullName": user.full_name })))
}

async fn get_id<S: IdentityStore>(
    State(state): State<GatewayState<S>>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<Value>, GatewayError> {
    let user = lookup(&*state.store, &query.username).await?;
    Ok(Json(json!({ "_id": user.id })))
}

async fn check_username<S: IdentityStore>(
    State(state): State<GatewayState<S>>,
    Query(query): Query<UsernameQuery>,
) -> Json<Value> {
    let exists = state.store.find_by_username(&query.username).await.is_some();
    Json(json!({ "exists": exists }))
}

async fn check_email<S: IdentityStore>(
    State(state): State<GatewayState<S>>,
    Query(query): Query<EmailQuery>,
) -> Json<Value> {
    let exists = state.store.find_by_email(&query.email).await.is_some();
    Json(json!({ "exists": exists }))
}

/// Fields collected from a registration form.
#[derive(Default)]
struct RegisterForm {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
    full_name: Option<String>,
    friends: Vec<String>,
    picture: Option<(Option<String>, Vec<u8>)>,
}

fn required(value: Option<String>, field: &str) -> Result<String, GatewayError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(GatewayError::bad_request(format!("Missing field '{field}'"))),
    }
}

async fn read_register_form(mut multipart: Multipart) -> Result<RegisterForm, GatewayError> {
    let mut form = RegisterForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "username" => form.username = Some(field.text().await?),
            "email" => form.email = Some(field.text().await?),
            "password" => form.password = Some(field.text().await?),
            "fullName" => form.full_name = Some(field.text().await?),
            "friends" => {
                let friend = field.text().await?;
                if !friend.is_empty() {
                    form.friends.push(friend);
                }
            }
            "picture" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                if !data.is_empty() {
                    form.picture = Some((file_name, data.to_vec()));
                }
            }
            other => log::debug!("Ignoring registration field '{other}'"),
        }
    }
    Ok(form)
}

async fn register<S: IdentityStore>(
    State(state): State<GatewayState<S>>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UserProfile>), GatewayError> {
    let form = read_register_form(multipart).await?;
    let username = required(form.username, "username")?;
    let email = required(form.email, "email")?;
    let password = required(form.password, "password")?;
    let full_name = required(form.full_name, "fullName")?;

    // Checked before the upload is written; `insert` re-checks under its lock
    if state.store.find_by_username(&username).await.is_some() {
        return Err(StoreError::UsernameTaken(username).into());
    }
    if state.store.find_by_email(&email).await.is_some() {
        return Err(StoreError::EmailTaken(email).into());
    }

    let id = Uuid::new_v4();
    let password_hash = hash_password(&password, state.config.bcrypt_cost)?;

    // Prefixed with the user id so equal upload names never collide
    let picture_path = match form.picture {
        Some((file_name, data)) => {
            let file_name = file_name
                .as_deref()
                .and_then(sanitize_file_name)
                .ok_or_else(|| GatewayError::bad_request("Invalid picture file name"))?;
            let stored_name = format!("{id}-{file_name}");
            tokio::fs::create_dir_all(&state.config.assets_dir).await?;
            tokio::fs::write(state.config.assets_dir.join(&stored_name), &data).await?;
            log::debug!("Stored picture {stored_name} ({} bytes)", data.len());
            Some(stored_name)
        }
        None => None,
    };

    let record = UserRecord {
        id,
        username,
        email,
        full_name,
        password_hash,
        friends: form.friends,
        picture_path,
    };
    let stored_picture = record.picture_path.clone();
    let user = match state.store.insert(record).await {
        Ok(user) => user,
        Err(e) => {
            // Lost a race with a concurrent registration
            discard_picture(&state.config, stored_picture.as_deref()).await;
            return Err(e.into());
        }
    };
    log::info!("Registered user {}", user.username);

    Ok((StatusCode::CREATED, Json(UserProfile::from(&user))))
}

/// Remove an upload whose registration was rejected.
async fn discard_picture(config: &GatewayConfig, picture_path: Option<&str>) {
    let Some(name) = picture_path else {
        return;
    };
    if let Err(e) = tokio::fs::remove_file(config.assets_dir.join(name)).await {
        log::warn!("Failed to remove rejected upload {name}: {e}");
    }
}

async fn login<S: IdentityStore>(
    State(state): State<GatewayState<S>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, GatewayError> {
    let user = state
        .store
        .find_by_username(&request.username)
        .await
        .ok_or(GatewayError::InvalidCredentials)?;

    if !verify_password(&request.password, &user.password_hash) {
        log::debug!("Rejected login for {}", request.username);
        return Err(GatewayError::InvalidCredentials);
    }

    let token = create_token(&user, &state.config.jwt_secret, state.config.token_ttl_secs)?;
    log::info!("User {} logged in", user.username);
    Ok(Json(LoginResponse {
        token,
        user: UserProfile::from(&user),
    }))
}
