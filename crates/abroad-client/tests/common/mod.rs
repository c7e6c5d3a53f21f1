//! In-process mock of the Abroad backend
//!
//! Serves the REST contract on a random local port and issues real HS256
//! tokens. Tests flip the switches on [`MockState`] to make endpoints reject
//! tokens or fail, and read the hit counters afterwards.
//!
//! Author: hephaex@gmail.com

#![allow(dead_code)]

use abroad_client::{AbroadClient, SessionStorage};
use abroad_core::AppConfig;
use axum::extract::{Form, Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

const SECRET: &[u8] = b"mock-backend-secret";

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: u64,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

/// File received by the upload endpoint
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub field: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

pub struct MockState {
    accounts: Mutex<HashMap<String, (String, Value)>>,
    revoked: Mutex<HashSet<String>>,
    hits: Mutex<HashMap<&'static str, usize>>,
    nonce: AtomicU64,
    posts: Mutex<Vec<Value>>,
    replies: Mutex<Vec<Value>>,
    /// Lifetime of issued tokens in seconds
    pub token_ttl: AtomicI64,
    pub fail_refresh: AtomicBool,
    /// Reject every bearer token on protected endpoints
    pub reject_all: AtomicBool,
    pub fail_chat: AtomicBool,
    pub fail_statistics: AtomicBool,
    pub last_query: Mutex<HashMap<String, String>>,
    pub last_upload: Mutex<Option<ReceivedFile>>,
}

impl MockState {
    fn new() -> Self {
        let state = Self {
            accounts: Mutex::new(HashMap::new()),
            revoked: Mutex::new(HashSet::new()),
            hits: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
            posts: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            token_ttl: AtomicI64::new(3600),
            fail_refresh: AtomicBool::new(false),
            reject_all: AtomicBool::new(false),
            fail_chat: AtomicBool::new(false),
            fail_statistics: AtomicBool::new(false),
            last_query: Mutex::new(HashMap::new()),
            last_upload: Mutex::new(None),
        };
        state.add_account("alice", "secret", None, "user");
        state.add_account("mentor_kim", "pw", Some("kim@example.com"), "mentor");
        state
    }

    fn add_account(&self, username: &str, password: &str, email: Option<&str>, role: &str) -> Value {
        let mut accounts = self.accounts.lock().unwrap();
        let user = json!({
            "id": accounts.len() + 1,
            "username": username,
            "email": email,
            "role": role,
            "is_active": true,
            "created_at": "2024-09-01T00:00:00Z",
        });
        accounts.insert(username.to_string(), (password.to_string(), user.clone()));
        user
    }

    fn hit(&self, route: &'static str) {
        *self.hits.lock().unwrap().entry(route).or_default() += 1;
    }

    /// Requests served by `route`
    pub fn hits(&self, route: &'static str) -> usize {
        self.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    /// Sign a token for `username` living `ttl_secs` (negative: already expired)
    pub fn issue_token(&self, username: &str, ttl_secs: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: username.to_string(),
            exp: now + ttl_secs,
            iat: now,
            jti: self.nonce.fetch_add(1, Ordering::SeqCst),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn token_response(&self, username: &str) -> Value {
        let ttl = self.token_ttl.load(Ordering::SeqCst);
        json!({
            "access_token": self.issue_token(username, ttl),
            "token_type": "bearer",
            "expires_in": ttl,
        })
    }

    /// Make the backend refuse `token` from now on
    pub fn revoke(&self, token: &str) {
        self.revoked.lock().unwrap().insert(token.to_string());
    }

    pub fn user(&self, username: &str) -> Value {
        self.accounts.lock().unwrap()[username].1.clone()
    }

    fn unauthorized(detail: &str) -> ApiError {
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail })))
    }

    fn decode_bearer(&self, headers: &HeaderMap, validate_exp: bool) -> Result<String, ApiError> {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| Self::unauthorized("Not authenticated"))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = validate_exp;
        let data = decode::<Claims>(token, &DecodingKey::from_secret(SECRET), &validation)
            .map_err(|_| Self::unauthorized("Could not validate credentials"))?;
        Ok(data.claims.sub)
    }

    /// Username behind a valid, unrevoked bearer token
    fn authorize(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        if self.reject_all.load(Ordering::SeqCst) {
            return Err(Self::unauthorized("Could not validate credentials"));
        }
        let username = self.decode_bearer(headers, true)?;
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();
        if self.revoked.lock().unwrap().contains(token) {
            return Err(Self::unauthorized("Token has been revoked"));
        }
        Ok(username)
    }
}

/// Running mock backend; stops when dropped
pub struct MockServer {
    pub base_url: String,
    pub state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::new());
        let app = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            handle,
        }
    }

    /// Client config pointing at this server, background monitor off
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::default();
        config.api.base_url = self.base_url.clone();
        config.api.timeout_secs = 5;
        config.session.monitor_enabled = false;
        config
    }

    pub async fn client(&self, storage: Arc<dyn SessionStorage>) -> AbroadClient {
        AbroadClient::bootstrap(self.config(), storage).await.unwrap()
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/refresh", post(refresh))
        .route("/api/v1/users/me", get(me).put(update_me))
        .route("/api/v1/users/me/statistics", get(statistics))
        .route("/api/v1/mentors/search", get(search_mentors))
        .route("/api/v1/mentors/:id", get(get_mentor))
        .route("/api/v1/forum/posts", get(list_posts).post(create_post))
        .route("/api/v1/forum/posts/:id", get(get_post))
        .route("/api/v1/forum/posts/:id/replies", get(list_replies).post(create_reply))
        .route("/api/v2/agents/chat/sessions", get(chat_sessions))
        .route(
            "/api/v2/agents/chat/sessions/:id/messages",
            get(chat_messages).post(send_chat_message),
        )
        .route("/api/v1/files/upload", post(upload))
        .with_state(state)
}

// =============================================================================
// Auth
// =============================================================================

async fn login(State(state): State<Arc<MockState>>, Form(form): Form<LoginForm>) -> ApiResult {
    state.hit("login");
    let valid = state
        .accounts
        .lock()
        .unwrap()
        .get(&form.username)
        .is_some_and(|(password, _)| *password == form.password);
    if !valid {
        return Err(MockState::unauthorized("Incorrect username or password"));
    }
    Ok(Json(state.token_response(&form.username)))
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> ApiResult {
    state.hit("register");
    let username = body["username"].as_str().unwrap_or_default().to_string();
    let password = body["password"].as_str().unwrap_or_default().to_string();
    if state.accounts.lock().unwrap().contains_key(&username) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "Username already registered" })),
        ));
    }
    let role = body["role"].as_str().unwrap_or("user");
    Ok(Json(state.add_account(
        &username,
        &password,
        body["email"].as_str(),
        role,
    )))
}

async fn refresh(State(state): State<Arc<MockState>>, headers: HeaderMap) -> ApiResult {
    state.hit("refresh");
    if state.fail_refresh.load(Ordering::SeqCst) {
        return Err(MockState::unauthorized("Refresh token expired"));
    }
    let username = state.decode_bearer(&headers, false)?;
    Ok(Json(state.token_response(&username)))
}

async fn me(State(state): State<Arc<MockState>>, headers: HeaderMap) -> ApiResult {
    state.hit("me");
    let username = state.authorize(&headers)?;
    Ok(Json(state.user(&username)))
}

async fn update_me(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(update): Json<Value>,
) -> ApiResult {
    state.hit("update_me");
    let username = state.authorize(&headers)?;
    let mut accounts = state.accounts.lock().unwrap();
    let user = &mut accounts.get_mut(&username).unwrap().1;
    if let (Some(target), Some(fields)) = (user.as_object_mut(), update.as_object()) {
        for (key, value) in fields {
            target.insert(key.clone(), value.clone());
        }
    }
    Ok(Json(user.clone()))
}

async fn statistics(State(state): State<Arc<MockState>>, headers: HeaderMap) -> ApiResult {
    state.hit("statistics");
    state.authorize(&headers)?;
    if state.fail_statistics.load(Ordering::SeqCst) {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "detail": "Statistics service unavailable" })),
        ));
    }
    Ok(Json(json!({
        "sessions_completed": 4,
        "upcoming_sessions": 1,
        "forum_posts": 2,
        "chat_sessions": 3,
        "hours_mentored": 6.5,
    })))
}

// =============================================================================
// Mentors
// =============================================================================

fn mentors() -> Vec<Value> {
    vec![
        json!({
            "id": 1, "name": "Jiwoo Park", "university": "Seoul National University",
            "major": "Computer Science", "languages": ["Korean", "English"],
            "hourly_rate": 40.0, "rating": 4.8, "review_count": 31,
            "bio": "Grad school applications", "country": "KR",
        }),
        json!({
            "id": 2, "name": "Emma Schulz", "university": "TU Munich",
            "major": "Mechanical Engineering", "languages": ["German", "English"],
            "hourly_rate": 55.0, "rating": 4.6, "review_count": 12,
            "bio": "Blocked accounts and visas", "country": "DE",
        }),
        json!({
            "id": 3, "name": "Lucas Martin", "university": "Sorbonne",
            "major": "Economics", "languages": ["French"],
            "hourly_rate": 35.0, "rating": 4.2, "review_count": 7,
            "bio": null, "country": "FR",
        }),
    ]
}

async fn search_mentors(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.hit("mentor_search");
    state.authorize(&headers)?;
    *state.last_query.lock().unwrap() = params.clone();

    let major = params.get("major").map(|m| m.to_lowercase());
    let max_price = params.get("max_price").and_then(|p| p.parse::<f64>().ok());
    let found: Vec<Value> = mentors()
        .into_iter()
        .filter(|m| {
            major.as_ref().map_or(true, |major| {
                m["major"].as_str().unwrap_or_default().to_lowercase().contains(major)
            })
        })
        .filter(|m| max_price.map_or(true, |max| m["hourly_rate"].as_f64().unwrap_or(0.0) <= max))
        .collect();
    Ok(Json(Value::Array(found)))
}

async fn get_mentor(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult {
    state.hit("mentor");
    state.authorize(&headers)?;
    if id == 0 {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "detail": "Internal server error" })),
        ));
    }
    mentors()
        .into_iter()
        .find(|m| m["id"] == id)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, Json(json!({ "detail": "Mentor not found" }))))
}

// =============================================================================
// Forum
// =============================================================================

async fn list_posts(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    state.hit("forum_list");
    state.authorize(&headers)?;
    *state.last_query.lock().unwrap() = params;
    let posts = state.posts.lock().unwrap();
    Ok(Json(Value::Array(posts.iter().rev().cloned().collect())))
}

async fn create_post(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult {
    state.hit("forum_create");
    let username = state.authorize(&headers)?;
    if body["title"].as_str().is_some_and(|t| t.contains("spam")) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "detail": [{ "loc": ["body", "title"], "msg": "Title looks like spam", "type": "value_error" }]
            })),
        ));
    }

    let author = state.user(&username);
    let mut posts = state.posts.lock().unwrap();
    let post = json!({
        "id": posts.len() + 1,
        "title": body["title"],
        "content": body["content"],
        "author_id": author["id"],
        "author_name": username,
        "category": body.get("category").cloned().unwrap_or(Value::Null),
        "tags": body.get("tags").cloned().unwrap_or_else(|| json!([])),
        "reply_count": 0,
        "view_count": 0,
        "created_at": Utc::now().to_rfc3339(),
    });
    posts.push(post.clone());
    Ok(Json(post))
}

async fn get_post(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult {
    state.hit("forum_get");
    state.authorize(&headers)?;
    state
        .posts
        .lock()
        .unwrap()
        .iter()
        .find(|p| p["id"] == id)
        .cloned()
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, Json(json!({ "detail": "Post not found" }))))
}

async fn list_replies(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> ApiResult {
    state.hit("forum_replies");
    state.authorize(&headers)?;
    let replies: Vec<Value> = state
        .replies
        .lock()
        .unwrap()
        .iter()
        .filter(|r| r["post_id"] == id)
        .cloned()
        .collect();
    Ok(Json(Value::Array(replies)))
}

async fn create_reply(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult {
    state.hit("forum_reply");
    let username = state.authorize(&headers)?;
    let author = state.user(&username);

    let mut posts = state.posts.lock().unwrap();
    let post = posts
        .iter_mut()
        .find(|p| p["id"] == id)
        .ok_or((StatusCode::NOT_FOUND, Json(json!({ "detail": "Post not found" }))))?;
    post["reply_count"] = json!(post["reply_count"].as_u64().unwrap_or(0) + 1);

    let mut replies = state.replies.lock().unwrap();
    let reply = json!({
        "id": replies.len() + 1,
        "post_id": id,
        "content": body["content"],
        "author_id": author["id"],
        "author_name": username,
        "created_at": Utc::now().to_rfc3339(),
    });
    replies.push(reply.clone());
    Ok(Json(reply))
}

// =============================================================================
// AI chat
// =============================================================================

async fn chat_sessions(State(state): State<Arc<MockState>>, headers: HeaderMap) -> ApiResult {
    state.hit("chat_sessions");
    state.authorize(&headers)?;
    if state.fail_chat.load(Ordering::SeqCst) {
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({ "detail": "Agent service unavailable" })),
        ));
    }
    Ok(Json(json!([{
        "session_id": "6f1c2a4e-8b1d-4c55-9a57-3c1a2b3c4d5e",
        "title": "Visa questions",
        "message_count": 2,
        "created_at": "2024-10-01T09:00:00Z",
    }])))
}

async fn chat_messages(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(_id): Path<String>,
) -> ApiResult {
    state.hit("chat_messages");
    state.authorize(&headers)?;
    if state.fail_chat.load(Ordering::SeqCst) {
        return Ok(Json(json!({ "unexpected": "shape" })));
    }
    Ok(Json(json!([
        { "role": "user", "content": "Do I need a visa?" },
        { "role": "assistant", "content": "Yes, a student visa." },
    ])))
}

async fn send_chat_message(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Path(_id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult {
    state.hit("chat_send");
    state.authorize(&headers)?;
    let content = body["content"].as_str().unwrap_or_default();
    Ok(Json(json!({
        "role": "assistant",
        "content": format!("You asked: {content}"),
        "created_at": Utc::now().to_rfc3339(),
    })))
}

// =============================================================================
// Files
// =============================================================================

async fn upload(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult {
    state.hit("upload");
    state.authorize(&headers)?;

    let bad_request = |_| (StatusCode::BAD_REQUEST, Json(json!({ "detail": "Bad multipart body" })));
    let Some(field) = multipart.next_field().await.map_err(bad_request)? else {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "detail": "No file" }))));
    };
    let received = ReceivedFile {
        field: field.name().unwrap_or_default().to_string(),
        filename: field.file_name().map(str::to_string),
        content_type: field.content_type().map(str::to_string),
        data: field.bytes().await.map_err(bad_request)?.to_vec(),
    };

    let response = json!({
        "id": "file-1",
        "filename": received.filename,
        "url": "/files/file-1",
        "size": received.data.len(),
        "content_type": received.content_type,
    });
    *state.last_upload.lock().unwrap() = Some(received);
    Ok(Json(response))
}
