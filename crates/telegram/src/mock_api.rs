//! In-process stand-in for the Bot API used by the unit tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use {
    axum::{Json, Router, body::Bytes, extract::State, http::Uri, routing::post},
    serde_json::{Value, json},
    teloxide::Bot,
};

#[derive(Debug, Clone)]
pub struct Captured {
    /// Lower-cased method name, e.g. `sendmessage`.
    pub method: String,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct MockTelegramApi {
    requests: Arc<Mutex<Vec<Captured>>>,
    scripted: Arc<Mutex<HashMap<String, VecDeque<Value>>>>,
    reject_html: Arc<Mutex<bool>>,
}

impl MockTelegramApi {
    /// Queue a full response body for the next call to `method`.
    pub fn script(&self, method: &str, response: Value) {
        self.scripted
            .lock()
            .unwrap()
            .entry(method.to_ascii_lowercase())
            .or_default()
            .push_back(response);
    }

    /// Answer every HTML-formatted send or edit with an entity parse error.
    pub fn reject_html(&self) {
        *self.reject_html.lock().unwrap() = true;
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        let method = method.to_ascii_lowercase();
        self.requests()
            .into_iter()
            .filter(|c| c.method == method)
            .map(|c| c.body)
            .collect()
    }

    /// Serve on an ephemeral port and return a bot pointed at it.
    pub async fn serve(&self) -> Bot {
        let app = Router::new()
            .route("/{*path}", post(handler))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Bot::new("test-token")
            .set_api_url(reqwest::Url::parse(&format!("http://{addr}/")).unwrap())
    }
}

pub fn api_error(code: u16, description: &str) -> Value {
    json!({ "ok": false, "error_code": code, "description": description })
}

pub fn message_json(chat_id: i64, message_id: i32, text: &str) -> Value {
    json!({
        "message_id": message_id,
        "date": 1,
        "chat": { "id": chat_id, "type": "private", "first_name": "Alice" },
        "from": { "id": 1001, "is_bot": false, "first_name": "Alice", "username": "alice" },
        "text": text,
    })
}

async fn handler(State(api): State<MockTelegramApi>, uri: Uri, body: Bytes) -> Json<Value> {
    let method = uri
        .path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    api.requests.lock().unwrap().push(Captured {
        method: method.clone(),
        body: body.clone(),
    });

    if let Some(response) = api
        .scripted
        .lock()
        .unwrap()
        .get_mut(&method)
        .and_then(VecDeque::pop_front)
    {
        return Json(response);
    }

    let html = body.get("parse_mode").and_then(Value::as_str) == Some("HTML");
    if html && *api.reject_html.lock().unwrap() {
        return Json(api_error(
            400,
            "Bad Request: can't parse entities: unsupported start tag",
        ));
    }

    let chat_id = body.get("chat_id").and_then(Value::as_i64).unwrap_or(42);
    let text = body.get("text").and_then(Value::as_str).unwrap_or_default();
    let result = match method.as_str() {
        "sendmessage" => message_json(chat_id, 100, text),
        "editmessagetext" => {
            let id = body.get("message_id").and_then(Value::as_i64).unwrap_or(100);
            message_json(chat_id, i32::try_from(id).unwrap(), text)
        },
        "getupdates" => json!([]),
        "getme" => json!({
            "id": 7,
            "is_bot": true,
            "first_name": "Parley",
            "username": "parley_bot",
            "can_join_groups": true,
            "can_read_all_group_messages": false,
            "supports_inline_queries": false,
            "can_connect_to_business": false,
            "has_main_web_app": false,
        }),
        _ => json!(true),
    };
    Json(json!({ "ok": true, "result": result }))
}
