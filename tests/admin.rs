//! Admin API tests.

mod common;

use reqwest::header::HOST;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use url::form_urlencoded;

use common::{start_echo_backend, start_proxy, test_config};
use vault_proxy::action::ActionContext;
use vault_proxy::admin::{self, AdminState};
use vault_proxy::http::AppState;
use vault_proxy::storage::MemoryStorage;
use vault_proxy::transformer::FieldTransformer;
use vault_proxy::Shutdown;

const KEY: &str = "test-key";

struct Admin {
    url: String,
    client: reqwest::Client,
    _shutdown: Shutdown,
}

impl Admin {
    async fn start(storage: MemoryStorage) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/admin", listener.local_addr().unwrap());
        let shutdown = Shutdown::new();

        let state = AdminState::new(Arc::new(storage), KEY, ActionContext::default());
        tokio::spawn(admin::serve(listener, state, shutdown.subscribe()));

        Self {
            url,
            client: reqwest::Client::new(),
            _shutdown: shutdown,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(format!("{}{}", self.url, path)).bearer_auth(KEY).send().await.unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.url, path))
            .bearer_auth(KEY)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn delete(&self, path: &str) -> reqwest::Response {
        self.client.delete(format!("{}{}", self.url, path)).bearer_auth(KEY).send().await.unwrap()
    }
}

fn card_route() -> Value {
    json!({
        "direction": "inbound",
        "method": "post",
        "path": "/payments",
        "fields": "card_number, cvv",
        "action": { "type": "mask", "mask_char": "#", "keep_last": 4 }
    })
}

#[tokio::test]
async fn test_requires_bearer_key() {
    let admin = Admin::start(MemoryStorage::new()).await;

    let res = reqwest::get(format!("{}/status", admin.url)).await.unwrap();
    assert_eq!(res.status(), 401);

    let res = admin
        .client
        .get(format!("{}/status", admin.url))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = admin.get("/status").await;
    assert_eq!(res.status(), 200);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["vaults"], 0);
}

#[tokio::test]
async fn test_vault_lifecycle() {
    let admin = Admin::start(MemoryStorage::new()).await;

    let res = admin.post("/vaults", json!({ "id": "vlt1", "upstream": "http://127.0.0.1:3000" })).await;
    assert_eq!(res.status(), 201);

    let res = admin.post("/vaults", json!({ "id": "vlt1", "upstream": "http://127.0.0.1:3000" })).await;
    assert_eq!(res.status(), 409);

    let res = admin.post("/vaults", json!({ "id": "bad.id", "upstream": "http://127.0.0.1:3000" })).await;
    assert_eq!(res.status(), 400);

    let res = admin.post("/vaults", json!({ "id": "vlt2", "upstream": "https://secure.example" })).await;
    assert_eq!(res.status(), 400);

    let vaults: Value = admin.get("/vaults").await.json().await.unwrap();
    assert_eq!(vaults.as_array().unwrap().len(), 1);
    assert_eq!(vaults[0]["id"], "vlt1");

    assert_eq!(admin.get("/vaults/vlt1").await.status(), 200);
    assert_eq!(admin.delete("/vaults/vlt1").await.status(), 204);
    assert_eq!(admin.get("/vaults/vlt1").await.status(), 404);
    assert_eq!(admin.delete("/vaults/vlt1").await.status(), 404);
}

#[tokio::test]
async fn test_route_lifecycle() {
    let admin = Admin::start(MemoryStorage::new()).await;
    admin.post("/vaults", json!({ "id": "vlt1", "upstream": "http://127.0.0.1:3000" })).await;

    let res = admin.post("/vaults/vlt1/routes", card_route()).await;
    assert_eq!(res.status(), 201);
    let created: Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("rt_"));
    assert_eq!(created["vault_id"], "vlt1");
    assert_eq!(created["method"], "POST");
    assert_eq!(created["fields"], json!(["card_number", "cvv"]));

    let res = admin.post("/vaults/vlt1/routes", card_route()).await;
    assert_eq!(res.status(), 409);

    let got: Value = admin.get(&format!("/vaults/vlt1/routes/{}", id)).await.json().await.unwrap();
    assert_eq!(got, created);

    let routes: Value = admin.get("/vaults/vlt1/routes").await.json().await.unwrap();
    assert_eq!(routes.as_array().unwrap().len(), 1);

    assert_eq!(admin.delete(&format!("/vaults/vlt1/routes/{}", id)).await.status(), 204);
    assert_eq!(admin.get(&format!("/vaults/vlt1/routes/{}", id)).await.status(), 404);

    admin.post("/vaults/vlt1/routes", card_route()).await;
    assert_eq!(admin.delete("/vaults/vlt1/routes").await.status(), 204);
    let routes: Value = admin.get("/vaults/vlt1/routes").await.json().await.unwrap();
    assert!(routes.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_routes_rejected() {
    let admin = Admin::start(MemoryStorage::new()).await;
    admin.post("/vaults", json!({ "id": "vlt1", "upstream": "http://127.0.0.1:3000" })).await;

    let mut no_fields = card_route();
    no_fields["fields"] = json!("");
    assert_eq!(admin.post("/vaults/vlt1/routes", no_fields).await.status(), 400);

    let mut unknown_action = card_route();
    unknown_action["action"] = json!({ "type": "encrypt" });
    assert_eq!(admin.post("/vaults/vlt1/routes", unknown_action).await.status(), 400);

    let mut append_without_suffix = card_route();
    append_without_suffix["action"] = json!({ "type": "append" });
    assert_eq!(admin.post("/vaults/vlt1/routes", append_without_suffix).await.status(), 400);

    let mut relative_path = card_route();
    relative_path["path"] = json!("payments");
    assert_eq!(admin.post("/vaults/vlt1/routes", relative_path).await.status(), 400);

    assert_eq!(admin.post("/vaults/missing/routes", card_route()).await.status(), 404);
}

#[tokio::test]
async fn test_created_route_applies_to_live_traffic() {
    let backend = start_echo_backend("", false).await;
    let storage = MemoryStorage::new();
    let admin = Admin::start(storage.clone()).await;

    let state = AppState::new(&test_config(), Arc::new(storage))
        .with_transformer(Arc::new(FieldTransformer::new(ActionContext::default())));
    let (proxy, _shutdown) = start_proxy(&test_config(), state).await;

    admin.post("/vaults", json!({ "id": "vlt1", "upstream": backend.url() })).await;
    let res = admin.post("/vaults/vlt1/routes", card_route()).await;
    assert_eq!(res.status(), 201);

    let res = reqwest::Client::new()
        .post(format!("{}/payments", proxy))
        .header(HOST, "vlt1.proxy.test")
        .header("content-type", "application/x-www-form-urlencoded")
        .body("card_number=4111111111111111&cvv=123&amount=10")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), 200);

    // The mask character is re-encoded on the wire.
    let forwarded = backend.last_body().unwrap();
    assert_eq!(forwarded, "card_number=%23%23%23%23%23%23%23%23%23%23%23%231111&cvv=123&amount=10");
    let pairs: Vec<(String, String)> = form_urlencoded::parse(&forwarded).into_owned().collect();
    assert_eq!(pairs[0], ("card_number".to_string(), "############1111".to_string()));
    assert_eq!(pairs[1], ("cvv".to_string(), "123".to_string()));
}

#[tokio::test]
async fn test_vault_id_must_be_lowercase_host_label() {
    let admin = Admin::start(MemoryStorage::new()).await;

    for bad in ["Tenant1", "a.b", "", "under_score"] {
        let res = admin.post("/vaults", json!({ "id": bad, "upstream": "http://127.0.0.1:3000" })).await;
        assert_eq!(res.status(), 400, "{}", bad);
    }

    let res = admin.post("/vaults", json!({ "id": "tenant1", "upstream": "http://127.0.0.1:3000" })).await;
    assert_eq!(res.status(), 201);
}
