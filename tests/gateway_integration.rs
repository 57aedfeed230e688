use dataset_gateway::{AppState, MemoryStore, ServerSettings};
use reqwest::{multipart, Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    async fn get_as(&self, path: &str, peername: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("x-peername", peername)
            .send()
            .await
    }

    async fn post(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn post_form(
        &self,
        path: &str,
        form: multipart::Form,
    ) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .multipart(form)
            .send()
            .await
    }

    async fn delete(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
    }
}

/// Bind a seeded server on an ephemeral port; cancel the token to stop it
async fn start_server(settings: ServerSettings) -> (TestClient, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let shutdown = CancellationToken::new();
    let state = AppState::new(MemoryStore::seeded(), settings).with_shutdown(shutdown.clone());
    tokio::spawn(async move {
        dataset_gateway::serve(listener, state).await.unwrap();
    });

    (TestClient::new(format!("http://{}", address)), shutdown)
}

#[tokio::test]
async fn test_history_pagination_across_fallback() {
    let (client, shutdown) = start_server(ServerSettings::default()).await;

    // Local history, paginated by the store
    let response = client.get("/history/peer/movies?limit=2").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["meta"]["code"], 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["next_url"], "/history/peer/movies?limit=2&offset=2");

    // Registry-only dataset, resliced locally: 30 versions, window [25, 35)
    let response = client
        .get("/history/registry_peer/census?offset=25&limit=10")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
    assert_eq!(body["pagination"]["page"], 3);
    assert_eq!(body["pagination"]["offset"], 20);
    assert!(body["pagination"].get("next_url").is_none());
    assert_eq!(body["data"][0]["foreign"], true);

    // Named remote
    let response = client
        .get("/history/registry_peer/census?remote=archive")
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    // Local demanded but absent
    let response = client
        .get("/history/registry_peer/census?local=true")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // Empty history is terminal
    let response = client.get("/history/peer/empty").await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 422);

    shutdown.cancel();
}

#[tokio::test]
async fn test_history_with_version_marker_segment() {
    let (client, shutdown) = start_server(ServerSettings::default()).await;

    let body: Value = client
        .get("/history/peer/movies")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let path = body["data"][1]["path"].as_str().unwrap().to_string();

    let response = client
        .get(&format!("/history/peer/movies/at{}", path))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["data"][0]["path"], path.as_str());

    shutdown.cancel();
}

#[tokio::test]
async fn test_save_publish_and_list() {
    let (client, shutdown) = start_server(ServerSettings::default()).await;

    let body_part = multipart::Part::bytes(b"species,count\nwren,3\nrobin,5\n".to_vec())
        .file_name("birds.csv")
        .mime_str("text/csv")
        .unwrap();
    let form = multipart::Form::new()
        .text("title", "first count")
        .text("message", "spring survey")
        .part("body", body_part);

    let response = client.post_form("/save/peer/birds", form).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["meta"]["code"], 201);
    assert_eq!(body["data"]["commit_title"], "first count");
    assert_eq!(body["data"]["body_rows"], 2);

    let response = client
        .get("/get/peer/birds/body.csv")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.text().await.unwrap(),
        "species,count\nwren,3\nrobin,5\n"
    );

    let response = client
        .post("/publish/peer/birds", json!({"remote": "registry"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["published"], true);

    let body: Value = client
        .get("/list?published=true")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["name"].as_str())
        .collect();
    assert_eq!(names, vec!["birds"]);

    let response = client.delete("/publish/peer/birds").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["published"], false);

    shutdown.cancel();
}

#[tokio::test]
async fn test_read_only_server() {
    let settings = ServerSettings {
        read_only: true,
        ..Default::default()
    };
    let (client, shutdown) = start_server(settings).await;

    let response = client.post("/publish/peer/movies", json!({})).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "/publish is not available in read-only mode");

    let response = client
        .post("/sql", json!({"query": "SELECT * FROM peer/movies"}))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client.get("/get/peer/movies").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = client.get("/health").await.unwrap().json().await.unwrap();
    assert_eq!(body["read_only"], true);

    shutdown.cancel();
}

#[tokio::test]
async fn test_zip_export_and_profile_images() {
    let (client, shutdown) = start_server(ServerSettings::default()).await;

    let response = client.get("/get/peer/movies?format=zip").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    assert_eq!(
        response.headers()["content-disposition"],
        "attachment; filename=\"movies.zip\""
    );
    // Local file header signature
    assert!(response.bytes().await.unwrap().starts_with(b"PK\x03\x04"));

    let response = client.get("/get/peer/movies/meta?format=zip").await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.get_as("/profile/photo", "peer").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");

    let response = client.get("/profile/poster").await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client.get("/profile/poster?peername=ghost").await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    shutdown.cancel();
}
