//! End-to-end HTTP tests against a server bound to an ephemeral port

use serde_json::{json, Value};
use solar_feasibility::config::{ConfigBuilder, EmbeddingProviderKind, LlmProviderKind};
use solar_feasibility::{api, AppContext};
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let path = |name: &str| dir.path().join(name).display().to_string();
        let config = ConfigBuilder::new()
            .dataset_path(path("missing.csv"))
            .policy_docs_path(path("policies"))
            .vector_db_path(path("vector_db"))
            .electricity_price_path(path("price.json"))
            .embedding_provider(EmbeddingProviderKind::Hashing)
            .llm_provider(LlmProviderKind::Disabled)
            .build()
            .unwrap();

        let ctx = AppContext::initialize(config).await.unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(api::serve(listener, ctx, std::future::pending()));

        Self {
            addr,
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health_reports_service_and_version() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health").await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], solar_feasibility::VERSION);
    assert!(body["service"].as_str().unwrap().contains("Solar"));
}

#[tokio::test]
async fn test_analyze_returns_full_outcome() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post(
            "/api/analyze",
            json!({
                "location": "Hamburg",
                "roof_area": 50,
                "orientation": "south",
                "weather_analysis": "hybrid",
                "budget": 25000
            }),
        )
        .await;

    assert_eq!(status, 200, "{body}");
    assert_eq!(body["location"], "Hamburg");
    assert!(body["request_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(body["solar_potential"]["monthly_production"].as_array().unwrap().len(), 12);
    assert!(body["solar_potential"]["annual_kwh"].as_f64().unwrap() > 1_000.0);
    assert!(body["financial_analysis"]["total_investment"].as_f64().unwrap() > 0.0);
    assert_eq!(body["report_tier"], "enhanced_template");
    assert_eq!(body["feasibility_report"]["generation_tier"], "enhanced_template");
    assert!(!body["recommendations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_analyze_rejects_invalid_input_with_field_details() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post(
            "/api/analyze",
            json!({ "location": "", "roof_area": -5, "orientation": "upwards" }),
        )
        .await;

    assert_eq!(status, 422);
    let details = body["details"].as_object().unwrap();
    assert!(details.contains_key("location"));
    assert!(details.contains_key("roof_area"));
    assert!(details.contains_key("orientation"));
}

#[tokio::test]
async fn test_malformed_json_is_a_bad_request() {
    let server = TestServer::start().await;
    let resp = server
        .client
        .post(server.url("/api/analyze"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn test_weather_endpoint_serves_series_and_mode_averages() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/api/weather/Hamburg").await;

    assert_eq!(status, 200);
    assert_eq!(body["resolved_location"], "Hamburg");
    assert_eq!(body["approximate"], false);
    assert!(!body["monthly_records"].as_array().unwrap().is_empty());
    for mode in ["latest", "historical", "hybrid"] {
        assert_eq!(body["mode_averages"][mode].as_array().unwrap().len(), 12);
    }

    let (_, fallback) = server.get("/api/weather/Atlantis").await;
    assert_eq!(fallback["approximate"], true);
}

#[tokio::test]
async fn test_reference_endpoints_list_locations_and_modes() {
    let server = TestServer::start().await;

    let (_, locations) = server.get("/api/locations").await;
    assert_eq!(locations["count"], 10);

    let (_, modes) = server.get("/api/weather-analysis-options").await;
    assert_eq!(modes["default"], "hybrid");
    assert_eq!(modes["options"].as_array().unwrap().len(), 3);

    let (_, policies) = server.get("/api/policies/summary").await;
    assert!(policies["document_count"].as_u64().unwrap() >= 7);
}

#[tokio::test]
async fn test_manual_price_update_is_validated_and_persisted() {
    let server = TestServer::start().await;

    let (status, _) = server
        .post("/api/electricity-price/update-manual", json!({ "price": 5.0 }))
        .await;
    assert_eq!(status, 422);

    let (status, body) = server
        .post("/api/electricity-price/update-manual", json!({ "price": 0.38 }))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["price"]["source"], "manual_update");

    let (_, current) = server.get("/api/electricity-price").await;
    assert_eq!(current["electricity_price_eur_per_kwh"], 0.38);
}

#[tokio::test]
async fn test_rag_status_and_refresh() {
    let server = TestServer::start().await;

    let (_, status) = server.get("/api/rag/status").await;
    assert_eq!(status["llm_backend"], "disabled");
    assert_eq!(status["vector_available"], true);

    let (code, refreshed) = server.post("/api/rag/refresh", json!({})).await;
    assert_eq!(code, 200);
    assert_eq!(refreshed["summary"]["vector_available"], true);
}
