//! Integration tests for the catalog client against a mock HTTP server

use serde_json::json;
use tunedock_catalog_client::{CatalogClient, CatalogError, SearchScope};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn search_parses_results() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "Midnight Drive Artist"))
        .and(query_param("filter", "songs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "title": "Midnight Drive",
                "artists": [{"name": "Artist"}],
                "videoId": "abc123",
                "thumbnails": [{"url": "http://img.example/1.jpg"}]
            }
        ])))
        .mount(&server)
        .await;

    let client = CatalogClient::new(server.uri()).unwrap();
    let results = client
        .search("Midnight Drive Artist", SearchScope::Songs)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "Midnight Drive");
    assert_eq!(results[0].video_id, "abc123");
    assert_eq!(results[0].artists[0].name, "Artist");
}

#[tokio::test]
async fn search_surfaces_api_errors() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "bad filter"})),
        )
        .mount(&server)
        .await;

    let client = CatalogClient::new(server.uri()).unwrap();
    let err = client
        .search("anything", SearchScope::Videos)
        .await
        .unwrap_err();

    match err {
        CatalogError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "bad filter");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn lyrics_missing_yields_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/lyrics/abc123"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = CatalogClient::new(server.uri()).unwrap();
    let lyrics = client.lyrics("abc123").await.unwrap();
    assert!(lyrics.is_none());
}

#[tokio::test]
async fn lyrics_found_parses_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/lyrics/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lyrics": "la la la",
            "source": "Provider"
        })))
        .mount(&server)
        .await;

    let client = CatalogClient::new(server.uri()).unwrap();
    let lyrics = client.lyrics("abc123").await.unwrap().unwrap();
    assert_eq!(lyrics.lyrics, "la la la");
    assert_eq!(lyrics.source.as_deref(), Some("Provider"));
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;

    // First response is a 500, then the mock falls through to the success arm.
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = CatalogClient::new(server.uri()).unwrap().with_max_retries(2);
    let results = client.search("anything", SearchScope::Songs).await.unwrap();
    assert!(results.is_empty());
}
