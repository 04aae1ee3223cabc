//! End-to-end migration flow against a mock catalog

use std::path::Path;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tunedock_worker::jobs::migration::MigrationParams;
use tunedock_worker::matcher::FallbackPolicy;
use tunedock_worker::playlist::PlaylistOptions;
use tunedock_worker::registry::LogMessage;
use tunedock_worker::{Config, Manager};

fn test_config(root: &Path, catalog_url: &str) -> Config {
    Config {
        audio_dir: root.join("music"),
        lyrics_dir: root.join("music/lyrics"),
        playlist_dir: root.join("music/playlists"),
        data_dir: root.join("data"),
        catalog_url: catalog_url.to_string(),
        tool: "yt-dlp".to_string(),
        quality: "best".to_string(),
        codec: "mp3".to_string(),
        match_threshold: 0.85,
        fallback: FallbackPolicy::Manual,
        playlist_options: PlaylistOptions::default(),
    }
}

async fn mock_two_candidates(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("filter", "songs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "title": "Midnight Drive",
                "artists": [{"name": "Artist"}],
                "videoId": "vid-exact",
                "thumbnails": [{"url": "http://img.example/exact.jpg"}]
            },
            {
                "title": "Midnight Driver",
                "artists": [{"name": "Artist"}],
                "videoId": "vid-close",
                "thumbnails": []
            }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn manual_choice_select_renames_the_file() {
    let server = MockServer::start().await;
    mock_two_candidates(&server).await;

    let root = tempfile::tempdir().unwrap();
    let manager = Manager::new(test_config(root.path(), &server.uri())).unwrap();

    // An empty file: tag reading fails, identity comes from the filename.
    let audio_dir = root.path().join("music");
    std::fs::create_dir_all(&audio_dir).unwrap();
    let original = audio_dir.join("Artist - Midnight Drive.mp3");
    std::fs::write(&original, b"").unwrap();

    let job_id = manager.start_migration(Some(MigrationParams {
        threshold: 0.85,
        fallback: FallbackPolicy::Manual,
    }));
    let mut stream = manager.stream_logs(&job_id).unwrap();

    let mut saw_choice = false;
    let mut saw_end = false;
    while let Some(message) = stream.next().await {
        match message {
            LogMessage::Choice(event) => {
                saw_choice = true;
                assert_eq!(event.candidates.len(), 2);
                assert_eq!(event.candidates[0].external_id, "vid-exact");
                assert!(event.allow_research);

                let chosen = event.candidates[0].external_id.clone();
                manager
                    .submit_choice(&job_id, "select", Some(chosen))
                    .unwrap();
            }
            LogMessage::End => {
                saw_end = true;
                break;
            }
            LogMessage::Line(_) => {}
        }
    }

    assert!(saw_choice, "expected a choice event before [END]");
    assert!(saw_end);
    assert!(!original.exists());
    assert!(audio_dir
        .join("Artist - Midnight Drive [vid-exact].mp3")
        .exists());

    // A second submission for the resolved id must fail.
    assert!(manager
        .submit_choice(&job_id, "select", Some("vid-exact".to_string()))
        .is_err());
}

#[tokio::test]
async fn skip_fallback_records_ambiguity_without_touching_files() {
    let server = MockServer::start().await;
    mock_two_candidates(&server).await;

    let root = tempfile::tempdir().unwrap();
    let manager = Manager::new(test_config(root.path(), &server.uri())).unwrap();

    let audio_dir = root.path().join("music");
    std::fs::create_dir_all(&audio_dir).unwrap();
    let original = audio_dir.join("Artist - Midnight Drive.mp3");
    std::fs::write(&original, b"").unwrap();

    let job_id = manager.start_migration(Some(MigrationParams {
        threshold: 0.85,
        fallback: FallbackPolicy::Skip,
    }));
    let mut stream = manager.stream_logs(&job_id).unwrap();

    let mut saw_ambiguous_line = false;
    while let Some(message) = stream.next().await {
        match message {
            LogMessage::Choice(_) => panic!("skip fallback must not ask for a choice"),
            LogMessage::Line(line) if line.contains("Ambiguous match") => {
                saw_ambiguous_line = true;
            }
            LogMessage::End => break,
            LogMessage::Line(_) => {}
        }
    }

    assert!(saw_ambiguous_line);
    assert!(original.exists());

    let entries = manager.state().migration_log.load_all();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].statuses, vec!["ambiguous"]);
    assert_eq!(entries[0].reasons, vec!["multiple_matches"]);
    assert_eq!(entries[0].candidates.as_ref().unwrap().len(), 2);
}

#[tokio::test]
async fn best_fallback_takes_the_top_score() {
    let server = MockServer::start().await;
    mock_two_candidates(&server).await;

    let root = tempfile::tempdir().unwrap();
    let manager = Manager::new(test_config(root.path(), &server.uri())).unwrap();

    let audio_dir = root.path().join("music");
    std::fs::create_dir_all(&audio_dir).unwrap();
    std::fs::write(audio_dir.join("Artist - Midnight Drive.mp3"), b"").unwrap();

    let job_id = manager.start_migration(Some(MigrationParams {
        threshold: 0.85,
        fallback: FallbackPolicy::Best,
    }));
    let mut stream = manager.stream_logs(&job_id).unwrap();
    while let Some(message) = stream.next().await {
        if matches!(message, LogMessage::End) {
            break;
        }
    }

    assert!(audio_dir
        .join("Artist - Midnight Drive [vid-exact].mp3")
        .exists());
}
