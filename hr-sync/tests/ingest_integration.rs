use config::{HrSourceConfig, IngestMode, QueueConfig};
use hcp_core::{Broker, IngestMessage, Stage, StageMessage};
use hr_sync::{EposhClient, IngestFailure, IngestService};
use queue::MemoryBroker;
use serde_json::json;
use std::sync::Arc;
use testing::{hr_page, hr_record};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LISTING: &str = "/v1/induction/employees";

fn hr_config(server: &MockServer) -> HrSourceConfig {
    HrSourceConfig {
        base_url: format!("{}{}", server.uri(), LISTING),
        api_key: "test-api-key".to_string(),
        ..Default::default()
    }
}

async fn mount_page(server: &MockServer, page: u32, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("page", page.to_string()))
        .and(query_param("induction_date", "2026-01-05"))
        .and(query_param("limit", "10"))
        .and(query_param("include_base64", "false"))
        .and(header("x-api-key", "test-api-key"))
        .and(header("x-app-id", "hcpvision"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn service(
    server: &MockServer,
    broker: &MemoryBroker,
    mode: IngestMode
) -> IngestService {
    let client = EposhClient::new(hr_config(server)).unwrap();
    let publisher = broker.publisher().await.unwrap();
    IngestService::new(
        Arc::new(client),
        Arc::from(publisher),
        QueueConfig::default(),
        mode
    )
}

#[tokio::test]
async fn test_legacy_mode_publishes_one_message_per_page() {
    let server = MockServer::start().await;
    mount_page(&server, 1, hr_page(1, 3, vec![hr_record(1), hr_record(2)])).await;
    mount_page(&server, 2, hr_page(2, 3, vec![hr_record(3)])).await;
    mount_page(&server, 3, hr_page(3, 3, vec![hr_record(4)])).await;

    let broker = MemoryBroker::default();
    let report = service(&server, &broker, IngestMode::Legacy)
        .await
        .run("2026-01-05")
        .await
        .unwrap();

    assert_eq!(report.pages_published, 3);
    assert_eq!(report.total_pages, 3);
    assert_eq!(report.messages_published, 3);

    let messages = broker.messages("hikvision_queue");
    assert_eq!(messages.len(), 3);
    for (index, body) in messages.iter().enumerate() {
        let message: IngestMessage = serde_json::from_slice(body).unwrap();
        assert_eq!(message.event, "HIKVISION_SYNC");
        assert_eq!(message.data["pagination"]["current_page"], json!(index + 1));
    }

    let requested_pages: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "page")
                .map(|(_, v)| v.into_owned())
        })
        .collect();
    assert_eq!(requested_pages, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_failure_on_page_k_keeps_earlier_pages() {
    let server = MockServer::start().await;
    mount_page(&server, 1, hr_page(1, 4, vec![hr_record(1)])).await;
    mount_page(&server, 2, hr_page(2, 4, vec![hr_record(2)])).await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("page", "4"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let broker = MemoryBroker::default();
    let error = service(&server, &broker, IngestMode::Legacy)
        .await
        .run("2026-01-05")
        .await
        .unwrap_err();

    assert_eq!(error.published.pages_published, 2);
    assert!(matches!(error.source, IngestFailure::Upstream(_)));
    assert_eq!(broker.len("hikvision_queue"), 2);
}

#[tokio::test]
async fn test_malformed_page_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;

    let broker = MemoryBroker::default();
    let error = service(&server, &broker, IngestMode::Legacy)
        .await
        .run("2026-01-05")
        .await
        .unwrap_err();

    assert_eq!(error.published.pages_published, 0);
    assert!(matches!(
        error.source,
        IngestFailure::Upstream(errors::UpstreamError::MalformedBody { .. })
    ));
    assert!(broker.is_empty("hikvision_queue"));
}

#[tokio::test]
async fn test_staged_mode_publishes_create_person_per_record() {
    let server = MockServer::start().await;
    let broken = json!({"name": "No Identity"});
    mount_page(
        &server,
        1,
        hr_page(1, 1, vec![hr_record(1), broken, hr_record(2)])
    )
    .await;

    let broker = MemoryBroker::default();
    let report = service(&server, &broker, IngestMode::Staged)
        .await
        .run("2026-01-05")
        .await
        .unwrap();

    assert_eq!(report.messages_published, 2);
    assert_eq!(report.skipped_records, 1);

    let messages = broker.messages("create_person_queue");
    assert_eq!(messages.len(), 2);
    let first = StageMessage::decode_for(Stage::CreatePerson, &messages[0]).unwrap();
    match first {
        StageMessage::CreatePerson(record) => {
            assert_eq!(record.identity_number, "ID-0001");
            assert_eq!(record.kib(), Some("KIB-1"));
        }
        other => panic!("unexpected message {other:?}")
    }
    assert!(broker.is_empty("hikvision_queue"));
}

#[tokio::test]
async fn test_publish_failure_stops_run() {
    let server = MockServer::start().await;
    mount_page(&server, 1, hr_page(1, 2, vec![hr_record(1)])).await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let broker = MemoryBroker::default();
    let service = service(&server, &broker, IngestMode::Legacy).await;
    broker.fail_publishes(true);

    let error = service.run("2026-01-05").await.unwrap_err();
    assert_eq!(error.published.pages_published, 0);
    assert!(matches!(error.source, IngestFailure::Transport(_)));
}

#[tokio::test]
async fn test_server_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LISTING))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let broker = MemoryBroker::default();
    let error = service(&server, &broker, IngestMode::Legacy)
        .await
        .run("2026-01-05")
        .await
        .unwrap_err();

    match error.source {
        IngestFailure::Upstream(errors::UpstreamError::Status { status, body, .. }) => {
            assert_eq!(status, 401);
            assert_eq!(body, "invalid api key");
        }
        other => panic!("unexpected failure {other:?}")
    }
}
