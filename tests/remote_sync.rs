use httptest::matchers::{all_of, contains, request};
use httptest::responders::{json_encoded, status_code};
use httptest::{Expectation, Server};
use serde_json::json;
use tempfile::tempdir;

use dashboard_core::{
    AppConfig, AppState, CellValue, Dashboard, MonthKey, Segment, SyncStatus,
};

const TABLE_PATH: &str = "/rest/v1/dashboards";
const ANON_KEY: &str = "anon-test-key";

fn remote_config(server: &Server) -> AppConfig {
    AppConfig {
        remote_url: Some(server.url_str("")),
        remote_api_key: Some(secrecy::SecretString::from(ANON_KEY.to_string())),
        first_year: 2024,
        last_year: 2026,
        // Long enough that the autosave loop never fires inside a test; the
        // shutdown flush is the only save.
        save_debounce_ms: 60_000,
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn existing_document_loads_and_final_edit_is_upserted() {
    let server = Server::run();

    let mut saved = AppState::initial(2024..=2026);
    let key = MonthKey::new(Segment::Franquias, 2025, 0);
    if let Some(month) = saved
        .month_record_mut(key)
        .and_then(dashboard_core::model::MonthRecord::as_funnel_mut)
    {
        month.paid.meta.investment.set(0, CellValue::Number(1500.5));
    }
    let payload = serde_json::to_value(&saved).unwrap();

    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path(TABLE_PATH),
            request::headers(contains(("apikey", ANON_KEY)))
        ))
        .respond_with(json_encoded(json!([{ "content": payload }]))),
    );
    server.expect(
        Expectation::matching(all_of!(
            request::method("POST"),
            request::path(TABLE_PATH),
            request::headers(contains(("apikey", ANON_KEY)))
        ))
        .times(1)
        .respond_with(status_code(204)),
    );

    let dir = tempdir().unwrap();
    let dashboard = Dashboard::initialize(
        remote_config(&server),
        Some("ana".to_string()),
        dir.path(),
    )
    .unwrap();
    dashboard.start().await;
    assert_eq!(dashboard.status(), SyncStatus::Connected);

    let snapshot = dashboard.store().snapshot();
    let month = snapshot.month_record(key).unwrap().as_funnel().unwrap();
    assert_eq!(month.paid.meta.investment.to_numbers()[0], 1500.5);

    dashboard
        .store()
        .update_organic_source(key, "Google", 0, CellValue::Number(9.0));
    dashboard.shutdown().await;
    assert_eq!(dashboard.status(), SyncStatus::Connected);
}

#[tokio::test]
async fn fresh_user_gets_a_seeded_document() {
    let server = Server::run();

    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path(TABLE_PATH)
        ))
        .respond_with(json_encoded(json!([]))),
    );
    // One insert to seed, one upsert from the shutdown flush.
    server.expect(
        Expectation::matching(all_of!(
            request::method("POST"),
            request::path(TABLE_PATH)
        ))
        .times(2)
        .respond_with(status_code(201)),
    );

    let dir = tempdir().unwrap();
    let dashboard = Dashboard::initialize(
        remote_config(&server),
        Some("bruno".to_string()),
        dir.path(),
    )
    .unwrap();
    dashboard.start().await;
    assert_eq!(dashboard.status(), SyncStatus::Connected);

    // The seeded document left defaults in place locally.
    let snapshot = dashboard.store().snapshot();
    assert!(snapshot.month_record(MonthKey::new(Segment::Site, 2024, 0)).is_some());

    dashboard.shutdown().await;
    assert_eq!(dashboard.status(), SyncStatus::Connected);
}

#[tokio::test]
async fn server_failure_surfaces_as_error_status() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method("GET"),
            request::path(TABLE_PATH)
        ))
        .respond_with(status_code(500)),
    );

    let dir = tempdir().unwrap();
    let dashboard = Dashboard::initialize(
        remote_config(&server),
        Some("carla".to_string()),
        dir.path(),
    )
    .unwrap();
    dashboard.start().await;
    assert_eq!(dashboard.status(), SyncStatus::Error);

    // Editing still works against the in-memory defaults.
    let key = MonthKey::new(Segment::Franquias, 2025, 0);
    dashboard
        .store()
        .update_organic_source(key, "Bing", 1, CellValue::Number(3.0));
    let snapshot = dashboard.store().snapshot();
    let month = snapshot.month_record(key).unwrap().as_funnel().unwrap();
    assert_eq!(month.organic.sources["Bing"].to_numbers()[1], 3.0);
}
