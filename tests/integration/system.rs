use rocket::http::Status;
use rocket::local::asynchronous::Client;

fn test_config(port: u16) -> lineheat_server::config::Config {
    lineheat_server::config::Config {
        token: "test-token".to_string(),
        port,
        retention_days: lineheat_server::config::DEFAULT_RETENTION_DAYS,
        database_path: format!("/tmp/lineheat_system_test_{}.db", uuid::Uuid::new_v4()),
        hash_version: lineheat_server::config::HASH_VERSION.to_string(),
    }
}

#[tokio::test]
async fn index_reports_service_status_and_protocol_version() {
    let config = test_config(39299);
    let db_path = config.database_path.clone();
    let rocket = lineheat_server::build_with_config(config).expect("valid rocket instance");
    let client = Client::tracked(rocket).await.expect("client builds");

    let response = client.get("/").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let body: serde_json::Value = response.into_json().await.expect("valid json body");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["protocolVersion"], lineheat_server::config::SERVER_PROTOCOL_VERSION);

    let _ = std::fs::remove_file(&db_path);
    let _ = std::fs::remove_file(format!("{db_path}-wal"));
    let _ = std::fs::remove_file(format!("{db_path}-shm"));
}

#[tokio::test]
async fn unknown_routes_return_a_json_404() {
    let config = test_config(39298);
    let db_path = config.database_path.clone();
    let rocket = lineheat_server::build_with_config(config).expect("valid rocket instance");
    let client = Client::tracked(rocket).await.expect("client builds");

    let response = client.get("/does-not-exist").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);

    let body: serde_json::Value = response.into_json().await.expect("valid json body");
    assert_eq!(body["error"], "Not found");

    let _ = std::fs::remove_file(&db_path);
    let _ = std::fs::remove_file(format!("{db_path}-wal"));
    let _ = std::fs::remove_file(format!("{db_path}-shm"));
}
