//! End-to-end runs of the binary against a mock management API.
//!
//! The config lives at the default location under a temporary
//! `XDG_CONFIG_HOME` so that `WAREHOUSECTL_ACCESS_TOKEN` is honoured.
#![cfg(target_os = "linux")]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SERVERS_PATH: &str = "/subscriptions/sub-1/providers/Microsoft.Sql/servers";
const DATABASES_PATH: &str =
    "/subscriptions/sub-1/resourceGroups/analytics-rg/providers/Microsoft.Sql/servers/srv/databases";

struct Fixture {
    server: MockServer,
    config_home: TempDir,
}

impl Fixture {
    async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{"subscriptionId": "sub-1", "displayName": "Production"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(SERVERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{
                    "id": "/subscriptions/sub-1/resourceGroups/analytics-rg/providers/Microsoft.Sql/servers/srv",
                    "name": "srv",
                    "location": "westeurope"
                }]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(DATABASES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {
                        "name": "master",
                        "location": "westeurope",
                        "sku": {"name": "System", "tier": "System"},
                        "properties": {"status": "Online"}
                    },
                    {
                        "name": "dw1",
                        "location": "westeurope",
                        "sku": {"name": "DW100c", "tier": "DataWarehouse"},
                        "properties": {"status": "Paused", "currentServiceObjectiveName": "DW100c"}
                    }
                ]
            })))
            .mount(&server)
            .await;

        let config_home = TempDir::new().unwrap();
        let dir = config_home.path().join("warehousectl");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.toml"),
            format!(
                "[endpoints]\nmanagement = \"{}\"\nportal = \"https://portal.example\"\n",
                server.uri()
            ),
        )
        .unwrap();

        Self {
            server,
            config_home,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("warehousectl").unwrap();
        cmd.env("XDG_CONFIG_HOME", self.config_home.path())
            .env("WAREHOUSECTL_ACCESS_TOKEN", "test-token")
            .env("NO_COLOR", "1")
            .env_remove("WAREHOUSECTL_CONFIG_FILE")
            .env_remove("WAREHOUSECTL_SUBSCRIPTION")
            .env_remove("RUST_LOG");
        cmd
    }
}

#[tokio::test]
#[serial]
async fn test_list_json_only_contains_warehouses() {
    let fixture = Fixture::start().await;

    fixture
        .command()
        .args(["list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dw1\""))
        .stdout(predicate::str::contains("Paused"))
        .stdout(predicate::str::contains("master").not());
}

#[tokio::test]
#[serial]
async fn test_list_with_query() {
    let fixture = Fixture::start().await;

    fixture
        .command()
        .args(["list", "-o", "json", "-q", "[].name"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dw1\""))
        .stdout(predicate::str::contains("analytics-rg").not());
}

#[tokio::test]
#[serial]
async fn test_tree_expanded() {
    let fixture = Fixture::start().await;

    fixture
        .command()
        .args(["tree", "--expand"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Production"))
        .stdout(predicate::str::contains("dw1"))
        .stdout(predicate::str::contains("analytics-rg/srv"));
}

#[tokio::test]
#[serial]
async fn test_tree_unknown_subscription_fails() {
    let fixture = Fixture::start().await;

    fixture
        .command()
        .args(["--subscription", "Staging", "tree"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Staging"));
}

#[tokio::test]
#[serial]
async fn test_resume_paused_warehouse() {
    let fixture = Fixture::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{}/dw1/resume", DATABASES_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&fixture.server)
        .await;

    fixture
        .command()
        .args(["resume", "srv/dw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resumed dw1"));
}

#[tokio::test]
#[serial]
async fn test_scale_paused_warehouse_is_rejected() {
    let fixture = Fixture::start().await;

    Mock::given(method("PATCH"))
        .and(path(format!("{}/dw1", DATABASES_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fixture.server)
        .await;

    fixture
        .command()
        .args(["scale", "srv/dw1", "--level", "DW500c", "--yes"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("must be online to scale"));
}

#[tokio::test]
#[serial]
async fn test_pause_unknown_warehouse() {
    let fixture = Fixture::start().await;

    fixture
        .command()
        .args(["pause", "srv/missing"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("missing"));
}

#[tokio::test]
#[serial]
async fn test_link_prints_portal_url() {
    let fixture = Fixture::start().await;

    fixture
        .command()
        .args(["link", "srv/dw1"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "https://portal.example/#@/resource/subscriptions/sub-1/resourceGroups/analytics-rg/providers/Microsoft.Sql/servers/srv/databases/dw1/overview",
        ));
}
