//! Integration tests for the end-to-end deployment workflow.

mod common;

use std::path::PathBuf;

use common::{fixtures::SourceTree, TestDeployer};
use sitecast_control::collaborators::mock::{
    CertificateCall, DatabaseCall, DatabaseOp, MockCollaborators, MockDatabase,
};
use sitecast_control::collaborators::CloudEnvironment;
use sitecast_control::{
    DatabaseConfig, DatabaseProvider, DeploymentRecord, DeploymentRequest, DeploymentStatus,
    DeploymentStore, LogLevel, SslConfig, TargetPlatform,
};
use sitecast_hosting::{EngineOp, Protocol};
use tokio_util::sync::CancellationToken;

fn shop_database() -> DatabaseConfig {
    DatabaseConfig::new(DatabaseProvider::SqlServer, "localhost", "shop")
        .with_integrated_security()
        .with_auto_rollback(true)
}

#[tokio::test]
async fn minimal_deployment_reaches_success() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "demo").build();

    let request = DeploymentRequest::new(&source)
        .with_domain("demo.local")
        .with_ports(8080, 8443);
    let result = deployer
        .manager
        .deploy(request, &CancellationToken::new())
        .await;

    assert!(result.success, "{:?}", result.error_message);
    assert_eq!(result.status, DeploymentStatus::Success);
    assert_eq!(result.url.as_deref(), Some("https://demo.local:8443"));
    assert!(result.duration_ms.is_some());
    assert!(result.database_result.is_none());
    assert!(result.certificate_result.is_none());
    assert!(result.health_summary.is_none());

    let record = deployer
        .store
        .get(result.deployment_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.site_name, "demo_local");
    assert_eq!(record.app_pool_name, "AppPool_demo_local");
    assert_eq!(record.physical_path, deployer.sites_root().join("demo_local"));
    assert!(record.started_at.is_some());
    assert!(record.completed_at.is_some());
    assert_eq!(
        record.rollback_command.as_deref(),
        Some(format!("sitecast rollback --id {}", record.id).as_str())
    );
    assert!(record.physical_path.join("index.html").exists());

    let bindings = deployer.engine.site_bindings("demo_local").unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].protocol, Protocol::Http);
    assert_eq!(bindings[0].port, 8080);
    assert!(deployer.hosts_contents().contains("127.0.0.1\tdemo.local"));
}

#[tokio::test]
async fn every_deployment_ends_terminal() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "app").build();
    let cancel = CancellationToken::new();

    let ok = deployer
        .manager
        .deploy(DeploymentRequest::new(&source).with_domain("ok.local"), &cancel)
        .await;

    deployer.mocks.discovery.set_fail(true);
    let failed = deployer
        .manager
        .deploy(DeploymentRequest::new(&source).with_domain("bad.local"), &cancel)
        .await;

    let missing = deployer
        .manager
        .deploy(
            DeploymentRequest::new(deployer.dir.path().join("nowhere")),
            &cancel,
        )
        .await;

    for result in [&ok, &failed, &missing] {
        assert!(result.status.is_terminal());
        let id = result.deployment_id.as_ref().unwrap();
        let record = deployer.store.get(id).await.unwrap().unwrap();
        assert!(record.is_terminal());
        assert!(record.completed_at.is_some());
    }
    assert_eq!(failed.status, DeploymentStatus::Failed);
    assert!(failed.error_message.unwrap().contains("discovery"));
    assert!(deployer.manager.get_active_deployments().await.unwrap().is_empty());
}

#[tokio::test]
async fn redeploying_the_same_domain_is_idempotent() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "app").build();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        let result = deployer
            .manager
            .deploy(DeploymentRequest::new(&source).with_domain("twice.local"), &cancel)
            .await;
        assert!(result.success, "{:?}", result.error_message);
    }

    assert_eq!(deployer.engine.site_count(), 1);
    assert_eq!(deployer.engine.pool_count(), 1);
    assert_eq!(
        deployer.engine.site_bindings("twice_local").unwrap().len(),
        1
    );
    let hosts = deployer.hosts_contents();
    assert_eq!(hosts.matches("twice.local").count(), 1);
}

#[tokio::test]
async fn excluded_entries_never_reach_the_site() {
    let deployer = TestDeployer::new();
    let source = SourceTree::web_app(deployer.dir.path(), "web")
        .with_file("web.debug.config", "<configuration />")
        .build();

    let result = deployer
        .manager
        .deploy(
            DeploymentRequest::new(&source).with_domain("web.local"),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.success, "{:?}", result.error_message);

    let site = deployer.sites_root().join("web_local");
    assert!(site.join("web.config").exists());
    assert!(site.join("bin/app.dll").exists());
    assert!(!site.join("bin/app.pdb").exists());
    assert!(!site.join(".git").exists());
    assert!(!site.join("obj").exists());
    assert!(!site.join("web.debug.config").exists());
}

#[tokio::test]
async fn site_path_over_the_source_fails_without_touching_it() {
    let deployer = TestDeployer::new();
    let source = SourceTree::web_app(deployer.dir.path(), "web").build();

    let result = deployer
        .manager
        .deploy(
            DeploymentRequest::new(&source)
                .with_domain("web.local")
                .with_physical_path(&source),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, DeploymentStatus::Failed);
    assert!(result.error_message.unwrap().contains("overlaps"));
    assert!(source.join("index.html").exists());
    assert!(source.join("web.config").exists());
    assert!(source.join("bin/app.dll").exists());
}

#[tokio::test]
async fn failure_with_auto_rollback_restores_the_database_backup() {
    let mocks = MockCollaborators::new().with_database(MockDatabase::existing());
    let deployer = TestDeployer::with_mocks(mocks);
    deployer.engine.fail(EngineOp::StartSite);
    let source = SourceTree::web_app(deployer.dir.path(), "shop").build();

    let request = DeploymentRequest::new(&source)
        .with_domain("shop.local")
        .with_database(shop_database());
    let result = deployer
        .manager
        .deploy(request, &CancellationToken::new())
        .await;

    assert!(!result.success);
    assert_eq!(result.status, DeploymentStatus::RolledBack);
    assert!(result.error_message.is_some());

    let backup = result
        .database_result
        .as_ref()
        .and_then(|db| db.backup_path.clone())
        .unwrap();
    assert!(backup.starts_with(deployer.dir.path().join("db-backups")));

    let calls = deployer.mocks.database.calls();
    assert!(calls.contains(&DatabaseCall::Backup(backup.clone())));
    assert_eq!(calls.last(), Some(&DatabaseCall::Restore(backup.clone())));

    assert_eq!(deployer.engine.site_count(), 0);
    assert_eq!(deployer.engine.pool_count(), 0);

    let record = deployer
        .store
        .get(result.deployment_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.database_backup_path, Some(backup));
    assert_eq!(
        deployer.mocks.audit.event_types(),
        vec![
            "deployment.started",
            "deployment.failed",
            "deployment.rolled_back"
        ]
    );
}

#[tokio::test]
async fn script_failure_after_backup_restores_that_backup() {
    let database = MockDatabase::existing();
    database.fail(DatabaseOp::RunScripts);
    let deployer = TestDeployer::with_mocks(MockCollaborators::new().with_database(database));
    let source = SourceTree::web_app(deployer.dir.path(), "shop").build();

    let request = DeploymentRequest::new(&source)
        .with_domain("shop.local")
        .with_database(shop_database().with_scripts(vec![PathBuf::from("001.sql")]));
    let result = deployer
        .manager
        .deploy(request, &CancellationToken::new())
        .await;

    assert_eq!(result.status, DeploymentStatus::RolledBack);
    assert!(result.database_result.is_none());

    let record = deployer
        .store
        .get(result.deployment_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    let backup = record.database_backup_path.clone().unwrap();
    assert!(backup.starts_with(deployer.dir.path().join("db-backups")));

    let calls = deployer.mocks.database.calls();
    assert_eq!(
        calls,
        vec![
            DatabaseCall::Exists,
            DatabaseCall::Backup(backup.clone()),
            DatabaseCall::RunScripts(vec![PathBuf::from("001.sql")]),
            DatabaseCall::Restore(backup),
        ]
    );
    assert_eq!(deployer.engine.site_count(), 0);
}

#[tokio::test]
async fn failure_without_auto_rollback_stays_failed() {
    let deployer = TestDeployer::new();
    deployer.engine.fail(EngineOp::CreatePool);
    let source = SourceTree::new(deployer.dir.path(), "app").build();

    let result = deployer
        .manager
        .deploy(
            DeploymentRequest::new(&source).with_domain("pool.local"),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, DeploymentStatus::Failed);
    assert!(deployer.mocks.database.calls().is_empty());

    let record = deployer
        .store
        .get(result.deployment_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(record
        .logs
        .iter()
        .any(|l| l.level == LogLevel::Error && l.error.is_some()));
}

#[tokio::test]
async fn explicit_rollback_removes_a_successful_deployment() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "app").build();
    let cancel = CancellationToken::new();

    let result = deployer
        .manager
        .deploy(DeploymentRequest::new(&source).with_domain("undo.local"), &cancel)
        .await;
    let id = result.deployment_id.unwrap();
    assert_eq!(deployer.engine.site_count(), 1);

    let rollback = deployer.manager.rollback(&id, &cancel).await;
    assert!(rollback.success, "{:?}", rollback.error_message);
    assert_eq!(rollback.status, Some(DeploymentStatus::RolledBack));
    assert_eq!(deployer.engine.site_count(), 0);
    assert_eq!(
        deployer.manager.get_status(&id).await.unwrap(),
        DeploymentStatus::RolledBack
    );

    let again = deployer.manager.rollback(&id, &cancel).await;
    assert!(!again.success);
    assert_eq!(again.status, Some(DeploymentStatus::RolledBack));
}

#[tokio::test]
async fn self_signed_certificate_is_bound_to_https() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "app").build();

    let request = DeploymentRequest::new(&source)
        .with_domain("secure.local")
        .with_ssl(SslConfig::self_signed());
    let result = deployer
        .manager
        .deploy(request, &CancellationToken::new())
        .await;
    assert!(result.success, "{:?}", result.error_message);

    assert_eq!(
        deployer.mocks.certificates.calls(),
        vec![CertificateCall::SelfSigned("secure.local".to_owned())]
    );
    let certificate = result.certificate_result.unwrap();
    assert_eq!(
        deployer.engine.site_certificate("secure_local", 443),
        Some(certificate.thumbprint.clone())
    );

    let bindings = deployer.engine.site_bindings("secure_local").unwrap();
    assert!(bindings
        .iter()
        .any(|b| b.protocol == Protocol::Https && b.port == 443));
}

#[tokio::test]
async fn unrecognized_certificate_type_fails_before_the_site() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "app").build();
    let ssl: SslConfig = serde_json::from_str(r#"{"certificate_type":"smartcard"}"#).unwrap();

    let result = deployer
        .manager
        .deploy(
            DeploymentRequest::new(&source)
                .with_domain("card.local")
                .with_ssl(ssl),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(result.status, DeploymentStatus::Failed);
    assert!(result.error_message.unwrap().contains("smartcard"));
    assert!(deployer.mocks.certificates.calls().is_empty());
    assert_eq!(deployer.engine.site_count(), 0);
}

#[tokio::test]
async fn missing_profile_rejects_the_request() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "app").build();

    let result = deployer
        .manager
        .deploy(
            DeploymentRequest::new(&source).with_profile("no-such-profile"),
            &CancellationToken::new(),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.status, DeploymentStatus::Failed);
    assert!(result.deployment_id.is_none());
    assert!(result.error_message.unwrap().contains("Profile"));
    assert_eq!(deployer.mocks.discovery.calls(), 0);
    assert_eq!(deployer.engine.site_count(), 0);
}

#[tokio::test]
async fn health_checks_and_cloud_detection_run_when_requested() {
    let mocks = MockCollaborators::new().with_cloud(CloudEnvironment {
        provider: Some("azure".to_owned()),
        is_cloud: true,
        public_ip: Some("203.0.113.10".to_owned()),
        ..CloudEnvironment::default()
    });
    let deployer = TestDeployer::with_mocks(mocks);
    let source = SourceTree::new(deployer.dir.path(), "app").build();

    let request = DeploymentRequest::new(&source)
        .with_domain("cloud.local")
        .with_target(TargetPlatform::CloudVm)
        .with_health_checks(true);
    let result = deployer
        .manager
        .deploy(request, &CancellationToken::new())
        .await;
    assert!(result.success, "{:?}", result.error_message);

    assert_eq!(deployer.mocks.cloud.calls(), 1);
    assert_eq!(deployer.mocks.health.calls(), 1);
    assert!(result.health_summary.unwrap().all_healthy);

    let record = deployer
        .store
        .get(result.deployment_id.as_ref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.cloud_provider.as_deref(), Some("azure"));
    assert_eq!(record.public_ip.as_deref(), Some("203.0.113.10"));
}

#[tokio::test]
async fn database_stage_rewrites_the_connection_string() {
    let deployer = TestDeployer::new();
    let source = SourceTree::web_app(deployer.dir.path(), "data").build();

    let request = DeploymentRequest::new(&source)
        .with_domain("data.local")
        .with_database(DatabaseConfig::new(
            DatabaseProvider::Sqlite,
            "data.db",
            "data",
        ));
    let result = deployer
        .manager
        .deploy(request, &CancellationToken::new())
        .await;
    assert!(result.success, "{:?}", result.error_message);

    let db = result.database_result.unwrap();
    assert!(db.backup_path.is_none());
    assert!(deployer.mocks.database.calls().contains(&DatabaseCall::Create));

    let config = std::fs::read_to_string(deployer.sites_root().join("data_local/web.config"))
        .unwrap();
    assert!(config.contains("Data Source=data.db"));
}

#[tokio::test]
async fn cancelled_deployment_touches_nothing() {
    let deployer = TestDeployer::new();
    let source = SourceTree::new(deployer.dir.path(), "app").build();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = deployer
        .manager
        .deploy(DeploymentRequest::new(&source), &cancel)
        .await;

    assert_eq!(result.status, DeploymentStatus::Failed);
    assert_eq!(deployer.engine.site_count(), 0);
    assert!(deployer.mocks.audit.event_types().contains(&"deployment.failed".to_owned()));
}

#[tokio::test]
async fn serialization_can_be_disabled() {
    let deployer = TestDeployer::build(MockCollaborators::new(), |config| {
        config.deployment.serialize_targets = false;
    });
    let source = SourceTree::new(deployer.dir.path(), "app").build();
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        deployer
            .manager
            .deploy(DeploymentRequest::new(&source).with_domain("a.local"), &cancel),
        deployer
            .manager
            .deploy(DeploymentRequest::new(&source).with_domain("b.local"), &cancel),
    );

    assert!(a.success, "{:?}", a.error_message);
    assert!(b.success, "{:?}", b.error_message);
    assert_eq!(deployer.engine.site_count(), 2);
}

#[tokio::test]
async fn active_deployments_are_the_non_terminal_ones() {
    let deployer = TestDeployer::new();
    let pending = DeploymentRecord::new("queued", "/src/queued", "queued.local", "/sites/queued");
    deployer.store.insert(&pending).await.unwrap();

    let source = SourceTree::new(deployer.dir.path(), "app").build();
    deployer
        .manager
        .deploy(
            DeploymentRequest::new(&source).with_domain("done.local"),
            &CancellationToken::new(),
        )
        .await;

    let active = deployer.manager.get_active_deployments().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, pending.id);
    assert_eq!(
        deployer.manager.get_status(&pending.id).await.unwrap(),
        DeploymentStatus::Pending
    );
}
