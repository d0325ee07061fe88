use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use studydb::config::{DEFAULT_DATABASE_NAME, RegistryConfig};
use studydb::registry::IdentityListener;
use studydb::{DbId, DbSetup, DbTarget, GlobalProperties, RegistryHooks, StudyDbError};

fn temp_host(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "studydb-{label}-{}-{}",
        std::process::id(),
        nanos
    ));
    std::fs::create_dir_all(&dir).expect("create temp host dir");
    dir
}

fn target_for(host: &Path) -> DbTarget {
    DbTarget::new(host.display().to_string(), DEFAULT_DATABASE_NAME)
}

async fn installed(target: DbTarget, globals: &GlobalProperties) -> DbSetup {
    let mut setup = DbSetup::probe(target, globals, Duration::from_secs(5)).await;
    assert!(setup.can_install(), "{}", setup.status_text());
    setup.install(globals).await.expect("install should succeed");
    assert!(setup.can_open(), "{}", setup.status_text());
    setup
}

#[derive(Default)]
struct ClosedIds(Mutex<Vec<DbId>>);

impl IdentityListener for ClosedIds {
    fn identity_closed(&self, id: &DbId) {
        self.0.lock().expect("listener lock").push(id.clone());
    }
}

#[tokio::test]
async fn checkout_release_close_scenario() {
    let host = temp_host("scenario");
    let globals = Arc::new(GlobalProperties::in_memory());
    let closed = Arc::new(ClosedIds::default());
    let registry = studydb::registry::spawn(
        RegistryConfig::default(),
        globals.clone(),
        RegistryHooks::new().with_listener(closed.clone()),
    )
    .await
    .expect("spawn registry");

    let mut setup = installed(target_for(&host), &globals).await;
    let id = setup.id().cloned().expect("installed database has an id");
    registry.open(&mut setup).await.expect("open");
    assert!(registry.is_open(&id).await.expect("is_open"));

    let c1 = registry.checkout(&id).await.expect("first checkout");
    let c2 = registry.checkout(&id).await.expect("second checkout");
    assert_ne!(c1.id(), c2.id());
    assert_eq!(c1.database_name(), DEFAULT_DATABASE_NAME);

    let c1_id = c1.id();
    registry.release(c1);
    let mut again = registry.checkout(&id).await.expect("checkout after release");
    assert_eq!(again.id(), c1_id, "most recently released handle is reused");

    let one: i64 = sqlx::query_scalar("SELECT 1")
        .fetch_one(again.session().expect("live session"))
        .await
        .expect("query on checked-out connection");
    assert_eq!(one, 1);

    registry.close(&id).await.expect("close");
    assert!(again.is_revoked());
    assert!(c2.is_revoked());
    assert!(matches!(
        again.session(),
        Err(StudyDbError::ConnectionRevoked)
    ));

    let err = registry
        .checkout(&id)
        .await
        .expect_err("checkout after close must fail");
    assert!(matches!(err, StudyDbError::NotOpen(_)));
    assert!(registry.pool_stats(&id).await.expect("pool_stats").is_none());

    // Releasing revoked handles after close is harmless.
    registry.release(again);
    registry.release(c2);

    // A second close is a no-op and does not notify again.
    registry.close(&id).await.expect("second close");
    assert_eq!(*closed.0.lock().expect("listener lock"), vec![id.clone()]);

    let _ = tokio::fs::remove_dir_all(&host).await;
}

#[tokio::test]
async fn alias_hosts_share_one_open_identity() {
    let host = temp_host("alias");
    let globals = Arc::new(GlobalProperties::in_memory());
    let registry =
        studydb::registry::spawn(RegistryConfig::default(), globals.clone(), RegistryHooks::new())
            .await
            .expect("spawn registry");

    let mut first = installed(target_for(&host), &globals).await;
    let id = first.id().cloned().expect("installed database has an id");
    registry.open(&mut first).await.expect("first open");

    let alias = DbTarget::new(format!("{}/.", host.display()), DEFAULT_DATABASE_NAME);
    assert_ne!(alias.identity_cache_key(), first.target().identity_cache_key());
    let mut second = DbSetup::probe(alias.clone(), &globals, Duration::from_secs(5)).await;
    assert!(second.can_open(), "{}", second.status_text());
    assert_eq!(second.id(), Some(&id));

    registry.open(&mut second).await.expect("second open is a no-op");
    assert_eq!(registry.open_ids().await.expect("open_ids"), vec![id.clone()]);
    let stats = registry
        .pool_stats(&id)
        .await
        .expect("pool_stats")
        .expect("open database has a pool");
    assert_eq!(stats.created, 1);
    assert_eq!(stats.idle, 1);

    assert_eq!(
        registry.resolve_open(&alias).await.expect("resolve_open"),
        Some(id.clone())
    );

    registry.close_all().await.expect("close_all");
    assert!(registry.open_ids().await.expect("open_ids").is_empty());
    assert_eq!(registry.resolve_open(&alias).await.expect("resolve_open"), None);

    let _ = tokio::fs::remove_dir_all(&host).await;
}

#[tokio::test]
async fn failed_reconnect_returns_connection_to_pool() {
    let host = temp_host("conserve");
    let globals = Arc::new(GlobalProperties::in_memory());
    let registry =
        studydb::registry::spawn(RegistryConfig::default(), globals.clone(), RegistryHooks::new())
            .await
            .expect("spawn registry");

    let target = target_for(&host);
    let db_file = target.file_path();
    let mut setup = installed(target, &globals).await;
    let id = setup.id().cloned().expect("installed database has an id");
    registry.open(&mut setup).await.expect("open");

    let c1 = registry.checkout(&id).await.expect("checkout c1");
    let c2 = registry.checkout(&id).await.expect("checkout c2");
    registry.release(c1);
    registry.release(c2);

    let stats = registry
        .pool_stats(&id)
        .await
        .expect("pool_stats")
        .expect("open database has a pool");
    assert_eq!((stats.idle, stats.in_use, stats.created), (2, 0, 2));

    let moved = host.join("moved.sqlite");
    tokio::fs::rename(&db_file, &moved)
        .await
        .expect("move database file away");

    let err = registry
        .checkout(&id)
        .await
        .expect_err("reconnect to a missing file must fail");
    assert!(matches!(err, StudyDbError::DatabaseError(_)), "{err}");

    let stats = registry
        .pool_stats(&id)
        .await
        .expect("pool_stats")
        .expect("open database has a pool");
    assert_eq!((stats.idle, stats.in_use, stats.created), (2, 0, 2));

    tokio::fs::rename(&moved, &db_file)
        .await
        .expect("move database file back");

    let conn = registry.checkout(&id).await.expect("checkout after restore");
    let stats = registry
        .pool_stats(&id)
        .await
        .expect("pool_stats")
        .expect("open database has a pool");
    assert_eq!((stats.idle, stats.in_use, stats.created), (1, 1, 2));
    registry.release(conn);

    registry.close_all().await.expect("close_all");
    let _ = tokio::fs::remove_dir_all(&host).await;
}

#[tokio::test]
async fn open_is_refused_when_not_openable() {
    let host = temp_host("refused");
    let globals = Arc::new(GlobalProperties::in_memory());
    let registry =
        studydb::registry::spawn(RegistryConfig::default(), globals.clone(), RegistryHooks::new())
            .await
            .expect("spawn registry");

    let mut setup = DbSetup::probe(target_for(&host), &globals, Duration::from_secs(5)).await;
    assert!(!setup.can_open());

    let err = registry
        .open(&mut setup)
        .await
        .expect_err("open of an uninstalled database must fail");
    assert!(matches!(err, StudyDbError::Setup(_)));
    assert!(registry.open_ids().await.expect("open_ids").is_empty());
    assert!(
        registry
            .reference_data()
            .await
            .expect("reference_data")
            .is_none()
    );

    let _ = tokio::fs::remove_dir_all(&host).await;
}

#[tokio::test]
async fn reference_data_loads_on_first_open() {
    let host = temp_host("reference");
    let globals = Arc::new(GlobalProperties::in_memory());
    let registry =
        studydb::registry::spawn(RegistryConfig::default(), globals.clone(), RegistryHooks::new())
            .await
            .expect("spawn registry");

    let mut setup = installed(target_for(&host), &globals).await;
    registry.open(&mut setup).await.expect("open");

    let reference = registry
        .reference_data()
        .await
        .expect("reference_data")
        .expect("loaded by the first open");
    assert_eq!(reference.service_types.len(), 5);
    assert_eq!(reference.channel_bands.len(), 4);
    assert_eq!(
        reference.band_for_channel(20).map(|b| b.name.as_str()),
        Some("UHF")
    );

    registry.close_all().await.expect("close_all");
    assert!(
        registry
            .reference_data()
            .await
            .expect("reference_data")
            .is_some(),
        "reference data outlives the database it came from"
    );

    let _ = tokio::fs::remove_dir_all(&host).await;
}
