//! Plugin Lifecycle Tests
//!
//! End-to-end tests over the public API: package a plugin, discover it from
//! a local feed, install it, validate it, resolve it from disk, and
//! uninstall it.
//!
//! Run: cargo nextest run --test lifecycle_tests

use std::path::Path;
use std::sync::Arc;

use plugin_system::discovery::{LocalDirectoryDiscovererProvider, PluginSource};
use plugin_system::fetching::{LocalPluginFetcher, ProgressReporter};
use plugin_system::manager::PluginsManager;
use plugin_system::metadata::{PluginContentsMetadata, PluginMetadata, TableMetadata};
use plugin_system::package::PluginPackageBuilder;
use plugin_system::resolver::FolderSchema;
use plugin_system::{DirectoryChecksumCalculator, Error, PluginIdentity, RegistryError};
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn metadata(id: &str, version: &str) -> PluginMetadata {
    PluginMetadata {
        identity: PluginIdentity::new(id, version.parse().unwrap()).unwrap(),
        installed_size: 1024,
        display_name: format!("{id} plugin"),
        description: "integration test plugin".into(),
        sdk_version: Some("1.0.0".parse().unwrap()),
        project_url: None,
        owners: Vec::new(),
    }
}

fn contents(guids: &[Uuid]) -> PluginContentsMetadata {
    PluginContentsMetadata {
        tables: guids
            .iter()
            .map(|&guid| TableMetadata {
                guid,
                name: "table".into(),
                category: "test".into(),
                is_metadata_table: false,
            })
            .collect(),
        ..Default::default()
    }
}

fn write_package(feed: &Path, id: &str, version: &str, guids: &[Uuid]) {
    PluginPackageBuilder::new(metadata(id, version), contents(guids))
        .add_content_bytes("bin/plugin.dll", format!("{id}@{version}").into_bytes())
        .add_content_bytes("resources/strings.json", b"{}".to_vec())
        .write_to(&feed.join(format!("{id}-{version}.ppkg")))
        .unwrap();
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn manager_at(root: &Path) -> PluginsManager {
    init_tracing();
    PluginsManager::builder()
        .install_root(root)
        .sdk_version("1.0.0".parse().unwrap())
        .with_discoverer_provider(Arc::new(LocalDirectoryDiscovererProvider::new()))
        .with_fetcher(Arc::new(LocalPluginFetcher::new()))
        .build()
        .unwrap()
}

fn feed_source(feed: &TempDir) -> PluginSource {
    PluginSource::new(feed.path().to_string_lossy())
}

// =============================================================================
// Discover → install → validate → uninstall
// =============================================================================

#[tokio::test]
async fn test_discover_install_validate_uninstall() {
    let feed = tempdir().unwrap();
    let root = tempdir().unwrap();
    write_package(feed.path(), "tracer", "1.2.0", &[Uuid::new_v4()]);

    let manager = manager_at(root.path());
    let token = CancellationToken::new();

    let outcome = manager.discover(&[feed_source(&feed)], &token).await;
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.available.len(), 1);
    let available = &outcome.available[0];
    assert_eq!(available.identity.id(), "tracer");

    let (progress, mut rx) = ProgressReporter::channel();
    let installed = manager.install(available, &token, &progress).await.unwrap();
    drop(progress);

    // Progress never regresses and finishes at 100.
    let mut last = 0;
    while let Some(percent) = rx.recv().await {
        assert!(percent >= last);
        last = percent;
    }
    assert_eq!(last, 100);

    // Files landed in the versioned layout with the recorded checksum.
    assert!(installed.install_path.join("content/bin/plugin.dll").is_file());
    let recomputed = DirectoryChecksumCalculator::checksum(&installed.install_path).unwrap();
    assert_eq!(recomputed, installed.checksum);

    let health = manager.verify_installed().unwrap();
    assert!(health.iter().all(|h| h.is_valid));

    let scan = manager.scan_installed().unwrap();
    assert_eq!(scan.loadable.len(), 1);
    assert_eq!(scan.loadable[0].schema, FolderSchema::Versioned);

    let removed = manager.uninstall(&installed.identity).await.unwrap();
    assert!(!removed.install_path.exists());
    assert!(manager.scan_installed().unwrap().loadable.is_empty());
    assert!(manager.registry().list().unwrap().is_empty());
}

// =============================================================================
// Registry protects against double installs
// =============================================================================

#[tokio::test]
async fn test_reinstall_requires_uninstall() {
    let feed = tempdir().unwrap();
    let root = tempdir().unwrap();
    write_package(feed.path(), "tracer", "1.0.0", &[Uuid::new_v4()]);

    let manager = manager_at(root.path());
    let token = CancellationToken::new();
    let outcome = manager.discover(&[feed_source(&feed)], &token).await;
    let available = &outcome.available[0];

    manager
        .install(available, &token, &ProgressReporter::disabled())
        .await
        .unwrap();
    let err = manager
        .install(available, &token, &ProgressReporter::disabled())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Registry(RegistryError::AlreadyInstalled { .. })
    ));

    manager.uninstall(&available.identity).await.unwrap();
    manager
        .install(available, &token, &ProgressReporter::disabled())
        .await
        .unwrap();
}

// =============================================================================
// Two installed versions advertising the same GUID: resolver picks one
// =============================================================================

#[tokio::test]
async fn test_resolver_suppresses_older_version_of_same_extension() {
    let feed = tempdir().unwrap();
    let root = tempdir().unwrap();
    let guid = Uuid::new_v4();
    write_package(feed.path(), "tracer", "1.0.0", &[guid]);
    write_package(feed.path(), "tracer", "2.0.0", &[guid]);

    let manager = manager_at(root.path());
    let token = CancellationToken::new();

    // discover_latest keeps only 2.0.0; install both explicitly through the
    // feed's per-file sources to simulate a historical install of 1.0.0.
    let discoverer = LocalDirectoryDiscovererProvider::new();
    use plugin_system::discovery::DiscovererProvider;
    let all = discoverer
        .create_discoverer(&feed_source(&feed))
        .discover_all(&token)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    for available in &all {
        manager
            .install(available, &token, &ProgressReporter::disabled())
            .await
            .unwrap();
    }

    let scan = manager.scan_installed().unwrap();
    assert_eq!(scan.loadable.len(), 1);
    assert_eq!(scan.loadable[0].identity.version().to_string(), "2.0.0");
    assert_eq!(scan.suppressed.len(), 1);
    assert_eq!(scan.suppressed[0].identity.version().to_string(), "1.0.0");
    assert!(scan.invalid.is_empty());
}

// =============================================================================
// Tampering is caught by verification
// =============================================================================

#[tokio::test]
async fn test_tampered_install_fails_verification() {
    let feed = tempdir().unwrap();
    let root = tempdir().unwrap();
    write_package(feed.path(), "tracer", "1.0.0", &[Uuid::new_v4()]);

    let manager = manager_at(root.path());
    let token = CancellationToken::new();
    let outcome = manager.discover(&[feed_source(&feed)], &token).await;
    let installed = manager
        .install(
            &outcome.available[0],
            &token,
            &ProgressReporter::disabled(),
        )
        .await
        .unwrap();

    std::fs::write(
        installed.install_path.join("content/bin/plugin.dll"),
        b"tampered",
    )
    .unwrap();

    let health = manager.verify_installed().unwrap();
    assert_eq!(health.len(), 1);
    assert!(!health[0].is_valid);
}

// =============================================================================
// Hot-loaded capabilities take effect without a rebuild
// =============================================================================

#[tokio::test]
async fn test_hot_loaded_fetcher_and_provider() {
    let feed = tempdir().unwrap();
    let root = tempdir().unwrap();
    write_package(feed.path(), "tracer", "1.0.0", &[Uuid::new_v4()]);

    // Built empty: nothing discovers, nothing fetches.
    let manager = PluginsManager::builder()
        .install_root(root.path())
        .sdk_version("1.0.0".parse().unwrap())
        .build()
        .unwrap();
    let token = CancellationToken::new();

    let outcome = manager.discover(&[feed_source(&feed)], &token).await;
    assert!(outcome.available.is_empty());

    assert_eq!(
        manager.load_discoverer_providers(vec![Arc::new(LocalDirectoryDiscovererProvider::new())]),
        1
    );
    assert_eq!(manager.load_fetchers(vec![Arc::new(LocalPluginFetcher::new())]), 1);

    let outcome = manager.discover(&[feed_source(&feed)], &token).await;
    assert_eq!(outcome.available.len(), 1);
    manager
        .install(
            &outcome.available[0],
            &token,
            &ProgressReporter::disabled(),
        )
        .await
        .unwrap();
}
