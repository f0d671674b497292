//! Migration & sync (C12): diff and copy descriptors between configuration
//! sources, with conflict-resolution strategies.

use crate::config::loader::store;
use crate::config::loader::ConfigLoader;
use crate::config::model::{DatabasesDocument, EndpointsDocument, QueriesDocument};
use crate::error::AppError;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default, Serialize)]
pub struct KindMigrationResult {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub databases: KindMigrationResult,
    pub queries: KindMigrationResult,
    pub endpoints: KindMigrationResult,
}

/// Loads every descriptor from the filesystem loader and write-throughs
/// each one into the store, tracking created/updated/failed per kind.
/// "Updated" vs. "created" is determined by whether the name already
/// existed in the store before the write.
pub async fn migrate_filesystem_to_store(
    fs_loader: &dyn ConfigLoader,
    store_pool: &PgPool,
) -> Result<MigrationReport, AppError> {
    let mut report = MigrationReport::default();

    let existing_databases: HashSet<String> = store::StoreLoader::new(store_pool.clone())
        .load_databases()
        .await
        .map(|m| m.into_keys().collect())
        .unwrap_or_default();
    let databases = fs_loader.load_databases().await?;
    for (name, database) in &databases {
        write_through(
            store_pool,
            "cordal_databases",
            name,
            database,
            existing_databases.contains(name),
            &mut report.databases,
        )
        .await;
    }

    let existing_queries: HashSet<String> = store::StoreLoader::new(store_pool.clone())
        .load_queries()
        .await
        .map(|m| m.into_keys().collect())
        .unwrap_or_default();
    let queries = fs_loader.load_queries().await?;
    for (name, query) in &queries {
        write_through(
            store_pool,
            "cordal_queries",
            name,
            query,
            existing_queries.contains(name),
            &mut report.queries,
        )
        .await;
    }

    let existing_endpoints: HashSet<String> = store::StoreLoader::new(store_pool.clone())
        .load_endpoints()
        .await
        .map(|m| m.into_keys().collect())
        .unwrap_or_default();
    let endpoints = fs_loader.load_endpoints().await?;
    for (name, endpoint) in &endpoints {
        write_through(
            store_pool,
            "cordal_endpoints",
            name,
            endpoint,
            existing_endpoints.contains(name),
            &mut report.endpoints,
        )
        .await;
    }

    Ok(report)
}

async fn write_through<T: serde::Serialize>(
    pool: &PgPool,
    table: &str,
    name: &str,
    descriptor: &T,
    existed: bool,
    result: &mut KindMigrationResult,
) {
    let body = match serde_json::to_string(descriptor) {
        Ok(body) => body,
        Err(e) => {
            result.failed += 1;
            result.errors.push(format!("{name}: serialize failed: {e}"));
            return;
        }
    };
    match store::upsert(pool, table, name, &body).await {
        Ok(()) => {
            if existed {
                result.updated += 1;
            } else {
                result.created += 1;
            }
        }
        Err(e) => {
            result.failed += 1;
            result.errors.push(format!("{name}: {e}"));
        }
    }
}

/// Reads every descriptor from the store and serializes it to the
/// canonical filesystem mapping-document form, one string per kind.
pub async fn export_store_to_filesystem_form(
    store_loader: &dyn ConfigLoader,
) -> Result<(String, String, String), AppError> {
    let databases = DatabasesDocument { databases: store_loader.load_databases().await? };
    let queries = QueriesDocument { queries: store_loader.load_queries().await? };
    let endpoints = EndpointsDocument { endpoints: store_loader.load_endpoints().await? };

    let databases_yaml = serde_yaml::to_string(&databases).map_err(|e| AppError::Internal(e.into()))?;
    let queries_yaml = serde_yaml::to_string(&queries).map_err(|e| AppError::Internal(e.into()))?;
    let endpoints_yaml = serde_yaml::to_string(&endpoints).map_err(|e| AppError::Internal(e.into()))?;

    Ok((databases_yaml, queries_yaml, endpoints_yaml))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KindComparison {
    pub only_in_filesystem: Vec<String>,
    pub only_in_store: Vec<String>,
    pub in_both: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ComparisonReport {
    pub databases: KindComparison,
    pub queries: KindComparison,
    pub endpoints: KindComparison,
}

fn compare_name_sets(fs_names: &HashSet<String>, store_names: &HashSet<String>) -> KindComparison {
    let mut comparison = KindComparison::default();
    comparison.only_in_filesystem = fs_names.difference(store_names).cloned().collect();
    comparison.only_in_store = store_names.difference(fs_names).cloned().collect();
    comparison.in_both = fs_names.intersection(store_names).cloned().collect();
    comparison.only_in_filesystem.sort();
    comparison.only_in_store.sort();
    comparison.in_both.sort();
    comparison
}

/// Compares the name sets of every descriptor kind between the two sources.
pub async fn compare(
    fs_loader: &dyn ConfigLoader,
    store_loader: &dyn ConfigLoader,
) -> Result<ComparisonReport, AppError> {
    let fs_databases: HashSet<String> = fs_loader.load_databases().await?.into_keys().collect();
    let store_databases: HashSet<String> = store_loader.load_databases().await?.into_keys().collect();
    let fs_queries: HashSet<String> = fs_loader.load_queries().await?.into_keys().collect();
    let store_queries: HashSet<String> = store_loader.load_queries().await?.into_keys().collect();
    let fs_endpoints: HashSet<String> = fs_loader.load_endpoints().await?.into_keys().collect();
    let store_endpoints: HashSet<String> = store_loader.load_endpoints().await?.into_keys().collect();

    Ok(ComparisonReport {
        databases: compare_name_sets(&fs_databases, &store_databases),
        queries: compare_name_sets(&fs_queries, &store_queries),
        endpoints: compare_name_sets(&fs_endpoints, &store_endpoints),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStrategy {
    FsToStore,
    StoreToFs,
    FsWins,
    StoreWins,
    ManualReview,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum SyncAction {
    CopyFsToStore,
    CopyStoreToFs,
    DeleteFromStore,
    ManualReview,
}

/// Determines, for one comparison bucket (only-fs / only-store / in-both),
/// which action a strategy prescribes.
fn action_for(strategy: SyncStrategy, bucket: Bucket) -> SyncAction {
    match (strategy, bucket) {
        (SyncStrategy::FsToStore, Bucket::OnlyFs | Bucket::Both) => SyncAction::CopyFsToStore,
        (SyncStrategy::FsToStore, Bucket::OnlyStore) => SyncAction::DeleteFromStore,
        (SyncStrategy::StoreToFs, Bucket::OnlyStore | Bucket::Both) => SyncAction::CopyStoreToFs,
        (SyncStrategy::StoreToFs, Bucket::OnlyFs) => SyncAction::CopyStoreToFs,
        (SyncStrategy::FsWins, Bucket::OnlyFs | Bucket::Both) => SyncAction::CopyFsToStore,
        (SyncStrategy::FsWins, Bucket::OnlyStore) => SyncAction::DeleteFromStore,
        (SyncStrategy::StoreWins, Bucket::OnlyStore | Bucket::Both) => SyncAction::CopyStoreToFs,
        (SyncStrategy::StoreWins, Bucket::OnlyFs) => SyncAction::CopyStoreToFs,
        (SyncStrategy::ManualReview, _) => SyncAction::ManualReview,
    }
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    OnlyFs,
    OnlyStore,
    Both,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub successful: u32,
    pub failed: u32,
    pub manual_review_items: Vec<String>,
    pub errors: Vec<String>,
}

/// Executes a bidirectional sync between the filesystem and store sources
/// under `strategy`. `COPY_STORE_TO_FS` is a deliberate no-op stub — see
/// `spec.md`'s Open Questions — it records a "would copy" note rather than
/// rewriting filesystem descriptor files, which is out of scope for the
/// core engine.
pub async fn sync(
    strategy: SyncStrategy,
    fs_loader: &dyn ConfigLoader,
    store_loader: &dyn ConfigLoader,
    store_pool: &PgPool,
) -> Result<SyncReport, AppError> {
    let comparison = compare(fs_loader, store_loader).await?;
    let mut report = SyncReport::default();

    sync_kind(
        strategy,
        "cordal_databases",
        &comparison.databases,
        &fs_loader.load_databases().await?,
        store_pool,
        &mut report,
    )
    .await;
    sync_kind(
        strategy,
        "cordal_queries",
        &comparison.queries,
        &fs_loader.load_queries().await?,
        store_pool,
        &mut report,
    )
    .await;
    sync_kind(
        strategy,
        "cordal_endpoints",
        &comparison.endpoints,
        &fs_loader.load_endpoints().await?,
        store_pool,
        &mut report,
    )
    .await;

    Ok(report)
}

async fn sync_kind<T: serde::Serialize>(
    strategy: SyncStrategy,
    table: &str,
    comparison: &KindComparison,
    fs_descriptors: &HashMap<String, T>,
    store_pool: &PgPool,
    report: &mut SyncReport,
) {
    let buckets = comparison
        .only_in_filesystem
        .iter()
        .map(|n| (n, Bucket::OnlyFs))
        .chain(comparison.only_in_store.iter().map(|n| (n, Bucket::OnlyStore)))
        .chain(comparison.in_both.iter().map(|n| (n, Bucket::Both)));

    for (name, bucket) in buckets {
        match action_for(strategy, bucket) {
            SyncAction::CopyFsToStore => {
                let Some(descriptor) = fs_descriptors.get(name) else { continue };
                match serde_json::to_string(descriptor) {
                    Ok(body) => match store::upsert(store_pool, table, name, &body).await {
                        Ok(()) => report.successful += 1,
                        Err(e) => {
                            report.failed += 1;
                            report.errors.push(format!("{name}: {e}"));
                        }
                    },
                    Err(e) => {
                        report.failed += 1;
                        report.errors.push(format!("{name}: serialize failed: {e}"));
                    }
                }
            }
            SyncAction::DeleteFromStore => match store::delete(store_pool, table, name).await {
                Ok(_) => report.successful += 1,
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("{name}: {e}"));
                }
            },
            SyncAction::CopyStoreToFs => {
                tracing::info!(name, table, "would copy store descriptor to filesystem (unsupported, stub)");
                report.successful += 1;
            }
            SyncAction::ManualReview => {
                report.manual_review_items.push(name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_to_store_deletes_store_only_entries() {
        assert_eq!(action_for(SyncStrategy::FsToStore, Bucket::OnlyStore), SyncAction::DeleteFromStore);
        assert_eq!(action_for(SyncStrategy::FsToStore, Bucket::OnlyFs), SyncAction::CopyFsToStore);
    }

    #[test]
    fn manual_review_strategy_never_acts() {
        assert_eq!(action_for(SyncStrategy::ManualReview, Bucket::OnlyFs), SyncAction::ManualReview);
        assert_eq!(action_for(SyncStrategy::ManualReview, Bucket::Both), SyncAction::ManualReview);
    }

    #[test]
    fn compare_name_sets_partitions_correctly() {
        let fs: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        let store: HashSet<String> = ["b", "c"].iter().map(|s| s.to_string()).collect();
        let comparison = compare_name_sets(&fs, &store);
        assert_eq!(comparison.only_in_filesystem, vec!["a".to_string()]);
        assert_eq!(comparison.only_in_store, vec!["c".to_string()]);
        assert_eq!(comparison.in_both, vec!["b".to_string()]);
    }
}
