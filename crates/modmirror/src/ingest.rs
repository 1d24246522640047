//! The feed ingestion engine: merges a parsed repository feed into the catalog store.
//!
//! Ingestion is idempotent: applying the same feed twice leaves the store with the same rows, the
//! same ordinals and the same sort indices. A single invalid descriptor is skipped and reported
//! without aborting the rest of the feed; an unreadable feed never gets this far (it fails in
//! [`FeedDocument::from_slice`][crate::feed::FeedDocument::from_slice] before anything is
//! written).

use crate::{
    error::DescriptorError,
    feed::{self, FeedDocument, ModuleDescriptor},
    store::{
        models::{
            GameBuild, NewRelationship, NewRelationshipGroup, NewRelease, NewReplacement,
            RelType, ReleaseMetadata, Repository, RepositoryRef,
        },
        Store,
    },
    version::ModVersion,
};
use log::*;
use std::collections::HashSet;

/// One module descriptor that couldn't be ingested and was skipped.
#[derive(Debug)]
pub struct SkippedDescriptor {
    /// The descriptor's position within the feed document.
    pub index: usize,
    /// The descriptor's module identifier, when it could be extracted.
    pub identifier: Option<String>,
    /// Why the descriptor was skipped.
    pub reason: DescriptorError,
}

/// A release whose version string degraded to lexicographic ordering.
#[derive(Debug)]
pub struct MalformedVersion {
    pub identifier: String,
    pub version: String,
}

/// The outcome of applying one feed to the store.
#[derive(Debug)]
pub struct IngestReport {
    /// The name of the repository the feed was applied to.
    pub repository: String,
    /// How many release descriptors were applied.
    pub applied: usize,
    /// The descriptors that were skipped, with their reasons.
    pub skipped: Vec<SkippedDescriptor>,
    /// The applied releases whose version strings degraded to lexicographic ordering.
    pub malformed_versions: Vec<MalformedVersion>,
}

/// Applies a parsed feed document to the store under a given repository, creating or updating the
/// repository itself, its refs, the game build map, and every module release the feed declares.
/// Returns a report of what was applied and what was skipped.
pub async fn apply_feed(
    store: &Store,
    repository: Repository,
    feed: FeedDocument,
) -> anyhow::Result<IngestReport> {
    let repository_name = repository.name.clone();
    info!(
        "Ingesting feed for repository {} ({} module entries)",
        repository_name,
        feed.modules.len()
    );

    let repo_id = store.catalog.upsert_repository(repository).await?;

    for repository_ref in &feed.repositories {
        store
            .catalog
            .add_repository_ref(RepositoryRef {
                referrer_id: repo_id,
                name: repository_ref.name.clone(),
                url: repository_ref.url.to_string(),
                priority: repository_ref.priority,
                mirror: repository_ref.x_mirror,
                comment: repository_ref.x_comment.clone(),
            })
            .await?;
    }

    let mut builds = Vec::new();
    for (build_id, version) in &feed.builds {
        match version.parse() {
            Ok(version) => builds.push(GameBuild {
                build_id: i64::from(*build_id),
                version,
            }),
            Err(e) => warn!("Skipping game build {}: {}", build_id, e),
        }
    }
    if !builds.is_empty() {
        store.set_game_builds(builds).await?;
    }

    let mut report = IngestReport {
        repository: repository_name,
        applied: 0,
        skipped: Vec::new(),
        malformed_versions: Vec::new(),
    };
    // modules whose version set changed and whose sort indices are stale because of it
    let mut stale_modules = HashSet::new();

    for (index, entry) in feed.modules.iter().enumerate() {
        let descriptor = match feed::decode_descriptor(entry) {
            Ok(descriptor) => descriptor,
            Err(reason) => {
                let identifier = entry
                    .get("identifier")
                    .and_then(|v| v.as_str())
                    .map(String::from);
                warn!(
                    "Skipping module entry {} ({}): {}",
                    index,
                    identifier.as_deref().unwrap_or("unknown identifier"),
                    reason
                );
                report.skipped.push(SkippedDescriptor {
                    index,
                    identifier,
                    reason,
                });
                continue;
            }
        };

        let version = ModVersion::parse(&descriptor.version);
        if !version.is_well_formed() {
            // degraded but not fatal; the release is flagged and ingested anyway
            warn!(
                "Module {} release {} has a malformed version, ordering degrades to lexicographic",
                descriptor.identifier, descriptor.version
            );
            report.malformed_versions.push(MalformedVersion {
                identifier: descriptor.identifier.clone(),
                version: descriptor.version.clone(),
            });
        }

        let module_id = store
            .catalog
            .upsert_module(repo_id, descriptor.identifier.clone())
            .await?;
        let upsert = store
            .catalog
            .upsert_release(module_id, new_release(&descriptor, !version.is_well_formed()))
            .await?;

        if upsert.inserted {
            stale_modules.insert(module_id);
        }

        report.applied += 1;
    }

    for (module_name, download_count) in &feed.download_counts {
        store
            .catalog
            .set_download_count(repo_id, module_name.clone(), *download_count)
            .await?;
    }

    for module_id in stale_modules {
        store.catalog.recompute_sort_indices(module_id).await?;
    }

    info!(
        "Feed for repository {} ingested: {} applied, {} skipped",
        report.repository,
        report.applied,
        report.skipped.len()
    );
    Ok(report)
}

/// Maps a module descriptor to the release row and child set to store for it.
fn new_release(descriptor: &ModuleDescriptor, version_malformed: bool) -> NewRelease {
    let (game_version, game_version_min) = descriptor.game_version_range();

    let mut relationship_groups = Vec::new();
    for (rel_type, entry) in descriptor.relationships() {
        relationship_groups.push(NewRelationshipGroup {
            rel_type,
            choice_help_text: entry.choice_help_text.clone(),
            suppress_recommendations: entry.suppress_recommendations,
            members: entry
                .descriptor
                .flatten()
                .into_iter()
                .map(|direct| NewRelationship {
                    target_name: direct.name.clone(),
                    // an exact version constraint doubles as the upper bound
                    target_version: direct.version.clone().or_else(|| direct.max_version.clone()),
                    target_version_min: direct.min_version.clone(),
                })
                .collect(),
        });
    }

    // each provided virtual name is its own single-member group
    for provided in &descriptor.provides {
        relationship_groups.push(NewRelationshipGroup {
            rel_type: RelType::Provides,
            choice_help_text: None,
            suppress_recommendations: false,
            members: vec![NewRelationship {
                target_name: provided.clone(),
                target_version: None,
                target_version_min: None,
            }],
        });
    }

    NewRelease {
        version: descriptor.version.clone(),
        version_malformed,
        kind: descriptor.kind,
        display_name: descriptor.name.clone(),
        summary: descriptor.summary.clone(),
        metadata: ReleaseMetadata {
            comment: descriptor.comment.clone(),
            download: descriptor.download.clone(),
            download_hash: descriptor.download_hash.clone(),
            download_content_type: descriptor.download_content_type.clone(),
            resources: descriptor.resources.clone(),
            install: descriptor.install.clone(),
        },
        description: descriptor.description.clone(),
        release_status: descriptor.release_status,
        game_version,
        game_version_min,
        game_version_strict: descriptor.game_version_strict,
        download_size: descriptor.download_size,
        install_size: descriptor.install_size,
        release_date: descriptor.release_date,
        authors: descriptor.author.clone(),
        licenses: descriptor.license.clone(),
        tags: descriptor.tags.clone(),
        localizations: descriptor.localizations.clone(),
        relationship_groups,
        replacement: descriptor.replaced_by.as_ref().map(|replaced_by| NewReplacement {
            target_name: replaced_by.name.clone(),
            target_version: replaced_by.version.clone(),
            target_version_min: replaced_by.min_version.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{self, StoreLocation};
    use serde_json::json;

    async fn get_test_store() -> Store {
        store::Builder::<String>::from_location(StoreLocation::Memory)
            .skip_storing_checksum(true)
            .build()
            .await
            .expect("failed to build test store")
    }

    fn test_repository() -> Repository {
        Repository {
            repo_id: 0,
            name: String::from("default"),
            url: String::from("https://example.com/repository.tar.gz"),
            priority: 0,
            mirror: false,
            comment: None,
        }
    }

    fn test_feed() -> FeedDocument {
        let document = json!({
            "modules": [
                {
                    "identifier": "ROSolar",
                    "name": "Realism Overhaul Solar",
                    "version": "v1.2",
                    "abstract": "Solar panel rebalance",
                    "author": "linuxgurugamer",
                    "license": "MIT",
                    "tags": ["tag1"],
                    "depends": [
                        { "name": "ModuleManager", "min_version": "4.0" },
                    ],
                },
                {
                    "identifier": "ROSolar",
                    "name": "Realism Overhaul Solar",
                    "version": "v1.1",
                    "abstract": "Solar panel rebalance",
                    "author": "linuxgurugamer",
                    "license": "MIT",
                },
            ],
            "builds": { "2788": "1.10.1" },
            "download_counts": { "ROSolar": 1234 },
            "repositories": [
                { "name": "mirror", "uri": "https://mirror.example.com/repo.tar.gz", "x_mirror": true },
            ],
        });

        FeedDocument::from_slice(&serde_json::to_vec(&document).unwrap())
            .expect("failed to read test feed")
    }

    #[tokio::test]
    async fn feed_applies_fully() {
        let store = get_test_store().await;
        let report = apply_feed(&store, test_repository(), test_feed())
            .await
            .expect("failed to apply feed");

        assert_eq!(report.applied, 2);
        assert!(report.skipped.is_empty());
        assert!(report.malformed_versions.is_empty());

        let module = store
            .catalog
            .find_module(String::from("ROSolar"))
            .await
            .unwrap()
            .expect("no module");
        assert_eq!(module.download_count, 1234);

        let releases = store.catalog.get_releases(module.module_id).await.unwrap();
        let versions: Vec<&str> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["v1.2", "v1.1"]);

        let groups = store
            .catalog
            .get_relationship_groups(releases[0].release_id)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].1[0].target_name, "ModuleManager");
        assert_eq!(groups[0].1[0].target_version_min.as_deref(), Some("4.0"));

        let builds = store.get_game_builds().await.unwrap();
        assert_eq!(builds.len(), 1);

        let repository = store
            .catalog
            .get_repository(String::from("default"))
            .await
            .unwrap()
            .expect("no repository");
        let refs = store
            .catalog
            .get_repository_refs(repository.repo_id)
            .await
            .unwrap();
        assert_eq!(refs.len(), 1);
        assert!(refs[0].mirror);
    }

    #[tokio::test]
    async fn reingest_is_idempotent() {
        let store = get_test_store().await;

        apply_feed(&store, test_repository(), test_feed())
            .await
            .expect("failed to apply feed");

        let module = store
            .catalog
            .find_module(String::from("ROSolar"))
            .await
            .unwrap()
            .expect("no module");
        let first_releases = store.catalog.get_releases(module.module_id).await.unwrap();

        let report = apply_feed(&store, test_repository(), test_feed())
            .await
            .expect("failed to re-apply feed");
        assert_eq!(report.applied, 2);

        let second_releases = store.catalog.get_releases(module.module_id).await.unwrap();
        assert_eq!(first_releases.len(), second_releases.len());

        for (first, second) in first_releases.iter().zip(second_releases.iter()) {
            // same rows, same identities, same sort indices
            assert_eq!(first.release_id, second.release_id);
            assert_eq!(first.version, second.version);
            assert_eq!(first.sort_index, second.sort_index);
        }

        // child ordinals didn't get renumbered either
        let tags = store
            .catalog
            .get_release_tags(first_releases[0].release_id)
            .await
            .unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].ordinal, 0);
    }

    #[tokio::test]
    async fn invalid_descriptor_is_skipped_not_fatal() {
        let store = get_test_store().await;

        let document = json!({
            "modules": [
                { "identifier": "Broken" },
                {
                    "identifier": "Working",
                    "name": "Working",
                    "version": "1.0",
                    "abstract": "",
                    "author": "someone",
                },
            ],
        });
        let feed = FeedDocument::from_slice(&serde_json::to_vec(&document).unwrap()).unwrap();

        let report = apply_feed(&store, test_repository(), feed)
            .await
            .expect("failed to apply feed");

        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 0);
        assert_eq!(report.skipped[0].identifier.as_deref(), Some("Broken"));

        assert!(store
            .catalog
            .find_module(String::from("Working"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn malformed_version_degrades_and_is_flagged() {
        let store = get_test_store().await;

        let document = json!({
            "modules": [
                {
                    "identifier": "Odd",
                    "name": "Odd",
                    "version": "not a version!",
                    "abstract": "",
                    "author": "someone",
                },
                {
                    "identifier": "Odd",
                    "name": "Odd",
                    "version": "1.0",
                    "abstract": "",
                    "author": "someone",
                },
            ],
        });
        let feed = FeedDocument::from_slice(&serde_json::to_vec(&document).unwrap()).unwrap();

        let report = apply_feed(&store, test_repository(), feed)
            .await
            .expect("failed to apply feed");

        assert_eq!(report.applied, 2);
        assert_eq!(report.malformed_versions.len(), 1);
        assert_eq!(report.malformed_versions[0].version, "not a version!");

        let module = store
            .catalog
            .find_module(String::from("Odd"))
            .await
            .unwrap()
            .expect("no module");
        let releases = store.catalog.get_releases(module.module_id).await.unwrap();

        // the malformed version sorts below the well-formed one and carries its flag
        assert_eq!(releases[0].version, "1.0");
        assert!(!releases[0].version_malformed);
        assert_eq!(releases[1].version, "not a version!");
        assert!(releases[1].version_malformed);
    }
}
