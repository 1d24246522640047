//! The retrieval engine: assembles fully denormalized views of catalog modules.
//!
//! Resolving is read-only and safe to do concurrently. The view covers a module's current release
//! (the one with the highest sort index); older releases are exposed as their version strings
//! only and have to be resolved explicitly with [`resolve_at`][Resolver::resolve_at] for their
//! full records.

use crate::{
    error::ResolveError,
    feed::{ModuleKind, ReleaseStatus, ResourceLinks},
    store::{
        models::{Module, RelType, Release},
        Store,
    },
    version::GameVersion,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Resolves module identifiers into denormalized views of their current state in the catalog.
pub struct Resolver {
    /// The program store the views are assembled from.
    store: Arc<Store>,
}

/// A fully denormalized view of one release of a module, assembled for display or any other
/// consumer.
#[derive(Debug)]
pub struct ResolvedModule {
    /// The module's name.
    pub module: String,
    /// The name of the repository the module belongs to.
    pub repository: String,
    /// The module's human-readable display name as of this release.
    pub display_name: String,
    /// The release's version string.
    pub version: String,
    /// The release's position in its module's total version order.
    pub sort_index: i64,
    /// Whether the version string degraded to lexicographic ordering.
    pub version_malformed: bool,
    pub kind: ModuleKind,
    /// The release's status. Display omits the annotation for Stable.
    pub release_status: ReleaseStatus,
    pub summary: String,
    pub description: Option<String>,
    /// The release's resource links, decoded from the stored metadata. Each is optional.
    pub resources: ResourceLinks,
    /// The release's authors in their declared order.
    pub authors: Vec<String>,
    /// The release's licenses, deduplicated.
    pub licenses: Vec<String>,
    /// The release's tags in their declared order.
    pub tags: Vec<String>,
    pub localizations: Vec<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub download_size: Option<i64>,
    pub install_size: Option<i64>,
    /// Upper bound of the compatible game version range.
    pub game_version: Option<GameVersion>,
    /// Lower bound of the compatible game version range.
    pub game_version_min: Option<GameVersion>,
    pub game_version_strict: bool,
    pub download_count: i64,
    /// The release's relationship groups in their declared order. Any one member satisfies its
    /// group; every group stands on its own.
    pub relationships: Vec<ResolvedGroup>,
    /// The successor directive, for deprecated releases.
    pub replacement: Option<ResolvedRelationship>,
    /// The version strings of the module's other releases, newest first.
    pub other_versions: Vec<String>,
}

/// One relationship group of a resolved release.
#[derive(Debug)]
pub struct ResolvedGroup {
    pub rel_type: RelType,
    pub choice_help_text: Option<String>,
    /// Passed through from the feed; whether it hides the group entirely or only mutes default
    /// prompting is the consumer's decision.
    pub suppress_recommendations: bool,
    /// The group's alternative members in their declared order.
    pub members: Vec<ResolvedRelationship>,
}

/// One member of a resolved relationship group.
#[derive(Debug)]
pub struct ResolvedRelationship {
    /// The target's name: a concrete module name or a virtual name. Classify with
    /// [`classify_target`][Resolver::classify_target] when satisfiability matters.
    pub target: String,
    /// The exact or maximum target version, per the stored constraint.
    pub version: Option<String>,
    /// The minimum target version, making the constraint an inclusive range.
    pub version_min: Option<String>,
}

/// What a relationship target name refers to.
#[derive(Debug, PartialEq)]
pub enum Target {
    /// A module that exists in the catalog, by its store ID.
    Concrete(i64),
    /// A name no module carries; satisfiable only through some release's Provides group.
    Virtual,
}

impl Resolver {
    /// Creates a new resolver on top of a given store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Resolves a module identifier into a view of its current release.
    ///
    /// The identifier is either a bare module name, looked up across all repositories with the
    /// most preferred repository winning on ambiguity, or a `repository/module` pair.
    ///
    /// # Errors
    /// Returns [`ResolveError::ModuleNotFound`] if no module matches the identifier and
    /// [`ResolveError::NoReleases`] if the module exists without any releases.
    pub async fn resolve(&self, identifier: &str) -> anyhow::Result<ResolvedModule> {
        let module = self
            .lookup_module(identifier)
            .await?
            .ok_or_else(|| ResolveError::ModuleNotFound(identifier.to_string()))?;

        let mut releases = self.store.catalog.get_releases(module.module_id).await?;
        if releases.is_empty() {
            return Err(ResolveError::NoReleases(identifier.to_string()).into());
        }

        let current = releases.remove(0);
        let other_versions = releases.into_iter().map(|release| release.version).collect();

        self.assemble(module, current, other_versions).await
    }

    /// Resolves a module identifier into a view of one explicit release version.
    ///
    /// # Errors
    /// As [`resolve`][Self::resolve], plus [`ResolveError::NoSuchRelease`] if the module has
    /// releases but none with the requested version.
    pub async fn resolve_at(
        &self,
        identifier: &str,
        version: &str,
    ) -> anyhow::Result<ResolvedModule> {
        let module = self
            .lookup_module(identifier)
            .await?
            .ok_or_else(|| ResolveError::ModuleNotFound(identifier.to_string()))?;

        let releases = self.store.catalog.get_releases(module.module_id).await?;
        if releases.is_empty() {
            return Err(ResolveError::NoReleases(identifier.to_string()).into());
        }

        let mut chosen = None;
        let mut other_versions = Vec::new();
        for release in releases {
            if chosen.is_none() && release.version == version {
                chosen = Some(release);
            } else {
                other_versions.push(release.version);
            }
        }

        match chosen {
            Some(release) => self.assemble(module, release, other_versions).await,
            None => Err(ResolveError::NoSuchRelease {
                module: identifier.to_string(),
                version: version.to_string(),
            }
            .into()),
        }
    }

    /// Classifies a relationship target name: a concrete module in the catalog, or a virtual
    /// name. Nothing in the catalog requires a target to exist, so this is resolved lazily only
    /// when a consumer cares.
    pub async fn classify_target(&self, target_name: &str) -> anyhow::Result<Target> {
        Ok(self
            .store
            .catalog
            .find_module(target_name.to_string())
            .await?
            .map_or(Target::Virtual, |module| {
                Target::Concrete(module.module_id)
            }))
    }

    /// Looks up a module by a bare name or a `repository/module` pair.
    async fn lookup_module(&self, identifier: &str) -> anyhow::Result<Option<Module>> {
        if let Some(separator) = identifier.find('/') {
            let (repository_name, module_name) = identifier.split_at(separator);

            let repository = match self
                .store
                .catalog
                .get_repository(repository_name.to_string())
                .await?
            {
                Some(repository) => repository,
                None => return Ok(None),
            };

            self.store
                .catalog
                .get_module(repository.repo_id, module_name[1..].to_string())
                .await
        } else {
            self.store.catalog.find_module(identifier.to_string()).await
        }
    }

    /// Assembles the full view of one release of a module.
    async fn assemble(
        &self,
        module: Module,
        release: Release,
        other_versions: Vec<String>,
    ) -> anyhow::Result<ResolvedModule> {
        let catalog = &self.store.catalog;

        let repository = catalog
            .get_repository_by_id(module.repo_id)
            .await?
            .map(|repository| repository.name)
            .unwrap_or_default();

        let authors = catalog
            .get_release_authors(release.release_id)
            .await?
            .into_iter()
            .map(|author| author.author)
            .collect();
        let mut licenses: Vec<String> = catalog
            .get_release_licenses(release.release_id)
            .await?
            .into_iter()
            .map(|license| license.license)
            .collect();
        licenses.dedup();
        let tags = catalog
            .get_release_tags(release.release_id)
            .await?
            .into_iter()
            .map(|tag| tag.tag)
            .collect();
        let localizations = catalog
            .get_release_localizations(release.release_id)
            .await?
            .into_iter()
            .map(|localization| localization.locale)
            .collect();

        let relationships = catalog
            .get_relationship_groups(release.release_id)
            .await?
            .into_iter()
            .map(|(group, members)| ResolvedGroup {
                rel_type: group.rel_type,
                choice_help_text: group.choice_help_text,
                suppress_recommendations: group.suppress_recommendations,
                members: members
                    .into_iter()
                    .map(|member| ResolvedRelationship {
                        target: member.target_name,
                        version: member.target_version,
                        version_min: member.target_version_min,
                    })
                    .collect(),
            })
            .collect();

        let replacement = catalog
            .get_replacement(release.release_id)
            .await?
            .map(|replacement| ResolvedRelationship {
                target: replacement.target_name,
                version: replacement.target_version,
                version_min: replacement.target_version_min,
            });

        Ok(ResolvedModule {
            module: module.module_name,
            repository,
            display_name: release.display_name,
            version: release.version,
            sort_index: release.sort_index,
            version_malformed: release.version_malformed,
            kind: release.kind,
            release_status: release.release_status,
            summary: release.summary,
            description: release.description,
            resources: release.metadata.resources,
            authors,
            licenses,
            tags,
            localizations,
            release_date: release.release_date,
            download_size: release.download_size,
            install_size: release.install_size,
            game_version: release.game_version,
            game_version_min: release.game_version_min,
            game_version_strict: release.game_version_strict,
            download_count: module.download_count,
            relationships,
            replacement,
            other_versions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ResolveError,
        ingest,
        store::{self, models::Repository, Store, StoreLocation},
    };
    use serde_json::json;

    async fn get_test_store() -> Arc<Store> {
        Arc::new(
            store::Builder::<String>::from_location(StoreLocation::Memory)
                .skip_storing_checksum(true)
                .build()
                .await
                .expect("failed to build test store"),
        )
    }

    fn test_repository(name: &str, priority: i64) -> Repository {
        Repository {
            repo_id: 0,
            name: String::from(name),
            url: format!("https://example.com/{}.tar.gz", name),
            priority,
            mirror: false,
            comment: None,
        }
    }

    async fn ingest_document(store: &Store, repository: Repository, document: serde_json::Value) {
        let feed =
            crate::feed::FeedDocument::from_slice(&serde_json::to_vec(&document).unwrap()).unwrap();
        ingest::apply_feed(store, repository, feed)
            .await
            .expect("failed to apply feed");
    }

    #[tokio::test]
    async fn resolves_current_release() {
        let store = get_test_store().await;
        ingest_document(
            &store,
            test_repository("default", 0),
            json!({
                "modules": [
                    {
                        "identifier": "ROSolar",
                        "name": "Realism Overhaul Solar",
                        "version": "v1.2",
                        "abstract": "Solar panel rebalance",
                        "author": "linuxgurugamer",
                        "tags": ["tag1"],
                        "depends": [{ "name": "ModuleManager", "min_version": "4.0" }],
                    },
                    {
                        "identifier": "ROSolar",
                        "name": "Realism Overhaul Solar",
                        "version": "v1.1",
                        "abstract": "Solar panel rebalance",
                        "author": "linuxgurugamer",
                    },
                ],
            }),
        )
        .await;

        let resolver = Resolver::new(Arc::clone(&store));
        let resolved = resolver.resolve("ROSolar").await.expect("failed to resolve");

        assert_eq!(resolved.module, "ROSolar");
        assert_eq!(resolved.repository, "default");
        assert_eq!(resolved.version, "v1.2");
        // Stable carries no annotation in display
        assert_eq!(resolved.release_status, ReleaseStatus::Stable);
        assert_eq!(resolved.authors, vec!["linuxgurugamer"]);
        assert_eq!(resolved.tags, vec!["tag1"]);
        assert_eq!(resolved.other_versions, vec!["v1.1"]);

        assert_eq!(resolved.relationships.len(), 1);
        let group = &resolved.relationships[0];
        assert_eq!(group.rel_type, RelType::Depends);
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].target, "ModuleManager");
        assert_eq!(group.members[0].version_min.as_deref(), Some("4.0"));
    }

    #[tokio::test]
    async fn missing_module_is_module_not_found() {
        let store = get_test_store().await;
        let resolver = Resolver::new(store);

        let err = resolver
            .resolve("DoesNotExist")
            .await
            .expect_err("resolved a nonexistent module");
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::ModuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn releaseless_module_is_no_releases() {
        let store = get_test_store().await;
        let repo_id = store
            .catalog
            .upsert_repository(test_repository("default", 0))
            .await
            .unwrap();
        store
            .catalog
            .upsert_module(repo_id, String::from("Empty"))
            .await
            .unwrap();

        let resolver = Resolver::new(store);
        let err = resolver
            .resolve("Empty")
            .await
            .expect_err("resolved a module without releases");
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::NoReleases(_))
        ));
    }

    #[tokio::test]
    async fn group_structure_is_preserved() {
        let store = get_test_store().await;
        ingest_document(
            &store,
            test_repository("default", 0),
            json!({
                "modules": [{
                    "identifier": "Choosy",
                    "name": "Choosy",
                    "version": "1.0",
                    "abstract": "",
                    "author": "someone",
                    "depends": [
                        {
                            "any_of": [
                                { "name": "First" },
                                { "name": "Second" },
                                { "name": "Third" },
                            ],
                            "choice_help_text": "pick any one",
                        },
                        { "name": "Mandatory" },
                    ],
                }],
            }),
        )
        .await;

        let resolver = Resolver::new(store);
        let resolved = resolver.resolve("Choosy").await.unwrap();

        // both Depends groups are reported: all groups must hold
        assert_eq!(resolved.relationships.len(), 2);

        // within the first group the alternatives are neither collapsed nor reordered: any one
        // of them satisfies the group
        let choice = &resolved.relationships[0];
        assert_eq!(choice.rel_type, RelType::Depends);
        assert_eq!(choice.choice_help_text.as_deref(), Some("pick any one"));
        let names: Vec<&str> = choice.members.iter().map(|m| m.target.as_str()).collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);

        let mandatory = &resolved.relationships[1];
        assert_eq!(mandatory.rel_type, RelType::Depends);
        assert_eq!(mandatory.members.len(), 1);
        assert_eq!(mandatory.members[0].target, "Mandatory");
    }

    #[tokio::test]
    async fn explicit_version_resolution() {
        let store = get_test_store().await;
        ingest_document(
            &store,
            test_repository("default", 0),
            json!({
                "modules": [
                    {
                        "identifier": "Versioned",
                        "name": "Versioned",
                        "version": "2.0",
                        "abstract": "",
                        "author": "someone",
                    },
                    {
                        "identifier": "Versioned",
                        "name": "Versioned",
                        "version": "1.0",
                        "abstract": "",
                        "author": "someone",
                        "release_status": "testing",
                    },
                ],
            }),
        )
        .await;

        let resolver = Resolver::new(store);

        let old = resolver.resolve_at("Versioned", "1.0").await.unwrap();
        assert_eq!(old.version, "1.0");
        assert_eq!(old.release_status, ReleaseStatus::Testing);
        assert_eq!(old.other_versions, vec!["2.0"]);

        let err = resolver
            .resolve_at("Versioned", "3.0")
            .await
            .expect_err("resolved a nonexistent release");
        assert!(matches!(
            err.downcast_ref::<ResolveError>(),
            Some(ResolveError::NoSuchRelease { .. })
        ));
    }

    #[tokio::test]
    async fn ambiguous_names_prefer_lower_priority() {
        let store = get_test_store().await;

        let module = json!({
            "identifier": "Shared",
            "name": "Shared",
            "version": "1.0",
            "abstract": "",
            "author": "someone",
        });
        ingest_document(
            &store,
            test_repository("secondary", 10),
            json!({ "modules": [module.clone()] }),
        )
        .await;
        ingest_document(
            &store,
            test_repository("primary", 0),
            json!({ "modules": [module] }),
        )
        .await;

        let resolver = Resolver::new(store);
        let resolved = resolver.resolve("Shared").await.unwrap();
        assert_eq!(resolved.repository, "primary");

        // a repository-qualified identifier overrides the priority order
        let resolved = resolver.resolve("secondary/Shared").await.unwrap();
        assert_eq!(resolved.repository, "secondary");
    }

    #[tokio::test]
    async fn classifies_virtual_and_concrete_targets() {
        let store = get_test_store().await;
        ingest_document(
            &store,
            test_repository("default", 0),
            json!({
                "modules": [{
                    "identifier": "SolarPanels",
                    "name": "Solar Panels",
                    "version": "1.0",
                    "abstract": "",
                    "author": "someone",
                    "provides": ["PowerSource"],
                }],
            }),
        )
        .await;

        let resolver = Resolver::new(store);

        assert!(matches!(
            resolver.classify_target("SolarPanels").await.unwrap(),
            Target::Concrete(_)
        ));
        // the provided name is usable as a dependency target without a module row existing
        assert_eq!(
            resolver.classify_target("PowerSource").await.unwrap(),
            Target::Virtual
        );

        let resolved = resolver.resolve("SolarPanels").await.unwrap();
        assert_eq!(resolved.relationships.len(), 1);
        assert_eq!(resolved.relationships[0].rel_type, RelType::Provides);
        assert_eq!(resolved.relationships[0].members[0].target, "PowerSource");
    }
}
