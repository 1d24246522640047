//! The module catalog: repositories, their modules, and the modules' releases with the full
//! inter-release relationship graph.
//!
//! Every multi-row write runs as a single transaction, so a reader never observes a release with
//! only part of its children in place.

use crate::{sql, store::models::*, version::ModVersion};
use log::*;
use rusqlite::{Connection, OptionalExtension, ToSql, NO_PARAMS};
use std::sync::{Arc, Mutex};
use tokio::task;

/// All releases of a module, newest first.
const SELECT_RELEASES: &str =
    "SELECT * FROM module_releases WHERE module_id = :module_id ORDER BY sort_index DESC";
/// A module looked up by its bare name across all repositories, most preferred repository first.
const SELECT_MODULE_BY_NAME: &str = "SELECT modules.* FROM modules JOIN repositories ON \
                                     repositories.repo_id = modules.repo_id WHERE \
                                     modules.module_name = :module_name ORDER BY \
                                     repositories.priority, repositories.repo_id";
/// A module's releases in insertion order, i.e. the order the feed first declared them in.
const SELECT_SORTABLE_RELEASES: &str = "SELECT release_id, version FROM module_releases WHERE \
                                        module_id = :module_id ORDER BY release_id";
const UPDATE_SORT_INDEX: &str =
    "UPDATE module_releases SET sort_index = :sort_index WHERE release_id = :release_id";
const DELETE_REPOSITORY: &str = "DELETE FROM repositories WHERE name = :name";
const SELECT_REPOSITORY_BY_ID: &str = "SELECT * FROM repositories WHERE repo_id = :repo_id";
const INCREMENT_DOWNLOAD_COUNT: &str =
    "UPDATE modules SET download_count = download_count + 1 WHERE module_id = :module_id";

/// The module catalog within the program store.
pub struct Catalog {
    /// Reference to the SQLite connection to the program database.
    pub(super) conn: Arc<Mutex<Connection>>,
}

/// The outcome of upserting a release.
#[derive(Debug)]
pub struct ReleaseUpsert {
    /// The release's store ID.
    pub release_id: i64,
    /// Whether the release was newly inserted, i.e. whether its module's version set grew. The
    /// module's sort indices have to be recomputed when it did.
    pub inserted: bool,
}

impl Catalog {
    /// Creates or updates a repository by its unique name and returns its store ID. Updating
    /// preserves the ID, and with it every module under the repository.
    pub async fn upsert_repository(&self, repository: Repository) -> anyhow::Result<i64> {
        debug!(
            "Upserting repository {} ({})",
            repository.name, repository.url
        );

        let conn = &self.conn;
        sql!(mut conn => {
            let tx = conn.transaction()?;

            let existing: Option<Repository> = tx
                .prepare(Repository::select())?
                .query_row_named(&Repository::select_params(&repository.name), |row| {
                    Ok(row.into())
                })
                .optional()?;

            let repo_id = match existing {
                Some(existing) => {
                    tx.execute_named(Repository::update(), &repository.all_params())?;
                    existing.repo_id
                }
                None => {
                    tx.execute_named(Repository::replace_into(), &repository.all_params())?;
                    tx.last_insert_rowid()
                }
            };

            tx.commit()?;
            Ok(repo_id)
        })
    }

    /// Retrieves an optional repository by its unique name.
    pub async fn get_repository(&self, name: String) -> anyhow::Result<Option<Repository>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(Repository::select())?;

            Ok(stmt
                .query_row_named(&Repository::select_params(&name), |row| {
                    Ok(row.into())
                })
                .optional()?)
        })
    }

    /// Retrieves an optional repository by its store ID.
    pub async fn get_repository_by_id(&self, repo_id: i64) -> anyhow::Result<Option<Repository>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(SELECT_REPOSITORY_BY_ID)?;

            Ok(stmt
                .query_row_named(&[(":repo_id", &repo_id as &dyn ToSql)], |row| {
                    Ok(row.into())
                })
                .optional()?)
        })
    }

    /// Retrieves all stored repositories.
    pub async fn all_repositories(&self) -> anyhow::Result<Vec<Repository>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(Repository::select_all())?;
            let mut repositories = Vec::new();

            for repository in stmt.query_map(NO_PARAMS, |row| {
                Ok(row.into())
            })? {
                repositories.push(repository?);
            }

            Ok(repositories)
        })
    }

    /// Deletes a repository by its unique name, cascading through its modules, their releases and
    /// every child row. Returns whether a repository was deleted.
    pub async fn delete_repository(&self, name: String) -> anyhow::Result<bool> {
        info!("Deleting repository {}", name);

        let conn = &self.conn;
        sql!(conn => {
            let deleted = conn.execute_named(
                DELETE_REPOSITORY,
                &[(":name", &name as &dyn ToSql)],
            )?;
            Ok(deleted > 0)
        })
    }

    /// Stores a repository ref, replacing any previous ref to the same URL from the same
    /// referrer.
    pub async fn add_repository_ref(&self, repository_ref: RepositoryRef) -> anyhow::Result<()> {
        let conn = &self.conn;
        sql!(conn => {
            conn.execute_named(RepositoryRef::replace_into(), &repository_ref.all_params())?;
            Ok(())
        })
    }

    /// Retrieves all repository refs of a given repository, most preferred first.
    pub async fn get_repository_refs(
        &self,
        referrer_id: i64,
    ) -> anyhow::Result<Vec<RepositoryRef>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(RepositoryRef::select())?;
            let mut refs = Vec::new();

            for repository_ref in
                stmt.query_map_named(&RepositoryRef::select_params(&referrer_id), |row| {
                    Ok(row.into())
                })?
            {
                refs.push(repository_ref?);
            }

            Ok(refs)
        })
    }

    /// Ensures a module with the given name exists under a repository and returns its store ID.
    /// Never overwrites an existing module or its download count.
    pub async fn upsert_module(&self, repo_id: i64, module_name: String) -> anyhow::Result<i64> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(Module::select())?;
            let existing: Option<Module> = stmt
                .query_row_named(&Module::select_params(&repo_id, &module_name), |row| {
                    Ok(row.into())
                })
                .optional()?;

            match existing {
                Some(module) => Ok(module.module_id),
                None => {
                    let module = Module {
                        module_id: 0,
                        repo_id,
                        module_name,
                        download_count: 0,
                    };
                    conn.execute_named(Module::replace_into(), &module.all_params())?;
                    Ok(conn.last_insert_rowid())
                }
            }
        })
    }

    /// Retrieves an optional module by its repository and name.
    pub async fn get_module(
        &self,
        repo_id: i64,
        module_name: String,
    ) -> anyhow::Result<Option<Module>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(Module::select())?;

            Ok(stmt
                .query_row_named(&Module::select_params(&repo_id, &module_name), |row| {
                    Ok(row.into())
                })
                .optional()?)
        })
    }

    /// Retrieves an optional module by its bare name across all repositories. If several
    /// repositories provide a module with the name, the one from the most preferred (lowest
    /// priority) repository is returned.
    pub async fn find_module(&self, module_name: String) -> anyhow::Result<Option<Module>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(SELECT_MODULE_BY_NAME)?;
            let mut modules = Vec::new();

            for module in stmt.query_map_named(
                &[(":module_name", &module_name as &dyn ToSql)],
                |row| Ok(row.into()),
            )? {
                modules.push(module?);
            }

            if modules.len() > 1 {
                debug!(
                    "Module name {} is ambiguous across {} repositories, picking the most \
                     preferred",
                    module_name,
                    modules.len()
                );
            }

            Ok(modules.into_iter().next())
        })
    }

    /// Sets a module's download count, creating the module if it doesn't exist yet.
    pub async fn set_download_count(
        &self,
        repo_id: i64,
        module_name: String,
        download_count: i64,
    ) -> anyhow::Result<()> {
        let conn = &self.conn;
        sql!(conn => {
            let module = Module {
                module_id: 0,
                repo_id,
                module_name,
                download_count,
            };

            let updated = conn.execute_named(Module::update(), &module.all_params())?;
            if updated == 0 {
                conn.execute_named(Module::replace_into(), &module.all_params())?;
            }

            Ok(())
        })
    }

    /// Increments a module's download count by one. Called by install-tracking collaborators, not
    /// by the ingestion path.
    pub async fn increment_download_count(&self, module_id: i64) -> anyhow::Result<()> {
        let conn = &self.conn;
        sql!(conn => {
            conn.execute_named(
                INCREMENT_DOWNLOAD_COUNT,
                &[(":module_id", &module_id as &dyn ToSql)],
            )?;
            Ok(())
        })
    }

    /// Creates or replaces a release of a module by its version string, replacing the release's
    /// entire child set in the same transaction. Updating preserves the release's store ID so the
    /// module's original feed order is kept for version tie-breaks.
    ///
    /// The release's sort index is left for [`recompute_sort_indices`][Self::recompute_sort_indices]
    /// to fill in; the returned [`ReleaseUpsert`](ReleaseUpsert) tells whether that's needed.
    pub async fn upsert_release(
        &self,
        module_id: i64,
        new: NewRelease,
    ) -> anyhow::Result<ReleaseUpsert> {
        let conn = &self.conn;
        sql!(mut conn => {
            let tx = conn.transaction()?;

            let existing: Option<Release> = tx
                .prepare(Release::select())?
                .query_row_named(&Release::select_params(&module_id, &new.version), |row| {
                    Ok(row.into())
                })
                .optional()?;

            let NewRelease {
                version,
                version_malformed,
                kind,
                display_name,
                summary,
                metadata,
                description,
                release_status,
                game_version,
                game_version_min,
                game_version_strict,
                download_size,
                install_size,
                release_date,
                authors,
                licenses,
                tags,
                localizations,
                relationship_groups,
                replacement,
            } = new;

            let release = Release {
                release_id: 0,
                module_id,
                version,
                version_malformed,
                sort_index: 0,
                kind,
                display_name,
                summary,
                metadata,
                description,
                release_status,
                game_version,
                game_version_min,
                game_version_strict,
                download_size,
                install_size,
                release_date,
            };

            let (release_id, inserted) = match existing {
                Some(existing) => {
                    tx.execute_named(Release::update(), &release.all_params())?;
                    (existing.release_id, false)
                }
                None => {
                    tx.execute_named(Release::replace_into(), &release.all_params())?;
                    (tx.last_insert_rowid(), true)
                }
            };

            // the whole child set is replaced, never partially overwritten
            tx.execute_named(ReleaseAuthor::delete(), &ReleaseAuthor::select_params(&release_id))?;
            tx.execute_named(
                ReleaseLicense::delete(),
                &ReleaseLicense::select_params(&release_id),
            )?;
            tx.execute_named(ReleaseTag::delete(), &ReleaseTag::select_params(&release_id))?;
            tx.execute_named(
                ReleaseLocalization::delete(),
                &ReleaseLocalization::select_params(&release_id),
            )?;
            // deleting a group cascades to its member relationships
            tx.execute_named(
                RelationshipGroup::delete(),
                &RelationshipGroup::select_params(&release_id),
            )?;
            tx.execute_named(Replacement::delete(), &Replacement::select_params(&release_id))?;

            {
                let mut stmt = tx.prepare(ReleaseAuthor::replace_into())?;
                for (ordinal, author) in authors.into_iter().enumerate() {
                    stmt.execute_named(
                        &ReleaseAuthor {
                            release_id,
                            ordinal: ordinal as i64,
                            author,
                        }
                        .all_params(),
                    )?;
                }
            }

            {
                let mut stmt = tx.prepare(ReleaseLicense::replace_into())?;
                for license in licenses {
                    stmt.execute_named(&ReleaseLicense { release_id, license }.all_params())?;
                }
            }

            {
                let mut stmt = tx.prepare(ReleaseTag::replace_into())?;
                for (ordinal, tag) in tags.into_iter().enumerate() {
                    stmt.execute_named(
                        &ReleaseTag {
                            release_id,
                            ordinal: ordinal as i64,
                            tag,
                        }
                        .all_params(),
                    )?;
                }
            }

            {
                let mut stmt = tx.prepare(ReleaseLocalization::replace_into())?;
                for locale in localizations {
                    stmt.execute_named(&ReleaseLocalization { release_id, locale }.all_params())?;
                }
            }

            {
                let mut group_stmt = tx.prepare(RelationshipGroup::replace_into())?;
                let mut member_stmt = tx.prepare(Relationship::replace_into())?;

                for (ordinal, group) in relationship_groups.into_iter().enumerate() {
                    group_stmt.execute_named(
                        &RelationshipGroup {
                            group_id: 0,
                            release_id,
                            ordinal: ordinal as i64,
                            rel_type: group.rel_type,
                            choice_help_text: group.choice_help_text,
                            suppress_recommendations: group.suppress_recommendations,
                        }
                        .all_params(),
                    )?;
                    let group_id = tx.last_insert_rowid();

                    for (member_ordinal, member) in group.members.into_iter().enumerate() {
                        member_stmt.execute_named(
                            &Relationship {
                                group_id,
                                ordinal: member_ordinal as i64,
                                target_name: member.target_name,
                                target_version: member.target_version,
                                target_version_min: member.target_version_min,
                            }
                            .all_params(),
                        )?;
                    }
                }
            }

            if let Some(replacement) = replacement {
                tx.execute_named(
                    Replacement::replace_into(),
                    &Replacement {
                        release_id,
                        target_name: replacement.target_name,
                        target_version: replacement.target_version,
                        target_version_min: replacement.target_version_min,
                    }
                    .all_params(),
                )?;
            }

            tx.commit()?;
            Ok(ReleaseUpsert { release_id, inserted })
        })
    }

    /// Deletes a release of a module by its version string, cascading through its children.
    /// Returns whether a release was deleted, in which case the module's sort indices have to be
    /// recomputed.
    pub async fn delete_release(&self, module_id: i64, version: String) -> anyhow::Result<bool> {
        let conn = &self.conn;
        sql!(conn => {
            let deleted = conn.execute_named(
                Release::delete(),
                &Release::select_params(&module_id, &version),
            )?;
            Ok(deleted > 0)
        })
    }

    /// Retrieves an optional release of a module by its version string.
    pub async fn get_release(
        &self,
        module_id: i64,
        version: String,
    ) -> anyhow::Result<Option<Release>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(Release::select())?;

            Ok(stmt
                .query_row_named(&Release::select_params(&module_id, &version), |row| {
                    Ok(row.into())
                })
                .optional()?)
        })
    }

    /// Retrieves all releases of a module, newest first. The first release is the module's
    /// current release.
    pub async fn get_releases(&self, module_id: i64) -> anyhow::Result<Vec<Release>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(SELECT_RELEASES)?;
            let mut releases = Vec::new();

            for release in stmt.query_map_named(
                &[(":module_id", &module_id as &dyn ToSql)],
                |row| Ok(row.into()),
            )? {
                releases.push(release?);
            }

            Ok(releases)
        })
    }

    /// Recomputes the sort indices of every release of a module so that index order matches
    /// version order, with the module's original feed order breaking ties. Recomputed from
    /// scratch on every call rather than shifted incrementally.
    pub async fn recompute_sort_indices(&self, module_id: i64) -> anyhow::Result<()> {
        let conn = &self.conn;
        sql!(mut conn => {
            let tx = conn.transaction()?;

            let mut releases: Vec<(i64, ModVersion)> = Vec::new();
            {
                let mut stmt = tx.prepare(SELECT_SORTABLE_RELEASES)?;
                for row in stmt.query_map_named(
                    &[(":module_id", &module_id as &dyn ToSql)],
                    |row| {
                        Ok((
                            row.get_unwrap::<_, i64>(0),
                            row.get_unwrap::<_, String>(1),
                        ))
                    },
                )? {
                    let (release_id, version) = row?;
                    releases.push((release_id, ModVersion::parse(&version)));
                }
            }

            // a stable sort keeps equal versions in insertion order
            releases.sort_by(|a, b| a.1.cmp(&b.1));

            {
                let mut stmt = tx.prepare(UPDATE_SORT_INDEX)?;
                for (sort_index, (release_id, _)) in releases.iter().enumerate() {
                    stmt.execute_named(&[
                        (":sort_index", &(sort_index as i64) as &dyn ToSql),
                        (":release_id", release_id as &dyn ToSql),
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Retrieves all authors of a release in their declared order.
    pub async fn get_release_authors(
        &self,
        release_id: i64,
    ) -> anyhow::Result<Vec<ReleaseAuthor>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(ReleaseAuthor::select())?;
            let mut authors = Vec::new();

            for author in stmt.query_map_named(&ReleaseAuthor::select_params(&release_id), |row| {
                Ok(row.into())
            })? {
                authors.push(author?);
            }

            Ok(authors)
        })
    }

    /// Retrieves all licenses of a release.
    pub async fn get_release_licenses(
        &self,
        release_id: i64,
    ) -> anyhow::Result<Vec<ReleaseLicense>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(ReleaseLicense::select())?;
            let mut licenses = Vec::new();

            for license in stmt.query_map_named(&ReleaseLicense::select_params(&release_id), |row| {
                Ok(row.into())
            })? {
                licenses.push(license?);
            }

            Ok(licenses)
        })
    }

    /// Retrieves all tags of a release in their declared order.
    pub async fn get_release_tags(&self, release_id: i64) -> anyhow::Result<Vec<ReleaseTag>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(ReleaseTag::select())?;
            let mut tags = Vec::new();

            for tag in stmt.query_map_named(&ReleaseTag::select_params(&release_id), |row| {
                Ok(row.into())
            })? {
                tags.push(tag?);
            }

            Ok(tags)
        })
    }

    /// Retrieves all localizations of a release.
    pub async fn get_release_localizations(
        &self,
        release_id: i64,
    ) -> anyhow::Result<Vec<ReleaseLocalization>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(ReleaseLocalization::select())?;
            let mut localizations = Vec::new();

            for localization in
                stmt.query_map_named(&ReleaseLocalization::select_params(&release_id), |row| {
                    Ok(row.into())
                })?
            {
                localizations.push(localization?);
            }

            Ok(localizations)
        })
    }

    /// Retrieves all relationship groups of a release with their member relationships, both in
    /// their declared order. The group structure is preserved: any one member satisfies its
    /// group, and every group stands on its own.
    pub async fn get_relationship_groups(
        &self,
        release_id: i64,
    ) -> anyhow::Result<Vec<(RelationshipGroup, Vec<Relationship>)>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut group_stmt = conn.prepare(RelationshipGroup::select())?;
            let mut member_stmt = conn.prepare(Relationship::select())?;
            let mut groups = Vec::new();

            let found_groups: Vec<RelationshipGroup> = group_stmt
                .query_map_named(&RelationshipGroup::select_params(&release_id), |row| {
                    Ok(row.into())
                })?
                .collect::<Result<_, _>>()?;

            for group in found_groups {
                let mut members = Vec::new();

                for member in
                    member_stmt.query_map_named(&Relationship::select_params(&group.group_id), |row| {
                        Ok(row.into())
                    })?
                {
                    members.push(member?);
                }

                groups.push((group, members));
            }

            Ok(groups)
        })
    }

    /// Retrieves the optional replacement directive of a release.
    pub async fn get_replacement(&self, release_id: i64) -> anyhow::Result<Option<Replacement>> {
        let conn = &self.conn;
        sql!(conn => {
            let mut stmt = conn.prepare(Replacement::select())?;

            Ok(stmt
                .query_row_named(&Replacement::select_params(&release_id), |row| {
                    Ok(row.into())
                })
                .optional()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        feed::{ModuleKind, ReleaseStatus},
        store::{self, Store, StoreLocation},
    };

    async fn get_test_store() -> Store {
        store::Builder::<String>::from_location(StoreLocation::Memory)
            .skip_storing_checksum(true)
            .build()
            .await
            .expect("failed to build test store")
    }

    fn test_repository(name: &str) -> Repository {
        Repository {
            repo_id: 0,
            name: String::from(name),
            url: format!("https://example.com/{}.tar.gz", name),
            priority: 0,
            mirror: false,
            comment: None,
        }
    }

    fn test_release(version: &str) -> NewRelease {
        NewRelease {
            version: String::from(version),
            version_malformed: false,
            kind: ModuleKind::Package,
            display_name: String::from("Test Module"),
            summary: String::from("A module for testing"),
            metadata: ReleaseMetadata::default(),
            description: None,
            release_status: ReleaseStatus::Stable,
            game_version: None,
            game_version_min: None,
            game_version_strict: false,
            download_size: None,
            install_size: None,
            release_date: None,
            authors: vec![String::from("tester")],
            licenses: vec![String::from("MIT")],
            tags: vec![String::from("test")],
            localizations: vec![],
            relationship_groups: vec![],
            replacement: None,
        }
    }

    #[tokio::test]
    async fn repository_upsert_preserves_id_and_modules() {
        let store = get_test_store().await;

        let repo_id = store
            .catalog
            .upsert_repository(test_repository("default"))
            .await
            .expect("failed to create repository");
        let module_id = store
            .catalog
            .upsert_module(repo_id, String::from("TestModule"))
            .await
            .expect("failed to create module");

        let mut updated = test_repository("default");
        updated.priority = 10;
        updated.comment = Some(String::from("updated"));
        let second_id = store
            .catalog
            .upsert_repository(updated)
            .await
            .expect("failed to update repository");

        assert_eq!(repo_id, second_id);

        let repository = store
            .catalog
            .get_repository(String::from("default"))
            .await
            .expect("failed to get repository")
            .expect("no repository");
        assert_eq!(repository.priority, 10);
        assert_eq!(repository.comment.as_deref(), Some("updated"));

        // the module survived the repository update
        let module = store
            .catalog
            .get_module(repo_id, String::from("TestModule"))
            .await
            .expect("failed to get module")
            .expect("no module");
        assert_eq!(module.module_id, module_id);
    }

    #[tokio::test]
    async fn module_upsert_preserves_download_count() {
        let store = get_test_store().await;
        let repo_id = store
            .catalog
            .upsert_repository(test_repository("default"))
            .await
            .unwrap();

        let module_id = store
            .catalog
            .upsert_module(repo_id, String::from("TestModule"))
            .await
            .unwrap();
        store
            .catalog
            .set_download_count(repo_id, String::from("TestModule"), 42)
            .await
            .unwrap();

        let second_id = store
            .catalog
            .upsert_module(repo_id, String::from("TestModule"))
            .await
            .unwrap();
        assert_eq!(module_id, second_id);

        let module = store
            .catalog
            .get_module(repo_id, String::from("TestModule"))
            .await
            .unwrap()
            .expect("no module");
        assert_eq!(module.download_count, 42);
    }

    #[tokio::test]
    async fn download_counts_create_counter_only_modules() {
        let store = get_test_store().await;
        let repo_id = store
            .catalog
            .upsert_repository(test_repository("default"))
            .await
            .unwrap();

        store
            .catalog
            .set_download_count(repo_id, String::from("CounterOnly"), 7)
            .await
            .unwrap();

        let module = store
            .catalog
            .find_module(String::from("CounterOnly"))
            .await
            .unwrap()
            .expect("no module");
        assert_eq!(module.download_count, 7);

        store
            .catalog
            .increment_download_count(module.module_id)
            .await
            .unwrap();
        let module = store
            .catalog
            .find_module(String::from("CounterOnly"))
            .await
            .unwrap()
            .expect("no module");
        assert_eq!(module.download_count, 8);
    }

    #[tokio::test]
    async fn release_upsert_replaces_children_wholesale() {
        let store = get_test_store().await;
        let repo_id = store
            .catalog
            .upsert_repository(test_repository("default"))
            .await
            .unwrap();
        let module_id = store
            .catalog
            .upsert_module(repo_id, String::from("TestModule"))
            .await
            .unwrap();

        let mut release = test_release("1.0");
        release.relationship_groups = vec![NewRelationshipGroup {
            rel_type: RelType::Depends,
            choice_help_text: None,
            suppress_recommendations: false,
            members: vec![NewRelationship {
                target_name: String::from("OldDependency"),
                target_version: None,
                target_version_min: None,
            }],
        }];
        let first = store
            .catalog
            .upsert_release(module_id, release)
            .await
            .unwrap();
        assert!(first.inserted);

        let mut replaced = test_release("1.0");
        replaced.authors = vec![String::from("someone"), String::from("else")];
        replaced.relationship_groups = vec![NewRelationshipGroup {
            rel_type: RelType::Recommends,
            choice_help_text: Some(String::from("pick one")),
            suppress_recommendations: true,
            members: vec![
                NewRelationship {
                    target_name: String::from("NewRecommendation"),
                    target_version: Some(String::from("2.0")),
                    target_version_min: None,
                },
                NewRelationship {
                    target_name: String::from("OtherRecommendation"),
                    target_version: None,
                    target_version_min: None,
                },
            ],
        }];
        let second = store
            .catalog
            .upsert_release(module_id, replaced)
            .await
            .unwrap();

        // the version set didn't change and the release kept its identity
        assert!(!second.inserted);
        assert_eq!(first.release_id, second.release_id);

        let authors = store
            .catalog
            .get_release_authors(second.release_id)
            .await
            .unwrap();
        let author_names: Vec<&str> = authors.iter().map(|a| a.author.as_str()).collect();
        assert_eq!(author_names, vec!["someone", "else"]);

        // no trace of the old group remains
        let groups = store
            .catalog
            .get_relationship_groups(second.release_id)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        let (group, members) = &groups[0];
        assert_eq!(group.rel_type, RelType::Recommends);
        assert!(group.suppress_recommendations);
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].target_name, "NewRecommendation");
        assert_eq!(members[0].target_version.as_deref(), Some("2.0"));
        assert_eq!(members[1].target_name, "OtherRecommendation");
    }

    #[tokio::test]
    async fn sort_indices_follow_version_order() {
        let store = get_test_store().await;
        let repo_id = store
            .catalog
            .upsert_repository(test_repository("default"))
            .await
            .unwrap();
        let module_id = store
            .catalog
            .upsert_module(repo_id, String::from("TestModule"))
            .await
            .unwrap();

        // inserted out of version order on purpose
        for version in &["1.0", "2.0", "1.5"] {
            store
                .catalog
                .upsert_release(module_id, test_release(version))
                .await
                .unwrap();
        }
        store
            .catalog
            .recompute_sort_indices(module_id)
            .await
            .unwrap();

        let releases = store.catalog.get_releases(module_id).await.unwrap();
        let versions: Vec<&str> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["2.0", "1.5", "1.0"]);
        assert_eq!(releases[0].sort_index, 2);
        assert_eq!(releases[2].sort_index, 0);

        // removing a release and recomputing keeps the order consistent
        assert!(store
            .catalog
            .delete_release(module_id, String::from("2.0"))
            .await
            .unwrap());
        store
            .catalog
            .recompute_sort_indices(module_id)
            .await
            .unwrap();

        let releases = store.catalog.get_releases(module_id).await.unwrap();
        let versions: Vec<&str> = releases.iter().map(|r| r.version.as_str()).collect();
        assert_eq!(versions, vec!["1.5", "1.0"]);
        assert_eq!(releases[0].sort_index, 1);
    }

    #[tokio::test]
    async fn deleting_a_repository_cascades_fully() {
        let store = get_test_store().await;
        let repo_id = store
            .catalog
            .upsert_repository(test_repository("doomed"))
            .await
            .unwrap();
        let module_id = store
            .catalog
            .upsert_module(repo_id, String::from("DoomedModule"))
            .await
            .unwrap();

        let mut release = test_release("1.0");
        release.relationship_groups = vec![NewRelationshipGroup {
            rel_type: RelType::Depends,
            choice_help_text: None,
            suppress_recommendations: false,
            members: vec![NewRelationship {
                target_name: String::from("Dependency"),
                target_version: None,
                target_version_min: None,
            }],
        }];
        release.replacement = Some(NewReplacement {
            target_name: String::from("Successor"),
            target_version: None,
            target_version_min: None,
        });
        let upsert = store
            .catalog
            .upsert_release(module_id, release)
            .await
            .unwrap();

        assert!(store
            .catalog
            .delete_repository(String::from("doomed"))
            .await
            .unwrap());

        // no orphans remain queryable anywhere down the tree
        assert!(store
            .catalog
            .find_module(String::from("DoomedModule"))
            .await
            .unwrap()
            .is_none());
        assert!(store.catalog.get_releases(module_id).await.unwrap().is_empty());
        assert!(store
            .catalog
            .get_release_authors(upsert.release_id)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .catalog
            .get_relationship_groups(upsert.release_id)
            .await
            .unwrap()
            .is_empty());
        assert!(store
            .catalog
            .get_replacement(upsert.release_id)
            .await
            .unwrap()
            .is_none());

        // deleting it again does nothing
        assert!(!store
            .catalog
            .delete_repository(String::from("doomed"))
            .await
            .unwrap());
    }
}
