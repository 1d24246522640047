//! Store models used to map rows in the catalog database tables to/from structs.
//!
//! Each model struct derives [`Model`], which provides functions to build SQL queries and
//! parameters from them.
//!
//! [Model]: derive::Model

use crate::{
    feed::{DownloadChecksum, InstallDirective, ModuleKind, ReleaseStatus, ResourceLinks},
    version::GameVersion,
};
use chrono::{DateTime, Utc};
use derive::Model;
use rusqlite::{
    types::{self, FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    ToSql,
};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, string::ToString};
use strum_macros::{Display, EnumString};
use url::Url;

/// A named upstream source of modules.
///
/// Uses the [`name`](#structfield.name) field as index when querying the store database; the name
/// is unique across all repositories.
#[derive(Debug, PartialEq, Model)]
#[table_name = "repositories"]
#[order_by = "priority, name"]
pub struct Repository {
    /// The repository's store ID.
    #[ignore_in_all_params]
    pub repo_id: i64,
    /// The repository's unique name.
    #[index]
    pub name: String,
    /// The URL the repository's feed is fetched from.
    pub url: String,
    /// The repository's priority. Lower is preferred when several repositories provide a module
    /// with the same name.
    pub priority: i64,
    /// Whether the repository is a mirror.
    pub mirror: bool,
    /// Free-form comment attached to the repository.
    pub comment: Option<String>,
}

/// A reference from one repository to another (a mirror or fallback), scoped to its referrer.
#[derive(Debug, PartialEq, Model)]
#[table_name = "repository_refs"]
#[order_by = "priority, name"]
pub struct RepositoryRef {
    /// The referring repository's store ID.
    #[index]
    pub referrer_id: i64,
    pub name: String,
    pub url: String,
    pub priority: i64,
    pub mirror: bool,
    pub comment: Option<String>,
}

/// A named installable unit owned by exactly one repository.
///
/// Uses the [`repo_id`](#structfield.repo_id) and [`module_name`](#structfield.module_name)
/// fields as indices when querying the store database.
#[derive(Debug, PartialEq, Model)]
#[table_name = "modules"]
pub struct Module {
    /// The module's store ID.
    #[ignore_in_all_params]
    pub module_id: i64,
    /// The owning repository's store ID.
    #[index]
    pub repo_id: i64,
    /// The module's name, unique within its repository.
    #[index]
    pub module_name: String,
    /// The module's download count. Mutated only by install-tracking collaborators.
    pub download_count: i64,
}

/// One published version of a module.
///
/// Uses the [`module_id`](#structfield.module_id) and [`version`](#structfield.version) fields as
/// indices when querying the store database. The [`sort_index`](#structfield.sort_index) totally
/// orders a module's releases (latest = highest) and is recomputed by the catalog whenever the
/// module's version set changes, so it's excluded from the written parameters.
#[derive(Debug, Model)]
#[table_name = "module_releases"]
pub struct Release {
    /// The release's store ID.
    #[ignore_in_all_params]
    pub release_id: i64,
    /// The owning module's store ID.
    #[index]
    pub module_id: i64,
    /// The release's version string, authoritative for display.
    #[index]
    pub version: String,
    /// Whether the version string failed to parse and degraded to lexicographic ordering.
    pub version_malformed: bool,
    /// Position of this release in the total version order of its module's releases.
    #[ignore_in_all_params]
    pub sort_index: i64,
    pub kind: ModuleKind,
    /// The module's human-readable display name as of this release.
    pub display_name: String,
    /// The release's one-line summary.
    pub summary: String,
    /// Ancillary structured fields, stored serialized.
    pub metadata: ReleaseMetadata,
    /// The release's optional long-form description.
    pub description: Option<String>,
    pub release_status: ReleaseStatus,
    /// Upper bound of the compatible game version range, or the only compatible version when it
    /// equals [`game_version_min`](#structfield.game_version_min). Without the strict flag it
    /// means "compatible up to".
    pub game_version: Option<GameVersion>,
    /// Lower bound of the compatible game version range.
    pub game_version_min: Option<GameVersion>,
    /// Whether the release is compatible *only* within its declared range.
    pub game_version_strict: bool,
    pub download_size: Option<i64>,
    pub install_size: Option<i64>,
    pub release_date: Option<DateTime<Utc>>,
}

/// The serialized ancillary fields of a release.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct ReleaseMetadata {
    pub comment: Option<String>,
    #[serde(default)]
    pub download: Vec<Url>,
    #[serde(default)]
    pub download_hash: DownloadChecksum,
    pub download_content_type: Option<String>,
    #[serde(default)]
    pub resources: ResourceLinks,
    #[serde(default)]
    pub install: Vec<InstallDirective>,
}

impl ToSql for ReleaseMetadata {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match serde_json::to_string(self) {
            Ok(json) => Ok(ToSqlOutput::Owned(types::Value::Text(json))),
            Err(e) => Err(rusqlite::Error::ToSqlConversionFailure(Box::new(e))),
        }
    }
}

impl FromSql for ReleaseMetadata {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match serde_json::from_str(value.as_str()?) {
            Ok(v) => Ok(v),
            Err(e) => Err(FromSqlError::Other(Box::new(e))),
        }
    }
}

/// One author of a release. Order is preserved as declared upstream.
#[derive(Debug, PartialEq, Model)]
#[table_name = "release_authors"]
#[order_by = "ordinal"]
pub struct ReleaseAuthor {
    #[index]
    pub release_id: i64,
    pub ordinal: i64,
    pub author: String,
}

/// One license of a release. Unordered and unique per release.
#[derive(Debug, PartialEq, Model)]
#[table_name = "release_licenses"]
#[order_by = "license"]
pub struct ReleaseLicense {
    #[index]
    pub release_id: i64,
    pub license: String,
}

/// One tag of a release. Both order and uniqueness are enforced.
#[derive(Debug, PartialEq, Model)]
#[table_name = "release_tags"]
#[order_by = "ordinal"]
pub struct ReleaseTag {
    #[index]
    pub release_id: i64,
    pub ordinal: i64,
    pub tag: String,
}

/// One localization locale code of a release. Unordered and unique per release.
#[derive(Debug, PartialEq, Model)]
#[table_name = "release_localizations"]
#[order_by = "locale"]
pub struct ReleaseLocalization {
    #[index]
    pub release_id: i64,
    pub locale: String,
}

/// A group of alternative relationships of one type attached to a release.
///
/// Within one group, satisfying any one member relationship satisfies the group; across groups of
/// the same type on a release, all groups must be satisfied.
#[derive(Debug, Model)]
#[table_name = "relationship_groups"]
#[order_by = "ordinal"]
pub struct RelationshipGroup {
    /// The group's store ID.
    #[ignore_in_all_params]
    pub group_id: i64,
    /// The owning release's store ID.
    #[index]
    pub release_id: i64,
    /// The group's position in its release's declaration order.
    pub ordinal: i64,
    pub rel_type: RelType,
    /// Optional text shown when asking the user to choose between the group's alternatives.
    pub choice_help_text: Option<String>,
    /// Passed through from the feed; its downstream meaning is the consumer's decision.
    pub suppress_recommendations: bool,
}

/// One member of a relationship group.
///
/// The target name is either a concrete module name or a virtual name introduced by some release's
/// Provides group; nothing requires it to exist as a module row.
#[derive(Debug, PartialEq, Model)]
#[table_name = "relationships"]
#[order_by = "ordinal"]
pub struct Relationship {
    /// The owning group's store ID.
    #[index]
    pub group_id: i64,
    /// The member's position within its group.
    pub ordinal: i64,
    pub target_name: String,
    /// The exact or maximum target version: an exact match when
    /// [`target_version_min`](#structfield.target_version_min) is unset, otherwise the upper bound
    /// of an inclusive range.
    pub target_version: Option<String>,
    pub target_version_min: Option<String>,
}

/// A deprecated release's successor directive: install this instead. At most one per release.
#[derive(Debug, PartialEq, Model)]
#[table_name = "module_replacements"]
pub struct Replacement {
    #[index]
    pub release_id: i64,
    pub target_name: String,
    pub target_version: Option<String>,
    pub target_version_min: Option<String>,
}

/// A known upstream game build, mapping a build ID to its game version.
#[derive(Debug, PartialEq, Model)]
#[table_name = "game_builds"]
#[order_by = "build_id"]
pub struct GameBuild {
    #[index]
    pub build_id: i64,
    pub version: GameVersion,
}

/// An HTTP cache validator for a feed URL, consumed by the external fetch layer to skip redundant
/// downloads.
#[derive(Debug, PartialEq, Model)]
#[table_name = "etags"]
pub struct EtagEntry {
    #[index]
    pub url: String,
    pub etag: Option<String>,
}

/// The type of a relationship group.
#[derive(Debug, PartialEq, Eq, Copy, Clone, EnumString, Display)]
pub enum RelType {
    #[strum(serialize = "depends")]
    Depends,
    #[strum(serialize = "recommends")]
    Recommends,
    #[strum(serialize = "suggests")]
    Suggests,
    #[strum(serialize = "supports")]
    Supports,
    #[strum(serialize = "conflicts")]
    Conflicts,
    #[strum(serialize = "provides")]
    Provides,
}

impl ToSql for RelType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(types::Value::Text(self.to_string())))
    }
}

impl FromSql for RelType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match Self::from_str(value.as_str()?) {
            Ok(v) => Ok(v),
            Err(e) => Err(FromSqlError::Other(Box::new(e))),
        }
    }
}

/// All data needed to create or replace one release of a module, children included. Writing one of
/// these replaces the release's entire child set.
#[derive(Debug)]
pub struct NewRelease {
    pub version: String,
    pub version_malformed: bool,
    pub kind: ModuleKind,
    pub display_name: String,
    pub summary: String,
    pub metadata: ReleaseMetadata,
    pub description: Option<String>,
    pub release_status: ReleaseStatus,
    pub game_version: Option<GameVersion>,
    pub game_version_min: Option<GameVersion>,
    pub game_version_strict: bool,
    pub download_size: Option<i64>,
    pub install_size: Option<i64>,
    pub release_date: Option<DateTime<Utc>>,
    /// In upstream declaration order.
    pub authors: Vec<String>,
    pub licenses: Vec<String>,
    /// In upstream declaration order.
    pub tags: Vec<String>,
    pub localizations: Vec<String>,
    /// In upstream declaration order.
    pub relationship_groups: Vec<NewRelationshipGroup>,
    pub replacement: Option<NewReplacement>,
}

/// One relationship group of a [`NewRelease`](NewRelease).
#[derive(Debug)]
pub struct NewRelationshipGroup {
    pub rel_type: RelType,
    pub choice_help_text: Option<String>,
    pub suppress_recommendations: bool,
    /// The group's alternative members, in upstream declaration order.
    pub members: Vec<NewRelationship>,
}

/// One member of a [`NewRelationshipGroup`](NewRelationshipGroup).
#[derive(Debug)]
pub struct NewRelationship {
    pub target_name: String,
    pub target_version: Option<String>,
    pub target_version_min: Option<String>,
}

/// The replacement directive of a [`NewRelease`](NewRelease).
#[derive(Debug)]
pub struct NewReplacement {
    pub target_name: String,
    pub target_version: Option<String>,
    pub target_version_min: Option<String>,
}
