//! Adapter types for reading repository feed documents into module descriptors.
//!
//! A feed document is a single JSON object carrying the repository's module release descriptors
//! plus its ancillary maps (known game builds, module download counts and references to further
//! repositories). The module descriptors are kept as raw JSON values in
//! [`FeedDocument`](FeedDocument) and decoded one at a time with
//! [`decode_descriptor`](decode_descriptor), so a single invalid descriptor doesn't fail the whole
//! feed.

mod one_or_many;

use crate::{
    error::{DescriptorError, FeedError},
    store::models::RelType,
    version::GameVersion,
};
use chrono::{DateTime, Utc};
use rusqlite::{
    types::{self, FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    ToSql,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, str::FromStr, string::ToString};
use strum_macros::{Display, EnumString};
use url::Url;

/// A whole repository feed document.
#[derive(Debug, Deserialize)]
pub struct FeedDocument {
    /// The module release descriptors, decoded individually.
    #[serde(default)]
    pub modules: Vec<serde_json::Value>,
    /// Map of known game build IDs to game versions.
    #[serde(default)]
    pub builds: HashMap<i32, String>,
    /// Map of module names to their download counts.
    #[serde(default)]
    pub download_counts: HashMap<String, i64>,
    /// References to further repositories (mirrors and fallbacks).
    #[serde(default)]
    pub repositories: Vec<RepositoryRefDescriptor>,
}

impl FeedDocument {
    /// Reads a feed document from raw bytes. Failing here fails the whole feed.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FeedError> {
        serde_json::from_slice(bytes).map_err(FeedError::Unreadable)
    }
}

/// Decodes a single module descriptor out of a feed document and verifies its integrity.
pub fn decode_descriptor(value: &serde_json::Value) -> Result<ModuleDescriptor, DescriptorError> {
    let descriptor: ModuleDescriptor = serde_json::from_value(value.clone())?;
    descriptor.verify()?;
    Ok(descriptor)
}

/// A reference to a further repository, declared inside a feed.
#[derive(Debug, Deserialize, PartialEq)]
pub struct RepositoryRefDescriptor {
    /// The referenced repository's name.
    pub name: String,
    /// The referenced repository's URL.
    #[serde(rename = "uri")]
    pub url: Url,
    /// The referenced repository's priority. Lower is preferred.
    #[serde(default)]
    pub priority: i64,
    /// Whether the referenced repository is a mirror.
    #[serde(default)]
    pub x_mirror: bool,
    /// Free-form comment attached to the reference.
    #[serde(default)]
    pub x_comment: Option<String>,
}

/// A full release descriptor of a module, as declared in a feed.
#[derive(Debug, Deserialize)]
pub struct ModuleDescriptor {
    /// The module's unique identifier within its repository.
    pub identifier: String,
    /// The module's human-readable display name.
    pub name: String,
    /// The release's version string.
    pub version: String,
    #[serde(default)]
    pub kind: ModuleKind,
    /// The release's one-line summary.
    #[serde(rename = "abstract")]
    pub summary: String,
    /// The release's optional long-form description.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub release_status: ReleaseStatus,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(with = "one_or_many")]
    pub author: Vec<String>,
    #[serde(with = "one_or_many", default)]
    pub download: Vec<Url>,
    #[serde(default)]
    pub download_size: Option<i64>,
    #[serde(default)]
    pub download_hash: DownloadChecksum,
    #[serde(default)]
    pub download_content_type: Option<String>,
    #[serde(default)]
    pub install_size: Option<i64>,
    #[serde(with = "one_or_many", default)]
    pub license: Vec<String>,
    /// The exact game version the release is compatible with. Mutually exclusive with the
    /// min/max bounds.
    #[serde(default)]
    pub game_version: GameVersion,
    #[serde(default)]
    pub game_version_min: GameVersion,
    #[serde(default)]
    pub game_version_max: GameVersion,
    /// Whether the release is compatible *only* within its declared game version range.
    #[serde(default)]
    pub game_version_strict: bool,
    #[serde(default)]
    pub resources: ResourceLinks,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub localizations: Vec<String>,
    #[serde(default)]
    pub depends: Vec<RelationshipEntry>,
    #[serde(default)]
    pub recommends: Vec<RelationshipEntry>,
    #[serde(default)]
    pub suggests: Vec<RelationshipEntry>,
    #[serde(default)]
    pub supports: Vec<RelationshipEntry>,
    #[serde(default)]
    pub conflicts: Vec<RelationshipEntry>,
    /// Virtual names this release satisfies when installed.
    #[serde(with = "one_or_many", default)]
    pub provides: Vec<String>,
    /// The successor module to install instead, for deprecated releases.
    #[serde(default)]
    pub replaced_by: Option<DirectRelationship>,
    #[serde(default)]
    pub install: Vec<InstallDirective>,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
}

impl ModuleDescriptor {
    /// Checks the descriptor for declarations that are individually valid but invalid together.
    pub fn verify(&self) -> Result<(), DescriptorError> {
        if !self.game_version.is_empty() {
            let has_max = !self.game_version_max.is_empty();
            if has_max || !self.game_version_min.is_empty() {
                return Err(DescriptorError::DuplicateGameVersionConstraint {
                    specific_is_max: has_max,
                });
            }
        }

        if let Some(replaced_by) = &self.replaced_by {
            if replaced_by.max_version.is_some() {
                return Err(DescriptorError::MaxVersionInReplacement);
            }
        }

        Ok(())
    }

    /// Returns all declared relationship groups (not including any `replaced_by` directive)
    /// alongside their corresponding types, in declaration order.
    pub fn relationships(&self) -> impl Iterator<Item = (RelType, &RelationshipEntry)> {
        self.depends
            .iter()
            .map(|d| (RelType::Depends, d))
            .chain(self.recommends.iter().map(|d| (RelType::Recommends, d)))
            .chain(self.suggests.iter().map(|d| (RelType::Suggests, d)))
            .chain(self.supports.iter().map(|d| (RelType::Supports, d)))
            .chain(self.conflicts.iter().map(|d| (RelType::Conflicts, d)))
    }

    /// Returns the release's game version compatibility range as `(max, min)`, resolving the
    /// generic constraint into an exact range.
    pub fn game_version_range(&self) -> (Option<GameVersion>, Option<GameVersion>) {
        fn non_empty(version: GameVersion) -> Option<GameVersion> {
            if version.is_empty() {
                None
            } else {
                Some(version)
            }
        }

        if self.game_version.is_empty() {
            (
                non_empty(self.game_version_max),
                non_empty(self.game_version_min),
            )
        } else {
            (Some(self.game_version), Some(self.game_version))
        }
    }
}

/// One declared relationship group: a set of alternative targets of which any one satisfies the
/// group.
#[derive(Debug, Deserialize)]
pub struct RelationshipEntry {
    #[serde(flatten)]
    pub descriptor: RelationshipDescriptor,
    /// Optional text shown when asking the user to choose between the group's alternatives.
    #[serde(default)]
    pub choice_help_text: Option<String>,
    /// Whether the feed author doesn't want tooling to surface this group as a suggestion.
    /// Passed through as-is; its downstream meaning is the consumer's decision.
    #[serde(default)]
    pub suppress_recommendations: bool,
}

/// The target(s) of a relationship: either a single direct target, or a nested `any_of` set of
/// alternatives.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RelationshipDescriptor {
    Direct(DirectRelationship),
    AnyOf(AnyOfRelationship),
}

impl RelationshipDescriptor {
    /// Flattens nested `any_of` sets into the plain list of alternative direct targets.
    pub fn flatten(&self) -> Vec<&DirectRelationship> {
        let mut members = vec![];
        self.flatten_inner(&mut members);
        members
    }

    fn flatten_inner<'a>(&'a self, list: &mut Vec<&'a DirectRelationship>) {
        match self {
            Self::Direct(d) => list.push(d),
            Self::AnyOf(d) => {
                for relation in &d.any_of {
                    relation.descriptor.flatten_inner(list);
                }
            }
        }
    }
}

/// A relationship to a single named target, optionally constrained to an exact version or an
/// inclusive version range.
#[derive(Debug, Deserialize)]
pub struct DirectRelationship {
    /// The target's name: either a concrete module name, or a virtual name some release provides.
    pub name: String,
    #[serde(default)]
    pub max_version: Option<String>,
    #[serde(default)]
    pub min_version: Option<String>,
    /// The exact version constraint. Takes precedence over the min/max bounds.
    #[serde(default)]
    pub version: Option<String>,
}

/// A nested set of alternative relationships.
#[derive(Debug, Deserialize)]
pub struct AnyOfRelationship {
    pub any_of: Vec<RelationshipEntry>,
}

/// Checksums of a release's download archive.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct DownloadChecksum {
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// The release's resource links. Each is optional.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct ResourceLinks {
    pub homepage: Option<String>,
    pub spacedock: Option<String>,
    pub repository: Option<String>,
    pub bugtracker: Option<String>,
    #[serde(rename = "remote-avc")]
    pub remote_avc: Option<String>,
    pub x_screenshot: Option<String>,
}

/// A directive describing where a part of the release's archive installs to.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InstallDirective {
    #[serde(flatten)]
    pub source: InstallSource,
    pub install_to: String,
    #[serde(default)]
    pub find_matches_files: bool,
    #[serde(default)]
    pub r#as: Option<String>,
    #[serde(default)]
    #[serde(with = "one_or_many")]
    pub filter: Vec<String>,
    #[serde(default)]
    #[serde(with = "one_or_many")]
    pub filter_regexp: Vec<String>,
    #[serde(default)]
    #[serde(with = "one_or_many")]
    pub include_only: Vec<String>,
    #[serde(default)]
    #[serde(with = "one_or_many")]
    pub include_only_regexp: Vec<String>,
}

/// How an install directive locates its source within the release's archive.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "snake_case")]
pub enum InstallSource {
    File(String),
    Find(String),
    FindRegexp(String),
}

/// Distinguishes ordinary module releases from other variants.
#[derive(
    Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[strum(serialize = "package")]
    Package,
    #[strum(serialize = "metapackage")]
    Metapackage,
    #[strum(serialize = "dlc")]
    Dlc,
}

impl Default for ModuleKind {
    fn default() -> Self {
        ModuleKind::Package
    }
}

/// A release's stability status. Stable is the default and is not annotated in display.
#[derive(
    Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    #[strum(serialize = "stable")]
    Stable,
    #[strum(serialize = "testing")]
    Testing,
    #[strum(serialize = "development")]
    Development,
}

impl Default for ReleaseStatus {
    fn default() -> Self {
        ReleaseStatus::Stable
    }
}

impl ToSql for ModuleKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(types::Value::Text(self.to_string())))
    }
}

impl FromSql for ModuleKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match Self::from_str(value.as_str()?) {
            Ok(v) => Ok(v),
            Err(e) => Err(FromSqlError::Other(Box::new(e))),
        }
    }
}

impl ToSql for ReleaseStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(types::Value::Text(self.to_string())))
    }
}

impl FromSql for ReleaseStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match Self::from_str(value.as_str()?) {
            Ok(v) => Ok(v),
            Err(e) => Err(FromSqlError::Other(Box::new(e))),
        }
    }
}
