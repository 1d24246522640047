//! Because module versions aren't any standard format. Upstream feeds carry whatever their authors
//! typed: semver, dates, `v`-prefixes, epochs, letter suffixes. Provides
//! [`ModVersion`](ModVersion) which totally orders all of them, and
//! [`GameVersion`](GameVersion) which represents a (possibly wildcarded) version of the game
//! itself.

use crate::error::GameVersionError;
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{
    types::{self, FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
    ToSql,
};
use serde::{de, de::Visitor, Deserialize};
use std::{cmp::Ordering, fmt, fmt::Display, str::FromStr};

/// A module release's version, comparable with every other module version.
///
/// A version string consists of an optional numeric epoch separated by a colon, followed by the
/// version body. Comparison happens epoch-first (a missing epoch equals epoch `0`), then over the
/// body by splitting it into alternating non-digit and digit runs and comparing the runs pairwise:
/// digit runs compare numerically with arbitrary precision, non-digit runs compare
/// lexicographically except that a run starting with `.` outranks any other run and a run starting
/// with `-` or `~` (a pre-release suffix) ranks below the end of the version. This makes `1.0.1`
/// greater than `1.0`, and `1.0-beta` less than `1.0`.
///
/// Parsing cannot fail: a string that doesn't look like a version at all is still accepted, but
/// degrades to plain lexicographic comparison and sorts below every well-formed version. The
/// degraded state is visible with [`is_well_formed`](ModVersion::is_well_formed) so such versions
/// can be flagged for diagnostics.
#[derive(Debug, Clone)]
pub struct ModVersion {
    /// The epoch. Zero when the version string doesn't carry one.
    epoch: u32,
    /// Byte offset of the version body within the raw string.
    body_start: usize,
    /// Whether the raw string parsed as an epoch-and-body version.
    well_formed: bool,
    /// The raw version string, authoritative for display.
    raw: String,
}

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(r"^(?:(\d+):)?[0-9A-Za-z._+~-]+$").unwrap();
}

impl ModVersion {
    /// Parses a raw version string. Never fails; a string that isn't a version degrades to
    /// lexicographic comparison.
    pub fn parse(raw: &str) -> Self {
        if let Some(captures) = VERSION_RE.captures(raw) {
            match captures.get(1) {
                Some(epoch) => {
                    // an epoch too large for u32 means the string isn't an epoch-ed version
                    if let Ok(epoch) = epoch.as_str().parse() {
                        return Self {
                            epoch,
                            body_start: raw.find(':').expect("epoch-ed version has no colon") + 1,
                            well_formed: true,
                            raw: raw.to_string(),
                        };
                    }
                }
                None => {
                    return Self {
                        epoch: 0,
                        body_start: 0,
                        well_formed: true,
                        raw: raw.to_string(),
                    };
                }
            }
        }

        Self {
            epoch: 0,
            body_start: 0,
            well_formed: false,
            raw: raw.to_string(),
        }
    }

    /// Returns the version's epoch. Zero when the version string doesn't carry one.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Returns the version body without the epoch.
    pub fn body(&self) -> &str {
        &self.raw[self.body_start..]
    }

    /// Returns the raw version string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns whether the raw string parsed as a version. Malformed versions still order totally,
    /// but only lexicographically, below all well-formed versions.
    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }
}

impl From<&str> for ModVersion {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for ModVersion {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl Display for ModVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for ModVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ModVersion {}

impl PartialOrd for ModVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // malformed versions form their own partition below all well-formed ones: mixing the
        // run-wise comparison with raw comparison over the same set wouldn't be transitive
        match (self.well_formed, other.well_formed) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.raw.cmp(&other.raw),
            (true, true) => self
                .epoch
                .cmp(&other.epoch)
                .then_with(|| cmp_bodies(self.body(), other.body())),
        }
    }
}

/// Compares two version bodies by their alternating non-digit and digit runs.
///
/// e.g. 1.2.3a -> "", 1, ".", 2, ".", 3, "a"
///      1.2.4b -> "", 1, ".", 2, ".", 4, "b"
/// 4 > 3 so the second one is larger.
fn cmp_bodies(mut left: &str, mut right: &str) -> Ordering {
    while !left.is_empty() || !right.is_empty() {
        let cmp = str_cmp(&mut left, &mut right);
        if !cmp.is_eq() {
            return cmp;
        }

        let cmp = num_cmp(&mut left, &mut right);
        if !cmp.is_eq() {
            return cmp;
        }
    }

    Ordering::Equal
}

/// Splits the non-digit prefix off both parameters and compares those prefixes.
fn str_cmp(left: &mut &str, right: &mut &str) -> Ordering {
    let left_prefix = take_prefix(left, |c| !c.is_ascii_digit());
    let right_prefix = take_prefix(right, |c| !c.is_ascii_digit());

    str_rank(left_prefix)
        .cmp(&str_rank(right_prefix))
        .then_with(|| left_prefix.cmp(right_prefix))
}

/// Ranks a non-digit run for comparison: a pre-release suffix run (`-`/`~`) sorts below the end of
/// the version, which sorts below a plain run, which sorts below a `.` run.
fn str_rank(run: &str) -> u8 {
    match run.chars().next() {
        Some('-') | Some('~') => 0,
        None => 1,
        Some('.') => 3,
        Some(_) => 2,
    }
}

/// Splits the digit prefix off both parameters and compares those prefixes numerically. An empty
/// prefix counts as zero, and leading zeroes are insignificant.
fn num_cmp(left: &mut &str, right: &mut &str) -> Ordering {
    let left_prefix = take_prefix(left, |c| c.is_ascii_digit()).trim_start_matches('0');
    let right_prefix = take_prefix(right, |c| c.is_ascii_digit()).trim_start_matches('0');

    // compare by length first so the comparison has arbitrary precision
    left_prefix
        .len()
        .cmp(&right_prefix.len())
        .then_with(|| left_prefix.cmp(right_prefix))
}

/// Splits the longest prefix matching the predicate off the parameter and returns it.
fn take_prefix<'a>(buf: &mut &'a str, pred: impl Fn(char) -> bool) -> &'a str {
    let end = buf.find(|c| !pred(c)).unwrap_or_else(|| buf.len());
    let (prefix, rest) = buf.split_at(end);
    *buf = rest;
    prefix
}

/// A version of the game itself, used in release compatibility ranges and the upstream build map.
///
/// Consists of up to four numeric components. Missing components act as wildcards: `1.8` covers
/// every `1.8.x.x`. A fully unset version (spelled `any`) covers everything.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct GameVersion {
    /// The major component.
    major: Option<u32>,
    /// The minor component.
    minor: Option<u32>,
    /// The patch component.
    patch: Option<u32>,
    /// The build component.
    build: Option<u32>,
}

impl GameVersion {
    /// Returns a version with every component unset.
    pub const fn empty() -> Self {
        Self {
            major: None,
            minor: None,
            patch: None,
            build: None,
        }
    }

    /// Returns whether every component is unset.
    pub fn is_empty(&self) -> bool {
        self == &GameVersion::empty()
    }

    /// Returns whether a given exact version falls under this version, treating this version's
    /// unset components as wildcards.
    pub fn covers(&self, other: &GameVersion) -> bool {
        fn component_covers(own: Option<u32>, other: Option<u32>) -> bool {
            match own {
                None => true,
                Some(c) => other == Some(c),
            }
        }

        component_covers(self.major, other.major)
            && component_covers(self.minor, other.minor)
            && component_covers(self.patch, other.patch)
            && component_covers(self.build, other.build)
    }
}

impl Default for GameVersion {
    fn default() -> Self {
        Self::empty()
    }
}

impl Ord for GameVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for GameVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for GameVersion {
    type Err = GameVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut version = Self::empty();

        if s == "any" {
            return Ok(version);
        }

        let mut parts = s.split('.');
        let mut get_next = || parts.next().map(|i| i.trim().parse::<u32>()).transpose();

        version.major = get_next()?;
        version.minor = get_next()?;
        version.patch = get_next()?;
        version.build = get_next()?;

        if parts.next().is_some() {
            return Err(GameVersionError::TooManyComponents(s.to_owned()));
        }

        Ok(version)
    }
}

impl Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("any");
        }

        let components = [self.major, self.minor, self.patch, self.build]
            .iter()
            .take_while(|c| c.is_some())
            .map(|c| c.expect("unset component after take_while").to_string())
            .collect::<Vec<String>>();

        f.write_str(&components.join("."))
    }
}

impl ToSql for GameVersion {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(types::Value::Text(self.to_string())))
    }
}

impl FromSql for GameVersion {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match GameVersion::from_str(value.as_str()?) {
            Ok(v) => Ok(v),
            Err(e) => Err(FromSqlError::Other(Box::new(e))),
        }
    }
}

impl<'de> Deserialize<'de> for GameVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct GameVersionVisitor;

        impl<'de> Visitor<'de> for GameVersionVisitor {
            type Value = GameVersion;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("game version string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse::<Self::Value>()
                    .map_err(|_| de::Error::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_str(GameVersionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> ModVersion {
        ModVersion::parse(s)
    }

    #[test]
    fn compare_plain_versions() {
        assert!(v("1.0.0") < v("2.0.0"));
        assert!(v("1.0.0") < v("1.1.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("1.0") < v("1.0.1"));
        assert!(v("0.9") < v("1.0"));
        assert!(v("1.0.0") == v("1.0.0"));
    }

    #[test]
    fn numeric_runs_compare_numerically() {
        assert!(v("v2") < v("v10"));
        assert!(v("1.9") < v("1.10"));
        assert!(v("01.00") == v("1.0"));
        // longer than u64
        assert!(v("1.18446744073709551616") > v("1.18446744073709551615"));
    }

    #[test]
    fn letter_suffixes() {
        assert!(v("1.2.3a") < v("1.2.3b"));
        assert!(v("1.2.3a") < v("1.2.4"));
        // an alphanumeric suffix sorts above the unsuffixed form...
        assert!(v("1.0a") > v("1.0"));
        // ...but a deeper component sorts above the suffix
        assert!(v("1.0.1") > v("1.0a"));
    }

    #[test]
    fn prerelease_suffixes_sort_below_unsuffixed() {
        assert!(v("1.0-beta") < v("1.0"));
        assert!(v("1.0~rc1") < v("1.0"));
        assert!(v("1.0-beta") < v("1.0.1"));
        assert!(v("1.0-beta.1") < v("1.0-beta.2"));
    }

    #[test]
    fn epochs() {
        assert!(v("1:0.1") > v("5.0"));
        assert!(v("2:0.1") > v("1:9.9"));
        assert!(v("0:1.0") == v("1.0"));
        assert_eq!(v("1:1.2").epoch(), 1);
        assert_eq!(v("1:1.2").body(), "1.2");
        assert_eq!(v("1:1.2").as_str(), "1:1.2");
    }

    #[test]
    fn malformed_versions_degrade() {
        let malformed = v("not a version!");
        assert!(!malformed.is_well_formed());
        assert!(v("1.0").is_well_formed());

        // malformed versions sort below all well-formed ones, lexicographically among themselves
        assert!(malformed < v("0.0.1"));
        assert!(v("spaced out") < v("spaced past"));

        // an overflowing epoch isn't an epoch
        assert!(!v("99999999999:1.0").is_well_formed());
    }

    #[test]
    fn total_order_is_transitive() {
        let mut versions = vec![
            v("2.0"),
            v("1.0-beta"),
            v("totally bogus"),
            v("1:0.1"),
            v("1.0"),
            v("1.0.1"),
            v("an equally bogus version"),
            v("v1.5"),
        ];
        versions.sort();

        let sorted: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(
            sorted,
            vec![
                "an equally bogus version",
                "totally bogus",
                "1.0-beta",
                "1.0",
                "1.0.1",
                "2.0",
                "v1.5",
                "1:0.1",
            ]
        );

        // antisymmetry over every pair
        for a in &versions {
            for b in &versions {
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
            }
        }
    }

    #[test]
    fn parse_game_version() -> anyhow::Result<()> {
        let version: GameVersion = "1.8.1".parse()?;
        assert_eq!(version.to_string(), "1.8.1");

        let version: GameVersion = "any".parse()?;
        assert!(version.is_empty());
        assert_eq!(version.to_string(), "any");

        assert!("1.2.3.4.5".parse::<GameVersion>().is_err());
        assert!("1.x".parse::<GameVersion>().is_err());
        Ok(())
    }

    #[test]
    fn game_version_wildcards() -> anyhow::Result<()> {
        let wildcard: GameVersion = "1.8".parse()?;
        assert!(wildcard.covers(&"1.8.1".parse()?));
        assert!(wildcard.covers(&"1.8".parse()?));
        assert!(!wildcard.covers(&"1.9.1".parse()?));
        assert!(GameVersion::empty().covers(&"0.23".parse()?));
        Ok(())
    }
}
