//! Provides the [`Opts`](Opts) struct, used to read and access the program's command line
//! arguments.

use crate::{config, util::LogLevel};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::path::PathBuf;
use strum::VariantNames;

/// Stores command line parameters.
#[derive(Debug)]
pub struct Opts {
    /// Path to the program store database file.
    pub store: PathBuf,
    /// The log level to use.
    pub log_level: Option<LogLevel>,
    /// The subcommand to run.
    pub command: Command,
}

/// The program's subcommands.
#[derive(Debug)]
pub enum Command {
    /// Ingest a repository feed document into the store.
    Import {
        /// Path to the feed document.
        feed: PathBuf,
        /// Name of the repository to ingest the feed under.
        repository: String,
        /// The repository's source URL.
        url: String,
    },
    /// Show a module's current (or an explicit) release.
    Show {
        /// The module identifier: a bare name or a `repository/module` pair.
        module: String,
        /// An explicit release version to show instead of the current one.
        version: Option<String>,
    },
    /// List all stored repositories.
    Repos,
    /// Delete a repository and everything ingested under it.
    Forget {
        /// Name of the repository to delete.
        repository: String,
    },
}

impl Opts {
    /// Builds a new `clap::App` used to parse a given set of command line parameters.
    fn build_app() -> App<'static, 'static> {
        App::new(clap::crate_name!())
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
            .about(clap::crate_description!())
            .setting(AppSettings::SubcommandRequiredElseHelp)
            .arg(
                Arg::with_name("store")
                    .long("store")
                    .value_name("FILE")
                    .default_value(config::DEFAULT_STORE_FILE_LOCATION)
                    .help(
                        "Sets a custom program persistent store file. The special value '_memory' specifies an \
                         ephemeral in-memory store, which is primarily used for debugging purposes.",
                    )
                    .takes_value(true),
            )
            .arg(
                Arg::with_name("log-level")
                    .long("log-level")
                    .value_name("LOG LEVEL")
                    .possible_values(LogLevel::VARIANTS)
                    .case_insensitive(true)
                    .takes_value(true)
                    .help("Specify the log level to use."),
            )
            .subcommand(
                SubCommand::with_name("import")
                    .about("Ingests a repository feed document into the store")
                    .arg(
                        Arg::with_name("FEED")
                            .help("Path to the feed document")
                            .required(true),
                    )
                    .arg(
                        Arg::with_name("repository")
                            .long("repo")
                            .value_name("NAME")
                            .help("Name of the repository to ingest the feed under")
                            .required(true)
                            .takes_value(true),
                    )
                    .arg(
                        Arg::with_name("url")
                            .long("url")
                            .value_name("URL")
                            .help("The repository's source URL")
                            .required(true)
                            .takes_value(true),
                    ),
            )
            .subcommand(
                SubCommand::with_name("show")
                    .about("Shows a module's current release")
                    .arg(
                        Arg::with_name("MODULE")
                            .help("The module identifier: a bare name or a repository/module pair")
                            .required(true),
                    )
                    .arg(
                        Arg::with_name("version")
                            .long("version")
                            .value_name("VERSION")
                            .help("Show an explicit release version instead of the current one")
                            .takes_value(true),
                    ),
            )
            .subcommand(SubCommand::with_name("repos").about("Lists all stored repositories"))
            .subcommand(
                SubCommand::with_name("forget")
                    .about("Deletes a repository and everything ingested under it")
                    .arg(
                        Arg::with_name("REPOSITORY")
                            .help("Name of the repository to delete")
                            .required(true),
                    ),
            )
    }

    /// Returns a new `Opts` object from a given set of matched command line parameters.
    fn from_matches(matches: &ArgMatches) -> Self {
        let command = match matches.subcommand() {
            ("import", Some(sub_matches)) => Command::Import {
                feed: sub_matches
                    .value_of_os("FEED")
                    .expect("FEED argument has no value")
                    .into(),
                repository: sub_matches
                    .value_of("repository")
                    .expect("repository option has no value")
                    .to_string(),
                url: sub_matches
                    .value_of("url")
                    .expect("url option has no value")
                    .to_string(),
            },
            ("show", Some(sub_matches)) => Command::Show {
                module: sub_matches
                    .value_of("MODULE")
                    .expect("MODULE argument has no value")
                    .to_string(),
                version: sub_matches.value_of("version").map(str::to_string),
            },
            ("repos", _) => Command::Repos,
            ("forget", Some(sub_matches)) => Command::Forget {
                repository: sub_matches
                    .value_of("REPOSITORY")
                    .expect("REPOSITORY argument has no value")
                    .to_string(),
            },
            _ => unreachable!("a subcommand is required"),
        };

        Opts {
            store: matches
                .value_of_os("store")
                .expect("store option has no value")
                .into(),
            log_level: matches
                .value_of("log-level")
                .map(|s| s.parse().expect("failed to parse value as log level")),
            command,
        }
    }

    /// Returns a new `Opts` object built from the program's command line parameters.
    pub fn get() -> Opts {
        Opts::from_matches(&Opts::build_app().get_matches())
    }

    #[allow(dead_code)]
    /// Returns a new `Opts` object built from custom command line parameters.
    pub fn custom_args(args: &[&str]) -> Opts {
        let mut full_args = vec!["modmirror"];
        full_args.extend_from_slice(args);
        Opts::from_matches(&Opts::build_app().get_matches_from(&full_args))
    }
}
