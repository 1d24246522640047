use anyhow::Context;
use log::*;
use modmirror::{
    config::Config,
    error::ResolveError,
    feed::{FeedDocument, ReleaseStatus},
    ingest, log as app_log,
    opts::{Command, Opts},
    resolve::{ResolvedModule, Resolver},
    store::{
        self,
        models::{RelType, Repository},
        Store,
    },
};
use std::{path::PathBuf, process, sync::Arc};
use url::Url;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // retrieval errors are expected user-facing outcomes, not program failures
        if let Some(resolve_error) = e.downcast_ref::<ResolveError>() {
            eprintln!("{}", resolve_error);
        } else {
            eprintln!("Error: {:?}", e);
        }
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let opts = Opts::get();
    dotenv::dotenv().ok();

    let mut config = Config::from_env()?;
    if let Some(log_level) = opts.log_level {
        config.log_level = log_level;
    }

    app_log::setup_logging(&config)?;
    config.debug_values();
    debug!("{:?}", opts);

    let store = Arc::new(store::Builder::from_location(opts.store.into()).build().await?);

    match opts.command {
        Command::Import {
            feed,
            repository,
            url,
        } => import(&store, feed, repository, url).await,
        Command::Show { module, version } => show(&store, &module, version.as_deref()).await,
        Command::Repos => repos(&store).await,
        Command::Forget { repository } => forget(&store, repository).await,
    }
}

/// Ingests a feed document from the filesystem and prints the resulting report.
async fn import(
    store: &Arc<Store>,
    feed_path: PathBuf,
    repository: String,
    url: String,
) -> anyhow::Result<()> {
    let url = Url::parse(&url).context("invalid repository URL")?;
    let bytes = tokio::fs::read(&feed_path)
        .await
        .with_context(|| format!("failed to read feed document {}", feed_path.display()))?;
    let feed = FeedDocument::from_slice(&bytes)?;

    let report = ingest::apply_feed(
        store,
        Repository {
            repo_id: 0,
            name: repository,
            url: url.to_string(),
            priority: 0,
            mirror: false,
            comment: None,
        },
        feed,
    )
    .await?;

    println!("{}: {} releases applied", report.repository, report.applied);
    for skipped in &report.skipped {
        println!(
            "  skipped entry {} ({}): {}",
            skipped.index,
            skipped.identifier.as_deref().unwrap_or("unknown identifier"),
            skipped.reason
        );
    }
    for malformed in &report.malformed_versions {
        println!(
            "  malformed version on {}: {}",
            malformed.identifier, malformed.version
        );
    }

    Ok(())
}

/// Resolves and renders a module.
async fn show(store: &Arc<Store>, module: &str, version: Option<&str>) -> anyhow::Result<()> {
    let resolver = Resolver::new(Arc::clone(store));
    let resolved = match version {
        Some(version) => resolver.resolve_at(module, version).await?,
        None => resolver.resolve(module).await?,
    };

    render_module(&resolved);
    Ok(())
}

/// Lists all stored repositories and their refs.
async fn repos(store: &Arc<Store>) -> anyhow::Result<()> {
    let repositories = store.catalog.all_repositories().await?;
    if repositories.is_empty() {
        println!("No repositories");
        return Ok(());
    }

    for repository in repositories {
        let mut line = format!(
            "{} ({}) priority {}",
            repository.name, repository.url, repository.priority
        );
        if repository.mirror {
            line.push_str(" [mirror]");
        }
        if let Some(comment) = &repository.comment {
            line.push_str(&format!(" - {}", comment));
        }
        println!("{}", line);

        for repository_ref in store
            .catalog
            .get_repository_refs(repository.repo_id)
            .await?
        {
            println!("  ref: {} ({})", repository_ref.name, repository_ref.url);
        }
    }

    Ok(())
}

/// Deletes a repository and everything ingested under it.
async fn forget(store: &Arc<Store>, repository: String) -> anyhow::Result<()> {
    if store.catalog.delete_repository(repository.clone()).await? {
        println!("Repository {} removed", repository);
        Ok(())
    } else {
        anyhow::bail!("no such repository: {}", repository)
    }
}

fn render_module(resolved: &ResolvedModule) {
    println!(
        "{} ({}) {}{}",
        resolved.display_name,
        resolved.module,
        resolved.version,
        status_annotation(resolved.release_status)
    );
    println!("{}", resolved.summary);
    if let Some(description) = &resolved.description {
        println!();
        println!("{}", description);
    }

    println!();
    if !resolved.authors.is_empty() {
        println!("Authors: {}", resolved.authors.join(", "));
    }
    if !resolved.licenses.is_empty() {
        println!("Licenses: {}", resolved.licenses.join(", "));
    }
    if !resolved.tags.is_empty() {
        let tags: Vec<String> = resolved.tags.iter().map(|tag| format!("#{}", tag)).collect();
        println!("Tags: {}", tags.join(" "));
    }
    if !resolved.localizations.is_empty() {
        println!("Localizations: {}", resolved.localizations.join(", "));
    }
    if let Some(release_date) = resolved.release_date {
        println!("Released: {}", release_date.format("%Y-%m-%d"));
    }
    if let Some(compat) = game_compat(resolved) {
        println!("Game versions: {}", compat);
    }
    if let Some(download_size) = resolved.download_size {
        println!("Download size: {}", human_size(download_size));
    }
    if let Some(install_size) = resolved.install_size {
        println!("Install size: {}", human_size(install_size));
    }
    println!("Downloads: {}", resolved.download_count);

    let resources = &resolved.resources;
    for (label, link) in &[
        ("Homepage", &resources.homepage),
        ("Repository", &resources.repository),
        ("Bugtracker", &resources.bugtracker),
        ("SpaceDock", &resources.spacedock),
    ] {
        if let Some(link) = link {
            println!("{}: {}", label, link);
        }
    }

    if let Some(replacement) = &resolved.replacement {
        println!();
        println!(
            "Deprecated, install this instead: {}",
            format_constraint(&replacement.target, &replacement.version, &replacement.version_min)
        );
    }

    if !resolved.relationships.is_empty() {
        println!();
        for group in &resolved.relationships {
            let members: Vec<String> = group
                .members
                .iter()
                .map(|member| {
                    format_constraint(&member.target, &member.version, &member.version_min)
                })
                .collect();

            // alternatives within a group are joined: any one of them satisfies the group
            let mut line = format!("{}: {}", rel_label(group.rel_type), members.join(" | "));
            if let Some(help) = &group.choice_help_text {
                line.push_str(&format!(" ({})", help));
            }
            println!("{}", line);
        }
    }

    if !resolved.other_versions.is_empty() {
        println!();
        println!("Other versions: {}", resolved.other_versions.join(", "));
    }
}

/// Returns the version annotation for a release status. Stable is the default and carries no
/// annotation.
fn status_annotation(status: ReleaseStatus) -> String {
    match status {
        ReleaseStatus::Stable => String::new(),
        other => format!(" ({})", other),
    }
}

fn rel_label(rel_type: RelType) -> &'static str {
    match rel_type {
        RelType::Depends => "Depends",
        RelType::Recommends => "Recommends",
        RelType::Suggests => "Suggests",
        RelType::Supports => "Supports",
        RelType::Conflicts => "Conflicts",
        RelType::Provides => "Provides",
    }
}

/// Formats a relationship target with its optional version constraint.
fn format_constraint(target: &str, version: &Option<String>, version_min: &Option<String>) -> String {
    match (version, version_min) {
        (Some(version), Some(version_min)) => {
            format!("{} ({} to {})", target, version_min, version)
        }
        (Some(version), None) => format!("{} ({})", target, version),
        (None, Some(version_min)) => format!("{} (>= {})", target, version_min),
        (None, None) => target.to_string(),
    }
}

/// Formats a release's game version compatibility range.
fn game_compat(resolved: &ResolvedModule) -> Option<String> {
    let mut compat = match (&resolved.game_version_min, &resolved.game_version) {
        (None, None) => return None,
        (Some(min), Some(max)) if min == max => max.to_string(),
        (Some(min), Some(max)) => format!("{} to {}", min, max),
        (Some(min), None) => format!(">= {}", min),
        (None, Some(max)) => format!("up to {}", max),
    };

    if resolved.game_version_strict {
        compat.push_str(" (strict)");
    }

    Some(compat)
}

fn human_size(size: i64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut size = size as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", size as i64, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
