//! Build script.
//!
//! Stamps the build with Git commit metadata, if available:
//! * `YTM_RESOLVER_COMMIT_HASH` - abbreviated commit hash
//! * `YTM_RESOLVER_COMMIT_DATE` - commit date
//!
//! Read at runtime via `option_env!` by [`ytm_resolver::build_info`], since
//! neither variable is set when building outside a Git checkout.

use git2::{Commit, Repository};
use time::OffsetDateTime;

fn main() {
    let Ok(repo) = Repository::open(".") else { return };
    let Some(commit) = repo.head().ok().and_then(|head| head.peel_to_commit().ok()) else { return };

    if let Some(hash) = short_hash(&commit) {
        println!("cargo:rustc-env=YTM_RESOLVER_COMMIT_HASH={hash}");
    }
    if let Some(date) = commit_date(&commit) {
        println!("cargo:rustc-env=YTM_RESOLVER_COMMIT_DATE={date}");
    }
}

fn short_hash(commit: &Commit<'_>) -> Option<String> {
    let buf = commit.as_object().short_id().ok()?;
    buf.as_str().map(ToString::to_string)
}

fn commit_date(commit: &Commit<'_>) -> Option<String> {
    let timestamp = OffsetDateTime::from_unix_timestamp(commit.time().seconds()).ok()?;
    let format = time::format_description::parse("[year]-[month]-[day]").expect("invalid date format string");
    timestamp.format(&format).ok()
}
