//! commit identity: config user.name/user.email with environment overrides

use chrono::{Local, Offset};

use crate::error::Result;
use crate::object::Ident;
use crate::repo::Repository;

const FALLBACK_IDENTITY: &str = "Mingit User <user@mingit.invalid>";

/// local utc offset formatted the git way: ±HHMM
pub fn local_tz_offset() -> String {
    let seconds = Local::now().offset().fix().local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let abs = seconds.unsigned_abs();
    format!("{}{:02}{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

/// `GIT_AUTHOR_DATE` / `GIT_COMMITTER_DATE` in the `"<epoch> ±HHMM"` form
fn date_from_env(kind: &str) -> Option<(i64, String)> {
    let value = std::env::var(format!("GIT_{kind}_DATE")).ok()?;
    let (ts, tz) = value.trim().split_once(' ')?;
    Some((ts.parse().ok()?, tz.trim().to_string()))
}

fn name_email_from_env(kind: &str) -> Option<String> {
    let name = std::env::var(format!("GIT_{kind}_NAME")).ok()?;
    let email = std::env::var(format!("GIT_{kind}_EMAIL")).ok()?;
    Some(format!("{name} <{email}>"))
}

fn ident(repo: &Repository, kind: &str) -> Result<Ident> {
    let who = name_email_from_env(kind)
        .or_else(|| repo.load_config().ok().and_then(|c| c.user_identity()))
        .unwrap_or_else(|| FALLBACK_IDENTITY.to_string());
    let (timestamp, tz_offset) = date_from_env(kind).unwrap_or_else(|| {
        (
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            local_tz_offset(),
        )
    });
    Ok(Ident::new(who, timestamp, tz_offset))
}

/// author identity for a new commit
pub fn author_ident(repo: &Repository) -> Result<Ident> {
    ident(repo, "AUTHOR")
}

/// committer identity for a new commit (and for reflog lines)
pub fn committer_ident(repo: &Repository) -> Result<Ident> {
    ident(repo, "COMMITTER")
}
