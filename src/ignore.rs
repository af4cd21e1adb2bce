//! ignore engine: repo-root `.gitignore` plus `.git/info/exclude`, with
//! `#` comments, `!` negation, trailing-`/` directory patterns and globs

use std::path::Path;

use crate::repo::Repository;

struct Pattern {
    negated: bool,
    dir_only: bool,
    anchored: bool,
    glob: glob::Pattern,
    raw: String,
}

/// matcher over the loaded ignore patterns; later patterns win
pub struct IgnoreMatcher {
    patterns: Vec<Pattern>,
}

impl IgnoreMatcher {
    fn parse(text: &str, patterns: &mut Vec<Pattern>) {
        for line in text.lines() {
            let mut line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let negated = line.starts_with('!');
            if negated {
                line = line[1..].trim();
                if line.is_empty() {
                    continue;
                }
            }
            let dir_only = line.ends_with('/');
            let body = line.trim_end_matches('/');
            let anchored = body.contains('/');
            if let Ok(glob) = glob::Pattern::new(body) {
                patterns.push(Pattern {
                    negated,
                    dir_only,
                    anchored,
                    glob,
                    raw: body.to_string(),
                });
            }
        }
    }

    /// true if a repo-relative path should be ignored
    pub fn is_ignored(&self, rel_path: &str, is_dir: bool) -> bool {
        let rel_path = rel_path.trim_end_matches('/');
        if rel_path == ".git" || rel_path.starts_with(".git/") {
            return true;
        }
        let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let mut ignored = false;
        for pattern in &self.patterns {
            let matched = if pattern.anchored {
                // a path pattern matches the path itself or anything under it
                rel_path == pattern.raw
                    || rel_path.starts_with(&format!("{}/", pattern.raw))
                    || pattern.glob.matches(rel_path)
            } else {
                // bare patterns match the basename anywhere, and prefix
                // directories of the path
                pattern.glob.matches(basename)
                    || rel_path
                        .split('/')
                        .take(rel_path.split('/').count().saturating_sub(1))
                        .any(|component| pattern.glob.matches(component))
            };
            if matched && (!pattern.dir_only || is_dir || rel_path.contains('/')) {
                ignored = !pattern.negated;
            }
        }
        ignored
    }
}

fn read_optional(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

/// load `.gitignore` (repo root) then `.git/info/exclude`
pub fn load(repo: &Repository) -> IgnoreMatcher {
    let mut patterns = Vec::new();
    IgnoreMatcher::parse(
        &read_optional(&repo.work_dir().join(".gitignore")),
        &mut patterns,
    );
    IgnoreMatcher::parse(
        &read_optional(&repo.git_dir().join("info/exclude")),
        &mut patterns,
    );
    IgnoreMatcher { patterns }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn matcher(gitignore: &str) -> IgnoreMatcher {
        let mut patterns = Vec::new();
        IgnoreMatcher::parse(gitignore, &mut patterns);
        IgnoreMatcher { patterns }
    }

    #[test]
    fn test_git_dir_always_ignored() {
        let m = matcher("");
        assert!(m.is_ignored(".git", true));
        assert!(m.is_ignored(".git/config", false));
        assert!(!m.is_ignored("src", true));
    }

    #[test]
    fn test_basename_glob() {
        let m = matcher("*.log\n");
        assert!(m.is_ignored("debug.log", false));
        assert!(m.is_ignored("deep/nested/run.log", false));
        assert!(!m.is_ignored("log.txt", false));
    }

    #[test]
    fn test_negation() {
        let m = matcher("*.log\n!keep.log\n");
        assert!(m.is_ignored("a.log", false));
        assert!(!m.is_ignored("keep.log", false));
    }

    #[test]
    fn test_dir_only_pattern() {
        let m = matcher("build/\n");
        assert!(m.is_ignored("build", true));
        assert!(m.is_ignored("build/out.o", false));
        assert!(!m.is_ignored("build", false));
    }

    #[test]
    fn test_anchored_path() {
        let m = matcher("docs/generated\n");
        assert!(m.is_ignored("docs/generated", true));
        assert!(m.is_ignored("docs/generated/index.html", false));
        assert!(!m.is_ignored("other/docs/generated", true));
    }

    #[test]
    fn test_directory_component_match() {
        let m = matcher("target\n");
        assert!(m.is_ignored("target", true));
        assert!(m.is_ignored("target/debug/bin", false));
    }

    #[test]
    fn test_comments_and_blanks() {
        let m = matcher("# comment\n\n*.tmp\n");
        assert!(m.is_ignored("x.tmp", false));
        assert!(!m.is_ignored("# comment", false));
    }

    #[test]
    fn test_load_merges_sources() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        std::fs::create_dir_all(repo.git_dir().join("info")).unwrap();
        std::fs::write(repo.git_dir().join("info/exclude"), "*.bak\n").unwrap();

        let m = load(&repo);
        assert!(m.is_ignored("x.log", false));
        assert!(m.is_ignored("y.bak", false));
        assert!(!m.is_ignored("z.txt", false));
    }
}
