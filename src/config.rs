use std::path::Path;

use crate::error::{Error, IoResultExt, Result};

/// repository configuration stored in `.git/config` (git ini dialect:
/// `[section]` / `[section "subsection"]` headers, `key = value` lines)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    sections: Vec<Section>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Section {
    name: String,
    subsection: Option<String>,
    entries: Vec<(String, String)>,
}

impl Section {
    fn key(&self) -> String {
        match &self.subsection {
            Some(sub) => format!("{}.{}", self.name, sub),
            None => self.name.clone(),
        }
    }
}

impl Config {
    /// load config from file; a missing file is an empty config
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut sections: Vec<Section> = Vec::new();
        for raw_line in content.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let header = header.trim();
                let (name, subsection) = match header.split_once(' ') {
                    Some((name, rest)) => {
                        let sub = rest
                            .trim()
                            .strip_prefix('"')
                            .and_then(|r| r.strip_suffix('"'))
                            .ok_or_else(|| {
                                Error::Config(format!("bad header: {line}"))
                            })?;
                        (name.to_string(), Some(sub.to_string()))
                    }
                    None => (header.to_string(), None),
                };
                sections.push(Section {
                    name,
                    subsection,
                    entries: Vec::new(),
                });
            } else if let Some((key, value)) = line.split_once('=') {
                let section = sections
                    .last_mut()
                    .ok_or_else(|| Error::Config(format!("entry before section: {line}")))?;
                section
                    .entries
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }
        Ok(Self { sections })
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            match &section.subsection {
                Some(sub) => out.push_str(&format!("[{} \"{}\"]\n", section.name, sub)),
                None => out.push_str(&format!("[{}]\n", section.name)),
            }
            for (key, value) in &section.entries {
                out.push_str(&format!("\t{key} = {value}\n"));
            }
        }
        out
    }

    /// save config to file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().expect("config path has a parent");
        let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        std::fs::write(&tmp, self.serialize()).with_path(&tmp)?;
        std::fs::rename(&tmp, path).with_path(path)?;
        Ok(())
    }

    fn find(&self, section_key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key() == section_key)
    }

    /// get by dotted key: `core.bare`, `remote.origin.url`
    pub fn get(&self, key: &str) -> Option<&str> {
        let (section_key, option) = split_key(key)?;
        self.find(&section_key)?
            .entries
            .iter()
            .find(|(k, _)| *k == option)
            .map(|(_, v)| v.as_str())
    }

    /// set by dotted key, creating the section if needed
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        let (section_key, option) =
            split_key(key).ok_or_else(|| Error::Config(format!("bad key: {key}")))?;
        let section = match self.sections.iter_mut().find(|s| s.key() == section_key) {
            Some(section) => section,
            None => {
                let (name, subsection) = match section_key.split_once('.') {
                    Some((name, sub)) => (name.to_string(), Some(sub.to_string())),
                    None => (section_key.clone(), None),
                };
                self.sections.push(Section {
                    name,
                    subsection,
                    entries: Vec::new(),
                });
                self.sections.last_mut().expect("just pushed")
            }
        };
        match section.entries.iter_mut().find(|(k, _)| *k == option) {
            Some(entry) => entry.1 = value.into(),
            None => section.entries.push((option, value.into())),
        }
        Ok(())
    }

    /// remove a key; drops the section once empty. true if removed.
    pub fn unset(&mut self, key: &str) -> bool {
        let Some((section_key, option)) = split_key(key) else {
            return false;
        };
        let Some(at) = self.sections.iter().position(|s| s.key() == section_key) else {
            return false;
        };
        let section = &mut self.sections[at];
        let before = section.entries.len();
        section.entries.retain(|(k, _)| *k != option);
        let removed = section.entries.len() < before;
        if section.entries.is_empty() {
            self.sections.remove(at);
        }
        removed
    }

    /// remove an entire section (e.g. `remote.origin`). true if removed.
    pub fn remove_section(&mut self, section_key: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| s.key() != section_key);
        self.sections.len() < before
    }

    /// all keys flattened to `section[.subsection].option = value`, sorted
    pub fn list(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .sections
            .iter()
            .flat_map(|s| {
                s.entries
                    .iter()
                    .map(move |(k, v)| (format!("{}.{}", s.key(), k), v.clone()))
            })
            .collect();
        out.sort();
        out
    }

    /// `Name <email>` from user.name + user.email, when both are set
    pub fn user_identity(&self) -> Option<String> {
        let name = self.get("user.name")?;
        let email = self.get("user.email")?;
        Some(format!("{name} <{email}>"))
    }

    /// configured remotes as (name, url, fetch refspec)
    pub fn remotes(&self) -> Vec<Remote> {
        let mut out: Vec<Remote> = self
            .sections
            .iter()
            .filter(|s| s.name == "remote")
            .filter_map(|s| {
                let name = s.subsection.clone()?;
                let url = s
                    .entries
                    .iter()
                    .find(|(k, _)| k == "url")
                    .map(|(_, v)| v.clone())?;
                let fetch = s
                    .entries
                    .iter()
                    .find(|(k, _)| k == "fetch")
                    .map(|(_, v)| v.clone());
                Some(Remote { name, url, fetch })
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn remote(&self, name: &str) -> Option<Remote> {
        self.remotes().into_iter().find(|r| r.name == name)
    }

    /// add a remote with the default fetch refspec
    pub fn add_remote(&mut self, name: &str, url: &str) -> Result<()> {
        if self.remote(name).is_some() {
            return Err(Error::Config(format!("remote '{name}' already exists")));
        }
        self.set(&format!("remote.{name}.url"), url)?;
        self.set(
            &format!("remote.{name}.fetch"),
            format!("+refs/heads/*:refs/remotes/{name}/*"),
        )?;
        Ok(())
    }

    pub fn remove_remote(&mut self, name: &str) -> Result<()> {
        if !self.remove_section(&format!("remote.{name}")) {
            return Err(Error::Config(format!("remote '{name}' does not exist")));
        }
        Ok(())
    }
}

/// a configured remote repository
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
    pub fetch: Option<String>,
}

/// split `section.option` / `section.sub.option` into (section key, option)
fn split_key(key: &str) -> Option<(String, String)> {
    let first = key.find('.')?;
    let last = key.rfind('.')?;
    if first == last {
        let (section, option) = key.split_at(first);
        Some((section.to_string(), option[1..].to_string()))
    } else {
        let section = &key[..first];
        let sub = &key[first + 1..last];
        let option = &key[last + 1..];
        if section.is_empty() || sub.is_empty() || option.is_empty() {
            return None;
        }
        Some((format!("{section}.{sub}"), option.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_and_serialize() {
        let text = "[core]\n\tbare = false\n[remote \"origin\"]\n\turl = /tmp/src\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.get("core.bare"), Some("false"));
        assert_eq!(cfg.get("remote.origin.url"), Some("/tmp/src"));
        assert_eq!(cfg.serialize(), text);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let text = "# top comment\n[core]\n; semicolon comment\n\tbare = true\n\n";
        let cfg = Config::parse(text).unwrap();
        assert_eq!(cfg.get("core.bare"), Some("true"));
    }

    #[test]
    fn test_set_and_unset() {
        let mut cfg = Config::default();
        cfg.set("user.name", "A").unwrap();
        cfg.set("user.email", "a@b").unwrap();
        assert_eq!(cfg.user_identity().as_deref(), Some("A <a@b>"));

        cfg.set("user.name", "B").unwrap();
        assert_eq!(cfg.get("user.name"), Some("B"));

        assert!(cfg.unset("user.name"));
        assert!(!cfg.unset("user.name"));
        assert_eq!(cfg.get("user.name"), None);
        // section drops when the last key goes
        assert!(cfg.unset("user.email"));
        assert!(cfg.list().is_empty());
    }

    #[test]
    fn test_remotes() {
        let mut cfg = Config::default();
        cfg.add_remote("origin", "/tmp/src").unwrap();
        assert!(cfg.add_remote("origin", "/elsewhere").is_err());

        let remotes = cfg.remotes();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].name, "origin");
        assert_eq!(remotes[0].url, "/tmp/src");
        assert_eq!(
            remotes[0].fetch.as_deref(),
            Some("+refs/heads/*:refs/remotes/origin/*")
        );

        cfg.remove_remote("origin").unwrap();
        assert!(cfg.remotes().is_empty());
        assert!(cfg.remove_remote("origin").is_err());
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config");
        let mut cfg = Config::default();
        cfg.set("core.repositoryformatversion", "0").unwrap();
        cfg.add_remote("origin", "file:///src").unwrap();
        cfg.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("nope")).unwrap();
        assert!(cfg.list().is_empty());
    }

    #[test]
    fn test_dotted_key_split() {
        assert_eq!(
            split_key("remote.origin.url"),
            Some(("remote.origin".into(), "url".into()))
        );
        assert_eq!(split_key("core.bare"), Some(("core".into(), "bare".into())));
        assert_eq!(split_key("nodot"), None);
    }
}
