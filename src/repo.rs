use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, IoResultExt, Result};
use crate::odb::ObjectStore;

/// branch a fresh repository starts on
pub const DEFAULT_BRANCH: &str = "main";

/// directory under .git holding merge/cherry-pick/rebase state files
pub const STATE_DIR: &str = "mingit";

/// a git repository: working directory, `.git` dir, and its object store
pub struct Repository {
    work_dir: PathBuf,
    git_dir: PathBuf,
    odb: ObjectStore,
}

impl Repository {
    /// initialize a new repository at path (creates `.git`)
    pub fn init(path: &Path) -> Result<Self> {
        let work_dir = path.to_path_buf();
        let git_dir = work_dir.join(".git");
        if git_dir.exists() {
            return Err(Error::Config(format!(
                "repository already exists at {}",
                git_dir.display()
            )));
        }

        std::fs::create_dir_all(git_dir.join("objects/pack")).with_path(&git_dir)?;
        std::fs::create_dir_all(git_dir.join("refs/heads")).with_path(&git_dir)?;
        std::fs::create_dir_all(git_dir.join("refs/tags")).with_path(&git_dir)?;
        std::fs::create_dir_all(git_dir.join("logs")).with_path(&git_dir)?;
        std::fs::create_dir_all(git_dir.join("info")).with_path(&git_dir)?;

        std::fs::write(
            git_dir.join("HEAD"),
            format!("ref: refs/heads/{DEFAULT_BRANCH}\n"),
        )
        .with_path(git_dir.join("HEAD"))?;

        let mut config = Config::default();
        config.set("core.repositoryformatversion", "0")?;
        config.set("core.filemode", "true")?;
        config.set("core.bare", "false")?;
        config.save(&git_dir.join("config"))?;

        let odb = ObjectStore::new(git_dir.join("objects"));
        Ok(Self {
            work_dir,
            git_dir,
            odb,
        })
    }

    /// open an existing repository rooted exactly at path
    pub fn open(path: &Path) -> Result<Self> {
        let work_dir = path.to_path_buf();
        let git_dir = work_dir.join(".git");
        if !git_dir.is_dir() {
            return Err(Error::NotARepository(work_dir));
        }
        let odb = ObjectStore::new(git_dir.join("objects"));
        Ok(Self {
            work_dir,
            git_dir,
            odb,
        })
    }

    /// open the repository containing path, walking up to the filesystem root
    pub fn discover(start: &Path) -> Result<Self> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(".git").is_dir() {
                return Self::open(&dir);
            }
            if !dir.pop() {
                return Err(Error::NotARepository(start.to_path_buf()));
            }
        }
    }

    /// working directory root
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `.git` directory
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// object database
    pub fn odb(&self) -> &ObjectStore {
        &self.odb
    }

    /// path to the staging index file
    pub fn index_file(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    /// path to `.git/config`
    pub fn config_file(&self) -> PathBuf {
        self.git_dir.join("config")
    }

    /// state directory for merge/cherry-pick/rebase/stash bookkeeping
    pub fn state_dir(&self) -> PathBuf {
        self.git_dir.join(STATE_DIR)
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load(&self.config_file())
    }

    pub fn save_config(&self, config: &Config) -> Result<()> {
        config.save(&self.config_file())
    }

    /// resolve a user path against the working directory; rejects escapes
    pub fn safe_path(&self, path: &str) -> Result<PathBuf> {
        let joined = self.work_dir.join(path);
        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                std::path::Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(Error::Config(format!("path escapes repository: {path}")));
                    }
                }
                std::path::Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        if !normalized.starts_with(&self.work_dir) {
            return Err(Error::Config(format!("path escapes repository: {path}")));
        }
        Ok(normalized)
    }

    /// path of a worktree file relative to the repository root
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.work_dir)
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}
