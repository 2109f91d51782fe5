use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::{ChapterRecord, WorkEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Translated chapters of every work, one JSON document on disk.
#[derive(Debug)]
pub struct ChapterStore {
    path: PathBuf,
    works: BTreeMap<String, WorkEntry>,
}

impl ChapterStore {
    /// A missing file is an empty store. So is a malformed one: its contents are
    /// discarded (with a warning) and overwritten by the next save.
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    works: BTreeMap::new(),
                });
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read chapter store: {}", path.display()));
            }
        };

        let works = if raw.trim().is_empty() {
            BTreeMap::new()
        } else {
            match serde_json::from_str(&raw) {
                Ok(works) => works,
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "chapter store is malformed; starting from an empty store"
                    );
                    BTreeMap::new()
                }
            }
        };

        Ok(Self { path, works })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn work(&self, work_url: &str) -> Option<&WorkEntry> {
        self.works.get(work_url)
    }

    /// Replaces the chapter with the same link in place, or appends it.
    pub fn upsert(
        &mut self,
        work_url: &str,
        work_title: Option<&str>,
        record: ChapterRecord,
    ) -> Upsert {
        let entry = self.works.entry(work_url.to_owned()).or_default();
        if let Some(title) = work_title.filter(|t| !t.trim().is_empty()) {
            entry.title = title.to_owned();
        } else if entry.title.is_empty() {
            entry.title = work_url.to_owned();
        }

        match entry.chapters.iter_mut().find(|c| c.link == record.link) {
            Some(existing) => {
                *existing = record;
                Upsert::Replaced
            }
            None => {
                entry.chapters.push(record);
                Upsert::Inserted
            }
        }
    }

    /// Rewrites the whole document through a temp file in the same directory.
    pub fn save(&self) -> anyhow::Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("create store dir: {}", parent.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .with_context(|| format!("create temp file in: {}", parent.display()))?;
        serde_json::to_writer_pretty(&mut tmp, &self.works).context("serialize chapter store")?;
        tmp.write_all(b"\n").context("write chapter store newline")?;
        tmp.flush().context("flush chapter store")?;
        tmp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("replace chapter store: {}", self.path.display()))?;
        Ok(())
    }
}

/// Episode URLs already handled. Appended to, never rewritten.
#[derive(Debug)]
pub struct History {
    path: PathBuf,
    seen: HashSet<String>,
}

impl History {
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let seen = match std::fs::read_to_string(&path) {
            Ok(raw) => raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("read history: {}", path.display()));
            }
        };
        Ok(Self { path, seen })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn append(&mut self, url: &str) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open history: {}", self.path.display()))?;
        writeln!(file, "{url}").context("append history line")?;
        self.seen.insert(url.to_owned());
        Ok(())
    }
}
