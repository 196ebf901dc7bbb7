//! Sound asset discovery
//!
//! Removable media always wins: the first mounted root that holds any
//! matching file supplies both categories, with no merging across roots.
//! Without one, a local directory (created on demand) is used.

use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use regex::Regex;

/// Where a resolved set of sounds came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Removable(PathBuf),
    Local(PathBuf),
}

impl Provenance {
    pub fn is_removable(&self) -> bool {
        matches!(self, Provenance::Removable(_))
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Removable(path) => write!(f, "USB:{}", path.display()),
            Provenance::Local(path) => write!(f, "LOCAL:{}", path.display()),
        }
    }
}

/// Ordered sound files for one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundSet {
    pub provenance: Provenance,
    pub paths: Vec<PathBuf>,
}

impl SoundSet {
    pub fn new(provenance: Provenance, paths: Vec<PathBuf>) -> Self {
        Self { provenance, paths }
    }

    pub fn empty(provenance: Provenance) -> Self {
        Self::new(provenance, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

/// One resolver result: provenance plus both categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub provenance: Provenance,
    pub primary: SoundSet,
    pub secondary: SoundSet,
}

/// A shell-style file-name pattern (`*` and `?` wildcards)
#[derive(Debug, Clone)]
pub struct NamePattern {
    source: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(&expr)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }
}

/// Decides whether a candidate directory counts as a removable root
pub type MountFilter = fn(&Path) -> bool;

/// Finds the active sound directory and its matching files
#[derive(Debug, Clone)]
pub struct SourceResolver {
    media_bases: Vec<PathBuf>,
    local_dir: PathBuf,
    primary: NamePattern,
    secondary: NamePattern,
    mount_filter: MountFilter,
}

impl SourceResolver {
    pub fn new(
        media_bases: Vec<PathBuf>,
        local_dir: PathBuf,
        primary: NamePattern,
        secondary: NamePattern,
    ) -> Self {
        Self {
            media_bases,
            local_dir,
            primary,
            secondary,
            mount_filter: is_mount_point,
        }
    }

    /// Replace the mount-point check, e.g. to accept plain directories.
    pub fn with_mount_filter(mut self, filter: MountFilter) -> Self {
        self.mount_filter = filter;
        self
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Resolve the current sound source. Never fails; unreadable locations
    /// are skipped with a warning and an empty local result is returned if
    /// nothing matches anywhere.
    pub fn resolve(&self) -> Resolution {
        for root in self.removable_roots() {
            match self.scan(&root) {
                Ok((primary, secondary)) if !primary.is_empty() || !secondary.is_empty() => {
                    return self.build(Provenance::Removable(root), primary, secondary);
                }
                Ok(_) => {}
                Err(e) => {
                    crate::log_warning!("Removable drive {} scan failed: {}", root.display(), e);
                }
            }
        }

        let provenance = Provenance::Local(self.local_dir.clone());
        if let Err(e) = fs::create_dir_all(&self.local_dir) {
            crate::log_warning!(
                "Cannot create local sound directory {}: {}",
                self.local_dir.display(),
                e
            );
            return self.build(provenance, Vec::new(), Vec::new());
        }

        match self.scan(&self.local_dir) {
            Ok((primary, secondary)) => self.build(provenance, primary, secondary),
            Err(e) => {
                crate::log_warning!("Local sound directory scan failed: {}", e);
                self.build(provenance, Vec::new(), Vec::new())
            }
        }
    }

    /// Mounted removable roots in scan order
    pub fn removable_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        for base in &self.media_bases {
            for child in sorted_subdirs(base) {
                if (self.mount_filter)(&child) {
                    roots.push(child);
                } else {
                    // Desktop automounters use <base>/<user>/<label>
                    roots.extend(
                        sorted_subdirs(&child)
                            .into_iter()
                            .filter(|grandchild| (self.mount_filter)(grandchild)),
                    );
                }
            }
        }
        roots
    }

    fn build(&self, provenance: Provenance, primary: Vec<PathBuf>, secondary: Vec<PathBuf>) -> Resolution {
        let primary: Vec<PathBuf> = primary.into_iter().take(1).collect();
        Resolution {
            primary: SoundSet::new(provenance.clone(), primary),
            secondary: SoundSet::new(provenance.clone(), secondary),
            provenance,
        }
    }

    fn scan(&self, dir: &Path) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let mut primary = Vec::new();
        let mut secondary = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if self.primary.matches(name) {
                primary.push(entry.path());
            }
            if self.secondary.matches(name) {
                secondary.push(entry.path());
            }
        }

        primary.sort();
        secondary.sort();
        Ok((primary, secondary))
    }
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// True if `path` is the root of a mounted file system.
pub fn is_mount_point(path: &Path) -> bool {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return false;
    };
    if !meta.is_dir() {
        return false;
    }
    let Ok(parent) = fs::metadata(path.join("..")) else {
        return false;
    };
    meta.dev() != parent.dev() || meta.ino() == parent.ino()
}
