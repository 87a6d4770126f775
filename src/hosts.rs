//! `/etc/hosts`-format file model
//!
//! Parses and rewrites a hosts file while preserving comments, blank lines,
//! and entries the proxy does not own. Mutations happen in memory; callers
//! decide when to `load` from and `flush` to disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for hosts file operations
#[derive(Debug, Error)]
pub enum HostsError {
    /// The file could not be read
    #[error("failed to read hosts file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    /// The file could not be written
    #[error("failed to write hosts file {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// One line of the hosts file.
#[derive(Debug, Clone)]
enum Line {
    /// A comment or blank line, kept verbatim.
    Raw(String),
    /// An address mapping: `ip host [host...] [# comment]`.
    Entry {
        ip: String,
        hostnames: Vec<String>,
        comment: Option<String>,
    },
}

impl Line {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Line::Raw(raw.to_string());
        }

        let (data, comment) = match trimmed.split_once('#') {
            Some((data, comment)) => (data, Some(comment.trim().to_string())),
            None => (trimmed, None),
        };

        let mut fields = data.split_whitespace();
        match fields.next() {
            Some(ip) => Line::Entry {
                ip: ip.to_string(),
                hostnames: fields.map(str::to_string).collect(),
                comment,
            },
            // Nothing left of the '#', keep the line untouched
            None => Line::Raw(raw.to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            Line::Raw(raw) => raw.clone(),
            Line::Entry {
                ip,
                hostnames,
                comment,
            } => {
                let mut out = format!("{} {}", ip, hostnames.join(" "));
                if let Some(comment) = comment {
                    out.push_str(" # ");
                    out.push_str(comment);
                }
                out
            }
        }
    }
}

/// In-memory representation of a hosts file.
#[derive(Debug)]
pub struct HostsFile {
    path: PathBuf,
    lines: Vec<Line>,
}

impl HostsFile {
    /// Open a hosts file, parsing its current contents. A missing file is
    /// treated as empty; `flush` will create it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HostsError> {
        let mut file = Self {
            path: path.into(),
            lines: Vec::new(),
        };
        file.load()?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file from disk, discarding in-memory state. Required
    /// before every mutation so edits made outside the process survive the
    /// next flush.
    pub fn load(&mut self) -> Result<(), HostsError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(HostsError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        self.lines = contents.lines().map(Line::parse).collect();
        Ok(())
    }

    /// Write the in-memory state back to disk.
    pub fn flush(&self) -> Result<(), HostsError> {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.render());
            out.push('\n');
        }
        fs::write(&self.path, out).map_err(|source| HostsError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// True if any entry maps `hostname`, under any address.
    pub fn has_hostname(&self, hostname: &str) -> bool {
        self.entries().any(|(_, hosts)| {
            hosts.iter().any(|h| h.eq_ignore_ascii_case(hostname))
        })
    }

    /// All mapped hostnames, in file order, duplicates included.
    pub fn hostnames(&self) -> Vec<String> {
        self.entries()
            .flat_map(|(_, hosts)| hosts.iter().cloned())
            .collect()
    }

    /// Add a mapping from `hostname` to `ip`. A no-op if the exact pair is
    /// already present.
    pub fn add(&mut self, ip: &str, hostname: &str) {
        let present = self.entries().any(|(entry_ip, hosts)| {
            entry_ip == ip && hosts.iter().any(|h| h.eq_ignore_ascii_case(hostname))
        });
        if present {
            return;
        }
        self.lines.push(Line::Entry {
            ip: ip.to_string(),
            hostnames: vec![hostname.to_string()],
            comment: None,
        });
    }

    /// Remove the mapping from `hostname` to `ip`. Entries left without any
    /// hostname are dropped entirely. A no-op if the pair is absent.
    pub fn remove(&mut self, ip: &str, hostname: &str) {
        for line in &mut self.lines {
            if let Line::Entry {
                ip: entry_ip,
                hostnames,
                ..
            } = line
            {
                if entry_ip == ip {
                    hostnames.retain(|h| !h.eq_ignore_ascii_case(hostname));
                }
            }
        }
        self.lines.retain(|line| match line {
            Line::Entry { hostnames, .. } => !hostnames.is_empty(),
            Line::Raw(_) => true,
        });
    }

    /// Drop repeated hostnames, keeping the first occurrence of each.
    pub fn remove_duplicates(&mut self) {
        let mut seen: Vec<String> = Vec::new();
        for line in &mut self.lines {
            if let Line::Entry { hostnames, .. } = line {
                hostnames.retain(|h| {
                    let key = h.to_ascii_lowercase();
                    if seen.contains(&key) {
                        false
                    } else {
                        seen.push(key);
                        true
                    }
                });
            }
        }
        self.lines.retain(|line| match line {
            Line::Entry { hostnames, .. } => !hostnames.is_empty(),
            Line::Raw(_) => true,
        });
    }

    fn entries(&self) -> impl Iterator<Item = (&str, &Vec<String>)> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry { ip, hostnames, .. } => Some((ip.as_str(), hostnames)),
            Line::Raw(_) => None,
        })
    }
}
