//! SpikeGLX `.meta` header parsing
//!
//! A header is a list of `key=value` lines. Keys prefixed with `~` (long
//! table entries such as `~imroTbl`) are stored without the prefix.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{SyncError, SyncResult};

/// Parsed header of one acquisition file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaData {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl MetaData {
    /// Header path belonging to a `.bin` stream (same stem, `.meta` extension)
    #[must_use]
    pub fn path_for(bin_path: &Path) -> PathBuf {
        bin_path.with_extension("meta")
    }

    /// Read the header next to `bin_path`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the header cannot be read.
    pub fn read(bin_path: &Path) -> SyncResult<Self> {
        let path = Self::path_for(bin_path);
        let text = fs::read_to_string(&path).map_err(|e| SyncError::io(&path, e))?;
        Ok(Self::parse(path, &text))
    }

    /// Parse header text; lines without `=` are ignored
    #[must_use]
    pub fn parse(path: PathBuf, text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| {
                let key = k.trim();
                let key = key.strip_prefix('~').unwrap_or(key);
                (key.to_string(), v.trim().to_string())
            })
            .collect();
        Self { path, entries }
    }

    /// Header file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `key` is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Raw value of `key`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Header`] if the key is missing.
    pub fn get(&self, key: &str) -> SyncResult<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SyncError::header(&self.path, format!("missing key {key}")))
    }

    /// Value of `key` parsed as `T`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Header`] if the key is missing or unparsable.
    pub fn parse_value<T: FromStr>(&self, key: &str) -> SyncResult<T> {
        let raw = self.get(key)?;
        raw.parse()
            .map_err(|_| SyncError::header(&self.path, format!("invalid value for {key}: {raw:?}")))
    }

    /// Comma-separated integer list of `key`, e.g. `snsMnMaXaDw=0,0,8,1`
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Header`] if the key is missing or an entry is
    /// not an integer.
    pub fn parse_list(&self, key: &str) -> SyncResult<Vec<usize>> {
        let raw = self.get(key)?;
        raw.split(',')
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| SyncError::header(&self.path, format!("invalid list for {key}: {raw:?}")))
            })
            .collect()
    }

    /// Original (acquired) channel index of every saved channel.
    ///
    /// `snsSaveChanSubset` is either `all` or a list such as `0:3,8,10:11`
    /// with inclusive ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Header`] for missing keys or malformed subsets.
    pub fn original_channels(&self) -> SyncResult<Vec<usize>> {
        let n_saved: usize = self.parse_value("nSavedChans")?;
        let subset = self.get("snsSaveChanSubset").unwrap_or("all");
        if subset == "all" {
            return Ok((0..n_saved).collect());
        }

        let bad = || SyncError::header(&self.path, format!("invalid snsSaveChanSubset {subset:?}"));
        let mut channels = Vec::with_capacity(n_saved);
        for part in subset.split(',') {
            match part.split_once(':') {
                Some((lo, hi)) => {
                    let lo: usize = lo.trim().parse().map_err(|_| bad())?;
                    let hi: usize = hi.trim().parse().map_err(|_| bad())?;
                    channels.extend(lo..=hi);
                }
                None => channels.push(part.trim().parse().map_err(|_| bad())?),
            }
        }
        Ok(channels)
    }
}
