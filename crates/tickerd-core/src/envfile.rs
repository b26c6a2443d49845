//! `.env`-style config store.
//!
//! The orchestrator does not interpret this file beyond KEY=VALUE lines;
//! it only guarantees safe persistence: a timestamped backup before every
//! full overwrite, and write-to-temp-then-atomic-rename so a failed write
//! never leaves a half-written file behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static SCHEDULE_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d$").unwrap());

/// `HH:MM`, 24-hour clock. Used by the common-config endpoint.
pub fn is_valid_schedule_time(s: &str) -> bool {
    SCHEDULE_TIME_RE.is_match(s)
}

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
}

impl EnvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".env".to_string())
    }

    /// A missing file reads as empty, everything else propagates.
    pub fn read_text(&self) -> Result<String, EnvError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the whole file. Returns the backup file name.
    ///
    /// The previous content is copied to `<name>.bak.YYYYMMDD_HHMMSS` first
    /// (best-effort: a failed backup is logged, not fatal), then the new
    /// text goes through a temp file and an atomic rename.
    pub fn save_text(&self, text: &str) -> Result<String, EnvError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let old = self.read_text()?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup_name = format!("{}.bak.{stamp}", self.file_name());
        let backup_path = self.path.with_file_name(&backup_name);
        if let Err(e) = std::fs::write(&backup_path, &old) {
            tracing::warn!(path = %backup_path.display(), error = %e, "env backup failed");
        }

        let mut normalized = text.to_string();
        if !normalized.is_empty() && !normalized.ends_with('\n') {
            normalized.push('\n');
        }
        self.replace_atomically(&normalized)?;
        Ok(backup_name)
    }

    /// Read the given keys, falling back to the paired defaults.
    pub fn values(&self, keys: &[(&str, &str)]) -> Result<HashMap<String, String>, EnvError> {
        let data = parse_env_text(&self.read_text()?);
        Ok(keys
            .iter()
            .map(|(key, default)| {
                let value = data.get(*key).cloned().unwrap_or_else(|| default.to_string());
                (key.to_string(), value)
            })
            .collect())
    }

    /// Update KEY=VALUE pairs in place: comment lines and unrelated lines
    /// survive untouched, missing keys are appended at the end.
    pub fn update_values(&self, updates: &[(String, String)]) -> Result<(), EnvError> {
        let text = self.read_text()?;
        let updated = rewrite_env_text(&text, updates);
        self.replace_atomically(&updated)
    }

    pub fn get_stock_list(&self) -> Result<String, EnvError> {
        let data = parse_env_text(&self.read_text()?);
        Ok(data.get("STOCK_LIST").cloned().unwrap_or_default())
    }

    /// Normalize (comma/newline separated, trimmed) and persist STOCK_LIST.
    /// Returns the normalized value.
    pub fn set_stock_list(&self, raw: &str) -> Result<String, EnvError> {
        let normalized = raw
            .replace('\n', ",")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        self.update_values(&[("STOCK_LIST".to_string(), normalized.clone())])?;
        Ok(normalized)
    }

    fn replace_atomically(&self, text: &str) -> Result<(), EnvError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Lightweight KEY=VALUE parse: comments and malformed lines are skipped,
/// single/double quotes around values are stripped.
fn parse_env_text(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        out.insert(key.to_string(), value.to_string());
    }
    out
}

/// Rewrite KEY=VALUE lines preserving surrounding whitespace; keys that do
/// not occur are appended after a separating blank line.
fn rewrite_env_text(text: &str, updates: &[(String, String)]) -> String {
    let patterns: Vec<(usize, Regex)> = updates
        .iter()
        .enumerate()
        .filter_map(|(i, (key, _))| {
            Regex::new(&format!(
                r"^(?P<prefix>\s*{}\s*=\s*)(?P<value>.*?)(?P<suffix>\s*)$",
                regex::escape(key)
            ))
            .ok()
            .map(|re| (i, re))
        })
        .collect();

    let mut out_lines: Vec<String> = Vec::new();
    let mut replaced = vec![false; updates.len()];

    for line in text.lines() {
        let stripped = line.trim_start();
        if stripped.starts_with('#') || !line.contains('=') {
            out_lines.push(line.to_string());
            continue;
        }

        let mut hit = false;
        for (i, re) in &patterns {
            if let Some(caps) = re.captures(line) {
                out_lines.push(format!("{}{}{}", &caps["prefix"], updates[*i].1, &caps["suffix"]));
                replaced[*i] = true;
                hit = true;
                break;
            }
        }
        if !hit {
            out_lines.push(line.to_string());
        }
    }

    let missing: Vec<&(String, String)> = updates
        .iter()
        .enumerate()
        .filter(|(i, _)| !replaced[*i])
        .map(|(_, kv)| kv)
        .collect();
    if !missing.is_empty() {
        if out_lines.last().is_some_and(|l| !l.trim().is_empty()) {
            out_lines.push(String::new());
        }
        for (key, value) in missing {
            out_lines.push(format!("{key}={value}"));
        }
    }

    let trailing_newline = text.is_empty() || text.ends_with('\n');
    let mut out = out_lines.join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    out
}
