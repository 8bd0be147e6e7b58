use super::MigrationError;
use super::section::{Section, extract_section};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static FILENAME_RE: OnceLock<Regex> = OnceLock::new();

fn filename_regex() -> &'static Regex {
    FILENAME_RE.get_or_init(|| Regex::new(r"^([0-9]+)_(.+)\.sql$").expect("valid regex"))
}

/// Splits `NNN_description.sql` into its version and name.
///
/// Leading zeros are dropped from the version (`007_x.sql` is version 7); the
/// name is kept verbatim.
pub fn parse_filename(file_name: &str) -> Result<(i64, String), MigrationError> {
    let invalid = || MigrationError::InvalidFilename(file_name.to_string());
    let captures = filename_regex().captures(file_name).ok_or_else(invalid)?;
    let version = captures[1].parse::<i64>().map_err(|_| invalid())?;
    Ok((version, captures[2].to_string()))
}

/// Lowercases `name` and replaces everything outside `[a-z0-9_]` with `_`.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A migration file on disk.
///
/// Only the file name is inspected when a `Migration` is built; contents are
/// read on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    version: i64,
    name: String,
    path: PathBuf,
}

impl Migration {
    /// Builds a migration from a file path, failing if the file name does not
    /// follow `NNN_description.sql`.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| MigrationError::InvalidFilename(path.display().to_string()))?;
        let (version, name) = parse_filename(file_name)?;
        Ok(Self {
            version,
            name,
            path,
        })
    }

    /// The version parsed from the file name.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// The name parsed from the file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the migration lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file.
    pub async fn sql(&self) -> Result<String, MigrationError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| MigrationError::Io {
                path: self.path.clone(),
                source,
            })
    }

    /// The SQL to run when applying.
    ///
    /// This is the `-- UP` section, or the whole file when it has no `-- UP`
    /// marker.
    pub async fn up_sql(&self) -> Result<String, MigrationError> {
        let sql = self.sql().await?;
        Ok(up_body(&sql).to_string())
    }

    /// The SQL to run when rolling back. A missing or empty `-- DOWN` section
    /// is an error.
    pub async fn down_sql(&self) -> Result<String, MigrationError> {
        let sql = self.sql().await?;
        match extract_section(&sql, Section::Down) {
            Some(body) if !body.is_empty() => Ok(body.to_string()),
            _ => Err(MigrationError::MissingDownSection {
                version: self.version,
                name: self.name.clone(),
            }),
        }
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}_{}", self.version, self.name)
    }
}

fn up_body(sql: &str) -> &str {
    extract_section(sql, Section::Up).unwrap_or(sql)
}
