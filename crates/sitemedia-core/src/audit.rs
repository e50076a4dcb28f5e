//! Append-only CSV trail of every decision a run makes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::date::TimestampSource;

/// How a record's outcome was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    EmbeddedPattern,
    Metadata,
    BirthTime,
    ModifyTime,
    Consolidate,
    RemoveFolder,
    Error,
    Skip,
}

impl From<TimestampSource> for Method {
    fn from(source: TimestampSource) -> Self {
        match source {
            TimestampSource::EmbeddedPattern => Method::EmbeddedPattern,
            TimestampSource::Metadata => Method::Metadata,
            TimestampSource::BirthTime => Method::BirthTime,
            TimestampSource::ModifyTime => Method::ModifyTime,
        }
    }
}

/// One row of the audit file. Column order is the CSV header order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub original_path: String,
    pub new_path: String,
    pub method: Method,
    /// ISO-8601 local time, empty when none was resolved
    pub timestamp: String,
    pub converted: bool,
    pub success: bool,
    pub error: String,
}

impl AuditRecord {
    pub fn new(original: &Path, method: Method) -> Self {
        Self {
            original_path: original.display().to_string(),
            new_path: String::new(),
            method,
            timestamp: String::new(),
            converted: false,
            success: true,
            error: String::new(),
        }
    }

    pub fn moved_to(mut self, path: &Path) -> Self {
        self.new_path = path.display().to_string();
        self
    }

    pub fn at(mut self, timestamp: String) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn converted(mut self, converted: bool) -> Self {
        self.converted = converted;
        self
    }

    /// Mark as failed. The method becomes `error` unless it is a skip.
    pub fn failed(mut self, error: impl ToString) -> Self {
        if self.method != Method::Skip {
            self.method = Method::Error;
        }
        self.success = false;
        self.error = error.to_string();
        self
    }
}

pub struct AuditLog {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl AuditLog {
    /// Open for appending. The header row is written only when the file is
    /// new or empty.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        let is_empty = file.metadata().map(|m| m.len() == 0).unwrap_or(true);
        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one record and flush it to disk.
    pub fn append(&mut self, record: &AuditRecord) -> Result<()> {
        self.writer
            .serialize(record)
            .with_context(|| format!("Failed to write audit record to {}", self.path.display()))?;
        self.writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

/// Read every record of an audit file.
pub fn read_all(path: &Path) -> Result<Vec<AuditRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read audit log {}", path.display()))?;
    let mut out = Vec::new();
    for record in reader.deserialize() {
        out.push(record?);
    }
    Ok(out)
}
