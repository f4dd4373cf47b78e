//! # Locators
//!
//! Slash-separated paths into the document tree. Documents live at even
//! depths (`users/u1`), collections at odd depths (`users`,
//! `orgs/org1/customers`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};

fn split_segments(raw: &str) -> StoreResult<Vec<&str>> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::invalid_path(raw, "path is empty"));
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(StoreError::invalid_path(raw, "path contains an empty segment"));
    }
    Ok(segments)
}

/// Path to a single document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Parse and validate a document path
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split_segments(raw)?;
        if segments.len() % 2 != 0 {
            return Err(StoreError::invalid_path(
                raw,
                "document paths need an even number of segments",
            ));
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Document identifier (last segment)
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Collection containing this document
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(self.0.clone()),
        }
    }

    /// Subcollection under this document
    pub fn collection(&self, name: &str) -> StoreResult<CollectionPath> {
        CollectionPath::parse(&format!("{}/{}", self.0, name))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DocumentPath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DocumentPath> for String {
    fn from(path: DocumentPath) -> Self {
        path.0
    }
}

/// Path to a collection of documents
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse and validate a collection path
    pub fn parse(raw: &str) -> StoreResult<Self> {
        let segments = split_segments(raw)?;
        if segments.len() % 2 != 1 {
            return Err(StoreError::invalid_path(
                raw,
                "collection paths need an odd number of segments",
            ));
        }
        Ok(Self(segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Collection identifier (last segment), used to look up access policies
    pub fn id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Owning document for subcollections
    pub fn parent(&self) -> Option<DocumentPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocumentPath(parent.to_string()))
    }

    /// Document in this collection
    pub fn doc(&self, id: &str) -> StoreResult<DocumentPath> {
        if id.is_empty() || id.contains('/') {
            return Err(StoreError::invalid_path(id, "document id must be a single segment"));
        }
        Ok(DocumentPath(format!("{}/{}", self.0, id)))
    }

    /// Whether `path` is a direct child of this collection
    pub fn contains(&self, path: &DocumentPath) -> bool {
        path.parent() == *self
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CollectionPath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.0
    }
}
