//! Fixture files for the watch commands
//!
//! ```json
//! {
//!   "identity": { "uid": "u1" },
//!   "policies": { "customers": { "type": "ownership", "owner_field": "ownerId" } },
//!   "documents": { "orgs/org1/customers/c1": { "ownerId": "u1", "name": "Ann" } },
//!   "writes": [
//!     { "op": "update", "path": "orgs/org1/customers/c1", "data": { "name": "Anne" } },
//!     { "op": "delete", "path": "orgs/org1/customers/c1" }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::binding::Writes;
use crate::context::Identity;
use crate::store::{into_fields, AccessPolicy, CollectionPath, DocumentPath, MemoryBackend};

use super::errors::{CliError, CliResult};

/// One write applied after the binding is attached
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ScriptedWrite {
    Set {
        path: String,
        data: Value,
        #[serde(default)]
        merge: bool,
    },
    Add {
        collection: String,
        data: Value,
    },
    Update {
        path: String,
        data: Value,
    },
    Delete {
        path: String,
    },
}

impl ScriptedWrite {
    /// Short label for output lines
    pub fn label(&self) -> String {
        match self {
            ScriptedWrite::Set { path, merge, .. } if *merge => format!("set-merge {}", path),
            ScriptedWrite::Set { path, .. } => format!("set {}", path),
            ScriptedWrite::Add { collection, .. } => format!("add {}", collection),
            ScriptedWrite::Update { path, .. } => format!("update {}", path),
            ScriptedWrite::Delete { path } => format!("delete {}", path),
        }
    }

    /// Run the write; failures surface on the error emitter
    pub fn apply(&self, writes: &Writes) -> CliResult<()> {
        match self {
            ScriptedWrite::Set { path, data, merge } => {
                writes.set_document(&DocumentPath::parse(path)?, data, *merge)
            }
            ScriptedWrite::Add { collection, data } => {
                writes.add_document(&CollectionPath::parse(collection)?, data);
            }
            ScriptedWrite::Update { path, data } => {
                writes.update_document(&DocumentPath::parse(path)?, data)
            }
            ScriptedWrite::Delete { path } => writes.delete_document(&DocumentPath::parse(path)?),
        }
        Ok(())
    }
}

/// Seed data, rules and scripted writes
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub identity: Option<Identity>,

    /// Access policies keyed by collection id
    #[serde(default)]
    pub policies: HashMap<String, AccessPolicy>,

    /// Initial documents keyed by path
    #[serde(default)]
    pub documents: BTreeMap<String, Value>,

    #[serde(default)]
    pub writes: Vec<ScriptedWrite>,
}

impl Fixture {
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::fixture_error(format!("Failed to read fixture: {}", e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> CliResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| CliError::fixture_error(format!("Invalid fixture JSON: {}", e)))
    }

    /// Build a backend holding the fixture's policies and documents
    pub fn backend(&self) -> CliResult<MemoryBackend> {
        let backend = MemoryBackend::new();
        for (collection, policy) in &self.policies {
            backend.set_policy(collection, policy.clone());
        }
        for (path, data) in &self.documents {
            let path = DocumentPath::parse(path)
                .map_err(|e| CliError::fixture_error(e.to_string()))?;
            if !data.is_object() {
                return Err(CliError::fixture_error(format!(
                    "document {} must be a JSON object",
                    path
                )));
            }
            backend.seed(&path, into_fields(data.clone()));
        }
        Ok(backend)
    }
}
