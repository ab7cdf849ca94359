//! Alias registry: user-chosen row aliases bound to written records.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::error::{RegistryError, TransformError};
use crate::store::RecordId;

/// Reference to an alias (`Alias`) or to a captured field of it (`Alias.Field`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasExpr {
    /// Alias name
    pub alias: String,
    /// Captured field, if any
    pub field: Option<String>,
}

impl AliasExpr {
    /// Parses `Alias` or `Alias.Field`. The first dot separates the field.
    pub fn parse(column: &str, raw: &str) -> Result<Self, TransformError> {
        let raw = raw.trim();
        let invalid = || TransformError::InvalidAliasExpr {
            column: column.to_string(),
            value: raw.to_string(),
        };
        match raw.split_once('.') {
            None if raw.is_empty() => Err(invalid()),
            None => Ok(Self {
                alias: raw.to_string(),
                field: None,
            }),
            Some((alias, field)) if alias.is_empty() || field.is_empty() => Err(invalid()),
            Some((alias, field)) => Ok(Self {
                alias: alias.to_string(),
                field: Some(field.to_string()),
            }),
        }
    }
}

impl std::fmt::Display for AliasExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}.{}", self.alias, field),
            None => f.write_str(&self.alias),
        }
    }
}

/// Registry value: the record an alias stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasEntry {
    /// Object type of the record
    pub object_type: String,
    /// Remote identifier (write-once)
    pub remote_id: RecordId,
    /// Field values captured after the write
    pub captured: BTreeMap<String, Value>,
}

/// Process-scoped alias registry owned by one scenario run.
///
/// The primary identifier of an alias is write-once; captured fields may be
/// added or overwritten for the remainder of the run.
#[derive(Debug, Default, Clone)]
pub struct AliasRegistry {
    entries: HashMap<String, AliasEntry>,
    order: Vec<String>,
}

impl AliasRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an alias to a record.
    ///
    /// Rebinding to the same record is a no-op (an update file touching a
    /// record created earlier); rebinding to another record is an error.
    pub fn bind(
        &mut self,
        alias: &str,
        object_type: &str,
        id: &RecordId,
    ) -> Result<(), RegistryError> {
        if let Some(existing) = self.entries.get(alias) {
            if &existing.remote_id == id {
                return Ok(());
            }
            return Err(RegistryError::AliasRebound {
                alias: alias.to_string(),
                existing: existing.remote_id.to_string(),
                attempted: id.to_string(),
            });
        }
        debug!(alias, object_type, %id, "alias bound");
        self.entries.insert(
            alias.to_string(),
            AliasEntry {
                object_type: object_type.to_string(),
                remote_id: id.clone(),
                captured: BTreeMap::new(),
            },
        );
        self.order.push(alias.to_string());
        Ok(())
    }

    /// Stores a captured field value, overwriting any previous capture.
    pub fn capture(&mut self, alias: &str, field: &str, value: Value) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .get_mut(alias)
            .ok_or_else(|| RegistryError::UnknownAlias {
                alias: alias.to_string(),
            })?;
        debug!(alias, field, "field captured");
        entry.captured.insert(field.to_string(), value);
        Ok(())
    }

    /// Looks up an alias.
    pub fn get(&self, alias: &str) -> Option<&AliasEntry> {
        self.entries.get(alias)
    }

    /// Alias currently bound to `id`, if any.
    pub fn alias_of(&self, id: &RecordId) -> Option<&str> {
        self.iter()
            .find(|(_, entry)| &entry.remote_id == id)
            .map(|(alias, _)| alias)
    }

    /// Returns true if the alias is bound.
    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// Entries in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AliasEntry)> {
        self.order
            .iter()
            .filter_map(|alias| self.entries.get(alias).map(|e| (alias.as_str(), e)))
    }

    /// Number of bound aliases.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no alias is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
