//! Invalidation tags and their expansion into ancestor scopes.
//!
//! A [`Tag`] names the set of cached reads that depend on a table, an owner
//! and some discriminating parameters, e.g. `{folders, u1, {id: 5}}`.
//!
//! Expansion yields the tag plus every tag obtained by dropping a subset of
//! its parameters, down to the bare `{table, owner}` scope. Cache entries are
//! registered under every tag of the expansion when written, and invalidation
//! drains every tag of the expansion. A write therefore reaches every cached
//! read that could depend on it, however narrowly that read was scoped.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CacheError, CacheResult};

/// Maximum number of named parameters on a tag. Expansion is `2^n` tags.
pub const MAX_TAG_PARAMS: usize = 4;

/// Prefix of reverse-index keys.
pub const INDEX_KEY_PREFIX: &str = "rkeys";

/// An invalidation scope: table, owner and up to [`MAX_TAG_PARAMS`] parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    table: String,
    owner: String,
    params: BTreeMap<String, String>,
}

impl Tag {
    /// The bare `{table, owner}` scope.
    pub fn new(table: impl Into<String>, owner: impl fmt::Display) -> Self {
        Self {
            table: table.into(),
            owner: owner.to_string(),
            params: BTreeMap::new(),
        }
    }

    /// Build a tag from a list of parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ExpansionOverflow`] if more than
    /// [`MAX_TAG_PARAMS`] non-empty parameters are given.
    pub fn with_params<K, V, I>(
        table: impl Into<String>,
        owner: impl fmt::Display,
        params: I,
    ) -> CacheResult<Self>
    where
        K: Into<String>,
        V: fmt::Display,
        I: IntoIterator<Item = (K, V)>,
    {
        params
            .into_iter()
            .try_fold(Self::new(table, owner), |tag, (name, value)| {
                tag.with_param(name, value)
            })
    }

    /// Add (or replace) a named parameter.
    ///
    /// Parameters whose value renders empty carry no scope and are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ExpansionOverflow`] when the tag already holds
    /// [`MAX_TAG_PARAMS`] parameters. The tag is never silently truncated.
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        value: impl fmt::Display,
    ) -> CacheResult<Self> {
        let value = value.to_string();
        if value.is_empty() {
            return Ok(self);
        }
        let name = name.into();
        if !self.params.contains_key(&name) && self.params.len() >= MAX_TAG_PARAMS {
            return Err(CacheError::ExpansionOverflow {
                table: self.table,
                count: self.params.len() + 1,
            });
        }
        self.params.insert(name, value);
        Ok(self)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Key of the reverse-index set for this exact tag:
    /// `rkeys|<table>|<owner>|<name>=<value>...` with parameters sorted by name.
    pub fn index_key(&self) -> String {
        let mut key = format!(
            "{INDEX_KEY_PREFIX}|{}|{}",
            escape(&self.table),
            escape(&self.owner)
        );
        for (name, value) in &self.params {
            key.push('|');
            key.push_str(&escape(name));
            key.push('=');
            key.push_str(&escape(value));
        }
        key
    }

    /// The tag itself followed by every ancestor, ending with the bare
    /// `{table, owner}` tag. Always `2^n` distinct tags for `n` parameters.
    pub fn expand(&self) -> Vec<Tag> {
        let entries: Vec<(&String, &String)> = self.params.iter().collect();
        let full: usize = (1usize << entries.len()) - 1;

        (0..=full)
            .rev()
            .map(|mask| Tag {
                table: self.table.clone(),
                owner: self.owner.clone(),
                params: entries
                    .iter()
                    .enumerate()
                    .filter(|(bit, _)| mask & (1usize << *bit) != 0)
                    .map(|(_, (name, value))| ((*name).clone(), (*value).clone()))
                    .collect(),
            })
            .collect()
    }

    /// Reverse-index keys of the whole expansion.
    pub fn expanded_index_keys(&self) -> Vec<String> {
        self.expand().iter().map(Tag::index_key).collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.owner)?;
        for (name, value) in &self.params {
            write!(f, "[{name}={value}]")?;
        }
        Ok(())
    }
}

// Keeps `|` and `=` unambiguous as separators inside index keys.
fn escape(component: &str) -> String {
    if !component.contains(['%', '|', '=']) {
        return component.to_string();
    }
    component
        .replace('%', "%25")
        .replace('|', "%7C")
        .replace('=', "%3D")
}
