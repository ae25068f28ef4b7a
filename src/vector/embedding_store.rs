//! Embedding Store
//!
//! Immutable token -> vector table, built once from a sequence of entries.

use hashbrown::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::similarity::VectorOps;
use crate::error::{EmbeddingError, Result};

/// What to do when the same token appears twice in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Later vector replaces the earlier one; the token keeps its first position.
    #[default]
    LastWriteWins,
    /// Fail the build with [`EmbeddingError::DuplicateToken`].
    Reject,
}

/// A stored embedding with its cached squared norm
#[derive(Debug, Clone)]
pub struct EmbeddingEntry {
    pub(crate) token: Arc<str>,
    pub(crate) vector: Arc<[f32]>,
    pub(crate) norm_sq: f64,
}

impl EmbeddingEntry {
    fn new(token: Arc<str>, vector: Vec<f32>) -> Self {
        let norm_sq = vector.squared_norm();
        Self {
            token,
            vector: vector.into(),
            norm_sq,
        }
    }

    /// The entry's token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The entry's vector
    pub fn vector(&self) -> &[f32] {
        &self.vector
    }

    /// Get embedding dimension
    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    entries: Vec<EmbeddingEntry>,
    index: HashMap<Arc<str>, usize>,
    dimension: Option<usize>,
}

/// Read-only embedding store.
///
/// Cloning is cheap and clones share the same table, so a built store can be
/// handed to any number of concurrent readers.
#[derive(Clone, Default)]
pub struct EmbeddingStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for EmbeddingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingStore")
            .field("len", &self.len())
            .field("dimension", &self.dimension())
            .finish()
    }
}

impl EmbeddingStore {
    /// Build a store with the default policies (last write wins, empty allowed)
    pub fn build<I, T>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (T, Vec<f32>)>,
        T: Into<String>,
    {
        let mut builder = StoreBuilder::new();
        builder.extend(entries)?;
        builder.build()
    }

    /// Start a builder with custom policies
    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    /// Dimensionality of every vector, `None` for an empty store
    pub fn dimension(&self) -> Option<usize> {
        self.inner.dimension
    }

    /// Get number of stored embeddings
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Check if token exists
    pub fn contains(&self, token: &str) -> bool {
        self.inner.index.contains_key(token)
    }

    /// Get the vector for a token
    pub fn get(&self, token: &str) -> Result<&[f32]> {
        self.entry(token).map(EmbeddingEntry::vector)
    }

    /// Get the full entry for a token
    pub fn entry(&self, token: &str) -> Result<&EmbeddingEntry> {
        self.inner
            .index
            .get(token)
            .map(|&i| &self.inner.entries[i])
            .ok_or_else(|| EmbeddingError::UnknownToken(token.to_string()))
    }

    /// All tokens in insertion order. Each call starts over.
    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.entries.iter().map(EmbeddingEntry::token)
    }

    /// All (token, vector) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> + '_ {
        self.inner.entries.iter().map(|e| (e.token(), e.vector()))
    }

    pub(crate) fn entries(&self) -> &[EmbeddingEntry] {
        &self.inner.entries
    }
}

/// Builder for [`EmbeddingStore`]
#[derive(Debug)]
pub struct StoreBuilder {
    inner: StoreInner,
    duplicate_policy: DuplicatePolicy,
    allow_empty: bool,
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self {
            inner: StoreInner::default(),
            duplicate_policy: DuplicatePolicy::default(),
            allow_empty: true,
        }
    }

    /// Set the duplicate token policy
    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Whether an empty source builds an empty store (default) or fails
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    /// Number of distinct tokens pushed so far
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Add one entry. The first entry fixes the dimensionality.
    pub fn push(&mut self, token: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let token: String = token.into();

        match self.inner.dimension {
            None if vector.is_empty() => {
                return Err(EmbeddingError::MalformedEntry {
                    token,
                    reason: "vector has no components".to_string(),
                });
            }
            Some(dim) if vector.len() != dim => {
                return Err(EmbeddingError::MalformedEntry {
                    reason: format!("expected {} components, got {}", dim, vector.len()),
                    token,
                });
            }
            _ => {}
        }

        if let Some(i) = vector.iter().position(|v| !v.is_finite()) {
            return Err(EmbeddingError::MalformedEntry {
                reason: format!("non-finite value {} at index {}", vector[i], i),
                token,
            });
        }

        if let Some(&slot) = self.inner.index.get(token.as_str()) {
            match self.duplicate_policy {
                DuplicatePolicy::Reject => return Err(EmbeddingError::DuplicateToken(token)),
                DuplicatePolicy::LastWriteWins => {
                    debug!(token = %token, "Replacing duplicate token");
                    let key = self.inner.entries[slot].token.clone();
                    self.inner.entries[slot] = EmbeddingEntry::new(key, vector);
                    return Ok(());
                }
            }
        }

        self.inner.dimension.get_or_insert(vector.len());
        let token: Arc<str> = token.into();
        self.inner
            .index
            .insert(token.clone(), self.inner.entries.len());
        self.inner.entries.push(EmbeddingEntry::new(token, vector));
        Ok(())
    }

    /// Add every entry from an iterator, stopping at the first failure
    pub fn extend<I, T>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (T, Vec<f32>)>,
        T: Into<String>,
    {
        for (token, vector) in entries {
            self.push(token, vector)?;
        }
        Ok(())
    }

    /// Freeze into an immutable store
    pub fn build(self) -> Result<EmbeddingStore> {
        if self.inner.entries.is_empty() && !self.allow_empty {
            return Err(EmbeddingError::EmptySource);
        }

        info!(
            entries = self.inner.entries.len(),
            dimension = self.inner.dimension.unwrap_or(0),
            "Built embedding store"
        );

        Ok(EmbeddingStore {
            inner: Arc::new(self.inner),
        })
    }
}
