//! Raw identifier to dense index translation
//!
//! Dense indices are 1-based and handed out in first-seen order. A mapper is
//! append-only: nothing is ever removed for the lifetime of a gamemode run.

use crate::types::{ContextKey, Gamemode, ModifierSet, PlayerId, SubjectId};
use rustc_hash::FxHashMap;
use std::hash::Hash;

/// 1-based contiguous index assigned in first-seen order
pub type DenseIndex = usize;

/// Bijective mapping between raw keys and dense indices
#[derive(Debug, Clone)]
pub struct IdentityMapper<K> {
    forward: FxHashMap<K, DenseIndex>,
    reverse: Vec<K>,
}

impl<K: Eq + Hash + Clone> IdentityMapper<K> {
    pub fn new() -> Self {
        Self {
            forward: FxHashMap::default(),
            reverse: Vec::new(),
        }
    }

    /// Return the index of `key`, assigning `len + 1` if it was never seen
    pub fn register(&mut self, key: K) -> DenseIndex {
        if let Some(&index) = self.forward.get(&key) {
            return index;
        }
        self.reverse.push(key.clone());
        let index = self.reverse.len();
        self.forward.insert(key, index);
        index
    }

    pub fn index_of(&self, key: &K) -> Option<DenseIndex> {
        self.forward.get(key).copied()
    }

    /// Raw key behind a dense index
    pub fn raw(&self, index: DenseIndex) -> Option<&K> {
        index.checked_sub(1).and_then(|i| self.reverse.get(i))
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Raw keys in dense index order
    pub fn raw_ids(&self) -> &[K] {
        &self.reverse
    }
}

impl<K: Eq + Hash + Clone> Default for IdentityMapper<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mapping state of one gamemode run
///
/// Created fresh for every gamemode and passed explicitly through the
/// assembly stage; never shared between gamemodes.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub gamemode: Gamemode,
    pub players: IdentityMapper<PlayerId>,
    pub contexts: IdentityMapper<ContextKey>,
    canonicalize_modifiers: bool,
}

impl RunContext {
    pub fn new(gamemode: Gamemode) -> Self {
        Self {
            gamemode,
            players: IdentityMapper::new(),
            contexts: IdentityMapper::new(),
            canonicalize_modifiers: false,
        }
    }

    /// Treat modifier sets as unordered when building context keys
    pub fn with_canonical_modifiers(mut self, canonicalize: bool) -> Self {
        self.canonicalize_modifiers = canonicalize;
        self
    }

    pub fn register_player(&mut self, raw_id: PlayerId) -> DenseIndex {
        self.players.register(raw_id)
    }

    pub fn register_context(&mut self, subject: SubjectId, modifiers: &ModifierSet) -> DenseIndex {
        let modifiers = if self.canonicalize_modifiers {
            modifiers.canonical()
        } else {
            modifiers.clone()
        };
        self.contexts.register(ContextKey::new(subject, modifiers))
    }
}
