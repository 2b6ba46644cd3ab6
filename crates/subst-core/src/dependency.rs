// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Dependency model: flattened requirements and satisfaction checks.
//!
//! Everything here is a pure function of a [`TypeSchema`] and a
//! [`PresenceMap`]. Unknown types yield empty requirement sets; no function in
//! this module fails.
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ident::TypeId;
use crate::schema::TypeSchema;

/// Returns `true` when `ty` equals `ancestor` or derives from it.
///
/// Ancestry walks are bounded by the number of distinct types visited, so a
/// malformed schema with a parent cycle terminates (and answers `false` for
/// ancestors outside the cycle).
pub fn is_subtype<S: TypeSchema + ?Sized>(schema: &S, ty: TypeId, ancestor: TypeId) -> bool {
    let mut seen = FxHashSet::default();
    let mut cursor = Some(ty);
    while let Some(current) = cursor {
        if current == ancestor {
            return true;
        }
        if !seen.insert(current) {
            return false;
        }
        cursor = schema.parent(current);
    }
    false
}

/// Requirements of `ty`, inherited down its ancestry and de-duplicated.
///
/// Order: the type's own declarations first, then each ancestor's, nearest
/// first. Empty for unknown types and types without requirements.
pub fn required_types<S: TypeSchema + ?Sized>(schema: &S, ty: TypeId) -> Vec<TypeId> {
    let mut out = Vec::new();
    let mut seen_types = FxHashSet::default();
    let mut cursor = Some(ty);
    while let Some(current) = cursor {
        if !seen_types.insert(current) {
            break;
        }
        for &req in schema.declared_requirements(current) {
            if !out.contains(&req) {
                out.push(req);
            }
        }
        cursor = schema.parent(current);
    }
    out
}

/// Returns `true` when some present type is `required` or a subtype of it.
///
/// A requirement naming a structural type is always satisfied: hosts always
/// carry their structural node and the engine never removes it.
pub fn is_satisfied<S: TypeSchema + ?Sized>(
    schema: &S,
    required: TypeId,
    presence: &PresenceMap,
) -> bool {
    if schema.is_structural(required) {
        return true;
    }
    presence
        .present_types()
        .any(|ty| is_subtype(schema, ty, required))
}

/// Reference-counted multiset of the types present on a host.
///
/// Invariant: counts never go below zero. Removing an absent type is a no-op
/// (and a debug assertion); a type whose count reaches zero is dropped so
/// iteration only yields present types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceMap {
    counts: FxHashMap<TypeId, u32>,
}

impl PresenceMap {
    /// Creates an empty multiset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a multiset from an iterator of types.
    pub fn from_types(types: impl IntoIterator<Item = TypeId>) -> Self {
        let mut map = Self::new();
        for ty in types {
            map.add(ty);
        }
        map
    }

    /// Increments the count for `ty`.
    pub fn add(&mut self, ty: TypeId) {
        *self.counts.entry(ty).or_insert(0) += 1;
    }

    /// Decrements the count for `ty`. Returns `false` if `ty` was absent.
    pub fn remove(&mut self, ty: TypeId) -> bool {
        debug_assert!(
            self.counts.contains_key(&ty),
            "presence count underflow for {ty:?}"
        );
        let Some(count) = self.counts.get_mut(&ty) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.counts.remove(&ty);
        }
        true
    }

    /// Number of present nodes of exactly `ty`.
    pub fn count(&self, ty: TypeId) -> u32 {
        self.counts.get(&ty).copied().unwrap_or(0)
    }

    /// Distinct present types (unordered).
    pub fn present_types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.counts.keys().copied()
    }

    /// Total number of present nodes.
    pub fn len(&self) -> usize {
        self.counts.values().map(|&c| c as usize).sum()
    }

    /// Returns `true` when nothing is present.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Per-run cache of flattened requirements, keyed by type.
///
/// Built once from the schema before a fixpoint starts and never mutated
/// afterwards; the fixpoint loop only mutates its [`PresenceMap`].
#[derive(Debug, Clone, Default)]
pub struct RequirementTable {
    by_type: FxHashMap<TypeId, Vec<TypeId>>,
}

impl RequirementTable {
    /// Flattens requirements for every type in `types`.
    pub fn build<S: TypeSchema + ?Sized>(
        schema: &S,
        types: impl IntoIterator<Item = TypeId>,
    ) -> Self {
        let mut by_type = FxHashMap::default();
        for ty in types {
            by_type
                .entry(ty)
                .or_insert_with(|| required_types(schema, ty));
        }
        Self { by_type }
    }

    /// Cached requirements for `ty`; empty for types not in the table.
    pub fn requirements(&self, ty: TypeId) -> &[TypeId] {
        self.by_type.get(&ty).map_or(&[], Vec::as_slice)
    }

    /// Requirements of `ty` that `presence` does not satisfy, in declaration order.
    pub fn missing<S: TypeSchema + ?Sized>(
        &self,
        schema: &S,
        ty: TypeId,
        presence: &PresenceMap,
    ) -> Vec<TypeId> {
        self.requirements(ty)
            .iter()
            .copied()
            .filter(|&req| !is_satisfied(schema, req, presence))
            .collect()
    }

    /// Returns `true` when every requirement of `ty` is satisfied.
    pub fn all_satisfied<S: TypeSchema + ?Sized>(
        &self,
        schema: &S,
        ty: TypeId,
        presence: &PresenceMap,
    ) -> bool {
        self.requirements(ty)
            .iter()
            .all(|&req| is_satisfied(schema, req, presence))
    }
}
