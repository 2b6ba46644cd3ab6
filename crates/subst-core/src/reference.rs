// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Reference index: inbound pointers to a node, and their redirection.
//!
//! A scan walks every owner in a [`UniverseKind`] and records each
//! reference-typed attribute (or reference array element) whose value equals
//! the target identity. A rewrite later revisits exactly those coordinates
//! and nothing else.
//!
//! Rewrite rules:
//! - The attribute is re-read first; if it is gone or no longer a reference,
//!   the record is skipped.
//! - A record already pointing at the new identity is left alone, so no
//!   spurious change is reported to the host.
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::host::{HostWorld, UniverseKind};
use crate::ident::{NodeId, ObjectRef};
use crate::value::{AttrPath, AttrValue, ScalarValue};

/// One inbound pointer: `owner.path` currently holds the target identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// Object holding the reference.
    pub owner: ObjectRef,
    /// Attribute (or array element) holding it.
    pub path: AttrPath,
}

/// Counts from one [`rewrite`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteOutcome {
    /// Records redirected to the new identity.
    pub rewritten: usize,
    /// Records that already pointed at the new identity.
    pub unchanged: usize,
    /// Records whose owner or attribute was no longer valid.
    pub skipped: usize,
}

impl RewriteOutcome {
    /// Sums two outcomes.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            rewritten: self.rewritten + other.rewritten,
            unchanged: self.unchanged + other.unchanged,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Finds every attribute in `universe` that references `target`.
///
/// Owners whose attributes cannot be enumerated (destroyed, partially torn
/// down) are skipped.
pub fn scan<W: HostWorld + ?Sized>(
    world: &W,
    universe: UniverseKind,
    target: NodeId,
) -> Vec<ReferenceRecord> {
    let mut index = ReferenceIndex::default();
    index.collect(world, universe, &[target]);
    index.take(target)
}

/// Redirects every record to `new`. Never touches other coordinates.
pub fn rewrite<W: HostWorld + ?Sized>(
    world: &mut W,
    records: &[ReferenceRecord],
    new: NodeId,
) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();
    for record in records {
        let current = match world.read_attribute(record.owner, &record.path) {
            Ok(AttrValue::Scalar(ScalarValue::Reference(current))) => current,
            Ok(_) => {
                debug!(
                    owner = %record.owner,
                    path = %record.path,
                    "rewrite skipped: no longer a reference"
                );
                outcome.skipped += 1;
                continue;
            }
            Err(err) => {
                warn!(
                    owner = %record.owner,
                    path = %record.path,
                    %err,
                    "rewrite skipped: owner invalid"
                );
                outcome.skipped += 1;
                continue;
            }
        };
        if current == Some(new) {
            outcome.unchanged += 1;
            continue;
        }
        let value = AttrValue::Scalar(ScalarValue::Reference(Some(new)));
        match world.write_attribute(record.owner, &record.path, value) {
            Ok(()) => outcome.rewritten += 1,
            Err(err) => {
                warn!(
                    owner = %record.owner,
                    path = %record.path,
                    %err,
                    "rewrite refused by host"
                );
                outcome.skipped += 1;
            }
        }
    }
    outcome
}

/// Reference records grouped by the identity they point at.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    by_target: FxHashMap<NodeId, Vec<ReferenceRecord>>,
}

impl ReferenceIndex {
    /// Scans `universe` once for references to any of `targets`.
    pub fn build<W: HostWorld + ?Sized>(
        world: &W,
        universe: UniverseKind,
        targets: &[NodeId],
    ) -> Self {
        let mut index = Self::default();
        index.collect(world, universe, targets);
        index
    }

    fn collect<W: HostWorld + ?Sized>(
        &mut self,
        world: &W,
        universe: UniverseKind,
        targets: &[NodeId],
    ) {
        if targets.is_empty() {
            return;
        }
        for owner in world.scan_universe(universe) {
            let Ok(paths) = world.attribute_paths(owner) else {
                debug!(%owner, "scan skipped invalid owner");
                continue;
            };
            for path in paths {
                match world.read_attribute(owner, &path) {
                    Ok(AttrValue::Scalar(value)) => {
                        self.note(targets, owner, path, &value);
                    }
                    Ok(AttrValue::Array(array)) => {
                        for (i, item) in array.items.iter().enumerate() {
                            let element = AttrPath::element(path.field.clone(), i);
                            self.note(targets, owner, element, item);
                        }
                    }
                    Err(_) => {}
                }
            }
        }
    }

    fn note(&mut self, targets: &[NodeId], owner: ObjectRef, path: AttrPath, value: &ScalarValue) {
        if let Some(target) = value.as_reference().filter(|t| targets.contains(t)) {
            self.by_target
                .entry(target)
                .or_default()
                .push(ReferenceRecord { owner, path });
        }
    }

    /// Records pointing at `target`, in scan order.
    pub fn get(&self, target: NodeId) -> &[ReferenceRecord] {
        self.by_target.get(&target).map_or(&[], Vec::as_slice)
    }

    /// Removes and returns the records pointing at `target`.
    pub fn take(&mut self, target: NodeId) -> Vec<ReferenceRecord> {
        self.by_target.remove(&target).unwrap_or_default()
    }

    /// Re-homes every record owned by `old` onto `new`.
    ///
    /// Used when the owner itself was replaced or restored under a new
    /// identity during the same run. Returns the number of records moved.
    pub fn retarget_owner(&mut self, old: ObjectRef, new: ObjectRef) -> usize {
        let mut moved = 0;
        for record in self.by_target.values_mut().flatten() {
            if record.owner == old {
                record.owner = new;
                moved += 1;
            }
        }
        moved
    }

    /// Total number of records across all targets.
    pub fn len(&self) -> usize {
        self.by_target.values().map(Vec::len).sum()
    }

    /// Returns `true` when no reference was found.
    pub fn is_empty(&self) -> bool {
        self.by_target.values().all(Vec::is_empty)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::schema::{AttributeSpec, TypeDescriptor, TypeRegistry};
    use crate::value::{ArrayValue, ValueTag};
    use crate::world::MemoryWorld;

    fn world() -> (MemoryWorld, NodeId, NodeId, NodeId) {
        let mut reg = TypeRegistry::new();
        let ty = reg
            .register(
                TypeDescriptor::new("linker")
                    .attribute(AttributeSpec::new("target", ScalarValue::Reference(None)))
                    .attribute(AttributeSpec::new(
                        "targets",
                        ArrayValue::empty(ValueTag::Reference),
                    )),
            )
            .expect("register");
        let mut w = MemoryWorld::new(reg);
        let host = w.create_host("h");
        let x = w.attach(host, ty).expect("x");
        let y = w.attach(host, ty).expect("y");
        let owner = w.attach(host, ty).expect("owner");
        (w, x, y, owner)
    }

    #[test]
    fn scan_finds_scalar_and_element_references() {
        let (mut w, x, y, owner) = world();
        let obj = ObjectRef::Node(owner);
        w.set(obj, "target", ScalarValue::Reference(Some(x)))
            .expect("set");
        w.set(
            obj,
            "targets",
            ArrayValue::of(
                ValueTag::Reference,
                vec![
                    ScalarValue::Reference(Some(y)),
                    ScalarValue::Reference(Some(x)),
                ],
            ),
        )
        .expect("set");

        let records = scan(&w, UniverseKind::Project, x);
        assert_eq!(
            records,
            vec![
                ReferenceRecord {
                    owner: obj,
                    path: AttrPath::field("target"),
                },
                ReferenceRecord {
                    owner: obj,
                    path: AttrPath::element("targets", 1),
                },
            ]
        );
    }

    #[test]
    fn rewrite_skips_no_ops_and_invalid_owners() {
        let (mut w, x, y, owner) = world();
        let obj = ObjectRef::Node(owner);
        w.set(obj, "target", ScalarValue::Reference(Some(x)))
            .expect("set");
        let asset = w.create_asset("prefs");
        w.define_asset_attribute(asset, "focus", ScalarValue::Reference(Some(x)))
            .expect("asset");

        let records = scan(&w, UniverseKind::Project, x);
        assert_eq!(records.len(), 2);
        w.destroy_asset(asset);

        let outcome = rewrite(&mut w, &records, y);
        assert_eq!(
            outcome,
            RewriteOutcome {
                rewritten: 1,
                unchanged: 0,
                skipped: 1,
            }
        );

        let again = rewrite(&mut w, &records[..1], y);
        assert_eq!(
            again,
            RewriteOutcome {
                rewritten: 0,
                unchanged: 1,
                skipped: 0,
            }
        );
    }

    #[test]
    fn index_groups_by_target_and_retargets_owners() {
        let (mut w, x, y, owner) = world();
        let obj = ObjectRef::Node(owner);
        w.set(obj, "target", ScalarValue::Reference(Some(x)))
            .expect("set");
        let targets = ArrayValue::of(ValueTag::Reference, vec![ScalarValue::Reference(Some(y))]);
        w.set(obj, "targets", targets).expect("set");

        let mut index = ReferenceIndex::build(&w, UniverseKind::Project, &[x, y]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(x).len(), 1);
        assert_eq!(index.get(y).len(), 1);

        let moved = index.retarget_owner(obj, ObjectRef::Node(x));
        assert_eq!(moved, 2);
        assert!(index.take(y).iter().all(|r| r.owner == ObjectRef::Node(x)));
    }
}
