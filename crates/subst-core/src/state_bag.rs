// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! State bags: type-tagged attribute snapshots and best-effort replay.
//!
//! A [`StateBag`] records every visible attribute of one node, in the host's
//! deterministic attribute order, as `(path, tag, value)` triples (scalars)
//! or `(path, element tag, values)` triples (arrays). Replay is lossy on
//! purpose: the destination is usually a different type, so records whose
//! path is absent or whose tag differs are skipped and counted, never
//! reported as errors.
//!
//! Replay laws:
//! - Capturing a node and replaying onto a fresh node of the same type
//!   reproduces every scalar and array attribute exactly.
//! - Arrays are resized to the recorded length before element assignment; a
//!   recorded empty array empties the destination.
//! - A failing attribute never aborts the rest of the replay.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::host::HostWorld;
use crate::ident::{NodeId, ObjectRef, TypeId};
use crate::value::{ArrayValue, AttrPath, AttrValue, ScalarValue, ValueTag};

/// Captured scalar attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    /// Attribute name.
    pub path: String,
    /// Tag at capture time.
    pub tag: ValueTag,
    /// Captured value.
    pub value: ScalarValue,
}

/// Captured array attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayRecord {
    /// Attribute name.
    pub path: String,
    /// Element tag; `None` only for an empty array with a generic element type.
    pub element: Option<ValueTag>,
    /// Elements in index order.
    pub values: Vec<ScalarValue>,
}

/// Snapshot of one node's visible attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateBag {
    /// Node the bag was captured from.
    pub source_node: NodeId,
    /// Type of that node.
    pub source_type: TypeId,
    /// Scalar attributes in capture order.
    pub scalars: Vec<ScalarRecord>,
    /// Array attributes in capture order.
    pub arrays: Vec<ArrayRecord>,
}

impl StateBag {
    /// Total number of records.
    pub fn len(&self) -> usize {
        self.scalars.len() + self.arrays.len()
    }

    /// Returns `true` when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.arrays.is_empty()
    }

    /// Looks up a captured scalar by attribute name.
    pub fn scalar(&self, path: &str) -> Option<&ScalarValue> {
        self.scalars
            .iter()
            .find(|r| r.path == path)
            .map(|r| &r.value)
    }

    /// Looks up a captured array by attribute name.
    pub fn array(&self, path: &str) -> Option<&[ScalarValue]> {
        self.arrays
            .iter()
            .find(|r| r.path == path)
            .map(|r| r.values.as_slice())
    }

    /// Rewrites every captured reference to `from` so it points at `to`.
    ///
    /// Returns the number of values changed.
    pub fn remap_references(&mut self, from: NodeId, to: NodeId) -> usize {
        let scalars = self.scalars.iter_mut().map(|r| &mut r.value);
        let elements = self.arrays.iter_mut().flat_map(|r| r.values.iter_mut());
        let mut changed = 0;
        for value in scalars.chain(elements) {
            if let ScalarValue::Reference(target) = value {
                if *target == Some(from) {
                    *target = Some(to);
                    changed += 1;
                }
            }
        }
        changed
    }
}

/// Result of a replay. Diagnostic only; callers must not branch on it for
/// correctness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    /// Records applied to the destination.
    pub applied: usize,
    /// Records skipped (absent path, tag or shape mismatch, host refusal).
    pub skipped: usize,
}

impl ReplayOutcome {
    /// Sums two outcomes.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            applied: self.applied + other.applied,
            skipped: self.skipped + other.skipped,
        }
    }
}

/// Error returned by [`capture`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The node does not exist.
    #[error("node {0} is missing")]
    NodeMissing(NodeId),
}

/// Captures every visible, non-housekeeping attribute of `node`.
///
/// Attributes named in `deny_list` are skipped. An attribute that cannot be
/// read is skipped and logged.
///
/// # Errors
/// Returns [`CaptureError::NodeMissing`] if the node is gone or its attribute
/// list cannot be read.
pub fn capture<W: HostWorld + ?Sized>(
    world: &W,
    node: NodeId,
    deny_list: &[String],
) -> Result<StateBag, CaptureError> {
    let obj = ObjectRef::Node(node);
    let source_type = world.type_of(node).ok_or(CaptureError::NodeMissing(node))?;
    let paths = world
        .attribute_paths(obj)
        .map_err(|_| CaptureError::NodeMissing(node))?;

    let mut bag = StateBag {
        source_node: node,
        source_type,
        scalars: Vec::new(),
        arrays: Vec::new(),
    };
    for path in paths {
        if deny_list.contains(&path.field) {
            continue;
        }
        match world.read_attribute(obj, &path) {
            Ok(AttrValue::Scalar(value)) => bag.scalars.push(ScalarRecord {
                path: path.field,
                tag: value.tag(),
                value,
            }),
            Ok(AttrValue::Array(array)) => bag.arrays.push(ArrayRecord {
                path: path.field,
                element: array.element_tag(),
                values: array.items,
            }),
            Err(err) => debug!(%node, %path, %err, "capture skipped unreadable attribute"),
        }
    }
    Ok(bag)
}

/// Replays `bag` onto `dest`, best effort.
///
/// Array records are applied first, then scalar records. Scalars apply only
/// when the destination attribute carries exactly the recorded tag; reference
/// tags match across type changes because they do not encode the target type,
/// though the host may still refuse a particular target.
pub fn replay<W: HostWorld + ?Sized>(world: &mut W, bag: &StateBag, dest: NodeId) -> ReplayOutcome {
    let mut outcome = ReplayOutcome::default();
    for record in &bag.arrays {
        if replay_array(world, record, dest) {
            outcome.applied += 1;
        } else {
            outcome.skipped += 1;
        }
    }
    for record in &bag.scalars {
        if replay_scalar(world, record, dest) {
            outcome.applied += 1;
        } else {
            outcome.skipped += 1;
        }
    }
    debug!(
        source = %bag.source_node,
        %dest,
        applied = outcome.applied,
        skipped = outcome.skipped,
        "state bag replayed"
    );
    outcome
}

fn replay_scalar<W: HostWorld + ?Sized>(
    world: &mut W,
    record: &ScalarRecord,
    dest: NodeId,
) -> bool {
    let obj = ObjectRef::Node(dest);
    let path = AttrPath::field(record.path.clone());
    match world.read_attribute(obj, &path) {
        Ok(AttrValue::Scalar(current)) if current.tag() == record.tag => {}
        Ok(_) => {
            debug!(%dest, %path, tag = %record.tag, "replay skipped: tag or shape differs");
            return false;
        }
        Err(err) => {
            debug!(%dest, %path, %err, "replay skipped: destination attribute unavailable");
            return false;
        }
    }
    match world.write_attribute(obj, &path, AttrValue::Scalar(record.value.clone())) {
        Ok(()) => true,
        Err(err) => {
            debug!(%dest, %path, %err, "replay skipped: write refused");
            false
        }
    }
}

fn replay_array<W: HostWorld + ?Sized>(world: &mut W, record: &ArrayRecord, dest: NodeId) -> bool {
    let obj = ObjectRef::Node(dest);
    let path = AttrPath::field(record.path.clone());
    let current = match world.read_attribute(obj, &path) {
        Ok(AttrValue::Array(array)) => array,
        Ok(AttrValue::Scalar(_)) => {
            debug!(%dest, %path, "replay skipped: destination is not an array");
            return false;
        }
        Err(err) => {
            debug!(%dest, %path, %err, "replay skipped: destination attribute unavailable");
            return false;
        }
    };
    if let (Some(recorded), Some(existing)) = (record.element, current.element_tag()) {
        if recorded != existing {
            debug!(%dest, %path, %recorded, %existing, "replay skipped: element tag differs");
            return false;
        }
    }
    if current.element_tag().is_none() && !record.values.is_empty() {
        // Generic and empty: there is no element tag to pad with.
        let whole = ArrayValue {
            element: None,
            items: record.values.clone(),
        };
        return match world.write_attribute(obj, &path, AttrValue::Array(whole)) {
            Ok(()) => true,
            Err(err) => {
                debug!(%dest, %path, %err, "replay skipped: write refused");
                false
            }
        };
    }
    if let Err(err) = world.resize_array(obj, &path, record.values.len()) {
        debug!(%dest, %path, %err, "replay skipped: resize refused");
        return false;
    }
    let mut complete = true;
    for (index, value) in record.values.iter().enumerate() {
        let element = AttrPath::element(record.path.clone(), index);
        if let Err(err) = world.write_attribute(obj, &element, AttrValue::Scalar(value.clone())) {
            debug!(%dest, path = %element, %err, "replay skipped element");
            complete = false;
        }
    }
    complete
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::ident::make_node_id;
    use crate::schema::{AttributeSpec, TypeDescriptor, TypeRegistry};
    use crate::world::MemoryWorld;

    fn bag_with_refs(a: NodeId, b: NodeId) -> StateBag {
        StateBag {
            source_node: a,
            source_type: crate::ident::make_type_id("t"),
            scalars: vec![ScalarRecord {
                path: "self".into(),
                tag: ValueTag::Reference,
                value: ScalarValue::Reference(Some(a)),
            }],
            arrays: vec![ArrayRecord {
                path: "links".into(),
                element: Some(ValueTag::Reference),
                values: vec![
                    ScalarValue::Reference(Some(b)),
                    ScalarValue::Reference(Some(a)),
                    ScalarValue::Reference(None),
                ],
            }],
        }
    }

    #[test]
    fn remap_touches_only_matching_references() {
        let a = make_node_id("a");
        let b = make_node_id("b");
        let c = make_node_id("c");
        let mut bag = bag_with_refs(a, b);
        assert_eq!(bag.remap_references(a, c), 2);
        assert_eq!(bag.scalar("self"), Some(&ScalarValue::Reference(Some(c))));
        assert_eq!(
            bag.array("links"),
            Some(
                &[
                    ScalarValue::Reference(Some(b)),
                    ScalarValue::Reference(Some(c)),
                    ScalarValue::Reference(None),
                ][..]
            )
        );
    }

    #[test]
    fn deny_listed_attributes_are_not_captured() {
        let mut reg = TypeRegistry::new();
        let ty = reg
            .register(
                TypeDescriptor::new("thing")
                    .attribute(AttributeSpec::new("hide_flags", ScalarValue::Int(3)))
                    .attribute(AttributeSpec::new("speed", ScalarValue::Float(2.0)))
                    .attribute(AttributeSpec::new("ids", ArrayValue::empty(ValueTag::Int))),
            )
            .expect("register");
        let mut world = MemoryWorld::new(reg);
        let host = world.create_host("h");
        let node = world.attach(host, ty).expect("attach");

        let bag = capture(&world, node, &["hide_flags".to_owned()]).expect("capture");
        assert_eq!(bag.source_type, ty);
        assert_eq!(bag.scalar("hide_flags"), None);
        assert_eq!(bag.scalar("speed"), Some(&ScalarValue::Float(2.0)));
        assert_eq!(bag.array("ids"), Some(&[][..]));
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn capture_of_missing_node_fails() {
        let world = MemoryWorld::new(TypeRegistry::new());
        let ghost = make_node_id("ghost");
        assert_eq!(
            capture(&world, ghost, &[]),
            Err(CaptureError::NodeMissing(ghost))
        );
    }
}
