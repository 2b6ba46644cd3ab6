// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Minimal in-memory host world used by the engine's tests and tools.
use std::collections::{BTreeMap, BTreeSet};

use crate::dependency::is_subtype;
use crate::host::{AttrError, HostError, HostWorld, UniverseKind};
use crate::ident::{
    derive_node_id, make_asset_id, make_host_id, AssetId, HostId, NodeId, ObjectRef, TypeId,
};
use crate::schema::TypeRegistry;
use crate::value::{AttrPath, AttrValue, ScalarValue};

/// One named attribute slot on a node or asset.
#[derive(Debug, Clone, PartialEq)]
struct Slot {
    name: String,
    value: AttrValue,
    accepts: Option<TypeId>,
}

#[derive(Debug, Clone)]
struct HostRecord {
    nodes: Vec<NodeId>,
    active: bool,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    host: HostId,
    ty: TypeId,
    slots: Vec<Slot>,
}

#[derive(Debug, Clone)]
struct AssetRecord {
    slots: Vec<Slot>,
    active: bool,
}

/// In-memory [`HostWorld`].
///
/// Hosts hold ordered, duplicate-permitting node lists. Nodes are materialised
/// from their type's attribute defaults on attach. Assets model owner objects
/// that live outside any host (persisted settings, prefabs) and may hold
/// references to nodes.
///
/// Universe semantics: [`UniverseKind::Project`] yields every node and asset;
/// [`UniverseKind::ActiveContext`] yields nodes on active hosts and active
/// assets. Hosts and assets start active.
#[derive(Debug, Clone)]
pub struct MemoryWorld {
    registry: TypeRegistry,
    hosts: BTreeMap<HostId, HostRecord>,
    nodes: BTreeMap<NodeId, NodeRecord>,
    assets: BTreeMap<AssetId, AssetRecord>,
    next_seq: u64,
    rejected_types: BTreeSet<TypeId>,
    pinned_nodes: BTreeSet<NodeId>,
    sealed_nodes: BTreeSet<NodeId>,
}

impl MemoryWorld {
    /// Creates an empty world over `registry`.
    #[must_use]
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            hosts: BTreeMap::new(),
            nodes: BTreeMap::new(),
            assets: BTreeMap::new(),
            next_seq: 0,
            rejected_types: BTreeSet::new(),
            pinned_nodes: BTreeSet::new(),
            sealed_nodes: BTreeSet::new(),
        }
    }

    /// The world's type registry.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Creates (or returns the existing) host labelled `label`.
    pub fn create_host(&mut self, label: &str) -> HostId {
        let id = make_host_id(label);
        self.hosts.entry(id).or_insert_with(|| HostRecord {
            nodes: Vec::new(),
            active: true,
        });
        id
    }

    /// Marks a host in or out of the active working context.
    ///
    /// # Errors
    /// Returns [`HostError::UnknownHost`] if `host` does not exist.
    pub fn set_host_active(&mut self, host: HostId, active: bool) -> Result<(), HostError> {
        let record = self
            .hosts
            .get_mut(&host)
            .ok_or(HostError::UnknownHost(host))?;
        record.active = active;
        Ok(())
    }

    /// Destroys a host and every node attached to it.
    ///
    /// # Errors
    /// Returns [`HostError::UnknownHost`] if `host` does not exist.
    pub fn destroy_host(&mut self, host: HostId) -> Result<(), HostError> {
        let record = self.hosts.remove(&host).ok_or(HostError::UnknownHost(host))?;
        for node in record.nodes {
            self.nodes.remove(&node);
        }
        Ok(())
    }

    /// Creates (or returns the existing) asset labelled `label`.
    pub fn create_asset(&mut self, label: &str) -> AssetId {
        let id = make_asset_id(label);
        self.assets.entry(id).or_insert_with(|| AssetRecord {
            slots: Vec::new(),
            active: true,
        });
        id
    }

    /// Declares (or overwrites) an attribute on an asset.
    ///
    /// Assets are schemaless; the first value written fixes the slot's tag.
    ///
    /// # Errors
    /// Returns [`AttrError::ObjectMissing`] if the asset does not exist.
    pub fn define_asset_attribute(
        &mut self,
        asset: AssetId,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), AttrError> {
        let record = self
            .assets
            .get_mut(&asset)
            .ok_or(AttrError::ObjectMissing(ObjectRef::Asset(asset)))?;
        let value = value.into();
        if let Some(slot) = record.slots.iter_mut().find(|s| s.name == name) {
            slot.value = value;
        } else {
            record.slots.push(Slot {
                name: name.to_owned(),
                value,
                accepts: None,
            });
        }
        Ok(())
    }

    /// Marks an asset in or out of the active working context.
    ///
    /// # Errors
    /// Returns [`AttrError::ObjectMissing`] if the asset does not exist.
    pub fn set_asset_active(&mut self, asset: AssetId, active: bool) -> Result<(), AttrError> {
        let record = self
            .assets
            .get_mut(&asset)
            .ok_or(AttrError::ObjectMissing(ObjectRef::Asset(asset)))?;
        record.active = active;
        Ok(())
    }

    /// Destroys an asset. Later reads through its [`ObjectRef`] fail.
    pub fn destroy_asset(&mut self, asset: AssetId) -> bool {
        self.assets.remove(&asset).is_some()
    }

    /// Makes every subsequent attach of `ty` fail with
    /// [`HostError::AttachRejected`].
    pub fn reject_attach(&mut self, ty: TypeId) {
        self.rejected_types.insert(ty);
    }

    /// Clears a rejection installed by [`Self::reject_attach`].
    pub fn allow_attach(&mut self, ty: TypeId) {
        self.rejected_types.remove(&ty);
    }

    /// Makes every subsequent detach of `node` fail with
    /// [`HostError::DetachRejected`].
    pub fn reject_detach(&mut self, node: NodeId) {
        self.pinned_nodes.insert(node);
    }

    /// Makes `node`'s attribute list unreadable, as a half torn-down node
    /// would be. Reads and writes of individual attributes still work.
    pub fn seal_attributes(&mut self, node: NodeId) {
        self.sealed_nodes.insert(node);
    }

    /// Convenience read of a whole attribute by name.
    pub fn get(&self, obj: ObjectRef, name: &str) -> Option<&AttrValue> {
        self.slots(obj)?
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.value)
    }

    /// Convenience write of a whole attribute by name.
    ///
    /// # Errors
    /// Fails as [`HostWorld::write_attribute`] does.
    pub fn set(
        &mut self,
        obj: ObjectRef,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), AttrError> {
        self.write_attribute(obj, &AttrPath::field(name), value.into())
    }

    /// Number of live nodes across all hosts.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn slots(&self, obj: ObjectRef) -> Option<&Vec<Slot>> {
        match obj {
            ObjectRef::Node(id) => self.nodes.get(&id).map(|n| &n.slots),
            ObjectRef::Asset(id) => self.assets.get(&id).map(|a| &a.slots),
        }
    }

    fn slot(&self, obj: ObjectRef, path: &AttrPath) -> Result<&Slot, AttrError> {
        self.slots(obj)
            .ok_or(AttrError::ObjectMissing(obj))?
            .iter()
            .find(|s| s.name == path.field)
            .ok_or_else(|| AttrError::PathMissing(path.clone()))
    }

    fn slot_mut(&mut self, obj: ObjectRef, path: &AttrPath) -> Result<&mut Slot, AttrError> {
        let slots = match obj {
            ObjectRef::Node(id) => self.nodes.get_mut(&id).map(|n| &mut n.slots),
            ObjectRef::Asset(id) => self.assets.get_mut(&id).map(|a| &mut a.slots),
        };
        slots
            .ok_or(AttrError::ObjectMissing(obj))?
            .iter_mut()
            .find(|s| s.name == path.field)
            .ok_or_else(|| AttrError::PathMissing(path.clone()))
    }

    fn check_reference(
        &self,
        accepts: Option<TypeId>,
        path: &AttrPath,
        value: &ScalarValue,
    ) -> Result<(), AttrError> {
        let (Some(required), Some(target)) = (accepts, value.as_reference()) else {
            return Ok(());
        };
        match self.nodes.get(&target) {
            Some(record) if is_subtype(&self.registry, record.ty, required) => Ok(()),
            _ => Err(AttrError::ReferenceRejected {
                path: path.clone(),
                target,
            }),
        }
    }
}

/// Validates `value` against the slot it is about to replace.
fn check_shape(slot: &Slot, path: &AttrPath, value: &AttrValue) -> Result<(), AttrError> {
    match (&slot.value, path.index, value) {
        (AttrValue::Scalar(current), None, AttrValue::Scalar(new)) => {
            if current.tag() == new.tag() {
                Ok(())
            } else {
                Err(AttrError::TagMismatch {
                    path: path.clone(),
                    expected: current.tag(),
                    found: new.tag(),
                })
            }
        }
        (AttrValue::Array(current), None, AttrValue::Array(new)) => {
            let Some(expected) = current.element else {
                return Ok(());
            };
            if let Some(bad) = new.items.iter().find(|item| item.tag() != expected) {
                return Err(AttrError::TagMismatch {
                    path: path.clone(),
                    expected,
                    found: bad.tag(),
                });
            }
            Ok(())
        }
        (AttrValue::Array(current), Some(index), AttrValue::Scalar(new)) => {
            if index >= current.items.len() {
                return Err(AttrError::IndexOutOfRange(path.clone()));
            }
            match current.element_tag() {
                Some(expected) if expected != new.tag() => Err(AttrError::TagMismatch {
                    path: path.clone(),
                    expected,
                    found: new.tag(),
                }),
                _ => Ok(()),
            }
        }
        _ => Err(AttrError::ShapeMismatch(path.clone())),
    }
}

impl HostWorld for MemoryWorld {
    type Schema = TypeRegistry;

    fn schema(&self) -> &TypeRegistry {
        &self.registry
    }

    fn hosts(&self) -> Vec<HostId> {
        self.hosts.keys().copied().collect()
    }

    fn contains_host(&self, host: HostId) -> bool {
        self.hosts.contains_key(&host)
    }

    fn attached(&self, host: HostId) -> Result<Vec<NodeId>, HostError> {
        self.hosts
            .get(&host)
            .map(|h| h.nodes.clone())
            .ok_or(HostError::UnknownHost(host))
    }

    fn type_of(&self, node: NodeId) -> Option<TypeId> {
        self.nodes.get(&node).map(|n| n.ty)
    }

    fn host_of(&self, node: NodeId) -> Option<HostId> {
        self.nodes.get(&node).map(|n| n.host)
    }

    fn detach(&mut self, host: HostId, node: NodeId) -> Result<(), HostError> {
        let record = self
            .hosts
            .get_mut(&host)
            .ok_or(HostError::UnknownHost(host))?;
        let pos = record
            .nodes
            .iter()
            .position(|n| *n == node)
            .ok_or(HostError::NodeNotAttached { host, node })?;
        let ty = self
            .nodes
            .get(&node)
            .map(|n| n.ty)
            .ok_or(HostError::NodeNotAttached { host, node })?;
        if self.registry.get(ty).is_some_and(|d| d.structural) {
            return Err(HostError::StructuralNode(node));
        }
        if self.pinned_nodes.contains(&node) {
            return Err(HostError::DetachRejected {
                node,
                reason: "node pinned by host".to_owned(),
            });
        }
        record.nodes.remove(pos);
        self.nodes.remove(&node);
        Ok(())
    }

    fn attach(&mut self, host: HostId, ty: TypeId) -> Result<NodeId, HostError> {
        let desc = self.registry.get(ty).ok_or(HostError::UnknownType(ty))?;
        if desc.is_abstract {
            return Err(HostError::AbstractType(ty));
        }
        if self.rejected_types.contains(&ty) {
            return Err(HostError::AttachRejected {
                ty,
                reason: "allocation refused by host".to_owned(),
            });
        }
        let record = self.hosts.get(&host).ok_or(HostError::UnknownHost(host))?;
        if desc.disallow_multiple
            && record
                .nodes
                .iter()
                .any(|n| self.nodes.get(n).is_some_and(|r| r.ty == ty))
        {
            return Err(HostError::DuplicateDisallowed { host, ty });
        }

        let slots = self
            .registry
            .attributes(ty)
            .into_iter()
            .map(|spec| Slot {
                name: spec.name.clone(),
                value: spec.default.clone(),
                accepts: spec.accepts,
            })
            .collect();
        let id = derive_node_id(host, self.next_seq);
        self.next_seq += 1;
        self.nodes.insert(id, NodeRecord { host, ty, slots });
        if let Some(record) = self.hosts.get_mut(&host) {
            record.nodes.push(id);
        }
        Ok(id)
    }

    fn attribute_paths(&self, obj: ObjectRef) -> Result<Vec<AttrPath>, AttrError> {
        if matches!(obj, ObjectRef::Node(id) if self.sealed_nodes.contains(&id)) {
            return Err(AttrError::ObjectMissing(obj));
        }
        Ok(self
            .slots(obj)
            .ok_or(AttrError::ObjectMissing(obj))?
            .iter()
            .map(|s| AttrPath::field(s.name.clone()))
            .collect())
    }

    fn read_attribute(&self, obj: ObjectRef, path: &AttrPath) -> Result<AttrValue, AttrError> {
        let slot = self.slot(obj, path)?;
        match (path.index, &slot.value) {
            (None, value) => Ok(value.clone()),
            (Some(i), AttrValue::Array(array)) => array
                .items
                .get(i)
                .cloned()
                .map(AttrValue::Scalar)
                .ok_or_else(|| AttrError::IndexOutOfRange(path.clone())),
            (Some(_), AttrValue::Scalar(_)) => Err(AttrError::ShapeMismatch(path.clone())),
        }
    }

    fn write_attribute(
        &mut self,
        obj: ObjectRef,
        path: &AttrPath,
        value: AttrValue,
    ) -> Result<(), AttrError> {
        let slot = self.slot(obj, path)?;
        check_shape(slot, path, &value)?;
        let accepts = slot.accepts;
        match &value {
            AttrValue::Scalar(v) => self.check_reference(accepts, path, v)?,
            AttrValue::Array(a) => {
                for item in &a.items {
                    self.check_reference(accepts, path, item)?;
                }
            }
        }

        let slot = self.slot_mut(obj, path)?;
        match (path.index, value, &mut slot.value) {
            (None, AttrValue::Array(new), AttrValue::Array(current)) => {
                current.items = new.items;
            }
            (None, new, current) => *current = new,
            (Some(i), AttrValue::Scalar(new), AttrValue::Array(current)) => {
                if let Some(item) = current.items.get_mut(i) {
                    *item = new;
                }
            }
            (Some(_), _, _) => return Err(AttrError::ShapeMismatch(path.clone())),
        }
        Ok(())
    }

    fn resize_array(
        &mut self,
        obj: ObjectRef,
        path: &AttrPath,
        len: usize,
    ) -> Result<(), AttrError> {
        let slot = self.slot_mut(obj, path)?;
        let AttrValue::Array(array) = &mut slot.value else {
            return Err(AttrError::ShapeMismatch(path.clone()));
        };
        if len <= array.items.len() {
            array.items.truncate(len);
            return Ok(());
        }
        let tag = array
            .element_tag()
            .ok_or_else(|| AttrError::ShapeMismatch(path.clone()))?;
        array.items.resize(len, ScalarValue::default_for(tag));
        Ok(())
    }

    fn scan_universe(&self, kind: UniverseKind) -> Vec<ObjectRef> {
        let include_inactive = kind == UniverseKind::Project;
        let nodes = self
            .hosts
            .values()
            .filter(|h| include_inactive || h.active)
            .flat_map(|h| h.nodes.iter().copied().map(ObjectRef::Node));
        let assets = self
            .assets
            .iter()
            .filter(|(_, a)| include_inactive || a.active)
            .map(|(id, _)| ObjectRef::Asset(*id));
        nodes.chain(assets).collect()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::schema::{AttributeSpec, TypeDescriptor};
    use crate::value::{ArrayValue, ValueTag};

    fn world() -> (MemoryWorld, TypeId, TypeId) {
        let mut reg = TypeRegistry::new();
        let root = reg
            .register(TypeDescriptor::new("root").structural())
            .expect("root");
        let body = reg
            .register(
                TypeDescriptor::new("body")
                    .attribute(AttributeSpec::new("mass", ScalarValue::Float(1.0)))
                    .attribute(AttributeSpec::new("tags", ArrayValue::empty(ValueTag::String)))
                    .attribute(AttributeSpec::reference_to("anchor", root)),
            )
            .expect("body");
        (MemoryWorld::new(reg), root, body)
    }

    #[test]
    fn attach_materialises_defaults_and_mints_fresh_ids() {
        let (mut w, _, body) = world();
        let host = w.create_host("h");
        let a = w.attach(host, body).expect("attach");
        let b = w.attach(host, body).expect("attach");
        assert_ne!(a, b);
        assert_eq!(w.attached(host).expect("host"), vec![a, b]);
        assert_eq!(
            w.get(ObjectRef::Node(a), "mass"),
            Some(&AttrValue::Scalar(ScalarValue::Float(1.0)))
        );
    }

    #[test]
    fn structural_nodes_are_single_and_undetachable() {
        let (mut w, root, _) = world();
        let host = w.create_host("h");
        let r = w.attach(host, root).expect("root");
        assert_eq!(
            w.attach(host, root),
            Err(HostError::DuplicateDisallowed { host, ty: root })
        );
        assert_eq!(w.detach(host, r), Err(HostError::StructuralNode(r)));
    }

    #[test]
    fn writes_check_tags_and_reference_targets() {
        let (mut w, root, body) = world();
        let host = w.create_host("h");
        let r = w.attach(host, root).expect("root");
        let b = w.attach(host, body).expect("body");
        let obj = ObjectRef::Node(b);

        assert!(matches!(
            w.set(obj, "mass", ScalarValue::Int(3)),
            Err(AttrError::TagMismatch { .. })
        ));
        assert!(matches!(
            w.set(obj, "anchor", ScalarValue::Reference(Some(b))),
            Err(AttrError::ReferenceRejected { .. })
        ));
        assert!(w.set(obj, "anchor", ScalarValue::Reference(Some(r))).is_ok());
    }

    #[test]
    fn resize_pads_with_tag_defaults() {
        let (mut w, _, body) = world();
        let host = w.create_host("h");
        let b = w.attach(host, body).expect("body");
        let obj = ObjectRef::Node(b);
        let path = AttrPath::field("tags");
        w.resize_array(obj, &path, 2).expect("resize");
        w.write_attribute(
            obj,
            &AttrPath::element("tags", 1),
            AttrValue::Scalar(ScalarValue::String("x".into())),
        )
        .expect("write element");
        assert_eq!(
            w.read_attribute(obj, &path).expect("read"),
            AttrValue::Array(ArrayValue::of(
                ValueTag::String,
                vec![
                    ScalarValue::String(String::new()),
                    ScalarValue::String("x".into())
                ]
            ))
        );
    }

    #[test]
    fn injected_refusals_leave_nodes_in_place() {
        let (mut w, _, body) = world();
        let host = w.create_host("h");
        let b = w.attach(host, body).expect("body");
        w.reject_detach(b);
        w.seal_attributes(b);

        assert!(matches!(
            w.detach(host, b),
            Err(HostError::DetachRejected { node, .. }) if node == b
        ));
        assert_eq!(
            w.attribute_paths(ObjectRef::Node(b)),
            Err(AttrError::ObjectMissing(ObjectRef::Node(b)))
        );
        assert!(w.read_attribute(ObjectRef::Node(b), &AttrPath::field("mass")).is_ok());
        assert_eq!(w.attached(host).expect("host"), vec![b]);
    }

    #[test]
    fn active_context_excludes_inactive_owners() {
        let (mut w, _, body) = world();
        let active = w.create_host("active");
        let idle = w.create_host("idle");
        let a = w.attach(active, body).expect("a");
        w.attach(idle, body).expect("b");
        w.set_host_active(idle, false).expect("host");
        let asset = w.create_asset("settings");
        w.set_asset_active(asset, false).expect("asset");

        assert_eq!(
            w.scan_universe(UniverseKind::ActiveContext),
            vec![ObjectRef::Node(a)]
        );
        assert_eq!(w.scan_universe(UniverseKind::Project).len(), 3);
    }
}
