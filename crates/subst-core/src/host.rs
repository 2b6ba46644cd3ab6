// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Host capability interface.
//!
//! The engine owns no storage. Everything it reads or mutates goes through
//! [`HostWorld`], which the embedding environment implements over its own
//! scene/object model. [`crate::MemoryWorld`] is the in-memory implementation
//! used by tests and tools.
//!
//! Contract notes for implementors:
//! - `attached` and `attribute_paths` must return a stable, deterministic
//!   order; blocker order and state-bag order derive from them.
//! - `attach` must mint a fresh [`NodeId`]; identities are never reused.
//! - The caller guarantees exclusive access for the duration of one
//!   substitution run; implementations need no interior locking for it.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ident::{HostId, NodeId, ObjectRef, TypeId};
use crate::schema::TypeSchema;
use crate::value::{AttrPath, AttrValue, ValueTag};

/// Which owner objects a reference scan walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseKind {
    /// Objects reachable from the active working context.
    ActiveContext,
    /// Every persisted object in the project.
    #[default]
    Project,
}

/// Errors raised by host-level (structural) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host does not exist.
    #[error("unknown host {0}")]
    UnknownHost(HostId),
    /// The node is not attached to the given host.
    #[error("node {node} is not attached to host {host}")]
    NodeNotAttached {
        /// Host queried.
        host: HostId,
        /// Node that was expected on it.
        node: NodeId,
    },
    /// The type is not known to the host's schema.
    #[error("unknown type {0}")]
    UnknownType(TypeId),
    /// The type cannot be instantiated.
    #[error("type {0} is abstract")]
    AbstractType(TypeId),
    /// The host already holds a node of a single-instance type.
    #[error("host {host} already has a node of single-instance type {ty}")]
    DuplicateDisallowed {
        /// Host attached to.
        host: HostId,
        /// Single-instance type.
        ty: TypeId,
    },
    /// The structural node cannot be detached.
    #[error("structural node {0} cannot be detached")]
    StructuralNode(NodeId),
    /// The host refused to detach the node for an environment-specific reason.
    #[error("detach of {node} rejected: {reason}")]
    DetachRejected {
        /// Node that stayed attached.
        node: NodeId,
        /// Host-supplied reason.
        reason: String,
    },
    /// The host refused the attach for an environment-specific reason.
    #[error("attach of {ty} rejected: {reason}")]
    AttachRejected {
        /// Type that failed to attach.
        ty: TypeId,
        /// Host-supplied reason.
        reason: String,
    },
}

/// Errors raised by attribute reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttrError {
    /// The owner object no longer exists (destroyed or detached).
    #[error("object {0} is missing")]
    ObjectMissing(ObjectRef),
    /// The owner has no attribute at the path.
    #[error("no attribute at {0}")]
    PathMissing(AttrPath),
    /// The written value's tag differs from the attribute's tag.
    #[error("tag mismatch at {path}: expected {expected}, found {found}")]
    TagMismatch {
        /// Attribute path.
        path: AttrPath,
        /// Tag the attribute holds.
        expected: ValueTag,
        /// Tag of the rejected value.
        found: ValueTag,
    },
    /// Array element index is beyond the array's length.
    #[error("index out of range at {0}")]
    IndexOutOfRange(AttrPath),
    /// Path addresses an element of a non-array attribute, or vice versa.
    #[error("shape mismatch at {0}")]
    ShapeMismatch(AttrPath),
    /// The reference slot does not accept the target node's type.
    #[error("reference at {path} rejects target {target}")]
    ReferenceRejected {
        /// Attribute path.
        path: AttrPath,
        /// Rejected target.
        target: NodeId,
    },
}

/// Capabilities the engine needs from its environment.
pub trait HostWorld {
    /// Schema type describing the host's component types.
    type Schema: TypeSchema;

    /// The host's component type schema.
    fn schema(&self) -> &Self::Schema;

    /// All hosts, in deterministic order.
    fn hosts(&self) -> Vec<HostId>;

    /// Returns `true` when `host` exists.
    fn contains_host(&self, host: HostId) -> bool;

    /// Nodes attached to `host`, in attachment order.
    ///
    /// # Errors
    /// Returns [`HostError::UnknownHost`] if `host` does not exist.
    fn attached(&self, host: HostId) -> Result<Vec<NodeId>, HostError>;

    /// Concrete type of a live node.
    fn type_of(&self, node: NodeId) -> Option<TypeId>;

    /// Host a live node is attached to.
    fn host_of(&self, node: NodeId) -> Option<HostId>;

    /// Detaches (destroys) `node` from `host`.
    ///
    /// # Errors
    /// - Returns [`HostError::UnknownHost`] or [`HostError::NodeNotAttached`]
    ///   when the pair does not name a live attachment.
    /// - Returns [`HostError::StructuralNode`] for the host's structural node,
    ///   or [`HostError::DetachRejected`] when the host refuses for its own
    ///   reasons.
    fn detach(&mut self, host: HostId, node: NodeId) -> Result<(), HostError>;

    /// Attaches a fresh node of type `ty` to `host` and returns its identity.
    ///
    /// # Errors
    /// Returns [`HostError::UnknownType`], [`HostError::AbstractType`],
    /// [`HostError::UnknownHost`], [`HostError::DuplicateDisallowed`] or
    /// [`HostError::AttachRejected`]. Nothing is attached on error.
    fn attach(&mut self, host: HostId, ty: TypeId) -> Result<NodeId, HostError>;

    /// Visible attribute paths of `obj` (whole attributes, no element paths).
    ///
    /// # Errors
    /// Returns [`AttrError::ObjectMissing`] if the owner cannot be listed.
    fn attribute_paths(&self, obj: ObjectRef) -> Result<Vec<AttrPath>, AttrError>;

    /// Reads the value at `path`; element paths yield a scalar.
    ///
    /// # Errors
    /// Returns [`AttrError::ObjectMissing`], [`AttrError::PathMissing`],
    /// [`AttrError::IndexOutOfRange`] or [`AttrError::ShapeMismatch`].
    fn read_attribute(&self, obj: ObjectRef, path: &AttrPath) -> Result<AttrValue, AttrError>;

    /// Writes `value` at `path`.
    ///
    /// # Errors
    /// Fails like [`Self::read_attribute`], and additionally with
    /// [`AttrError::TagMismatch`] or [`AttrError::ReferenceRejected`] when the
    /// slot refuses the value. A refused write leaves the slot unchanged.
    fn write_attribute(
        &mut self,
        obj: ObjectRef,
        path: &AttrPath,
        value: AttrValue,
    ) -> Result<(), AttrError>;

    /// Resizes the array attribute at `path` to `len` elements.
    ///
    /// New elements take the default value for the array's element tag.
    ///
    /// # Errors
    /// Returns [`AttrError::ObjectMissing`] or [`AttrError::PathMissing`], or
    /// [`AttrError::ShapeMismatch`] when `path` is not an array that can grow.
    fn resize_array(&mut self, obj: ObjectRef, path: &AttrPath, len: usize)
        -> Result<(), AttrError>;

    /// Owner objects in the given scan universe, in deterministic order.
    fn scan_universe(&self, kind: UniverseKind) -> Vec<ObjectRef>;
}
