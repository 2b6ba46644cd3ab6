// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier and hashing utilities.
use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};

/// Canonical 256-bit hash used for addressing types, nodes, hosts, and assets.
pub type Hash = [u8; 32];

/// Identity of a component type, minted by [`make_type_id`] from the type's
/// name. Equal names give equal ids across runs and processes.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
pub struct TypeId(pub Hash);

/// Stable identity of a node attached to a host.
///
/// Identities are opaque. A host allocates a fresh `NodeId` on every attach,
/// so a node restored after temporary removal never reuses the identity it had
/// before; callers correlate old and new identities explicitly.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
pub struct NodeId(pub Hash);

/// Identity of a host entity. Hosts are never replaced during a substitution.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
pub struct HostId(pub Hash);

/// Identity of a non-node owner object (a persisted asset, a settings object).
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
pub struct AssetId(pub Hash);

macro_rules! id_common {
    ($($ty:ident),* $(,)?) => {$(
        impl $ty {
            /// Returns the canonical byte representation of this id.
            #[must_use]
            pub fn as_bytes(&self) -> &Hash {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&short_hex(&self.0))
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($ty), "({})"), short_hex(&self.0))
            }
        }
    )*};
}

id_common!(TypeId, NodeId, HostId, AssetId);

/// First 8 bytes of a hash as lowercase hex; enough to tell ids apart in logs.
fn short_hex(h: &Hash) -> String {
    hex::encode(&h[..8])
}

fn domain_hash(domain: &[u8], label: &[u8]) -> Hash {
    let mut hasher = Hasher::new();
    hasher.update(domain);
    hasher.update(label);
    hasher.finalize().into()
}

/// Type id for a type name (BLAKE3 over `b"type:" || label`).
pub fn make_type_id(label: &str) -> TypeId {
    TypeId(domain_hash(b"type:", label.as_bytes()))
}

/// Label-derived node id (`b"node:"` domain). Hosts mint attach-time ids
/// with [`derive_node_id`] instead; this is for fixtures and tooling.
pub fn make_node_id(label: &str) -> NodeId {
    NodeId(domain_hash(b"node:", label.as_bytes()))
}

/// Host id for a label (`b"host:"` domain).
pub fn make_host_id(label: &str) -> HostId {
    HostId(domain_hash(b"host:", label.as_bytes()))
}

/// Asset id for a label (`b"asset:"` domain).
pub fn make_asset_id(label: &str) -> AssetId {
    AssetId(domain_hash(b"asset:", label.as_bytes()))
}

/// Derives the identity of the `seq`-th node allocated on `host`.
///
/// Hosts use this to mint fresh identities on attach. The sequence number is
/// encoded little-endian after the host bytes so two hosts never collide.
pub fn derive_node_id(host: HostId, seq: u64) -> NodeId {
    let mut hasher = Hasher::new();
    hasher.update(b"node-seq:");
    hasher.update(&host.0);
    hasher.update(&seq.to_le_bytes());
    NodeId(hasher.finalize().into())
}

/// Any object that may own reference-typed attributes.
///
/// Nodes own references to other nodes (a joint pointing at a body); assets
/// and other persisted objects may do the same from outside any host.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[derive(Serialize, Deserialize)]
pub enum ObjectRef {
    /// A node attached to some host.
    Node(NodeId),
    /// A non-node owner object.
    Asset(AssetId),
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node:{id}"),
            Self::Asset(id) => write!(f, "asset:{id}"),
        }
    }
}
