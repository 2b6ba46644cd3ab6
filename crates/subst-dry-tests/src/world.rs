// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! World and host builder utilities for tests.

use subst_core::{make_type_id, HostId, HostWorld, MemoryWorld, NodeId, TypeRegistry};

use crate::schema::ROOT_TYPE;

/// One host built by [`WorldBuilder`].
#[derive(Debug, Clone)]
pub struct HostFixture {
    /// Host identity.
    pub id: HostId,
    /// Structural root node, when the builder attached one.
    pub root: Option<NodeId>,
    /// Non-root nodes in the order they were requested.
    pub nodes: Vec<NodeId>,
}

impl HostFixture {
    /// The `i`-th non-root node.
    #[allow(clippy::expect_used)]
    pub fn node(&self, i: usize) -> NodeId {
        *self.nodes.get(i).expect("fixture node index in range")
    }
}

/// A built world plus handles to every host it contains.
#[derive(Debug, Clone)]
pub struct WorldFixture {
    /// The world.
    pub world: MemoryWorld,
    /// Hosts in declaration order.
    pub hosts: Vec<HostFixture>,
}

impl WorldFixture {
    /// The `i`-th declared host.
    #[allow(clippy::expect_used)]
    pub fn host(&self, i: usize) -> &HostFixture {
        self.hosts.get(i).expect("fixture host index in range")
    }
}

/// Builder for [`MemoryWorld`] fixtures.
///
/// # Example
///
/// ```
/// use subst_dry_tests::{SchemaBuilder, WorldBuilder};
///
/// let registry = SchemaBuilder::new().component("b", &[]).component("a", &["b"]).build();
/// let fx = WorldBuilder::new(registry).host("player", &["a", "b"]).build();
/// assert_eq!(fx.host(0).nodes.len(), 2);
/// ```
pub struct WorldBuilder {
    registry: TypeRegistry,
    with_root: bool,
    hosts: Vec<(String, Vec<String>)>,
}

impl WorldBuilder {
    /// Create a builder over `registry`. Hosts get a [`ROOT_TYPE`] node first.
    pub fn new(registry: TypeRegistry) -> Self {
        Self {
            registry,
            with_root: true,
            hosts: Vec::new(),
        }
    }

    /// Do not attach a structural root to new hosts.
    pub fn without_root(mut self) -> Self {
        self.with_root = false;
        self
    }

    /// Declare a host holding nodes of the named types, attached in order.
    pub fn host(mut self, label: &str, types: &[&str]) -> Self {
        self.hosts.push((
            label.to_owned(),
            types.iter().map(|t| (*t).to_owned()).collect(),
        ));
        self
    }

    /// Build the world.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> WorldFixture {
        let mut world = MemoryWorld::new(self.registry);
        let mut hosts = Vec::with_capacity(self.hosts.len());
        for (label, types) in self.hosts {
            let id = world.create_host(&label);
            let root = self.with_root.then(|| {
                world
                    .attach(id, make_type_id(ROOT_TYPE))
                    .expect("attach fixture root")
            });
            let nodes = types
                .iter()
                .map(|t| world.attach(id, make_type_id(t)).expect("attach fixture node"))
                .collect();
            hosts.push(HostFixture { id, root, nodes });
        }
        WorldFixture { world, hosts }
    }
}
