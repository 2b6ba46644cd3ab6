// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema builders for tests.
//!
//! Types are addressed by name; ids follow the engine's own derivation
//! (`make_type_id(name)`), so tests can recompute any id from its label.

use subst_core::{make_type_id, AttributeSpec, TypeDescriptor, TypeId, TypeRegistry};

/// Name of the structural root type every [`SchemaBuilder`] registers.
pub const ROOT_TYPE: &str = "transform";

/// Builder for [`TypeRegistry`] fixtures.
///
/// Registration is immediate, so a requirement or parent must be declared
/// before the type that names it.
///
/// # Example
///
/// ```
/// use subst_dry_tests::SchemaBuilder;
///
/// let registry = SchemaBuilder::new()
///     .component("b", &[])
///     .component("a", &["b"])
///     .build();
/// assert_eq!(registry.iter().count(), 3);
/// ```
pub struct SchemaBuilder {
    registry: TypeRegistry,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Create a builder holding only the structural [`ROOT_TYPE`].
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let mut registry = TypeRegistry::new();
        registry
            .register(TypeDescriptor::new(ROOT_TYPE).structural())
            .expect("root type registers in an empty registry");
        Self { registry }
    }

    /// Register an arbitrary descriptor.
    #[allow(clippy::expect_used)]
    pub fn with(mut self, desc: TypeDescriptor) -> Self {
        self.registry.register(desc).expect("register fixture type");
        self
    }

    /// Register a concrete component requiring the named types.
    pub fn component(self, name: &str, requires: &[&str]) -> Self {
        self.component_with(name, requires, Vec::new())
    }

    /// Register a concrete component with requirements and attributes.
    pub fn component_with(
        self,
        name: &str,
        requires: &[&str],
        attributes: Vec<AttributeSpec>,
    ) -> Self {
        let mut desc = TypeDescriptor::new(name);
        for req in requires {
            desc = desc.requires(make_type_id(req));
        }
        for attr in attributes {
            desc = desc.attribute(attr);
        }
        self.with(desc)
    }

    /// Register a component derived from `parent`.
    pub fn subtype(self, name: &str, parent: &str, requires: &[&str]) -> Self {
        let mut desc = TypeDescriptor::new(name).extends(make_type_id(parent));
        for req in requires {
            desc = desc.requires(make_type_id(req));
        }
        self.with(desc)
    }

    /// Finish and return the registry.
    pub fn build(self) -> TypeRegistry {
        self.registry
    }
}

/// Builds a layered requirement graph: type `t{i}` requires `t{j}` for every
/// `j` in `requirements[i]`.
///
/// Indices that do not point at an earlier type are dropped, which keeps the
/// graph acyclic and registrable in index order. Returns the registry (with
/// [`ROOT_TYPE`]) and the ids of `t0..tn` in order.
pub fn layered_schema(requirements: &[Vec<usize>]) -> (TypeRegistry, Vec<TypeId>) {
    let mut builder = SchemaBuilder::new();
    let mut ids = Vec::with_capacity(requirements.len());
    for (i, reqs) in requirements.iter().enumerate() {
        let name = format!("t{i}");
        let mut desc = TypeDescriptor::new(&name);
        let mut seen = Vec::new();
        for &j in reqs {
            if j < i && !seen.contains(&j) {
                seen.push(j);
                desc = desc.requires(ids[j]);
            }
        }
        ids.push(desc.id);
        builder = builder.with(desc);
    }
    (builder.build(), ids)
}
