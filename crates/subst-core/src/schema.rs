// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Component type schema: ancestry, declared requirements, attribute layout.
use std::collections::BTreeMap;

use thiserror::Error;

use crate::ident::{make_type_id, TypeId};
use crate::value::{AttrValue, ScalarValue};

/// Read-only view of the host's component type system.
///
/// The dependency model is written against this trait only; hosts with their
/// own type registries implement it directly instead of copying into
/// [`TypeRegistry`]. Unknown types answer with "no parent, no requirements,
/// not structural".
pub trait TypeSchema {
    /// Returns `true` when `ty` is known to the schema.
    fn contains(&self, ty: TypeId) -> bool;
    /// Direct parent type, if any.
    fn parent(&self, ty: TypeId) -> Option<TypeId>;
    /// Requirements declared directly on `ty` (not inherited).
    fn declared_requirements(&self, ty: TypeId) -> &[TypeId];
    /// Returns `true` for the host's mandatory, non-removable node type.
    fn is_structural(&self, ty: TypeId) -> bool;
    /// Returns `true` when `ty` cannot be instantiated.
    fn is_abstract(&self, ty: TypeId) -> bool;
    /// Human-readable type name for diagnostics.
    fn type_name(&self, ty: TypeId) -> Option<&str>;
}

/// One attribute declared by a component type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSpec {
    /// Attribute name; unique per type after inheritance.
    pub name: String,
    /// Value a freshly attached node starts with.
    pub default: AttrValue,
    /// For reference attributes (or reference arrays): the type a target must
    /// be (or derive from). `None` accepts any node.
    pub accepts: Option<TypeId>,
}

impl AttributeSpec {
    /// Declares an attribute with a default value.
    pub fn new(name: impl Into<String>, default: impl Into<AttrValue>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            accepts: None,
        }
    }

    /// Declares a null reference attribute accepting targets of type `ty`.
    pub fn reference_to(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            default: AttrValue::Scalar(ScalarValue::Reference(None)),
            accepts: Some(ty),
        }
    }

    /// Restricts accepted reference targets to `ty`.
    pub fn accepting(mut self, ty: TypeId) -> Self {
        self.accepts = Some(ty);
        self
    }
}

/// Declaration of one component type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Type identity (`make_type_id(name)`).
    pub id: TypeId,
    /// Type name.
    pub name: String,
    /// Direct parent type.
    pub parent: Option<TypeId>,
    /// Directly declared requirements, in declaration order.
    pub requires: Vec<TypeId>,
    /// Mandatory structural node type (never removed, always satisfies).
    pub structural: bool,
    /// At most one node of this exact type per host.
    pub disallow_multiple: bool,
    /// Cannot be instantiated; only usable as a parent or requirement.
    pub is_abstract: bool,
    /// Attributes declared directly on this type.
    pub attributes: Vec<AttributeSpec>,
}

impl TypeDescriptor {
    /// Starts a descriptor for a concrete type named `name`.
    pub fn new(name: &str) -> Self {
        Self {
            id: make_type_id(name),
            name: name.to_owned(),
            parent: None,
            requires: Vec::new(),
            structural: false,
            disallow_multiple: false,
            is_abstract: false,
            attributes: Vec::new(),
        }
    }

    /// Sets the parent type.
    pub fn extends(mut self, parent: TypeId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Adds a requirement.
    pub fn requires(mut self, ty: TypeId) -> Self {
        self.requires.push(ty);
        self
    }

    /// Marks the type structural.
    pub fn structural(mut self) -> Self {
        self.structural = true;
        self.disallow_multiple = true;
        self
    }

    /// Allows at most one node of this type per host.
    pub fn single(mut self) -> Self {
        self.disallow_multiple = true;
        self
    }

    /// Marks the type abstract.
    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Adds an attribute.
    pub fn attribute(mut self, spec: AttributeSpec) -> Self {
        self.attributes.push(spec);
        self
    }
}

/// Error returned by [`TypeRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A type with the same id is already registered.
    #[error("duplicate type: {0}")]
    DuplicateType(String),
    /// The parent must be registered before its children.
    #[error("type {child} extends unregistered parent {parent}")]
    UnknownParent {
        /// Type being registered.
        child: String,
        /// Missing parent id.
        parent: TypeId,
    },
    /// A requirement names a type that is not registered.
    #[error("type {ty} requires unregistered type {required}")]
    UnknownRequirement {
        /// Type being registered.
        ty: String,
        /// Missing requirement id.
        required: TypeId,
    },
}

/// In-memory [`TypeSchema`] implementation.
///
/// Parents must be registered before children, so ancestry is acyclic by
/// construction.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<TypeId, TypeDescriptor>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type and returns its id.
    ///
    /// # Errors
    /// Returns a [`RegistryError`] when the name is taken, or when the parent
    /// or a required type has not been registered yet. A type may require
    /// itself.
    pub fn register(&mut self, desc: TypeDescriptor) -> Result<TypeId, RegistryError> {
        if self.types.contains_key(&desc.id) {
            return Err(RegistryError::DuplicateType(desc.name));
        }
        if let Some(parent) = desc.parent {
            if !self.types.contains_key(&parent) {
                return Err(RegistryError::UnknownParent {
                    child: desc.name,
                    parent,
                });
            }
        }
        if let Some(&required) = desc
            .requires
            .iter()
            .find(|r| **r != desc.id && !self.types.contains_key(r))
        {
            return Err(RegistryError::UnknownRequirement {
                ty: desc.name,
                required,
            });
        }
        let id = desc.id;
        self.types.insert(id, desc);
        Ok(id)
    }

    /// Returns the descriptor for `ty`.
    pub fn get(&self, ty: TypeId) -> Option<&TypeDescriptor> {
        self.types.get(&ty)
    }

    /// Iterates over all registered types in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    /// Flattened attribute layout for `ty`: ancestors first, a redeclared name
    /// keeps its ancestor's position but takes the most derived declaration.
    pub fn attributes(&self, ty: TypeId) -> Vec<&AttributeSpec> {
        let mut chain = Vec::new();
        let mut cursor = self.types.get(&ty);
        while let Some(desc) = cursor {
            chain.push(desc);
            cursor = desc.parent.and_then(|p| self.types.get(&p));
        }
        let mut out: Vec<&AttributeSpec> = Vec::new();
        for desc in chain.iter().rev() {
            for spec in &desc.attributes {
                if let Some(slot) = out.iter_mut().find(|s| s.name == spec.name) {
                    *slot = spec;
                } else {
                    out.push(spec);
                }
            }
        }
        out
    }

    /// Returns `true` when a host may hold at most one node of `ty`.
    pub fn disallows_multiple(&self, ty: TypeId) -> bool {
        self.types.get(&ty).is_some_and(|d| d.disallow_multiple)
    }
}

impl TypeSchema for TypeRegistry {
    fn contains(&self, ty: TypeId) -> bool {
        self.types.contains_key(&ty)
    }

    fn parent(&self, ty: TypeId) -> Option<TypeId> {
        self.types.get(&ty).and_then(|d| d.parent)
    }

    fn declared_requirements(&self, ty: TypeId) -> &[TypeId] {
        self.types.get(&ty).map_or(&[], |d| d.requires.as_slice())
    }

    fn is_structural(&self, ty: TypeId) -> bool {
        self.types.get(&ty).is_some_and(|d| d.structural)
    }

    fn is_abstract(&self, ty: TypeId) -> bool {
        self.types.get(&ty).is_some_and(|d| d.is_abstract)
    }

    fn type_name(&self, ty: TypeId) -> Option<&str> {
        self.types.get(&ty).map(|d| d.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn register_rejects_duplicates_and_unknown_links() {
        let mut reg = TypeRegistry::new();
        let base = reg.register(TypeDescriptor::new("base")).expect("register");
        assert_eq!(
            reg.register(TypeDescriptor::new("base")),
            Err(RegistryError::DuplicateType("base".into()))
        );
        let missing = make_type_id("missing");
        assert!(matches!(
            reg.register(TypeDescriptor::new("child").extends(missing)),
            Err(RegistryError::UnknownParent { .. })
        ));
        assert!(matches!(
            reg.register(TypeDescriptor::new("needy").requires(missing)),
            Err(RegistryError::UnknownRequirement { .. })
        ));
        assert!(reg
            .register(TypeDescriptor::new("child").extends(base))
            .is_ok());
    }

    #[test]
    fn attributes_are_inherited_with_overrides_in_place() {
        let mut reg = TypeRegistry::new();
        let base = reg
            .register(
                TypeDescriptor::new("base")
                    .attribute(AttributeSpec::new("a", ScalarValue::Int(1)))
                    .attribute(AttributeSpec::new("b", ScalarValue::Int(2))),
            )
            .expect("register");
        let child = reg
            .register(
                TypeDescriptor::new("child")
                    .extends(base)
                    .attribute(AttributeSpec::new("c", ScalarValue::Bool(true)))
                    .attribute(AttributeSpec::new("a", ScalarValue::Int(10))),
            )
            .expect("register");

        let attrs = reg.attributes(child);
        let names: Vec<_> = attrs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(
            attrs[0].default,
            AttrValue::Scalar(ScalarValue::Int(10)),
            "override keeps position, takes derived default"
        );
    }

    #[test]
    fn self_requirement_is_accepted() {
        let mut reg = TypeRegistry::new();
        let id = make_type_id("loop");
        assert!(reg
            .register(TypeDescriptor::new("loop").requires(id))
            .is_ok());
        assert_eq!(reg.declared_requirements(id), &[id]);
    }
}
