// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tagged attribute values.
//!
//! Hosts normalise every externally visible attribute of a node into this
//! closed set before the engine sees it. The engine never inspects host types
//! directly; it dispatches on [`ValueTag`] only.
//!
//! Laws / invariants:
//! - `ScalarValue::tag()` is total and never yields a tag outside the set.
//! - A [`ValueTag::Reference`] does not encode the referenced node's type.
//!   Two reference slots always carry equal tags even when the host restricts
//!   what each slot accepts.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::NodeId;

/// Closed set of leaf value tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueTag {
    /// `bool`.
    Bool,
    /// Signed integer (host integers widen to `i64`).
    Int,
    /// Floating point (host floats widen to `f64`).
    Float,
    /// UTF-8 string.
    String,
    /// Index into an enumeration declared by the host.
    EnumIndex,
    /// Pointer to another node (or null).
    Reference,
    /// Two-component vector.
    Vector2,
    /// Three-component vector.
    Vector3,
    /// Four-component vector.
    Vector4,
    /// Rotation quaternion `(x, y, z, w)`.
    Quaternion,
    /// RGBA color.
    Color,
    /// Axis-aligned rectangle.
    Rect,
    /// Axis-aligned bounding box (center + extents).
    Bounds,
    /// Column-major 4x4 matrix.
    Matrix4,
    /// Keyframed curve.
    Curve,
}

impl fmt::Display for ValueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a curve is evaluated outside its keyed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WrapMode {
    /// Hold the boundary key value.
    #[default]
    Clamp,
    /// Repeat the keyed range.
    Loop,
    /// Repeat, mirroring every other cycle.
    PingPong,
}

/// Single curve key.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keyframe {
    /// Key time.
    pub time: f32,
    /// Key value.
    pub value: f32,
    /// Incoming tangent slope.
    pub in_tangent: f32,
    /// Outgoing tangent slope.
    pub out_tangent: f32,
}

/// Keyframed curve value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Curve {
    /// Keys in ascending time order.
    pub keys: Vec<Keyframe>,
    /// Behaviour before the first key.
    pub pre_wrap: WrapMode,
    /// Behaviour after the last key.
    pub post_wrap: WrapMode,
}

/// Leaf attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    /// `bool`.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Enumeration index.
    EnumIndex(u32),
    /// Node reference; `None` is the null reference.
    Reference(Option<NodeId>),
    /// Two-component vector.
    Vector2([f32; 2]),
    /// Three-component vector.
    Vector3([f32; 3]),
    /// Four-component vector.
    Vector4([f32; 4]),
    /// Quaternion `(x, y, z, w)`.
    Quaternion([f32; 4]),
    /// RGBA color.
    Color([f32; 4]),
    /// Rectangle `(x, y, width, height)`.
    Rect([f32; 4]),
    /// Bounds `(center, extents)`.
    Bounds {
        /// Box center.
        center: [f32; 3],
        /// Half-size along each axis.
        extents: [f32; 3],
    },
    /// Column-major 4x4 matrix.
    Matrix4([f32; 16]),
    /// Keyframed curve.
    Curve(Curve),
}

impl ScalarValue {
    /// Returns the tag describing this value.
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::Bool(_) => ValueTag::Bool,
            Self::Int(_) => ValueTag::Int,
            Self::Float(_) => ValueTag::Float,
            Self::String(_) => ValueTag::String,
            Self::EnumIndex(_) => ValueTag::EnumIndex,
            Self::Reference(_) => ValueTag::Reference,
            Self::Vector2(_) => ValueTag::Vector2,
            Self::Vector3(_) => ValueTag::Vector3,
            Self::Vector4(_) => ValueTag::Vector4,
            Self::Quaternion(_) => ValueTag::Quaternion,
            Self::Color(_) => ValueTag::Color,
            Self::Rect(_) => ValueTag::Rect,
            Self::Bounds { .. } => ValueTag::Bounds,
            Self::Matrix4(_) => ValueTag::Matrix4,
            Self::Curve(_) => ValueTag::Curve,
        }
    }

    /// Returns the referenced node when this is a non-null reference.
    pub fn as_reference(&self) -> Option<NodeId> {
        match self {
            Self::Reference(target) => *target,
            _ => None,
        }
    }

    /// Default value for `tag`: zero, empty, identity, or null.
    pub fn default_for(tag: ValueTag) -> Self {
        match tag {
            ValueTag::Bool => Self::Bool(false),
            ValueTag::Int => Self::Int(0),
            ValueTag::Float => Self::Float(0.0),
            ValueTag::String => Self::String(String::new()),
            ValueTag::EnumIndex => Self::EnumIndex(0),
            ValueTag::Reference => Self::Reference(None),
            ValueTag::Vector2 => Self::Vector2([0.0; 2]),
            ValueTag::Vector3 => Self::Vector3([0.0; 3]),
            ValueTag::Vector4 => Self::Vector4([0.0; 4]),
            ValueTag::Quaternion => Self::Quaternion([0.0, 0.0, 0.0, 1.0]),
            ValueTag::Color => Self::Color([0.0, 0.0, 0.0, 1.0]),
            ValueTag::Rect => Self::Rect([0.0; 4]),
            ValueTag::Bounds => Self::Bounds {
                center: [0.0; 3],
                extents: [0.0; 3],
            },
            ValueTag::Matrix4 => {
                let mut m = [0.0; 16];
                m[0] = 1.0;
                m[5] = 1.0;
                m[10] = 1.0;
                m[15] = 1.0;
                Self::Matrix4(m)
            }
            ValueTag::Curve => Self::Curve(Curve::default()),
        }
    }
}

/// Homogeneous array attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    /// Declared element tag; `None` when the host container is generic.
    pub element: Option<ValueTag>,
    /// Elements in index order.
    pub items: Vec<ScalarValue>,
}

impl ArrayValue {
    /// Empty array with a declared element tag.
    pub fn empty(element: ValueTag) -> Self {
        Self {
            element: Some(element),
            items: Vec::new(),
        }
    }

    /// Array with a declared element tag and the given items.
    pub fn of(element: ValueTag, items: Vec<ScalarValue>) -> Self {
        Self {
            element: Some(element),
            items,
        }
    }

    /// Element tag, falling back to the first element for generic containers.
    ///
    /// Returns `None` only for an empty generic container.
    pub fn element_tag(&self) -> Option<ValueTag> {
        self.element
            .or_else(|| self.items.first().map(ScalarValue::tag))
    }
}

/// Any attribute value a host can expose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Leaf value.
    Scalar(ScalarValue),
    /// Array of leaf values.
    Array(ArrayValue),
}

impl AttrValue {
    /// Returns the scalar value, if this is not an array.
    pub fn as_scalar(&self) -> Option<&ScalarValue> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Array(_) => None,
        }
    }

    /// Returns the array value, if this is an array.
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(a) => Some(a),
        }
    }
}

impl From<ScalarValue> for AttrValue {
    fn from(v: ScalarValue) -> Self {
        Self::Scalar(v)
    }
}

impl From<ArrayValue> for AttrValue {
    fn from(v: ArrayValue) -> Self {
        Self::Array(v)
    }
}

/// Location of an attribute on an owner object.
///
/// `index` addresses one element of an array attribute; `None` addresses the
/// whole attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttrPath {
    /// Attribute name.
    pub field: String,
    /// Element index within an array attribute.
    pub index: Option<usize>,
}

impl AttrPath {
    /// Path addressing a whole attribute.
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            field: name.into(),
            index: None,
        }
    }

    /// Path addressing one array element.
    pub fn element(name: impl Into<String>, index: usize) -> Self {
        Self {
            field: name.into(),
            index: Some(index),
        }
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            None => f.write_str(&self.field),
            Some(i) => write!(f, "{}[{i}]", self.field),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn default_value_carries_requested_tag() {
        for tag in [
            ValueTag::Bool,
            ValueTag::Int,
            ValueTag::Float,
            ValueTag::String,
            ValueTag::EnumIndex,
            ValueTag::Reference,
            ValueTag::Vector2,
            ValueTag::Vector3,
            ValueTag::Vector4,
            ValueTag::Quaternion,
            ValueTag::Color,
            ValueTag::Rect,
            ValueTag::Bounds,
            ValueTag::Matrix4,
            ValueTag::Curve,
        ] {
            assert_eq!(ScalarValue::default_for(tag).tag(), tag);
        }
    }

    #[test]
    fn generic_array_samples_first_element() {
        let generic = ArrayValue {
            element: None,
            items: vec![ScalarValue::Float(1.0), ScalarValue::Float(2.0)],
        };
        assert_eq!(generic.element_tag(), Some(ValueTag::Float));

        let empty_generic = ArrayValue {
            element: None,
            items: Vec::new(),
        };
        assert_eq!(empty_generic.element_tag(), None);

        assert_eq!(
            ArrayValue::empty(ValueTag::Int).element_tag(),
            Some(ValueTag::Int)
        );
    }

    #[test]
    fn path_display() {
        assert_eq!(AttrPath::field("mass").to_string(), "mass");
        assert_eq!(AttrPath::element("targets", 2).to_string(), "targets[2]");
    }
}
