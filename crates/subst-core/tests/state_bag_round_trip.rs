// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Capture-then-replay onto a fresh node of the same type is lossless.

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]
use subst_core::{
    capture_state, make_type_id, replay_state, ArrayValue, AttrValue, AttributeSpec, Curve,
    HostWorld, Keyframe, MemoryWorld, ObjectRef, ScalarValue, StateBag, TypeDescriptor, ValueTag,
    WrapMode, DEFAULT_DENY_LIST,
};
use subst_dry_tests::SchemaBuilder;

fn every_tag_schema() -> MemoryWorld {
    let mut desc = TypeDescriptor::new("kitchen_sink");
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
        desc = desc
            .attribute(AttributeSpec::new(format!("s_{tag}"), ScalarValue::default_for(tag)))
            .attribute(AttributeSpec::new(format!("a_{tag}"), ArrayValue::empty(tag)));
    }
    desc = desc
        .attribute(AttributeSpec::new(
            "generic",
            ArrayValue {
                element: None,
                items: Vec::new(),
            },
        ))
        .attribute(AttributeSpec::new("hide_flags", ScalarValue::Int(0)));
    MemoryWorld::new(SchemaBuilder::new().with(desc).build())
}

fn sample(tag: ValueTag, seed: f32, peer: subst_core::NodeId) -> ScalarValue {
    match tag {
        ValueTag::Bool => ScalarValue::Bool(true),
        ValueTag::Int => ScalarValue::Int(-7),
        ValueTag::Float => ScalarValue::Float(f64::from(seed) * 1.5),
        ValueTag::String => ScalarValue::String(format!("value-{seed}")),
        ValueTag::EnumIndex => ScalarValue::EnumIndex(4),
        ValueTag::Reference => ScalarValue::Reference(Some(peer)),
        ValueTag::Vector2 => ScalarValue::Vector2([seed, 2.0]),
        ValueTag::Vector3 => ScalarValue::Vector3([seed, 2.0, 3.0]),
        ValueTag::Vector4 => ScalarValue::Vector4([seed, 2.0, 3.0, 4.0]),
        ValueTag::Quaternion => ScalarValue::Quaternion([0.0, seed, 0.0, 1.0]),
        ValueTag::Color => ScalarValue::Color([seed, 0.5, 0.25, 1.0]),
        ValueTag::Rect => ScalarValue::Rect([0.0, 0.0, seed, 9.0]),
        ValueTag::Bounds => ScalarValue::Bounds {
            center: [seed; 3],
            extents: [0.5; 3],
        },
        ValueTag::Matrix4 => ScalarValue::Matrix4([seed; 16]),
        ValueTag::Curve => ScalarValue::Curve(Curve {
            keys: vec![
                Keyframe {
                    time: 0.0,
                    value: seed,
                    in_tangent: 0.0,
                    out_tangent: 1.0,
                },
                Keyframe {
                    time: 1.0,
                    value: 2.0,
                    in_tangent: 1.0,
                    out_tangent: 0.0,
                },
            ],
            pre_wrap: WrapMode::Loop,
            post_wrap: WrapMode::PingPong,
        }),
    }
}

fn visible_state(world: &MemoryWorld, node: subst_core::NodeId) -> Vec<(String, AttrValue)> {
    world
        .attribute_paths(ObjectRef::Node(node))
        .unwrap()
        .into_iter()
        .filter(|p| p.field != "hide_flags")
        .map(|p| {
            let value = world.read_attribute(ObjectRef::Node(node), &p).unwrap();
            (p.field, value)
        })
        .collect()
}

#[test]
fn same_type_round_trip_reproduces_every_attribute() {
    let mut world = every_tag_schema();
    let ty = make_type_id("kitchen_sink");
    let host = world.create_host("h");
    let peer = world.attach(host, ty).unwrap();
    let source = world.attach(host, ty).unwrap();
    let obj = ObjectRef::Node(source);

    for (path, seed) in world
        .attribute_paths(obj)
        .unwrap()
        .into_iter()
        .zip((0_u16..).map(f32::from))
    {
        let Ok(AttrValue::Scalar(current)) = world.read_attribute(obj, &path) else {
            continue;
        };
        let value = sample(current.tag(), seed, peer);
        world.write_attribute(obj, &path, value.into()).unwrap();
    }
    for tag in [
        ValueTag::Int,
        ValueTag::Reference,
        ValueTag::Curve,
        ValueTag::Color,
    ] {
        let items = [0.0, 1.0, 2.0].map(|seed| sample(tag, seed, peer)).to_vec();
        world
            .set(obj, &format!("a_{tag}"), ArrayValue::of(tag, items))
            .unwrap();
    }
    world
        .set(
            obj,
            "generic",
            ArrayValue {
                element: None,
                items: vec![ScalarValue::Float(1.0), ScalarValue::Float(2.0)],
            },
        )
        .unwrap();

    let deny: Vec<String> = DEFAULT_DENY_LIST.iter().map(|s| (*s).to_owned()).collect();
    let bag = capture_state(&world, source, &deny).expect("capture");
    let dest = world.attach(host, ty).unwrap();
    let outcome = replay_state(&mut world, &bag, dest);

    assert_eq!(outcome.skipped, 0);
    assert_eq!(outcome.applied, bag.len());
    assert_eq!(visible_state(&world, dest), visible_state(&world, source));
}

#[test]
fn recorded_empty_array_empties_the_destination() {
    let mut world = every_tag_schema();
    let ty = make_type_id("kitchen_sink");
    let host = world.create_host("h");
    let source = world.attach(host, ty).unwrap();
    let dest = world.attach(host, ty).unwrap();
    world
        .set(
            ObjectRef::Node(dest),
            "a_Int",
            ArrayValue::of(
                ValueTag::Int,
                vec![ScalarValue::Int(1), ScalarValue::Int(2)],
            ),
        )
        .unwrap();

    let bag = capture_state(&world, source, &[]).unwrap();
    replay_state(&mut world, &bag, dest);

    assert_eq!(
        world.get(ObjectRef::Node(dest), "a_Int"),
        Some(&AttrValue::Array(ArrayValue::empty(ValueTag::Int)))
    );
}

#[test]
fn state_bags_serialize_for_recovery() {
    let mut world = every_tag_schema();
    let ty = make_type_id("kitchen_sink");
    let host = world.create_host("h");
    let node = world.attach(host, ty).unwrap();
    let bag = capture_state(&world, node, &[]).unwrap();

    let json = serde_json::to_string(&bag).unwrap();
    let back: StateBag = serde_json::from_str(&json).unwrap();
    assert_eq!(back, bag);
}
