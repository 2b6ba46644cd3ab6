// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Property tests for blocker resolution over layered requirement graphs.

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]
use proptest::prelude::*;
use proptest::sample::Index;

use subst_core::{
    is_satisfied, plan_blockers, required_types, HostWorld, MemoryWorld, NodeId, PresenceMap,
    TypeId, TypeRegistry, TypeSchema,
};
use subst_dry_tests::{layered_schema, HostFixture, WorldBuilder};

/// `(requirements per type, host composition, victim, replacement)`.
type Scenario = (Vec<Vec<usize>>, Vec<usize>, Index, usize);

fn scenario(max_types: usize, max_nodes: usize) -> impl Strategy<Value = Scenario> {
    (2..max_types).prop_flat_map(move |n| {
        (
            prop::collection::vec(prop::collection::vec(0..n, 0..3), n),
            prop::collection::vec(0..n, 1..max_nodes),
            any::<Index>(),
            0..n,
        )
    })
}

fn build(reqs: &[Vec<usize>], host: &[usize]) -> (MemoryWorld, HostFixture, Vec<TypeId>) {
    let (registry, ids) = layered_schema(reqs);
    let names: Vec<String> = host.iter().map(|i| format!("t{i}")).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let fx = WorldBuilder::new(registry).host("h", &names).build();
    let host = fx.host(0).clone();
    (fx.world, host, ids)
}

fn satisfied(schema: &TypeRegistry, ty: TypeId, presence: &PresenceMap) -> bool {
    required_types(schema, ty)
        .into_iter()
        .all(|r| is_satisfied(schema, r, presence))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn each_pass_removes_exactly_the_unsatisfied_nodes(
        (reqs, composition, victim, replacement) in scenario(7, 10)
    ) {
        let (world, host, ids) = build(&reqs, &composition);
        let victim = host.nodes[victim.index(host.nodes.len())];
        let replacement = ids[replacement];
        let before = world.attached(host.id).unwrap();

        let plan = plan_blockers(&world, host.id, victim, Some(replacement)).unwrap();
        prop_assert_eq!(
            world.attached(host.id).unwrap(),
            before.clone(),
            "planning is pure"
        );

        let schema = world.schema();
        let siblings: Vec<(NodeId, TypeId)> = before
            .iter()
            .filter(|&&n| n != victim)
            .map(|&n| (n, world.type_of(n).unwrap()))
            .collect();
        let last_pass = plan.blockers.iter().map(|b| b.pass).max();
        let passes = last_pass.map_or(0, |p| p + 1);

        for pass in 0..=passes {
            let earlier: Vec<NodeId> = plan
                .blockers
                .iter()
                .filter(|b| b.pass < pass)
                .map(|b| b.node)
                .collect();
            let remaining: Vec<(NodeId, TypeId)> = siblings
                .iter()
                .copied()
                .filter(|(n, _)| !earlier.contains(n))
                .collect();
            let presence = PresenceMap::from_types(
                remaining.iter().map(|&(_, ty)| ty).chain(Some(replacement)),
            );
            let unsatisfied: Vec<NodeId> = remaining
                .iter()
                .filter(|&&(_, ty)| !schema.is_structural(ty) && !satisfied(schema, ty, &presence))
                .map(|&(n, _)| n)
                .collect();
            let marked: Vec<NodeId> = plan
                .blockers
                .iter()
                .filter(|b| b.pass == pass)
                .map(|b| b.node)
                .collect();
            prop_assert_eq!(unsatisfied, marked, "pass {}", pass);
        }

        for blocker in &plan.blockers {
            prop_assert!(!schema.is_structural(blocker.ty));
            prop_assert!(!required_types(schema, blocker.ty).is_empty());
        }
        prop_assert!(plan.blockers.windows(2).all(|w| w[0].pass <= w[1].pass));
    }

    #[test]
    fn types_without_requirements_never_block(
        (reqs, composition, victim, replacement) in scenario(6, 10)
    ) {
        let flat: Vec<Vec<usize>> = reqs.iter().map(|_| Vec::new()).collect();
        let (world, host, ids) = build(&flat, &composition);
        let victim = host.nodes[victim.index(host.nodes.len())];

        let plan = plan_blockers(&world, host.id, victim, Some(ids[replacement])).unwrap();
        prop_assert!(plan.is_empty());
        prop_assert!(plan.unsatisfied.is_empty());
        prop_assert!(plan.replacement_missing.is_empty());

        let removal_only = plan_blockers(&world, host.id, victim, None).unwrap();
        prop_assert!(removal_only.blockers.is_empty());
    }
}

#[test]
fn structural_requirements_are_always_satisfied() {
    use subst_dry_tests::{SchemaBuilder, ROOT_TYPE};
    let registry = SchemaBuilder::new()
        .component("mesh", &[ROOT_TYPE])
        .component("renderer", &["mesh", ROOT_TYPE])
        .build();
    let fx = WorldBuilder::new(registry)
        .without_root()
        .host("h", &["mesh", "renderer"])
        .build();
    let host = fx.host(0);

    let plan = plan_blockers(&fx.world, host.id, host.node(1), None).unwrap();
    assert!(plan.blockers.is_empty());
    assert!(plan.unsatisfied.is_empty());

    let plan = plan_blockers(&fx.world, host.id, host.node(0), None).unwrap();
    assert_eq!(plan.blockers.len(), 1);
    assert_eq!(plan.unsatisfied.len(), 1);
    assert_eq!(
        plan.unsatisfied[0].missing,
        vec![subst_core::make_type_id("mesh")]
    );
}
