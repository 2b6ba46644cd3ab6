// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! subst-core: component substitution engine.
//!
//! Replaces a component node attached to a host with a fresh node of another
//! type, carrying over whatever state is compatible, temporarily removing
//! siblings whose declared requirements would otherwise break, and redirecting
//! every inbound reference to the new identity.
//!
//! The engine owns no storage. Hosts, nodes, attributes and reference owners
//! are reached through the [`HostWorld`] capability; [`MemoryWorld`] is an
//! in-memory implementation.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod blocker;
mod config;
mod dependency;
mod host;
mod ident;
mod reference;
mod schema;
mod state_bag;
mod substitute;
mod value;
mod world;

/// Blocker resolution: fixpoint planning, capture and restore.
pub use blocker::{
    capture_blockers, compute_blockers, plan_blockers, restore_blockers, BlockerCaptureError,
    BlockerError, BlockerPlan, BlockerSnapshot, BlockerStepError, LostBlocker, PlannedBlocker,
    RestoreOutcome, RestoredBlocker, UnsatisfiedRequirement,
};
/// Substitution settings and the storage port they load from.
pub use config::{ConfigError, ConfigStore, SubstitutionConfig, DEFAULT_DENY_LIST};
/// Requirement queries over a schema.
pub use dependency::{is_satisfied, is_subtype, required_types, PresenceMap, RequirementTable};
/// Host capability interface.
pub use host::{AttrError, HostError, HostWorld, UniverseKind};
/// Stable identifiers.
pub use ident::{
    derive_node_id, make_asset_id, make_host_id, make_node_id, make_type_id, AssetId, Hash,
    HostId, NodeId, ObjectRef, TypeId,
};
/// Reference index and rewriter.
pub use reference::{
    rewrite as rewrite_references, scan as scan_references, ReferenceIndex, ReferenceRecord,
    RewriteOutcome,
};
/// Component type schema.
pub use schema::{AttributeSpec, RegistryError, TypeDescriptor, TypeRegistry, TypeSchema};
/// State bag capture and replay.
pub use state_bag::{
    capture as capture_state, replay as replay_state, ArrayRecord, CaptureError, ReplayOutcome,
    ScalarRecord, StateBag,
};
/// Orchestrator.
pub use substitute::{
    BatchError, Rollback, SubstitutionError, SubstitutionHook, SubstitutionPhase,
    SubstitutionPlan, SubstitutionReport, Substitutor,
};
/// Tagged attribute values.
pub use value::{ArrayValue, AttrPath, AttrValue, Curve, Keyframe, ScalarValue, ValueTag, WrapMode};
/// In-memory host world.
pub use world::MemoryWorld;
