// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fixtures for substitution engine tests.
//!
//! - [`config`]: [`InMemoryConfigStore`], a config store fake with call
//!   counters and failure toggles.
//! - [`hooks`]: [`RecordingHook`].
//! - [`schema`]: named component schemas and synthetic layered requirement
//!   graphs.
//! - [`trace`]: a `RUST_LOG`-aware subscriber that writes through the test
//!   harness.
//! - [`world`]: `MemoryWorld` builders with labelled hosts.
#![forbid(unsafe_code)]

pub mod config;
pub mod hooks;
pub mod schema;
pub mod trace;
pub mod world;

pub use config::InMemoryConfigStore;
pub use hooks::RecordingHook;
pub use schema::{layered_schema, SchemaBuilder, ROOT_TYPE};
pub use trace::init_tracing;
pub use world::{HostFixture, WorldBuilder, WorldFixture};
