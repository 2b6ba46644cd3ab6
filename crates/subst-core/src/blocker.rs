// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Blocker resolution: which siblings must leave while a node is replaced.
//!
//! The resolver models the post-substitution host as a [`PresenceMap`]:
//! every node except the one being removed, plus the replacement type. It then
//! iterates to a fixpoint. Each pass marks every remaining node whose
//! requirements are not all satisfied, removes their types from the multiset,
//! and repeats, because a removal can strand further dependents.
//!
//! Ordering rules:
//! - Nodes marked in the same pass keep host attachment order.
//! - Pass `k` precedes pass `k + 1`. Restoration replays this order, so a
//!   blocker is re-attached after every blocker removed in an earlier pass.
//! - Structural nodes are never candidates, and a type without requirements is
//!   never marked.
use thiserror::Error;
use tracing::debug;

use crate::dependency::{PresenceMap, RequirementTable};
use crate::host::{HostError, HostWorld};
use crate::ident::{HostId, NodeId, TypeId};
use crate::schema::TypeSchema;
use crate::state_bag::{capture, replay, CaptureError, ReplayOutcome, StateBag};

/// A node the resolver decided to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBlocker {
    /// Node to remove.
    pub node: NodeId,
    /// Its type.
    pub ty: TypeId,
    /// Fixpoint pass that marked it (0-based).
    pub pass: usize,
}

/// A node whose requirements stay unmet after the substitution completes.
///
/// These are diagnostics: the engine does not introduce them, it merely
/// cannot repair them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsatisfiedRequirement {
    /// Node identity before the run (blockers get a new identity on restore).
    pub node: NodeId,
    /// Node type.
    pub ty: TypeId,
    /// Required types with no satisfying node in the final host.
    pub missing: Vec<TypeId>,
}

/// Output of [`plan_blockers`]. Computed without mutating the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockerPlan {
    /// Host the plan applies to.
    pub host: HostId,
    /// Node being removed.
    pub removed: NodeId,
    /// Hypothetical replacement type.
    pub replacement: Option<TypeId>,
    /// Blockers in removal order.
    pub blockers: Vec<PlannedBlocker>,
    /// Nodes left unsatisfied in the final host (blockers restored).
    pub unsatisfied: Vec<UnsatisfiedRequirement>,
    /// Requirements of the replacement type itself left unmet.
    pub replacement_missing: Vec<TypeId>,
}

impl BlockerPlan {
    /// Returns `true` when no sibling has to move.
    pub fn is_empty(&self) -> bool {
        self.blockers.is_empty()
    }
}

/// A captured and detached blocker, ready to be restored.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockerSnapshot {
    /// Identity the blocker had before removal.
    pub node: NodeId,
    /// Type to restore. Never changes.
    pub ty: TypeId,
    /// Fixpoint pass that marked it.
    pub pass: usize,
    /// Captured attributes.
    pub state: StateBag,
}

/// Capture stopped part way through; the snapshots taken so far are returned
/// so the caller can restore them.
#[derive(Debug, Error)]
#[error("blocker capture failed after {} snapshot(s): {source}", captured.len())]
pub struct BlockerCaptureError {
    /// Blockers already captured and detached.
    pub captured: Vec<BlockerSnapshot>,
    /// Underlying failure.
    #[source]
    pub source: BlockerStepError,
}

/// Failure of one capture-and-detach step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockerStepError {
    /// The blocker could not be captured.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// The blocker could not be detached.
    #[error(transparent)]
    Detach(#[from] HostError),
}

/// Error returned by [`compute_blockers`].
#[derive(Debug, Error)]
pub enum BlockerError {
    /// Planning failed (unknown host, node not attached).
    #[error(transparent)]
    Plan(#[from] HostError),
    /// Capture failed part way; see [`BlockerCaptureError::captured`].
    #[error(transparent)]
    Capture(#[from] BlockerCaptureError),
}

/// A blocker re-attached after the substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoredBlocker {
    /// Identity before removal.
    pub old_node: NodeId,
    /// Identity after restore.
    pub new_node: NodeId,
    /// Type (unchanged).
    pub ty: TypeId,
    /// Replay diagnostics.
    pub transferred: ReplayOutcome,
}

/// A blocker the host refused to re-attach.
#[derive(Debug, Clone, PartialEq)]
pub struct LostBlocker {
    /// The snapshot that could not be restored.
    pub snapshot: BlockerSnapshot,
    /// Host refusal.
    pub error: HostError,
}

/// Result of [`restore_blockers`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreOutcome {
    /// Blockers re-attached, in restore order.
    pub restored: Vec<RestoredBlocker>,
    /// Blockers the host refused.
    pub lost: Vec<LostBlocker>,
}

/// Computes the blockers for removing `node` from `host`, optionally modelling
/// a node of type `replacement` in its place. Pure: the host is not touched.
///
/// # Errors
/// Returns [`HostError::UnknownHost`] if `host` does not exist, or
/// [`HostError::NodeNotAttached`] if `node` is not on it.
pub fn plan_blockers<W: HostWorld + ?Sized>(
    world: &W,
    host: HostId,
    node: NodeId,
    replacement: Option<TypeId>,
) -> Result<BlockerPlan, HostError> {
    let attached = world.attached(host)?;
    if !attached.contains(&node) {
        return Err(HostError::NodeNotAttached { host, node });
    }
    let schema = world.schema();

    let siblings: Vec<(NodeId, TypeId)> = attached
        .iter()
        .filter(|&&n| n != node)
        .filter_map(|&n| world.type_of(n).map(|ty| (n, ty)))
        .collect();

    let mut presence = PresenceMap::from_types(siblings.iter().map(|&(_, ty)| ty));
    if let Some(ty) = replacement {
        presence.add(ty);
    }
    let table = RequirementTable::build(
        schema,
        siblings.iter().map(|&(_, ty)| ty).chain(replacement),
    );

    let mut removed = vec![false; siblings.len()];
    let mut blockers = Vec::new();
    for pass in 0.. {
        let marked: Vec<usize> = siblings
            .iter()
            .enumerate()
            .filter(|&(i, &(_, ty))| {
                !removed[i]
                    && !schema.is_structural(ty)
                    && !table.all_satisfied(schema, ty, &presence)
            })
            .map(|(i, _)| i)
            .collect();
        if marked.is_empty() {
            break;
        }
        for i in marked {
            let (n, ty) = siblings[i];
            removed[i] = true;
            presence.remove(ty);
            blockers.push(PlannedBlocker { node: n, ty, pass });
        }
    }

    // Final host: blockers come back, the replacement stays.
    for blocker in &blockers {
        presence.add(blocker.ty);
    }
    let unsatisfied = siblings
        .iter()
        .filter(|&&(_, ty)| !schema.is_structural(ty))
        .filter_map(|&(n, ty)| {
            let missing = table.missing(schema, ty, &presence);
            (!missing.is_empty()).then_some(UnsatisfiedRequirement {
                node: n,
                ty,
                missing,
            })
        })
        .collect();
    let replacement_missing =
        replacement.map_or_else(Vec::new, |ty| table.missing(schema, ty, &presence));

    debug!(
        %host,
        %node,
        blockers = blockers.len(),
        "blocker fixpoint reached"
    );
    Ok(BlockerPlan {
        host,
        removed: node,
        replacement,
        blockers,
        unsatisfied,
        replacement_missing,
    })
}

/// Captures then detaches every planned blocker, in plan order.
///
/// # Errors
/// Stops at the first blocker that cannot be captured or detached. The
/// returned [`BlockerCaptureError`] holds the snapshots already taken; those
/// blockers are detached and must be restored by the caller.
pub fn capture_blockers<W: HostWorld + ?Sized>(
    world: &mut W,
    plan: &BlockerPlan,
    deny_list: &[String],
) -> Result<Vec<BlockerSnapshot>, BlockerCaptureError> {
    let mut captured = Vec::with_capacity(plan.blockers.len());
    for blocker in &plan.blockers {
        match capture_one(world, plan.host, blocker, deny_list) {
            Ok(snapshot) => captured.push(snapshot),
            Err(source) => return Err(BlockerCaptureError { captured, source }),
        }
    }
    Ok(captured)
}

fn capture_one<W: HostWorld + ?Sized>(
    world: &mut W,
    host: HostId,
    blocker: &PlannedBlocker,
    deny_list: &[String],
) -> Result<BlockerSnapshot, BlockerStepError> {
    let state = capture(world, blocker.node, deny_list)?;
    world.detach(host, blocker.node)?;
    debug!(%host, node = %blocker.node, pass = blocker.pass, "blocker detached");
    Ok(BlockerSnapshot {
        node: blocker.node,
        ty: blocker.ty,
        pass: blocker.pass,
        state,
    })
}

/// Plans, captures and detaches the blockers for removing `node`.
///
/// Returns the plan alongside the snapshots in removal order.
///
/// # Errors
/// Returns [`BlockerError::Plan`] before any mutation, or
/// [`BlockerError::Capture`] part way through capture (see
/// [`capture_blockers`]).
pub fn compute_blockers<W: HostWorld + ?Sized>(
    world: &mut W,
    host: HostId,
    node: NodeId,
    replacement: Option<TypeId>,
    deny_list: &[String],
) -> Result<(BlockerPlan, Vec<BlockerSnapshot>), BlockerError> {
    let plan = plan_blockers(world, host, node, replacement)?;
    let snapshots = capture_blockers(world, &plan, deny_list)?;
    Ok((plan, snapshots))
}

/// Re-attaches every snapshot to `host` in order and replays its state.
///
/// A refused attach does not stop the remaining restores.
pub fn restore_blockers<W: HostWorld + ?Sized>(
    world: &mut W,
    host: HostId,
    snapshots: Vec<BlockerSnapshot>,
) -> RestoreOutcome {
    let mut outcome = RestoreOutcome::default();
    for snapshot in snapshots {
        match world.attach(host, snapshot.ty) {
            Ok(new_node) => {
                let transferred = replay(world, &snapshot.state, new_node);
                debug!(%host, old = %snapshot.node, new = %new_node, "blocker restored");
                outcome.restored.push(RestoredBlocker {
                    old_node: snapshot.node,
                    new_node,
                    ty: snapshot.ty,
                    transferred,
                });
            }
            Err(error) => outcome.lost.push(LostBlocker { snapshot, error }),
        }
    }
    outcome
}
