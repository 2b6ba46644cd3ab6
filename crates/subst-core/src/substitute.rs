// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Substitution orchestrator.
//!
//! Replaces one node on a host with a fresh node of another type. A run moves
//! through [`SubstitutionPhase`] strictly in order:
//!
//! 1. `ReferencesScanned`: inbound references to the node (and, by default,
//!    to every planned blocker) are indexed.
//! 2. `BlockersCaptured`: siblings whose requirements the replacement would
//!    break are captured and detached.
//! 3. `PrimaryDetached` / `ReplacementAttached`: the old node leaves and a
//!    node of the target type is attached to the same host.
//! 4. `StateTransferred`: the old node's state bag is replayed onto the new
//!    node, best effort.
//! 5. `BlockersRestored`: blockers are re-attached in capture order and their
//!    state replayed.
//! 6. `ReferencesRewired`: indexed references are redirected to the new
//!    identities.
//!
//! Validation happens before any mutation. A failure after that point rolls
//! the run back: blockers captured so far are re-attached and references to
//! them are redirected to their new identities (see [`Rollback`]). When the
//! host refuses the replacement type, the error also carries the old node's
//! state bag; the old node's detachment is the one side effect that survives
//! the failed run.
use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::blocker::{
    capture_blockers, plan_blockers, restore_blockers, BlockerPlan, BlockerSnapshot,
    BlockerStepError, LostBlocker, PlannedBlocker, RestoreOutcome, RestoredBlocker,
    UnsatisfiedRequirement,
};
use crate::config::SubstitutionConfig;
use crate::host::{HostError, HostWorld};
use crate::ident::{HostId, NodeId, ObjectRef, TypeId};
use crate::reference::{rewrite, ReferenceIndex, RewriteOutcome};
use crate::schema::TypeSchema;
use crate::state_bag::{capture, replay, CaptureError, ReplayOutcome, StateBag};

/// Linear state machine of one substitution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubstitutionPhase {
    /// Nothing done yet.
    Idle,
    /// Inbound references indexed.
    ReferencesScanned,
    /// Blockers captured and detached.
    BlockersCaptured,
    /// Old node detached.
    PrimaryDetached,
    /// Replacement node attached.
    ReplacementAttached,
    /// Old state replayed onto the replacement.
    StateTransferred,
    /// Blockers re-attached.
    BlockersRestored,
    /// References redirected.
    ReferencesRewired,
    /// Run complete.
    Done,
}

impl SubstitutionPhase {
    /// The phase that follows this one. `Done` is terminal.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::ReferencesScanned,
            Self::ReferencesScanned => Self::BlockersCaptured,
            Self::BlockersCaptured => Self::PrimaryDetached,
            Self::PrimaryDetached => Self::ReplacementAttached,
            Self::ReplacementAttached => Self::StateTransferred,
            Self::StateTransferred => Self::BlockersRestored,
            Self::BlockersRestored => Self::ReferencesRewired,
            Self::ReferencesRewired | Self::Done => Self::Done,
        }
    }

    fn advance(&mut self, host: HostId) {
        let next = self.next();
        debug!(%host, from = %self, to = %next, "substitution phase");
        *self = next;
    }
}

impl fmt::Display for SubstitutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionReport {
    /// Host the run mutated.
    pub host: HostId,
    /// Replaced node (no longer attached).
    pub old_node: NodeId,
    /// Replacement node.
    pub new_node: NodeId,
    /// Type of the replaced node.
    pub from_type: TypeId,
    /// Type of the replacement.
    pub to_type: TypeId,
    /// State transfer diagnostics for the primary node.
    pub transferred: ReplayOutcome,
    /// Blockers removed and re-attached, in restore order.
    pub blockers: Vec<RestoredBlocker>,
    /// Blockers the host refused to re-attach.
    pub lost_blockers: Vec<LostBlocker>,
    /// Nodes whose requirements remain unmet after the run.
    pub unsatisfied: Vec<UnsatisfiedRequirement>,
    /// Requirements of the replacement type left unmet.
    pub replacement_missing: Vec<TypeId>,
    /// Reference rewiring counts (primary and blockers together).
    pub references: RewriteOutcome,
}

impl SubstitutionReport {
    /// Maps a pre-run identity to its post-run identity, if it changed.
    pub fn renamed(&self, old: NodeId) -> Option<NodeId> {
        if old == self.old_node {
            return Some(self.new_node);
        }
        self.blockers
            .iter()
            .find(|b| b.old_node == old)
            .map(|b| b.new_node)
    }
}

/// Dry-run result of [`Substitutor::preview`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionPlan {
    /// Blockers that would be removed, in removal order.
    pub blockers: Vec<PlannedBlocker>,
    /// Nodes that would remain unsatisfied.
    pub unsatisfied: Vec<UnsatisfiedRequirement>,
    /// Requirements of the replacement type that would stay unmet.
    pub replacement_missing: Vec<TypeId>,
    /// Inbound references to the node in the configured universe.
    pub references: usize,
}

/// What an aborted run undid before returning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rollback {
    /// Blockers re-attached, and those the host refused.
    pub restore: RestoreOutcome,
    /// References to the re-attached blockers, redirected to their new
    /// identities. Empty when `rewire_blocker_references` is off.
    pub references: RewriteOutcome,
}

/// Errors surfaced by a substitution run.
#[derive(Debug, Error)]
pub enum SubstitutionError {
    /// Invalid input; raised before any mutation.
    #[error("invalid substitution: {0}")]
    Invalid(#[from] HostError),
    /// The primary node could not be captured; the run was rolled back.
    #[error("capture of {node} failed: {source}")]
    Capture {
        /// Primary node.
        node: NodeId,
        /// Underlying failure.
        source: CaptureError,
        /// Rollback performed before returning.
        rollback: Box<Rollback>,
    },
    /// A blocker could not be captured or detached; blockers captured so far
    /// were rolled back.
    #[error("blocker capture on host {host} failed: {source}")]
    BlockerCapture {
        /// Host.
        host: HostId,
        /// Underlying failure.
        source: Box<BlockerStepError>,
        /// Rollback performed before returning.
        rollback: Box<Rollback>,
    },
    /// The primary node could not be detached; the run was rolled back.
    #[error("detach of {node} from host {host} failed: {source}")]
    Detach {
        /// Host.
        host: HostId,
        /// Primary node.
        node: NodeId,
        /// Host refusal.
        source: Box<HostError>,
        /// Rollback performed before returning.
        rollback: Box<Rollback>,
    },
    /// The host refused to attach the replacement type.
    ///
    /// The old node stays detached. Its captured state is returned so the
    /// caller can re-create it; blockers were rolled back.
    #[error("attach of type {ty} to host {host} failed: {source}")]
    AttachFailed {
        /// Host.
        host: HostId,
        /// Replacement type.
        ty: TypeId,
        /// Host refusal.
        source: Box<HostError>,
        /// State of the detached primary node.
        primary_state: Box<StateBag>,
        /// Rollback performed before returning.
        rollback: Box<Rollback>,
    },
}

impl SubstitutionError {
    /// Last phase the run completed before aborting.
    pub fn aborted_after(&self) -> SubstitutionPhase {
        match self {
            Self::Invalid(_) => SubstitutionPhase::Idle,
            Self::BlockerCapture { .. } => SubstitutionPhase::ReferencesScanned,
            Self::Capture { .. } | Self::Detach { .. } => SubstitutionPhase::BlockersCaptured,
            Self::AttachFailed { .. } => SubstitutionPhase::PrimaryDetached,
        }
    }

    /// The rollback the run performed, if it got far enough to need one.
    pub fn rollback(&self) -> Option<&Rollback> {
        match self {
            Self::Invalid(_) => None,
            Self::Capture { rollback, .. }
            | Self::BlockerCapture { rollback, .. }
            | Self::Detach { rollback, .. }
            | Self::AttachFailed { rollback, .. } => Some(rollback.as_ref()),
        }
    }
}

/// Batch substitution stopped at a fatal error.
#[derive(Debug, Error)]
#[error("batch substitution stopped after {} run(s): {source}", completed.len())]
pub struct BatchError {
    /// Runs completed before the failure.
    pub completed: Vec<SubstitutionReport>,
    /// The failure.
    #[source]
    pub source: Box<SubstitutionError>,
}

/// Collaborator notified after each completed substitution (for example a
/// source rewriter that renames the type in scripts).
pub trait SubstitutionHook {
    /// Called once per run, after `Done`.
    fn after_substitution(&mut self, report: &SubstitutionReport);
}

/// Drives substitution runs against a [`HostWorld`].
pub struct Substitutor {
    config: SubstitutionConfig,
    hooks: Vec<Box<dyn SubstitutionHook>>,
}

impl Default for Substitutor {
    fn default() -> Self {
        Self::new(SubstitutionConfig::default())
    }
}

impl fmt::Debug for Substitutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Substitutor")
            .field("config", &self.config)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Substitutor {
    /// Creates a substitutor with `config` and no hooks.
    pub fn new(config: SubstitutionConfig) -> Self {
        Self {
            config,
            hooks: Vec::new(),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &SubstitutionConfig {
        &self.config
    }

    /// Registers a post-substitution hook.
    pub fn add_hook(&mut self, hook: Box<dyn SubstitutionHook>) {
        self.hooks.push(hook);
    }

    /// Computes what [`Self::substitute`] would do, without mutating anything.
    ///
    /// # Errors
    /// Returns [`SubstitutionError::Invalid`] for the inputs
    /// [`Self::substitute`] would reject.
    pub fn preview<W: HostWorld + ?Sized>(
        &self,
        world: &W,
        host: HostId,
        node: NodeId,
        target: TypeId,
    ) -> Result<SubstitutionPlan, SubstitutionError> {
        validate(world, host, node, target)?;
        let plan = plan_blockers(world, host, node, Some(target))?;
        let references = ReferenceIndex::build(world, self.config.universe, &[node]).len();
        Ok(SubstitutionPlan {
            blockers: plan.blockers,
            unsatisfied: plan.unsatisfied,
            replacement_missing: plan.replacement_missing,
            references,
        })
    }

    /// Replaces `node` on `host` with a fresh node of type `target`.
    ///
    /// # Errors
    /// - [`SubstitutionError::Invalid`] when the host is unknown, the node is
    ///   not attached to it or is structural, or `target` is unknown or
    ///   abstract. Nothing has been mutated.
    /// - [`SubstitutionError::BlockerCapture`], [`SubstitutionError::Capture`]
    ///   or [`SubstitutionError::Detach`] when the host refuses part of the
    ///   removal. The run is rolled back and the node stays attached.
    /// - [`SubstitutionError::AttachFailed`] when the host refuses `target`.
    ///   The run is rolled back but the node stays detached.
    #[instrument(skip(self, world))]
    pub fn substitute<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        host: HostId,
        node: NodeId,
        target: TypeId,
    ) -> Result<SubstitutionReport, SubstitutionError> {
        let from_type = validate(world, host, node, target)?;
        let plan = plan_blockers(world, host, node, Some(target))?;

        let mut run = Run::scan(&self.config, world, &plan);
        run.take_blockers(world, &plan)?;
        let primary_state = run.detach_primary(world)?;
        let (new_node, transferred) = run.attach_replacement(world, target, primary_state)?;
        let restore = run.reattach_blockers(world);
        run.phase.advance(host);
        let references = run.rewire(world, new_node, &restore);

        let report = SubstitutionReport {
            host,
            old_node: node,
            new_node,
            from_type,
            to_type: target,
            transferred,
            blockers: restore.restored,
            lost_blockers: restore.lost,
            unsatisfied: plan.unsatisfied,
            replacement_missing: plan.replacement_missing,
            references,
        };
        run.phase.advance(host);
        debug_assert_eq!(run.phase, SubstitutionPhase::Done);

        info!(
            %host,
            old = %node,
            new = %new_node,
            applied = report.transferred.applied,
            skipped = report.transferred.skipped,
            blockers = report.blockers.len(),
            rewired = report.references.rewritten,
            "substitution complete"
        );
        for hook in &mut self.hooks {
            hook.after_substitution(&report);
        }
        Ok(report)
    }

    /// Replaces every node of exactly type `from` on every host with `to`.
    ///
    /// Hosts are visited in the world's order and nodes in attachment order.
    /// Nodes that were re-attached as blockers by an earlier run are followed
    /// to their new identity.
    ///
    /// # Errors
    /// Stops at the first fatal error. [`BatchError::completed`] holds the
    /// reports of the runs that finished before it.
    #[instrument(skip(self, world))]
    pub fn substitute_all<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        from: TypeId,
        to: TypeId,
    ) -> Result<Vec<SubstitutionReport>, BatchError> {
        let mut completed = Vec::new();
        if from == to {
            return Ok(completed);
        }
        for host in world.hosts() {
            let attached = match world.attached(host) {
                Ok(nodes) => nodes,
                Err(e) => {
                    return Err(BatchError {
                        completed,
                        source: Box::new(SubstitutionError::Invalid(e)),
                    })
                }
            };
            let targets: Vec<NodeId> = attached
                .into_iter()
                .filter(|&n| world.type_of(n) == Some(from))
                .collect();

            let mut renamed: FxHashMap<NodeId, NodeId> = FxHashMap::default();
            for original in targets {
                let mut current = original;
                while let Some(&next) = renamed.get(&current) {
                    current = next;
                }
                if world.host_of(current) != Some(host) || world.type_of(current) != Some(from) {
                    continue;
                }
                match self.substitute(world, host, current, to) {
                    Ok(report) => {
                        for blocker in &report.blockers {
                            renamed.insert(blocker.old_node, blocker.new_node);
                        }
                        completed.push(report);
                    }
                    Err(source) => {
                        return Err(BatchError {
                            completed,
                            source: Box::new(source),
                        })
                    }
                }
            }
        }
        info!(runs = completed.len(), "batch substitution complete");
        Ok(completed)
    }
}

/// One in-flight run: the phase reached so far, the reference index, and the
/// blockers that must come back whether the run completes or aborts.
struct Run<'a> {
    config: &'a SubstitutionConfig,
    host: HostId,
    node: NodeId,
    phase: SubstitutionPhase,
    index: ReferenceIndex,
    snapshots: Vec<BlockerSnapshot>,
}

impl<'a> Run<'a> {
    /// Indexes inbound references to the node and, when configured, to every
    /// planned blocker.
    fn scan<W: HostWorld + ?Sized>(
        config: &'a SubstitutionConfig,
        world: &W,
        plan: &BlockerPlan,
    ) -> Self {
        let mut targets = vec![plan.removed];
        if config.rewire_blocker_references {
            targets.extend(plan.blockers.iter().map(|b| b.node));
        }
        let mut run = Self {
            config,
            host: plan.host,
            node: plan.removed,
            phase: SubstitutionPhase::Idle,
            index: ReferenceIndex::build(world, config.universe, &targets),
            snapshots: Vec::new(),
        };
        run.phase.advance(run.host);
        run
    }

    fn take_blockers<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        plan: &BlockerPlan,
    ) -> Result<(), SubstitutionError> {
        match capture_blockers(world, plan, &self.config.deny_list) {
            Ok(snapshots) => self.snapshots = snapshots,
            Err(err) => {
                self.snapshots = err.captured;
                return Err(SubstitutionError::BlockerCapture {
                    host: self.host,
                    source: Box::new(err.source),
                    rollback: Box::new(self.rollback(world)),
                });
            }
        }
        self.phase.advance(self.host);
        Ok(())
    }

    fn detach_primary<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
    ) -> Result<StateBag, SubstitutionError> {
        let (host, node) = (self.host, self.node);
        let state = match capture(world, node, &self.config.deny_list) {
            Ok(bag) => bag,
            Err(source) => {
                return Err(SubstitutionError::Capture {
                    node,
                    source,
                    rollback: Box::new(self.rollback(world)),
                });
            }
        };
        if let Err(source) = world.detach(host, node) {
            return Err(SubstitutionError::Detach {
                host,
                node,
                source: Box::new(source),
                rollback: Box::new(self.rollback(world)),
            });
        }
        self.phase.advance(host);
        Ok(state)
    }

    /// Attaches the replacement and replays the old node's state onto it.
    fn attach_replacement<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        target: TypeId,
        mut state: StateBag,
    ) -> Result<(NodeId, ReplayOutcome), SubstitutionError> {
        let (host, node) = (self.host, self.node);
        let new_node = match world.attach(host, target) {
            Ok(id) => id,
            Err(source) => {
                warn!(%host, ty = %target, %source, "replacement attach failed");
                return Err(SubstitutionError::AttachFailed {
                    host,
                    ty: target,
                    source: Box::new(source),
                    primary_state: Box::new(state),
                    rollback: Box::new(self.rollback(world)),
                });
            }
        };
        self.phase.advance(host);

        state.remap_references(node, new_node);
        let transferred = replay(world, &state, new_node);
        self.index
            .retarget_owner(ObjectRef::Node(node), ObjectRef::Node(new_node));
        for snapshot in &mut self.snapshots {
            snapshot.state.remap_references(node, new_node);
        }
        self.phase.advance(host);
        Ok((new_node, transferred))
    }

    /// Re-attaches captured blockers in capture order and moves the index
    /// records they own onto their new identities.
    fn reattach_blockers<W: HostWorld + ?Sized>(&mut self, world: &mut W) -> RestoreOutcome {
        let restore = restore_blockers(world, self.host, std::mem::take(&mut self.snapshots));
        for restored in &restore.restored {
            self.index.retarget_owner(
                ObjectRef::Node(restored.old_node),
                ObjectRef::Node(restored.new_node),
            );
        }
        for lost in &restore.lost {
            warn!(
                host = %self.host,
                node = %lost.snapshot.node,
                error = %lost.error,
                "blocker could not be restored"
            );
        }
        restore
    }

    /// Redirects indexed references to each restored blocker. The index only
    /// holds blocker records when `rewire_blocker_references` is on.
    fn rewire_blockers<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        restore: &RestoreOutcome,
    ) -> RewriteOutcome {
        let mut outcome = RewriteOutcome::default();
        for restored in &restore.restored {
            let records = self.index.take(restored.old_node);
            outcome = outcome.merge(rewrite(world, &records, restored.new_node));
        }
        outcome
    }

    fn rewire<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        new_node: NodeId,
        restore: &RestoreOutcome,
    ) -> RewriteOutcome {
        let primary = rewrite(world, &self.index.take(self.node), new_node);
        let references = primary.merge(self.rewire_blockers(world, restore));
        if references.skipped > 0 {
            warn!(
                host = %self.host,
                skipped = references.skipped,
                "some references could not be rewired"
            );
        }
        self.phase.advance(self.host);
        references
    }

    /// Undoes blocker removal after a failed phase.
    fn rollback<W: HostWorld + ?Sized>(&mut self, world: &mut W) -> Rollback {
        let restore = self.reattach_blockers(world);
        let references = self.rewire_blockers(world, &restore);
        warn!(
            host = %self.host,
            node = %self.node,
            phase = %self.phase,
            restored = restore.restored.len(),
            lost = restore.lost.len(),
            rewired = references.rewritten,
            "substitution rolled back"
        );
        Rollback {
            restore,
            references,
        }
    }
}

/// Rejects invalid input before any mutation; returns the node's type.
fn validate<W: HostWorld + ?Sized>(
    world: &W,
    host: HostId,
    node: NodeId,
    target: TypeId,
) -> Result<TypeId, HostError> {
    if !world.contains_host(host) {
        return Err(HostError::UnknownHost(host));
    }
    if !world.attached(host)?.contains(&node) {
        return Err(HostError::NodeNotAttached { host, node });
    }
    let schema = world.schema();
    if !schema.contains(target) {
        return Err(HostError::UnknownType(target));
    }
    if schema.is_abstract(target) {
        return Err(HostError::AbstractType(target));
    }
    let from_type = world
        .type_of(node)
        .ok_or(HostError::NodeNotAttached { host, node })?;
    if schema.is_structural(from_type) {
        return Err(HostError::StructuralNode(node));
    }
    Ok(from_type)
}
