//! Target-driven subdivision
//!
//! Refines the mesh around a target point. Each pass visits every leaf:
//! - split pass: a leaf whose face contains the target is split, along
//!   with whatever keeps the mesh conforming
//! - merge pass: a leaf merges when neither face of its diamond parent
//!   contains the target
//!
//! [`Subdivision::step`] alternates the two, one pass per call, so the
//! mesh follows a moving target.

mod face;

pub use crate::leb::Mode;
pub use face::{Face, ROOT_X, ROOT_Y};

use glam::Vec2;
use tracing::debug;

use crate::config::SubdivisionConfig;
use crate::executor::TreeExecutor;
use crate::leb::{merge_diamond, split_conforming};
use crate::tree::{Node, PassReport, Updater};

/// Kind of update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Refine leaves containing the target
    Split,
    /// Coarsen diamonds away from the target
    Merge,
}

/// Split/merge decisions around a target point.
#[derive(Debug, Clone, PartialEq)]
pub struct Subdivision {
    mode: Mode,
    target: Vec2,
    pass_counter: u64,
}

impl Subdivision {
    /// Decisions for `mode` around `target`.
    pub fn new(mode: Mode, target: Vec2) -> Self {
        Self {
            mode,
            target,
            pass_counter: 0,
        }
    }

    /// Decisions described by a run configuration.
    pub fn from_config(config: &SubdivisionConfig) -> Self {
        Self::new(config.mode, Vec2::from_array(config.target))
    }

    /// Subdivision scheme.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current target.
    pub fn target(&self) -> Vec2 {
        self.target
    }

    /// Move the target; later passes follow it.
    pub fn set_target(&mut self, target: Vec2) {
        self.target = target;
    }

    /// Passes run through [`step`](Self::step).
    pub fn pass_counter(&self) -> u64 {
        self.pass_counter
    }

    /// Kind of the next [`step`](Self::step).
    pub fn next_pass(&self) -> StepKind {
        if self.pass_counter % 2 == 0 {
            StepKind::Split
        } else {
            StepKind::Merge
        }
    }

    /// Face of `node`.
    pub fn face(&self, node: Node) -> Face {
        Face::of_node(node, self.mode)
    }

    /// Check if `node` should be split.
    ///
    /// Nodes above the coarsest faces (the square root) always split.
    pub fn wants_split(&self, node: Node) -> bool {
        node.depth < self.mode.base_depth() || self.face(node).contains(self.target)
    }

    /// Check if `node` may merge: neither diamond face holds the target.
    pub fn wants_merge(&self, node: Node) -> bool {
        if node.depth <= self.mode.base_depth() {
            return false;
        }
        let diamond = self.mode.diamond_parent(node);
        !self.face(diamond.base).contains(self.target)
            && !self.face(diamond.top).contains(self.target)
    }

    /// Split decision for one leaf.
    pub fn split_callback(&self, updater: &mut Updater<'_>, node: Node) {
        if self.wants_split(node) {
            split_conforming(updater, node, self.mode);
        }
    }

    /// Merge decision for one leaf.
    pub fn merge_callback(&self, updater: &mut Updater<'_>, node: Node) {
        if self.wants_merge(node) {
            merge_diamond(updater, node, self.mode.diamond_parent(node), self.mode);
        }
    }

    /// Run one split pass on `executor`.
    pub fn split_pass(&self, executor: &mut dyn TreeExecutor) -> PassReport {
        executor.run_pass(&mut |updater: &mut Updater<'_>, node: Node| {
            self.split_callback(updater, node)
        })
    }

    /// Run one merge pass on `executor`.
    pub fn merge_pass(&self, executor: &mut dyn TreeExecutor) -> PassReport {
        executor.run_pass(&mut |updater: &mut Updater<'_>, node: Node| {
            self.merge_callback(updater, node)
        })
    }

    /// Run the next pass, alternating split and merge.
    pub fn step(&mut self, executor: &mut dyn TreeExecutor) -> PassReport {
        let kind = self.next_pass();
        let report = match kind {
            StepKind::Split => self.split_pass(executor),
            StepKind::Merge => self.merge_pass(executor),
        };
        self.pass_counter += 1;
        debug!(
            pass = self.pass_counter,
            ?kind,
            backend = %executor.backend(),
            mutations = report.mutations,
            node_count = report.node_count,
            "subdivision step"
        );
        report
    }

    /// Run `passes` steps, returning one report per step.
    pub fn run(&mut self, executor: &mut dyn TreeExecutor, passes: u32) -> Vec<PassReport> {
        (0..passes).map(|_| self.step(executor)).collect()
    }
}
