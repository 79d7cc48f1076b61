//! Device executor
//!
//! Models the compute backend: the device heap is the only copy of the
//! tree. Split and merge requests are queued as commands; a dispatch
//! checks the batch against the heap, writes it into the bitfield, waits
//! on a compute barrier, then rebuilds the sums with the partitioned
//! reduction schedule. Readers see the heap after the final barrier.

use tracing::debug;

use super::{Backend, TreeExecutor};
use crate::reduction::{execute_schedule, ReductionSchedule};
use crate::sync::{Barrier, Stage};
use crate::tree::{Mutation, Node, Tree, TreeError};

/// Executor batching mutations into compute dispatches.
#[derive(Debug, Clone)]
pub struct DeviceExecutor {
    tree: Tree,
    commands: Vec<Mutation>,
    schedule: ReductionSchedule,
    barriers: Vec<Barrier>,
    dispatches: u64,
}

impl DeviceExecutor {
    /// Take ownership of `tree` as the device heap.
    ///
    /// # Panics
    /// Panics if `pass_size` is zero.
    pub fn new(tree: Tree, pass_size: u64) -> Self {
        let schedule = ReductionSchedule::new(tree.max_depth(), pass_size);
        Self {
            tree,
            commands: Vec::new(),
            schedule,
            barriers: Vec::new(),
            dispatches: 0,
        }
    }

    /// Commands waiting for the next dispatch.
    pub fn pending(&self) -> &[Mutation] {
        &self.commands
    }

    /// Reduction passes run per dispatch.
    pub fn schedule(&self) -> &ReductionSchedule {
        &self.schedule
    }

    /// Barriers recorded by the last dispatch, in submission order.
    pub fn barriers(&self) -> &[Barrier] {
        &self.barriers
    }

    /// Compute dispatches recorded so far.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches
    }
}

impl TreeExecutor for DeviceExecutor {
    fn backend(&self) -> Backend {
        Backend::Device
    }

    fn tree(&self) -> &Tree {
        &self.tree
    }

    fn split(&mut self, node: Node) {
        self.commands.push(Mutation::Split(node));
    }

    fn merge(&mut self, node: Node) {
        self.commands.push(Mutation::Merge(node));
    }

    #[tracing::instrument(level = "debug", skip_all, fields(commands = self.commands.len()))]
    fn recompute_sums(&mut self) {
        let max_depth = self.tree.max_depth();
        let batch = self.tree.resolve(&self.commands);
        self.commands.clear();
        for (ceil, value) in batch.iter().filter_map(|m| m.leaf_bit(max_depth)) {
            self.tree.set_leaf_bit(ceil, value);
        }
        self.barriers.clear();
        self.dispatches += 1;
        // sums read the bitfield the split/merge dispatch wrote
        self.barriers
            .push(Barrier::new(Stage::ComputeShader, Stage::ComputeShader));

        execute_schedule(self.tree.heap_mut(), &self.schedule);
        self.dispatches += self.schedule.len() as u64;
        self.barriers
            .push(Barrier::new(Stage::ComputeShader, Stage::VertexShader));

        debug!(
            dispatches = self.dispatches,
            node_count = self.tree.node_count(),
            "device sums rebuilt"
        );
    }

    fn reset_to_depth(&mut self, depth: u32) -> Result<(), TreeError> {
        self.tree.reset_to_depth(depth)?;
        self.commands.clear();
        Ok(())
    }
}
