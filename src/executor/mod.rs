//! Tree executors
//!
//! The split/merge/reduction protocol has two homes: the host, where the
//! heap array is authoritative and mutated in place, and the device,
//! where mutations are batched into dispatches and the sums rebuilt in
//! bounded reduction passes. Both sit behind [`TreeExecutor`] so the
//! decision logic (neighbour decode, containment test) is written once.
//!
//! Both executors produce bit-identical heaps for identical pass
//! sequences.

mod device;
mod host;

pub use device::DeviceExecutor;
pub use host::HostExecutor;

use std::fmt;

use crate::config::{SubdivisionConfig, TreeConfig};
use crate::tree::{Mutation, Node, PassReport, Tree, TreeError, Updater};

/// Default node count per reduction dispatch.
pub const DEFAULT_PASS_SIZE: u64 = 1 << 16;

/// Where the authoritative heap lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Backend {
    /// Host array mutated in place, uploaded each frame
    #[default]
    Host,
    /// Device buffer mutated by compute dispatches
    Device,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Host => write!(f, "host"),
            Backend::Device => write!(f, "device"),
        }
    }
}

/// Split/merge/reduction capability over one tree.
///
/// `split` and `merge` queue requests. They take effect at the next
/// [`recompute_sums`](Self::recompute_sums), which applies the batch through
/// [`Tree::resolve`] so requests the tree cannot honour are dropped.
pub trait TreeExecutor: fmt::Debug + Send {
    /// Backend this executor models.
    fn backend(&self) -> Backend;

    /// Tree state as of the last sum recomputation.
    fn tree(&self) -> &Tree;

    /// Request a split of `node`.
    fn split(&mut self, node: Node);

    /// Request a merge of `node` with its sibling.
    fn merge(&mut self, node: Node);

    /// Make every requested mutation visible and restore the sums.
    fn recompute_sums(&mut self);

    /// Subdivide uniformly to `depth`, dropping pending requests.
    fn reset_to_depth(&mut self, depth: u32) -> Result<(), TreeError>;

    /// Heap bytes as consumers see them.
    fn read_heap(&self) -> &[u8] {
        self.tree().heap_bytes()
    }

    /// Allocated leaves.
    fn node_count(&self) -> u64 {
        self.tree().node_count()
    }

    /// Run one update pass and recompute the sums.
    fn run_pass(&mut self, callback: &mut dyn FnMut(&mut Updater<'_>, Node)) -> PassReport {
        let plan = self.tree().plan_update(callback);
        for mutation in &plan.mutations {
            match *mutation {
                Mutation::Split(node) => self.split(node),
                Mutation::Merge(node) => self.merge(node),
            }
        }
        self.recompute_sums();
        PassReport {
            visited: plan.visited,
            mutations: plan.mutations.len(),
            node_count: self.node_count(),
        }
    }
}

/// Build the executor for `backend`.
pub fn for_backend(
    backend: Backend,
    config: &TreeConfig,
) -> Result<Box<dyn TreeExecutor>, TreeError> {
    let tree = Tree::from_config(config)?;
    Ok(match backend {
        Backend::Host => Box::new(HostExecutor::new(tree)),
        Backend::Device => Box::new(DeviceExecutor::new(tree, DEFAULT_PASS_SIZE)),
    })
}

/// Build the executor described by a subdivision run.
///
/// # Panics
/// Panics if the device pass size is zero; [`SubdivisionConfig::validate`]
/// rejects that.
pub fn from_config(config: &SubdivisionConfig) -> Result<Box<dyn TreeExecutor>, TreeError> {
    let tree = Tree::from_config(&config.tree)?;
    Ok(match config.backend {
        Backend::Host => Box::new(HostExecutor::new(tree)),
        Backend::Device => Box::new(DeviceExecutor::new(tree, config.pass_size)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_left_half(updater: &mut Updater<'_>, node: Node) {
        if node.id & 1 == 0 {
            updater.split(node);
        }
    }

    #[test]
    fn test_backends_agree() {
        let config = TreeConfig::new(7, 2).unwrap();
        let mut host = for_backend(Backend::Host, &config).unwrap();
        let mut device = for_backend(Backend::Device, &config).unwrap();
        assert_eq!(host.backend(), Backend::Host);
        assert_eq!(device.backend(), Backend::Device);

        for _ in 0..4 {
            let a = host.run_pass(&mut split_left_half);
            let b = device.run_pass(&mut split_left_half);
            assert_eq!(a, b);
        }
        assert_eq!(host.read_heap(), device.read_heap());
        host.tree().check_invariants().unwrap();
    }

    #[test]
    fn test_reset_through_executor() {
        let config = TreeConfig::new(5, 0).unwrap();
        let mut host = for_backend(Backend::Host, &config).unwrap();
        host.reset_to_depth(3).unwrap();
        assert_eq!(host.node_count(), 8);
        assert!(host.reset_to_depth(6).is_err());
    }
}
