//! End-to-end tree scenarios

use std::collections::HashSet;

use glam::Vec2;
use leb_cbt::{
    DeviceExecutor, HostExecutor, Mode, Node, Subdivision, Tree, TreeError, TreeExecutor, Updater,
};

mod common;
use common::*;

#[test]
fn split_root_of_fresh_tree() {
    let mut tree = Tree::new(4, 0).expect("tree builds");
    assert_eq!(tree.node_count(), 1);

    let root = tree.decode_node(0).expect("handle 0 exists");
    assert_eq!(root, Node::root());
    tree.split(root).expect("root splits");
    assert_eq!(tree.node_count(), 2);
}

#[test]
fn full_tree_decodes_distinct_leaves() {
    let tree = Tree::new(4, 4).expect("tree builds");
    assert_eq!(tree.node_count(), 16);

    let nodes: HashSet<Node> = (0..16)
        .map(|handle| tree.decode_node(handle).expect("handle in range"))
        .collect();
    assert_eq!(nodes.len(), 16);
    assert!(nodes.iter().all(|node| node.depth == 4));
}

#[test]
fn merge_pass_collapses_one_diamond() {
    // 2@1 and 3@1 are adjacent and their diamond (the root) misses the
    // target, so one merge pass turns two leaves into one
    let mut executor = HostExecutor::new(Tree::new(6, 1).expect("tree builds"));
    let subdivision = Subdivision::new(Mode::Triangle, Vec2::new(0.9, 0.9));
    assert!(subdivision.wants_merge(Node::new(2, 1)));

    let before = executor.node_count();
    let report = subdivision.merge_pass(&mut executor);
    assert_eq!(report.visited, 2);
    assert_eq!(executor.node_count(), before - 1);
}

#[test]
fn merge_pass_through_tree_update() {
    let mut tree = Tree::new(6, 3).expect("tree builds");
    tree.split(Node::new(12, 3)).expect("leaf splits");
    let subdivision = Subdivision::new(Mode::Triangle, Vec2::new(0.05, 0.9));

    let before = tree.node_count();
    tree.update(|updater, node| {
        if node.depth == 4 {
            subdivision.merge_callback(updater, node);
        }
    });
    assert_eq!(tree.node_count(), before - 1);
    assert_sums_consistent(&tree);
}

#[test]
fn update_refuses_merge_of_split_sibling() {
    let mut tree = Tree::new(3, 1).expect("tree builds");
    tree.split(Node::new(3, 1)).expect("leaf splits");
    assert_eq!(
        tree.merge(Node::new(2, 1)),
        Err(TreeError::NotMergeable(Node::new(2, 1)))
    );

    let mut accepted = None;
    let report = tree.update(|updater, node| {
        if node == Node::new(2, 1) {
            accepted = Some(updater.merge(node));
        }
    });
    assert_eq!(accepted, Some(false));
    assert_eq!(report.mutations, 0);
    assert_eq!(
        tree.leaves().collect::<Vec<_>>(),
        [Node::new(2, 1), Node::new(6, 2), Node::new(7, 2)]
    );
    assert_eq!(tree.check_invariants(), Ok(()));
}

/// Leaves 2@1, 6@2, 14@3, 30@4 and 31@4: every leaf above max depth has a
/// split sibling.
fn lopsided_tree() -> Tree {
    let mut tree = Tree::new(4, 1).expect("tree builds");
    for node in [Node::new(3, 1), Node::new(7, 2), Node::new(15, 3)] {
        tree.split(node).expect("leaf splits");
    }
    tree
}

fn out_of_bounds_requests(updater: &mut Updater<'_>, node: Node) {
    if node.is_ceil(updater.max_depth()) {
        assert!(!updater.split(node), "split past max depth at {}", node);
    } else {
        assert!(!updater.merge(node), "merge of {} with a split sibling", node);
    }
}

#[test]
fn out_of_bounds_requests_are_noops_in_update() {
    let mut tree = lopsided_tree();
    let before = tree.clone();

    let report = tree.update(out_of_bounds_requests);
    assert_eq!(report.visited, 5);
    assert_eq!(report.mutations, 0);
    assert_eq!(tree.node_count(), 5);
    assert_eq!(tree.check_invariants(), Ok(()));
    assert_eq!(tree, before);
}

#[test]
fn out_of_bounds_requests_are_noops_in_executor_passes() {
    let before = lopsided_tree();
    let executors: [Box<dyn TreeExecutor>; 2] = [
        Box::new(HostExecutor::new(before.clone())),
        Box::new(DeviceExecutor::new(before.clone(), 4)),
    ];
    for mut executor in executors {
        let report = executor.run_pass(&mut out_of_bounds_requests);
        assert_eq!(report.node_count, 5, "{}", executor.backend());
        assert_eq!(executor.tree().check_invariants(), Ok(()));
        assert_eq!(executor.read_heap(), before.heap_bytes());

        // direct requests go through the same checks
        executor.merge(Node::new(2, 1));
        executor.merge(Node::new(6, 2));
        executor.split(Node::new(9, 3));
        executor.recompute_sums();
        assert_eq!(executor.node_count(), 5, "{}", executor.backend());
        assert_eq!(executor.tree().check_invariants(), Ok(()));
    }
}

#[test]
fn split_beats_merge_in_the_same_pass() {
    let tree = Tree::new(4, 2).expect("tree builds");
    let executors: [Box<dyn TreeExecutor>; 2] = [
        Box::new(HostExecutor::new(tree.clone())),
        Box::new(DeviceExecutor::new(tree, 8)),
    ];
    for mut executor in executors {
        let report = executor.run_pass(&mut |updater, node| {
            updater.split(node);
            updater.merge(node);
        });
        assert_eq!(report.visited, 4);
        assert_eq!(report.mutations, 4);
        assert_eq!(report.node_count, 8);
        let tree = executor.tree();
        assert_eq!(tree.check_invariants(), Ok(()));
        assert!(tree.leaves().all(|leaf| leaf.depth == 3));
    }
}

#[test]
fn split_passes_converge_at_max_depth() {
    for mode in [Mode::Triangle, Mode::Square] {
        let max_depth = 9;
        let init_depth = mode.base_depth();
        let target = Vec2::new(0.3, 0.2);
        let subdivision = Subdivision::new(mode, target);
        let mut executor =
            HostExecutor::new(Tree::new(max_depth, init_depth).expect("tree builds"));

        let mut passes = 0;
        loop {
            let report = subdivision.split_pass(&mut executor);
            passes += 1;
            if report.mutations == 0 {
                break;
            }
            assert!(passes <= max_depth, "{:?} did not converge", mode);
        }

        let tree = executor.tree();
        let touching: Vec<Node> = tree
            .leaves()
            .filter(|&leaf| subdivision.face(leaf).contains(target))
            .collect();
        assert!(!touching.is_empty());
        assert!(
            touching.iter().all(|leaf| leaf.depth == max_depth),
            "{:?}: {:?}",
            mode,
            touching
        );
        assert_conforming(tree, mode);
    }
}

#[test]
fn resets_conserve_leaf_counts() {
    let mut tree = Tree::new(7, 0).expect("tree builds");
    for depth in 0..=7 {
        tree.reset_to_depth(depth).expect("depth in range");
        assert_eq!(tree.node_count(), 1 << depth);
        assert_sums_consistent(&tree);
    }
    tree.reset_to_root();
    assert_eq!(tree.node_count(), 1);
    tree.reset_to_ceil();
    assert_eq!(tree.node_count(), 128);
    assert_eq!(
        tree.reset_to_depth(8),
        Err(TreeError::DepthOutOfRange {
            depth: 8,
            max_depth: 7
        })
    );
}

#[test]
fn reset_to_depth_is_idempotent() {
    let mut tree = Tree::new(8, 5).expect("tree builds");
    tree.split(Node::new(40, 5)).expect("leaf splits");
    tree.reset_to_depth(3).expect("depth in range");
    let once = tree.clone();
    tree.reset_to_depth(3).expect("depth in range");
    assert_eq!(tree, once);
    assert_eq!(tree, Tree::new(8, 3).expect("tree builds"));
}

#[test]
fn split_then_merge_is_bit_identical() {
    for depth in 0..6 {
        let mut tree = Tree::new(6, depth).expect("tree builds");
        let original = tree.heap_bytes().to_vec();
        for handle in [0, tree.node_count() - 1] {
            let node = tree.decode_node(handle).expect("handle in range");
            tree.split(node).expect("leaf splits");
            assert_eq!(tree.node_count(), (1 << depth) + 1);
            tree.merge(node.left_child()).expect("children merge");
            assert_eq!(tree.heap_bytes(), original.as_slice());
        }
    }
}

#[test]
fn heap_words_match_snapshot() {
    let mut tree = Tree::new(6, 2).expect("tree builds");
    tree.split(Node::new(5, 2)).expect("leaf splits");
    assert_snapshot("heap_d6_split.txt", &render_words(&tree));
}

#[test]
fn leaves_match_snapshot() {
    let mut tree = Tree::new(5, 1).expect("tree builds");
    for node in [Node::new(3, 1), Node::new(6, 2), Node::new(13, 3)] {
        tree.split(node).expect("leaf splits");
    }
    assert_snapshot("leaves_d5.txt", &render_leaves(&tree));
}

#[test]
fn heap_size_depends_on_depth_only() {
    for max_depth in 1..12 {
        let sizes: HashSet<usize> = (0..=max_depth)
            .map(|init| {
                Tree::new(max_depth, init)
                    .expect("tree builds")
                    .heap_bytes()
                    .len()
            })
            .collect();
        assert_eq!(sizes.len(), 1);
        assert!(sizes.contains(&leb_cbt::heap_byte_size(max_depth)));
    }
}
