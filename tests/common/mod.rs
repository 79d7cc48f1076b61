#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use glam::Vec2;
use leb_cbt::{executor, Mode, Node, Subdivision, SubdivisionConfig, Tree, TreeExecutor};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("LEB_CBT_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set LEB_CBT_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// One line per heap word.
pub fn render_words(tree: &Tree) -> String {
    tree.heap_words()
        .iter()
        .map(|word| format!("{:#018x}\n", word))
        .collect()
}

/// One `handle id@depth` line per leaf.
pub fn render_leaves(tree: &Tree) -> String {
    tree.leaves()
        .enumerate()
        .map(|(handle, node)| format!("{} {}\n", handle, node))
        .collect()
}

/// Every internal sum equals the sum of its children.
pub fn assert_sums_consistent(tree: &Tree) {
    for depth in 0..tree.max_depth() {
        for id in (1u64 << depth)..(2u64 << depth) {
            let node = Node::new(id, depth);
            assert_eq!(
                tree.heap_read(node),
                tree.heap_read(node.left_child()) + tree.heap_read(node.right_child()),
                "sum mismatch at {}",
                node
            );
        }
    }
}

/// Leaf covering `node`'s position, walking down from the root.
pub fn leaf_covering(tree: &Tree, node: Node) -> Node {
    let mut current = Node::root();
    while tree.heap_read(current) > 1 && current.depth < node.depth {
        let bit = node.path_bit(node.depth - current.depth - 1);
        current = if bit == 0 {
            current.left_child()
        } else {
            current.right_child()
        };
    }
    current
}

/// Longest-edge neighbours never differ by more than one level.
pub fn assert_conforming(tree: &Tree, mode: Mode) {
    for leaf in tree.leaves() {
        if let Some(neighbor) = leb_cbt::leb::edge_neighbor(leaf, mode) {
            let covering = leaf_covering(tree, neighbor);
            assert!(
                covering.depth + 1 >= leaf.depth,
                "{} has coarse neighbour {}",
                leaf,
                covering
            );
        }
    }
}

/// Run a configured subdivision, moving the target between passes.
pub fn run_subdivision(config: &SubdivisionConfig, targets: &[Vec2]) -> Box<dyn TreeExecutor> {
    let mut executor = executor::from_config(config).expect("executor builds");
    let mut subdivision = Subdivision::from_config(config);
    for &target in targets {
        subdivision.set_target(target);
        subdivision.step(executor.as_mut());
    }
    executor
}
