//! # Concurrent Binary Tree with Longest-Edge Bisection
//!
//! This library implements a bit-packed concurrent binary tree (CBT) and
//! the longest-edge bisection (LEB) subdivision built on top of it.
//!
//! ## Core Algorithm
//!
//! 1. **Bit heap**: one flat `u64` array stores the leaf bitfield and,
//!    above it, a sum per node with just enough bits for its subtree
//! 2. **Sum reduction**: every node counts the leaves below it, so the
//!    root is the leaf count and any leaf is found in O(depth)
//! 3. **Split/merge**: one bitfield bit per mutation, sums refreshed
//!    along the path or rebuilt in parallel passes
//! 4. **LEB protocol**: neighbour ids decoded from path bits keep the
//!    triangle mesh conforming through splits and diamond merges
//!
//! The same heap bytes are valid on the host and on a device, so a tree
//! refined on the CPU is uploaded as-is.
//!
//! ## Usage Example
//!
//! ```
//! use glam::Vec2;
//! use leb_cbt::{HostExecutor, Mode, Subdivision, Tree, TreeExecutor};
//!
//! let mut executor = HostExecutor::new(Tree::new(10, 0)?);
//! let subdivision = Subdivision::new(Mode::Triangle, Vec2::new(0.2, 0.3));
//! for _ in 0..10 {
//!     subdivision.split_pass(&mut executor);
//! }
//! assert!(executor.node_count() > 10);
//! # Ok::<(), leb_cbt::TreeError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]

// Storage and addressing
pub mod heap; // Packed bit heap and its layout
pub mod reduction; // Subtree sums
pub mod tree; // Tree façade, traversal, update passes

// Subdivision
pub mod leb; // Neighbour decode, diamonds, face attributes
pub mod subdivision; // Target-driven split/merge decisions

// Execution
pub mod config; // Validated settings
pub mod executor; // Host and device executors
pub mod sync; // Host to device hand-off

// Re-exports for convenience
pub use config::{ConfigError, SubdivisionConfig, TreeConfig};
pub use executor::{Backend, DeviceExecutor, HostExecutor, TreeExecutor};
pub use heap::{heap_byte_size, BitHeap};
pub use leb::{DiamondParent, Mode};
pub use subdivision::{Face, Subdivision};
pub use sync::{HeapUploader, MemoryDevice, Stage, SyncError};
pub use tree::{Mutation, Node, PassReport, Tree, TreeError, Updater};
