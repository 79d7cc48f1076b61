//! Configuration types
//!
//! Everything here is validated on construction so the tree and the
//! executors can assume sane depths.

use thiserror::Error;

use crate::executor::{Backend, DEFAULT_PASS_SIZE};
use crate::leb::Mode;
use crate::tree::MAX_SUPPORTED_DEPTH;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Max depth outside the supported range.
    #[error("max depth {max_depth} out of range (supported 1..={limit})")]
    MaxDepth {
        /// Requested max depth.
        max_depth: u32,
        /// Deepest supported tree.
        limit: u32,
    },

    /// Initial depth deeper than the tree.
    #[error("init depth {init_depth} exceeds max depth {max_depth}")]
    InitDepth {
        /// Requested init depth.
        init_depth: u32,
        /// Max depth of the tree.
        max_depth: u32,
    },

    /// Square subdivision starts from its two root triangles.
    #[error("square mode needs init depth >= 1, got {0}")]
    SquareRoot(u32),

    /// Target point outside the unit square.
    #[error("target ({0}, {1}) outside the unit square")]
    TargetOutOfRange(f32, f32),

    /// Reduction passes must cover at least one node.
    #[error("pass size must be greater than zero")]
    ZeroPassSize,
}

/// Tree dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeConfig {
    /// Deepest subdivision level
    pub max_depth: u32,
    /// Uniform subdivision level at construction
    pub init_depth: u32,
}

impl TreeConfig {
    /// Validated tree dimensions.
    pub fn new(max_depth: u32, init_depth: u32) -> Result<Self, ConfigError> {
        let config = Self {
            max_depth,
            init_depth,
        };
        config.validate()?;
        Ok(config)
    }

    /// Tree starting at the root.
    pub fn uniform(max_depth: u32) -> Result<Self, ConfigError> {
        Self::new(max_depth, 0)
    }

    /// Same tree, different initial depth.
    pub fn with_init_depth(self, init_depth: u32) -> Result<Self, ConfigError> {
        Self::new(self.max_depth, init_depth)
    }

    /// Check both depths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_SUPPORTED_DEPTH).contains(&self.max_depth) {
            return Err(ConfigError::MaxDepth {
                max_depth: self.max_depth,
                limit: MAX_SUPPORTED_DEPTH,
            });
        }
        if self.init_depth > self.max_depth {
            return Err(ConfigError::InitDepth {
                init_depth: self.init_depth,
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }
}

/// Settings for a subdivision run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubdivisionConfig {
    /// Tree dimensions
    pub tree: TreeConfig,
    /// Subdivision scheme
    pub mode: Mode,
    /// Executor backend
    pub backend: Backend,
    /// Refinement target in the unit square
    pub target: [f32; 2],
    /// Passes to run
    pub max_passes: u32,
    /// Nodes per reduction dispatch (device backend)
    pub pass_size: u64,
}

impl Default for SubdivisionConfig {
    fn default() -> Self {
        Self {
            tree: TreeConfig {
                max_depth: 12,
                init_depth: 1,
            },
            mode: Mode::Triangle,
            backend: Backend::Host,
            target: [0.25, 0.25],
            max_passes: 24,
            pass_size: DEFAULT_PASS_SIZE,
        }
    }
}

impl SubdivisionConfig {
    /// Replace the tree dimensions.
    pub fn with_tree(mut self, tree: TreeConfig) -> Self {
        self.tree = tree;
        self
    }

    /// Replace the subdivision scheme.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Replace the backend.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Replace the target.
    pub fn with_target(mut self, x: f32, y: f32) -> Self {
        self.target = [x, y];
        self
    }

    /// Replace the pass count.
    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Replace the reduction pass size.
    pub fn with_pass_size(mut self, pass_size: u64) -> Self {
        self.pass_size = pass_size;
        self
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tree.validate()?;
        if self.mode == Mode::Square && self.tree.init_depth < Mode::Square.base_depth() {
            return Err(ConfigError::SquareRoot(self.tree.init_depth));
        }
        let [x, y] = self.target;
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(ConfigError::TargetOutOfRange(x, y));
        }
        if self.pass_size == 0 {
            return Err(ConfigError::ZeroPassSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_config_validation() {
        assert!(TreeConfig::new(10, 3).is_ok());
        assert_eq!(
            TreeConfig::new(4, 5),
            Err(ConfigError::InitDepth {
                init_depth: 5,
                max_depth: 4
            })
        );
        assert!(matches!(
            TreeConfig::uniform(0),
            Err(ConfigError::MaxDepth { .. })
        ));
        let config = TreeConfig::uniform(6).unwrap();
        assert_eq!(config.with_init_depth(6).unwrap().init_depth, 6);
    }

    #[test]
    fn test_default_is_valid() {
        SubdivisionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_subdivision_config_validation() {
        let square_root = SubdivisionConfig::default()
            .with_mode(Mode::Square)
            .with_tree(TreeConfig::uniform(8).unwrap());
        assert_eq!(square_root.validate(), Err(ConfigError::SquareRoot(0)));

        let outside = SubdivisionConfig::default().with_target(1.5, 0.0);
        assert!(matches!(
            outside.validate(),
            Err(ConfigError::TargetOutOfRange(..))
        ));

        let no_passes = SubdivisionConfig::default().with_pass_size(0);
        assert_eq!(no_passes.validate(), Err(ConfigError::ZeroPassSize));
    }
}
