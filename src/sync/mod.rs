//! Host to device heap hand-off
//!
//! With the host backend the tree lives in host memory and the device
//! keeps its own copy. Each frame the host heap is written into a
//! host-owned staging buffer, then copied into the device heap by a copy
//! command bracketed by a barrier from the transfer stage to the stage
//! that reads the tree next. There is a single device heap (no double
//! buffering), so a frame may only read it once that copy is recorded.
//!
//! The two allocations never alias; the copy is the only link.

use thiserror::Error;
use tracing::debug;

/// Pipeline stages that touch the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Buffer copies
    Transfer,
    /// Compute dispatches
    ComputeShader,
    /// Vertex shading
    VertexShader,
    /// Fragment shading
    FragmentShader,
}

impl Stage {
    /// Position in the graphics pipeline, if the stage belongs to it.
    fn graphics_order(self) -> Option<u8> {
        match self {
            Stage::VertexShader => Some(0),
            Stage::FragmentShader => Some(1),
            _ => None,
        }
    }

    /// Check if work in `self` is ordered after a barrier targeting `dst`.
    ///
    /// Later graphics stages are covered by a barrier on an earlier one.
    pub fn is_covered_by(self, dst: Stage) -> bool {
        if self == dst {
            return true;
        }
        match (self.graphics_order(), dst.graphics_order()) {
            (Some(stage), Some(dst)) => stage >= dst,
            _ => false,
        }
    }
}

/// Execution and memory dependency between two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Barrier {
    /// Stage whose writes must complete
    pub src: Stage,
    /// Stage that waits for them
    pub dst: Stage,
}

impl Barrier {
    /// Barrier from `src` to `dst`.
    pub const fn new(src: Stage, dst: Stage) -> Self {
        Self { src, dst }
    }
}

/// Copy of the staging buffer into the device heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyCommand {
    /// Bytes copied
    pub byte_size: usize,
    /// Barrier recorded after the copy
    pub barrier: Barrier,
}

/// Errors raised when the hand-off contract is broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Source and destination sizes differ.
    #[error("heap size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Size of the destination.
        expected: usize,
        /// Size of the source.
        actual: usize,
    },

    /// The device heap was read before this frame's upload.
    #[error("device heap read before the upload of frame {frame}")]
    StaleMirror {
        /// Frame missing its upload.
        frame: u64,
    },

    /// The reading stage is not ordered after the copy.
    #[error("stage {stage:?} is not covered by the barrier to {barrier_dst:?}")]
    UnbarrieredStage {
        /// Stage attempting the read.
        stage: Stage,
        /// Destination stage of the recorded barrier.
        barrier_dst: Stage,
    },
}

/// Host-owned buffer the heap is staged through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingBuffer {
    bytes: Vec<u8>,
}

impl StagingBuffer {
    /// Zeroed buffer of `byte_size` bytes.
    pub fn new(byte_size: usize) -> Self {
        Self {
            bytes: vec![0; byte_size],
        }
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    /// Staged contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Overwrite the staged contents with `source`.
    pub fn write(&mut self, source: &[u8]) -> Result<(), SyncError> {
        if source.len() != self.bytes.len() {
            return Err(SyncError::SizeMismatch {
                expected: self.bytes.len(),
                actual: source.len(),
            });
        }
        self.bytes.copy_from_slice(source);
        Ok(())
    }
}

/// Device-resident heap buffer.
pub trait DeviceHeap {
    /// Size in bytes.
    fn byte_size(&self) -> usize;

    /// Execute `command`, copying `staging` into the device heap.
    fn copy_from_staging(
        &mut self,
        staging: &StagingBuffer,
        command: &CopyCommand,
    ) -> Result<(), SyncError>;
}

/// Device heap kept in ordinary memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDevice {
    bytes: Vec<u8>,
    last_command: Option<CopyCommand>,
    copies: u64,
}

impl MemoryDevice {
    /// Zeroed device heap of `byte_size` bytes.
    pub fn new(byte_size: usize) -> Self {
        Self {
            bytes: vec![0; byte_size],
            last_command: None,
            copies: 0,
        }
    }

    /// Device heap contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Most recent copy command executed.
    pub fn last_command(&self) -> Option<&CopyCommand> {
        self.last_command.as_ref()
    }

    /// Copies executed so far.
    pub fn copy_count(&self) -> u64 {
        self.copies
    }
}

impl DeviceHeap for MemoryDevice {
    fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    fn copy_from_staging(
        &mut self,
        staging: &StagingBuffer,
        command: &CopyCommand,
    ) -> Result<(), SyncError> {
        if staging.byte_size() != self.bytes.len() || command.byte_size != self.bytes.len() {
            return Err(SyncError::SizeMismatch {
                expected: self.bytes.len(),
                actual: command.byte_size,
            });
        }
        self.bytes.copy_from_slice(staging.as_bytes());
        self.last_command = Some(*command);
        self.copies += 1;
        Ok(())
    }
}

/// Per-frame upload of the host heap.
///
/// Call [`begin_frame`](Self::begin_frame) once per frame, upload after
/// the host pass, then [`begin_read`](Self::begin_read) before any stage
/// reads the device heap.
#[derive(Debug, Clone)]
pub struct HeapUploader {
    staging: StagingBuffer,
    reader: Stage,
    frame: u64,
    uploaded: bool,
}

impl HeapUploader {
    /// Uploader for heaps of `byte_size` bytes read by `reader`.
    pub fn new(byte_size: usize, reader: Stage) -> Self {
        Self {
            staging: StagingBuffer::new(byte_size),
            reader,
            frame: 0,
            uploaded: false,
        }
    }

    /// Current frame number.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Stage the barrier targets.
    pub fn reader(&self) -> Stage {
        self.reader
    }

    /// Start a new frame; the device copy is stale until uploaded.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        self.uploaded = false;
    }

    /// Stage `heap` and copy it into `device`.
    pub fn upload(
        &mut self,
        heap: &[u8],
        device: &mut dyn DeviceHeap,
    ) -> Result<CopyCommand, SyncError> {
        if device.byte_size() != self.staging.byte_size() {
            return Err(SyncError::SizeMismatch {
                expected: self.staging.byte_size(),
                actual: device.byte_size(),
            });
        }
        self.staging.write(heap)?;

        let command = CopyCommand {
            byte_size: heap.len(),
            barrier: Barrier::new(Stage::Transfer, self.reader),
        };
        device.copy_from_staging(&self.staging, &command)?;
        self.uploaded = true;
        debug!(frame = self.frame, bytes = command.byte_size, "heap uploaded");
        Ok(command)
    }

    /// Check that `stage` may read the device heap this frame.
    pub fn begin_read(&self, stage: Stage) -> Result<(), SyncError> {
        if !self.uploaded {
            return Err(SyncError::StaleMirror { frame: self.frame });
        }
        if !stage.is_covered_by(self.reader) {
            return Err(SyncError::UnbarrieredStage {
                stage,
                barrier_dst: self.reader,
            });
        }
        Ok(())
    }
}
