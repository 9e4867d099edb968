//! Headless device that records what it was asked to do.

use std::ops::Range;

use bytemuck::Pod;

use super::RenderDevice;
use crate::batch::{PipelineState, TexturedVertex};
use crate::error::{RenderError, RenderResult};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// A buffer was allocated.
    CreateBuffer {
        /// Buffer handle.
        buffer: usize,
        /// Size in bytes.
        size_bytes: u64,
    },
    /// Bytes were copied into a buffer.
    Upload {
        /// Buffer handle.
        buffer: usize,
        /// Destination offset.
        offset_bytes: u64,
        /// Bytes copied.
        len: usize,
    },
    /// A draw call.
    Draw {
        /// Buffer handle.
        buffer: usize,
        /// Vertex range.
        vertices: Range<u32>,
        /// State drawn with.
        state: PipelineState,
    },
    /// Recorded draws were submitted ahead of present.
    Flush,
    /// A frame began.
    BeginFrame(u64),
    /// A frame was presented.
    Present,
}

/// In-memory [`RenderDevice`].
///
/// Buffers are byte vectors; every call is appended to a command log unless
/// logging is off, in which case only the counters advance.
///
/// Like a GPU queue, uploads apply at once but draws only read their
/// buffers when submitted by [`RenderDevice::flush`] or
/// [`RenderDevice::present`]. [`Self::submitted_vertices`] holds what each
/// draw actually read at that point, taking vertices to be
/// [`TexturedVertex`]-sized.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    buffers: Vec<Vec<u8>>,
    commands: Vec<DeviceCommand>,
    log: bool,
    unsubmitted: Vec<(usize, Range<u32>)>,
    submitted: Vec<u8>,
    draw_calls: u64,
    flushes: u64,
    frames_presented: u64,
    last_generation: u64,
}

impl RecordingDevice {
    /// Device that logs every command.
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: true,
            ..Self::default()
        }
    }

    /// Device that keeps buffers and counters but no command log.
    #[must_use]
    pub fn counting() -> Self {
        Self::default()
    }

    /// Recorded commands.
    #[must_use]
    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    /// Drains the command log.
    pub fn take_commands(&mut self) -> Vec<DeviceCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Recorded draw calls as `(buffer, vertices, state)`.
    pub fn draws(&self) -> impl Iterator<Item = (usize, &Range<u32>, &PipelineState)> + '_ {
        self.commands.iter().filter_map(|command| match command {
            DeviceCommand::Draw { buffer, vertices, state } => Some((*buffer, vertices, state)),
            _ => None,
        })
    }

    /// Buffers allocated so far.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Draw calls issued over the device's life.
    #[must_use]
    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    /// Mid-frame submissions over the device's life.
    #[must_use]
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    /// Frames presented over the device's life.
    #[must_use]
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Generation of the last frame begun.
    #[must_use]
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    /// Reads `range` of `buffer` back as vertices of type `V`.
    #[must_use]
    pub fn read_vertices<V: Pod>(&self, buffer: usize, range: Range<u32>) -> Vec<V> {
        let size = std::mem::size_of::<V>();
        let Some(bytes) = self.buffers.get(buffer) else {
            return Vec::new();
        };
        let start = (range.start as usize * size).min(bytes.len());
        let end = (range.end as usize * size).min(bytes.len());
        bytes[start..end]
            .chunks_exact(size)
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Vertices read by every submitted draw, in submission order. Empty for
    /// a [`Self::counting`] device.
    #[must_use]
    pub fn submitted_vertices<V: Pod>(&self) -> Vec<V> {
        self.submitted
            .chunks_exact(std::mem::size_of::<V>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    /// Resolves pending draws against the buffers as they are now.
    fn submit(&mut self) {
        for (buffer, range) in self.unsubmitted.drain(..) {
            let Some(bytes) = self.buffers.get(buffer) else {
                continue;
            };
            let start = (range.start as usize * TexturedVertex::SIZE).min(bytes.len());
            let end = (range.end as usize * TexturedVertex::SIZE).min(bytes.len());
            self.submitted.extend_from_slice(&bytes[start..end]);
        }
    }

    fn record(&mut self, command: DeviceCommand) {
        if self.log {
            self.commands.push(command);
        }
    }
}

impl RenderDevice for RecordingDevice {
    type VertexBuffer = usize;

    fn create_vertex_buffer(&mut self, size_bytes: u64) -> RenderResult<usize> {
        let buffer = self.buffers.len();
        self.buffers.push(vec![0; size_bytes as usize]);
        self.record(DeviceCommand::CreateBuffer { buffer, size_bytes });
        Ok(buffer)
    }

    fn upload_vertices(&mut self, buffer: &usize, offset_bytes: u64, bytes: &[u8]) -> RenderResult<()> {
        let target = self
            .buffers
            .get_mut(*buffer)
            .ok_or_else(|| RenderError::Device(format!("unknown buffer {buffer}")))?;
        let start = offset_bytes as usize;
        let end = start + bytes.len();
        if end > target.len() {
            return Err(RenderError::Device(format!(
                "upload of {} bytes at {start} overflows buffer {buffer} ({} bytes)",
                bytes.len(),
                target.len()
            )));
        }
        target[start..end].copy_from_slice(bytes);
        self.record(DeviceCommand::Upload {
            buffer: *buffer,
            offset_bytes,
            len: bytes.len(),
        });
        Ok(())
    }

    fn draw(&mut self, buffer: &usize, vertices: Range<u32>, state: &PipelineState) -> RenderResult<()> {
        self.draw_calls += 1;
        if self.log {
            self.unsubmitted.push((*buffer, vertices.clone()));
        }
        self.record(DeviceCommand::Draw {
            buffer: *buffer,
            vertices,
            state: *state,
        });
        Ok(())
    }

    fn begin_frame(&mut self, generation: u64) -> RenderResult<()> {
        self.last_generation = generation;
        self.record(DeviceCommand::BeginFrame(generation));
        Ok(())
    }

    fn flush(&mut self) -> RenderResult<()> {
        self.flushes += 1;
        self.submit();
        self.record(DeviceCommand::Flush);
        Ok(())
    }

    fn present(&mut self) -> RenderResult<()> {
        self.frames_presented += 1;
        self.submit();
        self.record(DeviceCommand::Present);
        Ok(())
    }
}
