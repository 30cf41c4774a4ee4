//! Placeholder frame source.
//!
//! Real pixel capture belongs to the compositing host.  Until a host plugs
//! one in, every surface is transmitted as a single blank pixel stretched to
//! the configured surface size, which is enough to exercise the whole
//! buffer/attach/damage/commit path end to end.

use crate::application::host::{FramePayload, FrameSource, HostSurfaceId};

/// Pixel format code of the blank pixel (32-bit XRGB).
pub const PLACEHOLDER_FORMAT: u32 = 0x3432_5258;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderFrames {
    pub width: i32,
    pub height: i32,
}

impl PlaceholderFrames {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

impl FrameSource for PlaceholderFrames {
    fn capture(&mut self, _surface: HostSurfaceId) -> Option<FramePayload> {
        Some(FramePayload {
            width: self.width,
            height: self.height,
            stride: 4,
            format: PLACEHOLDER_FORMAT,
            data: vec![0; 4],
        })
    }
}
