//! Sampled frame models.

use serde::{Deserialize, Serialize};

/// Position of a sampled frame: its index in the sampled sequence and its
/// timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSlot {
    pub index: u32,
    pub timestamp: f64,
}

/// Encoded image data for a single frame.
#[derive(Clone, PartialEq, Eq)]
pub struct FrameImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl FrameImage {
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            data,
            mime_type: "image/jpeg".to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// Image bytes are never printed.
impl std::fmt::Debug for FrameImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameImage")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A sampled frame with its image data.
#[derive(Debug, Clone)]
pub struct Frame {
    pub slot: FrameSlot,
    pub image: FrameImage,
}

impl Frame {
    pub fn new(slot: FrameSlot, image: FrameImage) -> Self {
        Self { slot, image }
    }

    pub fn index(&self) -> u32 {
        self.slot.index
    }

    pub fn timestamp(&self) -> f64 {
        self.slot.timestamp
    }
}
