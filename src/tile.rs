//! Stock volatile tile value.
//!
//! Downstream viewers are free to plug any [`VolatileValue`] into the
//! cache; this is the one used by pixel-backed pyramids: an invalid,
//! zero-byte placeholder that is eventually replaced by the decoded tile.

use bytes::Bytes;

use crate::entry::VolatileValue;

/// A tile of pixel data that may not have been loaded yet.
#[derive(Debug, Clone)]
pub struct VolatileTile {
    data: Bytes,
    width: u32,
    height: u32,
    valid: bool,
}

impl VolatileTile {
    /// Invalid placeholder for a tile of the given dimensions.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            data: Bytes::new(),
            width,
            height,
            valid: false,
        }
    }

    /// A fully loaded tile.
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            valid: true,
        }
    }

    /// Raw pixel bytes; empty while the tile is invalid.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

impl VolatileValue for VolatileTile {
    fn is_valid(&self) -> bool {
        self.valid
    }
}
