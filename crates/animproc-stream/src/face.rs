//! Face output - procedural face parameters, face images and frames
//!
//! Pixel rendering happens outside this crate. The streamer hands the face
//! channel a `FaceFrame` describing everything that should be on screen for
//! one tick; a `FaceSink` turns that into pixels.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use animproc_core::{AnimError, AnimResult};
use animproc_wire::{DisplayFaceImageRgbChunk, ProceduralFaceParams, FACE_CHUNK_MAX_PIXELS};

/// Face display width in pixels
pub const FACE_DISPLAY_WIDTH: usize = 184;
/// Face display height in pixels
pub const FACE_DISPLAY_HEIGHT: usize = 96;
/// Pixels in one full face image
pub const FACE_DISPLAY_PIXELS: usize = FACE_DISPLAY_WIDTH * FACE_DISPLAY_HEIGHT;
/// Most chunks a face image may be split into
pub const MAX_FACE_IMAGE_CHUNKS: u8 = 32;

/// Parametric eye description
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProceduralFace {
    /// Whole-face rotation
    pub angle_deg: f32,
    /// Face center offset in pixels
    pub center_x: f32,
    pub center_y: f32,
    /// Eye scale
    pub scale_x: f32,
    pub scale_y: f32,
    /// Upper lid angle, driven by squint layers
    pub upper_lid_angle: f32,
}

impl Default for ProceduralFace {
    fn default() -> Self {
        Self::neutral()
    }
}

impl ProceduralFace {
    /// Open, centered eyes
    pub fn neutral() -> Self {
        ProceduralFace {
            angle_deg: 0.0,
            center_x: 0.0,
            center_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            upper_lid_angle: 0.0,
        }
    }

    /// Closed eyes (nothing drawn)
    pub fn blank() -> Self {
        ProceduralFace {
            scale_x: 0.0,
            scale_y: 0.0,
            ..Self::neutral()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.scale_x == 0.0 || self.scale_y == 0.0
    }

    /// Shift the whole face by (x, y) pixels
    pub fn shifted(mut self, x: f32, y: f32) -> Self {
        self.center_x += x;
        self.center_y += y;
        self
    }

    /// Combine a squint into this face
    pub fn squinted(mut self, scale_x: f32, scale_y: f32, upper_lid_angle: f32) -> Self {
        self.scale_x *= scale_x;
        self.scale_y *= scale_y;
        self.upper_lid_angle += upper_lid_angle;
        self
    }

    /// Linear blend toward `other`; `frac` is clamped to [0, 1]
    pub fn lerp(&self, other: &ProceduralFace, frac: f32) -> Self {
        let f = frac.clamp(0.0, 1.0);
        let mix = |a: f32, b: f32| a + (b - a) * f;
        ProceduralFace {
            angle_deg: mix(self.angle_deg, other.angle_deg),
            center_x: mix(self.center_x, other.center_x),
            center_y: mix(self.center_y, other.center_y),
            scale_x: mix(self.scale_x, other.scale_x),
            scale_y: mix(self.scale_y, other.scale_y),
            upper_lid_angle: mix(self.upper_lid_angle, other.upper_lid_angle),
        }
    }
}

impl From<&ProceduralFaceParams> for ProceduralFace {
    fn from(p: &ProceduralFaceParams) -> Self {
        ProceduralFace {
            angle_deg: p.angle_deg,
            center_x: p.center_x,
            center_y: p.center_y,
            scale_x: p.scale_x,
            scale_y: p.scale_y,
            upper_lid_angle: 0.0,
        }
    }
}

/// Shared, immutable RGB565 face image
#[derive(Debug, Clone, PartialEq)]
pub struct FaceImage {
    pixels: Arc<[u16]>,
}

impl FaceImage {
    /// Wrap a full-screen image
    pub fn new(pixels: Vec<u16>) -> AnimResult<Self> {
        if pixels.len() != FACE_DISPLAY_PIXELS {
            return Err(AnimError::InvalidFaceImage(format!(
                "expected {} pixels, got {}",
                FACE_DISPLAY_PIXELS,
                pixels.len()
            )));
        }
        Ok(FaceImage {
            pixels: pixels.into(),
        })
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Whether two handles share the same buffer
    pub fn same_buffer(&self, other: &FaceImage) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }
}

/// One sprite placed on the face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteLayer {
    pub sprite_box: u16,
    pub asset_id: u16,
    pub x_pos: i16,
    pub y_pos: i16,
    pub alpha: u8,
}

/// Non-procedural face content produced by the active animation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeImage {
    pub sprites: Vec<SpriteLayer>,
    pub image: Option<FaceImage>,
    pub render_in_eye_hue: bool,
}

impl CompositeImage {
    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty() && self.image.is_none()
    }
}

/// Everything on the face for one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceFrame {
    pub procedural: Option<ProceduralFace>,
    pub composite: Option<CompositeImage>,
}

impl FaceFrame {
    pub fn is_empty(&self) -> bool {
        self.procedural.is_none() && self.composite.is_none()
    }
}

/// Receives merged face frames; renders or forwards them
pub trait FaceSink: Send {
    fn display_face(&mut self, frame: FaceFrame);
}

/// Discards frames
#[derive(Debug, Default)]
pub struct NullFaceSink;

impl FaceSink for NullFaceSink {
    fn display_face(&mut self, _frame: FaceFrame) {}
}

struct PartialImage {
    num_chunks: u8,
    received: u32,
    chunks: Vec<Vec<u16>>,
}

/// Reassembles chunked face images by face id
#[derive(Default)]
pub struct FaceImageAssembler {
    partial: HashMap<u16, PartialImage>,
}

impl FaceImageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk. Returns the image once every chunk has arrived.
    pub fn add_chunk(&mut self, chunk: &DisplayFaceImageRgbChunk) -> AnimResult<Option<FaceImage>> {
        if chunk.num_chunks == 0 || chunk.num_chunks > MAX_FACE_IMAGE_CHUNKS {
            return Err(AnimError::InvalidFaceImage(format!(
                "bad chunk count {}",
                chunk.num_chunks
            )));
        }
        if chunk.chunk_index >= chunk.num_chunks {
            return Err(AnimError::InvalidFaceImage(format!(
                "chunk {} of {}",
                chunk.chunk_index, chunk.num_chunks
            )));
        }
        if chunk.pixels.len() > FACE_CHUNK_MAX_PIXELS {
            return Err(AnimError::InvalidFaceImage("chunk too large".into()));
        }

        let entry = self
            .partial
            .entry(chunk.face_id)
            .or_insert_with(|| PartialImage {
                num_chunks: chunk.num_chunks,
                received: 0,
                chunks: vec![Vec::new(); chunk.num_chunks as usize],
            });

        // A chunk count change means a new image reused the id
        if entry.num_chunks != chunk.num_chunks {
            tracing::warn!(
                face_id = chunk.face_id,
                "chunk count changed mid-image, restarting assembly"
            );
            *entry = PartialImage {
                num_chunks: chunk.num_chunks,
                received: 0,
                chunks: vec![Vec::new(); chunk.num_chunks as usize],
            };
        }

        let bit = 1u32 << chunk.chunk_index;
        entry.received |= bit;
        entry.chunks[chunk.chunk_index as usize] = chunk.pixels.as_slice().to_vec();

        let all = if entry.num_chunks == 32 {
            u32::MAX
        } else {
            (1u32 << entry.num_chunks) - 1
        };
        if entry.received != all {
            return Ok(None);
        }

        let Some(done) = self.partial.remove(&chunk.face_id) else {
            return Ok(None);
        };
        let pixels: Vec<u16> = done.chunks.into_iter().flatten().collect();
        FaceImage::new(pixels).map(Some)
    }

    /// Images still waiting for chunks
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use animproc_wire::BoundedVec;

    fn chunk(face_id: u16, index: u8, count: u8, pixels: usize) -> DisplayFaceImageRgbChunk {
        DisplayFaceImageRgbChunk {
            face_id,
            chunk_index: index,
            num_chunks: count,
            duration_ms: 100,
            pixels: BoundedVec::new(vec![index as u16; pixels]).unwrap(),
        }
    }

    #[test]
    fn test_face_image_requires_full_screen() {
        assert!(FaceImage::new(vec![0; 10]).is_err());
        assert!(FaceImage::new(vec![0; FACE_DISPLAY_PIXELS]).is_ok());
    }

    #[test]
    fn test_assemble_out_of_order() {
        let mut assembler = FaceImageAssembler::new();
        // 17664 = 29 * 600 + 264
        let count = 30u8;
        for index in (0..count).rev() {
            let pixels = if index == count - 1 { 264 } else { 600 };
            let result = assembler.add_chunk(&chunk(7, index, count, pixels)).unwrap();
            if index == 0 {
                let image = result.expect("complete image");
                assert_eq!(image.pixels().len(), FACE_DISPLAY_PIXELS);
                assert_eq!(image.pixels()[0], 0);
                assert_eq!(image.pixels()[600], 1);
            } else {
                assert!(result.is_none());
            }
        }
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn test_bad_chunk_index_rejected() {
        let mut assembler = FaceImageAssembler::new();
        assert!(assembler.add_chunk(&chunk(1, 3, 3, 10)).is_err());
        assert!(assembler.add_chunk(&chunk(1, 0, 0, 10)).is_err());
        assert!(assembler.add_chunk(&chunk(1, 0, 33, 10)).is_err());
    }

    #[test]
    fn test_procedural_face_layers() {
        let face = ProceduralFace::neutral().shifted(3.0, -2.0).squinted(1.0, 0.5, 10.0);
        assert_eq!(face.center_x, 3.0);
        assert_eq!(face.center_y, -2.0);
        assert_eq!(face.scale_y, 0.5);
        assert!(!face.is_blank());
        assert!(ProceduralFace::blank().is_blank());
    }
}
