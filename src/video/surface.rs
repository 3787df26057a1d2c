use image::imageops::{self, FilterType};

use crate::{composition::CropRect, error::DrawError, media::Frame};

/// The single output canvas the render loop draws onto and the recording
/// sink captures from.
#[derive(Debug, Clone)]
pub struct Surface {
    canvas: Frame,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Frame::new_black(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    pub fn frame(&self) -> &Frame {
        &self.canvas
    }

    /// Fill with black
    pub fn clear(&mut self) {
        for pixel in self.canvas.as_image_mut().pixels_mut() {
            pixel.0 = [0, 0, 0];
        }
    }

    /// `source` scaled to the surface size, ignoring aspect
    pub fn stretched(&self, source: &Frame) -> Result<Frame, DrawError> {
        if source.is_empty() {
            return Err(DrawError::EmptySource {
                width: source.width(),
                height: source.height(),
            });
        }

        let (w, h) = self.dimensions();
        if source.dimensions() == (w, h) {
            Ok(source.clone())
        } else {
            Ok(Frame::new(imageops::resize(source.as_image(), w, h, FilterType::Triangle)))
        }
    }

    /// Draw a whole frame scaled to cover the surface, ignoring aspect.
    /// Frames already at the surface size are copied without resampling.
    pub fn draw_stretched(&mut self, source: &Frame) -> Result<(), DrawError> {
        if source.dimensions() == self.dimensions() && !source.is_empty() {
            self.canvas.as_image_mut().copy_from_slice(source.as_rgb_bytes());
            return Ok(());
        }
        self.canvas = self.stretched(source)?;
        Ok(())
    }

    /// Map `region` of `source` onto the whole surface, optionally mirrored
    /// around the surface's vertical center axis.
    pub fn draw_region(&mut self, source: &Frame, region: &CropRect, mirror: bool) -> Result<(), DrawError> {
        if source.is_empty() {
            return Err(DrawError::EmptySource {
                width: source.width(),
                height: source.height(),
            });
        }

        let (fw, fh) = source.dimensions();
        if !CropRect::full(fw, fh).contains(region) || region.width < 1.0 || region.height < 1.0 {
            return Err(DrawError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                frame_width: fw,
                frame_height: fh,
            });
        }

        // Snap to whole pixels, staying inside the frame
        let x = (region.x.max(0.0).floor() as u32).min(fw - 1);
        let y = (region.y.max(0.0).floor() as u32).min(fh - 1);
        let width = (region.width.round() as u32).clamp(1, fw - x);
        let height = (region.height.round() as u32).clamp(1, fh - y);

        let (w, h) = self.dimensions();
        let cropped = imageops::crop_imm(source.as_image(), x, y, width, height).to_image();
        let mut drawn = if (width, height) == (w, h) {
            cropped
        } else {
            imageops::resize(&cropped, w, h, FilterType::Triangle)
        };

        if mirror {
            imageops::flip_horizontal_in_place(&mut drawn);
        }

        self.canvas = Frame::new(drawn);
        Ok(())
    }
}
