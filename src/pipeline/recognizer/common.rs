use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, LandmarkPoint};

/// Pixel value range a model expects in its input tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputRange {
    ZeroToOne,
    NegOneToOne,
}

impl InputRange {
    fn map(self, value: u8) -> f32 {
        let unit = value as f32 / 255.0;
        match self {
            InputRange::ZeroToOne => unit,
            InputRange::NegOneToOne => unit * 2.0 - 1.0,
        }
    }

    fn map_unit(self, unit: f32) -> f32 {
        match self {
            InputRange::ZeroToOne => unit,
            InputRange::NegOneToOne => unit * 2.0 - 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

#[derive(Clone, Debug)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub angle: f32,
    pub output_size: u32,
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Fits the frame into a `target_size` square, keeping aspect ratio and centring it
/// on a black canvas, and returns the NHWC tensor with the mapping back to the frame.
pub fn prepare_letterbox(
    frame: &Frame,
    target_size: u32,
    range: InputRange,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let side = target_size as usize;
    let black = range.map(0);
    let mut data = vec![black; side * side * 3];

    let src_stride = new_w as usize * 4;
    data.par_chunks_exact_mut(side * 3)
        .skip(pad_y)
        .take(new_h as usize)
        .enumerate()
        .for_each(|(row, dst_row)| {
            let src_row = &resized[row * src_stride..(row + 1) * src_stride];
            for (x, px) in src_row.chunks_exact(4).enumerate() {
                let dst = &mut dst_row[(pad_x + x) * 3..(pad_x + x) * 3 + 3];
                dst[0] = range.map(px[0]);
                dst[1] = range.map(px[1]);
                dst[2] = range.map(px[2]);
            }
        });

    let input = Array4::<f32>::from_shape_vec((1, side, side, 3), data)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Samples a square of `side` frame pixels around `center`, rotated by `angle`
/// radians, into an `output_size` NHWC tensor.
pub fn prepare_rotated_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    angle: f32,
    output_size: u32,
    range: InputRange,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        angle,
        output_size,
    };

    let size = output_size as usize;
    let mut data = vec![0.0f32; size * size * 3];
    data.par_chunks_exact_mut(size * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..size {
                let (src_x, src_y) = transform.project(x as f32 + 0.5, y as f32 + 0.5);
                let rgb = sample_rgb(frame, src_x, src_y);
                row[x * 3] = range.map_unit(rgb[0]);
                row[x * 3 + 1] = range.map_unit(rgb[1]);
                row[x * 3 + 2] = range.map_unit(rgb[2]);
            }
        });

    let array = Array4::<f32>::from_shape_vec((1, size, size, 3), data)
        .map_err(|err| anyhow!("failed to build rotated crop tensor: {err}"))?;

    Ok((array, transform))
}

impl LetterboxInfo {
    /// Maps a point in normalized model-input space back to frame pixels.
    pub fn unproject(&self, x: f32, y: f32, target_size: u32) -> (f32, f32) {
        let side = target_size as f32;
        (
            (x * side - self.pad_x) / self.scale,
            (y * side - self.pad_y) / self.scale,
        )
    }
}

impl CropTransform {
    /// Maps a point in crop pixels to frame pixels. The result is not clamped.
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        let dx = (x - half) * scale;
        let dy = (y - half) * scale;
        let (sin, cos) = self.angle.sin_cos();
        (
            self.center.0 + dx * cos - dy * sin,
            self.center.1 + dx * sin + dy * cos,
        )
    }
}

/// Projects crop-space `[x, y, z]` triples into frame-normalized landmark points.
pub fn normalize_crop_landmarks(
    flat: &[f32],
    count: usize,
    transform: &CropTransform,
    frame_w: u32,
    frame_h: u32,
) -> Result<Vec<LandmarkPoint>> {
    if flat.len() < count * 3 {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            count * 3
        ));
    }

    let (w, h) = (frame_w.max(1) as f32, frame_h.max(1) as f32);
    Ok(flat
        .chunks_exact(3)
        .take(count)
        .map(|chunk| {
            let (px, py) = transform.project(chunk[0], chunk[1]);
            LandmarkPoint::new(px / w, py / h)
        })
        .collect())
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    // Pixel centres sit at +0.5.
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (frame.width as i64, frame.height as i64);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i64;
        let iy = cy as i64;
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy * w + ix) as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    std::array::from_fn(|c| lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy))
}
