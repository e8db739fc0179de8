use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fast_image_resize as fir;

use crate::types::GestureLabel;

pub const MEME_WIDTH: u32 = 640;
pub const MEME_HEIGHT: u32 = 480;
const ASSET_SUBDIR: &str = "jpeg";

#[derive(Clone, Debug, PartialEq)]
pub struct MemeImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl MemeImage {
    pub fn blank() -> Self {
        let mut rgba = vec![0u8; (MEME_WIDTH * MEME_HEIGHT * 4) as usize];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self {
            rgba,
            width: MEME_WIDTH,
            height: MEME_HEIGHT,
        }
    }
}

/// One display-ready image per gesture, resolved once at startup.
#[derive(Clone, Debug)]
pub struct MemeAssets {
    smile: MemeImage,
    shock: MemeImage,
    thumbs_up: MemeImage,
    thumbs_down: MemeImage,
    tongue_out: MemeImage,
}

impl MemeAssets {
    pub fn default_dir() -> PathBuf {
        PathBuf::from(".")
    }

    pub fn asset_path(base: &Path, label: GestureLabel) -> PathBuf {
        base.join(ASSET_SUBDIR).join(label.asset_file_name())
    }

    /// Loads every meme under `base/jpeg`. Files that fail to load are logged and
    /// replaced by the shock image, or by a blank image when shock is missing too.
    pub fn load(base: &Path) -> Self {
        let load = |label: GestureLabel| {
            let path = Self::asset_path(base, label);
            match load_meme(&path) {
                Ok(image) => Some(image),
                Err(err) => {
                    log::warn!("could not load {} meme from {}: {err:#}", label, path.display());
                    None
                }
            }
        };

        let assets = Self::from_loaded(
            load(GestureLabel::Smile),
            load(GestureLabel::Shock),
            load(GestureLabel::ThumbsUp),
            load(GestureLabel::ThumbsDown),
            load(GestureLabel::TongueOut),
        );
        log::info!("meme assets ready from {}", base.join(ASSET_SUBDIR).display());
        assets
    }

    fn from_loaded(
        smile: Option<MemeImage>,
        shock: Option<MemeImage>,
        thumbs_up: Option<MemeImage>,
        thumbs_down: Option<MemeImage>,
        tongue_out: Option<MemeImage>,
    ) -> Self {
        let fallback = match shock {
            Some(image) => image,
            None => {
                log::warn!("shock meme missing, falling back to a blank image");
                MemeImage::blank()
            }
        };
        let or_fallback = |image: Option<MemeImage>| image.unwrap_or_else(|| fallback.clone());

        Self {
            smile: or_fallback(smile),
            thumbs_up: or_fallback(thumbs_up),
            thumbs_down: or_fallback(thumbs_down),
            tongue_out: or_fallback(tongue_out),
            shock: fallback,
        }
    }

    pub fn get(&self, label: GestureLabel) -> &MemeImage {
        match label {
            GestureLabel::Smile => &self.smile,
            GestureLabel::Shock => &self.shock,
            GestureLabel::ThumbsUp => &self.thumbs_up,
            GestureLabel::ThumbsDown => &self.thumbs_down,
            GestureLabel::TongueOut => &self.tongue_out,
        }
    }
}

fn load_meme(path: &Path) -> Result<MemeImage> {
    let image = image::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let rgba = resize_rgba(image.into_raw(), width, height, MEME_WIDTH, MEME_HEIGHT)?;

    Ok(MemeImage {
        rgba,
        width: MEME_WIDTH,
        height: MEME_HEIGHT,
    })
}

fn resize_rgba(rgba: Vec<u8>, width: u32, height: u32, dst_w: u32, dst_h: u32) -> Result<Vec<u8>> {
    if width == dst_w && height == dst_h {
        return Ok(rgba);
    }

    let src_image = fir::images::Image::from_vec_u8(width, height, rgba, fir::PixelType::U8x4)?;
    let mut dst_image = fir::images::Image::new(dst_w, dst_h, fir::PixelType::U8x4);
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("meme resize failed")?;

    Ok(dst_image.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "gesture-meme-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join(ASSET_SUBDIR)).unwrap();
        dir
    }

    fn write_meme(base: &Path, label: GestureLabel, color: [u8; 3]) {
        let image = RgbImage::from_pixel(32, 24, Rgb(color));
        image.save(MemeAssets::asset_path(base, label)).unwrap();
    }

    fn center_pixel(image: &MemeImage) -> &[u8] {
        let idx = ((image.height / 2 * image.width + image.width / 2) * 4) as usize;
        &image.rgba[idx..idx + 4]
    }

    #[test]
    fn test_load_resizes_every_meme() {
        let base = scratch_dir("all");
        for label in GestureLabel::ALL {
            write_meme(&base, label, [200, 30, 30]);
        }

        let assets = MemeAssets::load(&base);
        for label in GestureLabel::ALL {
            let image = assets.get(label);
            assert_eq!((image.width, image.height), (MEME_WIDTH, MEME_HEIGHT));
            assert_eq!(image.rgba.len(), (MEME_WIDTH * MEME_HEIGHT * 4) as usize);
        }
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn test_missing_meme_uses_shock() {
        let base = scratch_dir("shock-fallback");
        write_meme(&base, GestureLabel::Shock, [255, 255, 255]);
        write_meme(&base, GestureLabel::Smile, [0, 0, 0]);

        let assets = MemeAssets::load(&base);
        assert_eq!(assets.get(GestureLabel::ThumbsUp), assets.get(GestureLabel::Shock));
        assert_eq!(assets.get(GestureLabel::TongueOut), assets.get(GestureLabel::Shock));
        assert_ne!(assets.get(GestureLabel::Smile), assets.get(GestureLabel::Shock));
        assert!(center_pixel(assets.get(GestureLabel::ThumbsDown))[0] > 200);
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn test_missing_shock_uses_blank() {
        let base = scratch_dir("blank-fallback");
        write_meme(&base, GestureLabel::Smile, [255, 255, 255]);

        let assets = MemeAssets::load(&base);
        assert_eq!(assets.get(GestureLabel::Shock), &MemeImage::blank());
        assert_eq!(assets.get(GestureLabel::ThumbsUp), &MemeImage::blank());
        assert_ne!(assets.get(GestureLabel::Smile), &MemeImage::blank());
        let _ = std::fs::remove_dir_all(base);
    }

    #[test]
    fn test_blank_is_opaque_black() {
        let blank = MemeImage::blank();
        assert!(blank.rgba.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }
}
