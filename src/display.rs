use anyhow::{Context, Result};
use minifb::{Key, KeyRepeat, ScaleMode, Window, WindowOptions};

use crate::{
    assets::{MEME_HEIGHT, MEME_WIDTH, MemeImage},
    types::Frame,
};

const CAMERA_TITLE: &str = "Camera";
const MEME_TITLE: &str = "Meme";
const QUIT_KEY: Key = Key::Q;

/// The two live surfaces plus the quit-key poll.
pub trait GestureDisplay {
    fn show(&mut self, camera: &Frame, meme: &MemeImage) -> Result<()>;

    /// Polled once per frame, after `show`.
    fn quit_requested(&self) -> bool;
}

pub struct MemeWindows {
    camera: Window,
    meme: Window,
    camera_buffer: Vec<u32>,
    meme_buffer: Vec<u32>,
}

impl MemeWindows {
    pub fn open(camera_width: usize, camera_height: usize) -> Result<Self> {
        let camera = Window::new(CAMERA_TITLE, camera_width, camera_height, window_options())
            .context("failed to open camera window")?;
        let meme = Window::new(
            MEME_TITLE,
            MEME_WIDTH as usize,
            MEME_HEIGHT as usize,
            window_options(),
        )
        .context("failed to open meme window")?;

        Ok(Self {
            camera,
            meme,
            camera_buffer: Vec::new(),
            meme_buffer: Vec::new(),
        })
    }
}

impl GestureDisplay for MemeWindows {
    fn show(&mut self, camera: &Frame, meme: &MemeImage) -> Result<()> {
        pack_rgba(&camera.rgba, &mut self.camera_buffer);
        self.camera
            .update_with_buffer(
                &self.camera_buffer,
                camera.width as usize,
                camera.height as usize,
            )
            .context("failed to update camera window")?;

        pack_rgba(&meme.rgba, &mut self.meme_buffer);
        self.meme
            .update_with_buffer(&self.meme_buffer, meme.width as usize, meme.height as usize)
            .context("failed to update meme window")?;

        Ok(())
    }

    fn quit_requested(&self) -> bool {
        [&self.camera, &self.meme]
            .iter()
            .any(|window| !window.is_open() || window.is_key_pressed(QUIT_KEY, KeyRepeat::No))
    }
}

fn window_options() -> WindowOptions {
    WindowOptions {
        resize: true,
        scale_mode: ScaleMode::AspectRatioStretch,
        ..WindowOptions::default()
    }
}

/// Packs RGBA bytes into minifb's `0RGB` words, reusing `out`.
fn pack_rgba(rgba: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        rgba.chunks_exact(4)
            .map(|px| ((px[0] as u32) << 16) | ((px[1] as u32) << 8) | px[2] as u32),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_rgba_drops_alpha() {
        let mut out = vec![1, 2, 3];
        pack_rgba(&[0x12, 0x34, 0x56, 0xff, 1, 2, 3, 0], &mut out);
        assert_eq!(out, vec![0x123456, 0x010203]);
    }
}
