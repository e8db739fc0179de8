use anyhow::{Context, Result, anyhow};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType},
};

use super::{FrameSource, rgba_converter};
use crate::types::Frame;

// Prefer pixel formats that are widely supported on macOS (the built-in cameras
// often reject YUYV even though Nokhwa reports it).
const PREFERRED_PIXEL_FORMATS: &[FrameFormat] = &[
    FrameFormat::RAWRGB,
    FrameFormat::RAWBGR,
    FrameFormat::GRAY,
    FrameFormat::YUYV,
    FrameFormat::NV12,
    FrameFormat::MJPEG,
];

fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::with_formats(
            RequestedFormatType::AbsoluteHighestFrameRate,
            PREFERRED_PIXEL_FORMATS,
        ),
        // Fall back to any format Nokhwa can decode, but prefer higher FPS to
        // avoid very low default rates that some drivers reject.
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

/// Human readable name of the camera at `index`, when the backend lists it.
pub fn camera_label(index: &CameraIndex) -> Option<String> {
    match query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .find(|info| info.index() == index)
            .map(|info| info.human_name()),
        Err(err) => {
            log::warn!("failed to list cameras: {err}");
            None
        }
    }
}

/// A camera opened for synchronous capture. The stream closes on drop.
pub struct CameraCapture {
    camera: Camera,
}

impl CameraCapture {
    pub fn open(index: CameraIndex) -> Result<Self> {
        let mut last_err = None;

        for requested in requested_formats() {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => {
                        let format = camera.camera_format();
                        log::info!(
                            "camera {index} streaming {}x{} {:?} at {} fps",
                            format.width(),
                            format.height(),
                            format.format(),
                            format.frame_rate()
                        );
                        return Ok(Self { camera });
                    }
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    pub fn resolution(&self) -> (u32, u32) {
        let resolution = self.camera.resolution();
        (resolution.width_x, resolution.height_y)
    }
}

impl FrameSource for CameraCapture {
    fn next_frame(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame().context("camera frame read failed")?;
        let frame = rgba_converter::convert_camera_frame(&buffer)
            .context("failed to decode camera frame")?;
        Ok(frame.mirrored())
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        if let Err(err) = self.camera.stop_stream() {
            log::warn!("failed to stop camera stream: {err}");
        }
    }
}
