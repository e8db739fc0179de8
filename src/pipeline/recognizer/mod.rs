mod common;
mod face;
mod hand;
mod palm;
mod ssd;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    model_download::{ModelDownloadEvent, ModelKind, ensure_model_ready},
    types::{FaceLandmarks, Frame, HandLandmarks},
};

pub use face::{FaceDetectorConfig, OrtFaceEngine};
pub use hand::{HandposeConfig, OrtHandEngine};

/// Produces the face mesh of the first face in a frame, if any.
pub trait FaceMeshEngine {
    fn detect_face(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>>;

    fn name(&self) -> &'static str;
}

/// Produces the keypoints of every hand found in a frame.
pub trait HandposeEngine {
    fn detect_hands(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>>;

    fn name(&self) -> &'static str;
}

#[derive(Clone, Debug)]
pub struct ModelPaths {
    pub palm_detector: PathBuf,
    pub handpose_estimator: PathBuf,
    pub face_detector: PathBuf,
    pub face_landmarker: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            palm_detector: ModelKind::PalmDetector.default_path(),
            handpose_estimator: ModelKind::HandposeEstimator.default_path(),
            face_detector: ModelKind::FaceDetector.default_path(),
            face_landmarker: ModelKind::FaceLandmarker.default_path(),
        }
    }
}

impl ModelPaths {
    pub fn build_hand_engine(&self, cfg: HandposeConfig) -> Result<OrtHandEngine> {
        ensure_model_ready(ModelKind::PalmDetector, &self.palm_detector, log_download_event)?;
        ensure_model_ready(ModelKind::HandposeEstimator, &self.handpose_estimator, log_download_event)?;

        let engine = OrtHandEngine::new(&self.handpose_estimator, &self.palm_detector, cfg)
            .context("failed to load hand models")?;
        log::info!(
            "hand engine ready using {} and palm detector {}",
            self.handpose_estimator.display(),
            self.palm_detector.display()
        );
        Ok(engine)
    }

    pub fn build_face_engine(&self, cfg: FaceDetectorConfig) -> Result<OrtFaceEngine> {
        ensure_model_ready(ModelKind::FaceDetector, &self.face_detector, log_download_event)?;
        ensure_model_ready(ModelKind::FaceLandmarker, &self.face_landmarker, log_download_event)?;

        let engine = OrtFaceEngine::new(&self.face_detector, &self.face_landmarker, cfg)
            .context("failed to load face models")?;
        log::info!(
            "face engine ready using {} and landmarker {}",
            self.face_detector.display(),
            self.face_landmarker.display()
        );
        Ok(engine)
    }
}

fn log_download_event(event: ModelDownloadEvent) {
    match event {
        ModelDownloadEvent::AlreadyPresent { model } => {
            log::debug!("{} model already present", model.label())
        }
        ModelDownloadEvent::Started { model, total } => {
            log::info!("downloading {} model ({total:?} bytes)", model.label())
        }
        ModelDownloadEvent::Progress { .. } => {}
        ModelDownloadEvent::Finished { model } => {
            log::info!("{} model downloaded", model.label())
        }
    }
}
