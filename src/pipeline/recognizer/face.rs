use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ndarray::ArrayViewD;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    FaceMeshEngine,
    common::{InputRange, normalize_crop_landmarks, prepare_letterbox, prepare_rotated_crop},
    ssd::{Anchor, Detection, DetectorConfig, decode_detections, generate_anchors, sigmoid},
};
use crate::types::{FACE_LANDMARK_COUNT, FaceLandmarks, Frame};

const FACE_DETECTOR_INPUT_SIZE: u32 = 128;
// Eyes, nose tip, mouth, ears.
const FACE_KEYPOINTS: usize = 6;
const FACE_MESH_INPUT_SIZE: u32 = 192;

#[derive(Clone, Debug)]
pub struct FaceDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    /// Crop side relative to the detected face box.
    pub crop_scale: f32,
    pub min_presence: f32,
}

impl Default for FaceDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            crop_scale: 1.5,
            min_presence: 0.5,
        }
    }
}

/// BlazeFace short-range detector followed by the 468-point face mesh model.
pub struct OrtFaceEngine {
    detector: Session,
    mesh: Session,
    anchors: Vec<Anchor>,
    detector_cfg: DetectorConfig,
    cfg: FaceDetectorConfig,
}

fn load_session(path: &Path, what: &str) -> Result<Session> {
    Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(2)?
        .commit_from_file(path)
        .with_context(|| format!("failed to load {what} from {}", path.display()))
}

impl OrtFaceEngine {
    pub fn new(
        detector_model_path: &Path,
        mesh_model_path: &Path,
        cfg: FaceDetectorConfig,
    ) -> Result<Self> {
        Ok(Self {
            detector: load_session(detector_model_path, "face detector")?,
            mesh: load_session(mesh_model_path, "face landmarker")?,
            anchors: generate_anchors(FACE_DETECTOR_INPUT_SIZE),
            detector_cfg: DetectorConfig {
                input_size: FACE_DETECTOR_INPUT_SIZE,
                keypoints: FACE_KEYPOINTS,
                score_threshold: cfg.score_threshold,
                nms_threshold: cfg.nms_threshold,
                top_k: 1,
            },
            cfg,
        })
    }

    fn detect(&mut self, frame: &Frame) -> Result<Option<Detection>> {
        let (input, letterbox) =
            prepare_letterbox(frame, FACE_DETECTOR_INPUT_SIZE, InputRange::NegOneToOne)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .detector
            .run(ort::inputs![tensor])
            .context("failed to run face detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "face detector returned {} outputs, expected 2",
                outputs.len()
            ));
        }

        let first = outputs[0].try_extract_array::<f32>()?;
        let second = outputs[1].try_extract_array::<f32>()?;
        // Converted models do not agree on output order; scores have a single feature.
        let (regressors, scores) = if first.shape().last() == Some(&1) {
            (second, first)
        } else {
            (first, second)
        };

        let mut faces = decode_detections(
            contiguous(&regressors, "face regressors")?,
            regressors.shape(),
            contiguous(&scores, "face scores")?,
            scores.shape(),
            &self.anchors,
            &letterbox,
            &self.detector_cfg,
        )?;
        Ok(if faces.is_empty() {
            None
        } else {
            Some(faces.swap_remove(0))
        })
    }

    fn landmarks(&mut self, frame: &Frame, face: &Detection) -> Result<Option<FaceLandmarks>> {
        let (center, side, angle) = crop_from_face(face, self.cfg.crop_scale);
        let (input, transform) = prepare_rotated_crop(
            frame,
            center,
            side,
            angle,
            FACE_MESH_INPUT_SIZE,
            InputRange::ZeroToOne,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .mesh
            .run(ort::inputs![tensor])
            .context("failed to run face landmarker session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("face landmarker returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        let presence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .map(sigmoid)
                .unwrap_or(1.0)
        } else {
            1.0
        };

        if presence < self.cfg.min_presence {
            log::trace!("face mesh presence {presence:.2} below threshold");
            return Ok(None);
        }

        let points = normalize_crop_landmarks(
            &flat,
            FACE_LANDMARK_COUNT,
            &transform,
            frame.width,
            frame.height,
        )?;
        Ok(Some(FaceLandmarks::new(points)?))
    }
}

impl FaceMeshEngine for OrtFaceEngine {
    fn detect_face(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>> {
        match self.detect(frame)? {
            Some(face) => self.landmarks(frame, &face),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "blazeface + face mesh (ort)"
    }
}

fn contiguous<'a>(array: &'a ArrayViewD<'_, f32>, what: &str) -> Result<&'a [f32]> {
    array
        .as_slice()
        .ok_or_else(|| anyhow!("{what} not contiguous"))
}

/// Square crop around the face box, rotated so the eyes lie on a horizontal line.
fn crop_from_face(face: &Detection, scale: f32) -> ((f32, f32), f32, f32) {
    let (w, h) = face.size();
    let side = w.max(h) * scale;
    let angle = match face.keypoints.as_slice() {
        [a, b, ..] => {
            // Mirrored frames swap which eye comes first; measure from the leftmost one.
            let (left, right) = if a.0 <= b.0 { (a, b) } else { (b, a) };
            (right.1 - left.1).atan2(right.0 - left.0)
        }
        _ => 0.0,
    };
    (face.center(), side, angle)
}
