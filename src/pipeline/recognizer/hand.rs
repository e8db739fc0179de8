use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    HandposeEngine,
    common::{InputRange, normalize_crop_landmarks, prepare_rotated_crop},
    palm::{PalmDetector, PalmDetectorConfig, crop_from_palm},
};
use crate::types::{Frame, HAND_LANDMARK_COUNT, HandLandmarks, LandmarkPoint};

const HANDPOSE_INPUT_SIZE: u32 = 224;

#[derive(Clone, Debug)]
pub struct HandposeConfig {
    pub max_hands: usize,
    pub min_confidence: f32,
    pub palm: PalmDetectorConfig,
}

impl Default for HandposeConfig {
    fn default() -> Self {
        Self {
            max_hands: 2,
            min_confidence: 0.2,
            palm: PalmDetectorConfig::default(),
        }
    }
}

/// Palm detector followed by the MediaPipe handpose estimator on each palm crop.
pub struct OrtHandEngine {
    handpose: Session,
    palm_detector: PalmDetector,
    cfg: HandposeConfig,
}

impl OrtHandEngine {
    pub fn new(
        handpose_model_path: &Path,
        palm_detector_model_path: &Path,
        cfg: HandposeConfig,
    ) -> Result<Self> {
        let handpose = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(handpose_model_path)
            .with_context(|| {
                format!(
                    "failed to load handpose estimator from {}",
                    handpose_model_path.display()
                )
            })?;

        let palm_detector = PalmDetector::new(palm_detector_model_path, cfg.palm.clone())?;

        Ok(Self {
            handpose,
            palm_detector,
            cfg,
        })
    }

    fn estimate(
        &mut self,
        frame: &Frame,
        center: (f32, f32),
        side: f32,
        angle: f32,
    ) -> Result<(Vec<LandmarkPoint>, f32)> {
        let (input, transform) = prepare_rotated_crop(
            frame,
            center,
            side,
            angle,
            HANDPOSE_INPUT_SIZE,
            InputRange::ZeroToOne,
        )?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .handpose
            .run(ort::inputs![tensor])
            .context("failed to run handpose session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("handpose model returned no outputs"));
        }

        let coords = outputs[0].try_extract_array::<f32>()?;
        let flat: Vec<f32> = coords.iter().copied().collect();
        let confidence = if outputs.len() > 1 {
            outputs[1]
                .try_extract_array::<f32>()
                .ok()
                .and_then(|arr| arr.iter().next().copied())
                .unwrap_or(0.0)
        } else {
            0.0
        };

        let points = normalize_crop_landmarks(
            &flat,
            HAND_LANDMARK_COUNT,
            &transform,
            frame.width,
            frame.height,
        )?;
        Ok((points, confidence))
    }
}

impl HandposeEngine for OrtHandEngine {
    fn detect_hands(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>> {
        let palms = self.palm_detector.detect(frame)?;

        let mut hands = Vec::new();
        for palm in palms.iter().take(self.cfg.max_hands) {
            let (center, side, angle) = crop_from_palm(palm);
            let (points, confidence) = self.estimate(frame, center, side, angle)?;

            let confidence = (confidence * palm.score).clamp(0.0, 1.0);
            if confidence < self.cfg.min_confidence {
                log::trace!("dropping hand with confidence {confidence:.2}");
                continue;
            }

            hands.push(HandLandmarks::new(points)?);
        }

        Ok(hands)
    }

    fn name(&self) -> &'static str {
        "palm + handpose (ort)"
    }
}
