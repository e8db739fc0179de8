use std::{f32::consts::PI, path::Path};

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::types::Frame;

use super::{
    common::{InputRange, prepare_letterbox},
    ssd::{Anchor, Detection, DetectorConfig, decode_detections, generate_anchors},
};

const PALM_INPUT_SIZE: u32 = 192;
const PALM_KEYPOINTS: usize = 7;
// Expand generously to avoid cropping fingers away.
const PALM_CROP_EXPANSION: f32 = 2.4;
const MIN_PALM_CROP: f32 = 80.0;

#[derive(Clone, Debug)]
pub struct PalmDetectorConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PalmDetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 32,
        }
    }
}

pub struct PalmDetector {
    session: Session,
    anchors: Vec<Anchor>,
    cfg: DetectorConfig,
}

impl PalmDetector {
    pub fn new(model_path: &Path, cfg: PalmDetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| {
                format!("failed to load palm detector from {}", model_path.display())
            })?;

        Ok(Self {
            session,
            anchors: generate_anchors(PALM_INPUT_SIZE),
            cfg: DetectorConfig {
                input_size: PALM_INPUT_SIZE,
                keypoints: PALM_KEYPOINTS,
                score_threshold: cfg.score_threshold,
                nms_threshold: cfg.nms_threshold,
                top_k: cfg.top_k,
            },
        })
    }

    /// Palms in frame pixels, best first.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, letterbox) = prepare_letterbox(frame, PALM_INPUT_SIZE, InputRange::ZeroToOne)?;
        let tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run palm detector session")?;

        if outputs.len() < 2 {
            return Err(anyhow!(
                "palm detector returned {} outputs, expected at least 2",
                outputs.len()
            ));
        }

        let boxes = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;

        decode_detections(
            boxes
                .as_slice()
                .ok_or_else(|| anyhow!("palm boxes not contiguous"))?,
            boxes.shape(),
            scores
                .as_slice()
                .ok_or_else(|| anyhow!("palm scores not contiguous"))?,
            scores.shape(),
            &self.anchors,
            &letterbox,
            &self.cfg,
        )
    }
}

/// Square crop `(center, side, angle)` around a palm, rotated so the fingers point up.
pub fn crop_from_palm(palm: &Detection) -> ((f32, f32), f32, f32) {
    let center = if palm.keypoints.is_empty() {
        palm.center()
    } else {
        let (sum_x, sum_y) = palm
            .keypoints
            .iter()
            .fold((0.0_f32, 0.0_f32), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        let n = palm.keypoints.len() as f32;
        (sum_x / n, sum_y / n)
    };

    let (base_w, base_h) = palm.size();
    let keypoint_span = if palm.keypoints.is_empty() {
        0.0
    } else {
        let (min_x, max_x, min_y, max_y) = palm
            .keypoints
            .iter()
            .fold((f32::MAX, f32::MIN, f32::MAX, f32::MIN), |acc, (x, y)| {
                (acc.0.min(*x), acc.1.max(*x), acc.2.min(*y), acc.3.max(*y))
            });
        (max_x - min_x).max(max_y - min_y)
    };
    let side = base_w.max(base_h).max(keypoint_span).max(MIN_PALM_CROP) * PALM_CROP_EXPANSION;

    (center, side, estimate_orientation(&palm.keypoints))
}

/// Principal axis of the palm keypoints, turned so it points up the crop.
fn estimate_orientation(keypoints: &[(f32, f32)]) -> f32 {
    if keypoints.len() < 2 {
        return 0.0;
    }

    let n = keypoints.len() as f32;
    let (sx, sy) = keypoints
        .iter()
        .fold((0.0_f32, 0.0_f32), |acc, (x, y)| (acc.0 + x, acc.1 + y));
    let mean = (sx / n, sy / n);

    let (mut cov_xx, mut cov_xy, mut cov_yy) = (0.0, 0.0, 0.0);
    for (x, y) in keypoints {
        let dx = x - mean.0;
        let dy = y - mean.1;
        cov_xx += dx * dx;
        cov_xy += dx * dy;
        cov_yy += dy * dy;
    }
    cov_xx /= n;
    cov_xy /= n;
    cov_yy /= n;

    let trace = cov_xx + cov_yy;
    let det = cov_xx * cov_yy - cov_xy * cov_xy;
    let lambda1 = (trace * 0.5 + ((trace * 0.5).powi(2) - det).max(0.0).sqrt()).max(1e-6);
    let (vx, vy) = if cov_xy.abs() > 1e-6 {
        (lambda1 - cov_yy, cov_xy)
    } else if cov_xx >= cov_yy {
        (1.0, 0.0)
    } else {
        (0.0, 1.0)
    };

    vy.atan2(vx) - PI * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palm(bbox: [f32; 4], keypoints: Vec<(f32, f32)>) -> Detection {
        Detection {
            bbox,
            keypoints,
            score: 0.9,
        }
    }

    #[test]
    fn test_crop_without_keypoints_uses_box() {
        let (center, side, angle) = crop_from_palm(&palm([100.0, 100.0, 200.0, 160.0], vec![]));
        assert_eq!(center, (150.0, 130.0));
        assert!((side - 100.0 * PALM_CROP_EXPANSION).abs() < 1e-3);
        assert_eq!(angle, 0.0);
    }

    #[test]
    fn test_crop_has_minimum_side() {
        let (_, side, _) = crop_from_palm(&palm([10.0, 10.0, 20.0, 20.0], vec![]));
        assert!((side - MIN_PALM_CROP * PALM_CROP_EXPANSION).abs() < 1e-3);
    }

    #[test]
    fn test_orientation_of_horizontal_keypoints() {
        let keypoints = vec![(0.0, 50.0), (50.0, 50.0), (100.0, 50.0)];
        let angle = estimate_orientation(&keypoints);
        assert!((angle + PI * 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_orientation_of_vertical_keypoints() {
        let keypoints = vec![(50.0, 0.0), (50.0, 50.0), (50.0, 100.0)];
        assert!(estimate_orientation(&keypoints).abs() < 1e-4);
    }
}
