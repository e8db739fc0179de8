//! Shared decoding for MediaPipe's single-shot detectors (palm and BlazeFace).
//!
//! Both models regress a box and a few keypoints relative to a fixed grid of
//! anchors; the anchors only differ in input size.

use std::cmp::Ordering;

use anyhow::{Result, anyhow};

use super::common::LetterboxInfo;

const ANCHOR_STRIDES: [u32; 4] = [8, 16, 16, 16];
const ANCHORS_PER_LAYER: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub cx: f32,
    pub cy: f32,
}

/// Generates anchor centres the way MediaPipe's `SsdAnchorsCalculator` does with
/// `fixed_anchor_size` set: layers sharing a stride are merged per grid cell.
pub fn generate_anchors(input_size: u32) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    let mut layer = 0;
    while layer < ANCHOR_STRIDES.len() {
        let stride = ANCHOR_STRIDES[layer];
        let mut last_same_stride = layer;
        while last_same_stride < ANCHOR_STRIDES.len() && ANCHOR_STRIDES[last_same_stride] == stride
        {
            last_same_stride += 1;
        }
        let per_cell = (last_same_stride - layer) * ANCHORS_PER_LAYER;
        let grid = input_size.div_ceil(stride);

        for y in 0..grid {
            for x in 0..grid {
                let anchor = Anchor {
                    cx: (x as f32 + 0.5) / grid as f32,
                    cy: (y as f32 + 0.5) / grid as f32,
                };
                anchors.extend(std::iter::repeat_n(anchor, per_cell));
            }
        }
        layer = last_same_stride;
    }
    anchors
}

#[derive(Clone, Debug)]
pub struct DetectorConfig {
    pub input_size: u32,
    pub keypoints: usize,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

/// A detection in frame pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub keypoints: Vec<(f32, f32)>,
    pub score: f32,
}

impl Detection {
    pub fn center(&self) -> (f32, f32) {
        (
            (self.bbox[0] + self.bbox[2]) * 0.5,
            (self.bbox[1] + self.bbox[3]) * 0.5,
        )
    }

    pub fn size(&self) -> (f32, f32) {
        (
            (self.bbox[2] - self.bbox[0]).abs(),
            (self.bbox[3] - self.bbox[1]).abs(),
        )
    }
}

/// Turns raw `[batch, anchors, features]` regressors and `[batch, anchors, 1]` logits
/// into detections sorted by descending score.
pub fn decode_detections(
    regressors: &[f32],
    regressor_shape: &[usize],
    scores: &[f32],
    score_shape: &[usize],
    anchors: &[Anchor],
    letterbox: &LetterboxInfo,
    cfg: &DetectorConfig,
) -> Result<Vec<Detection>> {
    let [.., anchor_dim, feature_dim] = regressor_shape else {
        return Err(anyhow!(
            "unexpected regressor shape {regressor_shape:?}, need [batch, anchors, features]"
        ));
    };
    let [.., score_anchor_dim, score_feature_dim] = score_shape else {
        return Err(anyhow!(
            "unexpected score shape {score_shape:?}, need [batch, anchors, 1]"
        ));
    };
    let (anchor_dim, feature_dim) = (*anchor_dim, *feature_dim);
    let (score_anchor_dim, score_feature_dim) = (*score_anchor_dim, *score_feature_dim);

    if feature_dim < 4 + cfg.keypoints * 2 {
        return Err(anyhow!("regressor feature dimension too small: {feature_dim}"));
    }
    if anchor_dim != score_anchor_dim {
        return Err(anyhow!(
            "anchor dimension mismatch between boxes ({anchor_dim}) and scores ({score_anchor_dim})"
        ));
    }
    if regressors.len() < anchor_dim * feature_dim
        || scores.len() < anchor_dim * score_feature_dim
    {
        return Err(anyhow!("detector outputs shorter than their shapes"));
    }

    let input = cfg.input_size as f32;
    let to_frame = |nx: f32, ny: f32| letterbox.unproject(nx, ny, cfg.input_size);

    let mut candidates = Vec::new();
    for (idx, anchor) in anchors.iter().take(anchor_dim).enumerate() {
        let score = sigmoid(scores[idx * score_feature_dim]);
        if score < cfg.score_threshold {
            continue;
        }

        let raw = &regressors[idx * feature_dim..(idx + 1) * feature_dim];
        let cx = raw[0] / input + anchor.cx;
        let cy = raw[1] / input + anchor.cy;
        let hw = raw[2] / input / 2.0;
        let hh = raw[3] / input / 2.0;
        if hw <= 0.0 || hh <= 0.0 {
            continue;
        }

        let (x1, y1) = to_frame(cx - hw, cy - hh);
        let (x2, y2) = to_frame(cx + hw, cy + hh);
        let keypoints = raw[4..4 + cfg.keypoints * 2]
            .chunks_exact(2)
            .map(|kp| to_frame(kp[0] / input + anchor.cx, kp[1] / input + anchor.cy))
            .collect();

        candidates.push(Detection {
            bbox: clamp_box([x1, y1, x2, y2], letterbox.orig_w, letterbox.orig_h),
            keypoints,
            score,
        });
    }

    Ok(nms(candidates, cfg.nms_threshold, cfg.top_k))
}

fn nms(mut candidates: Vec<Detection>, threshold: f32, top_k: usize) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if keep.len() >= top_k {
            break;
        }
        if keep
            .iter()
            .all(|kept| iou(&candidate.bbox, &kept.bbox) < threshold)
        {
            keep.push(candidate);
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;
    if inter <= 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn clamp_box(bbox: [f32; 4], w: u32, h: u32) -> [f32; 4] {
    let max_w = w.saturating_sub(1) as f32;
    let max_h = h.saturating_sub(1) as f32;
    [
        bbox[0].clamp(0.0, max_w),
        bbox[1].clamp(0.0, max_h),
        bbox[2].clamp(0.0, max_w),
        bbox[3].clamp(0.0, max_h),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_letterbox(size: u32) -> LetterboxInfo {
        LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: size,
            orig_h: size,
        }
    }

    fn cfg(input_size: u32) -> DetectorConfig {
        DetectorConfig {
            input_size,
            keypoints: 1,
            score_threshold: 0.5,
            nms_threshold: 0.3,
            top_k: 8,
        }
    }

    #[test]
    fn test_anchor_counts() {
        assert_eq!(generate_anchors(192).len(), 2016);
        assert_eq!(generate_anchors(128).len(), 896);
    }

    #[test]
    fn test_anchor_layout() {
        let anchors = generate_anchors(128);
        assert_eq!(anchors[0], Anchor { cx: 0.5 / 16.0, cy: 0.5 / 16.0 });
        assert_eq!(anchors[0], anchors[1]);
        assert_eq!(anchors[2].cx, 1.5 / 16.0);
        // The stride-16 layers start after 16x16 cells of two anchors each.
        assert_eq!(anchors[512], Anchor { cx: 0.5 / 8.0, cy: 0.5 / 8.0 });
        assert_eq!(anchors[517], anchors[512]);
        assert_eq!(anchors[518].cx, 1.5 / 8.0);
    }

    #[test]
    fn test_decode_single_detection() {
        let anchors = vec![Anchor { cx: 0.5, cy: 0.5 }, Anchor { cx: 0.25, cy: 0.25 }];
        // [dx, dy, w, h, kx, ky] per anchor, in input pixels.
        let regressors = [
            10.0, 0.0, 20.0, 40.0, -5.0, 5.0, //
            0.0, 0.0, 10.0, 10.0, 0.0, 0.0,
        ];
        let scores = [4.0, -4.0];

        let detections = decode_detections(
            &regressors,
            &[1, 2, 6],
            &scores,
            &[1, 2, 1],
            &anchors,
            &square_letterbox(100),
            &cfg(100),
        )
        .unwrap();

        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert!(det.score > 0.98);
        let expected = [50.0, 30.0, 70.0, 70.0];
        for (got, want) in det.bbox.iter().zip(expected) {
            assert!((got - want).abs() < 1e-3, "{:?}", det.bbox);
        }
        assert!((det.keypoints[0].0 - 45.0).abs() < 1e-3);
        assert!((det.keypoints[0].1 - 55.0).abs() < 1e-3);
        let (cx, cy) = det.center();
        assert!((cx - 60.0).abs() < 1e-3 && (cy - 50.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let anchors = generate_anchors(128);
        let result = decode_detections(
            &[0.0; 4],
            &[4],
            &[0.0],
            &[1, 1, 1],
            &anchors,
            &square_letterbox(128),
            &cfg(128),
        );
        assert!(result.is_err());

        let result = decode_detections(
            &[0.0; 12],
            &[1, 2, 6],
            &[0.0; 3],
            &[1, 3, 1],
            &anchors,
            &square_letterbox(128),
            &cfg(128),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let det = |bbox: [f32; 4], score: f32| Detection {
            bbox,
            keypoints: Vec::new(),
            score,
        };
        let kept = nms(
            vec![
                det([0.0, 0.0, 10.0, 10.0], 0.7),
                det([1.0, 1.0, 11.0, 11.0], 0.9),
                det([50.0, 50.0, 60.0, 60.0], 0.8),
            ],
            0.3,
            8,
        );
        let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
        assert_eq!(scores, vec![0.9, 0.8]);
    }

    #[test]
    fn test_iou() {
        assert_eq!(iou(&[0.0, 0.0, 2.0, 2.0], &[2.0, 2.0, 4.0, 4.0]), 0.0);
        assert!((iou(&[0.0, 0.0, 2.0, 2.0], &[1.0, 0.0, 3.0, 2.0]) - 1.0 / 3.0).abs() < 1e-6);
    }
}
