use std::{fmt, time::Instant};

use rayon::prelude::*;
use thiserror::Error;

pub const FACE_LANDMARK_COUNT: usize = 468;
pub const HAND_LANDMARK_COUNT: usize = 21;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    /// Flips the frame horizontally so the feed behaves like a mirror.
    pub fn mirrored(mut self) -> Self {
        let row_len = self.width as usize * 4;
        if row_len == 0 {
            return self;
        }
        self.rgba.par_chunks_exact_mut(row_len).for_each(|row| {
            let pixels = row.len() / 4;
            for x in 0..pixels / 2 {
                let (left, right) = row.split_at_mut((pixels - x - 1) * 4);
                left[x * 4..x * 4 + 4].swap_with_slice(&mut right[..4]);
            }
        });
        self
    }
}

/// A landmark in normalized image coordinates. Values outside [0, 1] are kept as is.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
}

impl LandmarkPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &LandmarkPoint) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LandmarkError {
    #[error("{kind} landmark set needs {expected} points, got {actual}")]
    WrongCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
}

fn check_count(
    kind: &'static str,
    expected: usize,
    points: &[LandmarkPoint],
) -> Result<(), LandmarkError> {
    if points.len() == expected {
        Ok(())
    } else {
        Err(LandmarkError::WrongCount {
            kind,
            expected,
            actual: points.len(),
        })
    }
}

/// The 468-point face mesh of a single face.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    points: Vec<LandmarkPoint>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<LandmarkPoint>) -> Result<Self, LandmarkError> {
        check_count("face", FACE_LANDMARK_COUNT, &points)?;
        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> LandmarkPoint {
        self.points[index]
    }
}

/// The 21 keypoints of a single hand.
#[derive(Clone, Debug, PartialEq)]
pub struct HandLandmarks {
    points: Vec<LandmarkPoint>,
}

impl HandLandmarks {
    pub fn new(points: Vec<LandmarkPoint>) -> Result<Self, LandmarkError> {
        check_count("hand", HAND_LANDMARK_COUNT, &points)?;
        Ok(Self { points })
    }

    pub fn point(&self, index: usize) -> LandmarkPoint {
        self.points[index]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GestureLabel {
    Smile,
    Shock,
    ThumbsUp,
    ThumbsDown,
    TongueOut,
}

impl GestureLabel {
    pub const ALL: [GestureLabel; 5] = [
        GestureLabel::Smile,
        GestureLabel::Shock,
        GestureLabel::ThumbsUp,
        GestureLabel::ThumbsDown,
        GestureLabel::TongueOut,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GestureLabel::Smile => "smile",
            GestureLabel::Shock => "shock",
            GestureLabel::ThumbsUp => "thumbs_up",
            GestureLabel::ThumbsDown => "thumbs_down",
            GestureLabel::TongueOut => "tongue_out",
        }
    }

    pub fn asset_file_name(&self) -> &'static str {
        match self {
            GestureLabel::Smile => "smile.jpeg",
            GestureLabel::Shock => "shock-disgusting.jpeg",
            GestureLabel::ThumbsUp => "thumbs-up.jpeg",
            GestureLabel::ThumbsDown => "thumbs-down.jpeg",
            GestureLabel::TongueOut => "tongue-out.jpeg",
        }
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaceExpression {
    TongueOut,
    Smile,
    Neutral,
}

impl FaceExpression {
    pub fn gesture(&self) -> Option<GestureLabel> {
        match self {
            FaceExpression::TongueOut => Some(GestureLabel::TongueOut),
            FaceExpression::Smile => Some(GestureLabel::Smile),
            FaceExpression::Neutral => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThumbDirection {
    Up,
    Down,
    Level,
}

impl ThumbDirection {
    pub fn gesture(&self) -> Option<GestureLabel> {
        match self {
            ThumbDirection::Up => Some(GestureLabel::ThumbsUp),
            ThumbDirection::Down => Some(GestureLabel::ThumbsDown),
            ThumbDirection::Level => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_sets_reject_wrong_count() {
        let err = HandLandmarks::new(vec![LandmarkPoint::default(); 20]).unwrap_err();
        assert_eq!(
            err,
            LandmarkError::WrongCount {
                kind: "hand",
                expected: 21,
                actual: 20
            }
        );
        assert!(FaceLandmarks::new(vec![LandmarkPoint::default(); 21]).is_err());
        assert!(FaceLandmarks::new(vec![LandmarkPoint::default(); 468]).is_ok());
    }

    #[test]
    fn test_landmark_distance() {
        let a = LandmarkPoint::new(0.1, 0.1);
        let b = LandmarkPoint::new(0.4, 0.5);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_frame_mirrored_reverses_rows() {
        let rgba = vec![
            1, 1, 1, 255, 2, 2, 2, 255, 3, 3, 3, 255, //
            4, 4, 4, 255, 5, 5, 5, 255, 6, 6, 6, 255,
        ];
        let frame = Frame {
            rgba,
            width: 3,
            height: 2,
            timestamp: Instant::now(),
        }
        .mirrored();

        let reds: Vec<u8> = frame.rgba.chunks_exact(4).map(|px| px[0]).collect();
        assert_eq!(reds, vec![3, 2, 1, 6, 5, 4]);
        assert!(frame.rgba.chunks_exact(4).all(|px| px[3] == 255));
    }

    #[test]
    fn test_gesture_label_names() {
        let names: Vec<&str> = GestureLabel::ALL.iter().map(|g| g.name()).collect();
        assert_eq!(
            names,
            vec!["smile", "shock", "thumbs_up", "thumbs_down", "tongue_out"]
        );
        assert_eq!(GestureLabel::Shock.asset_file_name(), "shock-disgusting.jpeg");
        assert_eq!(GestureLabel::ThumbsUp.to_string(), "thumbs_up");
    }
}
