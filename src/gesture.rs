use crate::types::{
    FaceExpression, FaceLandmarks, GestureLabel, HandLandmarks, ThumbDirection,
};

// Face mesh indices.
const UPPER_INNER_LIP: usize = 13;
const LOWER_INNER_LIP: usize = 14;
const MOUTH_LEFT_CORNER: usize = 61;
const MOUTH_RIGHT_CORNER: usize = 291;
const FACE_LEFT_EDGE: usize = 234;
const FACE_RIGHT_EDGE: usize = 454;

// Hand keypoint indices.
const WRIST: usize = 0;
const THUMB_TIP: usize = 4;

const MOUTH_OPEN_THRESHOLD: f32 = 0.03;
const SMILE_RATIO_THRESHOLD: f32 = 0.4;
const THUMB_OFFSET: f32 = 0.05;

pub fn mouth_open(face: &FaceLandmarks) -> bool {
    (face.point(LOWER_INNER_LIP).y - face.point(UPPER_INNER_LIP).y).abs() > MOUTH_OPEN_THRESHOLD
}

/// Mouth width relative to face width. Zero when the face has no width.
pub fn smile_ratio(face: &FaceLandmarks) -> f32 {
    let mouth = face
        .point(MOUTH_LEFT_CORNER)
        .distance(&face.point(MOUTH_RIGHT_CORNER));
    let width = face
        .point(FACE_LEFT_EDGE)
        .distance(&face.point(FACE_RIGHT_EDGE));
    if width == 0.0 { 0.0 } else { mouth / width }
}

pub fn smiling(face: &FaceLandmarks) -> bool {
    smile_ratio(face) > SMILE_RATIO_THRESHOLD
}

pub fn classify_face(face: &FaceLandmarks) -> FaceExpression {
    if mouth_open(face) {
        FaceExpression::TongueOut
    } else if smiling(face) {
        FaceExpression::Smile
    } else {
        FaceExpression::Neutral
    }
}

pub fn thumb_direction(hand: &HandLandmarks) -> ThumbDirection {
    let wrist_y = hand.point(WRIST).y;
    let thumb_y = hand.point(THUMB_TIP).y;

    // Image y grows downward: a smaller y is visually higher.
    if thumb_y < wrist_y - THUMB_OFFSET {
        ThumbDirection::Up
    } else if thumb_y > wrist_y + THUMB_OFFSET {
        ThumbDirection::Down
    } else {
        ThumbDirection::Level
    }
}

/// Combines one frame's classifier outputs into a single label.
///
/// Starts from [`GestureLabel::Shock`]; a face expression overrides it, and every hand
/// with a definite thumb direction overrides whatever came before. The last such hand
/// wins, and a later level thumb never clears an earlier override.
pub fn resolve_gesture<I>(face: Option<FaceExpression>, hands: I) -> GestureLabel
where
    I: IntoIterator<Item = ThumbDirection>,
{
    let mut gesture = GestureLabel::Shock;

    if let Some(label) = face.and_then(|expr| expr.gesture()) {
        gesture = label;
    }

    for direction in hands {
        if let Some(label) = direction.gesture() {
            gesture = label;
        }
    }

    gesture
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::types::{
        FACE_LANDMARK_COUNT, FaceLandmarks, HAND_LANDMARK_COUNT, HandLandmarks, LandmarkPoint,
    };

    /// A closed-mouth face: lips 0.01 apart, mouth 0.3 wide on a 1.0 wide face.
    pub fn neutral_face() -> Vec<LandmarkPoint> {
        let mut points = vec![LandmarkPoint::new(0.5, 0.5); FACE_LANDMARK_COUNT];
        points[13] = LandmarkPoint::new(0.5, 0.60);
        points[14] = LandmarkPoint::new(0.5, 0.61);
        points[61] = LandmarkPoint::new(0.35, 0.62);
        points[291] = LandmarkPoint::new(0.65, 0.62);
        points[234] = LandmarkPoint::new(0.0, 0.5);
        points[454] = LandmarkPoint::new(1.0, 0.5);
        points
    }

    pub fn face(edit: impl FnOnce(&mut Vec<LandmarkPoint>)) -> FaceLandmarks {
        let mut points = neutral_face();
        edit(&mut points);
        FaceLandmarks::new(points).unwrap()
    }

    pub fn smiling_face() -> FaceLandmarks {
        face(|p| {
            p[61] = LandmarkPoint::new(0.25, 0.62);
            p[291] = LandmarkPoint::new(0.75, 0.62);
        })
    }

    pub fn open_mouth_face() -> FaceLandmarks {
        face(|p| {
            p[13] = LandmarkPoint::new(0.5, 0.40);
            p[14] = LandmarkPoint::new(0.5, 0.46);
        })
    }

    pub fn hand(wrist_y: f32, thumb_y: f32) -> HandLandmarks {
        let mut points = vec![LandmarkPoint::new(0.5, wrist_y); HAND_LANDMARK_COUNT];
        points[4] = LandmarkPoint::new(0.45, thumb_y);
        HandLandmarks::new(points).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{face, hand, open_mouth_face, smiling_face};
    use super::*;
    use crate::types::LandmarkPoint;

    #[test]
    fn test_open_mouth_is_tongue_out() {
        let face = open_mouth_face();
        assert!(mouth_open(&face));
        assert_eq!(classify_face(&face), FaceExpression::TongueOut);
    }

    #[test]
    fn test_open_mouth_wins_over_smile() {
        let face = face(|p| {
            p[13] = LandmarkPoint::new(0.5, 0.40);
            p[14] = LandmarkPoint::new(0.5, 0.46);
            p[61] = LandmarkPoint::new(0.2, 0.5);
            p[291] = LandmarkPoint::new(0.8, 0.5);
        });
        assert!(smiling(&face));
        assert_eq!(classify_face(&face), FaceExpression::TongueOut);
    }

    #[test]
    fn test_mouth_open_uses_absolute_difference() {
        let face = face(|p| {
            p[13] = LandmarkPoint::new(0.5, 0.50);
            p[14] = LandmarkPoint::new(0.5, 0.45);
        });
        assert!(mouth_open(&face));
    }

    #[test]
    fn test_wide_mouth_is_smile() {
        let face = smiling_face();
        assert!(!mouth_open(&face));
        assert!((smile_ratio(&face) - 0.5).abs() < 1e-5);
        assert_eq!(classify_face(&face), FaceExpression::Smile);
    }

    #[test]
    fn test_narrow_mouth_is_neutral() {
        let face = face(|_| {});
        assert!((smile_ratio(&face) - 0.3).abs() < 1e-5);
        assert_eq!(classify_face(&face), FaceExpression::Neutral);
    }

    #[test]
    fn test_smile_ratio_zero_face_width() {
        let face = face(|p| {
            p[234] = LandmarkPoint::new(0.3, 0.3);
            p[454] = LandmarkPoint::new(0.3, 0.3);
        });
        assert_eq!(smile_ratio(&face), 0.0);
        assert_eq!(classify_face(&face), FaceExpression::Neutral);
    }

    #[test]
    fn test_smile_ratio_uses_diagonal_distance() {
        // Tilted face: mouth 3-4-5 triangle over a 10 wide face.
        let face = face(|p| {
            p[61] = LandmarkPoint::new(0.0, 0.0);
            p[291] = LandmarkPoint::new(0.3, 0.4);
            p[234] = LandmarkPoint::new(0.0, 0.0);
            p[454] = LandmarkPoint::new(0.6, 0.8);
        });
        assert!((smile_ratio(&face) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_thumb_direction() {
        assert_eq!(thumb_direction(&hand(0.8, 0.6)), ThumbDirection::Up);
        assert_eq!(thumb_direction(&hand(0.5, 0.7)), ThumbDirection::Down);
        assert_eq!(thumb_direction(&hand(0.5, 0.52)), ThumbDirection::Level);
        assert_eq!(thumb_direction(&hand(0.5, 0.46)), ThumbDirection::Level);
    }

    #[test]
    fn test_resolve_defaults_to_shock() {
        assert_eq!(resolve_gesture(None, []), GestureLabel::Shock);
        assert_eq!(
            resolve_gesture(Some(FaceExpression::Neutral), [ThumbDirection::Level]),
            GestureLabel::Shock
        );
    }

    #[test]
    fn test_resolve_face_only() {
        assert_eq!(
            resolve_gesture(Some(FaceExpression::Smile), []),
            GestureLabel::Smile
        );
        assert_eq!(
            resolve_gesture(Some(FaceExpression::TongueOut), [ThumbDirection::Level]),
            GestureLabel::TongueOut
        );
    }

    #[test]
    fn test_resolve_hand_overrides_face() {
        assert_eq!(
            resolve_gesture(Some(FaceExpression::Smile), [ThumbDirection::Up]),
            GestureLabel::ThumbsUp
        );
        assert_eq!(
            resolve_gesture(Some(FaceExpression::TongueOut), [ThumbDirection::Down]),
            GestureLabel::ThumbsDown
        );
    }

    #[test]
    fn test_resolve_later_level_hand_keeps_override() {
        assert_eq!(
            resolve_gesture(None, [ThumbDirection::Up, ThumbDirection::Level]),
            GestureLabel::ThumbsUp
        );
    }

    #[test]
    fn test_resolve_last_definite_hand_wins() {
        assert_eq!(
            resolve_gesture(None, [ThumbDirection::Up, ThumbDirection::Down]),
            GestureLabel::ThumbsDown
        );
        assert_eq!(
            resolve_gesture(
                Some(FaceExpression::Smile),
                [ThumbDirection::Down, ThumbDirection::Level, ThumbDirection::Up]
            ),
            GestureLabel::ThumbsUp
        );
    }
}
