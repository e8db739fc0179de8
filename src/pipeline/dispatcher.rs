use anyhow::Result;

use super::{
    FrameSource,
    recognizer::{FaceMeshEngine, HandposeEngine},
};
use crate::{
    assets::MemeAssets,
    display::GestureDisplay,
    gesture::{classify_face, resolve_gesture, thumb_direction},
    types::{Frame, GestureLabel},
};

/// Per-frame decision, kept for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameOutcome {
    pub gesture: GestureLabel,
    pub face_detected: bool,
    pub hands_detected: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
}

/// Owns the detector engines and the meme assets; turns each frame into one gesture.
pub struct FrameDispatcher {
    face_engine: Option<Box<dyn FaceMeshEngine>>,
    hand_engine: Option<Box<dyn HandposeEngine>>,
    assets: MemeAssets,
}

impl FrameDispatcher {
    pub fn new(
        face_engine: Option<Box<dyn FaceMeshEngine>>,
        hand_engine: Option<Box<dyn HandposeEngine>>,
        assets: MemeAssets,
    ) -> Self {
        Self {
            face_engine,
            hand_engine,
            assets,
        }
    }

    /// Runs both detectors and resolves the frame's gesture. A detector that fails
    /// counts as having found nothing for this frame.
    pub fn process(&mut self, frame: &Frame) -> FrameOutcome {
        let face = match self.face_engine.as_mut() {
            Some(engine) => engine.detect_face(frame).unwrap_or_else(|err| {
                log::warn!("face detection failed: {err:?}");
                None
            }),
            None => None,
        };

        let hands = match self.hand_engine.as_mut() {
            Some(engine) => engine.detect_hands(frame).unwrap_or_else(|err| {
                log::warn!("hand detection failed: {err:?}");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let gesture = resolve_gesture(
            face.as_ref().map(classify_face),
            hands.iter().map(thumb_direction),
        );

        FrameOutcome {
            gesture,
            face_detected: face.is_some(),
            hands_detected: hands.len(),
        }
    }

    /// Processes one frame and hands it to the display with its meme.
    pub fn dispatch<D: GestureDisplay>(
        &mut self,
        frame: &Frame,
        display: &mut D,
    ) -> Result<FrameOutcome> {
        let outcome = self.process(frame);
        log::debug!(
            "gesture {} (face: {}, hands: {}) in {:?}",
            outcome.gesture,
            outcome.face_detected,
            outcome.hands_detected,
            frame.timestamp.elapsed()
        );

        display.show(frame, self.assets.get(outcome.gesture))?;
        Ok(outcome)
    }

    /// Releases the detector engines.
    pub fn shutdown(self) {
        if let Some(engine) = self.face_engine {
            log::info!("releasing face engine: {}", engine.name());
        }
        if let Some(engine) = self.hand_engine {
            log::info!("releasing hand engine: {}", engine.name());
        }
    }
}

/// Capture, dispatch and render until the source ends or the display asks to quit.
pub fn run_capture_loop<S, D>(
    source: &mut S,
    dispatcher: &mut FrameDispatcher,
    display: &mut D,
) -> Result<RunSummary>
where
    S: FrameSource,
    D: GestureDisplay,
{
    let mut summary = RunSummary::default();

    loop {
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::info!("camera stream ended: {err:#}");
                break;
            }
        };

        dispatcher.dispatch(&frame, display)?;
        summary.frames += 1;

        if display.quit_requested() {
            log::info!("quit requested");
            break;
        }
    }

    Ok(summary)
}
