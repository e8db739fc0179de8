mod assets;
mod display;
mod gesture;
mod model_download;
mod pipeline;
mod types;

use anyhow::{Context, Result};

use assets::MemeAssets;
use pipeline::{
    FaceDetectorConfig, FrameDispatcher, HandposeConfig, ModelPaths,
    recognizer::{FaceMeshEngine, HandposeEngine},
};

fn main() -> Result<()> {
    env_logger::init();

    let assets = MemeAssets::load(&MemeAssets::default_dir());

    let models = ModelPaths::default();
    let hand_engine = models
        .build_hand_engine(HandposeConfig::default())
        .context("hand tracking is required")?;
    let face_engine: Option<Box<dyn FaceMeshEngine>> =
        match models.build_face_engine(FaceDetectorConfig::default()) {
            Ok(engine) => Some(Box::new(engine)),
            Err(err) => {
                log::warn!("face tracking disabled: {err:#}");
                None
            }
        };
    let hand_engine: Box<dyn HandposeEngine> = Box::new(hand_engine);

    let dispatcher = FrameDispatcher::new(face_engine, Some(hand_engine), assets);

    run(dispatcher)
}

#[cfg(feature = "camera-nokhwa")]
fn run(mut dispatcher: FrameDispatcher) -> Result<()> {
    use display::MemeWindows;
    use nokhwa::utils::CameraIndex;
    use pipeline::{CameraCapture, camera_label, run_capture_loop};

    let index = CameraIndex::Index(0);
    if let Some(label) = camera_label(&index) {
        log::info!("using camera: {label}");
    }

    let mut camera = CameraCapture::open(index).context("failed to open camera")?;
    let (width, height) = camera.resolution();
    let mut windows = MemeWindows::open(width as usize, height as usize)?;
    log::info!("Press Q to quit");

    let result = run_capture_loop(&mut camera, &mut dispatcher, &mut windows);

    drop(windows);
    drop(camera);
    dispatcher.shutdown();

    let summary = result?;
    log::info!("stopped after {} frames", summary.frames);
    Ok(())
}

#[cfg(not(feature = "camera-nokhwa"))]
fn run(dispatcher: FrameDispatcher) -> Result<()> {
    dispatcher.shutdown();
    anyhow::bail!("built without camera support; enable the `camera-nokhwa` feature")
}
