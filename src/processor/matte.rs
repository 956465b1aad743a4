use super::preprocess::Preprocessor;
use super::FrameProcessor;
use crate::error::ProcessorError;
use crate::CameraId;
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Model input resolution
const INPUT_SIZE: u32 = 512;

/// Hidden states are computed at this fraction of the input resolution
const DOWNSAMPLE_RATIO: f32 = 0.25;

/// Brightness kept on pure background pixels
const BACKGROUND_FLOOR: f32 = 0.3;

/// RVM hidden states r1-r4
type Recurrent = [Array4<f32>; 4];

/// One inference step of a recurrent matting model
trait MatteModel: Send {
    /// Returns the [1, 1, H, W] alpha matte and the next hidden states
    fn infer(
        &mut self,
        src: &Array4<f32>,
        recurrent: &Recurrent,
    ) -> Result<(Array4<f32>, Recurrent), ProcessorError>;
}

/// Dims everything behind the person in frame, using a RobustVideoMatting
/// ONNX model.
///
/// The model is loaded on the first frame. If the file is missing every call
/// fails with `ProcessorError::Unavailable` and nothing else is affected.
/// RVM is recurrent: the hidden states r1-r4 are carried between frames of
/// the same camera, and each camera has its own.
pub struct BackgroundMatte {
    model_path: PathBuf,
    state: Mutex<Option<MatteState>>,
}

struct MatteState {
    model: Box<dyn MatteModel>,
    preprocessor: Preprocessor,
    recurrent: HashMap<CameraId, Recurrent>,
}

impl BackgroundMatte {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            state: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_model(model: Box<dyn MatteModel>, input_size: u32) -> Self {
        Self {
            model_path: PathBuf::new(),
            state: Mutex::new(Some(MatteState::new(model, input_size))),
        }
    }

    fn load(&self) -> Result<MatteState, ProcessorError> {
        let path = self.model_path.as_path();
        if !path.is_file() {
            return Err(ProcessorError::Unavailable(format!(
                "matte model not found at {}",
                path.display()
            )));
        }

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()
            .map_err(unavailable)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(unavailable)?
            .with_intra_threads(4)
            .map_err(unavailable)?
            .commit_from_file(path)
            .map_err(unavailable)?;

        tracing::info!("RVM model loaded successfully");

        Ok(MatteState::new(Box::new(RvmSession { session }), INPUT_SIZE))
    }
}

fn unavailable<E: std::fmt::Display>(e: E) -> ProcessorError {
    ProcessorError::Unavailable(e.to_string())
}

fn failed<E: std::fmt::Display>(e: E) -> ProcessorError {
    ProcessorError::Failed(e.to_string())
}

/// RVM accepts 1x1x1x1 zero tensors as the first-frame hidden state
fn initial_recurrent() -> Recurrent {
    std::array::from_fn(|_| Array4::zeros((1, 1, 1, 1)))
}

fn to_tensor(array: &Array4<f32>) -> Result<Tensor<f32>, ProcessorError> {
    let shape: [usize; 4] = [
        array.shape()[0],
        array.shape()[1],
        array.shape()[2],
        array.shape()[3],
    ];
    let data: Vec<f32> = array.iter().copied().collect();
    Tensor::from_array((shape, data)).map_err(failed)
}

fn to_array(shape: &[i64], data: &[f32]) -> Result<Array4<f32>, ProcessorError> {
    let dims = match shape {
        [a, b, c, d] => (*a as usize, *b as usize, *c as usize, *d as usize),
        other => {
            return Err(ProcessorError::Failed(format!(
                "expected a 4-d tensor, got shape {other:?}"
            )))
        }
    };
    Array4::from_shape_vec(dims, data.to_vec()).map_err(failed)
}

struct RvmSession {
    session: Session,
}

impl MatteModel for RvmSession {
    fn infer(
        &mut self,
        src: &Array4<f32>,
        recurrent: &Recurrent,
    ) -> Result<(Array4<f32>, Recurrent), ProcessorError> {
        let _span = tracing::debug_span!("inference").entered();

        let [r1, r2, r3, r4] = recurrent;
        let ratio = Tensor::from_array(([1usize], vec![DOWNSAMPLE_RATIO])).map_err(failed)?;

        let outputs = self
            .session
            .run(ort::inputs![
                "src" => to_tensor(src)?,
                "r1i" => to_tensor(r1)?,
                "r2i" => to_tensor(r2)?,
                "r3i" => to_tensor(r3)?,
                "r4i" => to_tensor(r4)?,
                "downsample_ratio" => ratio
            ])
            .map_err(failed)?;

        let mut next = initial_recurrent();
        for (slot, name) in next.iter_mut().zip(["r1o", "r2o", "r3o", "r4o"]) {
            let (shape, data) = outputs[name].try_extract_tensor::<f32>().map_err(failed)?;
            *slot = to_array(shape, data)?;
        }

        // pha: [1, 1, H, W]
        let (shape, data) = outputs["pha"].try_extract_tensor::<f32>().map_err(failed)?;
        let matte = to_array(shape, data)?;

        Ok((matte, next))
    }
}

impl MatteState {
    fn new(model: Box<dyn MatteModel>, input_size: u32) -> Self {
        Self {
            model,
            preprocessor: Preprocessor::new(input_size, input_size),
            recurrent: HashMap::new(),
        }
    }

    fn segment(&mut self, camera_id: CameraId, frame: &RgbImage) -> Result<Vec<f32>, ProcessorError> {
        let _span = tracing::debug_span!("rvm_segment", camera_id).entered();

        let src = self.preprocessor.preprocess(frame);
        let recurrent = self
            .recurrent
            .entry(camera_id)
            .or_insert_with(initial_recurrent);
        let (matte, next) = self.model.infer(&src, recurrent)?;
        *recurrent = next;

        let (_, _, matte_height, matte_width) = matte.dim();
        let flat: Vec<f32> = matte.iter().copied().collect();
        let (frame_width, frame_height) = frame.dimensions();
        Ok(Preprocessor::resize_matte(
            &flat,
            matte_width as u32,
            matte_height as u32,
            frame_width,
            frame_height,
        ))
    }
}

impl FrameProcessor for BackgroundMatte {
    fn apply(&self, camera_id: CameraId, mut frame: RgbImage) -> Result<RgbImage, ProcessorError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_none() {
            *state = Some(self.load()?);
        }
        let Some(matte_state) = state.as_mut() else {
            return Err(ProcessorError::Unavailable("matte model not loaded".into()));
        };

        let matte = matte_state.segment(camera_id, &frame)?;
        Preprocessor::dim_background(&mut frame, &matte, BACKGROUND_FLOOR);
        Ok(frame)
    }

    fn reset_state(&self, camera_id: CameraId) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(matte_state) = state.as_mut() {
            if matte_state.recurrent.remove(&camera_id).is_some() {
                tracing::info!(camera_id, "Resetting RVM hidden states");
            }
        }
    }
}
