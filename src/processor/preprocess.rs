use image::{imageops, RgbImage};
use ndarray::Array4;

/// Converts frames to model input tensors and model mattes back to frame size
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Resize to the model input size and build a [1, 3, H, W] tensor in [0, 1]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }

        tensor
    }

    /// Resize a row-major matte to the frame size
    pub fn resize_matte(
        matte: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Vec<f32> {
        let _span = tracing::debug_span!("postprocess").entered();

        if matte_width == target_width && matte_height == target_height {
            return matte.to_vec();
        }

        let gray = image::GrayImage::from_fn(matte_width, matte_height, |x, y| {
            let value = matte[(y * matte_width + x) as usize];
            image::Luma([(value * 255.0).clamp(0.0, 255.0) as u8])
        });

        imageops::resize(
            &gray,
            target_width,
            target_height,
            imageops::FilterType::Triangle,
        )
        .pixels()
        .map(|p| p[0] as f32 / 255.0)
        .collect()
    }

    /// Scale background pixels towards black by `1 - alpha`, keeping at
    /// least `floor` of the original brightness
    pub fn dim_background(frame: &mut RgbImage, matte: &[f32], floor: f32) {
        let width = frame.width();
        for (x, y, pixel) in frame.enumerate_pixels_mut() {
            let alpha = matte[(y * width + x) as usize].clamp(0.0, 1.0);
            let gain = floor + (1.0 - floor) * alpha;
            for channel in pixel.0.iter_mut() {
                *channel = (*channel as f32 * gain).round() as u8;
            }
        }
    }
}
