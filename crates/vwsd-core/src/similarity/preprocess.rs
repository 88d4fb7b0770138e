//! Image preprocessing for CLIP vision encoders.
//!
//! CLIP expects:
//! - Shortest side resized to 224, then a 224×224 center crop
//! - Per-channel normalization with the OpenAI CLIP mean/std
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// CLIP normalization mean (per-channel).
const NORM_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// CLIP normalization std (per-channel).
const NORM_STD: [f32; 3] = [0.268_629_54, 0.261_302_6, 0.275_777_1];

/// Preprocess an image for CLIP inference.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let (width, height) = (image.width().max(1), image.height().max(1));
    let scale = image_size as f32 / width.min(height) as f32;
    let resized_w = ((width as f32 * scale).round() as u32).max(image_size);
    let resized_h = ((height as f32 * scale).round() as u32).max(image_size);

    let resized = image.resize_exact(
        resized_w,
        resized_h,
        image::imageops::FilterType::CatmullRom,
    );
    let left = (resized_w - image_size) / 2;
    let top = (resized_h - image_size) / 2;
    let rgb = resized.crop_imm(left, top, image_size, image_size).to_rgb8();

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..CHANNELS {
            tensor[[0, c, y as usize, x as usize]] =
                (pixel[c] as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn test_preprocess_shape_landscape() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(640, 480));
        let tensor = preprocess(&img, 224);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_shape_portrait_small() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(50, 120));
        let tensor = preprocess(&img, 224);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let img =
            DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, image::Rgb([255, 255, 255])));
        let tensor = preprocess(&img, 32);
        let expected = (1.0 - NORM_MEAN[0]) / NORM_STD[0];
        assert!((tensor[[0, 0, 5, 5]] - expected).abs() < 0.01);

        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, image::Rgb([0, 0, 0])));
        let tensor = preprocess(&img, 32);
        let expected = -NORM_MEAN[2] / NORM_STD[2];
        assert!((tensor[[0, 2, 0, 0]] - expected).abs() < 0.01);
    }
}
