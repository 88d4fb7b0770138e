//! Similarity plots: one strip of ranked candidate thumbnails per query row,
//! with score bars under each thumbnail.
//!
//! ```text
//! [best][2nd][3rd] ...   ← query 1
//!  ███   ██   █
//! [best][2nd][3rd] ...   ← query 2
//!  ███   ██   █
//! ```

use std::collections::HashMap;
use std::path::Path;

use image::{imageops, DynamicImage, Rgb, RgbImage};

use crate::dataset::Sample;
use crate::error::{Result, SimilarityError};
use crate::ranking::Ranking;

/// Thumbnail edge in pixels.
const THUMB_SIZE: u32 = 128;
/// Gap between and around tiles.
const PADDING: u32 = 8;
/// Height of the score bar area under each thumbnail.
const BAR_HEIGHT: u32 = 64;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BAR_COLOR: Rgb<u8> = Rgb([70, 110, 190]);
const BEST_COLOR: Rgb<u8> = Rgb([215, 90, 50]);
const MISSING_COLOR: Rgb<u8> = Rgb([200, 200, 200]);

/// Render one strip per ranking for `sample` and save the stack at `path`.
pub fn render_similarity(sample: &Sample, rankings: &[Ranking], path: &Path) -> Result<()> {
    let thumbnails: HashMap<&str, DynamicImage> = sample
        .candidates
        .iter()
        .zip(&sample.candidate_paths)
        .filter_map(|(id, p)| {
            image::open(p)
                .ok()
                .map(|img| (id.as_str(), img.thumbnail(THUMB_SIZE, THUMB_SIZE)))
        })
        .collect();

    let strips: Vec<RgbImage> = rankings
        .iter()
        .map(|ranking| {
            let thumbs: Vec<Option<&DynamicImage>> = ranking
                .candidates
                .iter()
                .map(|id| thumbnails.get(id.as_str()))
                .collect();
            compose(&thumbs, &ranking.scores)
        })
        .collect();
    let canvas = stack(&strips);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save(path).map_err(|e| SimilarityError::Image {
        path: path.to_path_buf(),
        message: format!("Failed to save plot: {e}"),
    })?;
    tracing::debug!("Saved similarity plot to {:?}", path);
    Ok(())
}

/// Lay out thumbnails left to right with bars scaled to the min–max score range.
fn compose(thumbnails: &[Option<&DynamicImage>], scores: &[f32]) -> RgbImage {
    let n = thumbnails.len().max(1) as u32;
    let width = n * (THUMB_SIZE + PADDING) + PADDING;
    let height = THUMB_SIZE + BAR_HEIGHT + 3 * PADDING;
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    let finite = scores.iter().copied().filter(|s| s.is_finite());
    let max = finite.clone().fold(f32::NEG_INFINITY, f32::max);
    let min = finite.fold(f32::INFINITY, f32::min);
    let range = (max - min).max(f32::EPSILON);

    for (i, thumb) in thumbnails.iter().enumerate() {
        let x = PADDING + i as u32 * (THUMB_SIZE + PADDING);

        match thumb {
            Some(img) => {
                let ox = x + (THUMB_SIZE - img.width()) / 2;
                let oy = PADDING + (THUMB_SIZE - img.height()) / 2;
                imageops::overlay(&mut canvas, &img.to_rgb8(), ox as i64, oy as i64);
            }
            None => fill(&mut canvas, x, PADDING, THUMB_SIZE, THUMB_SIZE, MISSING_COLOR),
        }

        let score = scores.get(i).copied().unwrap_or(f32::NAN);
        let fraction = if score.is_finite() {
            0.1 + 0.9 * (score - min) / range
        } else {
            0.0
        };
        let bar = (fraction * BAR_HEIGHT as f32).round() as u32;
        let baseline = THUMB_SIZE + BAR_HEIGHT + 2 * PADDING;
        let color = if i == 0 { BEST_COLOR } else { BAR_COLOR };
        fill(&mut canvas, x, baseline - bar, THUMB_SIZE, bar, color);
    }

    canvas
}

/// Stack strips top to bottom on a canvas as wide as the widest strip.
fn stack(strips: &[RgbImage]) -> RgbImage {
    let width = strips.iter().map(RgbImage::width).max().unwrap_or(1);
    let height = strips.iter().map(RgbImage::height).sum::<u32>().max(1);
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    let mut y = 0;
    for strip in strips {
        imageops::overlay(&mut canvas, strip, 0, y as i64);
        y += strip.height();
    }
    canvas
}

fn fill(canvas: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    for py in y..(y + h).min(canvas.height()) {
        for px in x..(x + w).min(canvas.width()) {
            canvas.put_pixel(px, py, color);
        }
    }
}
