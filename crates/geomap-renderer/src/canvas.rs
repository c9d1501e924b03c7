//! Raster operations used by the compositor.

use image::{imageops, Pixel, Rgba, RgbaImage};

use geomap_core::{Affine2D, Point};

/// Fill the whole canvas with `color`.
pub fn clear(canvas: &mut RgbaImage, color: Rgba<u8>) {
    for pixel in canvas.pixels_mut() {
        *pixel = color;
    }
}

/// Paint `layer` over `canvas` at the origin with source-over blending.
///
/// Opacity multiplies the layer's alpha uniformly, so a fully opaque layer
/// at opacity `a` over an opaque canvas yields `src * a + dst * (1 - a)`.
pub fn draw_layer(canvas: &mut RgbaImage, layer: &RgbaImage, opacity: f64) {
    if opacity <= 0.0 {
        return;
    }
    if opacity >= 1.0 {
        imageops::overlay(canvas, layer, 0, 0);
        return;
    }
    let mut faded = layer.clone();
    for pixel in faded.pixels_mut() {
        pixel[3] = (f64::from(pixel[3]) * opacity).round() as u8;
    }
    imageops::overlay(canvas, &faded, 0, 0);
}

/// Blend a single colour onto one pixel, ignoring out-of-bounds writes.
pub fn blend_pixel(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    canvas.get_pixel_mut(x as u32, y as u32).blend(&color);
}

/// Resample `canvas` through `transform` (screen space, nearest neighbour).
/// Destination pixels that map outside the source take `background`.
pub fn apply_transform(canvas: &RgbaImage, transform: &Affine2D, background: Rgba<u8>) -> RgbaImage {
    let inverse = match transform.inverse() {
        Ok(inverse) => inverse,
        Err(err) => {
            log::warn!("{err}; leaving composite untransformed");
            return canvas.clone();
        }
    };
    let (width, height) = canvas.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let src = inverse.apply(Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5));
        let (sx, sy) = (src.x.floor(), src.y.floor());
        if sx >= 0.0 && sy >= 0.0 && sx < f64::from(width) && sy < f64::from(height) {
            *canvas.get_pixel(sx as u32, sy as u32)
        } else {
            background
        }
    })
}
