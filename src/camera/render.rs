//! Shot rendering
//!
//! A grabbed frame is mirrored (selfie view) and the active filters are
//! composited in payload order using the CSS filter-effects formulas, so the
//! saved shot matches what the live preview showed.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage, imageops};

use crate::protocol::FilterSpec;
use crate::protocol::filter::{FilterEntry, FilterName};
use crate::{Error, Result};

type Matrix = [[f32; 3]; 3];

/// Mirror and filter a grabbed frame
#[must_use]
pub fn render(frame: &RgbaImage, filter: &FilterSpec) -> RgbaImage {
    let mut out = imageops::flip_horizontal(frame);
    for entry in filter.entries() {
        let Some(amount) = entry.amount() else {
            tracing::debug!(filter = %entry.name, value = %entry.value, "unparsable filter amount, skipped");
            continue;
        };
        apply(&mut out, entry, amount);
    }
    out
}

/// Encode as PNG bytes for upload
///
/// # Errors
///
/// Returns [`Error::Render`] if encoding fails
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| Error::Render(format!("png encode failed: {e}")))?;
    Ok(bytes.into_inner())
}

fn apply(image: &mut RgbaImage, entry: &FilterEntry, amount: f32) {
    match entry.name {
        FilterName::Grayscale => apply_matrix(image, &grayscale(amount.clamp(0.0, 1.0))),
        FilterName::Sepia => apply_matrix(image, &sepia(amount.clamp(0.0, 1.0))),
        FilterName::Saturate => apply_matrix(image, &saturate(amount.max(0.0))),
        FilterName::HueRotate => apply_matrix(image, &hue_rotate(amount)),
        FilterName::Invert => {
            let a = amount.clamp(0.0, 1.0);
            map_rgb(image, |c| c.mul_add(1.0 - 2.0 * a, a));
        }
        FilterName::Brightness => {
            let a = amount.max(0.0);
            map_rgb(image, |c| c * a);
        }
        FilterName::Contrast => {
            let a = amount.max(0.0);
            map_rgb(image, |c| (c - 0.5).mul_add(a, 0.5));
        }
        FilterName::Opacity => {
            let a = amount.clamp(0.0, 1.0);
            for px in image.pixels_mut() {
                px[3] = to_byte(to_unit(px[3]) * a);
            }
        }
    }
}

fn grayscale(a: f32) -> Matrix {
    let s = 1.0 - a;
    [
        [0.7874f32.mul_add(s, 0.2126), 0.7152 - 0.7152 * s, 0.0722 - 0.0722 * s],
        [0.2126 - 0.2126 * s, 0.2848f32.mul_add(s, 0.7152), 0.0722 - 0.0722 * s],
        [0.2126 - 0.2126 * s, 0.7152 - 0.7152 * s, 0.9278f32.mul_add(s, 0.0722)],
    ]
}

fn sepia(a: f32) -> Matrix {
    let s = 1.0 - a;
    [
        [0.607f32.mul_add(s, 0.393), 0.769 - 0.769 * s, 0.189 - 0.189 * s],
        [0.349 - 0.349 * s, 0.314f32.mul_add(s, 0.686), 0.168 - 0.168 * s],
        [0.272 - 0.272 * s, 0.534 - 0.534 * s, 0.869f32.mul_add(s, 0.131)],
    ]
}

fn saturate(s: f32) -> Matrix {
    [
        [0.787f32.mul_add(s, 0.213), 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.285f32.mul_add(s, 0.715), 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.928f32.mul_add(s, 0.072)],
    ]
}

fn hue_rotate(degrees: f32) -> Matrix {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn apply_matrix(image: &mut RgbaImage, m: &Matrix) {
    for px in image.pixels_mut() {
        let [r, g, b] = [to_unit(px[0]), to_unit(px[1]), to_unit(px[2])];
        for (channel, row) in m.iter().enumerate() {
            px[channel] = to_byte(row[2].mul_add(b, row[0].mul_add(r, row[1] * g)));
        }
    }
}

fn map_rgb(image: &mut RgbaImage, f: impl Fn(f32) -> f32) {
    for px in image.pixels_mut() {
        for channel in 0..3 {
            px[channel] = to_byte(f(to_unit(px[channel])));
        }
    }
}

fn to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    fn two_pixels() -> RgbaImage {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([200, 40, 10, 255]));
        img.put_pixel(1, 0, Rgba([0, 0, 255, 255]));
        img
    }

    #[test]
    fn frame_is_mirrored() {
        let out = render(&two_pixels(), &FilterSpec::none());
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(out.get_pixel(1, 0), &Rgba([200, 40, 10, 255]));
    }

    #[test]
    fn full_grayscale_equalizes_channels() {
        let spec = FilterSpec::none().with(FilterName::Grayscale, "100%");
        let out = render(&two_pixels(), &spec);
        for px in out.pixels() {
            assert!(px[0].abs_diff(px[1]) <= 1 && px[1].abs_diff(px[2]) <= 1, "{px:?}");
        }
    }

    #[test]
    fn zero_amount_sepia_is_identity() {
        let spec = FilterSpec::none().with(FilterName::Sepia, "0");
        let out = render(&two_pixels(), &spec);
        assert_eq!(out.get_pixel(1, 0), &Rgba([200, 40, 10, 255]));
    }

    #[test]
    fn invert_brightness_opacity() {
        let spec = FilterSpec::none().with(FilterName::Invert, "1");
        assert_eq!(
            render(&two_pixels(), &spec).get_pixel(0, 0),
            &Rgba([255, 255, 0, 255])
        );

        let spec = FilterSpec::none().with(FilterName::Brightness, "0");
        assert_eq!(
            render(&two_pixels(), &spec).get_pixel(1, 0),
            &Rgba([0, 0, 0, 255])
        );

        let spec = FilterSpec::none().with(FilterName::Opacity, "50%");
        assert_eq!(render(&two_pixels(), &spec).get_pixel(0, 0)[3], 128);
    }

    #[test]
    fn filters_compose_in_order() {
        let dark_then_invert = FilterSpec::none()
            .with(FilterName::Brightness, "0")
            .with(FilterName::Invert, "1");
        assert_eq!(
            render(&two_pixels(), &dark_then_invert).get_pixel(0, 0),
            &Rgba([255, 255, 255, 255])
        );
    }

    #[test]
    fn unparsable_amounts_are_skipped() {
        let spec = FilterSpec::none().with(FilterName::Contrast, "lots");
        let out = render(&two_pixels(), &spec);
        assert_eq!(out.get_pixel(1, 0), &Rgba([200, 40, 10, 255]));
    }

    #[test]
    fn png_has_signature() {
        let bytes = encode_png(&two_pixels()).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
