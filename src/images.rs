use crate::error::PlatenError;
use image::DynamicImage;
use std::path::Path;

/// A decoded pixel buffer with a declared color space, ready for
/// embedding. Alpha planes ride along as separate 8-bit buffers and
/// become soft masks.
pub(crate) enum RasterImage {
    Rgb8 {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
    Gray8 {
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        alpha: Option<Vec<u8>>,
    },
    /// Bilevel data packed MSB first, rows padded to byte boundaries,
    /// bit value 1 meaning white. BitsPerComponent 1 on emission.
    Mono1 {
        width: u32,
        height: u32,
        rows: Vec<u8>,
    },
    /// Raw JPEG file bytes, embedded with /DCTDecode untouched.
    Jpeg {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
}

pub(crate) fn load_image_file(path: &Path) -> Result<RasterImage, PlatenError> {
    let is_jpeg = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false);
    if is_jpeg {
        return load_jpeg_file(path);
    }
    let decoded = image::open(path)
        .map_err(|e| PlatenError::InvalidImage(format!("{}: {}", path.display(), e)))?;
    decode_raster(decoded)
}

fn decode_raster(decoded: DynamicImage) -> Result<RasterImage, PlatenError> {
    match decoded {
        DynamicImage::ImageRgb8(img) => {
            let (width, height) = img.dimensions();
            Ok(RasterImage::Rgb8 {
                width,
                height,
                pixels: img.into_raw(),
                alpha: None,
            })
        }
        DynamicImage::ImageRgba8(img) => {
            let (width, height) = img.dimensions();
            let raw = img.into_raw();
            let mut pixels = Vec::with_capacity(raw.len() / 4 * 3);
            let mut alpha = Vec::with_capacity(raw.len() / 4);
            for px in raw.chunks_exact(4) {
                pixels.extend_from_slice(&px[..3]);
                alpha.push(px[3]);
            }
            Ok(RasterImage::Rgb8 {
                width,
                height,
                pixels,
                alpha: Some(alpha),
            })
        }
        DynamicImage::ImageLuma8(img) => {
            let (width, height) = img.dimensions();
            let pixels = img.into_raw();
            if pixels.iter().all(|&v| v == 0 || v == 255) {
                return Ok(RasterImage::Mono1 {
                    width,
                    height,
                    rows: pack_mono_rows(&pixels, width, height),
                });
            }
            Ok(RasterImage::Gray8 {
                width,
                height,
                pixels,
                alpha: None,
            })
        }
        DynamicImage::ImageLumaA8(img) => {
            let (width, height) = img.dimensions();
            let raw = img.into_raw();
            let mut pixels = Vec::with_capacity(raw.len() / 2);
            let mut alpha = Vec::with_capacity(raw.len() / 2);
            for px in raw.chunks_exact(2) {
                pixels.push(px[0]);
                alpha.push(px[1]);
            }
            Ok(RasterImage::Gray8 {
                width,
                height,
                pixels,
                alpha: Some(alpha),
            })
        }
        other => Err(PlatenError::InvalidImage(format!(
            "unsupported pixel format {:?}",
            other.color()
        ))),
    }
}

fn load_jpeg_file(path: &Path) -> Result<RasterImage, PlatenError> {
    let (width, height) = image::image_dimensions(path)
        .map_err(|e| PlatenError::InvalidImage(format!("{}: {}", path.display(), e)))?;
    let data = std::fs::read(path)?;
    Ok(RasterImage::Jpeg {
        width,
        height,
        data,
    })
}

/// Packs 8-bit bilevel samples into 1-bit rows, MSB first, each row
/// padded to a whole byte as required by PDF 8.9.3.
fn pack_mono_rows(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row_bytes = (width as usize + 7) / 8;
    let mut rows = Vec::with_capacity(row_bytes * height as usize);
    for y in 0..height as usize {
        let mut current: u8 = 0;
        let mut bits = 0;
        for x in 0..width as usize {
            current <<= 1;
            if pixels[y * width as usize + x] != 0 {
                current |= 1;
            }
            bits += 1;
            if bits == 8 {
                rows.push(current);
                current = 0;
                bits = 0;
            }
        }
        if bits > 0 {
            current <<= 8 - bits;
            rows.push(current);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_image_path(tag: &str, ext: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "platen_{tag}_{}_{}.{ext}",
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn rgb_png_decodes_without_alpha() {
        let path = temp_image_path("rgb", "png");
        let img = image::RgbImage::from_fn(3, 2, |x, _| image::Rgb([x as u8 * 100, 0, 0]));
        img.save(&path).unwrap();

        match load_image_file(&path).unwrap() {
            RasterImage::Rgb8 {
                width,
                height,
                pixels,
                alpha,
            } => {
                assert_eq!((width, height), (3, 2));
                assert_eq!(pixels.len(), 18);
                assert!(alpha.is_none());
            }
            _ => panic!("expected rgb image"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rgba_png_splits_alpha_plane() {
        let path = temp_image_path("rgba", "png");
        let img = image::RgbaImage::from_fn(2, 2, |x, y| {
            image::Rgba([10, 20, 30, if x == y { 255 } else { 0 }])
        });
        img.save(&path).unwrap();

        match load_image_file(&path).unwrap() {
            RasterImage::Rgb8 { pixels, alpha, .. } => {
                assert_eq!(pixels.len(), 12);
                assert_eq!(alpha.unwrap(), vec![255, 0, 0, 255]);
            }
            _ => panic!("expected rgb image with alpha"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn bilevel_gray_png_packs_to_one_bit() {
        let path = temp_image_path("mono", "png");
        let img =
            image::GrayImage::from_fn(2, 2, |x, y| image::Luma([if x == y { 255 } else { 0 }]));
        img.save(&path).unwrap();

        match load_image_file(&path).unwrap() {
            RasterImage::Mono1 {
                width,
                height,
                rows,
            } => {
                assert_eq!((width, height), (2, 2));
                assert_eq!(rows, vec![0x80, 0x40]);
            }
            _ => panic!("expected mono image"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn mid_gray_png_stays_eight_bit() {
        let path = temp_image_path("gray", "png");
        let img = image::GrayImage::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 10 } else { 200 }]));
        img.save(&path).unwrap();

        assert!(matches!(
            load_image_file(&path).unwrap(),
            RasterImage::Gray8 { alpha: None, .. }
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn jpeg_bytes_pass_through() {
        let path = temp_image_path("jpg", "jpg");
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([120, 130, 140]));
        img.save(&path).unwrap();

        let raw = std::fs::read(&path).unwrap();
        match load_image_file(&path).unwrap() {
            RasterImage::Jpeg {
                width,
                height,
                data,
            } => {
                assert_eq!((width, height), (4, 3));
                assert_eq!(data, raw);
            }
            _ => panic!("expected jpeg pass-through"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn row_padding_packs_partial_bytes() {
        // 9 pixels wide forces a second byte per row with 7 pad bits.
        let pixels: Vec<u8> = (0..9).map(|x| if x % 2 == 0 { 255 } else { 0 }).collect();
        let rows = pack_mono_rows(&pixels, 9, 1);
        assert_eq!(rows, vec![0b1010_1010, 0b1000_0000]);
    }
}
