use crate::error::PlatenError;
use crate::types::{ColorProfiles, DeviceCmyk, DeviceGray, DeviceRgb};
use std::path::Path;

// Rec. 709 luma weights, applied with the relative colorimetric intent
// the rest of the pipeline assumes.
const LUMA_R: f64 = 0.2126;
const LUMA_G: f64 = 0.7152;
const LUMA_B: f64 = 0.0722;

/// Converts colors between the three device spaces and holds the raw
/// ICC profile blobs that get embedded as /ICCBased streams. All
/// conversions are pure functions of their inputs.
pub struct ColorConverter {
    rgb_profile: Option<Vec<u8>>,
    gray_profile: Option<Vec<u8>>,
    cmyk_profile: Option<Vec<u8>>,
}

impl ColorConverter {
    pub(crate) fn new(profiles: &ColorProfiles) -> Result<Self, PlatenError> {
        let rgb_profile = load_profile(profiles.rgb.as_deref(), 3)?;
        let gray_profile = load_profile(profiles.gray.as_deref(), 1)?;
        let cmyk_profile = load_profile(profiles.cmyk.as_deref(), 4)?;
        Ok(Self {
            rgb_profile,
            gray_profile,
            cmyk_profile,
        })
    }

    pub(crate) fn rgb_profile(&self) -> Option<&[u8]> {
        self.rgb_profile.as_deref()
    }

    pub(crate) fn gray_profile(&self) -> Option<&[u8]> {
        self.gray_profile.as_deref()
    }

    pub(crate) fn cmyk_profile(&self) -> Option<&[u8]> {
        self.cmyk_profile.as_deref()
    }

    pub fn to_gray(&self, rgb: &DeviceRgb) -> DeviceGray {
        DeviceGray::new(LUMA_R * rgb.r.v() + LUMA_G * rgb.g.v() + LUMA_B * rgb.b.v())
    }

    pub fn to_cmyk(&self, rgb: &DeviceRgb) -> DeviceCmyk {
        let (r, g, b) = (rgb.r.v(), rgb.g.v(), rgb.b.v());
        let k = 1.0 - r.max(g).max(b);
        if k >= 1.0 - 1e-9 {
            return DeviceCmyk::new(0.0, 0.0, 0.0, 1.0);
        }
        let c = (1.0 - r - k) / (1.0 - k);
        let m = (1.0 - g - k) / (1.0 - k);
        let y = (1.0 - b - k) / (1.0 - k);
        DeviceCmyk::new(c, m, y, k)
    }

    pub fn cmyk_to_rgb(&self, cmyk: &DeviceCmyk) -> DeviceRgb {
        let k = cmyk.k.v();
        DeviceRgb::new(
            (1.0 - cmyk.c.v()) * (1.0 - k),
            (1.0 - cmyk.m.v()) * (1.0 - k),
            (1.0 - cmyk.y.v()) * (1.0 - k),
        )
    }

    pub fn gray_to_rgb(&self, gray: &DeviceGray) -> DeviceRgb {
        let v = gray.v.v();
        DeviceRgb::new(v, v, v)
    }

    /// Converts an 8-bit RGB pixel buffer to single channel gray.
    pub(crate) fn rgb_pixels_to_gray(&self, rgb: &[u8]) -> Vec<u8> {
        debug_assert!(rgb.len() % 3 == 0);
        let mut out = Vec::with_capacity(rgb.len() / 3);
        for px in rgb.chunks_exact(3) {
            let v = LUMA_R * px[0] as f64 + LUMA_G * px[1] as f64 + LUMA_B * px[2] as f64;
            out.push(v.round().clamp(0.0, 255.0) as u8);
        }
        out
    }

    /// Converts an 8-bit RGB pixel buffer to four channel CMYK.
    pub(crate) fn rgb_pixels_to_cmyk(&self, rgb: &[u8]) -> Vec<u8> {
        debug_assert!(rgb.len() % 3 == 0);
        let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
        for px in rgb.chunks_exact(3) {
            let rgb = DeviceRgb::new(
                px[0] as f64 / 255.0,
                px[1] as f64 / 255.0,
                px[2] as f64 / 255.0,
            );
            let cmyk = self.to_cmyk(&rgb);
            for channel in [cmyk.c.v(), cmyk.m.v(), cmyk.y.v(), cmyk.k.v()] {
                out.push((channel * 255.0).round().clamp(0.0, 255.0) as u8);
            }
        }
        out
    }
}

fn load_profile(
    path: Option<&Path>,
    expected_channels: u32,
) -> Result<Option<Vec<u8>>, PlatenError> {
    let Some(path) = path else {
        return Ok(None);
    };
    let data = std::fs::read(path)?;
    validate_icc_profile(&data, expected_channels)?;
    Ok(Some(data))
}

/// Checks the ICC header signature and that the profile's data color
/// space matches the declared channel count.
pub(crate) fn validate_icc_profile(
    data: &[u8],
    expected_channels: u32,
) -> Result<(), PlatenError> {
    let channels = icc_channel_count(data)?;
    if channels != expected_channels {
        return Err(PlatenError::InvalidIccProfile(format!(
            "profile has {} channels, expected {}",
            channels, expected_channels
        )));
    }
    Ok(())
}

pub(crate) fn icc_channel_count(data: &[u8]) -> Result<u32, PlatenError> {
    if data.len() < 132 {
        return Err(PlatenError::InvalidIccProfile(
            "profile shorter than the 132 byte header".to_string(),
        ));
    }
    if &data[36..40] != b"acsp" {
        return Err(PlatenError::InvalidIccProfile(
            "missing acsp signature".to_string(),
        ));
    }
    match &data[16..20] {
        b"GRAY" => Ok(1),
        b"RGB " => Ok(3),
        b"Lab " => Ok(3),
        b"XYZ " => Ok(3),
        b"CMYK" => Ok(4),
        sig => Err(PlatenError::InvalidIccProfile(format!(
            "unsupported data color space {:?}",
            String::from_utf8_lossy(sig)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColorProfiles;

    fn converter() -> ColorConverter {
        ColorConverter::new(&ColorProfiles::default()).unwrap()
    }

    #[test]
    fn gray_round_trip_is_close() {
        let cm = converter();
        for step in 0..=255u32 {
            let g = step as f64 / 255.0;
            let back = cm.to_gray(&cm.gray_to_rgb(&DeviceGray::new(g)));
            assert!(
                (back.v.v() - g).abs() <= 1.0 / 255.0,
                "gray {} came back as {}",
                g,
                back.v.v()
            );
        }
    }

    #[test]
    fn cmyk_round_trip_is_close() {
        let cm = converter();
        let samples = [
            (0.0, 0.0, 0.0),
            (1.0, 1.0, 1.0),
            (1.0, 0.0, 0.0),
            (0.25, 0.5, 0.75),
            (0.9, 0.1, 0.4),
        ];
        for (r, g, b) in samples {
            let cmyk = cm.to_cmyk(&DeviceRgb::new(r, g, b));
            let back = cm.cmyk_to_rgb(&cmyk);
            for (channel, reference) in [(back.r.v(), r), (back.g.v(), g), (back.b.v(), b)] {
                assert!(
                    (channel - reference).abs() <= 2.0 / 255.0,
                    "rgb ({}, {}, {}) came back as ({}, {}, {})",
                    r,
                    g,
                    b,
                    back.r.v(),
                    back.g.v(),
                    back.b.v()
                );
            }
        }
    }

    #[test]
    fn black_maps_to_pure_k() {
        let cm = converter();
        let cmyk = cm.to_cmyk(&DeviceRgb::new(0.0, 0.0, 0.0));
        assert_eq!(cmyk.c.v(), 0.0);
        assert_eq!(cmyk.m.v(), 0.0);
        assert_eq!(cmyk.y.v(), 0.0);
        assert_eq!(cmyk.k.v(), 1.0);
    }

    #[test]
    fn pixel_conversion_lengths() {
        let cm = converter();
        let rgb = [255u8, 0, 0, 0, 255, 0, 0, 0, 255];
        assert_eq!(cm.rgb_pixels_to_gray(&rgb).len(), 3);
        assert_eq!(cm.rgb_pixels_to_cmyk(&rgb).len(), 12);
    }

    #[test]
    fn icc_header_validation() {
        assert!(matches!(
            icc_channel_count(&[0u8; 10]),
            Err(PlatenError::InvalidIccProfile(_))
        ));

        let mut header = vec![0u8; 132];
        header[36..40].copy_from_slice(b"acsp");
        header[16..20].copy_from_slice(b"CMYK");
        assert_eq!(icc_channel_count(&header).unwrap(), 4);
        assert!(validate_icc_profile(&header, 4).is_ok());
        assert!(matches!(
            validate_icc_profile(&header, 3),
            Err(PlatenError::InvalidIccProfile(_))
        ));
    }
}
