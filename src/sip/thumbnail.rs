//! Browse image generation: band selection, normalisation, PNG encoding.

use anyhow::{bail, Context, Result};
use image::{Rgb, RgbImage};
use std::io::Cursor;

/// Wavelength windows (nm) used to pick RGB composite bands.
pub const WAVELENGTH_WINDOWS: [(&str, f64, f64); 3] = [
    ("red", 625.0, 750.0),
    ("green", 495.0, 570.0),
    ("blue", 400.0, 495.0),
];

/// Index of the band whose wavelength falls inside the named colour window,
/// closest to the window centre.
pub fn band_index(colour: &str, wavelengths: &[f64]) -> Result<usize> {
    let Some((_, minimum, maximum)) = WAVELENGTH_WINDOWS
        .iter()
        .find(|(name, _, _)| *name == colour)
    else {
        bail!("Unknown colour window: {colour}");
    };
    let centre = (minimum + maximum) / 2.0;

    wavelengths
        .iter()
        .cloned()
        .enumerate()
        .filter(|(_, w)| (*minimum..=*maximum).contains(w))
        .min_by(|a, b| {
            (a.1 - centre)
                .abs()
                .partial_cmp(&(b.1 - centre).abs())
                .expect("wavelengths are finite")
        })
        .map(|(index, _)| index)
        .with_context(|| {
            format!("No {colour} band in {minimum}-{maximum} nm; available: {wavelengths:?}")
        })
}

/// (red, green, blue) band indexes for an RGB composite.
pub fn band_indexes(wavelengths: &[f64]) -> Result<(usize, usize, usize)> {
    Ok((
        band_index("red", wavelengths)?,
        band_index("green", wavelengths)?,
        band_index("blue", wavelengths)?,
    ))
}

/// numpy-style linear-interpolation quantile of unsorted values.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("samples are finite"));
    if sorted.is_empty() {
        return f64::NAN;
    }

    let position = q * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let fraction = position - below as f64;
    if below + 1 >= sorted.len() {
        return sorted[below];
    }
    sorted[below] * (1.0 - fraction) + sorted[below + 1] * fraction
}

/// Stretch one band to [0, 1] between its 2.5% and 99.5% quantiles.
pub fn normalise_band(values: &[f64]) -> Vec<f64> {
    let lo = quantile(values, 0.025);
    let hi = quantile(values, 0.995);
    let range = hi - lo;

    values
        .iter()
        .map(|v| {
            if range == 0.0 {
                0.0
            } else {
                ((v - lo) / range).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Stack three normalised planes into an 8-bit RGB browse image.
pub fn rgb_thumbnail(
    red: &[f64],
    green: &[f64],
    blue: &[f64],
    width: usize,
    height: usize,
) -> Result<RgbImage> {
    if red.len() != width * height || green.len() != red.len() || blue.len() != red.len() {
        bail!("Thumbnail plane size mismatch");
    }

    let mut img = RgbImage::new(width as u32, height as u32);
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let to_u8 = |v: f64| (v * 255.0).clamp(0.0, 255.0) as u8;
            img.put_pixel(
                x as u32,
                y as u32,
                Rgb([to_u8(red[i]), to_u8(green[i]), to_u8(blue[i])]),
            );
        }
    }
    Ok(img)
}

/// PNG-encode a browse image.
pub fn png_bytes(img: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .context("Failed to encode browse PNG")?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAVELENGTHS: [f64; 6] = [442.5, 491.1, 530.8, 661.5, 706.5, 1016.8];

    #[test]
    fn test_band_indexes_pick_window_centres() {
        let (r, g, b) = band_indexes(&WAVELENGTHS).unwrap();
        // red window centre 687.5: 706.5 is closer than 661.5
        assert_eq!(r, 4);
        // green window centre 532.5: 530.8
        assert_eq!(g, 2);
        // blue window centre 447.5: 442.5
        assert_eq!(b, 0);
    }

    #[test]
    fn test_band_index_reports_missing_window() {
        let err = band_index("red", &[400.0, 450.0]).unwrap_err();
        assert!(err.to_string().contains("No red band in 625-750 nm"));
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let values = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&values, 0.0), 0.0);
        assert_eq!(quantile(&values, 0.5), 2.0);
        assert_eq!(quantile(&values, 1.0), 4.0);
        assert!((quantile(&values, 0.25) - 1.0).abs() < 1e-12);
        assert!((quantile(&values, 0.375) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalise_band_clips_to_unit_range() {
        let values: Vec<f64> = (0..1000).map(|v| v as f64).collect();
        let normalised = normalise_band(&values);
        assert!(normalised.iter().all(|&v| (0.0..=1.0).contains(&v)));
        // extremes clip to exactly 0 and 1
        assert_eq!(normalised[0], 0.0);
        assert_eq!(normalised[999], 1.0);
    }

    #[test]
    fn test_normalise_constant_band() {
        let normalised = normalise_band(&[5.0; 16]);
        assert!(normalised.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_rgb_thumbnail_and_png() {
        let plane = vec![0.5; 4];
        let img = rgb_thumbnail(&plane, &plane, &plane, 2, 2).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(0, 0).0, [127, 127, 127]);

        let png = png_bytes(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_rgb_thumbnail_size_mismatch() {
        assert!(rgb_thumbnail(&[0.0; 3], &[0.0; 4], &[0.0; 4], 2, 2).is_err());
    }
}
