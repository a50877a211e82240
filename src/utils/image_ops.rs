use image::DynamicImage;

use crate::core::types::Region;

/// Extract the pixel sub-grid bounded by a region.
///
/// Callers must filter degenerate regions first; `crop_imm` on a zero-sized
/// rectangle would silently produce an empty image.
pub fn crop_region(img: &DynamicImage, region: &Region) -> DynamicImage {
    img.crop_imm(region.x0, region.y0, region.width(), region.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn crop_matches_region_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 80, Rgb([10, 20, 30])));
        let region = Region { x0: 5, y0: 10, x1: 45, y1: 30 };

        let crop = crop_region(&img, &region);
        assert_eq!(crop.width(), 40);
        assert_eq!(crop.height(), 20);
    }

    #[test]
    fn crop_preserves_pixels() {
        let mut raw = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        raw.put_pixel(3, 4, Rgb([255, 1, 2]));
        let img = DynamicImage::ImageRgb8(raw);

        let crop = crop_region(&img, &Region { x0: 3, y0: 4, x1: 5, y1: 6 });
        assert_eq!(crop.to_rgb8().get_pixel(0, 0), &Rgb([255, 1, 2]));
    }
}
