use crate::enums::Interpolation;

use ndarray::ArrayView2;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Sample `image` at continuous pixel coordinates (`y`, `x`), where integer
    /// coordinates are pixel centres. Returns `None` outside the image.
    #[inline]
    pub(crate) fn sample(
        image: &ArrayView2<f32>,
        y: f32,
        x: f32,
        interpolation: Interpolation,
    ) -> Option<f32> {
        let (height, width) = image.dim();
        let (max_y, max_x) = (height as f32 - 0.5, width as f32 - 0.5);
        if !(y >= -0.5 && y < max_y && x >= -0.5 && x < max_x) {
            return None;
        }

        match interpolation {
            Interpolation::Nearest => {
                let row = (y.round().max(0.0) as usize).min(height - 1);
                let col = (x.round().max(0.0) as usize).min(width - 1);
                Some(image[[row, col]])
            }
            Interpolation::Bilinear => {
                // Clamp to the outermost pixel centres like a clamp-to-edge sampler.
                let y = y.clamp(0.0, (height - 1) as f32);
                let x = x.clamp(0.0, (width - 1) as f32);
                Some(Self::bilinear_interpolate(image, y, x))
            }
        }
    }

    #[inline]
    pub(crate) fn bilinear_interpolate(slice: &ArrayView2<f32>, y: f32, x: f32) -> f32 {
        let (height, width) = slice.dim();

        let y0 = y.floor() as usize;
        let x0 = x.floor() as usize;
        let y1 = (y0 + 1).min(height - 1);
        let x1 = (x0 + 1).min(width - 1);

        let dy = y - y0 as f32;
        let dx = x - x0 as f32;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;

        let v00 = slice[[y0, x0]];
        let v01 = slice[[y0, x1]];
        let v10 = slice[[y1, x0]];
        let v11 = slice[[y1, x1]];

        let v0 = v00.mul_add(one_minus_dx, v01 * dx);
        let v1 = v10.mul_add(one_minus_dx, v11 * dx);

        v0.mul_add(one_minus_dy, v1 * dy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn nearest_picks_closest_centre() {
        let image = array![[0.0_f32, 1.0], [2.0, 3.0]];
        let view = image.view();
        assert_eq!(
            Interpolator::sample(&view, 0.2, 0.7, Interpolation::Nearest),
            Some(1.0)
        );
        assert_eq!(
            Interpolator::sample(&view, 1.4, -0.4, Interpolation::Nearest),
            Some(2.0)
        );
    }

    #[test]
    fn bilinear_blends_neighbours() {
        let image = array![[0.0_f32, 1.0], [2.0, 3.0]];
        let view = image.view();
        let value = Interpolator::sample(&view, 0.5, 0.5, Interpolation::Bilinear)
            .expect("inside the image");
        assert_relative_eq!(value, 1.5);
    }

    #[test]
    fn outside_is_none() {
        let image = array![[1.0_f32]];
        let view = image.view();
        for (y, x) in [(-0.6, 0.0), (0.0, 0.5), (0.5, 0.0), (f32::NAN, 0.0)] {
            assert_eq!(
                Interpolator::sample(&view, y, x, Interpolation::Nearest),
                None
            );
        }
    }
}
