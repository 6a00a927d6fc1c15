//! Rigid-transform distance metrics and the row-major text codec shared by
//! the frame and collection transform fields.

use nalgebra::{Matrix4, Rotation3};

/// Euclidean distance between the origins of two 4x4 transforms.
pub fn position_difference(a: &Matrix4<f64>, b: &Matrix4<f64>) -> f64 {
    let dx = a[(0, 3)] - b[(0, 3)];
    let dy = a[(1, 3)] - b[(1, 3)];
    let dz = a[(2, 3)] - b[(2, 3)];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Angle, in degrees, of the relative rotation between the upper-left 3x3
/// blocks of two 4x4 transforms.
pub fn orientation_difference_deg(a: &Matrix4<f64>, b: &Matrix4<f64>) -> f64 {
    let ra = Rotation3::from_matrix_unchecked(a.fixed_view::<3, 3>(0, 0).into_owned());
    let rb = Rotation3::from_matrix_unchecked(b.fixed_view::<3, 3>(0, 0).into_owned());
    ra.rotation_to(&rb).angle().to_degrees()
}

pub fn matrix_from_row_major(elements: &[f64; 16]) -> Matrix4<f64> {
    Matrix4::from_row_slice(elements)
}

pub fn matrix_to_row_major(matrix: &Matrix4<f64>) -> [f64; 16] {
    let mut elements = [0.0; 16];
    for row in 0..4 {
        for col in 0..4 {
            elements[row * 4 + col] = matrix[(row, col)];
        }
    }
    elements
}

/// Encode 16 elements with a trailing space after every number, the layout
/// expected in transform field values.
pub fn encode_elements(elements: &[f64; 16]) -> String {
    elements.iter().map(|e| format!("{e} ")).collect()
}

/// Parse whitespace-separated numbers into a caller-seeded buffer,
/// stopping early on short or malformed data. Returns the number of
/// elements actually written.
pub fn parse_elements(value: &str, elements: &mut [f64; 16]) -> usize {
    let mut count = 0;
    for (slot, token) in elements.iter_mut().zip(value.split_whitespace()) {
        match token.parse::<f64>() {
            Ok(number) => {
                *slot = number;
                count += 1;
            }
            Err(_) => break,
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix4, Vector3};

    #[test]
    fn position_difference_is_euclidean() {
        let a = Matrix4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let b = Matrix4::new_translation(&Vector3::new(4.0, 6.0, 3.0));
        assert!((position_difference(&a, &b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn orientation_difference_of_quarter_turn() {
        let a = Matrix4::identity();
        let b = Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2)
            .to_homogeneous();
        assert!((orientation_difference_deg(&a, &b) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn row_major_round_trip() {
        let elements: [f64; 16] = std::array::from_fn(|i| i as f64 * 0.5);
        let matrix = matrix_from_row_major(&elements);
        assert_eq!(matrix[(0, 1)], 0.5);
        assert_eq!(matrix[(1, 0)], 2.0);
        assert_eq!(matrix_to_row_major(&matrix), elements);
    }

    #[test]
    fn text_codec_round_trip() {
        let elements: [f64; 16] = std::array::from_fn(|i| (i as f64) - 7.25);
        let encoded = encode_elements(&elements);
        assert!(encoded.ends_with(' '));

        let mut decoded = [0.0; 16];
        assert_eq!(parse_elements(&encoded, &mut decoded), 16);
        assert_eq!(decoded, elements);
    }

    #[test]
    fn short_data_fills_only_the_leading_elements() {
        let mut elements = matrix_to_row_major(&Matrix4::identity());
        assert_eq!(parse_elements("9 8 7", &mut elements), 3);
        assert_eq!(elements[0], 9.0);
        assert_eq!(elements[2], 7.0);
        // the identity seed stays in place past the parsed prefix
        assert_eq!(elements[5], 1.0);
        assert_eq!(elements[15], 1.0);
    }
}
