//! Assertions shared by the unit tests and the `tests` directory.

macro_rules! assert_matrix_relative_eq {
    ($a:expr, $b:expr, $epsilon:expr) => {
        assert!(
            $a.to_cols_array()
                .iter()
                .zip($b.to_cols_array().iter())
                .all(|(a, b)| approx::relative_eq!(a, b, epsilon = $epsilon)),
            "Matrices not equal to within {}.\nleft = {:?}\nright = {:?}",
            $epsilon,
            $a,
            $b
        )
    };
    ($a:expr, $b:expr) => {
        assert_matrix_relative_eq!($a, $b, 0.0001f32)
    };
}
