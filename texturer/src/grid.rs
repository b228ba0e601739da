use crate::tensor::Tensor;

// Evenly spaced samples from -1 to 1 inclusive; a single sample is -1.
pub fn linspace(num: usize) -> Vec<f32> {
    let step = 2.0 / (num.max(2) - 1) as f64;
    (0..num)
        .map(|k| {
            if k + 1 == num && num > 1 {
                1.0
            } else {
                (-1.0 + k as f64 * step) as f32
            }
        })
        .collect()
}

// Positional encoding for the flow predictor: channel 0 holds the row
// coordinate and channel 1 the column coordinate, both in [-1, 1].
pub fn coordinate_grid(height: usize, width: usize) -> Tensor {
    let rows = linspace(height);
    let cols = linspace(width);
    Tensor::from_shape_fn((2, height, width), |(c, i, j)| {
        if c == 0 {
            rows[i]
        } else {
            cols[j]
        }
    })
}
