// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use num::traits::Num;

pub fn square(src: &[f32], dest: &mut [f32]) {
    for (d, &s) in dest.iter_mut().zip(src) {
        *d = s * s;
    }
}

pub fn vector_sub(left: &[f32], right: &[f32], dest: &mut [f32]) {
    for ((d, &l), &r) in dest.iter_mut().zip(left).zip(right) {
        *d = l - r;
    }
}

pub fn vector_inner_product(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(&l, &r)| l * r).sum()
}

pub fn squared_distance(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(&l, &r)| (l - r) * (l - r))
        .sum()
}

/// Index of the largest element; the lowest index wins ties. `None` for an empty slice.
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Normalises `values` into a probability distribution, in place.
pub fn softmax(values: &mut [f32]) {
    let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        let uniform = 1.0 / values.len() as f32;
        values.iter_mut().for_each(|v| *v = uniform);
        return;
    }
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// Summed-area table of a `width x height` row-major grid, in place.
pub fn compute_integral<T: Num + Copy>(data: &mut [T], width: usize, height: usize) {
    assert_eq!(data.len(), width * height);

    for x in 1..width {
        data[x] = data[x - 1] + data[x];
    }
    for y in 1..height {
        let mut s: T = num::zero();
        for x in 0..width {
            let i = y * width + x;
            s = s + data[i];
            data[i] = data[i - width] + s;
        }
    }
}

/// Sum over the inclusive rectangle `[x0, x1] x [y0, y1]` of a summed-area table.
pub fn integral_rect_sum<T: Num + Copy>(
    integral: &[T],
    width: usize,
    (x0, y0): (usize, usize),
    (x1, y1): (usize, usize),
) -> T {
    let at = |x: usize, y: usize| integral[y * width + x];
    let mut sum = at(x1, y1);
    if x0 > 0 {
        sum = sum - at(x0 - 1, y1);
    }
    if y0 > 0 {
        sum = sum - at(x1, y0 - 1);
    }
    if x0 > 0 && y0 > 0 {
        sum = sum + at(x0 - 1, y0 - 1);
    }
    sum
}

/// Normalised 1-D Gaussian kernel of radius `ceil(3 * sigma)`.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| {
            let x = i as f32;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}
