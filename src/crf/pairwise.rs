// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use serde::{Deserialize, Serialize};

use crate::common::ImageData;
use crate::math;

/// Which neighbouring pixels are linked by a pairwise term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Four,
    Eight,
}

impl Connectivity {
    #[inline]
    pub fn from(id: i32) -> Option<Self> {
        match id {
            4 => Some(Connectivity::Four),
            8 => Some(Connectivity::Eight),
            _ => None,
        }
    }

    #[inline]
    pub fn id(self) -> i32 {
        match self {
            Connectivity::Four => 4,
            Connectivity::Eight => 8,
        }
    }

    /// Forward neighbour offsets `(dx, dy, distance)`; every undirected edge is listed once.
    fn offsets(self) -> &'static [(i32, i32, f32)] {
        const FOUR: [(i32, i32, f32); 2] = [(1, 0, 1.0), (0, 1, 1.0)];
        const EIGHT: [(i32, i32, f32); 4] = [
            (1, 0, 1.0),
            (0, 1, 1.0),
            (1, 1, std::f32::consts::SQRT_2),
            (-1, 1, std::f32::consts::SQRT_2),
        ];
        match self {
            Connectivity::Four => &FOUR,
            Connectivity::Eight => &EIGHT,
        }
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Connectivity::Eight
    }
}

/// An undirected link between two pixels in raster index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub first: u32,
    pub second: u32,
    /// Contrast term `exp(-beta * |c_i - c_j|^2) / distance`, before the pairwise weight.
    pub contrast: f32,
}

/// Contrast-sensitive Potts potential of one image.
///
/// The penalty for giving pixels `i` and `j` different labels is
/// `weight * exp(-beta * |c_i - c_j|^2)`, divided by the pixel distance on
/// diagonal links. `beta` is the inverse of twice the mean squared colour
/// difference over all links of the image.
#[derive(Debug, Clone)]
pub struct ContrastPotential {
    width: u32,
    height: u32,
    connectivity: Connectivity,
    beta: f32,
    edges: Vec<Edge>,
}

impl ContrastPotential {
    pub fn new(image: &ImageData, connectivity: Connectivity) -> Self {
        let width = image.width() as i32;
        let height = image.height() as i32;

        let mut links = vec![];
        for y in 0..height {
            for x in 0..width {
                for &(dx, dy, distance) in connectivity.offsets() {
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || nx >= width || ny >= height {
                        continue;
                    }
                    let i = (y * width + x) as u32;
                    let j = (ny * width + nx) as u32;
                    let d2 = math::squared_distance(
                        &image.color(i as usize),
                        &image.color(j as usize),
                    );
                    links.push((i, j, d2, distance));
                }
            }
        }

        let mean: f64 = if links.is_empty() {
            0.0
        } else {
            links.iter().map(|l| f64::from(l.2)).sum::<f64>() / links.len() as f64
        };
        let beta = if mean > 0.0 { (0.5 / mean) as f32 } else { 0.0 };

        let edges = links
            .into_iter()
            .map(|(first, second, d2, distance)| Edge {
                first,
                second,
                contrast: (-beta * d2).exp() / distance,
            })
            .collect();

        ContrastPotential {
            width: image.width(),
            height: image.height(),
            connectivity,
            beta,
            edges,
        }
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    #[inline]
    pub fn beta(&self) -> f32 {
        self.beta
    }

    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Cost of the edge under `weight` when its two labels differ.
    #[inline]
    pub fn cost(&self, edge: &Edge, weight: f32) -> f32 {
        weight * edge.contrast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone(width: u32, height: u32) -> ImageData {
        let mut gray = vec![];
        for _ in 0..height {
            for x in 0..width {
                gray.push(if x < width / 2 { 20 } else { 220 });
            }
        }
        ImageData::from_gray(&gray, width, height).unwrap()
    }

    #[test]
    fn test_edge_counts() {
        let image = two_tone(4, 3);
        let four = ContrastPotential::new(&image, Connectivity::Four);
        assert_eq!(3 * 3 + 4 * 2, four.edges().len());
        let eight = ContrastPotential::new(&image, Connectivity::Eight);
        assert_eq!(17 + 2 * 3 * 2, eight.edges().len());
    }

    #[test]
    fn test_cost_decreases_with_contrast() {
        let image = two_tone(4, 1);
        let potential = ContrastPotential::new(&image, Connectivity::Four);
        let edges = potential.edges();
        // edges 0-1 and 2-3 are flat, 1-2 crosses the boundary
        assert_eq!(1.0, potential.cost(&edges[0], 1.0));
        assert!(potential.cost(&edges[1], 1.0) < potential.cost(&edges[0], 1.0));
        assert_eq!(0.0, potential.cost(&edges[1], 0.0));
        assert!(potential.beta() > 0.0);
    }

    #[test]
    fn test_flat_image_has_zero_beta() {
        let image = ImageData::from_gray(&[9; 6], 3, 2).unwrap();
        let potential = ContrastPotential::new(&image, Connectivity::Eight);
        assert_eq!(0.0, potential.beta());
        let diagonal = std::f32::consts::FRAC_1_SQRT_2;
        assert!(potential
            .edges()
            .iter()
            .all(|e| e.contrast == 1.0 || (e.contrast - diagonal).abs() < 1e-6));
    }

    #[test]
    fn test_single_pixel_has_no_edges() {
        let image = ImageData::from_gray(&[1], 1, 1).unwrap();
        let potential = ContrastPotential::new(&image, Connectivity::Eight);
        assert!(potential.edges().is_empty());
    }
}
