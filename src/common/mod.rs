// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

mod image_data;
mod labeling;

use std::mem;

pub use self::image_data::{ImageData, NUM_CHANNELS};
pub use self::labeling::{is_void, Label, Labeling, VOID_LABEL};

/// Infinite sequence produced by repeatedly applying `generator` to the previous element.
pub struct Seq<T, G>
where
    G: Fn(&T) -> T + Sized,
{
    generator: G,
    next: T,
}

impl<T, G> Seq<T, G>
where
    G: Fn(&T) -> T + Sized,
{
    pub fn new(first_element: T, generator: G) -> Self {
        Seq {
            generator,
            next: first_element,
        }
    }
}

impl<T, G> Iterator for Seq<T, G>
where
    G: Fn(&T) -> T + Sized,
{
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        let next = (self.generator)(&self.next);
        let current = mem::replace(&mut self.next, next);
        Some(current)
    }
}

/// Raster-order block origins of a `width x height` grid tiled by `step x step` blocks.
pub fn block_origins(width: u32, height: u32, step: u32) -> impl Iterator<Item = (u32, u32)> {
    Seq::new(0, move |n| n + step)
        .take_while(move |n| *n < height)
        .flat_map(move |y| {
            Seq::new(0, move |n| n + step)
                .take_while(move |n| *n < width)
                .map(move |x| (x, y))
        })
}
