// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

//! Reading images, ground truth labellings and paired datasets from disk.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageBuffer, Luma};
use log::{debug, info, warn};

use crate::common::{is_void, ImageData, Label, Labeling, VOID_LABEL};
use crate::error::{Error, Result};

/// Raster value marking unlabelled pixels in 16-bit label images.
pub const DEFAULT_VOID_SENTINEL: u16 = u16::MAX;

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "pgm", "pnm"];

/// An image together with its ground truth.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub name: String,
    pub image: ImageData,
    pub truth: Labeling,
}

pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ImageData> {
    let rgb = image::open(path)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    ImageData::new(rgb.into_raw(), width, height)
}

/// Reads a labelling with the default void sentinel.
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Labeling> {
    load_labels_with_sentinel(path, DEFAULT_VOID_SENTINEL)
}

/// Reads a labelling.
///
/// `.txt` files hold whitespace separated integers, one line per image row, where
/// negative values are void. Any other file is decoded as a grayscale raster:
/// 16-bit pixels equal to `void_sentinel` are void, in 8-bit rasters 255 is void.
pub fn load_labels_with_sentinel<P: AsRef<Path>>(path: P, void_sentinel: u16) -> Result<Labeling> {
    let path = path.as_ref();
    if has_extension(path, "txt") {
        return parse_label_text(&fs::read_to_string(path)?);
    }

    let (labels, width, height) = match image::open(path)? {
        DynamicImage::ImageLuma16(raster) => {
            let (width, height) = raster.dimensions();
            let labels = raster
                .into_raw()
                .into_iter()
                .map(|v| if v == void_sentinel { VOID_LABEL } else { Label::from(v) })
                .collect();
            (labels, width, height)
        }
        DynamicImage::ImageLuma8(raster) => {
            let (width, height) = raster.dimensions();
            let labels = raster
                .into_raw()
                .into_iter()
                .map(|v| if v == u8::MAX { VOID_LABEL } else { Label::from(v) })
                .collect();
            (labels, width, height)
        }
        _ => {
            let message = format!("{}: label raster must be grayscale", path.display());
            return Err(invalid_data(message));
        }
    };
    Labeling::new(labels, width, height)
}

fn parse_label_text(text: &str) -> Result<Labeling> {
    let mut labels = vec![];
    let mut width = None;
    let mut height = 0u32;

    for (row, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let before = labels.len();
        for token in line.split_whitespace() {
            let value: Label = token.parse().map_err(|_| {
                invalid_data(format!("line {}: '{}' is not a label", row + 1, token))
            })?;
            labels.push(if is_void(value) { VOID_LABEL } else { value });
        }
        let row_width = (labels.len() - before) as u32;
        match width {
            None => width = Some(row_width),
            Some(w) if w != row_width => {
                return Err(invalid_data(format!(
                    "line {}: expected {} labels, found {}",
                    row + 1,
                    w,
                    row_width
                )));
            }
            Some(_) => {}
        }
        height += 1;
    }

    match width {
        Some(width) => Labeling::new(labels, width, height),
        None => Err(invalid_data("label file is empty".to_string())),
    }
}

/// Writes a labelling, as text for `.txt` paths and as a 16-bit raster otherwise.
pub fn save_labels<P: AsRef<Path>>(labeling: &Labeling, path: P) -> Result<()> {
    let path = path.as_ref();
    let (width, height) = labeling.dimensions();

    if has_extension(path, "txt") {
        let mut text = String::with_capacity(labeling.len() * 3);
        for row in labeling.labels().chunks(width.max(1) as usize) {
            let line: Vec<String> = row.iter().map(|l| l.to_string()).collect();
            text.push_str(&line.join(" "));
            text.push('\n');
        }
        fs::write(path, text)?;
        return Ok(());
    }

    let mut raw = Vec::with_capacity(labeling.len());
    for &label in labeling.labels() {
        if is_void(label) {
            raw.push(DEFAULT_VOID_SENTINEL);
        } else if label >= Label::from(DEFAULT_VOID_SENTINEL) {
            return Err(invalid_data(format!("label {} does not fit a 16-bit raster", label)));
        } else {
            raw.push(label as u16);
        }
    }
    let raster: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_raw(width, height, raw)
        .ok_or_else(|| invalid_data("label buffer does not match its size".to_string()))?;
    raster.save(path)?;
    Ok(())
}

/// Reads a list of item names, one per line. Blank lines and `#` comments are skipped.
pub fn read_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| file_stem(Path::new(line)).unwrap_or_else(|| line.to_string()))
        .collect())
}

/// Images paired with their ground truth by file stem.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    items: Vec<LabeledImage>,
}

impl Dataset {
    /// Loads the named items. Items with a missing or unreadable file, or whose
    /// image and labelling differ in size, are skipped with a warning.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        image_dir: P,
        label_dir: Q,
        names: &[String],
    ) -> Result<Self> {
        let images = index_dir(image_dir.as_ref(), true)?;
        let labels = index_dir(label_dir.as_ref(), false)?;

        let mut items = Vec::with_capacity(names.len());
        let mut skipped = 0;
        for name in names {
            match Dataset::load_item(name, &images, &labels) {
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!("skipping {}: {}", name, e);
                    skipped += 1;
                }
            }
        }
        info!("loaded {} labelled images, skipped {}", items.len(), skipped);
        Ok(Dataset { items })
    }

    /// Loads every image of `image_dir` that has a labelling in `label_dir`.
    pub fn scan<P: AsRef<Path>, Q: AsRef<Path>>(image_dir: P, label_dir: Q) -> Result<Self> {
        let names: Vec<String> = index_dir(image_dir.as_ref(), true)?.into_keys().collect();
        Dataset::open(image_dir, label_dir, &names)
    }

    fn load_item(
        name: &str,
        images: &BTreeMap<String, PathBuf>,
        labels: &BTreeMap<String, PathBuf>,
    ) -> Result<LabeledImage> {
        let image_path = images
            .get(name)
            .ok_or_else(|| invalid_data("no image file".to_string()))?;
        let label_path = labels
            .get(name)
            .ok_or_else(|| invalid_data("no label file".to_string()))?;

        let image = load_image(image_path)?;
        let truth = load_labels(label_path)?;
        if image.dimensions() != truth.dimensions() {
            return Err(Error::dimensions(image.dimensions(), truth.dimensions()));
        }
        debug!("loaded {} ({}x{})", name, image.width(), image.height());
        Ok(LabeledImage {
            name: name.to_string(),
            image,
            truth,
        })
    }

    pub fn items(&self) -> &[LabeledImage] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Moves the named items into a second dataset, keeping their order.
    pub fn split_off_names(&mut self, names: &[String]) -> Dataset {
        let (picked, rest): (Vec<LabeledImage>, Vec<LabeledImage>) = self
            .items
            .drain(..)
            .partition(|item| names.iter().any(|n| *n == item.name));
        self.items = rest;
        Dataset { items: picked }
    }
}

/// Maps file stems to paths. The first path in name order wins a clash.
fn index_dir(dir: &Path, images_only: bool) -> Result<BTreeMap<String, PathBuf>> {
    let mut paths = vec![];
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if images_only && !IMAGE_EXTENSIONS.iter().any(|ext| has_extension(&path, ext)) {
            continue;
        }
        paths.push(path);
    }
    paths.sort();

    let mut index = BTreeMap::new();
    for path in paths {
        if let Some(stem) = file_stem(&path) {
            index.entry(stem).or_insert(path);
        }
    }
    Ok(index)
}

fn file_stem(path: &Path) -> Option<String> {
    path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case(ext))
}

fn invalid_data(message: String) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_rgb(path: &Path, width: u32, height: u32) {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 40) as u8, (y * 40) as u8, 7]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_parse_label_text() {
        let labeling = parse_label_text("0 1 -1\n2 -7 1\n\n").unwrap();
        assert_eq!((3, 2), labeling.dimensions());
        assert_eq!(&[0, 1, -1, 2, -1, 1], labeling.labels());
    }

    #[test]
    fn test_parse_label_text_rejects_ragged_rows() {
        assert!(parse_label_text("0 1\n2\n").is_err());
        assert!(parse_label_text("0 x\n").is_err());
        assert!(parse_label_text("\n").is_err());
    }

    #[test]
    fn test_label_raster_round_trip() {
        let dir = tempdir().unwrap();
        let labeling = Labeling::new(vec![0, 3, -1, 2, 1, -1], 3, 2).unwrap();

        let png = dir.path().join("labels.png");
        save_labels(&labeling, &png).unwrap();
        assert_eq!(labeling, load_labels(&png).unwrap());

        let txt = dir.path().join("labels.txt");
        save_labels(&labeling, &txt).unwrap();
        assert_eq!(labeling, load_labels(&txt).unwrap());
    }

    #[test]
    fn test_load_image_as_rgb() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        write_rgb(&path, 4, 3);

        let image = load_image(&path).unwrap();
        assert_eq!((4, 3), image.dimensions());
        assert_eq!([40, 80, 7], image.pixel(2 * 4 + 1));
    }

    #[test]
    fn test_dataset_pairs_by_stem_and_skips_broken_items() {
        let dir = tempdir().unwrap();
        let images = dir.path().join("images");
        let labels = dir.path().join("labels");
        fs::create_dir(&images).unwrap();
        fs::create_dir(&labels).unwrap();

        write_rgb(&images.join("a.png"), 2, 2);
        fs::write(labels.join("a.txt"), "0 1\n1 0\n").unwrap();
        // wrong size
        write_rgb(&images.join("b.png"), 2, 2);
        fs::write(labels.join("b.txt"), "0 1 1\n").unwrap();
        // no labels
        write_rgb(&images.join("c.png"), 2, 2);

        let mut dataset = Dataset::scan(&images, &labels).unwrap();
        assert_eq!(1, dataset.len());
        assert_eq!("a", dataset.items()[0].name);
        assert_eq!(&[0, 1, 1, 0], dataset.items()[0].truth.labels());

        let validation = dataset.split_off_names(&["a".to_string()]);
        assert_eq!(1, validation.len());
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_read_names() {
        let dir = tempdir().unwrap();
        let list = dir.path().join("val.txt");
        fs::write(&list, "# validation\nimg_1.png\n\n  img_2 \n").unwrap();
        assert_eq!(vec!["img_1", "img_2"], read_names(&list).unwrap());
    }
}
