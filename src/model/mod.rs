// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::classifier::{BoostedEnsemble, CalibrationModel, DecisionStump, UnaryModel};
use crate::crf::{validate_weight, Connectivity};
use crate::error::{Error, Result};
use crate::feat::FeatureOptions;

const MAGIC: &[u8; 4] = b"RSEG";
const VERSION: u32 = 1;

/// Everything inference needs: the unary model, the features it was trained on,
/// and the pairwise weight with its neighbourhood.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    unary: UnaryModel,
    features: FeatureOptions,
    connectivity: Connectivity,
    pairwise_weight: f32,
}

impl Model {
    pub fn new(
        unary: UnaryModel,
        features: FeatureOptions,
        connectivity: Connectivity,
        pairwise_weight: f32,
    ) -> Result<Self> {
        features.validate()?;
        validate_weight(pairwise_weight)?;
        if unary.dimension() != features.dimension() {
            return Err(Error::Model(format!(
                "unary model expects {} features, options produce {}",
                unary.dimension(),
                features.dimension()
            )));
        }
        Ok(Model {
            unary,
            features,
            connectivity,
            pairwise_weight,
        })
    }

    pub fn unary(&self) -> &UnaryModel {
        &self.unary
    }

    pub fn features(&self) -> &FeatureOptions {
        &self.features
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    pub fn pairwise_weight(&self) -> f32 {
        self.pairwise_weight
    }

    pub fn num_labels(&self) -> usize {
        self.unary.num_labels()
    }
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Model> {
    let file = File::open(path)?;
    read_model(BufReader::new(file))
}

pub fn read_model<R: Read>(reader: R) -> Result<Model> {
    ModelReader::new(reader).read()
}

pub fn save_model<P: AsRef<Path>>(model: &Model, path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_model(model, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_model<W: Write>(model: &Model, writer: W) -> Result<()> {
    ModelWriter::new(writer).write(model)
}

struct ModelReader<R: Read> {
    reader: R,
}

impl<R: Read> ModelReader<R> {
    fn new(reader: R) -> Self {
        ModelReader { reader }
    }

    fn read(mut self) -> Result<Model> {
        let mut magic = [0u8; 4];
        self.reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Model("not a rustseg model".to_string()));
        }
        let version = self.reader.read_u32::<LittleEndian>()?;
        if version != VERSION {
            return Err(Error::Model(format!("unsupported model version {}", version)));
        }

        let num_labels = self.read_count()?;
        let dimension = self.read_count()?;
        let features = self.read_feature_options()?;
        let connectivity_id = self.read_i32()?;
        let connectivity = Connectivity::from(connectivity_id)
            .ok_or_else(|| Error::Model(format!("unknown connectivity {}", connectivity_id)))?;

        let mut ensembles = Vec::with_capacity(num_labels);
        for _ in 0..num_labels {
            ensembles.push(self.read_ensemble()?);
        }

        let mut weights = Vec::with_capacity(num_labels * (num_labels + 1));
        for _ in 0..num_labels * (num_labels + 1) {
            weights.push(self.read_f32()?);
        }
        let calibration = CalibrationModel::from_weights(num_labels, weights)?;
        let pairwise_weight = self.read_f32()?;

        let unary = UnaryModel::new(ensembles, calibration, dimension)?;
        Model::new(unary, features, connectivity, pairwise_weight)
    }

    fn read_feature_options(&mut self) -> Result<FeatureOptions> {
        let color = self.read_bool()?;
        let filter_bank = self.read_bool()?;
        let num_bandwidths = self.read_count()?;
        let mut bandwidths = Vec::with_capacity(num_bandwidths);
        for _ in 0..num_bandwidths {
            bandwidths.push(self.read_f32()?);
        }
        let texture = self.read_bool()?;
        let num_radii = self.read_count()?;
        let mut texture_radii = Vec::with_capacity(num_radii);
        for _ in 0..num_radii {
            texture_radii.push(self.reader.read_u32::<LittleEndian>()?);
        }
        let position = self.read_bool()?;
        let grid_spacing = self.reader.read_u32::<LittleEndian>()?;

        Ok(FeatureOptions {
            color,
            filter_bank,
            bandwidths,
            texture,
            texture_radii,
            position,
            grid_spacing,
        })
    }

    fn read_ensemble(&mut self) -> Result<BoostedEnsemble> {
        let num_stumps = self.read_count()?;
        let mut ensemble = BoostedEnsemble::new();
        for _ in 0..num_stumps {
            let dim = self.read_count()?;
            let threshold = self.read_f32()?;
            let polarity = self.reader.read_i8()?;
            let alpha = self.read_f32()?;
            ensemble.add_stump(DecisionStump::new(dim, threshold, polarity), alpha);
        }
        Ok(ensemble)
    }

    fn read_count(&mut self) -> Result<usize> {
        let value = self.read_i32()?;
        if value < 0 {
            return Err(Error::Model(format!("negative count {}", value)));
        }
        Ok(value as usize)
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.reader.read_u8()? != 0)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(self.reader.read_i32::<LittleEndian>()?)
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(self.reader.read_f32::<LittleEndian>()?)
    }
}

struct ModelWriter<W: Write> {
    writer: W,
}

impl<W: Write> ModelWriter<W> {
    fn new(writer: W) -> Self {
        ModelWriter { writer }
    }

    fn write(mut self, model: &Model) -> Result<()> {
        self.writer.write_all(MAGIC)?;
        self.writer.write_u32::<LittleEndian>(VERSION)?;

        let unary = model.unary();
        self.write_count(unary.num_labels())?;
        self.write_count(unary.dimension())?;
        self.write_feature_options(model.features())?;
        self.writer.write_i32::<LittleEndian>(model.connectivity().id())?;

        for ensemble in unary.ensembles() {
            self.write_count(ensemble.len())?;
            for (stump, alpha) in ensemble.stumps() {
                self.write_count(stump.dim())?;
                self.writer.write_f32::<LittleEndian>(stump.threshold())?;
                self.writer.write_i8(stump.polarity())?;
                self.writer.write_f32::<LittleEndian>(*alpha)?;
            }
        }

        for &w in unary.calibration().weights() {
            self.writer.write_f32::<LittleEndian>(w)?;
        }
        self.writer.write_f32::<LittleEndian>(model.pairwise_weight())?;
        Ok(())
    }

    fn write_feature_options(&mut self, options: &FeatureOptions) -> Result<()> {
        self.writer.write_u8(options.color as u8)?;
        self.writer.write_u8(options.filter_bank as u8)?;
        self.write_count(options.bandwidths.len())?;
        for &sigma in &options.bandwidths {
            self.writer.write_f32::<LittleEndian>(sigma)?;
        }
        self.writer.write_u8(options.texture as u8)?;
        self.write_count(options.texture_radii.len())?;
        for &radius in &options.texture_radii {
            self.writer.write_u32::<LittleEndian>(radius)?;
        }
        self.writer.write_u8(options.position as u8)?;
        self.writer.write_u32::<LittleEndian>(options.grid_spacing)?;
        Ok(())
    }

    fn write_count(&mut self, count: usize) -> Result<()> {
        if count > i32::MAX as usize {
            return Err(Error::Model(format!("count {} does not fit the format", count)));
        }
        self.writer.write_i32::<LittleEndian>(count as i32)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_model() -> Model {
        let features = FeatureOptions {
            filter_bank: false,
            ..Default::default()
        };
        let dimension = features.dimension();
        let mut first = BoostedEnsemble::new();
        first.add_stump(DecisionStump::new(0, 0.25, 1), 0.75);
        first.add_stump(DecisionStump::new(dimension - 1, -1.5, -1), 0.125);
        let calibration =
            CalibrationModel::from_weights(2, vec![1.0, -1.0, 0.5, -1.0, 1.0, -0.5]).unwrap();
        let unary =
            UnaryModel::new(vec![first, BoostedEnsemble::new()], calibration, dimension).unwrap();
        Model::new(unary, features, Connectivity::Four, 2.5).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let model = sample_model();
        let mut buf = vec![];
        write_model(&model, &mut buf).unwrap();
        let restored = read_model(Cursor::new(buf)).unwrap();
        assert_eq!(model, restored);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");
        let model = sample_model();
        save_model(&model, &path).unwrap();
        assert_eq!(model, load_model(&path).unwrap());
    }

    #[test]
    fn test_rejects_bad_magic_and_truncation() {
        assert!(matches!(
            read_model(Cursor::new(b"NOPE\x01\x00\x00\x00".to_vec())),
            Err(Error::Model(_))
        ));

        let mut buf = vec![];
        write_model(&sample_model(), &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(matches!(read_model(Cursor::new(buf)), Err(Error::Io(_))));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let model = sample_model();
        let unary = model.unary().clone();
        let features = model.features().clone();
        assert!(Model::new(unary, features, Connectivity::Eight, -1.0).is_err());
    }
}
