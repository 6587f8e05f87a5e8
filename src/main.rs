// This file is part of rustseg, a pixel labelling engine which combines boosted
// per-pixel classifiers with a contrast-sensitive conditional random field.
//
// As an open-source project: you can redistribute rustseg source codes
// and/or modify it under the terms of the BSD 2-Clause License.
//
// You should have received a copy of the BSD 2-Clause License along with the software.
// If not, see < https://opensource.org/licenses/BSD-2-Clause>.

use std::process;

use log::{info, warn};

use rustseg::dataset::{self, Dataset};
use rustseg::eval::{self, ConfusionMatrix};
use rustseg::{Config, CrfSegmenter, Model, Segmenter};

fn main() {
    env_logger::init();

    let options = match Options::parse(std::env::args()) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("Failed to parse program arguments: {}", message);
            process::exit(2);
        }
    };

    let outcome = match options {
        Options::Train {
            config_path,
            image_dir,
            label_dir,
            model_path,
            validation_list,
        } => train(&config_path, &image_dir, &label_dir, &model_path, validation_list.as_deref()),
        Options::Infer {
            model_path,
            image_path,
            output_path,
        } => infer(&model_path, &image_path, &output_path),
        Options::Evaluate {
            model_path,
            config_path,
            image_dir,
            label_dir,
        } => evaluate(&model_path, &config_path, &image_dir, &label_dir),
    };

    if let Err(error) = outcome {
        eprintln!("{}", error);
        process::exit(1);
    }
}

fn train(
    config_path: &str,
    image_dir: &str,
    label_dir: &str,
    model_path: &str,
    validation_list: Option<&str>,
) -> rustseg::Result<()> {
    let config = Config::load(config_path)?;
    let mut training = Dataset::scan(image_dir, label_dir)?;
    let validation = match validation_list {
        Some(path) => training.split_off_names(&dataset::read_names(path)?),
        None => Dataset::default(),
    };

    let unary = rustseg::train_unary(training.items(), config.num_classes, &config)?;
    // without a validation list the weight is chosen on the training images
    let search_on = if validation.is_empty() {
        training.items()
    } else {
        validation.items()
    };
    let outcome = rustseg::train_pairwise(search_on, &unary, &config)?;
    if let Some(warning) = outcome.warning {
        warn!("{:?}: pairwise weight falls back to {}", warning, outcome.weight);
    }
    for (weight, errors) in &outcome.errors {
        info!("weight {}: {} misclassified pixels", weight, errors);
    }

    let model = Model::new(
        unary,
        config.features.clone(),
        config.pairwise.connectivity,
        outcome.weight,
    )?;
    rustseg::save_model(&model, model_path)?;
    println!("Saved model with pairwise weight {} to {}", outcome.weight, model_path);
    Ok(())
}

fn infer(model_path: &str, image_path: &str, output_path: &str) -> rustseg::Result<()> {
    let segmenter = rustseg::create_segmenter(model_path)?;
    let image = dataset::load_image(image_path)?;
    let result = segmenter.segment(&image)?;
    if result.budget_exceeded {
        warn!("solver budget exceeded, result may not be converged");
    }
    dataset::save_labels(&result.labeling, output_path)?;
    println!(
        "Labelled {}x{} image in {} sweeps, energy {:.3}",
        image.width(),
        image.height(),
        result.sweeps,
        result.energy
    );
    Ok(())
}

fn evaluate(
    model_path: &str,
    config_path: &str,
    image_dir: &str,
    label_dir: &str,
) -> rustseg::Result<()> {
    let config = Config::load(config_path)?;
    let model = rustseg::load_model(model_path)?;
    let segmenter = CrfSegmenter::with_solver(model, config.solver.clone())?;
    let test = Dataset::scan(image_dir, label_dir)?;

    let images: Vec<_> = test.items().iter().map(|item| item.image.clone()).collect();
    let results = segmenter.segment_all(&images);

    let mut confusion = ConfusionMatrix::new(segmenter.num_labels());
    for (item, result) in test.items().iter().zip(results) {
        match result {
            Ok(result) => {
                let score = eval::score(&result.labeling, &item.truth, &mut confusion)?;
                info!("{}: accuracy {:.4}", item.name, score.accuracy());
            }
            Err(error) => warn!("{}: {}", item.name, error),
        }
    }

    println!("{}", confusion);
    println!("Pixel accuracy: {:.4}", confusion.accuracy());
    println!("Average class accuracy: {:.4}", confusion.average_class_accuracy());
    Ok(())
}

enum Options {
    Train {
        config_path: String,
        image_dir: String,
        label_dir: String,
        model_path: String,
        validation_list: Option<String>,
    },
    Infer {
        model_path: String,
        image_path: String,
        output_path: String,
    },
    Evaluate {
        model_path: String,
        config_path: String,
        image_dir: String,
        label_dir: String,
    },
}

impl Options {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self, String> {
        let args: Vec<String> = args.into_iter().collect();
        let program = args.first().map(String::as_str).unwrap_or("rustseg");
        let usage = format!(
            "Usage:\n  \
             {0} train <config.json> <image-dir> <label-dir> <model-out> [validation-list]\n  \
             {0} infer <model> <image> <labels-out>\n  \
             {0} evaluate <model> <config.json> <image-dir> <label-dir>",
            program
        );

        let rest = &args[args.len().min(2)..];
        match args.get(1).map(String::as_str) {
            Some("train") if rest.len() == 4 || rest.len() == 5 => Ok(Options::Train {
                config_path: rest[0].clone(),
                image_dir: rest[1].clone(),
                label_dir: rest[2].clone(),
                model_path: rest[3].clone(),
                validation_list: rest.get(4).cloned(),
            }),
            Some("infer") if rest.len() == 3 => Ok(Options::Infer {
                model_path: rest[0].clone(),
                image_path: rest[1].clone(),
                output_path: rest[2].clone(),
            }),
            Some("evaluate") if rest.len() == 4 => Ok(Options::Evaluate {
                model_path: rest[0].clone(),
                config_path: rest[1].clone(),
                image_dir: rest[2].clone(),
                label_dir: rest[3].clone(),
            }),
            _ => Err(usage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_commands() {
        match Options::parse(args("rustseg train c.json img lbl m.bin val.txt")).unwrap() {
            Options::Train { validation_list, model_path, .. } => {
                assert_eq!(Some("val.txt".to_string()), validation_list);
                assert_eq!("m.bin", model_path);
            }
            _ => panic!("expected train"),
        }
        assert!(matches!(
            Options::parse(args("rustseg infer m.bin a.png out.png")),
            Ok(Options::Infer { .. })
        ));
        assert!(matches!(
            Options::parse(args("rustseg evaluate m.bin c.json img lbl")),
            Ok(Options::Evaluate { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_arity() {
        assert!(Options::parse(args("rustseg")).is_err());
        assert!(Options::parse(args("rustseg infer m.bin")).is_err());
        assert!(Options::parse(args("rustseg segment a b c")).is_err());
    }
}
