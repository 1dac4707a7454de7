use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use log::info;

use rs_titlegen_core::model::corpus::Corpus;
use rs_titlegen_core::model::generation_input::{GenerationInput, DEFAULT_LENGTH};
use rs_titlegen_core::model::generator::Generator;
use rs_titlegen_core::model::sampler::Temperature;
use rs_titlegen_core::model::sequence_model::{SequenceModel, TrainConfig, DEFAULT_HIDDEN_SIZE, DEFAULT_LEARNING_RATE};
use rs_titlegen_core::model::vectorizer::{TrainingSet, DEFAULT_MAXLEN, DEFAULT_STEP};
use rs_titlegen_core::model::vocabulary::Vocabulary;
use rs_titlegen_core::{build_output_path, TitleGenError};

/// Train a character-level model on a list of titles, then generate new ones.
#[derive(Parser, Debug)]
#[command(name = "titlegen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Train a model and checkpoint it after every epoch
    Train {
        /// Corpus file, one title per line
        #[arg(long)]
        corpus: PathBuf,

        /// Checkpoint path (defaults to the corpus path with a .bin extension)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Number of passes over the corpus
        #[arg(long, default_value_t = 60)]
        epochs: usize,

        /// Use at most this many titles
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long, default_value_t = 128)]
        batch_size: usize,

        /// Window length, in characters
        #[arg(long, default_value_t = DEFAULT_MAXLEN)]
        maxlen: usize,

        /// Stride between two training windows
        #[arg(long, default_value_t = DEFAULT_STEP)]
        step: usize,

        /// Number of LSTM units
        #[arg(long, default_value_t = DEFAULT_HIDDEN_SIZE)]
        hidden: usize,

        #[arg(long, default_value_t = DEFAULT_LEARNING_RATE)]
        learning_rate: f32,

        /// Clip gradients to this global norm
        #[arg(long)]
        clip_norm: Option<f32>,

        /// Characters generated for the end-of-epoch samples
        #[arg(long, default_value_t = DEFAULT_LENGTH)]
        sample_length: usize,

        /// Seed for initialisation, shuffling and samples
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Load a trained model and print generated titles
    Use {
        /// Corpus file the model was trained on
        #[arg(long)]
        corpus: PathBuf,

        /// Trained model
        #[arg(long)]
        model: PathBuf,

        /// How diverse the output should be (> 0)
        #[arg(long, default_value_t = 1.0, value_parser = parse_temperature)]
        temperature: f64,

        /// Number of distinct titles to print
        #[arg(long, default_value_t = 10)]
        count: usize,

        /// Give up after this many generated sequences
        #[arg(long, default_value_t = 100)]
        max_iterations: usize,

        /// Characters generated per sequence
        #[arg(long, default_value_t = DEFAULT_LENGTH)]
        length: usize,

        /// Use at most this many titles from the corpus
        #[arg(long)]
        limit: Option<usize>,

        /// Skip titles that already exist in the corpus
        #[arg(long)]
        skip_known: bool,

        /// Skip the truncated first and last title of every sequence
        #[arg(long)]
        drop_partial: bool,

        /// Re-read the model from disk before every sequence
        #[arg(long)]
        reload: bool,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn parse_temperature(value: &str) -> Result<f64, String> {
    let t: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Temperature::new(t).map(Temperature::value).map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    match Cli::parse().mode {
        Mode::Train {
            corpus,
            model,
            epochs,
            limit,
            batch_size,
            maxlen,
            step,
            hidden,
            learning_rate,
            clip_norm,
            sample_length,
            seed,
        } => {
            let model_path = match model {
                Some(path) => path,
                None => build_output_path(&corpus, "bin")?,
            };
            let config = TrainConfig {
                batch_size,
                epochs,
                learning_rate,
                clip_norm,
                shuffle: true,
                seed,
            };
            train(&corpus, &model_path, limit, maxlen, step, hidden, sample_length, &config)
        }
        Mode::Use {
            corpus,
            model,
            temperature,
            count,
            max_iterations,
            length,
            limit,
            skip_known,
            drop_partial,
            reload,
            seed,
        } => {
            // Fail before touching the corpus if there is nothing to load
            if !model.exists() {
                return Err(TitleGenError::ModelNotFound { path: model }.into());
            }

            let mut input = GenerationInput::default();
            input.set_temperature(temperature)?;
            input.set_length(length)?;
            input.target_count = count;
            input.max_iterations = max_iterations;
            input.skip_known = skip_known;
            input.drop_partial = drop_partial;
            input.reload_from = reload.then(|| model.clone());

            let corpus = Corpus::from_file(&corpus, limit)?;
            let model = SequenceModel::load(&model)?;
            let mut generator = Generator::new(model, &corpus, seed)?;

            for title in generator.generate_until(&input)? {
                println!("{title}");
            }
            Ok(())
        }
    }
}

/// Trains a model, saving it and printing samples after every epoch.
#[allow(clippy::too_many_arguments)]
fn train(
    corpus_path: &Path,
    model_path: &Path,
    limit: Option<usize>,
    maxlen: usize,
    step: usize,
    hidden: usize,
    sample_length: usize,
    config: &TrainConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let corpus = Corpus::from_file(corpus_path, limit)?;
    let vocabulary = Vocabulary::build(corpus.text());
    info!("Vocabulary: {} characters", vocabulary.len());

    let training_set = TrainingSet::build(&corpus, &vocabulary, maxlen, step)?;
    info!("Training set: {} windows of {} characters", training_set.len(), maxlen);

    let mut model = SequenceModel::new(vocabulary, maxlen, hidden, config.seed)?;
    let mut sample_seed = config.seed;

    model.train(&training_set, config, |report, model| {
        println!("Saving model so far as: {}", model_path.display());
        model.save(model_path)?;

        println!();
        println!("----- Generating text after epoch {}/{} (loss {:.4})", report.epoch, report.epochs, report.loss);

        let mut generator = Generator::new(model.clone(), &corpus, sample_seed)?;
        sample_seed = sample_seed.map(|seed| seed.wrapping_add(1));
        let seed_window = generator.random_seed_window()?;
        for t in Temperature::MONITORING {
            let temperature = Temperature::new(t)?;
            println!("----- temperature: {temperature}");
            println!("----- Generating with seed: \"{seed_window}\"");
            println!("{}", generator.generate_once(&seed_window, temperature, sample_length)?);
        }
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_temperature() {
        assert_eq!(parse_temperature("0.5"), Ok(0.5));
        assert!(parse_temperature("0").is_err());
        assert!(parse_temperature("-1").is_err());
        assert!(parse_temperature("warm").is_err());
    }

    #[test]
    fn test_use_mode_defaults() {
        let cli = Cli::try_parse_from(["titlegen", "use", "--corpus", "data.csv", "--model", "m.bin"]).unwrap();
        match cli.mode {
            Mode::Use { temperature, count, length, reload, .. } => {
                assert_eq!(temperature, 1.0);
                assert_eq!(count, 10);
                assert_eq!(length, DEFAULT_LENGTH);
                assert!(!reload);
            }
            Mode::Train { .. } => panic!("expected use mode"),
        }
    }

    #[test]
    fn test_train_mode_defaults() {
        let cli = Cli::try_parse_from(["titlegen", "train", "--corpus", "data/titles.csv"]).unwrap();
        match cli.mode {
            Mode::Train { corpus, model, learning_rate, maxlen, hidden, .. } => {
                assert_eq!(learning_rate, DEFAULT_LEARNING_RATE);
                assert_eq!(maxlen, DEFAULT_MAXLEN);
                assert_eq!(hidden, DEFAULT_HIDDEN_SIZE);
                assert!(model.is_none());
                assert_eq!(build_output_path(&corpus, "bin").unwrap(), PathBuf::from("data/titles.bin"));
            }
            Mode::Use { .. } => panic!("expected train mode"),
        }
    }

    #[test]
    fn test_use_mode_rejects_bad_temperature() {
        let result = Cli::try_parse_from([
            "titlegen", "use", "--corpus", "data.csv", "--model", "m.bin", "--temperature", "0",
        ]);
        assert!(result.is_err());
    }
}
