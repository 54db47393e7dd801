//! Train a pixel classifier from an image and annotation JSON, then export it.

use std::path::PathBuf;
use std::sync::Arc;

use pixclass::annotations::{AnnotationSet, PathClass};
use pixclass::artifact::PixelClassifierArtifact;
use pixclass::config::{self, SessionSettings};
use pixclass::dataset::BoundaryStrategy;
use pixclass::imaging::{InMemoryImage, PixelCalibration, TileSource};
use pixclass::ml::Classifier;
use pixclass::preprocess::{Normalization, PcaSettings};
use pixclass::training::{ChannelType, TrainingJob, TrainingOutcome, run_training};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let options = parse_args(std::env::args().skip(1).collect())?;
    let mut settings = match &options.config {
        Some(path) => config::load_from(path),
        None => config::load_or_default(),
    }
    .map_err(|err| err.to_string())?;
    options.apply(&mut settings);
    let settings = settings.normalized();
    if let Err(err) = pixclass::logging::init(&settings.logging) {
        eprintln!("Logging unavailable: {err}");
    }

    let calibration = match options.pixel_size {
        Some(size) => PixelCalibration::microns(size),
        None => PixelCalibration::uncalibrated(),
    };
    let image = InMemoryImage::open(&options.image, calibration).map_err(|err| err.to_string())?;
    let annotations =
        AnnotationSet::load_json(&options.annotations).map_err(|err| err.to_string())?;
    let source: Arc<dyn TileSource> = Arc::new(image);
    let resolution = settings.training.resolution(source.calibration());
    println!("resolution: {resolution}");

    let job = TrainingJob {
        hierarchy: Arc::new(annotations),
        source: Some(source),
        calculator: Some(settings.features.clone()),
        classifier: Some(settings.training.classifier.clone()),
        resolution,
        boundary: settings.boundary.clone(),
        preprocessing: settings.preprocessing,
        output_type: settings.training.output_type,
        options: settings.training.options(),
    };
    let (model, report) = match run_training(&job).map_err(|err| err.to_string())? {
        TrainingOutcome::Trained { model, report } => (model, report),
        TrainingOutcome::NothingToTrain => {
            return Err("No labeled annotations to train from".to_string());
        }
    };

    println!("classifier: {}", report.classifier);
    println!("{}", report.accuracy);
    println!("  {:<20} {:>8} {:>9} {:>7}", "class", "samples", "precision", "recall");
    for (index, (name, count)) in report.class_names.iter().zip(&report.class_counts).enumerate() {
        match report.per_class.get(index) {
            Some(stats) => println!(
                "  {name:<20} {count:>8} {:>9.3} {:>7.3}",
                stats.precision, stats.recall
            ),
            None => println!("  {name:<20} {count:>8}"),
        }
    }
    if let Some(ranks) = &report.feature_importance {
        println!("top features:");
        for rank in ranks.iter().take(10) {
            println!("  {:<36} {:.4}", rank.name, rank.importance);
        }
    }

    let artifact = PixelClassifierArtifact::new(&model, Some(report));
    artifact.save(&options.out).map_err(|err| err.to_string())?;
    println!("saved {}", options.out.display());
    Ok(())
}

#[derive(Debug, Clone, Default)]
struct CliOptions {
    image: PathBuf,
    annotations: PathBuf,
    out: PathBuf,
    config: Option<PathBuf>,
    pixel_size: Option<f64>,
    downsample: Option<f64>,
    classifier: Option<Classifier>,
    max_samples: Option<usize>,
    seed: Option<u64>,
    reweight: bool,
    boundary: Option<String>,
    thickness: Option<f64>,
    normalization: Option<Normalization>,
    pca: Option<f64>,
    probability: bool,
}

impl CliOptions {
    fn apply(&self, settings: &mut SessionSettings) {
        let training = &mut settings.training;
        if let Some(downsample) = self.downsample {
            training.downsample = downsample;
        }
        if let Some(classifier) = &self.classifier {
            training.classifier = classifier.clone();
        }
        if let Some(max_samples) = self.max_samples {
            training.max_samples = max_samples;
        }
        if let Some(seed) = self.seed {
            training.rng_seed = seed;
        }
        if self.reweight {
            training.reweight_samples = true;
        }
        if self.probability {
            training.output_type = ChannelType::Probability;
        }
        if let Some(normalization) = self.normalization {
            settings.preprocessing.normalization = normalization;
        }
        if let Some(variance) = self.pca {
            settings.preprocessing.pca = Some(PcaSettings {
                retained_variance: variance,
                normalize_output: false,
            });
        }
        let thickness = self.thickness.unwrap_or(settings.boundary.thickness());
        settings.boundary = match self.boundary.as_deref() {
            Some("skip") => BoundaryStrategy::Skip { thickness },
            Some("derived") => BoundaryStrategy::DerivedThickness { thickness },
            Some(other) => match other.strip_prefix("classify:") {
                Some(class) => BoundaryStrategy::ClassifyAs {
                    class: PathClass::new(class),
                    thickness,
                },
                None => settings.boundary.with_thickness(thickness),
            },
            None => settings.boundary.with_thickness(thickness),
        };
    }
}

fn parse_classifier(value: &str) -> Result<Classifier, String> {
    let available = Classifier::available();
    let pick = |index: usize| available.get(index).cloned();
    match value {
        "logreg" => pick(0),
        "stumps" => pick(1),
        "majority" => pick(3),
        other => match other.strip_prefix("knn") {
            Some("") => pick(2),
            Some(k) => k
                .trim_start_matches(':')
                .parse::<usize>()
                .ok()
                .map(|k| Classifier::NearestNeighbors { k }),
            None => None,
        },
    }
    .ok_or_else(|| format!("Unknown classifier: {value}"))
}

fn parse_normalization(value: &str) -> Result<Normalization, String> {
    match value {
        "none" => Ok(Normalization::None),
        "mean-std" => Ok(Normalization::MeanStd),
        "min-max" => Ok(Normalization::MinMax),
        other => Err(format!("Unknown normalization: {other}")),
    }
}

fn parse_args(args: Vec<String>) -> Result<CliOptions, String> {
    let mut options = CliOptions {
        out: PathBuf::from("classifier.json"),
        ..CliOptions::default()
    };
    let mut image = None;
    let mut annotations = None;
    let mut idx = 0usize;
    while idx < args.len() {
        let flag = args[idx].as_str();
        let mut value = || {
            idx += 1;
            args.get(idx)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "-h" | "--help" => return Err(help_text()),
            "--image" => image = Some(PathBuf::from(value()?)),
            "--annotations" => annotations = Some(PathBuf::from(value()?)),
            "--out" => options.out = PathBuf::from(value()?),
            "--config" => options.config = Some(PathBuf::from(value()?)),
            "--pixel-size" => options.pixel_size = Some(parse_number(flag, &value()?)?),
            "--downsample" => options.downsample = Some(parse_number(flag, &value()?)?),
            "--classifier" => options.classifier = Some(parse_classifier(&value()?)?),
            "--max-samples" => options.max_samples = Some(parse_number(flag, &value()?)?),
            "--seed" => options.seed = Some(parse_number(flag, &value()?)?),
            "--reweight" => options.reweight = true,
            "--boundary" => options.boundary = Some(value()?),
            "--thickness" => options.thickness = Some(parse_number(flag, &value()?)?),
            "--normalize" => options.normalization = Some(parse_normalization(&value()?)?),
            "--pca" => options.pca = Some(parse_number(flag, &value()?)?),
            "--probability" => options.probability = true,
            unknown => return Err(format!("Unknown argument: {unknown}\n\n{}", help_text())),
        }
        idx += 1;
    }
    options.image = image.ok_or_else(help_text)?;
    options.annotations = annotations.ok_or_else(help_text)?;
    Ok(options)
}

fn parse_number<T: std::str::FromStr>(flag: &str, value: &str) -> Result<T, String> {
    value
        .parse::<T>()
        .map_err(|_| format!("Invalid {flag} value: {value}"))
}

fn help_text() -> String {
    [
        "pixclass-train --image <path> --annotations <json> [options]",
        "",
        "Options:",
        "  --out <path>             Classifier JSON to write (default classifier.json)",
        "  --config <path>          Settings TOML (default: app config)",
        "  --pixel-size <µm>        Calibrate the image",
        "  --downsample <factor>    Working resolution",
        "  --classifier <name>      logreg | stumps | knn[:k] | majority",
        "  --max-samples <n>        Training row cap, 0 for none",
        "  --seed <n>               Split seed",
        "  --reweight               Balance classes by sample weight",
        "  --boundary <mode>        skip | derived | classify:<Class>",
        "  --thickness <px>         Boundary band thickness",
        "  --normalize <mode>       none | mean-std | min-max",
        "  --pca <variance>         Keep components up to this variance",
        "  --probability            Output class probabilities",
    ]
    .join("\n")
}
