//! concept-tagger — list the concepts an image shows
//!
//! Prints the top tags scoring above a threshold.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use huginn::cli::{self, CommonArgs};
use huginn::model::LabelledClassifier;
use huginn::model::onnx::{ConceptSpec, OnnxLoader, Preprocess, ScoreSpec};
use huginn::skill::concept_tagger::{self, ConceptTaggerFactory, ConceptTaggerResult};
use huginn::source::{ImageFileFrameSource, validate_extension};
use huginn::{Frame, Skill, bind_and_evaluate};

/// Tag an image with concepts
#[derive(Parser)]
#[command(name = "concept-tagger")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Infer concept tags for a .jpg or .png image")]
struct Args {
    /// Image to tag (.jpg or .png)
    #[arg(required_unless_present = "describe")]
    image: Option<PathBuf>,

    /// Number of tags to print (default: 5)
    top_x: Option<String>,

    /// Minimum tag score, 0 to 1 (default: 0.7)
    threshold: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() {
    cli::init_tracing();
    let args = Args::parse();
    if let Err(e) = run(args).await {
        cli::exit_with(e);
    }
}

async fn run(args: Args) -> huginn::Result<()> {
    if args.common.describe {
        return cli::describe(&concept_tagger::descriptor());
    }
    let Some(image_path) = args.image else {
        return Err(huginn::HuginnError::InvalidInput("no image given".to_string()));
    };
    validate_extension(&image_path)?;
    tracing::info!(version = %huginn::long_version(), "concept-tagger starting");

    let config = cli::load_config(&args.common)?;
    let top_x = cli::value_or_default(
        args.top_x.as_deref(),
        config.postprocess.top_x,
        "top_x",
        |v| *v > 0,
    );
    let threshold = cli::value_or_default(
        args.threshold.as_deref(),
        config.postprocess.threshold,
        "threshold",
        |v: &f32| (0.0..=1.0).contains(v),
    );

    let source = ImageFileFrameSource::open(&image_path).await?;

    let labels = LabelledClassifier::read_labels(&config.models.concept_labels)?;
    let loader = OnnxLoader::new(
        cli::model_manager(&config),
        config.models.concept.parse()?,
        ConceptSpec {
            scores: ScoreSpec {
                input: config.models.concept_input.clone(),
                output: config.models.concept_output.clone(),
                preprocess: Preprocess::imagenet(224),
            },
            labels: labels.into(),
        },
    );
    let factory = ConceptTaggerFactory::new(Arc::new(loader));
    let skill = cli::prepare_skill(&factory, &config, &args.common).await?;

    let mut binding = skill.create_binding();
    let frame = Frame::from_shared(Arc::clone(source.image()));
    let timings = bind_and_evaluate(skill.as_ref(), &mut binding, &frame).await?;
    println!("{}", cli::format_timings(&timings));

    let result = ConceptTaggerResult::from_binding(&binding)?;
    let tags = result.top_x_tags_above_threshold_by(top_x, threshold, config.postprocess.tie_break);
    if tags.is_empty() {
        println!("No tag scored above {threshold}");
    }
    for tag in tags {
        println!("  {}: {:.2}", tag.name, tag.score);
    }
    Ok(())
}
