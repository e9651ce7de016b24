//! object-detector — find and count objects in an image
//!
//! With `--loop`, plays an animation through the detector and redraws the
//! latest counts in place.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use huginn::cli::{self, CommonArgs};
use huginn::model::LabelledClassifier;
use huginn::model::onnx::{ObjectDetectorSpec, OnnxLoader};
use huginn::skill::object_detector::{self, ObjectDetectorFactory, ObjectDetectorResult};
use huginn::source::{AnimationFrameSource, ImageFileFrameSource, validate_extension};
use huginn::{Frame, HuginnError, Skill, SkillBinding, bind_and_evaluate};

/// Object detector
#[derive(Parser)]
#[command(name = "object-detector")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Detect objects in an image or a looping animation")]
struct Args {
    /// Image to analyze (.jpg or .png)
    #[arg(required_unless_present_any = ["describe", "loop_path"])]
    image: Option<PathBuf>,

    /// Loop an animated .gif instead of analyzing a still image
    #[arg(long = "loop", value_name = "ANIMATION", conflicts_with = "image")]
    loop_path: Option<PathBuf>,

    /// Only report these kinds (repeatable)
    #[arg(short, long = "kind")]
    kinds: Vec<String>,

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

fn factory(config: &huginn::config::Config) -> huginn::Result<ObjectDetectorFactory> {
    let mut spec = ObjectDetectorSpec::yolo_coco();
    if let Some(labels) = &config.models.object_labels {
        spec.labels = LabelledClassifier::read_labels(labels)?.into();
    }
    let loader = OnnxLoader::new(
        cli::model_manager(config),
        config.models.object_detector.parse()?,
        spec,
    );
    Ok(ObjectDetectorFactory::new(Arc::new(loader)))
}

async fn run(args: Args) -> huginn::Result<()> {
    if args.common.describe {
        return cli::describe(&object_detector::descriptor());
    }
    tracing::info!(version = %huginn::long_version(), "object-detector starting");

    let kinds = args.kinds.clone();
    let summarize = move |binding: &SkillBinding| -> huginn::Result<String> {
        let result = ObjectDetectorResult::from_binding(binding)?;
        Ok(ObjectDetectorResult {
            objects: result.filtered(&kinds),
        }
        .summary())
    };

    if let Some(animation) = args.loop_path {
        let source = AnimationFrameSource::open(&animation).await?;
        let config = cli::load_config(&args.common)?;
        let factory = factory(&config)?;
        let skill = cli::prepare_skill(&factory, &config, &args.common).await?;
        let stats = cli::run_live(
            Box::new(source),
            skill,
            summarize,
            config.dispatcher.report_buffer,
        )
        .await?;
        println!(
            "Evaluated {} frames ({} failed, {} skipped while busy)",
            stats.evaluated, stats.failed, stats.replaced
        );
        return Ok(());
    }

    let Some(image_path) = args.image else {
        return Err(HuginnError::InvalidInput("no image given".to_string()));
    };
    validate_extension(&image_path)?;
    let config = cli::load_config(&args.common)?;
    let source = ImageFileFrameSource::open(&image_path).await?;
    let factory = factory(&config)?;
    let skill = cli::prepare_skill(&factory, &config, &args.common).await?;

    let mut binding = skill.create_binding();
    let frame = Frame::from_shared(Arc::clone(source.image()));
    let timings = bind_and_evaluate(skill.as_ref(), &mut binding, &frame).await?;
    println!("{}", cli::format_timings(&timings));
    println!("{}", summarize(&binding)?);

    let result = ObjectDetectorResult::from_binding(&binding)?;
    for object in result.filtered(&args.kinds) {
        let b = object.bounds;
        println!(
            "  {} {:.2} at ({}, {}) {}x{}",
            object.kind, object.score, b.x, b.y, b.width, b.height
        );
    }
    Ok(())
}
