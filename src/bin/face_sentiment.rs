//! face-sentiment — read the sentiment of the first face in an image
//!
//! With `--loop`, plays an animation through the analyzer and redraws the
//! latest result in place.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use huginn::cli::{self, CommonArgs};
use huginn::model::onnx::{FaceDetectorSpec, OnnxLoader, ScoreSpec};
use huginn::output::{FACE_SUFFIX, save_next_to};
use huginn::skill::face_sentiment::{self, FaceSentimentFactory, FaceSentimentResult};
use huginn::source::{AnimationFrameSource, ImageFileFrameSource, validate_extension};
use huginn::{Frame, HuginnError, Skill, SkillBinding, bind_and_evaluate};

/// Face sentiment analyzer
#[derive(Parser)]
#[command(name = "face-sentiment")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Detect a face and classify its sentiment")]
struct Args {
    /// Image to analyze (.jpg or .png)
    #[arg(required_unless_present_any = ["describe", "loop_path"])]
    image: Option<PathBuf>,

    /// Loop an animated .gif instead of analyzing a still image
    #[arg(long = "loop", value_name = "ANIMATION", conflicts_with = "image")]
    loop_path: Option<PathBuf>,

    /// Save the face crop next to the input as <stem>_face.jpg
    #[arg(long)]
    save_face: bool,

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

fn factory(config: &huginn::config::Config) -> huginn::Result<FaceSentimentFactory> {
    let manager = cli::model_manager(config);
    let detector = OnnxLoader::new(
        Arc::clone(&manager),
        config.models.face_detector.parse()?,
        FaceDetectorSpec::default(),
    );
    let scorer = OnnxLoader::new(
        manager,
        config.models.emotion.parse()?,
        ScoreSpec::emotion_ferplus(),
    );
    Ok(FaceSentimentFactory::new(Arc::new(detector), Arc::new(scorer)))
}

fn sentiment_line(result: &FaceSentimentResult) -> String {
    match result.predominant_sentiment() {
        Some(sentiment) => format!("Your sentiment looks like: {sentiment}"),
        None => "No face found".to_string(),
    }
}

fn summarize(binding: &SkillBinding) -> huginn::Result<String> {
    FaceSentimentResult::from_binding(binding).map(|r| sentiment_line(&r))
}

async fn run(args: Args) -> huginn::Result<()> {
    if args.common.describe {
        return cli::describe(&face_sentiment::descriptor());
    }
    tracing::info!(version = %huginn::long_version(), "face-sentiment starting");

    if let Some(animation) = args.loop_path {
        // Opening validates the extension before any model work.
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

    let result = FaceSentimentResult::from_binding(&binding)?;
    println!("{}", sentiment_line(&result));
    if result.is_face_found() {
        for sentiment in huginn::SentimentType::ALL {
            println!("  {sentiment}: {:.3}", result.score(sentiment));
        }
        if args.save_face {
            let image = source.image();
            let face = result.face.to_pixels(image.width(), image.height());
            let crop = image.crop_imm(face.x, face.y, face.width, face.height);
            let path = save_next_to(&image_path, FACE_SUFFIX, &crop)?;
            println!("Saved face to {}", path.display());
        }
    }
    Ok(())
}
