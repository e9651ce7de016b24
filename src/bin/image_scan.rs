//! image-scan — rectify and clean a photographed document or whiteboard
//!
//! Writes the result next to the input as `<stem>_mod.jpg`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use huginn::cli::{self, CommonArgs};
use huginn::model::{FixedQuadModel, QuadModel, SharedModel};
use huginn::output::{MODIFIED_SUFFIX, save_next_to};
use huginn::skill::image_scanning::{
    self, BuiltinFactory, ImageCleaningKind, ImageInterpolationKind, QuadDetectorFactory,
};
use huginn::source::{ImageFileFrameSource, validate_extension};
use huginn::{Frame, HuginnError, Quad, bind_and_evaluate};

const SKIP_RECTIFICATION: u32 = 4;

/// Image scanner
#[derive(Parser)]
#[command(name = "image-scan")]
#[command(version = huginn::PKG_VERSION)]
#[command(about = "Rectify and clean a document, whiteboard or picture")]
struct Args {
    /// Image to scan (.jpg or .png)
    #[arg(required_unless_present = "describe")]
    image: Option<PathBuf>,

    /// 1 Bilinear, 2 Bicubic, 3 HighQuality, 4 skip rectification
    interpolation: Option<String>,

    /// 1 WhiteboardOrDocument, 2 Whiteboard, 3 Document, 4 Picture
    cleaning: Option<String>,

    /// Region to rectify as x1,y1,...,x4,y4 in 0..1, clockwise from top left
    /// (default: whole image)
    #[arg(long)]
    quad: Option<Quad>,

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

/// Selection from the command line, or asked for interactively.
fn choose(raw: Option<&str>, title: &str, options: &[&str]) -> huginn::Result<u32> {
    let last = options.len() as u32;
    if raw.is_some() {
        return Ok(cli::value_or_default(raw, 1, title, |v| (1..=last).contains(v)));
    }

    println!("{title}:");
    for (index, option) in options.iter().enumerate() {
        println!("  {}. {option}", index + 1);
    }
    cli::prompt_choice(
        &mut io::stdin().lock(),
        &mut io::stdout(),
        &format!("Select 1-{last}:"),
        1..=last,
    )
}

async fn run(args: Args) -> huginn::Result<()> {
    if args.common.describe {
        for descriptor in [
            image_scanning::quad_detector_descriptor(),
            image_scanning::image_rectifier_descriptor(),
            image_scanning::image_cleaner_descriptor(),
        ] {
            cli::describe(&descriptor)?;
        }
        return Ok(());
    }
    let Some(image_path) = args.image else {
        return Err(HuginnError::InvalidInput("no image given".to_string()));
    };
    validate_extension(&image_path)?;
    tracing::info!(version = %huginn::long_version(), "image-scan starting");

    let mut interpolation_options: Vec<&str> =
        ImageInterpolationKind::ALL.iter().map(|k| k.name()).collect();
    interpolation_options.push("Skip quad detection and rectification");
    let interpolation = choose(
        args.interpolation.as_deref(),
        "Interpolation",
        &interpolation_options,
    )?;
    let cleaning_options: Vec<&str> = ImageCleaningKind::ALL.iter().map(|k| k.name()).collect();
    let cleaning = choose(args.cleaning.as_deref(), "Cleaning", &cleaning_options)?;
    let cleaning = ImageCleaningKind::ALL[cleaning as usize - 1];

    let config = cli::load_config(&args.common)?;
    let source = ImageFileFrameSource::open(&image_path).await?;
    let mut image = Arc::clone(source.image());

    if interpolation != SKIP_RECTIFICATION {
        let kind = ImageInterpolationKind::ALL[interpolation as usize - 1];
        let model: Arc<dyn QuadModel> = Arc::new(match args.quad {
            Some(quad) => FixedQuadModel::new(quad),
            None => FixedQuadModel::full_frame(),
        });
        let detector = QuadDetectorFactory::new(Arc::new(SharedModel::new(model)));
        let skill = cli::prepare_skill(&detector, &config, &args.common).await?;
        let mut binding = skill.create_binding();
        bind_and_evaluate(skill.as_ref(), &mut binding, &Frame::from_shared(Arc::clone(&image)))
            .await?;
        let quad = image_scanning::detected_quads(&binding)?
            .into_iter()
            .next()
            .unwrap_or_else(Quad::full_frame);

        let rectifier = BuiltinFactory::rectifier();
        let skill = cli::prepare_skill(&rectifier, &config, &args.common).await?;
        let mut binding = skill.create_binding();
        image_scanning::set_quad(&mut binding, quad)?;
        image_scanning::set_interpolation(&mut binding, kind)?;
        let timings =
            bind_and_evaluate(skill.as_ref(), &mut binding, &Frame::from_shared(image)).await?;
        image = image_scanning::output_image(&binding)?;
        println!("Rectified with {kind}: {}", cli::format_timings(&timings));
    }

    let cleaner = BuiltinFactory::cleaner();
    let skill = cli::prepare_skill(&cleaner, &config, &args.common).await?;
    let mut binding = skill.create_binding();
    image_scanning::set_cleaning_kind(&mut binding, cleaning)?;
    let timings = bind_and_evaluate(skill.as_ref(), &mut binding, &Frame::from_shared(image)).await?;
    println!("Cleaned as {cleaning}: {}", cli::format_timings(&timings));

    let path = save_next_to(&image_path, MODIFIED_SUFFIX, &*image_scanning::output_image(&binding)?)?;
    println!("Saved {}", path.display());
    Ok(())
}
