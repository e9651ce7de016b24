//! Helpers shared by the console programs.

use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_stream::StreamExt;
use tracing::info;

use crate::config::Config;
use crate::dispatch::{DispatchReport, DispatchStats, FrameDispatcher};
use crate::skill::{Skill, SkillBinding, SkillFactory, Timings, select_device};
use crate::source::FrameSource;
use crate::types::SkillDescriptor;
use crate::{HuginnError, Result};

/// Flags every program accepts.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CommonArgs {
    /// Config file path
    #[arg(short, long, env = "HUGINN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Index into the skill's supported devices (default: first)
    #[arg(short, long)]
    pub device: Option<usize>,

    /// Print the skill descriptor as JSON and exit
    #[arg(long)]
    pub describe: bool,
}

/// Initialise tracing (default: warn; override with RUST_LOG).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

/// Print `error` and exit with its category's code.
pub fn exit_with(error: HuginnError) -> ! {
    eprintln!("error: {error}");
    std::process::exit(error.exit_code())
}

pub fn load_config(args: &CommonArgs) -> Result<Config> {
    Config::load(args.config.as_deref())
}

/// Print the descriptor as pretty JSON.
pub fn describe(descriptor: &SkillDescriptor) -> Result<()> {
    println!("{}", descriptor.to_json()?);
    Ok(())
}

/// List the devices `factory` supports, pick one and create the skill.
pub async fn prepare_skill(
    factory: &dyn SkillFactory,
    config: &Config,
    args: &CommonArgs,
) -> Result<Arc<dyn Skill>> {
    let registry = config.devices.registry()?;
    let devices = factory.supported_devices(&registry)?;
    println!("Available devices for {}:", factory.descriptor().name);
    for (index, device) in devices.iter().enumerate() {
        println!("  [{index}] {device}");
    }

    let device = select_device(factory, &registry, args.device.or(config.devices.preferred))?;
    println!("Running {} on {device}", factory.descriptor().name);
    factory.create_skill(device).await
}

/// Model manager honouring the configured cache directory.
#[cfg(feature = "local-inference")]
pub fn model_manager(config: &Config) -> Arc<crate::model::ModelManager> {
    use crate::model::{ModelManager, ModelManagerConfig};

    let mut manager_config = ModelManagerConfig::default();
    if let Some(dir) = &config.models.cache_dir {
        manager_config.cache_dir = dir.clone();
    }
    Arc::new(ModelManager::new(manager_config))
}

/// Parse an optional positional value, falling back to `default` with a
/// notice when it is missing, unparsable or rejected by `valid`.
pub fn value_or_default<T>(raw: Option<&str>, default: T, what: &str, valid: impl Fn(&T) -> bool) -> T
where
    T: std::str::FromStr + Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            eprintln!("{what} '{raw}' is out of range, using default {default}");
            default
        }
    }
}

/// Ask for a number in `range` until one is entered.
///
/// End of input is an error.
pub fn prompt_choice(
    input: &mut impl BufRead,
    output: &mut impl Write,
    prompt: &str,
    range: RangeInclusive<u32>,
) -> Result<u32> {
    loop {
        write!(output, "{prompt} ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(HuginnError::InvalidInput(format!(
                "no selection made for '{prompt}'"
            )));
        }
        match line.trim().parse::<u32>() {
            Ok(choice) if range.contains(&choice) => return Ok(choice),
            _ => writeln!(
                output,
                "Please enter a number between {} and {}.",
                range.start(),
                range.end()
            )?,
        }
    }
}

/// A console line redrawn in place with `\r`.
#[derive(Debug, Default)]
pub struct LiveLine {
    last_len: usize,
}

impl LiveLine {
    /// Replace the current line with `text`, blanking leftovers from a
    /// longer previous line.
    pub fn redraw(&mut self, output: &mut impl Write, text: &str) -> io::Result<()> {
        let len = text.chars().count();
        let padding = self.last_len.saturating_sub(len);
        write!(output, "\r{text}{}", " ".repeat(padding))?;
        output.flush()?;
        self.last_len = len;
        Ok(())
    }

    /// Move past the live line.
    pub fn finish(&mut self, output: &mut impl Write) -> io::Result<()> {
        if self.last_len > 0 {
            writeln!(output)?;
            self.last_len = 0;
        }
        Ok(())
    }
}

pub fn format_timings(timings: &Timings) -> String {
    format!(
        "bind {:.1} ms | evaluate {:.1} ms",
        timings.bind.as_secs_f64() * 1000.0,
        timings.evaluate.as_secs_f64() * 1000.0
    )
}

fn format_report<T: Display>(report: &DispatchReport<T>) -> String {
    format!(
        "#{} | {} | {}",
        report.sequence,
        format_timings(&report.timings),
        report.summary
    )
}

/// Stream `source` through `skill` until the source ends or Ctrl-C,
/// redrawing one status line per report.
pub async fn run_live<T, F>(
    source: Box<dyn FrameSource>,
    skill: Arc<dyn Skill>,
    summarize: F,
    buffer: usize,
) -> Result<DispatchStats>
where
    T: Display + Send + 'static,
    F: Fn(&SkillBinding) -> Result<T> + Send + 'static,
{
    let binding = skill.create_binding();
    let (dispatcher, mut reports) = FrameDispatcher::spawn(skill, binding, summarize, buffer);
    source.start(dispatcher.sink()).await?;
    info!(source = %source.kind(), "live mode started");

    let mut line = LiveLine::default();
    let mut stdout = io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            report = reports.next() => match report {
                Some(Ok(report)) => line.redraw(&mut stdout, &format_report(&report))?,
                Some(Err(e)) => line.redraw(&mut stdout, &format!("error: {e}"))?,
                None => break,
            },
        }
    }

    source.stop().await?;
    let stats = dispatcher.stats();
    dispatcher.shutdown().await?;
    line.finish(&mut stdout)?;
    info!(?stats, "live mode stopped");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn prompt_repeats_until_in_range() {
        let mut input = Cursor::new("9\nabc\n3\n");
        let mut output = Vec::new();
        let choice = prompt_choice(&mut input, &mut output, "Interpolation?", 1..=4).unwrap();
        assert_eq!(choice, 3);
        let printed = String::from_utf8(output).unwrap();
        assert_eq!(printed.matches("Please enter a number between 1 and 4.").count(), 2);
    }

    #[test]
    fn prompt_fails_at_end_of_input() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        let err = prompt_choice(&mut input, &mut output, "Cleaning?", 1..=4).unwrap_err();
        assert!(matches!(err, HuginnError::InvalidInput(_)));
    }

    #[test]
    fn out_of_range_values_fall_back() {
        assert_eq!(value_or_default(None, 5usize, "top_x", |v| *v > 0), 5);
        assert_eq!(value_or_default(Some("3"), 5usize, "top_x", |v| *v > 0), 3);
        assert_eq!(value_or_default(Some("0"), 5usize, "top_x", |v| *v > 0), 5);
        let threshold = value_or_default(Some("1.5"), 0.7f32, "threshold", |v| (0.0..=1.0).contains(v));
        assert!((threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn live_line_blanks_leftovers() {
        let mut line = LiveLine::default();
        let mut output = Vec::new();
        line.redraw(&mut output, "long status").unwrap();
        line.redraw(&mut output, "short").unwrap();
        line.finish(&mut output).unwrap();
        let printed = String::from_utf8(output).unwrap();
        assert_eq!(printed, "\rlong status\rshort      \n");
    }
}
