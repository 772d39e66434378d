use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{load_config, parse_config, save_config, AppConfig};
use crate::element::tree::UiTree;
use crate::errors::{MarketError, MarketResult};
use crate::executor::coordinator::{ClickTiming, Coordinator};
use crate::executor::dispatcher::{dispatch, load_script, run_script, ScriptAction, ViaKind};
use crate::executor::input::{EnigoDriver, MouseButton};
use crate::perception::images::ImageRepository;
use crate::perception::locator::{PollSettings, ScreenLocator};
use crate::perception::ocr::TesseractCli;
use crate::perception::screenshot::XcapScreen;
use crate::perception::traits::ImageLookup;
use crate::perception::types::{Point, Region};
use crate::perception::wait::{Clock, Deadline, SystemClock};
use crate::structure::build_tree;

#[derive(Parser, Debug)]
#[command(
    name = "markethand",
    version,
    about = "Drive a game marketplace UI through image-anchored elements"
)]
pub struct Cli {
    /// Config file (default: $MARKETHAND_CONFIG, then the usual locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Debug logging unless RUST_LOG says otherwise
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

/// Marketplace UI map written by `init-config`.
const SHIPPED_CONFIG: &str = include_str!("../config.toml");

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a starter config with the marketplace UI map
    #[command(name = "init-config")]
    InitConfig(InitConfigArgs),
    /// List the loaded reference images
    Images,
    /// Print the declared UI map with resolved locations
    Tree,
    /// Search the screen once for a reference image
    Locate(LocateArgs),
    /// Wait until a reference image shows up
    Wait(WaitArgs),
    /// OCR the screen (or a region) and report where the text is
    #[command(name = "find-text")]
    FindText(FindTextArgs),
    /// Move the pointer over an element, a reference image or on-screen text
    #[command(name = "move")]
    MoveTo(MoveArgs),
    /// Click a declared element
    Click(ClickArgs),
    /// Type text into a declared element
    Insert(InsertArgs),
    /// Run a TOML or JSON action script
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct InitConfigArgs {
    #[arg(default_value = "config.toml")]
    pub path: PathBuf,
    /// Replace an existing file
    #[arg(long, action = ArgAction::SetTrue)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct LocateArgs {
    pub image: String,
    #[arg(long)]
    pub confidence: Option<f64>,
}

#[derive(Args, Debug)]
pub struct WaitArgs {
    pub image: String,
    #[arg(long)]
    pub confidence: Option<f64>,
    /// Give up after this many milliseconds (default: locator.visible_timeout_ms)
    #[arg(long, conflicts_with = "forever")]
    pub timeout_ms: Option<u64>,
    /// Wait without a deadline
    #[arg(long, action = ArgAction::SetTrue)]
    pub forever: bool,
}

#[derive(Args, Debug)]
pub struct FindTextArgs {
    pub needle: String,
    /// Search area as `x,y,width,height`
    #[arg(long)]
    pub region: Option<Region>,
    /// Keep polling for this many milliseconds
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Resolve the target by live image search
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "needle")]
    pub image: bool,
    /// Resolve the target by OCR search for this text
    #[arg(long = "text")]
    pub needle: Option<String>,
    /// OCR search area as `x,y,width,height`
    #[arg(long, requires = "needle")]
    pub region: Option<Region>,
    /// Extra displacement as `x,y`
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<Point>,
}

impl TargetArgs {
    fn via(&self) -> ViaKind {
        if self.needle.is_some() {
            ViaKind::Text
        } else if self.image {
            ViaKind::Image
        } else {
            ViaKind::Coordinates
        }
    }

    fn offset(&self) -> Option<[i32; 2]> {
        self.offset.map(|p| [p.x, p.y])
    }
}

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("hover_target").required(true).args(["element", "image", "text"])))]
pub struct MoveArgs {
    /// Declared element to hover
    #[arg(long)]
    pub element: Option<String>,
    /// Reference image to search for
    #[arg(long)]
    pub image: Option<String>,
    /// Text to search for with OCR
    #[arg(long)]
    pub text: Option<String>,
    /// OCR search area as `x,y,width,height`
    #[arg(long, requires = "text")]
    pub region: Option<Region>,
    /// Extra displacement as `x,y`
    #[arg(long, allow_hyphen_values = true)]
    pub offset: Option<Point>,
    #[arg(long)]
    pub confidence: Option<f64>,
}

#[derive(Args, Debug)]
pub struct ClickArgs {
    pub element: String,
    #[command(flatten)]
    pub target: TargetArgs,
    #[arg(long, default_value = "left")]
    pub button: MouseButton,
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
    /// Click every ancestor first, root to leaf
    #[arg(long, action = ArgAction::SetTrue)]
    pub walk: bool,
    #[arg(long)]
    pub confidence: Option<f64>,
    #[arg(long)]
    pub delay_ms: Option<u64>,
    /// Abort when the pointer is parked at (0, 0)
    #[arg(long, action = ArgAction::SetTrue)]
    pub fail_safe: bool,
}

#[derive(Args, Debug)]
pub struct InsertArgs {
    pub element: String,
    pub text: String,
    #[command(flatten)]
    pub target: TargetArgs,
    /// Pause between characters
    #[arg(long, default_value_t = 0)]
    pub interval_ms: u64,
    /// Press enter afterwards
    #[arg(long, action = ArgAction::SetTrue)]
    pub enter: bool,
    /// Keep the existing field contents
    #[arg(long, action = ArgAction::SetTrue)]
    pub no_clear: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    pub script: PathBuf,
    /// Keep going after a failed step
    #[arg(long, action = ArgAction::SetTrue)]
    pub continue_on_failure: bool,
    /// Print the run report as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,
}

/// Run a parsed command. `Ok(false)` means the target was not found.
pub fn execute(cli: Cli) -> MarketResult<bool> {
    if let Command::InitConfig(args) = &cli.command {
        init_config(&args.path, args.force)?;
        println!("config written to {}", args.path.display());
        return Ok(true);
    }
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::InitConfig(_) => Ok(true),
        Command::Images => list_images(&config),
        Command::Tree => print_tree(&config),
        Command::Locate(args) => {
            let coord = build_coordinator(&config)?;
            let confidence = args.confidence.unwrap_or(config.locator.confidence);
            Ok(report_point(&args.image, coord.locator().locate(&args.image, confidence)))
        }
        Command::Wait(args) => {
            let mut coord = build_coordinator(&config)?;
            let confidence = args.confidence.unwrap_or(config.locator.confidence);
            let deadline = if args.forever {
                Deadline::Never
            } else {
                Deadline::After(
                    args.timeout_ms
                        .map(Duration::from_millis)
                        .unwrap_or(config.locator.visible_timeout()),
                )
            };
            let visible = coord.wait_image(&args.image, confidence, deadline);
            println!("{}: {}", args.image, if visible { "visible" } else { "not visible" });
            Ok(visible)
        }
        Command::FindText(args) => {
            let mut coord = build_coordinator(&config)?;
            let found = match args.wait_ms {
                Some(ms) => coord.wait_text(&args.needle, Deadline::After(Duration::from_millis(ms)), args.region),
                None => coord.locate_text(args.region, &args.needle),
            };
            Ok(report_point(&args.needle, found))
        }
        Command::MoveTo(args) => {
            let action = ScriptAction::MoveTo {
                element: args.element,
                image: args.image,
                text: args.text,
                offset: args.offset.map(|p| [p.x, p.y]),
                region: args.region,
                confidence: args.confidence,
            };
            run_single(&config, action)
        }
        Command::Click(args) => {
            let action = ScriptAction::Click {
                element: args.element,
                offset: args.target.offset(),
                confidence: args.confidence,
                button: args.button,
                repeat: args.repeat,
                delay_ms: args.delay_ms,
                walk: args.walk,
                via: args.target.via(),
                needle: args.target.needle.clone(),
                region: args.target.region,
                fail_safe: args.fail_safe,
            };
            run_single(&config, action)
        }
        Command::Insert(args) => {
            let action = ScriptAction::Insert {
                element: args.element,
                text: args.text,
                interval_ms: args.interval_ms,
                enter: args.enter,
                clear: !args.no_clear,
                offset: args.target.offset(),
                via: args.target.via(),
                needle: args.target.needle.clone(),
                region: args.target.region,
            };
            run_single(&config, action)
        }
        Command::Run(args) => {
            let mut script = load_script(&args.script)?;
            script.continue_on_failure |= args.continue_on_failure;
            let mut tree = build_tree(&config.elements)?;
            let mut coord = build_coordinator(&config)?;
            let report = run_script(&mut tree, &mut coord, &script);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for step in &report.steps {
                    let status = if step.success { "ok" } else { "FAILED" };
                    match &step.error {
                        Some(error) => println!("[{:>3}] {status:<6} {} ({error})", step.index, step.action),
                        None => println!("[{:>3}] {status:<6} {}", step.index, step.action),
                    }
                }
                if report.skipped > 0 {
                    println!("{} step(s) skipped", report.skipped);
                }
            }
            Ok(report.succeeded())
        }
    }
}

/// Write the shipped UI map and default settings to `path`.
fn init_config(path: &Path, force: bool) -> MarketResult<()> {
    if path.exists() && !force {
        return Err(MarketError::Config(format!(
            "{} already exists, pass --force to replace it",
            path.display()
        )));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    save_config(&parse_config(SHIPPED_CONFIG)?, path)
}

fn list_images(config: &AppConfig) -> MarketResult<bool> {
    let images = ImageRepository::load(config.images_dir(), config.images.create_if_missing)?;
    for name in images.names() {
        if let Some(image) = images.lookup(name) {
            println!("{name}\t{}x{}", image.width(), image.height());
        }
    }
    tracing::info!(count = images.len(), path = %images.dir().display(), "reference images");
    Ok(!images.is_empty())
}

fn print_tree(config: &AppConfig) -> MarketResult<bool> {
    let tree = build_tree(&config.elements)?;
    print!("{}", render_tree(&tree));
    Ok(true)
}

fn render_tree(tree: &UiTree) -> String {
    let mut out = String::new();
    for (depth, id) in tree.outline() {
        let Some(el) = tree.element(id) else {
            continue;
        };
        let location = el.location().map_or_else(|| "unanchored".to_string(), |p| p.to_string());
        let image = el.bound_image().unwrap_or("-");
        out.push_str(&format!("{:indent$}{}  {location}  [{image}]\n", "", el.name(), indent = depth * 2));
    }
    out
}

fn report_point(label: &str, point: Option<Point>) -> bool {
    match point {
        Some(p) => {
            println!("{label}: {p}");
            true
        }
        None => {
            println!("{label}: not found");
            false
        }
    }
}

fn run_single(config: &AppConfig, action: ScriptAction) -> MarketResult<bool> {
    let mut tree = build_tree(&config.elements)?;
    let mut coord = build_coordinator(config)?;
    dispatch(&mut tree, &mut coord, &action)
}

/// Wire the OS backed screen, OCR engine and input device together.
/// A configured but missing OCR engine aborts here.
pub fn build_coordinator(config: &AppConfig) -> MarketResult<Coordinator> {
    let images = ImageRepository::load(config.images_dir(), config.images.create_if_missing)?;
    if let Some(recovery) = &config.locator.recovery_image {
        if !images.contains(recovery) {
            tracing::warn!(image = %recovery, "recovery image is not in the repository");
        }
    }
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut locator = ScreenLocator::new(
        images,
        Box::new(XcapScreen::new()),
        clock,
        PollSettings::from_config(&config.locator),
    );
    if config.ocr.enabled {
        let ocr = TesseractCli::new(
            config.ocr.resolved_tesseract_path(),
            config.ocr.args.clone(),
            config.ocr.language.clone(),
        )?;
        locator = locator.with_ocr(Box::new(ocr));
    }
    let input = EnigoDriver::new()?;
    let timing = ClickTiming::from_config(&config.input, &config.locator);
    Ok(Coordinator::new(locator, Box::new(input), timing)
        .with_recovery_image(config.locator.recovery_image.clone()))
}
