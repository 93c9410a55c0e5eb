use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use folio_render::{
    build_blank_pdf, DecodingBackend, LopdfBackend, OpenSource, PageDimensions, SyntheticBackend,
};
use folio_viewer::{
    clamp_zoom, compute_layout, ContainerSize, FitMode, FixedViewport, LayoutPolicy, PageLayout,
    ScrollHost, ScrollerConfig, ScrollerEvent, ViewportRange, VirtualScroller,
};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "folio-cli")]
#[command(about = "Folio page pipeline diagnostics")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Compute the page layout for a container size.
    Layout {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Run the virtual scroller headless and report what it rendered.
    Simulate {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        view: ViewArgs,
        /// Page to jump to, 1-based.
        #[arg(long)]
        page: Option<u32>,
        /// Give up waiting for renders after this many milliseconds.
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
    },
    /// Write a blank PDF with uniform pages.
    Generate {
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        #[arg(long, default_value_t = 3)]
        pages: u32,
        #[arg(long, default_value_t = 612)]
        width: u32,
        #[arg(long, default_value_t = 792)]
        height: u32,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// PDF file to open.
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
    /// Use a generated document with this many pages instead of a file.
    #[arg(long)]
    synthetic_pages: Option<u32>,
}

#[derive(Debug, Args)]
struct ViewArgs {
    /// fixed, fit-width, fit-height or fit-page.
    #[arg(long)]
    fit: Option<FitMode>,
    /// Zoom for the fixed fit mode.
    #[arg(long)]
    scale: Option<f64>,
    #[arg(long, default_value_t = 800.0)]
    width: f64,
    #[arg(long, default_value_t = 600.0)]
    height: f64,
    /// Scroller settings file, defaulting to the user config; FOLIO_* variables override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Page size of generated documents, in points.
    #[arg(long, default_value_t = 612.0)]
    page_width: f64,
    #[arg(long, default_value_t = 792.0)]
    page_height: f64,
    /// Generated pages whose render fails.
    #[arg(long = "fail-page")]
    fail_pages: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
    outline_entries: usize,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f64,
    height: f64,
}

#[derive(Debug, Serialize)]
struct LayoutOutput {
    page_count: u32,
    policy: LayoutPolicy,
    container: ContainerSize,
    total_height: f64,
    pages: Vec<PageLayout>,
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    page_count: u32,
    policy: LayoutPolicy,
    zoom: f64,
    total_height: f64,
    scroll_top: f64,
    range: Option<ViewportRange>,
    current_page: Option<u32>,
    live_slots: Vec<u32>,
    rendered_slots: usize,
    failed_pages: Vec<u32>,
    relayouts: u64,
    renders: RenderCounts,
}

#[derive(Debug, Serialize)]
struct RenderCounts {
    dispatched: u64,
    completed: u64,
    cancelled: u64,
    failed: u64,
    stale: u64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Layout { source, view } => match open_source(&source, &view)? {
            Backend::Pdf(backend) => run_layout(&backend, &view),
            Backend::Synthetic(backend) => run_layout(&backend, &view),
        },
        Commands::Simulate { source, view, page, timeout_ms } => {
            let timeout = Duration::from_millis(timeout_ms);
            match open_source(&source, &view)? {
                Backend::Pdf(backend) => run_simulate(Arc::new(backend), &view, page, timeout),
                Backend::Synthetic(backend) => {
                    run_simulate(Arc::new(backend), &view, page, timeout)
                }
            }
        }
        Commands::Generate { output, pages, width, height } => {
            run_generate(&output, pages, width, height)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

enum Backend {
    Pdf(LopdfBackend),
    Synthetic(SyntheticBackend),
}

fn open_source(source: &SourceArgs, view: &ViewArgs) -> Result<Backend> {
    if let Some(pages) = source.synthetic_pages {
        let backend = SyntheticBackend::uniform(pages, view.page_width, view.page_height)
            .with_failing_pages(view.fail_pages.iter().copied());
        return Ok(Backend::Synthetic(backend));
    }

    let file = source.file.as_deref().context("a FILE or --synthetic-pages is required")?;
    Ok(Backend::Pdf(open_pdf(file)?))
}

fn open_pdf(file: &Path) -> Result<LopdfBackend> {
    ensure_pdf_exists(file)?;
    LopdfBackend::open(OpenSource::from(file)).context("failed to open PDF")
}

fn load_config(view: &ViewArgs) -> Result<ScrollerConfig> {
    let path = view.config.clone().or_else(|| {
        let default = ScrollerConfig::default_config_path();
        default.is_file().then_some(default)
    });
    let config = match path {
        Some(path) => ScrollerConfig::from_file(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?
            .with_env_overrides()?,
        None => ScrollerConfig::from_env()?,
    };
    let policy = resolve_policy(&config, view.fit, view.scale);
    Ok(config.with_policy(policy))
}

fn resolve_policy(
    config: &ScrollerConfig,
    fit: Option<FitMode>,
    scale: Option<f64>,
) -> LayoutPolicy {
    match (fit, scale) {
        (Some(FitMode::Fixed), scale) => {
            LayoutPolicy::fixed(clamp_zoom(scale.unwrap_or(config.scale)))
        }
        (Some(mode), _) => LayoutPolicy::fit(mode),
        (None, Some(scale)) => LayoutPolicy::fixed(clamp_zoom(scale)),
        (None, None) => config.policy(),
    }
}

fn run_info(file: &Path) -> Result<()> {
    let backend = open_pdf(file)?;

    let page_count = backend.page_count();
    let first_page_size_pt = if page_count > 0 {
        let size = backend.page_dimensions(0)?;
        Some(PageSizeOutput { width: size.natural_width, height: size.natural_height })
    } else {
        None
    };
    let outline_entries = backend.outline().map(|outline| outline.len()).unwrap_or_default();

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count,
        first_page_size_pt,
        outline_entries,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_layout<B: DecodingBackend>(backend: &B, view: &ViewArgs) -> Result<()> {
    let config = load_config(view)?;
    let container = ContainerSize::new(view.width, view.height);

    let dimensions: Vec<PageDimensions> = (0..backend.page_count())
        .map(|page| {
            backend.page_dimensions(page).unwrap_or_else(|error| {
                tracing::warn!(page, %error, "using fallback page size");
                PageDimensions::fallback()
            })
        })
        .collect();
    let layout =
        compute_layout(&dimensions, config.policy(), container, &config.geometry_options());

    let payload = LayoutOutput {
        page_count: layout.page_count(),
        policy: config.policy(),
        container,
        total_height: layout.total_height(),
        pages: layout.pages().to_vec(),
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_simulate<B: DecodingBackend + 'static>(
    backend: Arc<B>,
    view: &ViewArgs,
    page: Option<u32>,
    timeout: Duration,
) -> Result<()> {
    let config = load_config(view)?;
    let page_count = backend.page_count();

    if let Some(page) = page {
        if page == 0 {
            anyhow::bail!("--page is 1-based and must be >= 1");
        }
        if page > page_count {
            anyhow::bail!("--page {page} is past the last page ({page_count})");
        }
    }

    let viewport = FixedViewport::new(view.width, view.height);
    let mut scroller = VirtualScroller::new(backend, viewport, config)?;
    let events = scroller.subscribe();
    scroller.init().context("failed to initialize scroller")?;

    if !scroller.wait_idle(timeout) {
        anyhow::bail!("renders did not finish within {}ms", timeout.as_millis());
    }

    if let Some(page) = page {
        scroller.scroll_to_page(page - 1, false);
        scroller.on_scroll();
        if !scroller.wait_idle(timeout) {
            anyhow::bail!("renders did not finish within {}ms", timeout.as_millis());
        }
    }

    let failed_pages = events
        .try_iter()
        .filter_map(|event| match event {
            ScrollerEvent::RenderFailed { page_index, .. } => Some(page_index),
            ScrollerEvent::CurrentPageChanged(_) => None,
        })
        .collect();

    let stats = scroller.stats();
    let payload = SimulateOutput {
        page_count,
        policy: scroller.policy(),
        zoom: scroller.zoom(),
        total_height: scroller.layout().total_height(),
        scroll_top: scroller.host().scroll_top(),
        range: scroller.range(),
        current_page: scroller.current_page(),
        live_slots: scroller.slot_pages(),
        rendered_slots: stats.slots.rendered_slots,
        failed_pages,
        relayouts: stats.relayouts,
        renders: RenderCounts {
            dispatched: stats.scheduler.tasks_dispatched,
            completed: stats.scheduler.tasks_completed,
            cancelled: stats.scheduler.tasks_cancelled,
            failed: stats.scheduler.tasks_failed,
            stale: stats.scheduler.stale_results,
        },
    };

    scroller.destroy();

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_generate(output: &Path, pages: u32, width: u32, height: u32) -> Result<()> {
    if pages == 0 {
        anyhow::bail!("--pages must be >= 1");
    }

    let sizes = vec![(width, height); pages as usize];
    let bytes = build_blank_pdf(&sizes).context("failed to build PDF")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, bytes)
        .with_context(|| format!("failed to write PDF to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}
