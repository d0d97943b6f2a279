use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, Clear, ClearType};
use directories::ProjectDirs;
use pageview_core::{
    CursorGlyph, FileStateStore, ImagePayload, LinkAction, PageView, Rect, Size, StateStore,
    ViewCommand, ViewEvent, ViewerConfig, ZoomMode,
};
use pageview_render::{load_stamp_image, PdfiumProvider};
use pageview_tty::{
    write_status_line, CellMetrics, DrawParams, EventMapper, FrameBuffer, InputMode,
    KittyRenderer, PointerInput, UiEvent,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "pageview",
    version,
    about = "Terminal document viewer with image stamp placement"
)]
struct Args {
    /// Document to open
    file: PathBuf,

    /// Page to open on (0-based); overrides the remembered page
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Image placed into each field drawn in add mode
    #[arg(long = "stamp")]
    stamp: Option<PathBuf>,

    /// Where `s` writes the placement manifest (default: <FILE>.stamps.json)
    #[arg(long = "manifest")]
    manifest: Option<PathBuf>,

    /// Config file (default: <config dir>/config.toml)
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// fit-width, fit-height, fit-best or explicit
    #[arg(long = "zoom-mode")]
    zoom_mode: Option<ZoomMode>,
}

struct TerminalGuard;

impl TerminalGuard {
    fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableMouseCapture, cursor::Hide)?;
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableMouseCapture, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

/// Terminal geometry split into the page area and the status row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Screen {
    columns: u16,
    rows: u16,
    cells: CellMetrics,
}

impl Screen {
    fn query() -> Result<Self> {
        let window = terminal::window_size()?;
        Ok(Self::new(window.columns, window.rows, window.width, window.height))
    }

    fn new(columns: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(2),
            cells: CellMetrics::from_window(columns, rows, pixel_width, pixel_height),
        }
    }

    fn page_rows(&self) -> u16 {
        self.rows - 1
    }

    fn status_row(&self) -> u16 {
        self.rows - 1
    }

    fn view_size(&self) -> Size {
        self.cells.area(self.columns, self.page_rows())
    }
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

struct App {
    view: PageView,
    mapper: EventMapper,
    manifest_path: PathBuf,
    message: Option<String>,
    cursor: CursorGlyph,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "pageview", "pageview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = ViewerConfig::load_or_default(&config_path)?;
    let state_dir = project_dirs.data_local_dir().join("state");
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(state_dir)?);

    let mut screen = Screen::query()?;
    let mut view = PageView::new(&config, screen.view_size());
    let provider = PdfiumProvider::new()?;
    view.open_with(&provider, &args.file)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;

    if let Err(err) = view.restore_from(store.as_ref()) {
        warn!(?err, "ignoring unreadable view state");
    }
    view.batch(|view| -> Result<()> {
        if let Some(mode) = args.zoom_mode {
            view.apply(ViewCommand::SetZoomMode { mode })?;
        }
        if let Some(page) = args.page {
            view.apply(ViewCommand::GotoPage { page })?;
        }
        Ok(())
    })?;

    if let Some(path) = &args.stamp {
        let image = load_stamp_image(path)?;
        view.stage_payload(Some(ImagePayload::new(image).with_origin(path)));
        info!(stamp = %path.display(), "staged stamp image");
    }

    let manifest_path = args
        .manifest
        .clone()
        .unwrap_or_else(|| default_manifest_path(&args.file));
    let mut app = App {
        view,
        mapper: EventMapper::with_cells(screen.cells),
        manifest_path,
        message: None,
        cursor: CursorGlyph::default(),
    };

    let guard = TerminalGuard::new()?;
    let mut renderer = KittyRenderer::new(io::stdout());
    let mut frame = FrameBuffer::new(screen.view_size());
    renderer.reset()?;
    let mut dirty = true;

    loop {
        if dirty {
            redraw(&mut renderer, &mut frame, &mut app, &screen)?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ui_event = app.mapper.map_event(event::read()?);
            if let UiEvent::Resize { columns, rows } = ui_event {
                screen = Screen::query().unwrap_or_else(|_| Screen::new(columns, rows, 0, 0));
                app.mapper.set_cells(screen.cells);
                renderer.reset()?;
                app.view.apply(ViewCommand::Resize {
                    size: screen.view_size(),
                })?;
            }
            match handle_event(ui_event, &mut app)? {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
            if drain_view_events(&mut app) {
                dirty = true;
            } else {
                draw_status_line(&mut renderer, &app, &screen)?;
            }
        }
    }

    renderer.reset()?;
    drop(guard);

    app.view.save_to(store.as_ref())?;
    Ok(())
}

fn handle_event(event: UiEvent, app: &mut App) -> Result<LoopAction> {
    match event {
        UiEvent::Command(command) => {
            app.view.apply(command)?;
            Ok(LoopAction::Continue)
        }
        UiEvent::Pointer(PointerInput::Down(button, point)) => {
            app.view.pointer_down(button, point);
            Ok(LoopAction::Continue)
        }
        UiEvent::Pointer(PointerInput::Move(point)) => {
            app.view.pointer_move(point);
            Ok(LoopAction::Continue)
        }
        UiEvent::Pointer(PointerInput::Up(button, point)) => {
            app.view.pointer_up(button, point);
            Ok(LoopAction::Continue)
        }
        UiEvent::RequestDelete => {
            if app.view.hovered_field().is_none() {
                app.mapper.set_mode(InputMode::Normal);
                app.message = Some("no field under the pointer".to_owned());
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::ConfirmDelete { accepted } => {
            if app.view.delete_hovered(|_| accepted).is_some() {
                app.message = Some("field deleted".to_owned());
            }
            Ok(LoopAction::Continue)
        }
        UiEvent::SaveManifest => {
            app.message = Some(save_manifest(app)?);
            Ok(LoopAction::Continue)
        }
        // geometry was already updated by the main loop
        UiEvent::Resize { .. } => Ok(LoopAction::ContinueRedraw),
        UiEvent::Quit => Ok(LoopAction::Quit),
        UiEvent::None => Ok(LoopAction::Continue),
    }
}

/// Returns true when the view asked for a repaint.
fn drain_view_events(app: &mut App) -> bool {
    let mut redraw = false;
    for event in app.view.take_events() {
        match event {
            ViewEvent::RedrawNeeded => redraw = true,
            ViewEvent::CursorChanged(cursor) => app.cursor = cursor,
            ViewEvent::ModeChanged { adding } => {
                app.message = Some(if adding {
                    "add mode: drag to draw a field".to_owned()
                } else {
                    "browse mode".to_owned()
                });
            }
            ViewEvent::FieldCreated(id) => info!(field = id.0, "field created"),
            ViewEvent::FieldDeleted(id) => info!(field = id.0, "field deleted"),
            ViewEvent::LinkActivated(LinkAction::Uri { uri }) => {
                app.message = Some(match copy_link(&uri) {
                    Ok(url) => format!("copied {url}"),
                    Err(err) => {
                        warn!(?err, %uri, "failed to copy link");
                        format!("link not copied: {err}")
                    }
                });
            }
            ViewEvent::LinkActivated(LinkAction::GoTo { .. })
            | ViewEvent::PageChanged(_)
            | ViewEvent::DocumentLoaded(_) => {}
        }
    }
    redraw
}

fn redraw(
    renderer: &mut KittyRenderer<io::Stdout>,
    frame: &mut FrameBuffer,
    app: &mut App,
    screen: &Screen,
) -> Result<()> {
    let size = screen.view_size();
    frame.resize(size);
    let report = app
        .view
        .paint(frame, Rect::new(0, 0, size.width, size.height))?;
    if report.skipped {
        return Ok(());
    }

    let params = DrawParams::clamped(u32::from(screen.columns), u32::from(screen.page_rows()));
    renderer.synchronized(|renderer| {
        let presented = renderer.present(frame, params)?;
        debug!(?presented, painted = ?report.painted, "frame presented");
        draw_status_line(renderer, app, screen)
    })
}

fn draw_status_line(
    renderer: &mut KittyRenderer<io::Stdout>,
    app: &App,
    screen: &Screen,
) -> Result<()> {
    let status = combine_status(
        document_status(app),
        app.mapper
            .pending_input()
            .as_deref()
            .or(app.message.as_deref()),
    );
    let mut writer = renderer.writer();
    crossterm::execute!(
        &mut writer,
        cursor::MoveTo(0, screen.status_row()),
        Clear(ClearType::CurrentLine)
    )?;
    let width = usize::from(screen.columns);
    let clipped: String = status.chars().take(width).collect();
    write_status_line(&mut writer, &clipped)?;
    Ok(())
}

fn document_status(app: &App) -> String {
    let view = &app.view;
    let name = view
        .document_info()
        .and_then(|info| info.path.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or("<unknown>");
    let viewport = view.viewport();
    format_status(
        name,
        view.current_page(),
        viewport.page_count(),
        view.effective_zoom(),
        viewport.zoom_mode(),
        viewport.rotation().degrees(),
        view.is_adding(),
        app.cursor,
    )
}

#[allow(clippy::too_many_arguments)]
fn format_status(
    name: &str,
    page: usize,
    page_count: usize,
    scale: f64,
    mode: ZoomMode,
    rotation: u16,
    adding: bool,
    cursor: CursorGlyph,
) -> String {
    let zoom = if scale.is_finite() {
        format!("{:.0}%", scale * 100.0)
    } else {
        "-".to_owned()
    };
    let mut status = format!(
        "{name} | page {}/{} | {zoom} {mode} | {rotation}°",
        page + 1,
        page_count
    );
    if adding {
        status.push_str(" | ADD");
    }
    if cursor != CursorGlyph::Arrow {
        status.push_str(&format!(" | {:?}", cursor));
    }
    status
}

fn combine_status(base: String, extra: Option<&str>) -> String {
    match extra.filter(|s| !s.is_empty()) {
        Some(extra) => format!("{base} | {extra}"),
        None => base,
    }
}

fn save_manifest(app: &App) -> Result<String> {
    let manifest = app
        .view
        .manifest()
        .ok_or_else(|| anyhow!("no document is loaded"))?;
    manifest.write_to(&app.manifest_path)?;
    info!(
        placements = manifest.placements.len(),
        path = %app.manifest_path.display(),
        "wrote stamp manifest"
    );
    Ok(format!(
        "saved {} placement(s) to {}",
        manifest.placements.len(),
        app.manifest_path.display()
    ))
}

fn default_manifest_path(document: &Path) -> PathBuf {
    let mut name = document
        .file_stem()
        .map(|stem| stem.to_os_string())
        .unwrap_or_default();
    name.push(".stamps.json");
    document.with_file_name(name)
}

/// Only web and mail links are handed to the clipboard.
fn validate_link(uri: &str) -> Result<Url> {
    let url = Url::parse(uri).with_context(|| format!("invalid link {uri:?}"))?;
    match url.scheme() {
        "http" | "https" | "mailto" => Ok(url),
        other => Err(anyhow!("refusing {other}: link")),
    }
}

fn copy_link(uri: &str) -> Result<Url> {
    let url = validate_link(uri)?;
    let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
    clipboard
        .set_text(url.as_str().to_owned())
        .context("failed to set clipboard text")?;
    Ok(url)
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pageview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // no console layer: the terminal is in raw mode and owned by the renderer
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_parse_zoom_mode_and_paths() {
        let args = Args::try_parse_from([
            "pageview",
            "doc.pdf",
            "--page",
            "3",
            "--stamp",
            "sig.png",
            "--zoom-mode",
            "fit-width",
        ])
        .unwrap();
        assert_eq!(args.file, PathBuf::from("doc.pdf"));
        assert_eq!(args.page, Some(3));
        assert_eq!(args.stamp, Some(PathBuf::from("sig.png")));
        assert_eq!(args.zoom_mode, Some(ZoomMode::FitWidth));

        assert!(Args::try_parse_from(["pageview", "doc.pdf", "--zoom-mode", "wide"]).is_err());
        assert!(Args::try_parse_from(["pageview"]).is_err());
    }

    #[test]
    fn manifest_defaults_next_to_document() {
        assert_eq!(
            default_manifest_path(Path::new("/tmp/contract.pdf")),
            PathBuf::from("/tmp/contract.stamps.json")
        );
    }

    #[test]
    fn screen_reserves_status_row() {
        let screen = Screen::new(80, 25, 800, 500);
        assert_eq!(screen.page_rows(), 24);
        assert_eq!(screen.view_size(), Size::new(800, 480));

        let tiny = Screen::new(10, 1, 0, 0);
        assert_eq!(tiny.page_rows(), 1);
    }

    #[test]
    fn status_mentions_page_zoom_and_mode() {
        let status = format_status(
            "a.pdf",
            1,
            9,
            1.25,
            ZoomMode::FitWidth,
            90,
            true,
            CursorGlyph::Move,
        );
        assert_eq!(status, "a.pdf | page 2/9 | 125% fit-width | 90° | ADD | Move");
        assert_eq!(combine_status(status.clone(), Some("")), status);
        assert!(combine_status("x".into(), Some("12")).ends_with("| 12"));
    }

    #[test]
    fn only_web_links_are_copied() {
        assert!(validate_link("https://example.org/a").is_ok());
        assert!(validate_link("mailto:someone@example.org").is_ok());
        assert!(validate_link("file:///etc/passwd").is_err());
        assert!(validate_link("not a url").is_err());
    }
}
