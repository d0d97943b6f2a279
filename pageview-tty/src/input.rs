use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use pageview_core::{Point, PointerButton, Size, ViewCommand, ZoomMode};

/// Pixel size of one terminal cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellMetrics {
    pub width: i32,
    pub height: i32,
}

impl Default for CellMetrics {
    fn default() -> Self {
        Self {
            width: 8,
            height: 16,
        }
    }
}

impl CellMetrics {
    /// Derives the cell size from the terminal's reported pixel size,
    /// falling back to the default when the terminal does not report one.
    pub fn from_window(columns: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        if columns == 0 || rows == 0 || pixel_width == 0 || pixel_height == 0 {
            return Self::default();
        }
        Self {
            width: (pixel_width / columns).max(1) as i32,
            height: (pixel_height / rows).max(1) as i32,
        }
    }

    /// Pixel size of a `columns`×`rows` block of cells.
    pub fn area(&self, columns: u16, rows: u16) -> Size {
        Size::new(columns as i32 * self.width, rows as i32 * self.height)
    }

    /// Centre of the cell at (`column`, `row`).
    pub fn cell_center(&self, column: u16, row: u16) -> Point {
        Point::new(
            column as i32 * self.width + self.width / 2,
            row as i32 * self.height + self.height / 2,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerInput {
    Down(PointerButton, Point),
    Move(Point),
    Up(PointerButton, Point),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(ViewCommand),
    Pointer(PointerInput),
    /// The user asked to delete the hovered field; a confirmation follows.
    RequestDelete,
    ConfirmDelete { accepted: bool },
    SaveManifest,
    Resize { columns: u16, rows: u16 },
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    Confirm,
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    cells: CellMetrics,
}

impl EventMapper {
    const SCROLL_LINES: i32 = 3;
    const ZOOM_STEP: f64 = 1.1;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cells(cells: CellMetrics) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    pub fn set_cells(&mut self, cells: CellMetrics) {
        self.cells = cells;
    }

    pub fn cells(&self) -> CellMetrics {
        self.cells
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Resize(columns, rows) => UiEvent::Resize { columns, rows },
            Event::Mouse(mouse) => self.map_mouse(mouse),
            Event::Key(key) => match self.mode {
                InputMode::Normal => self.map_key_normal(key),
                InputMode::Confirm => self.map_key_confirm(key),
            },
            _ => UiEvent::None,
        }
    }

    fn map_key_normal(&mut self, KeyEvent { code, modifiers, .. }: KeyEvent) -> UiEvent {
        let line = self.cells.height * Self::SCROLL_LINES;
        let column = self.cells.width * Self::SCROLL_LINES;
        match (code, modifiers) {
            (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                if let Some(digit) = c.to_digit(10) {
                    self.push_digit(digit as usize);
                }
                UiEvent::None
            }
            (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => self.scroll(0, line),
            (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => self.scroll(0, -line),
            (KeyCode::Left, _) => self.scroll(-column, 0),
            (KeyCode::Right, _) => self.scroll(column, 0),
            (KeyCode::Char('J'), _) | (KeyCode::PageDown, _) | (KeyCode::Char(' '), _) => {
                let count = self.take_count();
                UiEvent::Command(ViewCommand::NextPage { count })
            }
            (KeyCode::Char('K'), _) | (KeyCode::PageUp, _) => {
                let count = self.take_count();
                UiEvent::Command(ViewCommand::PrevPage { count })
            }
            (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                let page = self.take_count().saturating_sub(1);
                UiEvent::Command(ViewCommand::GotoPage { page })
            }
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                if self.pending_count.is_some() {
                    let page = self.take_count().saturating_sub(1);
                    UiEvent::Command(ViewCommand::GotoPage { page })
                } else {
                    UiEvent::Command(ViewCommand::LastPage)
                }
            }
            (KeyCode::Char('+'), _) => self.command(ViewCommand::ZoomBy {
                factor: Self::ZOOM_STEP,
            }),
            (KeyCode::Char('-'), _) => self.command(ViewCommand::ZoomBy {
                factor: 1.0 / Self::ZOOM_STEP,
            }),
            (KeyCode::Char('='), _) => self.command(ViewCommand::SetZoom { zoom: 1.0 }),
            (KeyCode::Char('w'), _) => self.command(ViewCommand::SetZoomMode {
                mode: ZoomMode::FitWidth,
            }),
            (KeyCode::Char('h'), _) => self.command(ViewCommand::SetZoomMode {
                mode: ZoomMode::FitHeight,
            }),
            (KeyCode::Char('b'), _) => self.command(ViewCommand::SetZoomMode {
                mode: ZoomMode::FitBest,
            }),
            (KeyCode::Char('r'), _) => self.command(ViewCommand::RotateRight),
            (KeyCode::Char('R'), _) => self.command(ViewCommand::RotateLeft),
            (KeyCode::Char('a'), _) => self.command(ViewCommand::ToggleAddOverlay),
            (KeyCode::Delete, _) | (KeyCode::Char('x'), KeyModifiers::NONE) => {
                self.set_mode(InputMode::Confirm);
                UiEvent::RequestDelete
            }
            (KeyCode::Char('s'), KeyModifiers::NONE) => {
                self.reset_count();
                UiEvent::SaveManifest
            }
            (KeyCode::Char('q'), _) => {
                self.reset_count();
                UiEvent::Quit
            }
            _ => {
                self.reset_count();
                UiEvent::None
            }
        }
    }

    fn map_key_confirm(&mut self, KeyEvent { code, .. }: KeyEvent) -> UiEvent {
        let accepted = matches!(code, KeyCode::Char('y') | KeyCode::Char('Y'));
        self.set_mode(InputMode::Normal);
        UiEvent::ConfirmDelete { accepted }
    }

    fn map_mouse(&mut self, mouse: MouseEvent) -> UiEvent {
        let point = self.cells.cell_center(mouse.column, mouse.row);
        let line = self.cells.height * Self::SCROLL_LINES;
        match mouse.kind {
            MouseEventKind::Down(button) => UiEvent::Pointer(PointerInput::Down(to_button(button), point)),
            MouseEventKind::Up(button) => UiEvent::Pointer(PointerInput::Up(to_button(button), point)),
            MouseEventKind::Drag(_) | MouseEventKind::Moved => {
                UiEvent::Pointer(PointerInput::Move(point))
            }
            MouseEventKind::ScrollDown => UiEvent::Command(ViewCommand::ScrollBy { dx: 0, dy: line }),
            MouseEventKind::ScrollUp => UiEvent::Command(ViewCommand::ScrollBy { dx: 0, dy: -line }),
            _ => UiEvent::None,
        }
    }

    fn command(&mut self, command: ViewCommand) -> UiEvent {
        self.reset_count();
        UiEvent::Command(command)
    }

    fn scroll(&mut self, dx: i32, dy: i32) -> UiEvent {
        let multiplier = i32::try_from(self.take_count()).unwrap_or(i32::MAX);
        UiEvent::Command(ViewCommand::ScrollBy {
            dx: dx.saturating_mul(multiplier),
            dy: dy.saturating_mul(multiplier),
        })
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        self.pending_count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    /// Text for the status line: the typed count, or the delete prompt.
    pub fn pending_input(&self) -> Option<String> {
        match self.mode {
            InputMode::Confirm => Some("delete field? (y/n)".to_owned()),
            InputMode::Normal if !self.pending_digits.is_empty() => {
                Some(self.pending_digits.clone())
            }
            InputMode::Normal => None,
        }
    }
}

fn to_button(button: MouseButton) -> PointerButton {
    match button {
        MouseButton::Left => PointerButton::Left,
        MouseButton::Right => PointerButton::Right,
        MouseButton::Middle => PointerButton::Middle,
    }
}
