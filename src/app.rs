use std::path::PathBuf;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use image::DynamicImage;

use crate::compose::{compose_text, plain_text, toggle_field, FieldId, TextFormat};
use crate::data::{FilterParams, RequestSeq};
use crate::model::{LeagueInfo, MatchBatch, MatchRecord};
use crate::overlay::{Overlay, Position, Viewport};

const NUDGE_PX: i32 = 10;

/// Results of background work, delivered to the UI loop.
#[derive(Debug)]
pub enum AppMessage {
    Matches {
        seq: u64,
        result: anyhow::Result<MatchBatch>,
    },
    Background {
        path: PathBuf,
        image: Option<Arc<DynamicImage>>,
    },
    Exported(anyhow::Result<Option<PathBuf>>),
}

/// Work the UI loop has to start on behalf of the app.
#[derive(Debug, Clone)]
pub enum Effect {
    Fetch {
        seq: u64,
        filters: FilterParams,
    },
    LoadImage(PathBuf),
    Export {
        image: Arc<DynamicImage>,
        text: String,
        origin: Position,
        out_dir: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Editing,
    OpenImage(String),
}

#[derive(Debug, Clone)]
pub struct Background {
    pub path: PathBuf,
    pub image: Arc<DynamicImage>,
}

/// A block of terminal cells; may extend past the screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl CellRect {
    pub fn contains(&self, col: u16, row: u16) -> bool {
        let (col, row) = (col as i32, row as i32);
        col >= self.x && col < self.x + self.width && row >= self.y && row < self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn intersect(&self, other: CellRect) -> CellRect {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        CellRect {
            x: left,
            y: top,
            width: (right - left).max(0),
            height: (bottom - top).max(0),
        }
    }
}

/// Where the overlay was drawn last frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayCells {
    /// The whole box, unclipped.
    pub bounds: CellRect,
    /// The handle strip as drawn: the top border, or the first visible row
    /// of the box when the border is cut off. Empty when nothing is visible.
    pub handle: CellRect,
}

impl OverlayCells {
    pub fn is_handle(&self, col: u16, row: u16) -> bool {
        self.handle.contains(col, row)
    }
}

#[derive(Debug)]
pub struct App {
    pub should_quit: bool,
    pub filters: FilterParams,
    pub fields: Vec<FieldId>,
    pub format: TextFormat,
    pub matches: Vec<MatchRecord>,
    pub league: Option<LeagueInfo>,
    pub text: String,
    /// Set once the user typed into the text; cleared by the next recompose.
    pub text_edited: bool,
    pub overlay: Overlay,
    pub background: Option<Background>,
    pub mode: Mode,
    pub status: String,
    pub seq: RequestSeq,
    pub viewport: Option<Viewport>,
    pub overlay_cells: Option<OverlayCells>,
    pub out_dir: PathBuf,
}

impl App {
    pub fn new(filters: FilterParams, fields: Vec<FieldId>, format: TextFormat, out_dir: PathBuf) -> Self {
        Self {
            should_quit: false,
            filters,
            fields,
            format,
            matches: Vec::new(),
            league: None,
            text: String::new(),
            text_edited: false,
            overlay: Overlay::default(),
            background: None,
            mode: Mode::Normal,
            status: "Loading matches...".to_string(),
            seq: RequestSeq::default(),
            viewport: None,
            overlay_cells: None,
            out_dir,
        }
    }

    pub fn refresh(&mut self) -> Effect {
        Effect::Fetch {
            seq: self.seq.issue(),
            filters: self.filters,
        }
    }

    fn recompose(&mut self) {
        self.text = compose_text(&self.matches, self.league.as_ref(), &self.fields, self.format);
        self.text_edited = false;
    }

    pub fn apply(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::Matches { seq, result } => {
                if !self.seq.is_latest(seq) {
                    tracing::debug!(seq, "dropping stale match response");
                    return;
                }
                match result {
                    Ok(batch) => {
                        tracing::info!(seq, count = batch.matches.len(), "matches loaded");
                        self.status = format!("{} matches loaded", batch.matches.len());
                        self.matches = batch.matches;
                        self.league = batch.league;
                        self.recompose();
                    }
                    Err(err) => {
                        tracing::warn!(seq, error = %format!("{err:#}"), "keeping previous matches");
                        self.status = format!("Loading failed: {err}");
                    }
                }
            }
            AppMessage::Background { path, image } => match image {
                Some(image) => {
                    tracing::info!(path = %path.display(), "background loaded");
                    self.status = format!("Background: {}", path.display());
                    self.background = Some(Background { path, image });
                }
                None => tracing::warn!(path = %path.display(), "background could not be read"),
            },
            AppMessage::Exported(result) => match result {
                Ok(Some(path)) => self.status = format!("Saved {}", path.display()),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "export failed");
                    self.status = format!("Export failed: {err}");
                }
            },
        }
    }

    /// Text as it appears on the poster. Markup is only stripped when the
    /// text can contain any: html output or hand-edited text.
    pub fn display_text(&self) -> String {
        if self.format == TextFormat::Html || self.text_edited {
            plain_text(&self.text)
        } else {
            self.text.clone()
        }
    }

    pub fn export(&self) -> Option<Effect> {
        let background = self.background.as_ref()?;
        Some(Effect::Export {
            image: background.image.clone(),
            text: self.display_text(),
            origin: self.overlay.position,
            out_dir: self.out_dir.clone(),
        })
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Option<Effect> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return None;
        }

        match &mut self.mode {
            Mode::Editing => {
                match key.code {
                    KeyCode::Esc => self.mode = Mode::Normal,
                    KeyCode::Enter => self.edit(|t| t.push('\n')),
                    KeyCode::Backspace => self.edit(|t| {
                        t.pop();
                    }),
                    KeyCode::Char(c) => self.edit(|t| t.push(c)),
                    _ => {}
                }
                None
            }
            Mode::OpenImage(input) => match key.code {
                KeyCode::Esc => {
                    self.mode = Mode::Normal;
                    None
                }
                KeyCode::Enter => {
                    let path = PathBuf::from(input.trim());
                    self.mode = Mode::Normal;
                    Some(Effect::LoadImage(path))
                }
                KeyCode::Backspace => {
                    input.pop();
                    None
                }
                KeyCode::Char(c) => {
                    input.push(c);
                    None
                }
                _ => None,
            },
            Mode::Normal => self.on_normal_key(key.code),
        }
    }

    fn edit(&mut self, f: impl FnOnce(&mut String)) {
        f(&mut self.text);
        self.text_edited = true;
    }

    fn on_normal_key(&mut self, code: KeyCode) -> Option<Effect> {
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('r') => return Some(self.refresh()),
            KeyCode::Char('h') => {
                self.filters = self.filters.toggled_home();
                return Some(self.refresh());
            }
            KeyCode::Char('+') | KeyCode::Char('=') => return self.shift_range(1),
            KeyCode::Char('-') => return self.shift_range(-1),
            KeyCode::Char('t') => {
                self.format = match self.format {
                    TextFormat::Plain => TextFormat::Html,
                    TextFormat::Html => TextFormat::Plain,
                };
                self.recompose();
            }
            KeyCode::Char(c @ '0'..='9') => {
                // 1..9 select the first nine fields, 0 the tenth
                let idx = (c as usize + 10 - '1' as usize) % 10;
                toggle_field(&mut self.fields, FieldId::ALL[idx]);
                self.recompose();
            }
            KeyCode::Char('e') => self.mode = Mode::Editing,
            KeyCode::Char('o') => self.mode = Mode::OpenImage(String::new()),
            KeyCode::Char('s') => return self.export(),
            KeyCode::Left => self.overlay.nudge(-NUDGE_PX, 0),
            KeyCode::Right => self.overlay.nudge(NUDGE_PX, 0),
            KeyCode::Up => self.overlay.nudge(0, -NUDGE_PX),
            KeyCode::Down => self.overlay.nudge(0, NUDGE_PX),
            _ => {}
        }
        None
    }

    fn shift_range(&mut self, delta: i64) -> Option<Effect> {
        let shifted = self.filters.shifted_range(delta);
        if shifted == self.filters {
            return None;
        }
        self.filters = shifted;
        Some(self.refresh())
    }

    pub fn on_mouse(&mut self, event: MouseEvent) {
        let Some(viewport) = self.viewport else {
            return;
        };
        let pointer = viewport.to_image(event.column, event.row);
        match event.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let on_handle = self
                    .overlay_cells
                    .is_some_and(|r| r.is_handle(event.column, event.row));
                self.overlay.pointer_down(pointer, on_handle);
            }
            MouseEventKind::Drag(MouseButton::Left) | MouseEventKind::Moved => {
                self.overlay.pointer_move(pointer)
            }
            MouseEventKind::Up(_) => self.overlay.pointer_up(),
            _ => {}
        }
    }
}
