use image::GenericImageView;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Points},
        Block, Borders, List, ListItem, Paragraph, Widget, Wrap,
    },
    Frame,
};

use crate::app::{App, CellRect, Mode, OverlayCells};
use crate::compose::{FieldId, MatchContext, TextFormat};
use crate::overlay::Viewport;

const HANDLE_TITLE: &str = " ⠿ drag ";

pub fn ui(f: &mut Frame, app: &mut App) {
    let size = f.area();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)].as_ref())
        .split(size);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(25), Constraint::Percentage(75)].as_ref())
        .split(rows[0]);

    draw_sidebar(f, app, chunks[0]);
    draw_preview(f, app, chunks[1]);
    draw_status_bar(f, app, rows[1]);
}

fn draw_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let field_rows = FieldId::ALL.len() as u16 + 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(6),
                Constraint::Length(field_rows),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(area);

    let league = app
        .league
        .as_ref()
        .and_then(|l| l.label())
        .unwrap_or_else(|| "-".to_string());
    let format = match app.format {
        TextFormat::Plain => "plain",
        TextFormat::Html => "html",
    };
    let filters = vec![
        Line::from(format!("Home only: {}  [h]", if app.filters.just_home { "yes" } else { "no" })),
        Line::from(format!("Range: {} days  [+/-]", app.filters.range_days)),
        Line::from(format!("Format: {format}  [t]")),
        Line::from(Span::styled(league, Style::default().add_modifier(Modifier::ITALIC))),
    ];
    let filters_p = Paragraph::new(filters)
        .block(Block::default().title(" FILTERS ").borders(Borders::ALL));
    f.render_widget(filters_p, chunks[0]);

    let fields: Vec<ListItem> = FieldId::ALL
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let key = (i + 1) % 10;
            match app.fields.iter().position(|f| f == field) {
                Some(order) => ListItem::new(format!("{key} [{}] {field}", order + 1))
                    .style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                None => ListItem::new(format!("{key} [ ] {field}")),
            }
        })
        .collect();
    let fields_list = List::new(fields).block(Block::default().title(" FIELDS ").borders(Borders::ALL));
    f.render_widget(fields_list, chunks[1]);

    let matches: Vec<ListItem> = app
        .matches
        .iter()
        .map(|record| {
            let ctx = MatchContext::new(record, app.league.as_ref());
            let result = ctx.resolve(FieldId::Result);
            let status = if result.is_empty() { ctx.resolve(FieldId::Time) } else { result };
            ListItem::new(format!(
                "{} {} - {}  [{}]",
                ctx.date,
                ctx.resolve(FieldId::HomeShort),
                ctx.resolve(FieldId::GuestShort),
                status
            ))
        })
        .collect();
    let matches_list = List::new(matches)
        .block(Block::default().title(" MATCHES ").borders(Borders::ALL));
    f.render_widget(matches_list, chunks[2]);
}

fn draw_preview(f: &mut Frame, app: &mut App, area: Rect) {
    let title = match &app.background {
        Some(bg) => format!(" {} ", bg.path.display()),
        None => " POSTER ".to_string(),
    };
    let block = Block::default().title(title).borders(Borders::ALL);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(bg) = &app.background else {
        app.viewport = None;
        app.overlay_cells = None;
        let p = Paragraph::new("Press o to open a background image")
            .alignment(Alignment::Center);
        f.render_widget(p, inner);
        return;
    };
    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let img = &bg.image;
    let (w, h) = img.dimensions();
    let viewport = Viewport {
        left: inner.x,
        top: inner.y,
        cols: inner.width,
        rows: inner.height,
        image_width: w,
        image_height: h,
    };
    app.viewport = Some(viewport);

    // two half-block samples per cell vertically
    let cols = inner.width as u32;
    let rows = inner.height as u32 * 2;
    let canvas = Canvas::default()
        .marker(Marker::HalfBlock)
        .x_bounds([0.0, w as f64])
        .y_bounds([0.0, h as f64])
        .paint(|ctx| {
            for y in 0..rows {
                for x in 0..cols {
                    let img_x = ((x as f64 + 0.5) / cols as f64 * w as f64) as u32;
                    let img_y = ((y as f64 + 0.5) / rows as f64 * h as f64) as u32;
                    if img_x < w && img_y < h {
                        let p = img.get_pixel(img_x, img_y);
                        if p[3] > 128 {
                            ctx.draw(&Points {
                                coords: &[(img_x as f64, (h - img_y) as f64)],
                                color: Color::Rgb(p[0], p[1], p[2]),
                            });
                        }
                    }
                }
            }
        });
    f.render_widget(canvas, inner);

    draw_overlay(f, app, viewport, inner);
}

fn draw_overlay(f: &mut Frame, app: &mut App, viewport: Viewport, clip: Rect) {
    let text = app.display_text();
    let lines: Vec<&str> = text.lines().collect();
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0).clamp(10, 1000) as i32 + 2;
    let height = lines.len().clamp(1, 1000) as i32 + 2;
    let (x, y) = viewport.to_cell(app.overlay.position);
    let bounds = CellRect { x, y, width, height };

    // the box may sit partly or fully outside the preview
    let visible = bounds.intersect(CellRect {
        x: clip.x as i32,
        y: clip.y as i32,
        width: clip.width as i32,
        height: clip.height as i32,
    });
    let handle = if visible.is_empty() {
        CellRect::default()
    } else {
        CellRect {
            height: 1,
            ..visible
        }
    };
    app.overlay_cells = Some(OverlayCells { bounds, handle });
    if visible.is_empty() {
        return;
    }

    let border = if app.overlay.is_dragging() {
        Color::Cyan
    } else if app.mode == Mode::Editing {
        Color::Yellow
    } else {
        Color::Gray
    };
    let block = Block::default()
        .title(HANDLE_TITLE)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border));
    let p = Paragraph::new(lines.iter().map(|l| Line::from(*l)).collect::<Vec<_>>())
        .style(Style::default().fg(Color::White).bg(Color::Black))
        .block(block);

    // Render the whole box off-screen and copy the visible part, so text rows
    // stay where the export will put them.
    let mut scratch = Buffer::empty(Rect::new(0, 0, width as u16, height as u16));
    p.render(scratch.area, &mut scratch);
    let buf = f.buffer_mut();
    for row in visible.y..visible.y + visible.height {
        for col in visible.x..visible.x + visible.width {
            let src = scratch.cell(((col - x) as u16, (row - y) as u16));
            if let (Some(src), Some(dst)) = (src, buf.cell_mut((col as u16, row as u16))) {
                *dst = src.clone();
            }
        }
    }

    if handle.y > y {
        // top border is cut off, keep a handle on the first visible row
        let strip = Rect::new(handle.x as u16, handle.y as u16, handle.width as u16, 1);
        let bar = Paragraph::new(HANDLE_TITLE).style(Style::default().fg(Color::Black).bg(border));
        f.render_widget(bar, strip);
    }
}

fn draw_status_bar(f: &mut Frame, app: &App, area: Rect) {
    let line = match &app.mode {
        Mode::Editing => Line::from(vec![
            Span::styled(" EDIT ", Style::default().bg(Color::Yellow).fg(Color::Black).add_modifier(Modifier::BOLD)),
            Span::raw("  type to change the text, Esc to finish"),
        ]),
        Mode::OpenImage(input) => Line::from(vec![
            Span::styled(" OPEN ", Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD)),
            Span::raw(format!("  {input}_")),
        ]),
        Mode::Normal => {
            let mut spans = vec![Span::raw(format!(" {} ", app.status))];
            if app.text_edited {
                spans.push(Span::styled(" [edited] ", Style::default().fg(Color::Yellow)));
            }
            spans.push(Span::styled(
                "  r refresh  e edit  o open  s save  arrows/drag move  q quit",
                Style::default().fg(Color::DarkGray),
            ));
            Line::from(spans)
        }
    };
    let status_bar = Paragraph::new(line)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::TOP | Borders::BOTTOM));
    f.render_widget(status_bar, area);
}
