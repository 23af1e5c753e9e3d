//! TUI rendering

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use crate::state::Gesture;
use crate::tui::app::App;

/// Render the whole screen
pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // Gesture
            Constraint::Min(10),   // Channel bars
            Constraint::Length(1), // Help
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    render_gesture(frame, app, chunks[0]);
    render_channels(frame, app, chunks[1]);
    frame.render_widget(
        Paragraph::new(app.help.as_str())
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray)),
        chunks[2],
    );
    render_status_bar(frame, app, chunks[3]);
}

fn gesture_color(gesture: &Gesture) -> Color {
    match gesture {
        Gesture::Waiting { .. } => Color::White,
        Gesture::Armed => Color::Yellow,
        Gesture::Channel {
            authorized: Some(false),
            ..
        } => Color::Red,
        Gesture::Channel { .. } => Color::Green,
    }
}

fn render_gesture(frame: &mut Frame, app: &App, area: Rect) {
    let gesture = &app.snapshot.gesture;
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Key PPM Controller ");

    let text = vec![
        Line::from(Span::styled(
            gesture.title(),
            Style::default()
                .fg(gesture_color(gesture))
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            gesture.subtitle(),
            Style::default().fg(Color::Gray),
        )),
    ];

    frame.render_widget(
        Paragraph::new(text)
            .block(block)
            .alignment(Alignment::Center),
        area,
    );
}

fn render_channels(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default().borders(Borders::ALL).title(" Channels ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let constraints: Vec<Constraint> = app.rows.iter().map(|_| Constraint::Length(1)).collect();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);

    for (i, row) in app.rows.iter().enumerate() {
        let Some(&area) = rows.get(i) else {
            break;
        };
        let value = app.snapshot.channels[i];
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Length(24), // Label
                Constraint::Min(20),    // Bar
                Constraint::Length(8),  // Value
            ])
            .split(area);

        let active = value != app.neutral_us;
        let label_style = if active {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        let label = format!("CH{} {} ({})", i + 1, row.name, row.kind);
        frame.render_widget(Paragraph::new(label).style(label_style), cols[0]);

        let color = if value > app.neutral_us {
            Color::Green
        } else {
            Color::Red
        };
        render_pulse_bar(frame, app.channel_ratio(i), app.neutral_ratio(), cols[1], color);

        frame.render_widget(
            Paragraph::new(format!("{value:>6}")).style(label_style),
            cols[2],
        );
    }
}

/// Bar filled from the neutral mark toward the current value
fn render_pulse_bar(frame: &mut Frame, ratio: f64, center_ratio: f64, area: Rect, color: Color) {
    let width = area.width as usize;
    if width < 3 {
        return;
    }

    let last = (width - 1) as f64;
    let center = (center_ratio.clamp(0.0, 1.0) * last).round() as usize;
    let pos = (ratio.clamp(0.0, 1.0) * last).round() as usize;
    let (lo, hi) = if pos >= center {
        (center + 1, pos)
    } else {
        (pos, center.saturating_sub(1))
    };

    let spans: Vec<Span> = (0..width)
        .map(|i| {
            if i == center {
                Span::styled("|", Style::default().fg(Color::White))
            } else if pos != center && (lo..=hi).contains(&i) {
                Span::styled("=", Style::default().fg(color))
            } else {
                Span::styled("-", Style::default().fg(Color::DarkGray))
            }
        })
        .collect();

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let link = if app.link.connected {
        Span::styled(
            app.link.description.clone(),
            Style::default().fg(Color::Green),
        )
    } else {
        Span::styled(
            app.link.description.clone(),
            Style::default().fg(Color::DarkGray),
        )
    };
    let armed = if app.snapshot.armed {
        Span::styled("ARMED", Style::default().fg(Color::Yellow))
    } else {
        Span::styled("safe", Style::default().fg(Color::DarkGray))
    };

    let mut spans = vec![
        Span::raw("["),
        link,
        Span::raw("] ["),
        armed,
        Span::raw(format!("] sent {} failed {}", app.sent_count, app.failed_count)),
    ];
    if let Some(msg) = &app.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(msg.clone(), Style::default().fg(Color::Yellow)));
    }

    let block = Block::default().borders(Borders::ALL);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(Line::from(spans)), inner);
}
