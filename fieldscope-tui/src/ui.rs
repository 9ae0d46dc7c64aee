//! UI rendering for the dashboard.

use chrono::{DateTime, Local};
use fieldscope_core::types::AlertSeverity;
use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, BorderType, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph,
    },
    Frame,
};

use crate::app::{App, ConnectionStatus, NoticeLevel};

// ========== Dashboard Color Palette ==========

/// Live channel indicator and info notices
const STATUS_LIVE: Color = Color::Rgb(50, 205, 50);
/// Reconnecting indicator and warning alerts
const STATUS_RETRY: Color = Color::Rgb(220, 180, 0);
/// Lost channel indicator, critical alerts and error notices
const STATUS_LOST: Color = Color::Rgb(220, 80, 80);
/// Border color for the telemetry block
const BORDER_TELEMETRY: Color = Color::Rgb(0, 150, 150);
/// Border color for the weather block
const BORDER_WEATHER: Color = Color::Rgb(80, 160, 80);
/// Border color for the alerts block
const BORDER_ALERTS: Color = Color::Rgb(180, 100, 180);
/// Label color for metadata attributes
const LABEL_COLOR: Color = Color::Rgb(100, 180, 180);
/// Dim gray for secondary text
const TEXT_DIM: Color = Color::Rgb(128, 128, 128);

/// Render the dashboard.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Layout: header, body, footer
    let chunks = Layout::vertical([
        Constraint::Length(2), // Header
        Constraint::Min(10),   // Body
        Constraint::Length(1), // Footer
    ])
    .split(area);

    render_header(frame, app, chunks[0]);
    render_body(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);
}

/// Render the header: field, account, channel state, buffer depth.
fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let status_color = match app.connection {
        ConnectionStatus::Live => STATUS_LIVE,
        ConnectionStatus::Connecting => TEXT_DIM,
        ConnectionStatus::Reconnecting { .. } => STATUS_RETRY,
        ConnectionStatus::Lost => STATUS_LOST,
    };

    let mut spans = vec![
        Span::styled(" fieldscope ", Style::default().fg(Color::Cyan).bold()),
        Span::raw("│ "),
        Span::styled(app.field.name.clone(), Style::default().bold()),
        Span::styled(
            format!(" · {} ", app.field.city),
            Style::default().fg(TEXT_DIM),
        ),
    ];

    if let Some(name) = app.user_name() {
        spans.push(Span::raw("│ "));
        spans.push(Span::styled(format!("{} ", name), Style::default().fg(TEXT_DIM)));
    }

    spans.push(Span::raw("│ "));
    spans.push(Span::styled(
        format!("● {}", app.connection.label()),
        Style::default().fg(status_color).bold(),
    ));
    spans.push(Span::styled(
        format!(" │ {} readings buffered", app.reading_count()),
        Style::default().fg(TEXT_DIM),
    ));
    if app.loading {
        spans.push(Span::styled(
            " │ loading...",
            Style::default().fg(STATUS_RETRY),
        ));
    }

    let header =
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, area);
}

fn render_body(frame: &mut Frame, app: &App, area: Rect) {
    // Layout: chart on the left, weather and alerts stacked on the right
    let columns = Layout::horizontal([
        Constraint::Percentage(64), // Telemetry chart
        Constraint::Percentage(36), // Weather + alerts
    ])
    .split(area);

    let left = Layout::vertical([
        Constraint::Min(8),    // Chart
        Constraint::Length(1), // Series legend
    ])
    .split(columns[0]);

    render_chart(frame, app, left[0]);
    render_legend(frame, app, left[1]);

    let right = Layout::vertical([
        Constraint::Length(9), // Weather
        Constraint::Min(5),    // Alerts
    ])
    .split(columns[1]);

    render_weather(frame, app, right[0]);
    render_alerts(frame, app, right[1]);
}

/// Render the selected series as a line chart.
fn render_chart(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_TELEMETRY));

    let Some(series) = app.series.get(app.selected_series) else {
        let placeholder = Paragraph::new("Waiting for readings...")
            .style(Style::default().fg(TEXT_DIM))
            .alignment(Alignment::Center)
            .block(block.title(" Telemetry "));
        frame.render_widget(placeholder, area);
        return;
    };

    let data: Vec<(f64, f64)> = series
        .points
        .iter()
        .map(|point| (point.timestamp as f64, point.value))
        .collect();

    let (x_min, x_max) = x_bounds(&data);
    let (y_min, y_max) = y_bounds(&data);
    let color = Color::Rgb(series.color.r, series.color.g, series.color.b);

    let unit = if series.unit.is_empty() {
        String::new()
    } else {
        format!(" [{}]", series.unit)
    };
    let title = format!(
        " {}{} ({}/{}) ",
        series.key,
        unit,
        app.selected_series + 1,
        app.series.len()
    );

    let datasets = vec![Dataset::default()
        .name(series.key.clone())
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(color))
        .data(&data)];

    let x_labels = vec![
        Span::styled(format_instant(x_min), Style::default().fg(TEXT_DIM)),
        Span::styled(
            format_instant((x_min + x_max) / 2.0),
            Style::default().fg(TEXT_DIM),
        ),
        Span::styled(format_instant(x_max), Style::default().fg(TEXT_DIM)),
    ];
    let y_labels = vec![
        Span::styled(format!("{:.1}", y_min), Style::default().fg(TEXT_DIM)),
        Span::styled(
            format!("{:.1}", (y_min + y_max) / 2.0),
            Style::default().fg(TEXT_DIM),
        ),
        Span::styled(format!("{:.1}", y_max), Style::default().fg(TEXT_DIM)),
    ];

    let chart = Chart::new(datasets)
        .block(block.title(title))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(TEXT_DIM))
                .bounds([x_min, x_max])
                .labels(x_labels),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(TEXT_DIM))
                .bounds([y_min, y_max])
                .labels(y_labels),
        );

    frame.render_widget(chart, area);
}

/// One line listing every series; the charted one is highlighted.
fn render_legend(frame: &mut Frame, app: &App, area: Rect) {
    if app.series.is_empty() {
        return;
    }

    let mut spans = vec![Span::raw(" ")];
    for (index, series) in app.series.iter().enumerate() {
        let color = Color::Rgb(series.color.r, series.color.g, series.color.b);
        spans.push(Span::styled("■ ", Style::default().fg(color)));
        let style = if index == app.selected_series {
            Style::default().bold()
        } else {
            Style::default().fg(TEXT_DIM)
        };
        spans.push(Span::styled(series.key.clone(), style));
        spans.push(Span::raw("  "));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render current conditions and the short forecast.
fn render_weather(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_WEATHER))
        .title(" Weather ")
        .title_style(Style::default().fg(BORDER_WEATHER).bold());

    let Some(weather) = &app.weather else {
        let placeholder = Paragraph::new("No weather data")
            .style(Style::default().fg(TEXT_DIM))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    };

    let current = &weather.current_weather;
    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("{:.0}°", current.temperature),
                Style::default().bold(),
            ),
            Span::raw(" "),
            Span::styled(current.description.clone(), Style::default().fg(TEXT_DIM)),
        ]),
        Line::from(vec![
            Span::styled("City:  ", Style::default().fg(LABEL_COLOR)),
            Span::raw(current.city.clone()),
        ]),
        Line::from(vec![
            Span::styled("Range: ", Style::default().fg(LABEL_COLOR)),
            Span::raw(format!(
                "{}° / {}°",
                current.min_temperature, current.max_temperature
            )),
        ]),
    ];

    if !weather.forecast.is_empty() {
        lines.push(Line::from(""));
        for day in weather.forecast.iter().take(3) {
            lines.push(Line::from(vec![
                Span::styled(format!("{:<8}", day.date), Style::default().fg(TEXT_DIM)),
                Span::raw(format!(
                    "{}° / {}°",
                    day.min_temperature, day.max_temperature
                )),
            ]));
        }
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Render the alert list, newest first.
fn render_alerts(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(BORDER_ALERTS))
        .title(format!(" Alerts ({}) ", app.alerts.len()))
        .title_style(Style::default().fg(BORDER_ALERTS).bold());

    if app.alerts.is_empty() {
        let placeholder = Paragraph::new("No alerts")
            .style(Style::default().fg(TEXT_DIM))
            .block(block);
        frame.render_widget(placeholder, area);
        return;
    }

    let items: Vec<ListItem> = app
        .alerts
        .iter()
        .map(|alert| {
            let when = alert
                .timestamp
                .with_timezone(&Local)
                .format("%H:%M")
                .to_string();
            let mut spans = vec![
                Span::styled("▲ ", Style::default().fg(severity_color(alert.severity))),
                Span::styled(when, Style::default().fg(TEXT_DIM)),
                Span::raw(" "),
                Span::raw(alert.message.clone()),
            ];
            if !alert.active {
                spans.push(Span::styled(" (archived)", Style::default().fg(TEXT_DIM)));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

/// Render the footer: key hints, replaced by the active notice.
fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(notice) = &app.notice {
        let color = match notice.level {
            NoticeLevel::Info => STATUS_LIVE,
            NoticeLevel::Error => STATUS_LOST,
        };
        let line = Line::from(Span::styled(
            format!(" {}", notice.text),
            Style::default().fg(color),
        ));
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let footer = Line::from(vec![
        Span::styled(" q", Style::default().fg(Color::Yellow)),
        Span::raw(" quit  "),
        Span::styled("r", Style::default().fg(Color::Yellow)),
        Span::raw(" refresh  "),
        Span::styled("Tab", Style::default().fg(Color::Yellow)),
        Span::raw(" series  "),
        Span::styled("f", Style::default().fg(Color::Yellow)),
        Span::raw(" field  "),
        Span::styled("a", Style::default().fg(Color::Yellow)),
        Span::raw(" archive alerts  "),
        Span::raw("│ "),
        Span::styled(
            format!("{}/{} fields", field_position(app), app.fields.len()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

/// 1-based position of the watched field in the cycling order.
fn field_position(app: &App) -> usize {
    app.fields
        .iter()
        .position(|field| field.id == app.field.id)
        .map(|index| index + 1)
        .unwrap_or(0)
}

/// Color for an alert severity marker.
fn severity_color(severity: AlertSeverity) -> Color {
    match severity {
        AlertSeverity::Info => LABEL_COLOR,
        AlertSeverity::Warning => STATUS_RETRY,
        AlertSeverity::Critical => STATUS_LOST,
    }
}

/// X range of the charted data, padded when a single bucket is on screen.
fn x_bounds(data: &[(f64, f64)]) -> (f64, f64) {
    let min = data.first().map(|(x, _)| *x).unwrap_or(0.0);
    let max = data.last().map(|(x, _)| *x).unwrap_or(0.0);
    if (max - min) < 1.0 {
        (min - 30.0, max + 30.0)
    } else {
        (min, max)
    }
}

/// Y range padded a little so the trace stays off the frame.
fn y_bounds(data: &[(f64, f64)]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (_, y) in data {
        min = min.min(*y);
        max = max.max(*y);
    }
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.1).max(0.5);
    (min - pad, max + pad)
}

/// Bucket timestamp as wall-clock time.
fn format_instant(epoch_secs: f64) -> String {
    DateTime::from_timestamp(epoch_secs as i64, 0)
        .map(|instant| {
            instant
                .with_timezone(&Local)
                .format("%H:%M:%S")
                .to_string()
        })
        .unwrap_or_default()
}
