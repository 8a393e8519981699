//! Network traffic chart.
//!
//! Plots the rolling inbound/outbound window as two line datasets, with the
//! oldest and newest time labels on the x axis.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    symbols,
    text::Span,
    widgets::{Axis, Chart, Dataset, GraphType, Paragraph},
    Frame,
};

use crate::app::App;
use crate::telemetry::TrafficSeries;
use crate::ui::common::panel;

/// Lowest upper bound for the y axis so a quiet network doesn't look busy.
const MIN_Y_BOUND: f64 = 10.0;

pub fn render(frame: &mut Frame, app: &App, traffic: &TrafficSeries, area: Rect) {
    let title = match traffic.last() {
        Some((inbound, outbound)) => format!(" Traffic  in {:.0}  out {:.0} ", inbound, outbound),
        None => " Traffic ".to_string(),
    };
    let block = panel(app, title);

    if traffic.is_empty() {
        let paragraph = Paragraph::new("No samples yet")
            .style(Style::default().add_modifier(Modifier::DIM))
            .block(block);
        frame.render_widget(paragraph, area);
        return;
    }

    let inbound = points(traffic.inbound().iter().copied());
    let outbound = points(traffic.outbound().iter().copied());

    let peak = traffic
        .inbound()
        .iter()
        .chain(traffic.outbound().iter())
        .copied()
        .fold(0.0_f64, f64::max);
    let y_max = y_bound(peak);
    let x_max = (traffic.len().saturating_sub(1)).max(1) as f64;

    let datasets = vec![
        Dataset::default()
            .name("in")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(app.theme.inbound))
            .data(&inbound),
        Dataset::default()
            .name("out")
            .marker(symbols::Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(app.theme.outbound))
            .data(&outbound),
    ];

    let labels = traffic.labels();
    let first = labels.front().cloned().unwrap_or_default();
    let last = labels.back().cloned().unwrap_or_default();

    let chart = Chart::new(datasets)
        .block(block)
        .x_axis(
            Axis::default()
                .style(app.theme.border_style())
                .bounds([0.0, x_max])
                .labels(vec![Span::raw(first), Span::raw(last)]),
        )
        .y_axis(
            Axis::default()
                .style(app.theme.border_style())
                .bounds([0.0, y_max])
                .labels(vec![
                    Span::raw("0"),
                    Span::raw(format!("{:.0}", y_max / 2.0)),
                    Span::raw(format!("{:.0}", y_max)),
                ]),
        );

    frame.render_widget(chart, area);
}

fn points(values: impl Iterator<Item = f64>) -> Vec<(f64, f64)> {
    values.enumerate().map(|(i, v)| (i as f64, v)).collect()
}

/// Round the peak up to the next multiple of ten, with some headroom.
fn y_bound(peak: f64) -> f64 {
    let padded = peak * 1.1;
    ((padded / 10.0).ceil() * 10.0).max(MIN_Y_BOUND)
}
