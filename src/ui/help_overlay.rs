//! Key reference shown over the practice screen

use ratatui::{
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

/// Key bindings grouped by what they control
const KEY_SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "Questions",
        &[
            ("←/h, →/l", "Previous / next question"),
            ("a-e", "Select an option"),
            ("x", "Show or hide the answer"),
        ],
    ),
    (
        "Read aloud",
        &[
            ("Space/r", "Read question and options"),
            ("1-5", "Read option A-E"),
            ("t", "Read the explanation"),
            ("p", "Pause / resume"),
            ("s", "Stop reading"),
        ],
    ),
    ("General", &[("?", "Toggle this help"), ("q", "Quit")]),
];

const OVERLAY_WIDTH: u16 = 50;

fn key_lines() -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (title, bindings) in KEY_SECTIONS {
        if !lines.is_empty() {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            *title,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        lines.extend(bindings.iter().map(|(key, action)| {
            Line::from(vec![
                Span::styled(format!("  {:<12}", key), Style::default().fg(Color::Yellow)),
                Span::raw(*action),
            ])
        }));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Esc or ? closes",
        Style::default().fg(Color::DarkGray),
    )));
    lines
}

/// Centers a box of the given size, shrinking it to fit small terminals
fn overlay_area(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    cell
}

/// Renders the key reference on top of the current view
pub fn render(frame: &mut Frame) {
    let lines = key_lines();
    let height = lines.len() as u16 + 2;
    let area = overlay_area(frame.area(), OVERLAY_WIDTH, height);

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .title(" Keys ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        ),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn rendered(width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(render).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_lists_every_section() {
        let content = rendered(80, 30);
        for (title, _) in KEY_SECTIONS {
            assert!(content.contains(title), "missing section {}", title);
        }
        assert!(content.contains("Pause / resume"));
    }

    #[test]
    fn test_small_terminal_does_not_panic() {
        let content = rendered(30, 8);
        assert!(content.contains("Keys"));
    }
}
