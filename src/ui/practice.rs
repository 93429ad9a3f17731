//! Practice screen rendering
//!
//! Shows one question with its options, the learner's selection, the answer
//! when revealed, and the read-aloud status.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, AppState};
use crate::narrator::{to_plain_text, NarrationState, Question};

/// Color scheme for the practice screen
mod colors {
    use ratatui::style::Color;

    /// Borders and titles
    pub const HEADER: Color = Color::Cyan;
    /// Option chosen by the learner
    pub const SELECTED: Color = Color::Yellow;
    /// Correct option once revealed
    pub const CORRECT: Color = Color::Green;
    /// Wrong selection once revealed
    pub const WRONG: Color = Color::Red;
    /// Secondary/dimmed text
    pub const SECONDARY: Color = Color::DarkGray;
}

/// Renders the whole practice screen for the current state
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    match &app.state {
        AppState::Loading => render_message(frame, area, "Loading questions...", Color::Cyan),
        AppState::Failed(reason) => render_message(frame, area, reason, Color::Red),
        AppState::Practice => render_practice(frame, area, app),
    }
}

fn render_message(frame: &mut Frame, area: Rect, text: &str, color: Color) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(3),
            Constraint::Percentage(45),
        ])
        .split(area);

    let paragraph = Paragraph::new(text.to_string())
        .style(Style::default().fg(color))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, chunks[1]);
}

fn render_practice(frame: &mut Frame, area: Rect, app: &App) {
    let Some(question) = app.current_question() else {
        render_message(frame, area, "No question selected", Color::Red);
        return;
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(colors::HEADER))
        .title(Span::styled(
            format!(
                " {} | Question {} of {} ",
                app.title,
                app.current + 1,
                app.questions.len()
            ),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let body = Paragraph::new(question_lines(app, question)).wrap(Wrap { trim: false });
    frame.render_widget(body, chunks[0]);
    frame.render_widget(Paragraph::new(status_line(app)), chunks[1]);
    frame.render_widget(
        Paragraph::new(Span::styled(
            "\u{2190}/\u{2192} move  a-e select  space read  p pause  s stop  x answer  ? help  q quit",
            Style::default().fg(colors::SECONDARY),
        )),
        chunks[2],
    );
}

fn question_lines<'a>(app: &App, question: &'a Question) -> Vec<Line<'a>> {
    let selected = app.selections.get(&app.current).map(String::as_str);
    let answer = question.answer.as_deref().map(str::to_ascii_lowercase);

    let mut lines = vec![
        Line::from(to_plain_text(&question.question)),
        Line::from(""),
    ];

    for (key, value) in &question.options {
        let is_selected = selected == Some(key.as_str());
        let is_answer = answer.as_deref() == Some(key.as_str());

        let style = if app.reveal && is_answer {
            Style::default().fg(colors::CORRECT).add_modifier(Modifier::BOLD)
        } else if app.reveal && is_selected {
            Style::default().fg(colors::WRONG)
        } else if is_selected {
            Style::default().fg(colors::SELECTED).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let marker = if is_selected { "\u{25B6}" } else { " " };

        lines.push(Line::from(vec![
            Span::styled(format!("{} {}. ", marker, key.to_uppercase()), style),
            Span::styled(to_plain_text(value), style),
        ]));
    }

    if app.reveal {
        lines.push(Line::from(""));
        let answer_text = answer
            .map(|a| format!("Answer: {}", a.to_uppercase()))
            .unwrap_or_else(|| "Answer not provided".to_string());
        lines.push(Line::from(Span::styled(
            answer_text,
            Style::default().fg(colors::CORRECT),
        )));
        if let Some(explanation) = question.explanation.as_deref() {
            let text = to_plain_text(explanation);
            if !text.is_empty() {
                lines.push(Line::from(text));
            }
        }
    }

    lines
}

fn status_line(app: &App) -> Line<'static> {
    if let Some(status) = &app.status {
        return Line::from(Span::styled(status.clone(), Style::default().fg(Color::Red)));
    }

    let narration = if !app.narration_available() {
        Span::styled("Read-aloud unavailable", Style::default().fg(colors::SECONDARY))
    } else {
        match app.narration_state() {
            NarrationState::Idle => Span::styled("Idle", Style::default().fg(colors::SECONDARY)),
            NarrationState::Speaking => {
                Span::styled("\u{1F50A} Reading", Style::default().fg(Color::Green))
            }
            NarrationState::Paused => {
                Span::styled("\u{23F8} Paused", Style::default().fg(Color::Yellow))
            }
        }
    };

    Line::from(vec![
        narration,
        Span::raw(format!(
            "   Answered {}/{}",
            app.answered_count(),
            app.questions.len()
        )),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NarratorConfig;
    use crate::narrator::{NoSpeech, VoiceNarrator};
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    fn app_with_question() -> App {
        let narrator = Arc::new(VoiceNarrator::new(Arc::new(NoSpeech), NarratorConfig::default()));
        let mut app = App::new("physics", narrator);
        app.load_questions(vec![Question {
            id: None,
            question: "<p>Unit of <b>force</b>?</p>".to_string(),
            options: [("a", "Newton"), ("b", "Joule")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            explanation: Some("Force is measured in newtons".to_string()),
            answer: Some("a".to_string()),
        }]);
        app
    }

    fn rendered(app: &App) -> String {
        let backend = TestBackend::new(100, 20);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_renders_question_without_markup() {
        let content = rendered(&app_with_question());
        assert!(content.contains("Unit of force?"));
        assert!(content.contains("A. Newton"));
        assert!(content.contains("Question 1 of 1"));
        assert!(!content.contains("<b>"));
    }

    #[test]
    fn test_answer_hidden_until_revealed() {
        let mut app = app_with_question();
        assert!(!rendered(&app).contains("Answer: A"));

        app.reveal = true;
        let content = rendered(&app);
        assert!(content.contains("Answer: A"));
        assert!(content.contains("newtons"));
    }

    #[test]
    fn test_loading_message() {
        let narrator = Arc::new(VoiceNarrator::new(Arc::new(NoSpeech), NarratorConfig::default()));
        let app = App::new("physics", narrator);
        assert!(rendered(&app).contains("Loading questions"));
    }

    #[test]
    fn test_unavailable_narration_is_reported() {
        assert!(rendered(&app_with_question()).contains("Read-aloud unavailable"));
    }
}
