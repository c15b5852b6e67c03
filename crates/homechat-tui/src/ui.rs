use std::sync::atomic::Ordering;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use homechat_core::ChatRole;
use crate::app::{App, InputMode, SETTINGS_LABELS};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if app.show_settings {
        render_settings(app, frame, area);
    } else if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let streaming = if app.conversation.is_streaming() {
        " [streaming]"
    } else {
        ""
    };

    let title = Line::from(vec![
        Span::styled(" homechat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.params.model.clone(), Style::default().fg(Color::White)),
        Span::styled(streaming, Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    if app.follow_tail.swap(false, Ordering::Relaxed) {
        app.scroll_chat_to_bottom();
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", app.params.endpoint));

    let chat = Paragraph::new(chat_text(app))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, area);
}

/// Transcript as drawn in the chat window, also used to count wrapped lines
pub fn chat_text(app: &App) -> Text<'static> {
    let messages = app.conversation.messages();
    if messages.is_empty() {
        return Text::from(vec![
            Line::default(),
            Line::from(Span::styled(
                "Welcome to homechat. Ask me anything",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .centered();
    }

    let mut lines: Vec<Line<'static>> = Vec::new();

    for msg in messages {
        let color = match msg.role {
            ChatRole::User => Color::Cyan,
            ChatRole::Assistant => Color::Yellow,
        };
        lines.push(Line::from(Span::styled(
            format!("{}:", msg.role.display_name()),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));

        if msg.role == ChatRole::Assistant && msg.content.is_empty() && app.conversation.is_streaming() {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            for line in msg.content.split('\n') {
                lines.push(Line::from(line.to_string()));
            }
        }
        lines.push(Line::default());
    }

    Text::from(lines)
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Prompt ");

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.prompt_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.prompt_input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing && !app.show_settings && !app.show_model_picker {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let (mode_text, hints) = match app.input_mode {
        InputMode::Normal => (
            " NORMAL ",
            " i: prompt  j/k: scroll  s: settings  m: models  Ctrl-L: new chat  q: quit",
        ),
        InputMode::Editing => (
            " PROMPT ",
            " Enter: send  Esc: normal mode  PgUp/PgDn: scroll  Ctrl-C: quit",
        ),
    };

    let mut spans = vec![Span::styled(mode_text, mode_style)];
    match &app.status {
        Some(status) => spans.push(Span::styled(
            format!(" {}", status),
            Style::default().fg(Color::Red),
        )),
        None => spans.push(Span::styled(hints, Style::default().fg(Color::DarkGray))),
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let popup_width = width.min(area.width.saturating_sub(4));
    let popup_height = height.min(area.height.saturating_sub(4));

    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;

    Rect::new(popup_x, popup_y, popup_width, popup_height)
}

fn render_settings(app: &App, frame: &mut Frame, area: Rect) {
    let popup_area = centered_popup(area, 70, (SETTINGS_LABELS.len() as u16) + 2);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Settings (Tab to move, Enter to save, Esc to cancel) ");

    let lines: Vec<Line> = SETTINGS_LABELS
        .iter()
        .zip(app.settings.fields.iter())
        .enumerate()
        .map(|(i, (label, value))| {
            let focused = i == app.settings.focus;
            let label_style = if focused {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let cursor = if focused { "_" } else { "" };
            Line::from(vec![
                Span::styled(format!(" {:<12}", label), label_style),
                Span::raw(format!("{}{}", value, cursor)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), popup_area);
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let rows = app.available_models.len().max(1) as u16;
    let popup_area = centered_popup(area, 50, rows + 2);

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Select Model (Enter to select, Esc to cancel) ");

    if app.models_loading || app.available_models.is_empty() {
        let message = if app.models_loading {
            " Loading models..."
        } else {
            " No models reported by the server"
        };
        let text = Paragraph::new(Span::styled(message, Style::default().fg(Color::DarkGray)))
            .block(block);
        frame.render_widget(text, popup_area);
        return;
    }

    let items: Vec<ListItem> = app
        .available_models
        .iter()
        .map(|model| {
            let style = if model == &app.params.model {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!(" {} ", model)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.model_picker_state);
}
