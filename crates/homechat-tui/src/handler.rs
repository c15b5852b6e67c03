use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc::UnboundedSender;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent, events: &UnboundedSender<AppEvent>) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key, events),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(msg) => app.apply_stream(msg),
        AppEvent::Models(models) => app.set_models(models),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent, events: &UnboundedSender<AppEvent>) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups take the keyboard while open
    if app.show_settings {
        handle_settings(app, key);
        return;
    }
    if app.show_model_picker {
        handle_model_picker(app, key);
        return;
    }

    if key.code == KeyCode::Char('l') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.clear_conversation();
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key, events),
        InputMode::Editing => handle_editing_mode(app, key, events),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent, events: &UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('s') => app.open_settings(),
        KeyCode::Char('m') => app.open_model_picker(events),
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::PageDown => app.scroll_page_down(),
        KeyCode::PageUp => app.scroll_page_up(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_chat_to_bottom(),
        KeyCode::Char('g') | KeyCode::Home => app.chat_scroll = 0,
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent, events: &UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Esc | KeyCode::Tab => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_prompt(events),
        KeyCode::PageDown => app.scroll_page_down(),
        KeyCode::PageUp => app.scroll_page_up(),
        KeyCode::Backspace => {
            if app.prompt_cursor > 0 {
                app.prompt_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.prompt_input, app.prompt_cursor);
                app.prompt_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.prompt_input.chars().count();
            if app.prompt_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.prompt_input, app.prompt_cursor);
                app.prompt_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.prompt_cursor = app.prompt_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.prompt_input.chars().count();
            app.prompt_cursor = (app.prompt_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.prompt_cursor = 0;
        }
        KeyCode::End => {
            app.prompt_cursor = app.prompt_input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.prompt_input, app.prompt_cursor);
            app.prompt_input.insert(byte_pos, c);
            app.prompt_cursor += 1;
        }
        _ => {}
    }
}

fn handle_settings(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_settings = false,
        KeyCode::Enter => app.apply_settings(),
        KeyCode::Tab | KeyCode::Down => app.settings.next_field(),
        KeyCode::BackTab | KeyCode::Up => app.settings.prev_field(),
        KeyCode::Backspace => {
            app.settings.focused_field().pop();
        }
        KeyCode::Char(c) => app.settings.focused_field().push(c),
        _ => {}
    }
}

fn handle_model_picker(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') => app.show_model_picker = false,
        KeyCode::Enter => {
            if !app.models_loading {
                app.select_model();
            }
        }
        KeyCode::Char('j') | KeyCode::Down => app.model_picker_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_picker_nav_up(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str, events: &UnboundedSender<AppEvent>) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c)), events).unwrap();
        }
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("hé", 5), 3);
    }

    #[test]
    fn test_prompt_editing_with_cursor() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(Config::new());

        type_text(&mut app, "hllo", &tx);
        for _ in 0..3 {
            handle_event(&mut app, key(KeyCode::Left), &tx).unwrap();
        }
        type_text(&mut app, "e", &tx);
        assert_eq!(app.prompt_input, "hello");
        assert_eq!(app.prompt_cursor, 2);

        handle_event(&mut app, key(KeyCode::End), &tx).unwrap();
        handle_event(&mut app, key(KeyCode::Backspace), &tx).unwrap();
        assert_eq!(app.prompt_input, "hell");
    }

    #[test]
    fn test_escape_then_quit() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(Config::new());

        type_text(&mut app, "q", &tx);
        assert!(!app.should_quit);
        handle_event(&mut app, key(KeyCode::Esc), &tx).unwrap();
        handle_event(&mut app, key(KeyCode::Char('q')), &tx).unwrap();
        assert!(app.should_quit);
    }

    #[test]
    fn test_settings_popup_edits_focused_field() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(Config::new());
        app.input_mode = InputMode::Normal;

        handle_event(&mut app, key(KeyCode::Char('s')), &tx).unwrap();
        assert!(app.show_settings);

        handle_event(&mut app, key(KeyCode::Tab), &tx).unwrap();
        handle_event(&mut app, key(KeyCode::Tab), &tx).unwrap();
        for _ in 0..app.settings.fields[2].len() {
            handle_event(&mut app, key(KeyCode::Backspace), &tx).unwrap();
        }
        type_text(&mut app, "0.2", &tx);
        assert_eq!(app.settings.fields[2], "0.2");

        handle_event(&mut app, key(KeyCode::Esc), &tx).unwrap();
        assert!(!app.show_settings);
        assert_eq!(app.params.temperature, 1.0);
    }

    #[tokio::test]
    async fn test_submit_while_streaming_reports_status() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut app = App::new(Config::new());
        app.params.endpoint = "http://127.0.0.1:9/v1/chat/completions".to_string();

        type_text(&mut app, "hi", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx).unwrap();
        assert!(app.conversation.is_streaming());
        assert!(app.prompt_input.is_empty());

        type_text(&mut app, "again", &tx);
        handle_event(&mut app, key(KeyCode::Enter), &tx).unwrap();
        assert_eq!(app.conversation.messages().len(), 2);
        assert_eq!(app.prompt_input, "again");
        assert!(app.status.is_some());
    }
}
