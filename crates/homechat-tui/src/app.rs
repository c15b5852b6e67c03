use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::{Result, anyhow};
use homechat_core::{
    ChatMessage, CompletionClient, CompletionRequest, Conversation, FragmentSink,
    RequestParameters, StreamPump,
};
use ratatui::widgets::{ListState, Paragraph, Wrap};
use tokio::sync::mpsc::UnboundedSender;
use crate::config::Config;
use crate::tui::{AppEvent, StreamMsg};
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub const SETTINGS_LABELS: [&str; 5] = ["Endpoint", "Model", "Temperature", "Top P", "Max tokens"];

/// Text fields of the settings popup, parsed only when applied
#[derive(Debug, Clone, Default)]
pub struct SettingsForm {
    pub fields: [String; 5],
    pub focus: usize,
}

impl SettingsForm {
    pub fn from_parameters(params: &RequestParameters) -> Self {
        Self {
            fields: [
                params.endpoint.clone(),
                params.model.clone(),
                params.temperature.to_string(),
                params.top_p.to_string(),
                params.max_tokens.to_string(),
            ],
            focus: 0,
        }
    }

    pub fn focused_field(&mut self) -> &mut String {
        &mut self.fields[self.focus]
    }

    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % self.fields.len();
    }

    pub fn prev_field(&mut self) {
        self.focus = (self.focus + self.fields.len() - 1) % self.fields.len();
    }

    pub fn parse(&self) -> Result<RequestParameters> {
        let endpoint = self.fields[0].trim();
        if endpoint.is_empty() {
            return Err(anyhow!("Endpoint must not be empty"));
        }
        let model = self.fields[1].trim();
        if model.is_empty() {
            return Err(anyhow!("Model must not be empty"));
        }

        let temperature: f32 = self.fields[2]
            .trim()
            .parse()
            .map_err(|_| anyhow!("Temperature must be a number"))?;
        if temperature.is_nan() || temperature < 0.0 {
            return Err(anyhow!("Temperature must be 0 or more"));
        }

        let top_p: f32 = self.fields[3]
            .trim()
            .parse()
            .map_err(|_| anyhow!("Top P must be a number"))?;
        if !(0.0..=1.0).contains(&top_p) {
            return Err(anyhow!("Top P must be between 0 and 1"));
        }

        let max_tokens: u32 = self.fields[4]
            .trim()
            .parse()
            .map_err(|_| anyhow!("Max tokens must be a whole number"))?;
        if max_tokens == 0 {
            return Err(anyhow!("Max tokens must be greater than 0"));
        }

        Ok(RequestParameters {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            temperature,
            top_p,
            max_tokens,
        })
    }
}

/// Forwards pump output to the main loop, which owns the conversation
struct ChannelSink {
    events: UnboundedSender<AppEvent>,
}

impl FragmentSink for ChannelSink {
    fn on_fragment(&mut self, fragment: &str) {
        let _ = self.events.send(AppEvent::Stream(StreamMsg::Fragment(fragment.to_string())));
    }

    fn on_complete(&mut self) {
        let _ = self.events.send(AppEvent::Stream(StreamMsg::Complete));
    }
}

async fn stream_reply(
    client: CompletionClient,
    params: RequestParameters,
    request: CompletionRequest,
    events: UnboundedSender<AppEvent>,
) {
    let mut sink = ChannelSink { events: events.clone() };

    let result = match client.stream(&params, &request).await {
        Ok(body) => StreamPump::new().run(body, &mut sink).await.map(|_| ()),
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        let _ = events.send(AppEvent::Stream(StreamMsg::Failed(e)));
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub status: Option<String>,

    // Chat state
    pub conversation: Conversation,
    pub prompt_input: String,
    pub prompt_cursor: usize, // cursor position in prompt_input
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub follow_tail: Arc<AtomicBool>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Settings popup state
    pub show_settings: bool,
    pub settings: SettingsForm,

    // Model picker state
    pub show_model_picker: bool,
    pub models_loading: bool,
    pub available_models: Vec<String>,
    pub model_picker_state: ListState,

    // Data
    pub params: RequestParameters,
    pub client: CompletionClient,
}

impl App {
    pub fn new(config: Config) -> Self {
        let params = config.request_parameters();

        // Every transcript change pulls the view back to the newest text
        let follow_tail = Arc::new(AtomicBool::new(true));
        let mut conversation = Conversation::new();
        let follow = Arc::clone(&follow_tail);
        conversation.add_observer(move |_: &[ChatMessage]| {
            follow.store(true, Ordering::Relaxed);
        });

        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            status: None,

            conversation,
            prompt_input: String::new(),
            prompt_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            follow_tail,

            animation_frame: 0,

            show_settings: false,
            settings: SettingsForm::from_parameters(&params),

            show_model_picker: false,
            models_loading: false,
            available_models: Vec::new(),
            model_picker_state: ListState::default(),

            params,
            client: CompletionClient::new(),
        }
    }

    /// Send the prompt and start streaming the reply in the background
    pub fn submit_prompt(&mut self, events: &UnboundedSender<AppEvent>) {
        let prompt = self.prompt_input.trim().to_string();
        if prompt.is_empty() {
            return;
        }

        let request = match self.conversation.submit(prompt, &self.params) {
            Ok(request) => request,
            Err(e) => {
                self.status = Some(e.to_string());
                return;
            }
        };

        self.prompt_input.clear();
        self.prompt_cursor = 0;
        self.status = None;

        tokio::spawn(stream_reply(
            self.client.clone(),
            self.params.clone(),
            request,
            events.clone(),
        ));
    }

    /// Fold one message from the stream task into the conversation
    pub fn apply_stream(&mut self, msg: StreamMsg) {
        match msg {
            StreamMsg::Fragment(text) => {
                if let Err(e) = self.conversation.on_fragment(&text) {
                    tracing::warn!(error = %e, "fragment arrived with no reply streaming");
                }
            }
            StreamMsg::Complete => self.conversation.on_stream_complete(),
            StreamMsg::Failed(e) => {
                self.conversation.on_stream_failed(&e);
                self.status = Some(format!("Reply stopped: {}", e));
            }
        }
    }

    pub fn clear_conversation(&mut self) {
        match self.conversation.clear() {
            Ok(()) => {
                self.chat_scroll = 0;
                self.status = None;
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.conversation.is_streaming() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_add(1);
    }

    pub fn scroll_page_up(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_sub(half);
    }

    pub fn scroll_page_down(&mut self) {
        let half = (self.chat_height / 2).max(1);
        self.chat_scroll = self.chat_scroll.saturating_add(half);
    }

    /// Scroll chat to bottom so the newest text is visible
    pub fn scroll_chat_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 { self.chat_width } else { 50 };

        // Same text and wrapping as the chat window, so the count matches what is drawn
        let total_lines = Paragraph::new(ui::chat_text(self))
            .wrap(Wrap { trim: false })
            .line_count(wrap_width);
        let total_lines = u16::try_from(total_lines).unwrap_or(u16::MAX);

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    // Settings popup methods
    pub fn open_settings(&mut self) {
        self.settings = SettingsForm::from_parameters(&self.params);
        self.show_settings = true;
    }

    pub fn apply_settings(&mut self) {
        match self.settings.parse() {
            Ok(params) => {
                self.set_parameters(params);
                self.show_settings = false;
                self.status = Some("Settings saved".to_string());
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    fn set_parameters(&mut self, params: RequestParameters) {
        self.params = params;
        if let Err(e) = Config::from_parameters(&self.params).save() {
            tracing::warn!(error = %e, "could not save config");
        }
    }

    // Model picker methods
    pub fn open_model_picker(&mut self, events: &UnboundedSender<AppEvent>) {
        self.show_model_picker = true;
        self.models_loading = true;

        let client = self.client.clone();
        let endpoint = self.params.endpoint.clone();
        let events = events.clone();
        tokio::spawn(async move {
            let models = client.list_models(&endpoint).await.map_err(|e| e.to_string());
            let _ = events.send(AppEvent::Models(models));
        });
    }

    pub fn set_models(&mut self, models: Result<Vec<String>, String>) {
        self.models_loading = false;
        match models {
            Ok(models) => {
                let selected = models.iter().position(|m| m == &self.params.model).unwrap_or(0);
                self.model_picker_state
                    .select(if models.is_empty() { None } else { Some(selected) });
                self.available_models = models;
            }
            Err(e) => {
                self.show_model_picker = false;
                self.status = Some(format!("Could not list models: {}", e));
            }
        }
    }

    pub fn model_picker_nav_down(&mut self) {
        let len = self.available_models.len();
        if len > 0 {
            let i = self.model_picker_state.selected().unwrap_or(0);
            self.model_picker_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_picker_nav_up(&mut self) {
        let i = self.model_picker_state.selected().unwrap_or(0);
        self.model_picker_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_picker_state.selected() {
            if let Some(model) = self.available_models.get(i) {
                let params = RequestParameters {
                    model: model.clone(),
                    ..self.params.clone()
                };
                self.set_parameters(params);
            }
        }
        self.show_model_picker = false;
    }
}
