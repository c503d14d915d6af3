use anyhow::{Context as _, Result};
use eframe::egui;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use stravatalk_core::agents::initialize_agents;
use stravatalk_core::chat::{ChatMessage, Role};
use stravatalk_core::controller::handle_query;
use stravatalk_core::llm::{LlmConfig, OpenAiExchange};
use stravatalk_core::render::render_messages;
use stravatalk_core::session::SessionState;
use stravatalk_core::store::ActivityStore;
use stravatalk_core::surface::ChatSurface;
use stravatalk_core::util::{default_db_path, env_flag};
use stravatalk_core::visualization::PlotSpec;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> eframe::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    dotenvy::dotenv().ok();

    let (query_tx, query_rx) = mpsc::channel::<String>();
    let (event_tx, event_rx) = mpsc::channel::<UiEvent>();

    // The worker thread owns the session, the store and the tokio runtime;
    // the UI thread only ever sees plain chat history snapshots.
    thread::spawn(move || worker_loop(query_rx, event_tx));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 700.0])
            .with_min_inner_size([600.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "StravaTalk",
        options,
        Box::new(move |_cc| Box::new(StravaTalkApp::new(query_tx, event_rx))),
    )
}

/// Events the worker sends back to the UI thread.
enum UiEvent {
    Processing(bool),
    History(Vec<ChatMessage>),
    Status(String),
    Notice(String),
    Fatal(String),
}

fn worker_loop(query_rx: mpsc::Receiver<String>, event_tx: mpsc::Sender<UiEvent>) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = event_tx.send(UiEvent::Fatal(format!("Failed to start runtime: {e}")));
            return;
        }
    };

    let session = build_session();
    let (store, mut state) = match session {
        Ok(parts) => parts,
        Err(e) => {
            let _ = event_tx.send(UiEvent::Fatal(format!("{e:#}")));
            return;
        }
    };
    let _ = event_tx.send(UiEvent::History(state.chat_history.clone()));

    while let Ok(query) = query_rx.recv() {
        let _ = event_tx.send(UiEvent::Processing(true));
        let mut surface = ChannelSurface {
            events: event_tx.clone(),
        };
        runtime.block_on(handle_query(&mut state, &store, &mut surface, &query));
        let _ = event_tx.send(UiEvent::History(state.chat_history.clone()));
        let _ = event_tx.send(UiEvent::Processing(false));
    }
}

fn build_session() -> Result<(ActivityStore, SessionState)> {
    let store = ActivityStore::new(default_db_path()?)
        .context("Failed to open the activities database")?;
    let exchange = Arc::new(OpenAiExchange::new(LlmConfig::from_env()?));
    let state = SessionState::new(initialize_agents(exchange));
    Ok((store, state))
}

/// Surface used during a turn on the worker thread: status lines and
/// transient warnings travel to the UI as events, while message/chart
/// display is left to the per-frame history replay.
struct ChannelSurface {
    events: mpsc::Sender<UiEvent>,
}

impl ChatSurface for ChannelSurface {
    fn show_markdown(&mut self, _role: Role, _text: &str) {
        // History snapshots carry the messages; nothing to do per call.
    }

    fn show_warning(&mut self, text: &str) {
        let _ = self.events.send(UiEvent::Notice(format!("warning: {text}")));
    }

    fn show_error(&mut self, text: &str) {
        let _ = self.events.send(UiEvent::Notice(format!("error: {text}")));
    }

    fn show_chart(&mut self, _plot: &PlotSpec) -> Result<()> {
        // Charts are drawn from the stored directive on the next repaint.
        Ok(())
    }

    fn status_begin(&mut self, label: &str) {
        let _ = self.events.send(UiEvent::Status(label.to_string()));
    }

    fn status_note(&mut self, line: &str) {
        let _ = self.events.send(UiEvent::Status(line.to_string()));
    }

    fn status_end(&mut self, _ok: bool, label: &str) {
        let _ = self.events.send(UiEvent::Status(label.to_string()));
    }
}

struct StravaTalkApp {
    query_tx: mpsc::Sender<String>,
    event_rx: mpsc::Receiver<UiEvent>,
    input: String,
    history: Vec<ChatMessage>,
    processing: bool,
    status_lines: Vec<String>,
    notices: Vec<String>,
    fatal: Option<String>,
    debug: bool,
}

impl StravaTalkApp {
    fn new(query_tx: mpsc::Sender<String>, event_rx: mpsc::Receiver<UiEvent>) -> Self {
        Self {
            query_tx,
            event_rx,
            input: String::new(),
            history: Vec::new(),
            processing: false,
            status_lines: Vec::new(),
            notices: Vec::new(),
            fatal: None,
            debug: env_flag("STRAVATALK_DEBUG"),
        }
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                UiEvent::Processing(flag) => self.processing = flag,
                UiEvent::History(history) => self.history = history,
                UiEvent::Status(line) => self.status_lines.push(line),
                UiEvent::Notice(line) => self.notices.push(line),
                UiEvent::Fatal(message) => self.fatal = Some(message),
            }
        }
    }

    fn submit(&mut self) {
        let query = self.input.trim().to_string();
        if query.is_empty() || self.processing {
            return;
        }
        self.status_lines.clear();
        self.notices.clear();
        // Optimistic echo; the worker's history snapshot replaces it.
        self.history.push(ChatMessage::user(&query));
        self.processing = true;
        let _ = self.query_tx.send(query);
        self.input.clear();
    }
}

impl eframe::App for StravaTalkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        if self.processing {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("StravaTalk");
            if let Some(fatal) = &self.fatal {
                ui.colored_label(egui::Color32::RED, fatal);
                return;
            }
            ui.separator();

            let input_height = 90.0;
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .max_height(ui.available_height() - input_height)
                .show(ui, |ui| {
                    // Immediate mode: every frame is an interface refresh,
                    // so the history renderer replays everything.
                    let mut surface = EguiSurface { ui: &mut *ui };
                    render_messages(&self.history, self.processing, self.debug, &mut surface);

                    for notice in &self.notices {
                        ui.colored_label(egui::Color32::YELLOW, notice);
                    }
                    if self.processing {
                        ui.add(egui::Spinner::new());
                        for line in &self.status_lines {
                            ui.weak(line);
                        }
                    }
                });

            ui.separator();
            ui.horizontal(|ui| {
                let edit = egui::TextEdit::singleline(&mut self.input)
                    .hint_text("Ask me anything about your Strava activities...")
                    .desired_width(ui.available_width() - 70.0);
                let response = ui.add_enabled(!self.processing, edit);
                let clicked = ui
                    .add_enabled(!self.processing, egui::Button::new("Send"))
                    .clicked();
                let entered =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if clicked || entered {
                    self.submit();
                    response.request_focus();
                }
            });
        });
    }
}

/// Per-frame surface drawing into the chat scroll area.
struct EguiSurface<'a> {
    ui: &'a mut egui::Ui,
}

impl ChatSurface for EguiSurface<'_> {
    fn show_markdown(&mut self, role: Role, text: &str) {
        let who = match role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        self.ui.add_space(6.0);
        self.ui.strong(who);
        self.ui.label(text);
    }

    fn show_warning(&mut self, text: &str) {
        self.ui.colored_label(egui::Color32::YELLOW, text);
    }

    fn show_error(&mut self, text: &str) {
        self.ui.colored_label(egui::Color32::RED, text);
    }

    fn show_chart(&mut self, plot: &PlotSpec) -> Result<()> {
        draw_plot(self.ui, plot)
    }
}

const SERIES_COLORS: [egui::Color32; 4] = [
    egui::Color32::from_rgb(0x1f, 0x77, 0xb4),
    egui::Color32::from_rgb(0xff, 0x7f, 0x0e),
    egui::Color32::from_rgb(0x2c, 0xa0, 0x2c),
    egui::Color32::from_rgb(0xd6, 0x27, 0x28),
];

/// Draw a chart directly from the values embedded in the Vega-Lite spec.
/// The spec is self-contained plain data, so this needs no other state.
fn draw_plot(ui: &mut egui::Ui, plot: &PlotSpec) -> Result<()> {
    let spec = &plot.spec;
    let values = spec["data"]["values"]
        .as_array()
        .context("chart spec carries no data values")?;
    let x_field = spec["encoding"]["x"]["field"]
        .as_str()
        .context("chart spec carries no x field")?;
    let y_fields: Vec<String> = match spec["transform"][0]["fold"].as_array() {
        Some(fold) => fold
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        None => spec["encoding"]["y"]["field"]
            .as_str()
            .map(|s| vec![s.to_string()])
            .into_iter()
            .flatten()
            .collect(),
    };
    let mark = spec["mark"]["type"].as_str().unwrap_or("line");

    // Collect (x, y) pairs per series; non-numeric x values fall back to
    // their row index so categorical charts still draw.
    let mut series: Vec<(String, Vec<(f64, f64)>)> = Vec::new();
    for y_field in &y_fields {
        let mut points = Vec::new();
        for (i, row) in values.iter().enumerate() {
            let x = numeric_axis_value(&row[x_field]).unwrap_or(i as f64);
            if let Some(y) = row[y_field].as_f64() {
                points.push((x, y));
            }
        }
        if !points.is_empty() {
            series.push((y_field.clone(), points));
        }
    }
    if series.is_empty() {
        anyhow::bail!("no numeric series to draw");
    }

    let (min_x, max_x, min_y, max_y) = bounds(&series);
    let width = ui.available_width().max(200.0);
    let (response, painter) =
        ui.allocate_painter(egui::vec2(width, 220.0), egui::Sense::hover());
    let rect = response.rect.shrink(8.0);
    painter.rect_filled(response.rect, 4.0, ui.visuals().extreme_bg_color);

    let to_screen = |x: f64, y: f64| {
        let fx = if max_x > min_x { (x - min_x) / (max_x - min_x) } else { 0.5 };
        let fy = if max_y > min_y { (y - min_y) / (max_y - min_y) } else { 0.5 };
        egui::pos2(
            rect.left() + (fx as f32) * rect.width(),
            rect.bottom() - (fy as f32) * rect.height(),
        )
    };

    for (idx, (_, points)) in series.iter().enumerate() {
        let color = SERIES_COLORS[idx % SERIES_COLORS.len()];
        match mark {
            "bar" => {
                let bar_width = (rect.width() / points.len().max(1) as f32 * 0.8).max(1.0);
                for &(x, y) in points {
                    let top = to_screen(x, y);
                    let bottom = to_screen(x, min_y.min(0.0));
                    let bar = egui::Rect::from_min_max(
                        egui::pos2(top.x - bar_width / 2.0, top.y),
                        egui::pos2(top.x + bar_width / 2.0, bottom.y),
                    );
                    painter.rect_filled(bar, 1.0, color);
                }
            }
            "point" => {
                for &(x, y) in points {
                    painter.circle_filled(to_screen(x, y), 3.0, color);
                }
            }
            // line and area both draw as polylines here
            _ => {
                let line: Vec<egui::Pos2> =
                    points.iter().map(|&(x, y)| to_screen(x, y)).collect();
                painter.add(egui::Shape::line(line, egui::Stroke::new(1.5, color)));
            }
        }
    }

    if let Some(title) = spec["title"].as_str() {
        ui.weak(title);
    }
    if series.len() > 1 {
        ui.horizontal(|ui| {
            for (idx, (name, _)) in series.iter().enumerate() {
                ui.colored_label(SERIES_COLORS[idx % SERIES_COLORS.len()], name);
            }
        });
    }
    Ok(())
}

fn numeric_axis_value(value: &serde_json::Value) -> Option<f64> {
    if let Some(n) = value.as_f64() {
        return Some(n);
    }
    stravatalk_core::tabular::temporal_to_epoch_seconds(value.as_str()?)
}

fn bounds(series: &[(String, Vec<(f64, f64)>)]) -> (f64, f64, f64, f64) {
    let mut min_x = f64::MAX;
    let mut max_x = f64::MIN;
    let mut min_y = f64::MAX;
    let mut max_y = f64::MIN;
    for (_, points) in series {
        for &(x, y) in points {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    (min_x, max_x, min_y.min(0.0), max_y)
}
