use anyhow::Context as _;
use clap::Parser;
use eframe::{App, Frame, NativeOptions, egui};
use labeler_core::{Label, LabelSession, decode_rgba, fit_display};
use rfd::FileDialog;
use std::path::PathBuf;

/// Display bound when the backend does not report a monitor size.
const FALLBACK_BOUND: (u32, u32) = (1536, 864);

/// Share of the monitor used as the display bound.
const VIEWPORT_SHARE: f32 = 0.8;

/// Sort a folder of images into categories, one click per image.
#[derive(Parser, Debug)]
#[command(name = "QuickLabel", version)]
#[command(about = "Label images one by one; each click files the image and shows the next")]
struct Cli {
    /// Folder holding the unlabeled images (picked via dialog when omitted)
    input: Option<PathBuf>,

    /// Folder that receives the labeled images (picked via dialog when omitted)
    output: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let input = match cli.input {
        Some(dir) => dir,
        None => pick_folder("Folder with unlabeled images")?,
    };
    let output = match cli.output {
        Some(dir) => dir,
        None => pick_folder("Folder for labeled images")?,
    };

    let session = LabelSession::new(&input, &output)?;
    tracing::info!("{} images queued from {}", session.len(), input.display());

    let options = NativeOptions::default();
    if let Err(e) = eframe::run_native(
        "QuickLabel",
        options,
        Box::new(move |_cc| {
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(Box::new(UiApp::new(session)))
        }),
    ) {
        eprintln!("window closed with error: {e}");
    }
    Ok(())
}

fn pick_folder(title: &str) -> anyhow::Result<PathBuf> {
    FileDialog::new()
        .set_title(title)
        .set_directory(".")
        .pick_folder()
        .with_context(|| format!("no folder chosen for: {title}"))
}

struct CurrentImage {
    texture: egui::TextureHandle,
    natural: (u32, u32),
}

struct UiApp {
    session: LabelSession,
    // Cursor position the texture and title were built for.
    shown_cursor: Option<usize>,
    current: Option<CurrentImage>,
    decode_failure: Option<String>,
    status: String,
}

impl UiApp {
    fn new(session: LabelSession) -> Self {
        Self {
            session,
            shown_cursor: None,
            current: None,
            decode_failure: None,
            status: String::new(),
        }
    }

    /// Decode the image under the cursor and push the window title.
    ///
    /// Runs only when the cursor moved since the last frame, so re-rendering
    /// the same position reuses the uploaded texture.
    fn refresh_current(&mut self, ctx: &egui::Context) {
        if self.shown_cursor == Some(self.session.cursor()) {
            return;
        }
        self.shown_cursor = Some(self.session.cursor());
        self.current = None;
        self.decode_failure = None;

        let Some(path) = self.session.current() else {
            return;
        };
        let path = path.to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        ctx.send_viewport_cmd(egui::ViewportCommand::Title(format!(
            "{name} ({} Remaining)",
            self.session.remaining()
        )));

        match decode_rgba(&path) {
            Ok(img) => {
                let size = [img.width as usize, img.height as usize];
                let color = egui::ColorImage::from_rgba_unmultiplied(size, &img.rgba);
                let texture = ctx.load_texture(
                    format!("image:{}", path.display()),
                    color,
                    egui::TextureOptions::LINEAR,
                );
                self.current = Some(CurrentImage {
                    texture,
                    natural: (img.width, img.height),
                });
            }
            Err(e) => {
                // The file can still be labeled out of the queue.
                tracing::warn!("{e}");
                self.decode_failure = Some(e.to_string());
            }
        }
    }

    fn apply_label(&mut self, label: Label) {
        match self.session.label_current(label) {
            Ok(dest) => {
                tracing::debug!("moved to {}", dest.display());
                self.status.clear();
            }
            Err(e) => {
                tracing::warn!("{e}");
                self.status = e.to_string();
            }
        }
    }
}

/// 80% of the detected monitor size, or a fixed bound when unknown.
fn viewport_bound(ctx: &egui::Context) -> (u32, u32) {
    match ctx.input(|i| i.viewport().monitor_size) {
        Some(size) if size.x >= 1.0 && size.y >= 1.0 => (
            (size.x * VIEWPORT_SHARE) as u32,
            (size.y * VIEWPORT_SHARE) as u32,
        ),
        _ => FALLBACK_BOUND,
    }
}

impl App for UiApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        if self.session.is_finished() {
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }
        self.refresh_current(ctx);

        egui::TopBottomPanel::bottom("labels").show(ctx, |ui| {
            ui.add_space(6.0);
            ui.horizontal(|ui| {
                for label in Label::ALL {
                    let button =
                        egui::Button::new(label.caption()).min_size(egui::vec2(100.0, 50.0));
                    if ui.add(button).clicked() {
                        self.apply_label(label);
                    }
                }
                if !self.status.is_empty() {
                    ui.label(&self.status);
                }
            });
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(current) = &self.current {
                let (w, h) = fit_display(current.natural, viewport_bound(ctx));
                let sized = egui::load::SizedTexture::new(
                    current.texture.id(),
                    egui::vec2(w as f32, h as f32),
                );
                ui.centered_and_justified(|ui| {
                    ui.image(sized);
                });
            } else if let Some(msg) = &self.decode_failure {
                ui.centered_and_justified(|ui| {
                    ui.label(msg);
                });
            }
        });
    }
}
