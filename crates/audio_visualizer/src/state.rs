use crate::{args::Args, generate::SpectroParams, store::MediaStore};
use minijinja::Environment;
use std::path::PathBuf;

/// Everything a handler needs, built once at startup and shared behind an
/// `Arc`. There is no other process-wide state.
pub struct AppState {
    pub store: MediaStore,
    pub static_dir: PathBuf,
    pub spectro: SpectroParams,
    templates: Environment<'static>,
}

impl AppState {
    pub fn new(args: &Args) -> anyhow::Result<Self> {
        let mut templates = Environment::new();
        templates.add_template("upload_form.html", include_str!("../templates/upload_form.html"))?;
        templates.add_template("results.html", include_str!("../templates/results.html"))?;

        // The media root must exist before the first session writes into it.
        std::fs::create_dir_all(&args.media_root)?;

        Ok(AppState {
            store: MediaStore::new(args.media_root.clone()),
            static_dir: args.static_dir.clone(),
            spectro: SpectroParams {
                window_len: args.window_len,
            },
            templates,
        })
    }

    /// Render one of the bundled templates.
    pub fn render(&self, name: &str, context: minijinja::Value) -> Result<String, minijinja::Error> {
        self.templates.get_template(name)?.render(context)
    }
}
