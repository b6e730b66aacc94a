use clap::{
    builder::{PossibleValuesParser, TypedValueParser as _},
    Parser,
};
use log::Level;
use std::{net::SocketAddr, path::PathBuf};

#[derive(Parser, Debug)]
#[command(version, about = "Displays audio plots.", long_about = None)]
pub struct Args {
    /// The address to listen on.
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    pub addr: SocketAddr,

    /// Base directory for per-session uploads and generated images.
    #[arg(short, long, default_value = "media")]
    pub media_root: PathBuf,

    /// Directory holding the front-end assets.
    #[arg(short, long, default_value = "static")]
    pub static_dir: PathBuf,

    /// The logging level to use.
    #[arg(
        short, long, default_value_t = Level::Info,
        // Needed because enum is foreign so can't use ValueEnum derive.
        value_parser = PossibleValuesParser::new(["trace", "debug", "info", "warn", "error"]).map(|s| s.parse::<Level>().unwrap()),
        ignore_case = true
    )]
    pub log_level: Level,

    /// The analysis window length in samples.
    #[arg(short, long, default_value_t = 2048)]
    pub window_len: usize,
}
