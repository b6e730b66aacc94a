use audio_visualizer::{args::Args, server, state::AppState};
use clap::Parser as _;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Handle commandline arguments.
    let opt = Args::parse();
    simple_logger::init_with_level(opt.log_level).unwrap();

    let state = Arc::new(AppState::new(&opt)?);
    server::serve(state, opt.addr).await
}
