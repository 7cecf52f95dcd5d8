use anyhow::Result;
use log::LevelFilter;

pub mod config;
pub mod flights;
pub mod handler;
pub mod llm;
pub mod notify;
pub mod store;
pub mod types;

pub const APP_NAME: &str = "flightalerts";

pub fn set_up_logger(module: &str, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .filter_module(module, level)
        .filter_module(APP_NAME, level)
        .try_init()?;

    Ok(())
}
