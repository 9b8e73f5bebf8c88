mod app;
mod catalog;
mod cli;
mod client;
mod config;
mod coordinator;
mod log;
mod resolver;
mod status;
mod store;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
