//! A headless bot client for beta-era voxel game servers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod net;

pub mod world;
pub mod movement;

// This module links the previous ones into the bot's logic.
pub mod bot;


pub fn main() {

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    let running = Arc::new(AtomicBool::new(true));
    let handler_running = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || handler_running.store(false, Ordering::Relaxed)) {
        warn!("failed to set ctrl-c handler: {e}");
    }

    let addr = config::server_addr();
    let mut bot = match bot::Bot::connect(addr, config::username()) {
        Ok(bot) => bot,
        Err(e) => {
            error!("failed to connect to {addr}: {e}");
            std::process::exit(1);
        }
    };

    let mut quitting = false;
    while !bot.is_lost() {

        // Keep ticking after quitting, the lost event follows the disconnection.
        if !quitting && !running.load(Ordering::Relaxed) {
            bot.quit();
            quitting = true;
        }

        bot.tick_padded();

    }

    info!("bot stopped");

}
