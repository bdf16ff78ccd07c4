//! Human-readable progress lines for the deployment CLIs.
//!
//! Every line is `[HH:MM:SS] <symbol> message`. The text is mirrored to
//! `tracing` at debug level so `RUST_LOG=debug` keeps the full history.

use chrono::Local;
use colored::Colorize;
use tracing::debug;

fn stamp() -> String {
    format!("[{}]", Local::now().format("%H:%M:%S"))
}

pub fn step(message: &str) {
    println!("{} {} {}", stamp().dimmed(), "→".cyan(), message.cyan());
    debug!(target: "console", "{}", message);
}

pub fn success(message: &str) {
    println!("{} {} {}", stamp().dimmed(), "✓".green(), message.green());
    debug!(target: "console", "{}", message);
}

pub fn warning(message: &str) {
    println!("{} {} {}", stamp().dimmed(), "⚠".yellow(), message.yellow());
    debug!(target: "console", "{}", message);
}

pub fn failure(message: &str) {
    eprintln!("{} {} {}", stamp().dimmed(), "✗".red(), message.red());
    debug!(target: "console", "{}", message);
}

pub fn plain(message: &str) {
    println!("{} {}", stamp().dimmed(), message);
}
