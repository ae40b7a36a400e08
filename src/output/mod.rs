//! Styled terminal output for the dcmigrate CLI

use chrono::{DateTime, Local};
use owo_colors::OwoColorize;

/// Print a success message with a green checkmark
pub fn success(message: &str) {
    // Pastel mint green: RGB(152, 225, 152)
    println!(
        "{} {}",
        "✓".truecolor(152, 225, 152).bold(),
        message.bright_white()
    );
}

/// Print an error message with a red X
pub fn error(message: &str) {
    // Pastel coral/salmon: RGB(255, 160, 160)
    eprintln!(
        "{} {}",
        "✗".truecolor(255, 160, 160).bold(),
        message.bright_white()
    );
}

/// Print a warning message with a yellow warning symbol
pub fn warning(message: &str) {
    // Pastel cream/yellow: RGB(255, 230, 160)
    println!(
        "{} {}",
        "⚠".truecolor(255, 230, 160).bold(),
        message.bright_white()
    );
}

/// Print an info message with a blue info symbol
pub fn info(message: &str) {
    // Pastel sky blue: RGB(160, 200, 255)
    println!(
        "{} {}",
        "ℹ".truecolor(160, 200, 255).bold(),
        message.bright_white()
    );
}

/// Print a section header with a separator line
pub fn section(title: &str) {
    // Pastel lavender: RGB(181, 174, 254)
    println!("\n{}", title.truecolor(181, 174, 254).bold());
    // Brighter grey: RGB(160, 160, 160)
    println!("{}", "─".repeat(50).truecolor(160, 160, 160));
}

/// Print a key-value pair with styled key and value
pub fn key_value(key: &str, value: &str) {
    // Brighter grey: RGB(160, 160, 160)
    println!(
        "  {} {}",
        format!("{}:", key).truecolor(160, 160, 160),
        value.bright_white()
    );
}

/// Print a stage indicator
pub fn step(number: usize, total: usize, description: &str) {
    // Pastel lavender: RGB(181, 174, 254)
    println!(
        "\n{} {}",
        format!("[{}/{}]", number, total)
            .truecolor(181, 174, 254)
            .bold(),
        description.bright_white()
    );
}

/// Print a timestamped progress line
pub fn progress(timestamp: &DateTime<Local>, message: &str) {
    // Brighter grey: RGB(160, 160, 160)
    println!(
        "  {} {}",
        timestamp.format("%H:%M:%S").to_string().truecolor(160, 160, 160),
        message.bright_white()
    );
}

/// Print a path with proper styling
pub fn path(path_str: &str) {
    // Softer pastel teal: RGB(120, 180, 195)
    println!("  {}", path_str.truecolor(120, 180, 195));
}
