use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub enum StyleType {
    Title,
    Label,
    Amount,
    Success,
    Warning,
    Hint,
}

pub fn style_text(text: &str, style_type: StyleType) -> String {
    let styled = match style_type {
        StyleType::Title => style(text).bold().underlined(),
        StyleType::Label => style(text).bold(),
        StyleType::Amount => style(text).green().bold(),
        StyleType::Success => style(text).green(),
        StyleType::Warning => style(text).yellow(),
        StyleType::Hint => style(text).dim(),
    };
    styled.to_string()
}

/// Rounded UTF-8 table with a bold cyan header row.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| {
            Cell::new(h)
                .fg(Color::Cyan)
                .add_attribute(Attribute::Bold)
        }));
    table
}

pub fn number_cell(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// Value in the base currency, or a grey "N/A" when the wallet has no rate.
pub fn value_cell(value: Option<f64>) -> Cell {
    match value {
        Some(v) => number_cell(format!("{v:.2}")),
        None => Cell::new("N/A")
            .fg(Color::DarkGrey)
            .set_alignment(CellAlignment::Right),
    }
}

/// Crypto balances below one unit get eight decimals, everything else four.
pub fn format_amount(value: f64) -> String {
    if value != 0.0 && value.abs() < 1.0 {
        format!("{value:.8}")
    } else {
        format!("{value:.4}")
    }
}

pub fn new_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(spinner_style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
