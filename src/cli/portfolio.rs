use super::ui::{self, StyleType};
use crate::core::{Exchange, Valuation};
use anyhow::Result;
use comfy_table::Cell;

impl Valuation {
    pub fn display_as_table(&self, username: &str) -> String {
        let base = &self.base;
        let mut output = format!(
            "Portfolio of {} (base: {base})\n\n",
            ui::style_text(username, StyleType::Title)
        );

        if self.lines.is_empty() {
            output.push_str(&ui::style_text("No wallets yet", StyleType::Hint));
            return output;
        }

        let value_header = format!("Value ({base})");
        let mut table = ui::new_table(&["Currency", "Balance", &value_header]);
        for line in &self.lines {
            table.add_row(vec![
                Cell::new(&line.currency_code),
                ui::number_cell(ui::format_amount(line.balance)),
                ui::value_cell(line.value),
            ]);
        }
        output.push_str(&table.to_string());

        output.push_str(&format!(
            "\n\nTotal ({}): {}",
            ui::style_text(base, StyleType::Label),
            ui::style_text(&format!("{:.2}", self.total), StyleType::Amount)
        ));
        if !self.unpriced.is_empty() {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(
                    &format!("No rate to {base} for: {}", self.unpriced.join(", ")),
                    StyleType::Warning
                )
            ));
        }
        output
    }
}

pub async fn show(exchange: &Exchange, base: Option<&str>) -> Result<()> {
    let user = exchange.current_user()?;
    let base = base.unwrap_or(&exchange.config().base_currency);
    let valuation = exchange.valuation(user.user_id, base).await?;
    println!("{}", valuation.display_as_table(&user.username));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projection::ValuationLine;

    #[test]
    fn test_display_lists_unpriced_wallets() {
        let valuation = Valuation {
            base: "USD".to_string(),
            lines: vec![
                ValuationLine {
                    currency_code: "BTC".to_string(),
                    balance: 0.5,
                    value: Some(25000.0),
                },
                ValuationLine {
                    currency_code: "JPY".to_string(),
                    balance: 1000.0,
                    value: None,
                },
            ],
            total: 25000.0,
            unpriced: vec!["JPY".to_string()],
        };
        let text = valuation.display_as_table("alice");
        assert!(text.contains("BTC"));
        assert!(text.contains("25000.00"));
        assert!(text.contains("N/A"));
        assert!(text.contains("No rate to USD for: JPY"));
    }

    #[test]
    fn test_display_empty_portfolio() {
        let valuation = Valuation {
            base: "USD".to_string(),
            lines: vec![],
            total: 0.0,
            unpriced: vec![],
        };
        assert!(valuation.display_as_table("bob").contains("No wallets yet"));
    }
}
