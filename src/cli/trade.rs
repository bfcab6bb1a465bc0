use super::ui::{self, StyleType};
use crate::core::currency::USD;
use crate::core::{Exchange, TradeReceipt, TradeSide};
use anyhow::Result;

impl TradeReceipt {
    pub fn display(&self) -> String {
        let code = &self.currency_code;
        let (verb, sign, usd_label) = match self.side {
            TradeSide::Buy => ("Bought", "+", "Cost"),
            TradeSide::Sell => ("Sold", "-", "Proceeds"),
        };
        format!(
            "{verb} {} {code} at {:.2} {USD}/{code}\n\
             {usd_label}: {:.2} {USD}\n\
             Portfolio change: {sign}{} {code} (now {} {code}, {:.2} {USD})",
            ui::format_amount(self.amount),
            self.rate,
            self.usd_delta,
            ui::format_amount(self.amount),
            ui::format_amount(self.new_balance),
            self.new_usd_balance,
        )
    }
}

pub async fn buy(exchange: &Exchange, currency: &str, amount: f64) -> Result<()> {
    let user = exchange.current_user()?;
    let receipt = exchange.buy(user.user_id, currency, amount).await?;
    println!("{}", ui::style_text("Purchase complete", StyleType::Success));
    println!("{}", receipt.display());
    Ok(())
}

pub async fn sell(exchange: &Exchange, currency: &str, amount: f64) -> Result<()> {
    let user = exchange.current_user()?;
    let receipt = exchange.sell(user.user_id, currency, amount).await?;
    println!("{}", ui::style_text("Sale complete", StyleType::Success));
    println!("{}", receipt.display());
    Ok(())
}

pub async fn deposit(exchange: &Exchange, currency: &str, amount: f64) -> Result<()> {
    let user = exchange.current_user()?;
    let balance = exchange.deposit(user.user_id, currency, amount).await?;
    println!(
        "Deposited {} {}. New balance: {}",
        ui::format_amount(amount),
        currency.trim().to_uppercase(),
        ui::style_text(&ui::format_amount(balance), StyleType::Amount)
    );
    Ok(())
}
