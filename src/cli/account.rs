use super::ui::{self, StyleType};
use crate::core::Exchange;
use anyhow::Result;

pub async fn register(exchange: &Exchange, username: &str, password: &str) -> Result<()> {
    let user = exchange.register(username, password).await?;
    println!(
        "User '{}' registered (id={}). Log in with: login --username {} --password ****",
        ui::style_text(&user.username, StyleType::Label),
        user.user_id,
        user.username
    );
    Ok(())
}

pub async fn login(exchange: &Exchange, username: &str, password: &str) -> Result<()> {
    let user = exchange.login(username, password).await?;
    println!(
        "Logged in as '{}'",
        ui::style_text(&user.username, StyleType::Success)
    );
    Ok(())
}

pub fn logout(exchange: &Exchange) -> Result<()> {
    exchange.logout()?;
    println!("Logged out");
    Ok(())
}
