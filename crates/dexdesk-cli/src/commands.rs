//! Resource screens: list, show, create, update, delete and dropdown for
//! tokens, liquidity pools and trades.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use dexdesk_core::models::{LiquidityPool, Page, Resource, ResourceModel, Token, Trade};
use dexdesk_core::routes::Route;

use crate::app::App;
use crate::utils::{format_amount, format_optional_amount, truncate_string};

/// Table rendering for a resource.
pub trait TableRow {
    fn header() -> String;
    fn row(&self) -> String;
}

impl TableRow for Token {
    fn header() -> String {
        format!(
            "{:<6} {:<20} {:<8} {:>4} {:>16} {:>16} {:>12}",
            "ID", "NAME", "TICKER", "DEC", "TOTAL SUPPLY", "CIRCULATING", "PRICE"
        )
    }

    fn row(&self) -> String {
        format!(
            "{:<6} {:<20} {:<8} {:>4} {:>16} {:>16} {:>12}",
            self.id,
            truncate_string(&self.name, 20),
            truncate_string(self.ticker_symbol.as_deref().unwrap_or("-"), 8),
            self.decimal_place,
            format_amount(self.total_supply),
            format_amount(self.circulating_supply),
            format_optional_amount(self.price),
        )
    }
}

impl TableRow for LiquidityPool {
    fn header() -> String {
        format!(
            "{:<6} {:<18} {:>16} {:>16} {:>8}",
            "ID", "PAIR", "RESERVE 1", "RESERVE 2", "FEE"
        )
    }

    fn row(&self) -> String {
        format!(
            "{:<6} {:<18} {:>16} {:>16} {:>8}",
            self.id,
            truncate_string(&self.pair(), 18),
            format_amount(self.reserve1),
            format_amount(self.reserve2),
            format_optional_amount(self.fee_rate),
        )
    }
}

impl TableRow for Trade {
    fn header() -> String {
        format!(
            "{:<6} {:<25} {:<8} {:>14} {:<8} {:>14} {:>10}",
            "ID", "TIMESTAMP", "TOKEN 1", "AMOUNT 1", "TOKEN 2", "AMOUNT 2", "FEE"
        )
    }

    fn row(&self) -> String {
        format!(
            "{:<6} {:<25} {:<8} {:>14} {:<8} {:>14} {:>10}",
            self.id,
            truncate_string(&self.timestamp, 25),
            truncate_string(&self.token1.ticker_symbol, 8),
            format_amount(self.amount1),
            truncate_string(&self.token2.ticker_symbol, 8),
            format_amount(self.amount2),
            format_amount(self.fee),
        )
    }
}

pub fn route_for<M: ResourceModel>() -> Route {
    match M::RESOURCE {
        Resource::Tokens => Route::Tokens,
        Resource::LiquidityPools => Route::LiquidityPools,
        Resource::Trades => Route::Trades,
    }
}

pub fn render_page<M: TableRow>(page: &Page<M>, page_index: u32, limit: u32) -> String {
    let mut out = String::new();
    out.push_str(&M::header());
    out.push('\n');
    for item in &page.result {
        out.push_str(&item.row());
        out.push('\n');
    }
    out.push_str(&format!(
        "Page {} of {} ({} total)",
        page_index + 1,
        page.page_count(limit).max(1),
        page.total
    ));
    out
}

fn parse_input<M>(json: &str) -> Result<M::Input>
where
    M: ResourceModel,
    M::Input: DeserializeOwned,
{
    serde_json::from_str(json)
        .with_context(|| format!("Invalid {} JSON", M::RESOURCE.display_name().to_lowercase()))
}

pub async fn list<M: ResourceModel + TableRow>(
    app: &mut App,
    page: u32,
    limit: Option<u32>,
    search: Option<&str>,
) -> Result<()> {
    app.require_session(route_for::<M>()).await?;
    let limit = limit.unwrap_or(app.config.page_size);
    let result = app
        .queries::<M>()
        .list(page, limit, search)
        .await
        .map_err(|e| anyhow::anyhow!(e.display_message("Could not load list")))?;
    println!("{}", render_page(&result, page, limit));
    Ok(())
}

pub async fn show<M: ResourceModel>(app: &mut App, id: i64) -> Result<()> {
    app.require_session(route_for::<M>()).await?;
    let item = app
        .queries::<M>()
        .get(id)
        .await
        .map_err(|e| anyhow::anyhow!(e.display_message("Something went wrong while loading")))?;
    println!("{}", serde_json::to_string_pretty(&item)?);
    Ok(())
}

pub async fn create<M>(app: &mut App, json: &str) -> Result<()>
where
    M: ResourceModel,
    M::Input: DeserializeOwned,
{
    let input = parse_input::<M>(json)?;
    app.require_session(route_for::<M>()).await?;
    let created = app
        .queries::<M>()
        .create(&input)
        .await
        .map_err(|e| anyhow::anyhow!(e.display_message("Something went wrong while create")))?;
    println!("{} created", M::RESOURCE.display_name());
    println!("{}", serde_json::to_string_pretty(&created)?);
    Ok(())
}

pub async fn update<M>(app: &mut App, id: i64, json: &str) -> Result<()>
where
    M: ResourceModel,
    M::Input: DeserializeOwned,
{
    let input = parse_input::<M>(json)?;
    app.require_session(route_for::<M>()).await?;
    let updated = app
        .queries::<M>()
        .update(id, &input)
        .await
        .map_err(|e| anyhow::anyhow!(e.display_message("Something went wrong while update")))?;
    println!("{} updated", M::RESOURCE.display_name());
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

pub async fn delete<M: ResourceModel>(app: &mut App, id: i64) -> Result<()> {
    app.require_session(route_for::<M>()).await?;
    app.queries::<M>()
        .delete(id)
        .await
        .map_err(|e| anyhow::anyhow!(e.display_message("Something went wrong while delete")))?;
    println!("{} deleted successfully", M::RESOURCE.display_name());
    Ok(())
}

pub async fn dropdown<M: ResourceModel>(app: &mut App, keyword: Option<&str>) -> Result<()> {
    app.require_session(route_for::<M>()).await?;
    let items = app
        .queries::<M>()
        .dropdown(keyword)
        .await
        .map_err(|e| anyhow::anyhow!(e.display_message("Could not load options")))?;
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}
