//! Order inspection and status commands.

use clap::Subcommand;
use greatkart_core::OrderStatus;

/// Sub-commands available under `orders`.
#[derive(Debug, Subcommand)]
pub enum OrdersCommands {
    /// Show the most recent orders, paid or not
    List {
        /// Maximum number of orders to show
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Change an order's fulfilment status (payment state is untouched)
    SetStatus {
        #[arg(long)]
        order_number: String,
        /// One of New, Accepted, Completed, Cancelled
        #[arg(long, value_parser = parse_status)]
        status: OrderStatus,
    },
}

fn parse_status(value: &str) -> Result<OrderStatus, String> {
    value.parse()
}

pub(crate) async fn run_list(pool: &sqlx::PgPool, limit: u32) -> anyhow::Result<()> {
    let orders = greatkart_db::list_recent_orders(pool, i64::from(limit)).await?;

    if orders.is_empty() {
        println!("no orders yet");
        return Ok(());
    }

    println!(
        "{:<16}{:<18}{:<26}{:<12}{:<6}TOTAL",
        "ORDER", "PLACED", "CUSTOMER", "STATUS", "PAID"
    );
    for order in &orders {
        let placed = order.created_at.format("%Y-%m-%d %H:%M").to_string();
        let paid = if order.is_ordered { "yes" } else { "no" };
        println!(
            "{:<16}{:<18}{:<26}{:<12}{:<6}{}",
            order.order_number,
            placed,
            order.full_name(),
            order.status,
            paid,
            order.order_total
        );
    }

    Ok(())
}

pub(crate) async fn run_set_status(
    pool: &sqlx::PgPool,
    order_number: &str,
    status: OrderStatus,
) -> anyhow::Result<()> {
    let order = match greatkart_db::update_order_status(pool, order_number, status).await {
        Ok(order) => order,
        Err(greatkart_db::DbError::NotFound) => {
            anyhow::bail!("order '{order_number}' not found")
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(order_number, status = %status, "order status changed");
    println!("order {} is now {}", order.order_number, order.status);
    Ok(())
}
