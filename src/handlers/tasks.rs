//! Task entry points driven by the scheduler.

use crate::context::AppContext;
use crate::db::SqlValue;
use crate::platform::Reply;
use crate::registry::{HandlerFuture, TaskSpec};
use tracing::{debug, info};

/// Liveness marker in the operator log.
pub fn heartbeat<'a>(_ctx: &'a AppContext, spec: &'a TaskSpec) -> HandlerFuture<'a> {
    Box::pin(async move {
        debug!(task = %spec.name, "heartbeat");
        Ok(())
    })
}

/// Remove fulfilled orders and their claims.
pub fn purge_stale_orders<'a>(ctx: &'a AppContext, spec: &'a TaskSpec) -> HandlerFuture<'a> {
    Box::pin(async move {
        let done = ctx.rows.select_where(
            "orders",
            &[("status", SqlValue::Text("done".to_string()))],
            None,
        )?;
        let mut purged = 0usize;
        for row in &done {
            let Some(id) = row.get("id").and_then(SqlValue::as_i64) else {
                continue;
            };
            for claim in ctx
                .rows
                .select_where("claims", &[("order_id", SqlValue::Integer(id))], None)?
            {
                if let Some(supplier) = claim.get("supplier_id").and_then(SqlValue::as_str) {
                    ctx.rows.delete_row(
                        "claims",
                        &[
                            ("order_id", SqlValue::Integer(id)),
                            ("supplier_id", SqlValue::Text(supplier.to_string())),
                        ],
                    )?;
                }
            }
            purged += ctx
                .rows
                .delete_row("orders", &[("id", SqlValue::Integer(id))])?;
        }
        if purged > 0 {
            info!(task = %spec.name, purged, "fulfilled orders purged");
        }
        Ok(())
    })
}

/// DM every admin a summary of the open order book.
pub fn order_digest<'a>(ctx: &'a AppContext, spec: &'a TaskSpec) -> HandlerFuture<'a> {
    Box::pin(async move {
        let open = ctx.rows.select_where(
            "orders",
            &[("status", SqlValue::Text("open".to_string()))],
            None,
        )?;
        let claimed = ctx.rows.select_where(
            "orders",
            &[("status", SqlValue::Text("claimed".to_string()))],
            None,
        )?;
        let summary = format!(
            "Order digest: {} open, {} claimed.",
            open.len(),
            claimed.len()
        );
        for admin in &ctx.config.admins {
            ctx.notifier
                .direct_message(*admin, Reply::plain(summary.clone()))
                .await?;
        }
        debug!(task = %spec.name, open = open.len(), claimed = claimed.len(), "digest sent");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_context;
    use chrono::Utc;

    fn spec(name: &str) -> TaskSpec {
        TaskSpec {
            name: name.to_string(),
            interval_minutes: Some(60),
            times: Vec::new(),
            auto_start: false,
            run_on_start: false,
            repeat: 0,
            not_reset_on_reload: false,
        }
    }

    fn insert_order(ctx: &AppContext, item: &str, status: &str) -> i64 {
        ctx.rows
            .insert_row(
                "orders",
                &[
                    ("item", SqlValue::Text(item.to_string())),
                    ("requester_id", SqlValue::Text("1".to_string())),
                    ("status", SqlValue::Text(status.to_string())),
                    ("created_at", SqlValue::Text(Utc::now().to_rfc3339())),
                ],
            )
            .expect("insert order")
    }

    #[tokio::test]
    async fn purge_removes_done_orders_and_their_claims() {
        let (ctx, _harness) = test_context().await;
        let done_id = insert_order(&ctx, "old gear", "done");
        insert_order(&ctx, "fresh gear", "open");
        ctx.rows
            .insert_row(
                "claims",
                &[
                    ("order_id", SqlValue::Integer(done_id)),
                    ("supplier_id", SqlValue::Text("5".to_string())),
                    ("claimed_at", SqlValue::Text(Utc::now().to_rfc3339())),
                ],
            )
            .expect("insert claim");

        purge_stale_orders(&ctx, &spec("purge")).await.unwrap();

        let orders = ctx.rows.select_where("orders", &[], None).expect("select");
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["item"], SqlValue::Text("fresh gear".to_string()));
        assert!(
            ctx.rows
                .select_where("claims", &[], None)
                .expect("select")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn digest_dms_every_admin() {
        let (ctx, harness) = test_context().await;
        insert_order(&ctx, "gear", "open");
        insert_order(&ctx, "plank", "open");
        insert_order(&ctx, "ingot", "claimed");

        order_digest(&ctx, &spec("digest")).await.unwrap();

        let dms = harness.notifier.direct_messages();
        // The test context configures a single admin (42).
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].0, 42);
        assert!(dms[0].1.content.contains("2 open"));
        assert!(dms[0].1.content.contains("1 claimed"));
    }
}
