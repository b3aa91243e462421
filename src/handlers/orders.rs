//! The `/order` command family: a modal-driven order intake, a listing, and
//! a claim button for suppliers.

use super::{expect_command, expect_component, expect_modal};
use crate::context::AppContext;
use crate::db::SqlValue;
use crate::errors::Error;
use crate::ids::CorrelationId;
use crate::platform::{Interaction, ModalDefinition, ModalField, Reply};
use crate::registry::HandlerFuture;
use chrono::Utc;
use tracing::{info, warn};

const TABLE_ORDERS: &str = "orders";
const TABLE_CLAIMS: &str = "claims";

/// Primary handler: open the order intake modal.
pub fn open<'a>(_ctx: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
    Box::pin(async move {
        let cmd = expect_command(interaction)?;
        let modal = ModalDefinition {
            custom_id: CorrelationId::handler(cmd.audience, &cmd.name, "submit").encode(),
            title: "New supply order".to_string(),
            fields: vec![
                ModalField {
                    id: "item".to_string(),
                    label: "Item".to_string(),
                    value: None,
                    required: true,
                    paragraph: false,
                },
                ModalField {
                    id: "quantity".to_string(),
                    label: "Quantity".to_string(),
                    value: Some("1".to_string()),
                    required: true,
                    paragraph: false,
                },
                ModalField {
                    id: "notes".to_string(),
                    label: "Notes".to_string(),
                    value: None,
                    required: false,
                    paragraph: true,
                },
            ],
        };
        cmd.responder.open_modal(&modal).await?;
        Ok(())
    })
}

/// Modal sub-handler: persist the submitted order and post it with a claim
/// button for suppliers.
pub fn submit<'a>(ctx: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
    Box::pin(async move {
        let modal = expect_modal(interaction)?;
        let field = |name: &str| -> Option<&str> {
            modal
                .fields
                .iter()
                .find(|(id, _)| id == name)
                .map(|(_, value)| value.as_str())
        };
        let item = field("item")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Dispatch("order submission without an item".to_string()))?;
        let quantity: i64 = field("quantity")
            .unwrap_or("1")
            .trim()
            .parse()
            .map_err(|_| Error::Dispatch("quantity is not a number".to_string()))?;
        if quantity < 1 {
            return Err(Error::Dispatch("quantity must be at least 1".to_string()));
        }
        let notes = field("notes").map(str::trim).unwrap_or_default();

        let order_id = ctx.rows.insert_row(
            TABLE_ORDERS,
            &[
                ("item", SqlValue::Text(item.to_string())),
                ("quantity", SqlValue::Integer(quantity)),
                (
                    "notes",
                    if notes.is_empty() {
                        SqlValue::Null
                    } else {
                        SqlValue::Text(notes.to_string())
                    },
                ),
                ("requester_id", SqlValue::Text(modal.user.id.to_string())),
                ("status", SqlValue::Text("open".to_string())),
                ("created_at", SqlValue::Text(Utc::now().to_rfc3339())),
            ],
        )?;
        info!(order_id, item, quantity, user = %modal.user.name, "order placed");

        let audience = match CorrelationId::decode(&modal.custom_id)? {
            CorrelationId::Handler { audience, .. } => audience,
            CorrelationId::Recovery { .. } => {
                return Err(Error::Dispatch(
                    "order submission routed with a recovery id".to_string(),
                ));
            }
        };
        let claim_id = CorrelationId::handler_with_args(
            audience,
            "order",
            "claim",
            vec![order_id.to_string()],
        );
        modal
            .responder
            .send(
                Reply::plain(format!(
                    "Order #{order_id}: {quantity}x {item} is open for claims."
                ))
                .with_button(claim_id.encode(), "Claim this order"),
            )
            .await?;
        Ok(())
    })
}

/// List orders, filtered by the optional `status` option (default: open).
pub fn list<'a>(ctx: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
    Box::pin(async move {
        let cmd = expect_command(interaction)?;
        let status = cmd
            .options
            .get("status")
            .and_then(|value| value.as_str())
            .unwrap_or("open");
        if !matches!(status, "open" | "claimed" | "done") {
            cmd.responder
                .send(Reply::ephemeral(format!("Unknown status {status:?}.")))
                .await?;
            return Ok(());
        }
        // Acknowledge first; the listing goes out as an edit of the
        // deferred reply.
        cmd.responder.defer().await?;
        let matching = ctx.rows.select_where(
            TABLE_ORDERS,
            &[("status", SqlValue::Text(status.to_string()))],
            Some(20),
        )?;
        if matching.is_empty() {
            cmd.responder
                .edit(Reply::ephemeral(format!("No {status} orders.")))
                .await?;
            return Ok(());
        }
        let mut lines = vec![format!("{} {status} order(s):", matching.len())];
        for row in &matching {
            let id = row.get("id").and_then(SqlValue::as_i64).unwrap_or_default();
            let item = row.get("item").and_then(SqlValue::as_str).unwrap_or("?");
            let quantity = row
                .get("quantity")
                .and_then(SqlValue::as_i64)
                .unwrap_or(1);
            lines.push(format!("#{id}: {quantity}x {item}"));
        }
        cmd.responder
            .edit(Reply::ephemeral(lines.join("\n")))
            .await?;
        Ok(())
    })
}

/// Component sub-handler: a supplier claims an open order. The order id
/// rides in the correlation id's argument list.
pub fn claim<'a>(ctx: &'a AppContext, interaction: &'a Interaction) -> HandlerFuture<'a> {
    Box::pin(async move {
        let click = expect_component(interaction)?;
        let order_id: i64 = match CorrelationId::decode(&click.custom_id)? {
            CorrelationId::Handler { args, .. } => args
                .first()
                .and_then(|arg| arg.parse().ok())
                .ok_or_else(|| {
                    Error::Dispatch("claim button without an order id".to_string())
                })?,
            CorrelationId::Recovery { .. } => {
                return Err(Error::Dispatch(
                    "claim routed with a recovery id".to_string(),
                ));
            }
        };

        let matching = ctx.rows.select_where(
            TABLE_ORDERS,
            &[
                ("id", SqlValue::Integer(order_id)),
                ("status", SqlValue::Text("open".to_string())),
            ],
            Some(1),
        )?;
        if matching.is_empty() {
            click
                .responder
                .send(Reply::ephemeral(format!(
                    "Order #{order_id} is no longer open."
                )))
                .await?;
            return Ok(());
        }

        ctx.rows.insert_row(
            TABLE_CLAIMS,
            &[
                ("order_id", SqlValue::Integer(order_id)),
                ("supplier_id", SqlValue::Text(click.user.id.to_string())),
                ("claimed_at", SqlValue::Text(Utc::now().to_rfc3339())),
            ],
        )?;
        ctx.rows.update_row(
            TABLE_ORDERS,
            &[("id", SqlValue::Integer(order_id))],
            &[("status", SqlValue::Text("claimed".to_string()))],
        )?;
        info!(order_id, supplier = %click.user.name, "order claimed");

        // Tell the requester; a failed DM must not fail the claim.
        if let Some(requester_id) = matching[0]
            .get("requester_id")
            .and_then(SqlValue::as_str)
            .and_then(|s| s.parse::<u64>().ok())
        {
            let supplier = match ctx.notifier.fetch_user(click.user.id).await {
                Ok(profile) => profile.username,
                Err(_) => click.user.name.clone(),
            };
            if let Err(e) = ctx
                .notifier
                .direct_message(
                    requester_id,
                    Reply::plain(format!(
                        "Your order #{order_id} was claimed by {supplier}."
                    )),
                )
                .await
            {
                warn!(order_id, requester_id, error = %e, "could not notify requester");
            }
        }

        click
            .responder
            .send(Reply::plain(format!(
                "Order #{order_id} claimed by {}.",
                click.user.name
            )))
            .await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{
        CommandInvocation, ComponentClick, MessageRef, ModalSubmission, Responder, UserRef,
    };
    use crate::registry::Audience;
    use crate::test_utils::{RecordingResponder, test_context};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn user(id: u64) -> UserRef {
        UserRef {
            id,
            name: format!("user-{id}"),
        }
    }

    fn order_command(responder: &Arc<RecordingResponder>) -> Interaction {
        Interaction::Command(CommandInvocation {
            audience: Audience::Production,
            name: "order".to_string(),
            user: user(7),
            options: HashMap::new(),
            responder: Arc::clone(responder) as Arc<dyn Responder>,
        })
    }

    fn submission(fields: &[(&str, &str)], responder: &Arc<RecordingResponder>) -> Interaction {
        Interaction::Modal(ModalSubmission {
            custom_id: CorrelationId::handler(Audience::Production, "order", "submit").encode(),
            user: user(7),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            responder: Arc::clone(responder) as Arc<dyn Responder>,
        })
    }

    fn claim_click(custom_id: &str, responder: &Arc<RecordingResponder>) -> Interaction {
        Interaction::Component(ComponentClick {
            custom_id: custom_id.to_string(),
            user: user(8),
            message: MessageRef {
                channel_id: 1,
                message_id: 2,
            },
            responder: Arc::clone(responder) as Arc<dyn Responder>,
        })
    }

    #[tokio::test]
    async fn open_shows_the_intake_modal() {
        let (ctx, _harness) = test_context().await;
        let responder = Arc::new(RecordingResponder::new());
        open(&ctx, &order_command(&responder)).await.unwrap();

        let modals = responder.modals();
        assert_eq!(modals.len(), 1);
        assert_eq!(
            modals[0].custom_id,
            "v1|handler|production|order|submit"
        );
        let ids: Vec<&str> = modals[0].fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["item", "quantity", "notes"]);
    }

    #[tokio::test]
    async fn submit_persists_and_offers_a_claim_button() {
        let (ctx, _harness) = test_context().await;
        let responder = Arc::new(RecordingResponder::new());
        submit(
            &ctx,
            &submission(
                &[("item", "iron ingot"), ("quantity", "64"), ("notes", "")],
                &responder,
            ),
        )
        .await
        .unwrap();

        let stored = ctx
            .rows
            .select_where("orders", &[], None)
            .expect("select");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["item"], SqlValue::Text("iron ingot".to_string()));
        assert_eq!(stored[0]["quantity"], SqlValue::Integer(64));
        assert_eq!(stored[0]["status"], SqlValue::Text("open".to_string()));

        let replies = responder.replies();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].buttons.len(), 1);
        assert!(replies[0].buttons[0].custom_id.starts_with("v1|handler|production|order|claim|"));
    }

    #[tokio::test]
    async fn submit_rejects_bad_quantity() {
        let (ctx, _harness) = test_context().await;
        let responder = Arc::new(RecordingResponder::new());
        let err = submit(
            &ctx,
            &submission(&[("item", "gear"), ("quantity", "lots")], &responder),
        )
        .await
        .expect_err("non-numeric quantity");
        assert!(matches!(err, Error::Dispatch(_)));
        assert!(
            ctx.rows
                .select_where("orders", &[], None)
                .expect("select")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn claim_round_trip() {
        let (ctx, harness) = test_context().await;

        let responder = Arc::new(RecordingResponder::new());
        submit(
            &ctx,
            &submission(&[("item", "plank"), ("quantity", "8")], &responder),
        )
        .await
        .unwrap();
        let claim_button = responder.replies()[0].buttons[0].custom_id.clone();

        let responder = Arc::new(RecordingResponder::new());
        claim(&ctx, &claim_click(&claim_button, &responder))
            .await
            .unwrap();
        assert!(responder.replies()[0].content.contains("claimed by"));

        let orders = ctx
            .rows
            .select_where("orders", &[], None)
            .expect("select");
        assert_eq!(orders[0]["status"], SqlValue::Text("claimed".to_string()));
        let claims = ctx
            .rows
            .select_where("claims", &[], None)
            .expect("select");
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0]["supplier_id"], SqlValue::Text("8".to_string()));

        // The requester (user 7) is told who claimed their order.
        let dms = harness.notifier.direct_messages();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].0, 7);
        assert!(dms[0].1.content.contains("claimed by user-8"));

        // A second claim on the same order reports it as gone.
        let responder = Arc::new(RecordingResponder::new());
        claim(&ctx, &claim_click(&claim_button, &responder))
            .await
            .unwrap();
        assert!(responder.replies()[0].content.contains("no longer open"));
    }

    #[tokio::test]
    async fn list_defers_then_edits_with_open_orders() {
        let (ctx, _harness) = test_context().await;
        let responder = Arc::new(RecordingResponder::new());
        list(&ctx, &order_command(&responder)).await.unwrap();
        assert!(responder.was_deferred());
        assert!(responder.edits()[0].content.contains("No open orders"));

        let submitter = Arc::new(RecordingResponder::new());
        submit(
            &ctx,
            &submission(&[("item", "gear"), ("quantity", "2")], &submitter),
        )
        .await
        .unwrap();

        let responder = Arc::new(RecordingResponder::new());
        list(&ctx, &order_command(&responder)).await.unwrap();
        let content = &responder.edits()[0].content;
        assert!(content.contains("1 open order"));
        assert!(content.contains("2x gear"));
    }

    #[tokio::test]
    async fn list_honors_the_status_option() {
        let (ctx, _harness) = test_context().await;
        let submitter = Arc::new(RecordingResponder::new());
        submit(
            &ctx,
            &submission(&[("item", "gear"), ("quantity", "2")], &submitter),
        )
        .await
        .unwrap();

        let responder = Arc::new(RecordingResponder::new());
        let mut options = HashMap::new();
        options.insert(
            "status".to_string(),
            crate::platform::OptionValue::String("claimed".to_string()),
        );
        let invocation = Interaction::Command(CommandInvocation {
            audience: Audience::Production,
            name: "orders".to_string(),
            user: user(7),
            options,
            responder: Arc::clone(&responder) as Arc<dyn Responder>,
        });
        list(&ctx, &invocation).await.unwrap();
        assert!(responder.edits()[0].content.contains("No claimed orders"));
    }
}
