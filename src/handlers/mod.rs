//! The built-in handler table.
//!
//! Definition files name their entry points; these two lookups bind those
//! names to code at load time. Adding a handler means adding a function and
//! a row here; the definition files on disk decide which of them are live,
//! in which audience, under which schema.

mod general;
mod orders;
mod tasks;

use crate::errors::{Error, Result};
use crate::platform::{CommandInvocation, ComponentClick, Interaction, ModalSubmission};
use crate::registry::{CommandHandler, TaskRun};

pub fn command_handler(name: &str) -> Option<CommandHandler> {
    Some(match name {
        "ping" => general::ping,
        "help" => general::help,
        "unlock" => general::unlock,
        "order_open" => orders::open,
        "order_submit" => orders::submit,
        "order_list" => orders::list,
        "order_claim" => orders::claim,
        _ => return None,
    })
}

pub fn task_run(name: &str) -> Option<TaskRun> {
    Some(match name {
        "heartbeat" => tasks::heartbeat,
        "purge_stale_orders" => tasks::purge_stale_orders,
        "order_digest" => tasks::order_digest,
        _ => return None,
    })
}

fn expect_command<'a>(interaction: &'a Interaction) -> Result<&'a CommandInvocation> {
    match interaction {
        Interaction::Command(cmd) => Ok(cmd),
        _ => Err(Error::Dispatch(
            "handler expects a slash-command invocation".to_string(),
        )),
    }
}

fn expect_modal<'a>(interaction: &'a Interaction) -> Result<&'a ModalSubmission> {
    match interaction {
        Interaction::Modal(modal) => Ok(modal),
        _ => Err(Error::Dispatch(
            "handler expects a modal submission".to_string(),
        )),
    }
}

fn expect_component<'a>(interaction: &'a Interaction) -> Result<&'a ComponentClick> {
    match interaction {
        Interaction::Component(click) => Ok(click),
        _ => Err(Error::Dispatch(
            "handler expects a component interaction".to_string(),
        )),
    }
}

#[cfg(test)]
mod table_tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        for name in [
            "ping",
            "help",
            "unlock",
            "order_open",
            "order_submit",
            "order_list",
            "order_claim",
        ] {
            assert!(command_handler(name).is_some(), "{name} should resolve");
        }
        for name in ["heartbeat", "purge_stale_orders", "order_digest"] {
            assert!(task_run(name).is_some(), "{name} should resolve");
        }
    }

    #[test]
    fn unknown_names_do_not_resolve() {
        assert!(command_handler("no_such_handler").is_none());
        assert!(task_run("no_such_run").is_none());
        // Command and task tables are separate namespaces.
        assert!(command_handler("heartbeat").is_none());
        assert!(task_run("ping").is_none());
    }
}
