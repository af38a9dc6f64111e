//! The `plugins` admin plugin.
//!
//! Exposes the administrative surface over chat:
//!
//! | command | effect |
//! |---------|--------|
//! | `!plugins` | list loaded plugins in load order |
//! | `!load <name>` | load a defined but unloaded plugin |
//! | `!unload <name>` | unload a plugin |
//! | `!reload <name>` | reload a plugin from its definition |
//! | `!s <text>` | say `text` in the channel, without a mention |
//!
//! Only senders on the admin list may use these commands. Everyone else is
//! ignored without a reply.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use crate::capability::Capabilities;
use crate::context::CommandContext;
use crate::error::BoxError;
use crate::lifecycle::{LifecycleController, LoadOutcome};
use crate::name::normalize;
use crate::plugin::{PluginDescriptor, PluginUnit};

/// Plugin name of the admin plugin.
pub const NAME: &str = "plugins";

struct AdminState {
    controller: Weak<LifecycleController>,
    admins: Arc<HashSet<String>>,
}

/// Builds the descriptor of the admin plugin.
///
/// The controller is held weakly: the controller owns the plugin through the
/// registry, so a strong reference would keep both alive forever.
pub fn descriptor(controller: Weak<LifecycleController>, admins: &[String]) -> PluginDescriptor {
    let admins: Arc<HashSet<String>> = Arc::new(admins.iter().map(|a| normalize(a)).collect());
    PluginDescriptor::new(NAME, move || {
        let controller = controller.clone();
        let admins = Arc::clone(&admins);
        PluginUnit::builder(NAME)
            .state(move |_caps: &Capabilities| AdminState {
                controller: controller.clone(),
                admins: Arc::clone(&admins),
            })
            .command("plugins", list)
            .command("load", load)
            .command("unload", unload)
            .command("reload", reload)
            .command("s", say)
            .build()
    })
}

/// Returns the controller if the sender is an admin and the controller is
/// still alive.
fn authorize(ctx: &CommandContext) -> Option<Arc<LifecycleController>> {
    let state = ctx.state::<AdminState>()?;
    if !state.admins.contains(&normalize(ctx.sender())) {
        debug!(sender = %ctx.sender(), command = %ctx.command(), "Admin command from non-admin ignored");
        return None;
    }
    state.controller.upgrade()
}

async fn list(ctx: CommandContext) -> Result<(), BoxError> {
    let Some(controller) = authorize(&ctx) else {
        return Ok(());
    };
    let names: Vec<String> = controller
        .registry()
        .snapshot()
        .plugins_in_load_order()
        .iter()
        .map(|p| {
            if p.is_degraded() {
                format!("{} (degraded)", p.name())
            } else {
                p.name().to_string()
            }
        })
        .collect();
    ctx.reply(&format!("loaded plugins: {}", names.join(", "))).await
}

async fn load(ctx: CommandContext) -> Result<(), BoxError> {
    let Some(controller) = authorize(&ctx) else {
        return Ok(());
    };
    let Some(target) = ctx.args().next() else {
        return ctx.reply("usage: !load <plugin>").await;
    };
    let message = match controller.load_defined(target).await {
        Ok(outcome) => describe("loaded", target, outcome),
        Err(e) => e.to_string(),
    };
    ctx.reply(&message).await
}

async fn unload(ctx: CommandContext) -> Result<(), BoxError> {
    let Some(controller) = authorize(&ctx) else {
        return Ok(());
    };
    let Some(target) = ctx.args().next() else {
        return ctx.reply("usage: !unload <plugin>").await;
    };
    let message = match controller.unload_plugin(target).await {
        Ok(()) => {
            info!(plugin = %target, by = %ctx.sender(), "Plugin unloaded from chat");
            format!("unloaded {}", normalize(target))
        }
        Err(e) => e.to_string(),
    };
    ctx.reply(&message).await
}

async fn reload(ctx: CommandContext) -> Result<(), BoxError> {
    let Some(controller) = authorize(&ctx) else {
        return Ok(());
    };
    let Some(target) = ctx.args().next() else {
        return ctx.reply("usage: !reload <plugin>").await;
    };
    let message = match controller.reload_plugin(target).await {
        Ok(outcome) => {
            info!(plugin = %target, by = %ctx.sender(), "Plugin reloaded from chat");
            describe("reloaded", target, outcome)
        }
        Err(e) => e.to_string(),
    };
    ctx.reply(&message).await
}

async fn say(ctx: CommandContext) -> Result<(), BoxError> {
    if authorize(&ctx).is_none() {
        return Ok(());
    }
    let text = ctx.rest();
    if text.is_empty() {
        return ctx.reply("usage: !s <text>").await;
    }
    ctx.send(ctx.channel(), text).await
}

fn describe(verb: &str, target: &str, outcome: LoadOutcome) -> String {
    match outcome {
        LoadOutcome::Loaded => format!("{verb} {}", normalize(target)),
        LoadOutcome::Degraded => format!("{verb} {} (degraded, see logs)", normalize(target)),
    }
}
