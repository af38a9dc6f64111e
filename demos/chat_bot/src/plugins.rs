//! Demo plugins.

use std::sync::atomic::{AtomicU64, Ordering};

use kindred::prelude::*;
use serde::Deserialize;
use tracing::info;

/// `!ping` answers `pong`.
pub fn ping() -> PluginDescriptor {
    PluginDescriptor::new("ping", || {
        PluginUnit::builder("ping")
            .command("ping", |ctx: CommandContext| async move { ctx.reply("pong").await })
            .build()
    })
}

/// `!echo <text>` repeats the text back.
pub fn echo() -> PluginDescriptor {
    PluginDescriptor::new("echo", || {
        PluginUnit::builder("echo")
            .command("echo", echo_handler)
            .build()
    })
}

async fn echo_handler(ctx: CommandContext) -> Result<(), BoxError> {
    match ctx.rest() {
        "" => ctx.reply("usage: !echo <text>").await,
        text => ctx.reply(text).await,
    }
}

#[derive(Debug, Deserialize)]
struct CounterConfig {
    #[serde(default = "default_step")]
    step: u64,
}

fn default_step() -> u64 {
    1
}

struct Counter {
    value: AtomicU64,
    step: u64,
}

/// `!count` bumps a counter that lives as long as the plugin is loaded;
/// `!reload counter` starts it over. The step comes from `[plugins.counter]`.
pub fn counter() -> PluginDescriptor {
    PluginDescriptor::new("counter", || {
        PluginUnit::builder("counter")
            .state(|caps: &Capabilities| {
                let step = serde_json::from_value::<CounterConfig>(caps.plugin_config("counter"))
                    .map(|c| c.step)
                    .unwrap_or_else(|_| default_step());
                Counter {
                    value: AtomicU64::new(0),
                    step,
                }
            })
            .command("count", count)
            .on_ready(|ctx: HookContext| async move {
                info!(plugin = %ctx.plugin_name(), "Counter ready");
            })
            .build()
    })
}

async fn count(ctx: CommandContext) -> Result<(), BoxError> {
    let counter = ctx
        .state::<Counter>()
        .ok_or("counter state missing")?;
    let value = counter.value.fetch_add(counter.step, Ordering::SeqCst) + counter.step;
    ctx.reply(&format!("count is {value}")).await
}
