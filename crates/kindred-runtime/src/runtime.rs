//! Runtime orchestration.
//!
//! [`KindredRuntime`] owns the registry, the lifecycle controller and the
//! dispatcher, wires the configured ingress sources into one bounded event
//! queue, and drains that queue one event at a time:
//!
//! 1. load the startup plugins (the builtin `plugins` admin plugin first)
//! 2. broadcast `on_ready`
//! 3. start the IRC session and the webhook server
//! 4. dispatch events until shutdown
//! 5. stop ingress and unload every plugin in reverse load order
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kindred_runtime::KindredRuntime;
//!
//! let runtime = KindredRuntime::builder()
//!     .config_file("kindred.toml")
//!     .plugin(ping::descriptor())
//!     .build()?;
//!
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use kindred_core::plugin::builtin::admin;
use kindred_core::{
    CapabilitiesBuilder, ChatEvent, DispatchOutcome, Dispatcher, LifecycleController,
    PluginDescriptor, SharedRegistry,
};
use kindred_transport::TransportResult;
use tokio::signal;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{ConfigLoader, KindredConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// State consumed by the first call to [`KindredRuntime::run_until`].
struct Pending {
    events: mpsc::Receiver<ChatEvent>,
    startup: Vec<PluginDescriptor>,
    #[cfg(feature = "irc")]
    outbound: Option<mpsc::Receiver<String>>,
}

/// The Kindred runtime.
pub struct KindredRuntime {
    config: KindredConfig,
    controller: Arc<LifecycleController>,
    dispatcher: Dispatcher,
    events_tx: mpsc::Sender<ChatEvent>,
    pending: Mutex<Option<Pending>>,
}

impl KindredRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration, with the admin
    /// plugin and no other startup plugins.
    pub fn from_config(config: KindredConfig) -> RuntimeResult<Self> {
        Self::builder().config(config).build()
    }

    fn assemble(
        config: KindredConfig,
        plugins: Vec<PluginDescriptor>,
        capabilities: CapabilitiesBuilder,
        admin_plugin: bool,
    ) -> RuntimeResult<Self> {
        #[cfg(feature = "irc")]
        let (capabilities, outbound) = if config.irc.enabled {
            let (sink, rx) = kindred_transport::IrcSink::channel(config.irc.outbound_capacity);
            (capabilities.sink(Arc::new(sink)), Some(rx))
        } else {
            (capabilities, None)
        };
        #[cfg(not(feature = "irc"))]
        if config.irc.enabled {
            return Err(RuntimeError::IngressUnavailable("irc"));
        }
        #[cfg(not(feature = "webhook"))]
        if config.webhook.enabled {
            return Err(RuntimeError::IngressUnavailable("webhook"));
        }

        let capabilities = capabilities.plugin_configs(config.plugins.clone()).build();
        let registry = SharedRegistry::new();
        let controller = Arc::new(LifecycleController::new(
            registry.clone(),
            capabilities.clone(),
        ));
        let dispatcher = Dispatcher::new(
            registry,
            capabilities,
            config.dispatch.to_dispatch_config(),
        );

        let mut startup = Vec::with_capacity(plugins.len() + 1);
        if admin_plugin {
            startup.push(admin::descriptor(
                Arc::downgrade(&controller),
                &config.admins,
            ));
        }
        startup.extend(plugins);

        let (events_tx, events) = mpsc::channel(config.dispatch.queue_capacity);

        info!(
            log_level = %config.logging.level,
            irc = config.irc.enabled,
            webhook = config.webhook.enabled,
            plugins = startup.len(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            controller,
            dispatcher,
            events_tx,
            pending: Mutex::new(Some(Pending {
                events,
                startup,
                #[cfg(feature = "irc")]
                outbound,
            })),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &KindredConfig {
        &self.config
    }

    /// Returns the lifecycle controller, for administrative operations from
    /// outside chat.
    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns a sender feeding the ingress queue. Events sent here are
    /// dispatched exactly like events from IRC or the webhook.
    pub fn event_sender(&self) -> mpsc::Sender<ChatEvent> {
        self.events_tx.clone()
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes.
    ///
    /// Fails without starting when a startup plugin cannot be loaded; the
    /// plugins loaded before it are unloaded again.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let Some(pending) = self.pending.lock().await.take() else {
            warn!("Runtime is already running");
            return Err(RuntimeError::AlreadyRunning);
        };
        let Pending {
            mut events,
            startup,
            #[cfg(feature = "irc")]
            outbound,
        } = pending;

        info!("Starting Kindred runtime");

        if let Err(e) = self.controller.load_plugins(startup).await {
            error!(error = %e, "Startup plugin failed to load, aborting start");
            self.controller.teardown().await;
            return Err(e.into());
        }
        self.controller.broadcast_ready().await;

        let token = CancellationToken::new();
        let mut ingress: JoinSet<TransportResult<()>> = JoinSet::new();
        #[cfg(feature = "irc")]
        self.spawn_irc(&mut ingress, outbound, &token);
        #[cfg(feature = "webhook")]
        self.spawn_webhook(&mut ingress, &token);

        info!(ingress = ingress.len(), "Kindred runtime is now running");

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                Some(joined) = ingress.join_next(), if !ingress.is_empty() => {
                    log_ingress_exit(joined);
                }
                event = events.recv() => {
                    // the runtime holds a sender, so the queue never closes
                    let Some(event) = event else { break };
                    self.process(&event).await;
                }
            }
        }

        info!("Stopping Kindred runtime");
        token.cancel();
        while let Some(joined) = ingress.join_next().await {
            log_ingress_exit(joined);
        }
        if !events.is_empty() {
            debug!(dropped = events.len(), "Discarding queued events");
        }
        self.controller.teardown().await;
        info!("Runtime stopped");
        Ok(())
    }

    async fn process(&self, event: &ChatEvent) {
        match self.dispatcher.dispatch(event).await {
            DispatchOutcome::NotCommand => {}
            outcome => trace!(sender = %event.sender, outcome = ?outcome, "Event processed"),
        }
    }

    #[cfg(feature = "irc")]
    fn spawn_irc(
        &self,
        ingress: &mut JoinSet<TransportResult<()>>,
        outbound: Option<mpsc::Receiver<String>>,
        token: &CancellationToken,
    ) {
        let Some(outbound) = outbound else {
            return;
        };
        let options = self.config.irc.to_connect_options();
        debug!(host = %options.host, port = options.port, tls = options.tls, "Starting IRC ingress");
        ingress.spawn(kindred_transport::run_irc(
            options,
            outbound,
            self.events_tx.clone(),
            token.clone(),
        ));
    }

    #[cfg(feature = "webhook")]
    fn spawn_webhook(&self, ingress: &mut JoinSet<TransportResult<()>>, token: &CancellationToken) {
        if !self.config.webhook.enabled {
            return;
        }
        let bind = self.config.webhook.bind_addr();
        let path = self.config.webhook.path.clone();
        let events = self.events_tx.clone();
        let token = token.clone();
        debug!(bind = %bind, path = %path, "Starting webhook ingress");
        ingress.spawn(async move { kindred_transport::serve_webhook(&bind, &path, events, token).await });
    }
}

impl std::fmt::Debug for KindredRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindredRuntime")
            .field("config", &self.config)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

fn log_ingress_exit(joined: Result<TransportResult<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => debug!("Ingress stopped"),
        Ok(Err(e)) => error!(error = %e, "Ingress stopped with error"),
        Err(e) => error!(error = %e, "Ingress task panicked"),
    }
}

/// Waits for Ctrl+C or, on Unix, SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to listen for Ctrl+C, running until killed");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`KindredRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<KindredConfig>,
    plugins: Vec<PluginDescriptor>,
    capabilities: CapabilitiesBuilder,
    admin_plugin: bool,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            plugins: Vec::new(),
            capabilities: CapabilitiesBuilder::default(),
            admin_plugin: true,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: KindredConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Adds a plugin loaded at startup, after the ones added before it.
    pub fn plugin(mut self, descriptor: PluginDescriptor) -> Self {
        self.plugins.push(descriptor);
        self
    }

    /// Provides a typed service to every plugin.
    pub fn service<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.capabilities = self.capabilities.provide(service);
        self
    }

    /// Leaves out the builtin `plugins` admin plugin.
    pub fn without_admin_plugin(mut self) -> Self {
        self.admin_plugin = false;
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads and validates the configuration, then builds the runtime.
    pub fn build(self) -> RuntimeResult<KindredRuntime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        KindredRuntime::assemble(config, self.plugins, self.capabilities, self.admin_plugin)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
