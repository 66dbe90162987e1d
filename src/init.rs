use crate::config::HookConfig;
use crate::error::{HookError, InitError};
use crate::hook::StreamHook;
use crate::layer::StreamLayer;
use crate::sink::StreamSink;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Initialize the global `tracing` subscriber with a [`StreamLayer`]
/// built from `sink` and `config`.
///
/// **Parameters**
/// - `sink`: remote stream the hook delivers to.
/// - `config`: validated [`HookConfig`]. Queued delivery requires this
///   to be called from within a tokio runtime.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is
///   installed alongside, so events are also printed to the console.
///
/// **Returns**
///
/// The [`StreamHook`] behind the layer, for adjusting levels and for
/// [`StreamHook::shutdown`] before the process exits.
pub fn init_tracing_with_config(
    sink: Arc<dyn StreamSink>,
    config: HookConfig,
    enable_stdout: bool,
) -> Result<StreamHook, InitError> {
    let hook = StreamHook::new(sink, config)?;
    let layer = StreamLayer::new(hook.clone());

    // The two subscriber shapes have different types, so each is
    // installed in its own branch.
    if enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(hook)
}

/// Initialize tracing with queued delivery to `destination` and
/// otherwise default settings, plus console output.
pub fn init_tracing(
    sink: Arc<dyn StreamSink>,
    destination: impl Into<String>,
) -> Result<StreamHook, InitError> {
    let config = HookConfig::builder(destination)
        .queued()
        .build()
        .map_err(HookError::from)?;
    init_tracing_with_config(sink, config, true)
}
