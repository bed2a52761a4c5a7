//! `medguard run`: run the reconciler on its interval until Ctrl-C.

use std::sync::Arc;

use tracing::info;

use crate::cli::{build_reconciler, load_keys, load_settings, open_store, output, Cli};
use crate::errors::{MedGuardError, Result};
use crate::reconciler;

/// Execute the `run` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli)?;
    let keys = Arc::new(load_keys()?);
    let store = Arc::new(open_store(&settings)?);
    let reconciler = Arc::new(build_reconciler(&settings, store, keys));
    let interval = settings.reconcile_interval();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| MedGuardError::CommandFailed(format!("tokio runtime: {e}")))?;

    output::info(&format!(
        "Reconciling {} every {}s (Ctrl-C to stop)",
        settings.database_path.display(),
        interval.as_secs()
    ));

    runtime.block_on(async move {
        let handle = reconciler::spawn(reconciler, interval);
        let signal = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
        handle.stop().await;
        signal.map_err(|e| MedGuardError::CommandFailed(format!("signal handler: {e}")))
    })?;

    output::success("Reconciler stopped.");
    Ok(())
}
