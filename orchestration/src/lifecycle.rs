//! Driver lifecycle
//!
//! Runs one action against a driver: bind the plugin to the workspace, start
//! its service, build the parameter set and interpret the result. Stopping
//! the service is left to the release actions of the caller.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::driver::{Driver, DriverOptions};
use crate::error::{ForgeError, ForgeResult, Outcome, ResourceConflict};
use crate::workspace::Workspace;

/// Run `action` on `driver`.
///
/// Writes `driver.result` and, on success, the options the driver returned
/// into `options`. A conflict result is stored too and reported as
/// [`Outcome::Conflict`].
pub async fn run_action(
    driver: &mut Driver,
    workspace: &Workspace,
    options: &mut DriverOptions,
    action: &str,
) -> ForgeResult<Outcome> {
    debug!(driver = %driver.name, action, "Starting driver action");

    driver.plugin.init(workspace.path())?;
    driver
        .plugin
        .set_source_path(workspace.source_path(&driver.category));
    driver
        .plugin
        .set_workspace_path(workspace.path().to_path_buf());
    driver.plugin.set_socket_path(workspace.socket_path());
    driver.plugin.start_service().await?;

    let params = action_parameters(driver, options, action);
    let result = driver.plugin.run_action(action, &params).await?;

    if result.is_failure() {
        let message = if result.data.error_message.is_empty() {
            format!("'{action}' returned state code {}", result.state_code)
        } else {
            result.data.error_message.clone()
        };
        return Err(ForgeError::driver(&driver.name, message));
    }

    if result.is_conflict() {
        let conflict = ResourceConflict {
            driver: driver.name.clone(),
            action: action.to_string(),
            message: result.data.error_message.clone(),
        };
        warn!(driver = %driver.name, action, "Driver reported an existing resource");
        driver.result = Some(result);
        return Ok(Outcome::Conflict(conflict));
    }

    println!("{}:\n{}", driver.name, result.data.status);
    options.add(&driver.name, &driver.category, &result.data.options);
    info!(
        driver = %driver.name,
        action,
        files = result.data.files.len(),
        "Driver action completed"
    );
    driver.result = Some(result);
    Ok(Outcome::Done)
}

/// Stored options first, then common parameters, then those of `action`.
fn action_parameters(
    driver: &Driver,
    options: &DriverOptions,
    action: &str,
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    options.maintain_parameters(&driver.name, &mut params);
    params.extend(
        driver
            .params
            .common
            .iter()
            .map(|(k, v)| (k.clone(), v.clone())),
    );
    if let Some(specific) = driver.params.for_action(action) {
        params.extend(specific.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    params
}

/// Stop the driver service.
pub async fn stop(driver: &mut Driver) -> ForgeResult<()> {
    debug!(driver = %driver.name, "Stopping driver service");
    driver.plugin.stop_service().await
}
