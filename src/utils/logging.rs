use crate::setup::{DbTarget, SetupStatus};
use tracing::debug;

/// Logs the setup status of `target` at DEBUG, with the status as pretty JSON.
pub(crate) fn debug_setup_status(target: &DbTarget, status: &SetupStatus) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    debug!(
        db_target = %target,
        can_open = status.can_open,
        schema_version = status.schema_version,
        "database setup status:\n{}",
        render_setup_status(status)
    );
}

fn render_setup_status(status: &SetupStatus) -> String {
    serde_json::to_string_pretty(status)
        .unwrap_or_else(|error| format!("<setup status not serializable: {error}>"))
}
