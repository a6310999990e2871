//! The `cleanup` command

use anyhow::Result;

use super::build_harness;
use crate::output::print_success;

/// Remove labeled DevWorkspaces or namespaces and the automount fixtures
pub async fn cleanup_resources() -> Result<()> {
    let harness = build_harness().await?;
    harness.coordinator.final_cleanup().await;
    print_success(&format!(
        "Cleanup finished for {}",
        if harness.config.separate_namespaces {
            "labeled namespaces".to_string()
        } else {
            format!("namespace {}", harness.config.load_test_namespace)
        }
    ));
    Ok(())
}
