//! Performance levels and the command-line scale path
//!
//! Candidate levels come from the server's service objectives, falling back to
//! the published Gen2 list. The mutation itself goes either through the
//! management API or through [`CliScaler`], which tries the Azure CLI first and
//! Azure PowerShell second.

use crate::api::{ServiceObjective, SubscriptionClient};
use crate::error::{CoreError, Result};
use crate::model::{PerformanceLevel, Warehouse};
use crate::runner::CommandRunner;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Gen2 dedicated SQL pool service objectives, smallest first
pub const GEN2_LEVELS: &[&str] = &[
    "DW100c", "DW200c", "DW300c", "DW400c", "DW500c", "DW1000c", "DW1500c", "DW2000c", "DW2500c",
    "DW3000c", "DW5000c", "DW6000c", "DW7500c", "DW10000c", "DW15000c", "DW30000c",
];

pub fn static_levels() -> Vec<PerformanceLevel> {
    GEN2_LEVELS.iter().copied().map(PerformanceLevel::new).collect()
}

/// Enabled `DW*` objectives ordered by DWU
pub fn levels_from_objectives(objectives: Vec<ServiceObjective>) -> Vec<PerformanceLevel> {
    let mut levels: Vec<PerformanceLevel> = objectives
        .into_iter()
        .filter(|o| o.enabled && o.name.starts_with("DW"))
        .map(|o| PerformanceLevel::new(o.name))
        .filter(|l| l.dwu().is_some())
        .collect();
    levels.sort_by_key(|l| (l.dwu(), l.name().to_string()));
    levels.dedup();
    levels
}

/// Levels offered for `warehouse`, from the API when it answers with any
pub async fn candidate_levels(
    client: &SubscriptionClient,
    warehouse: &Warehouse,
) -> Vec<PerformanceLevel> {
    match client
        .list_service_objectives(&warehouse.resource_group, &warehouse.server)
        .await
    {
        Ok(objectives) => {
            let levels = levels_from_objectives(objectives);
            if levels.is_empty() {
                warn!(
                    "Server {} lists no warehouse service objectives, using the static list",
                    warehouse.server
                );
                static_levels()
            } else {
                levels
            }
        }
        Err(e) => {
            warn!(
                "Could not list service objectives for {}: {}; using the static list",
                warehouse.server, e
            );
            static_levels()
        }
    }
}

/// Match `requested` against `candidates`, case-insensitively and with or
/// without the `DW` prefix
pub fn resolve_level(candidates: &[PerformanceLevel], requested: &str) -> Result<PerformanceLevel> {
    let wanted = requested.trim();
    candidates
        .iter()
        .find(|l| {
            l.name().eq_ignore_ascii_case(wanted)
                || l.dwu_label().is_some_and(|d| d.eq_ignore_ascii_case(wanted))
        })
        .cloned()
        .ok_or_else(|| {
            let names: Vec<&str> = candidates.iter().map(|l| l.name()).collect();
            CoreError::Validation(format!(
                "Unknown performance level '{}'. Available: {}",
                requested,
                names.join(", ")
            ))
        })
}

/// True when moving from `current` to `target` lowers the DWU
pub fn is_scale_down(current: Option<&PerformanceLevel>, target: &PerformanceLevel) -> bool {
    match (current.and_then(PerformanceLevel::dwu), target.dwu()) {
        (Some(from), Some(to)) => to < from,
        _ => false,
    }
}

const DEPRECATION_MARKERS: &[&str] = &["deprecated", "retired", "gen1", "no longer supported"];
const REGION_MARKERS: &[&str] = &["region", "not available in"];

pub const DEPRECATION_HINT: &str = "The requested level or warehouse generation appears to be retired. Gen1 warehouses must be upgraded to Gen2 before they can be scaled.";
pub const REGION_HINT: &str = "The requested level may not be offered in this region. Pick another level or check regional availability.";
pub const INSTALL_HINT: &str = "Install the Azure CLI (https://aka.ms/installazurecli) or Azure PowerShell (Az module) and sign in.";

/// Extra guidance for a failed command-line scale
pub fn scale_hints(error_text: &str, tool_missing: bool) -> Vec<&'static str> {
    let text = error_text.to_ascii_lowercase();
    let mut hints = Vec::new();
    if DEPRECATION_MARKERS.iter().any(|m| text.contains(m)) {
        hints.push(DEPRECATION_HINT);
    }
    if REGION_MARKERS.iter().any(|m| text.contains(m)) {
        hints.push(REGION_HINT);
    }
    if tool_missing {
        hints.push(INSTALL_HINT);
    }
    hints
}

/// Escape a value for a single-quoted PowerShell string
fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Scales through `az sql dw update`, falling back to `Set-AzSqlDatabase`
pub struct CliScaler {
    runner: Arc<dyn CommandRunner>,
    az: String,
    pwsh: String,
}

enum AttemptError {
    NotStarted(String),
    Failed(String),
}

impl AttemptError {
    fn message(&self) -> &str {
        match self {
            Self::NotStarted(m) | Self::Failed(m) => m,
        }
    }
}

impl CliScaler {
    pub fn new(runner: Arc<dyn CommandRunner>, az: impl Into<String>, pwsh: impl Into<String>) -> Self {
        Self {
            runner,
            az: az.into(),
            pwsh: pwsh.into(),
        }
    }

    pub fn az_args(warehouse: &Warehouse, level: &PerformanceLevel) -> Vec<String> {
        [
            "sql",
            "dw",
            "update",
            "--name",
            &warehouse.name,
            "--resource-group",
            &warehouse.resource_group,
            "--server",
            &warehouse.server,
            "--service-objective",
            level.name(),
            "--subscription",
            &warehouse.subscription_id,
            "--output",
            "none",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    pub fn pwsh_args(warehouse: &Warehouse, level: &PerformanceLevel) -> Vec<String> {
        let script = format!(
            "Set-AzContext -Subscription {} | Out-Null; Set-AzSqlDatabase -ResourceGroupName {} -ServerName {} -DatabaseName {} -RequestedServiceObjectiveName {} | Out-Null",
            ps_quote(&warehouse.subscription_id),
            ps_quote(&warehouse.resource_group),
            ps_quote(&warehouse.server),
            ps_quote(&warehouse.name),
            ps_quote(level.name()),
        );
        vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            script,
        ]
    }

    async fn attempt(&self, program: &str, args: &[String]) -> std::result::Result<(), AttemptError> {
        match self.runner.run(program, args).await {
            Ok(output) if output.success() => Ok(()),
            Ok(output) => Err(AttemptError::Failed(output.failure_message())),
            Err(e) => Err(AttemptError::NotStarted(format!("could not start {}: {}", program, e))),
        }
    }

    /// Run the scale, trying the Azure CLI then PowerShell
    pub async fn scale(&self, warehouse: &Warehouse, level: &PerformanceLevel) -> Result<()> {
        info!("Scaling {} to {} with {}", warehouse.name, level, self.az);
        let az_error = match self.attempt(&self.az, &Self::az_args(warehouse, level)).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!("{} failed: {}", self.az, az_error.message());

        info!("Falling back to {}", self.pwsh);
        let pwsh_error = match self.attempt(&self.pwsh, &Self::pwsh_args(warehouse, level)).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        debug!("{} failed: {}", self.pwsh, pwsh_error.message());

        let combined = format!("{}\n{}", az_error.message(), pwsh_error.message());
        let tool_missing = matches!(az_error, AttemptError::NotStarted(_))
            || matches!(pwsh_error, AttemptError::NotStarted(_));

        let mut message = format!(
            "Azure CLI: {}\nAzure PowerShell: {}",
            az_error.message(),
            pwsh_error.message()
        );
        for hint in scale_hints(&combined, tool_missing) {
            message.push_str("\nHint: ");
            message.push_str(hint);
        }
        Err(CoreError::ExternalTool(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, MockCommandRunner};
    use crate::testing::warehouse;
    use mockall::Sequence;

    fn objective(name: &str, enabled: bool) -> ServiceObjective {
        ServiceObjective {
            name: name.to_string(),
            enabled,
        }
    }

    #[test]
    fn test_static_levels_are_ordered() {
        let levels = static_levels();
        assert_eq!(levels.first().map(|l| l.name()), Some("DW100c"));
        assert_eq!(levels.last().map(|l| l.name()), Some("DW30000c"));
        assert!(levels.windows(2).all(|w| w[0].dwu() < w[1].dwu()));
    }

    #[test]
    fn test_levels_from_objectives_filters_and_sorts() {
        let levels = levels_from_objectives(vec![
            objective("DW1000c", true),
            objective("S0", true),
            objective("DW100c", true),
            objective("DW200c", false),
            objective("ElasticPool", true),
            objective("DW100c", true),
        ]);
        let names: Vec<_> = levels.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["DW100c", "DW1000c"]);
    }

    #[test]
    fn test_resolve_level_accepts_bare_dwu() {
        let levels = static_levels();
        assert_eq!(resolve_level(&levels, "dw500c").unwrap().name(), "DW500c");
        assert_eq!(resolve_level(&levels, "500c").unwrap().name(), "DW500c");
        let err = resolve_level(&levels, "DW123").unwrap_err();
        assert!(err.to_string().contains("Unknown performance level"));
    }

    #[test]
    fn test_scale_down_detection() {
        let from = PerformanceLevel::new("DW1000c");
        assert!(is_scale_down(Some(&from), &PerformanceLevel::new("DW500c")));
        assert!(!is_scale_down(Some(&from), &PerformanceLevel::new("DW1500c")));
        assert!(!is_scale_down(None, &PerformanceLevel::new("DW100c")));
    }

    #[test]
    fn test_hints() {
        assert_eq!(
            scale_hints("Gen1 is no longer supported", false),
            vec![DEPRECATION_HINT]
        );
        assert_eq!(
            scale_hints("Code: RegionDoesNotAllowProvisioning", false),
            vec![REGION_HINT]
        );
        assert_eq!(scale_hints("boom", true), vec![INSTALL_HINT]);
        assert!(scale_hints("boom", false).is_empty());
    }

    #[test]
    fn test_pwsh_args_escape_quotes() {
        let mut w = warehouse("o'brien", "Online");
        w.server = "srv".to_string();
        let args = CliScaler::pwsh_args(&w, &PerformanceLevel::new("DW200c"));
        assert_eq!(args[0], "-NoProfile");
        assert!(args[3].contains("-DatabaseName 'o''brien'"));
        assert!(args[3].contains("-RequestedServiceObjectiveName 'DW200c'"));
    }

    #[tokio::test]
    async fn test_az_success_skips_powershell() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _| program.starts_with("az"))
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    code: Some(0),
                    ..Default::default()
                })
            });

        let scaler = CliScaler::new(Arc::new(runner), "az", "pwsh");
        scaler
            .scale(&warehouse("dw1", "Online"), &PerformanceLevel::new("DW200c"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_falls_back_to_powershell() {
        let mut seq = Sequence::new();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, args| program.starts_with("az") && args.iter().any(|a| a == "DW200c"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(CommandOutput {
                    code: Some(1),
                    stderr: "ERROR: something odd".to_string(),
                    ..Default::default()
                })
            });
        runner
            .expect_run()
            .withf(|program, _| program.starts_with("pwsh"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(CommandOutput {
                    code: Some(0),
                    ..Default::default()
                })
            });

        let scaler = CliScaler::new(Arc::new(runner), "az", "pwsh");
        scaler
            .scale(&warehouse("dw1", "Online"), &PerformanceLevel::new("DW200c"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_both_failures_are_aggregated_with_hints() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _| program.starts_with("az"))
            .returning(|_, _| {
                Ok(CommandOutput {
                    code: Some(1),
                    stderr: "The service objective is not available in this region".to_string(),
                    ..Default::default()
                })
            });
        runner
            .expect_run()
            .withf(|program, _| program.starts_with("pwsh"))
            .returning(|_, _| Err(std::io::Error::from(std::io::ErrorKind::NotFound)));

        let scaler = CliScaler::new(Arc::new(runner), "az", "pwsh");
        let err = scaler
            .scale(&warehouse("dw1", "Online"), &PerformanceLevel::new("DW200c"))
            .await
            .unwrap_err();
        let message = err.to_string();

        assert!(message.contains("Azure CLI: The service objective is not available"));
        assert!(message.contains("Azure PowerShell: could not start pwsh"));
        assert!(message.contains(REGION_HINT));
        assert!(message.contains(INSTALL_HINT));
        assert!(!message.contains(DEPRECATION_HINT));
    }
}
