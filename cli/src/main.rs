//! maasctl: drive the MaaS convergence engine against a snapshot store.
//!
//! # Usage
//!
//! ```text
//! maasctl render networking --domain apps.example.com
//! maasctl reconcile --state cluster.yaml --platform maas-api/platform --out after.yaml
//! maasctl aggregate --state cluster.yaml --tier maas-api/free
//! maasctl aggregate --state cluster.yaml --tier-deleted
//! ```

mod snapshot;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use maas_operator_core::convergence::{
    AggregationOutcome, AggregationTrigger, PlatformReconciler, ReconcileOutcome, TierAggregator,
};
use maas_operator_core::infrastructure::memory::MemoryStore;
use maas_operator_core::manifest::ManifestGroup;
use maas_operator_core::render::{render, VariableResolver};
use maas_operator_core::types::object::ObjectKey;
use maas_operator_core::EngineConfig;

const ENV_CONFIG: &str = "MAAS_CONFIG";

#[derive(Parser, Debug)]
#[command(name = "maasctl", about = "MaaS convergence engine")]
struct Cli {
    /// Engine config file (defaults to $MAAS_CONFIG).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the rendered objects of one manifest group.
    Render {
        /// maas-api, networking or gateway-auth-policy.
        group: ManifestGroup,
        /// Cluster domain to substitute.
        #[arg(long)]
        domain: Option<String>,
    },
    /// Converge a platform, then aggregate its tiers.
    Reconcile {
        #[arg(long)]
        state: PathBuf,
        /// Platform as NAMESPACE/NAME.
        #[arg(long, value_parser = ObjectKey::parse)]
        platform: ObjectKey,
        /// Write the resulting state here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run one tier aggregation trigger.
    Aggregate {
        #[arg(long)]
        state: PathBuf,
        #[command(flatten)]
        trigger: TriggerArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct TriggerArgs {
    /// A tier changed (NAMESPACE/NAME).
    #[arg(long, value_parser = ObjectKey::parse)]
    tier: Option<ObjectKey>,
    /// A platform changed (NAMESPACE/NAME).
    #[arg(long, value_parser = ObjectKey::parse)]
    platform: Option<ObjectKey>,
    /// Some tier was deleted.
    #[arg(long)]
    tier_deleted: bool,
}

impl TriggerArgs {
    fn trigger(&self) -> AggregationTrigger {
        match (&self.tier, &self.platform) {
            (Some(tier), _) => AggregationTrigger::Tier(tier.clone()),
            (None, Some(platform)) => AggregationTrigger::Platform(platform.clone()),
            (None, None) => AggregationTrigger::TierDeleted,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;
    debug!(?config, "engine configuration");

    match cli.command {
        Command::Render { group, domain } => cmd_render(config, group, domain),
        Command::Reconcile { state, platform, out } => {
            cmd_reconcile(&config, &state, &platform, out.as_deref())
        }
        Command::Aggregate { state, trigger, out } => {
            cmd_aggregate(&state, &trigger.trigger(), out.as_deref())
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

/// Explicit path, else `$MAAS_CONFIG`, else defaults. Environment overrides
/// apply last.
fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(ENV_CONFIG).ok().filter(|v| !v.is_empty()).map(PathBuf::from));
    let config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading engine config");
            EngineConfig::load(&path).with_context(|| format!("cannot load config {}", path.display()))?
        }
        None => EngineConfig::default(),
    };
    Ok(config.with_env())
}

fn cmd_render(mut config: EngineConfig, group: ManifestGroup, domain: Option<String>) -> Result<()> {
    if domain.is_some() {
        config.cluster_domain = domain;
    }
    let manifests = config.manifest_store();
    let template = manifests.load(group)?;
    let store = MemoryStore::new();
    let vars = VariableResolver::new(&store, &config).variables();
    let objects = render(&template, &vars);
    snapshot::emit(&snapshot::dump(&objects)?, None)
}

fn cmd_reconcile(config: &EngineConfig, state: &Path, platform: &ObjectKey, out: Option<&Path>) -> Result<()> {
    let store = snapshot::load(state)?;
    let manifests = config.manifest_store();

    let outcome = PlatformReconciler::new(&store, manifests.as_ref(), config)
        .reconcile(platform)
        .with_context(|| format!("reconcile of platform {} failed", platform))?;
    match &outcome {
        ReconcileOutcome::Deleted => eprintln!("platform {} not found, nothing to do", platform),
        ReconcileOutcome::Converged(report) => {
            for (group, summary) in &report.groups {
                eprintln!(
                    "{:<20} created {} updated {} unchanged {} skipped {}",
                    group, summary.created, summary.updated, summary.unchanged, summary.skipped
                );
            }
            for group in &report.skipped_groups {
                eprintln!("{:<20} disabled", group);
            }
            let aggregation = TierAggregator::new(&store)
                .on_child_change(&AggregationTrigger::Platform(platform.clone()))
                .with_context(|| format!("tier aggregation for {} failed", platform))?;
            print_aggregation(&aggregation);
        }
    }

    snapshot::emit(&snapshot::dump(&store.objects())?, out)
}

fn cmd_aggregate(state: &Path, trigger: &AggregationTrigger, out: Option<&Path>) -> Result<()> {
    let store = snapshot::load(state)?;
    let outcome = TierAggregator::new(&store)
        .on_child_change(trigger)
        .with_context(|| format!("aggregation for {} failed", trigger))?;
    print_aggregation(&outcome);
    snapshot::emit(&snapshot::dump(&store.objects())?, out)
}

fn print_aggregation(outcome: &AggregationOutcome) {
    match outcome {
        AggregationOutcome::PlatformGone { platform } => {
            eprintln!("platform {} not found, nothing to aggregate", platform)
        }
        AggregationOutcome::NoTiers { platform } => {
            eprintln!("no tiers target {}, artifacts left as they are", platform)
        }
        AggregationOutcome::Applied { platform, tiers, artifacts } => {
            eprintln!("{}: tiers [{}]", platform, tiers.join(", "));
            for (artifact, result) in artifacts {
                eprintln!("  {} {:?}", artifact, result);
            }
        }
        AggregationOutcome::Recomputed(outcomes) => {
            for outcome in outcomes {
                print_aggregation(outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use maas_operator_core::convergence::ApplyOutcome;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_render() {
        let cli = Cli::try_parse_from(["maasctl", "render", "networking", "--domain", "apps.x.io"]).unwrap();
        match cli.command {
            Command::Render { group, domain } => {
                assert_eq!(group, ManifestGroup::Networking);
                assert_eq!(domain.as_deref(), Some("apps.x.io"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_group() {
        assert!(Cli::try_parse_from(["maasctl", "render", "nope"]).is_err());
    }

    #[test]
    fn parses_reconcile_with_globals() {
        let cli = Cli::try_parse_from([
            "maasctl", "-vv", "reconcile", "--state", "s.yaml", "--platform", "maas-api/platform",
            "--config", "c.yaml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
        match cli.command {
            Command::Reconcile { platform, out, .. } => {
                assert_eq!(platform, ObjectKey::namespaced("maas-api", "platform"));
                assert!(out.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn aggregate_needs_exactly_one_trigger() {
        assert!(Cli::try_parse_from(["maasctl", "aggregate", "--state", "s.yaml"]).is_err());
        assert!(Cli::try_parse_from([
            "maasctl", "aggregate", "--state", "s.yaml", "--tier", "a/b", "--tier-deleted",
        ])
        .is_err());

        let cli = Cli::try_parse_from(["maasctl", "aggregate", "--state", "s.yaml", "--tier-deleted"]).unwrap();
        match cli.command {
            Command::Aggregate { trigger, .. } => assert_eq!(trigger.trigger(), AggregationTrigger::TierDeleted),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn reconcile_and_aggregate_against_a_state_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.yaml");
        std::fs::write(
            &state,
            "\
apiVersion: myapp.io.odh.maas/v1alpha1
kind: MaasPlatform
metadata: {name: platform, namespace: maas-api}
---
apiVersion: myapp.io.odh.maas/v1alpha1
kind: Tier
metadata: {name: free, namespace: maas-api}
spec:
  targetRef: {name: platform}
  rateLimits: {limit: 5, window: 2m}
",
        )
        .unwrap();
        let out = dir.path().join("out.yaml");
        let config = EngineConfig {
            cluster_domain: Some("apps.test.io".into()),
            ..EngineConfig::default()
        };
        cmd_reconcile(&config, &state, &ObjectKey::namespaced("maas-api", "platform"), Some(out.as_path())).unwrap();

        let result = snapshot::parse(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert!(result.iter().any(|o| o.kind() == "RateLimitPolicy"));
        assert!(result.iter().any(|o| o.kind() == "Gateway"));
        assert!(result
            .iter()
            .any(|o| o.kind() == "ConfigMap" && o.name() == "tier-to-group-mapping"));

        let again = dir.path().join("again.yaml");
        cmd_aggregate(&out, &AggregationTrigger::TierDeleted, Some(again.as_path())).unwrap();
        assert!(again.exists());
    }

    #[test]
    fn reloaded_output_is_already_converged() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.yaml");
        std::fs::write(
            &state,
            "\
apiVersion: myapp.io.odh.maas/v1alpha1
kind: MaasPlatform
metadata: {name: platform, namespace: maas-api, generation: 4}
---
apiVersion: myapp.io.odh.maas/v1alpha1
kind: Tier
metadata: {name: premium, namespace: maas-api}
spec:
  targetRef: {name: platform}
  rateLimits: {limit: 50, window: 1m}
",
        )
        .unwrap();
        let config = EngineConfig {
            cluster_domain: Some("apps.test.io".into()),
            ..EngineConfig::default()
        };
        let key = ObjectKey::namespaced("maas-api", "platform");
        let first = dir.path().join("first.yaml");
        cmd_reconcile(&config, &state, &key, Some(first.as_path())).unwrap();

        let written = snapshot::parse(&std::fs::read_to_string(&first).unwrap()).unwrap();
        let uid_in_file = written
            .iter()
            .find(|o| o.kind() == "MaasPlatform")
            .and_then(|o| o.pointer(&["metadata", "uid"]).cloned())
            .unwrap();

        let store = snapshot::load(&first).unwrap();
        let platform = store
            .objects()
            .into_iter()
            .find(|o| o.kind() == "MaasPlatform")
            .unwrap();
        assert_eq!(platform.pointer(&["metadata", "uid"]), Some(&uid_in_file));
        assert_eq!(platform.pointer(&["metadata", "generation"]).unwrap(), 4);
        assert_eq!(platform.pointer(&["status", "observedGeneration"]).unwrap(), 4);

        let manifests = config.manifest_store();
        match PlatformReconciler::new(&store, manifests.as_ref(), &config)
            .reconcile(&key)
            .unwrap()
        {
            ReconcileOutcome::Converged(report) => {
                assert_eq!(report.total().writes(), 0);
                assert_eq!(report.namespaces_created, 0);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match TierAggregator::new(&store)
            .on_child_change(&AggregationTrigger::Platform(key.clone()))
            .unwrap()
        {
            AggregationOutcome::Applied { artifacts, .. } => {
                assert!(artifacts
                    .iter()
                    .all(|(_, outcome)| *outcome == ApplyOutcome::Unchanged));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
