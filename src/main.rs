/// Resource Vault - storage report
///
/// Opens the configured vault and prints a usage report, either for every
/// project or for the project id given as the first argument.
use resource_vault::{
    config::VaultConfig,
    context::VaultContext,
    error::VaultResult,
    metrics,
    resource_store::{format_size, ResourceMetadata},
};
use std::collections::BTreeMap;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> VaultResult<()> {
    // Load configuration (also reads .env, so RUST_LOG may come from there)
    let config = VaultConfig::from_env()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter_directive().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Create application context
    let ctx = VaultContext::new(config).await?;
    let store = &ctx.resources;

    let project = std::env::args().nth(1);

    let resources = match project.as_deref() {
        Some(project_id) => store.list_by_project(project_id).await?,
        None => store.list_all().await?,
    };

    print_projects(&resources);

    let total = store.get_total_size(project.as_deref()).await?;
    println!("Total stored: {}", format_size(total));

    let quota = store.get_quota().await;
    if quota.quota > 0 {
        println!(
            "Volume usage: {} of {}",
            format_size(quota.used),
            format_size(quota.quota)
        );
    } else {
        println!("Volume usage: unavailable");
    }

    let report = store.check_consistency().await?;
    if report.is_consistent() {
        println!("Consistency: ok");
    } else {
        tracing::warn!(
            "Inconsistent collections: {} stray blobs, {} missing blobs, {} mismatched",
            report.blobs_without_metadata.len(),
            report.metadata_without_blobs.len(),
            report.mismatched.len()
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    tracing::debug!("Metrics snapshot:\n{}", metrics::gather_metrics());

    Ok(())
}

fn print_projects(resources: &[ResourceMetadata]) {
    let mut by_project: BTreeMap<&str, Vec<&ResourceMetadata>> = BTreeMap::new();
    for resource in resources {
        by_project.entry(&resource.project_id).or_default().push(resource);
    }

    for (project_id, items) in by_project {
        let size: u64 = items.iter().map(|r| r.size_bytes).sum();
        println!("{} ({} resources, {})", project_id, items.len(), format_size(size));

        for item in items {
            println!(
                "  {:<10} {:>10}  {}",
                item.category.as_str(),
                format_size(item.size_bytes),
                item.name
            );
        }
    }
}
