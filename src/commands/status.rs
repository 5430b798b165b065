use super::run::describe;
use super::Context;
use role_monitor::daemon::{DiscoveryPublisher, StateStore};

pub(crate) fn cmd_status(ctx: &Context) -> anyhow::Result<()> {
    let config = &ctx.config;
    let store = StateStore::new(&config.state_dir, &ctx.hostname);
    let state = store.load();
    let publisher = DiscoveryPublisher::new(
        config.prometheus_targets_dir.clone(),
        ctx.hostname.as_str(),
        config.cluster_name.clone(),
        config.exporters(),
    );

    println!("Node:        {}", ctx.hostname);
    println!("Config:      {}", ctx.config_path.display());
    println!("Headnodes:   {}", config.bcm_headnodes.join(", "));
    println!("Role:        {}", config.role);
    println!(
        "Interval:    {}s (retry {}s, max {})",
        config.check_interval, config.retry_interval, config.max_retries
    );
    println!("State file:  {}", store.path().display());
    println!();

    let role = match state.role_active {
        Some(true) => "assigned",
        Some(false) => "not assigned",
        None => "unknown",
    };
    println!("Last role:   {}", role);
    match state.last_check {
        Some(at) => println!("Last check:  {}", at),
        None => println!("Last check:  never"),
    }

    let descriptor = publisher.descriptor_path();
    println!(
        "Targets:     {} ({})",
        descriptor.display(),
        if descriptor.exists() { "published" } else { "absent" }
    );
    println!();

    println!("Services:");
    for name in &config.services {
        let retry = state.retry_state.get(name).copied().unwrap_or_default();
        println!("  {:<24} {}", name, describe(&retry));
    }

    Ok(())
}
