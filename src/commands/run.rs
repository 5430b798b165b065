use super::Context;
use role_monitor::daemon::scheduler::shutdown_signal;
use role_monitor::daemon::{BcmClient, CycleOutcome, Scheduler, SystemClock, Systemctl};
use std::sync::Arc;

fn scheduler(ctx: &Context) -> Scheduler {
    Scheduler::new(
        &ctx.config,
        &ctx.hostname,
        Arc::new(BcmClient::from_config(&ctx.config)),
        Arc::new(Systemctl::new()),
        Arc::new(SystemClock),
    )
}

pub(crate) async fn cmd_run(ctx: Context) -> anyhow::Result<()> {
    tracing::info!(
        config = %ctx.config_path.display(),
        headnodes = ?ctx.config.bcm_headnodes,
        "Role monitor configured"
    );
    scheduler(&ctx).run(shutdown_signal()).await;
    Ok(())
}

pub(crate) async fn cmd_check(ctx: Context) -> anyhow::Result<()> {
    let mut scheduler = scheduler(&ctx);
    let outcome = tokio::select! {
        outcome = scheduler.run_cycle() => outcome,
        _ = shutdown_signal() => return Ok(()),
    };

    match outcome {
        CycleOutcome::Unreachable => println!("BCM unreachable: no changes made"),
        CycleOutcome::RoleUnknown => println!("Role status unknown: no changes made"),
        CycleOutcome::Reconciled {
            role_active,
            role_changed,
        } => println!(
            "{} role on {}: {}{}",
            ctx.config.role,
            ctx.hostname,
            if role_active { "assigned" } else { "not assigned" },
            if role_changed { " (changed)" } else { "" }
        ),
    }

    for name in &ctx.config.services {
        println!("  {:<24} {}", name, describe(&scheduler.retry_state(name)));
    }

    Ok(())
}

pub(crate) fn describe(state: &role_monitor::daemon::RetryState) -> String {
    use role_monitor::daemon::RetryState;

    match state {
        RetryState::Healthy => "healthy".to_string(),
        RetryState::AwaitingRetry {
            attempts,
            next_attempt_at,
            ..
        } => format!("retry {} pending until {}", attempts, next_attempt_at),
        RetryState::PermanentlyFailed { attempts, .. } => {
            format!("gave up after {} attempts", attempts)
        }
    }
}
