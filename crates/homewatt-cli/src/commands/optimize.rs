//! Optimize command: forecast, explain, advise, optionally email

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use homewatt_core::{
    AppConfig, CancelSignal, Dispatcher, EmailNotifier, OrchestrationReport, Recipient,
};
use tracing::{info, warn};

use super::{
    build_pipeline, feature_context, home_profile, load_config, load_series, resolve_location,
    target_date,
};
use crate::cli::{LocationArgs, TargetArgs};

pub async fn cmd_optimize(
    config_path: Option<&Path>,
    target: &TargetArgs,
    location: &LocationArgs,
    email: Option<&str>,
    name: Option<&str>,
    trace: bool,
) -> Result<()> {
    let config = load_config(config_path)?;

    // Validate delivery settings before spending agent calls
    let delivery = match email {
        Some(address) => Some(email_dispatcher(&config, name, address)?),
        None => None,
    };

    // Ctrl-C cancels the orchestration instead of killing the process mid-call
    let (handle, cancel) = CancelSignal::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });

    let report = optimize(&config, target, location, &cancel).await?;

    if trace {
        eprintln!(
            "Orchestration: {} agent call(s) in {}ms",
            report.calls,
            report.elapsed.as_millis()
        );
        for stage in &report.trace {
            eprintln!("  {}", stage);
        }
    }

    println!("{}", serde_json::to_string_pretty(&report.insight)?);

    if let Some((dispatcher, recipient)) = delivery {
        info!(recipient = %recipient.email, "Sending report");
        // The CLI exits when main returns, so wait for the send here
        dispatcher
            .dispatch(report.insight, recipient)
            .await
            .context("Email task panicked")?;
    }

    Ok(())
}

pub async fn optimize(
    config: &AppConfig,
    target: &TargetArgs,
    location: &LocationArgs,
    cancel: &CancelSignal,
) -> Result<OrchestrationReport> {
    let series = load_series(target)?;
    let date = target_date(target, &series)?;
    let place = resolve_location(location).await;
    let context = feature_context(target, location, place.as_ref(), date).await;
    let profile = home_profile(target, location, place.as_ref());
    let (pipeline, _) = build_pipeline(config)?;

    let report = pipeline
        .run_traced(&series, date, &context, profile.as_ref(), cancel)
        .await
        .context("Optimization failed")?;

    if report.insight.degraded {
        for stage in &report.insight.degraded_stages {
            warn!(role = %stage.role, reason = %stage.reason, "Stage degraded");
        }
    }
    Ok(report)
}

fn email_dispatcher(
    config: &AppConfig,
    name: Option<&str>,
    address: &str,
) -> Result<(Dispatcher, Recipient)> {
    let smtp = config
        .smtp
        .clone()
        .context("Email requested but SMTP is not configured (set HOMEWATT_SMTP_HOST)")?;
    let recipient = Recipient::new(name, address)?;
    let notifier = EmailNotifier::new(smtp)?;
    Ok((Dispatcher::new(Arc::new(notifier)), recipient))
}
