use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;
use sluice_flight::{AbortCoordinator, AbortReason};
use sluice_pipeline::{
    single_part, FailureKind, IngestConfig, TracingAlertSink, UploadOutcome, UploadPipeline,
};
use sluice_quota::{check_quota, QuotaDecision};
use sluice_server::{ServerConfig, SluiceServer};
use sluice_store::{InMemoryBackend, InMemoryConnector};
use sluice_types::request::DEFAULT_MIME;
use sluice_types::{BucketName, Principal, UploadRequest};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Upload(args) => cmd_upload(args, cli.format).await,
        Command::Quota(args) => cmd_quota(args, cli.format),
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse()
            .with_context(|| format!("invalid bind address {bind}"))?;
    }
    println!(
        "{} sluice listening on {} (limit {} bytes)",
        "✓".green().bold(),
        config.bind_addr.to_string().bold(),
        config.ingest.bucket_limit_bytes
    );
    info!(bind = %config.bind_addr, "starting server over in-memory backend");
    let (server, _backend) = SluiceServer::in_memory(config);
    server.serve().await?;
    Ok(())
}

async fn cmd_upload(args: UploadArgs, format: OutputFormat) -> anyhow::Result<()> {
    let bucket = BucketName::new(args.bucket.as_str())?;
    let mut config = IngestConfig {
        stream_timeout_secs: args.timeout,
        ..IngestConfig::default()
    };
    if let Some(limit) = args.limit {
        config.bucket_limit_bytes = limit;
    }
    config.validate()?;

    let declared = tokio::fs::metadata(&args.path)
        .await
        .with_context(|| format!("reading {}", args.path.display()))?
        .len();
    let file = tokio::fs::File::open(&args.path)
        .await
        .with_context(|| format!("opening {}", args.path.display()))?;
    let file_name = args
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".into());

    let backend = InMemoryBackend::new();
    backend.set_usage(&bucket, args.used);
    let body = ReaderStream::with_capacity(file, config.high_water_mark);
    let pipeline = UploadPipeline::new(
        config,
        Arc::new(InMemoryConnector::new(backend)),
        Arc::new(TracingAlertSink),
    );

    let parts = single_part(
        file_name,
        args.mime.as_deref().unwrap_or(DEFAULT_MIME),
        Box::pin(body),
    );
    let principal = Principal::new(args.user.as_str(), args.user.as_str());
    let request = UploadRequest::new(declared, principal, bucket);

    let abort = AbortCoordinator::new();
    abort.on_abort(|reason| eprintln!("{} {}", "aborting:".yellow().bold(), reason));
    let interrupt = {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                abort.abort(AbortReason::Cancelled);
            }
        })
    };
    info!(file = %args.path.display(), declared, "uploading");
    let outcome = pipeline.run_with_abort(&request, parts, abort).await;
    interrupt.abort();

    print_outcome(&outcome, format)?;
    if !outcome.is_success() {
        anyhow::bail!("upload failed: {}", outcome.decorator());
    }
    Ok(())
}

fn print_outcome(outcome: &UploadOutcome, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
        return Ok(());
    }
    match outcome {
        UploadOutcome::Success {
            descriptor,
            content,
        } => {
            println!("{} {}", "✓".green().bold(), outcome.decorator().to_string().green());
            println!("  File: {} ({})", descriptor.name.bold(), descriptor.mime);
            println!("  Id: {}", descriptor.id.to_string().cyan());
            println!("  Size: {} bytes", descriptor.size);
            println!("  Content: {}", content.as_str().yellow());
        }
        UploadOutcome::Failure(failure) => {
            println!("{} {}", "✗".red().bold(), outcome.decorator().to_string().red());
            println!("  Kind: {}", failure.kind);
            println!("  Origin: {}", failure.origin);
            println!("  Message: {}", failure.message);
        }
    }
    Ok(())
}

fn cmd_quota(args: QuotaArgs, format: OutputFormat) -> anyhow::Result<()> {
    let limit = args.limit.unwrap_or(IngestConfig::default().bucket_limit_bytes);
    let decision = check_quota(args.declared, args.used, limit);
    let remaining = limit.saturating_sub(args.used);

    if format == OutputFormat::Json {
        let body = match decision {
            QuotaDecision::Allow => json!({ "decision": "allow", "remaining": remaining }),
            QuotaDecision::Deny(denial) => {
                json!({ "decision": "deny", "denial": denial, "remaining": remaining })
            }
        };
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    match decision {
        QuotaDecision::Allow => println!(
            "{} {} bytes fit ({} of {} bytes remaining)",
            "✓".green().bold(),
            args.declared,
            remaining,
            limit
        ),
        QuotaDecision::Deny(denial) => {
            let tag = FailureKind::QuotaExceeded(denial).decorator();
            println!("{} {}: {}", "✗".red().bold(), tag.as_str().red(), denial);
        }
    }
    Ok(())
}
