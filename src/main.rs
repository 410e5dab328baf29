use std::sync::Arc;

use anyhow::{Context, Result};
use netreq::engine::loopback::{Behavior, LoopbackEngine};
use netreq::{Config, RequestContext};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let mut args = std::env::args().skip(1);
    let url = args.next().context("usage: netreq <url> [file]")?;
    let upload = args.next();

    let cfg = Config::load();
    let engine = LoopbackEngine::with_behavior(Behavior {
        read_size: cfg.response_read_size,
        ..Behavior::default()
    });
    let ctx = RequestContext::new(Arc::new(engine), cfg);

    let request = ctx.request(&url).sink(tokio::io::stdout()).build()?;

    if let Some(path) = upload {
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {path}"))?;
        request.set_upload_channel(None, file).await?;
    }

    tokio::select! {
        res = async {
            request.start().await?;
            anyhow::Ok(request.wait_for_completion().await)
        } => {
            let outcome = res?;
            match &outcome.error {
                None => tracing::info!(url = %outcome.url, status = outcome.http_status, "Request complete"),
                Some(e) => tracing::error!(url = %outcome.url, error = %e, "Request failed"),
            }
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, canceling request");
            request.cancel().await;
        }
    }

    Ok(())
}
