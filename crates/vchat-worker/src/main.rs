//! `vchat <video>`: analyze a video, print its summary, then answer
//! questions read from stdin.

use anyhow::Context;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use vchat_media::FfmpegFrameSource;
use vchat_models::JobState;
use vchat_vlm_client::VlmClient;
use vchat_worker::{init_tracing, JobExecutor, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    init_tracing();

    let path = std::env::args()
        .nth(1)
        .context("usage: vchat <video>")?;

    info!("Starting vchat");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    let client = VlmClient::new(config.vlm.clone()).context("Failed to create VLM client")?;
    if !client.health_check().await {
        warn!(
            base_url = %config.vlm.base_url,
            "VLM endpoint is not reachable, requests will be retried"
        );
    } else {
        match client.model_available().await {
            Ok(true) => {}
            Ok(false) => warn!(
                model = %config.vlm.model,
                "VLM model is not installed on the endpoint, frame queries will fail"
            ),
            Err(e) => warn!(error = %e, "Could not list installed VLM models"),
        }
    }

    let frames = Arc::new(FfmpegFrameSource::new(config.frame_timeout));
    let executor = JobExecutor::new(config, Arc::new(client), frames)?;

    let job_id = match executor.submit_file(&path).await {
        Ok(id) => id,
        Err(e) => {
            error!("Failed to ingest {}: {}", path, e);
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    };

    let status = tokio::select! {
        status = executor.wait(&job_id) => status?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            executor.cancel(&job_id).await?;
            executor.wait(&job_id).await?
        }
    };

    if status.state != JobState::Done {
        if let Some(failure) = &status.failure {
            eprintln!("Analysis job {} failed during {}: {}", job_id, failure.stage, failure.message);
        }
        std::process::exit(1);
    }

    let results = executor.results(&job_id).await?;
    println!("{}", serde_json::to_string_pretty(results.summary.as_ref())?);

    let agent = executor.chat_agent();
    let conversation = agent.start_conversation(&job_id).await?;
    eprintln!("Ask a question about the video (Ctrl-D to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match agent.respond(&conversation, question).await {
            Ok(reply) => println!("{}\n", reply),
            Err(e) => {
                warn!(error = %e, "Chat turn failed");
                eprintln!("{}", e.user_message());
            }
        }
    }

    executor.cleanup(&job_id).await?;
    info!("vchat shutdown complete");
    Ok(())
}
