use std::sync::Arc;

use dreampath::cache::DraftCache;
use dreampath::config::PipelineConfig;
use dreampath::interview::ResumePoint;
use dreampath::llm::{LlmBackend, LlmConfig, create_generator};
use dreampath::pipeline::{DiscoveryPipeline, PipelineTurn};
use dreampath::profile::ProfileDraft;
use dreampath::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Read API key from environment
    let api_key = std::env::var("ANTHROPIC_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: ANTHROPIC_API_KEY not set");
        eprintln!("  export ANTHROPIC_API_KEY=sk-ant-...");
        std::process::exit(1);
    });

    let model = std::env::var("DREAMPATH_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    let identity =
        std::env::var("DREAMPATH_IDENTITY").unwrap_or_else(|_| "local-user".to_string());

    eprintln!("🌱 Dreampath v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);

    let llm_config = LlmConfig {
        backend: LlmBackend::Anthropic,
        api_key: secrecy::SecretString::from(api_key),
        model,
    };
    let generator = create_generator(&llm_config)?;

    // ── Database ─────────────────────────────────────────────────────────
    let db_path =
        std::env::var("DREAMPATH_DB_PATH").unwrap_or_else(|_| "./data/dreampath.db".to_string());

    let db_path_ref = std::path::Path::new(&db_path);
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );

    eprintln!("   Database: {}", db_path);

    // ── Draft cache ───────────────────────────────────────────────────────
    let cache_path = std::env::var("DREAMPATH_CACHE_PATH")
        .unwrap_or_else(|_| "./data/dreampath-cache.json".to_string());
    let mut cache = DraftCache::load(&cache_path).await?;

    let pipeline = DiscoveryPipeline::new(Arc::clone(&db), generator, PipelineConfig::default());

    // ── Interview ─────────────────────────────────────────────────────────
    let stdin = std::io::stdin();
    let question = match cache.resume_session_id() {
        Some(session_id) => {
            match pipeline.resume_interview(&identity, session_id).await? {
                ResumePoint::AwaitingAnswer { round, question } => {
                    eprintln!("   Resuming interview at round {}\n", round);
                    question
                }
                ResumePoint::Complete => {
                    eprintln!("   Interview already complete.\n");
                    cache.clear_resume_session().await?;
                    return Ok(());
                }
            }
        }
        None => {
            let draft = if cache.draft().dream.is_some() {
                cache.draft().clone()
            } else {
                eprintln!("   What is your dream? (one line)");
                let mut line = String::new();
                stdin.read_line(&mut line)?;
                let draft = ProfileDraft {
                    dream: Some(line.trim().to_string()),
                    ..ProfileDraft::default()
                };
                cache.set_draft(draft.clone()).await?;
                draft
            };
            let question = pipeline.begin_onboarding(&identity, &draft).await?;
            if let Some(session_id) = pipeline.session_id().await {
                cache.set_resume_session(session_id).await?;
            }
            question
        }
    };

    eprintln!("Coach: {}\n", question);

    loop {
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let answer = line.trim();
        if answer == "/quit" {
            break;
        }
        if answer.is_empty() {
            continue;
        }

        match pipeline.answer(answer).await {
            Ok(PipelineTurn::Question(question)) => {
                eprintln!("\nCoach: {}\n", question);
            }
            Ok(PipelineTurn::Finished { motivation }) => {
                eprintln!("\nCoach: Here is what your answers point to:");
                eprintln!("   {}\n", motivation);
                cache.clear_resume_session().await?;
                break;
            }
            Err(e) => {
                eprintln!("\n(generation hiccup: {}. Press Enter to retry.)", e);
                let mut retry_line = String::new();
                stdin.read_line(&mut retry_line)?;
                match pipeline.retry_question().await {
                    Ok(question) => eprintln!("\nCoach: {}\n", question),
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
