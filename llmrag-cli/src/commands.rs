use std::path::Path;

use anyhow::{Context, Result};
use llmrag::{
    AnswerResponse, CollectionId, CollectionInfo, Document, RagContext, RagPipeline, SourceElement,
    UpsertMode, UpsertOutcome,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::warn;

use crate::{CollectionCommands, Commands, OutputFormat};

/// Execute a parsed command against an open context.
pub async fn execute(context: &RagContext, command: Commands) -> Result<()> {
    let pipeline = context.pipeline();
    match command {
        Commands::Ingest { file, target, force } => {
            let mode = if force { UpsertMode::Force } else { UpsertMode::SkipIfPopulated };
            ingest(pipeline, &file, &target.collection(), mode).await
        }
        Commands::Ask { question, target, format } => {
            let response = pipeline.ask(&target.collection(), &question).await?;
            print_response(&response, format)
        }
        Commands::Chat { target } => chat(pipeline, &target.collection()).await,
        Commands::Collections { command } => match command {
            CollectionCommands::List => {
                let infos = pipeline.list_collections().await?;
                if infos.is_empty() {
                    println!("No collections.");
                }
                for info in &infos {
                    print_info(info);
                }
                Ok(())
            }
            CollectionCommands::Stats { target } => {
                print_info(&pipeline.collection_stats(&target.collection()).await?);
                Ok(())
            }
            CollectionCommands::Delete { target } => {
                let id = target.collection();
                if pipeline.delete_collection(&id).await? {
                    println!("Deleted {id}.");
                } else {
                    println!("No collection {id}.");
                }
                Ok(())
            }
        },
    }
}

fn load_document(path: &Path, document_id: &str) -> Result<Document> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let elements: Vec<SourceElement> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array of elements", path.display()))?;
        Ok(Document::new(document_id, elements))
    } else {
        Ok(Document::from_plain_text(document_id, &content))
    }
}

async fn ingest(
    pipeline: &RagPipeline,
    path: &Path,
    collection: &CollectionId,
    mode: UpsertMode,
) -> Result<()> {
    let document = load_document(path, &collection.document_id)?;
    let report = pipeline.ingest(collection, &document, mode).await?;
    match report.outcome {
        UpsertOutcome::Inserted { rows } => println!("Ingested {rows} chunks into {collection}."),
        UpsertOutcome::Replaced { rows } => {
            println!("Re-ingested {rows} chunks into {collection}.")
        }
        UpsertOutcome::AlreadyPopulated { rows } => {
            println!("{collection} already holds {rows} chunks; use --force to re-ingest.")
        }
    }
    Ok(())
}

/// Characters of each context chunk shown under an answer.
const PREVIEW_CHARS: usize = 300;

fn print_response(response: &AnswerResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(response)?),
        OutputFormat::Text => print!("{}", render_text(response)),
    }
    Ok(())
}

fn render_text(response: &AnswerResponse) -> String {
    let mut out = format!("\n[Answer]\n{}\n", response.answer);
    if !response.source_ids.is_empty() {
        out.push_str(&format!("\n[Sources] {}\n", response.source_ids.join(", ")));
    }
    if !response.context.is_empty() {
        out.push_str("\n[Context]\n");
        for (i, hit) in response.context.iter().enumerate() {
            out.push_str(&format!(
                "[{}] {} {}\n",
                i + 1,
                hit.chunk.source_id(),
                preview(&hit.chunk.text)
            ));
        }
    }
    out.push_str(&format!(
        "\n({} context chunks, {:.2}s)\n",
        response.context_count, response.response_time
    ));
    out
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() { format!("{head}…") } else { head }
}

fn print_info(info: &CollectionInfo) {
    println!(
        "{:<40} rows={:<6} dims={:<5} size={}",
        info.id.to_string(),
        info.row_count,
        info.dimensions,
        human_size(info.approx_size_bytes)
    );
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{size:.1} {}", UNITS[unit]) }
}

async fn chat(pipeline: &RagPipeline, collection: &CollectionId) -> Result<()> {
    // Fail before prompting if the collection was never ingested.
    pipeline.collection_stats(collection).await?;

    let mut editor = DefaultEditor::new()?;
    println!("Chatting with {collection}. Ctrl-D to exit.");
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        editor.add_history_entry(question)?;

        match ask_with_retry(pipeline, collection, question).await {
            Ok(response) => print_response(&response, OutputFormat::Text)?,
            Err(e) => match e.downcast_ref::<llmrag::RagError>() {
                Some(rag) => eprintln!("error[{}]: {rag}", rag.kind()),
                None => eprintln!("error: {e:#}"),
            },
        }
    }
    Ok(())
}

/// Ask once; on a retryable failure generate again from the same retrieval.
async fn ask_with_retry(
    pipeline: &RagPipeline,
    collection: &CollectionId,
    question: &str,
) -> Result<AnswerResponse> {
    let started = std::time::Instant::now();
    let retrieval = pipeline.retrieve(collection, question).await?;
    let answer = match pipeline.answer(question, &retrieval).await {
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "generation failed, retrying once");
            pipeline.answer(question, &retrieval).await?
        }
        other => other?,
    };
    Ok(AnswerResponse::new(answer, &retrieval, started.elapsed()))
}
