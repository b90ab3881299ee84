use std::io::Write as _;

use anyhow::Result;
use futures::StreamExt;

use healthres_core::types::{BackendKind, RankedMatch};
use healthres_llm::Responder;
use healthres_retrieval::Session;

/// Runs every construction step, printing each phase as it completes.
pub async fn ingest(session: &Session) -> Result<()> {
    let corpus = session.corpus().await?;
    println!("✅ Data loaded: {} documents", corpus.len());
    let embeddings = session.embeddings().await?;
    println!("✅ Embeddings created: {} x {}", embeddings.len(), embeddings.dim());
    let local = session.local_backend().await?;
    println!("✅ Local index ready: {} items, connectivity {}", local.index().len(), local.index().config().connectivity);
    if session.settings().remote.enabled {
        let remote = session.remote_backend().await?;
        println!("✅ Remote index '{}' ready ({} dimensions)", remote.index().name, remote.index().dimension);
    } else {
        println!("⚠️  Remote index disabled (remote.enabled = false)");
    }
    session.ready().await?;
    println!("\n✅ Ingest complete ({})", session.phase());
    Ok(())
}

pub async fn search(session: &Session, query: &str, backend: BackendKind, k: usize) -> Result<Vec<RankedMatch>> {
    let retriever = session.ready().await?;
    Ok(retriever.search(query, backend, k).await?)
}

pub fn print_matches(backend: BackendKind, matches: &[RankedMatch]) {
    if matches.is_empty() {
        println!("No results found in the {backend} index.");
        return;
    }
    println!("🔍 {} results from the {backend} index", matches.len());
    for (i, m) in matches.iter().enumerate() {
        println!("\nResult {}: score={:.2}  id={}", i + 1, m.score, m.document_id);
        println!("  Abstract: {}", m.metadata.abstract_text);
        println!("  Authors: {}", m.metadata.authors);
        println!("  Publication Year: {}", m.metadata.publication_year);
    }
}

/// Prints the answer and returns its full text.
pub async fn answer(
    responder: &Responder,
    query: &str,
    matches: &[RankedMatch],
    history: &[healthres_core::types::ChatMessage],
    stream: bool,
) -> Result<String> {
    if !stream {
        let text = responder.answer(query, matches, history).await?;
        println!("{text}");
        return Ok(text);
    }
    let mut chunks = responder.answer_stream(query, matches, history).await?;
    let mut text = String::new();
    let mut stdout = std::io::stdout();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        print!("{chunk}");
        stdout.flush()?;
        text.push_str(&chunk);
    }
    println!();
    Ok(text)
}
