//! CLI command implementations.
//!
//! Each `run_*` function backs one `docqa` subcommand and prints
//! human-readable output to stdout. Progress and diagnostics go through
//! `tracing` to stderr.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::generation::GenerationOverrides;
use crate::models::Answer;
use crate::pipeline::Assistant;

/// `docqa index [--force]`, after the index has been brought up to date.
pub fn run_index(assistant: &Assistant, rebuilt: bool) -> Result<()> {
    let stats = assistant.stats();
    if rebuilt {
        println!("Index rebuilt.");
    } else {
        println!("Index is up to date.");
    }
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.entries);
    println!("  Model:       {} ({} dims)", stats.model, stats.dims);
    println!("  Store:       {}", assistant.config().index.path.display());
    Ok(())
}

/// `docqa search <query> [--k N]`
pub async fn run_search(assistant: &Assistant, query: &str, k: Option<usize>) -> Result<()> {
    let k = k.unwrap_or(assistant.config().retrieval.k);
    let results = assistant.search(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for r in &results {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            r.rank, r.score, r.chunk.source, r.chunk.chunk_index
        );
        println!("    {}", snippet(&r.chunk.text, 240));
        println!();
    }
    Ok(())
}

/// `docqa ask <question>`
pub async fn run_ask(assistant: &Assistant, question: &str) -> Result<()> {
    let answer = assistant
        .ask(question, None, &GenerationOverrides::default())
        .await?;
    let mut stdout = std::io::stdout().lock();
    print_answer(&mut stdout, &answer)?;
    Ok(())
}

/// `docqa stats`
pub fn run_stats(assistant: &Assistant) -> Result<()> {
    let stats = assistant.stats();
    let config = assistant.config();

    println!("Document QA: Index Stats");
    println!("==========================");
    println!();
    println!("  Documents dir: {}", config.documents.path.display());
    println!("  Index dir:     {}", config.index.path.display());
    println!();
    println!("  Documents:     {}", stats.documents);
    println!("  Chunks:        {}", stats.entries);
    println!("  Embeddings:    {} ({} dims)", stats.model, stats.dims);
    println!("  Generator:     {}", assistant.model_name());
    println!(
        "  Chunking:      {} chars, {} overlap",
        config.chunking.chunk_size, config.chunking.overlap
    );
    println!("  Fingerprint:   {}", stats.fingerprint);
    Ok(())
}

/// `docqa chat`: read questions line by line until EOF or `/quit`.
///
/// `/clear` forgets the conversation so far. A failed answer is reported and
/// the loop continues.
pub async fn run_chat<R: BufRead, W: Write>(assistant: &Assistant, input: R, mut output: W) -> Result<()> {
    let mut history = assistant.new_history();
    let overrides = GenerationOverrides::default();

    writeln!(output, "Ask a question (/clear to reset, /quit to exit).")?;
    write!(output, "> ")?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        let question = line.trim();
        match question {
            "" => {}
            "/quit" | "/exit" => break,
            "/clear" => {
                history.clear();
                writeln!(output, "(conversation cleared)")?;
            }
            _ => match assistant.ask(question, Some(&history), &overrides).await {
                Ok(answer) => {
                    history.record_exchange(question, &answer.text);
                    print_answer(&mut output, &answer)?;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to answer");
                    writeln!(output, "Error: {}", e)?;
                }
            },
        }
        write!(output, "> ")?;
        output.flush()?;
    }
    writeln!(output)?;
    Ok(())
}

fn print_answer<W: Write>(out: &mut W, answer: &Answer) -> std::io::Result<()> {
    writeln!(out, "{}", answer.text)?;
    let sources = answer.unique_sources();
    if !sources.is_empty() {
        writeln!(out)?;
        writeln!(out, "Sources:")?;
        for source in sources {
            writeln!(out, "  - {}", source)?;
        }
    }
    writeln!(out)
}

/// First `max_chars` characters of `text` on one line.
fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Citation;

    #[test]
    fn test_snippet() {
        assert_eq!(snippet("a\n\nb   c", 10), "a b c");
        assert_eq!(snippet("abcdefgh", 3), "abc…");
    }

    #[test]
    fn test_print_answer_lists_unique_sources() {
        let cite = |source: &str, rank| Citation {
            source: source.into(),
            chunk_id: format!("{}:{}", source, rank),
            chunk_index: 0,
            score: 0.9,
            rank,
        };
        let answer = Answer {
            text: "Offer fluids often.".into(),
            citations: vec![cite("hydration.md", 1), cite("hydration.md", 2), cite("fever.txt", 3)],
        };
        let mut buf = Vec::new();
        print_answer(&mut buf, &answer).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert_eq!(
            out,
            "Offer fluids often.\n\nSources:\n  - hydration.md\n  - fever.txt\n\n"
        );
    }
}
