use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::mcp::{McpServer, SERVER_NAME, register_notes_tools};
use crate::notes::{NotesService, SearchResults};

const RULE_WIDTH: usize = 80;

/// Run the MCP server on stdio until EOF or Ctrl-C
#[inline]
pub async fn serve_mcp(config: &Config) -> Result<()> {
    let notes = Arc::new(
        NotesService::from_config(config).context("Failed to initialize notes service")?,
    );

    check_embedder(config).await;

    let server = Arc::new(McpServer::new(
        SERVER_NAME.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    register_notes_tools(&server, notes).await;

    // stdout carries the protocol; everything for humans goes to stderr
    eprintln!(
        "{} {}",
        style("✅ MCP server ready with tools:").green(),
        "search_notes, add_note"
    );
    eprintln!("Press Ctrl+C to stop the server");

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            result.context("MCP server failed")?;
            info!("MCP server stopped normally");
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n📴 Received interrupt signal, shutting down...");
        }
    }

    Ok(())
}

/// Warn, without failing, when Ollama or the configured model is missing
async fn check_embedder(config: &Config) {
    let client = match OllamaClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            warn!("Cannot create Ollama client: {:#}", e);
            return;
        }
    };

    match tokio::task::spawn_blocking(move || client.health_check()).await {
        Ok(Ok(())) => info!("Ollama ready with model {}", config.embedding.model),
        Ok(Err(e)) => {
            warn!("Ollama is not healthy: {:#}", e);
            eprintln!(
                "{}",
                style("⚠ Warning: Ollama may not be ready. Searches and new notes will fail until it is.")
                    .yellow()
            );
        }
        Err(e) => error!("Health check task failed: {}", e),
    }
}

/// Store one note in the configured namespace
#[inline]
pub async fn add_note(config: &Config, text: &str) -> Result<()> {
    let notes = NotesService::from_config(config)?;
    let receipt = notes.add_note(text).await?;

    println!("{}", style("✓ Successfully added note.").green());
    println!("  ID: {}", receipt.id);
    println!("  Namespace: {}", receipt.namespace);
    println!("  Added: {}", receipt.date_added);
    Ok(())
}

/// Print every namespace in the index
#[inline]
pub async fn list_namespaces(config: &Config) -> Result<()> {
    let notes = NotesService::from_config(config)?;
    let namespaces = notes.list_namespaces().await?;

    if namespaces.is_empty() {
        println!("No namespaces found in the index.");
        return Ok(());
    }

    println!("Namespaces ({} total):", namespaces.len());
    for namespace in &namespaces {
        println!("  {namespace}");
    }
    Ok(())
}

/// Run a single search and print the results
#[inline]
pub async fn search_once(config: &Config, query: &str, namespace: Option<String>) -> Result<()> {
    let notes = NotesService::from_config(config)?;

    let results = match namespace {
        Some(namespace) => notes.search_in(query, &[namespace]).await?,
        None => notes.search(query).await?,
    };

    print!("{}", format_results(&results));
    Ok(())
}

/// Menu-driven search loop; `namespace` skips the menu
#[inline]
pub async fn interactive_search(config: &Config, namespace: Option<String>) -> Result<()> {
    let notes = NotesService::from_config(config)?;

    loop {
        let selected = match &namespace {
            Some(namespace) => vec![namespace.clone()],
            None => {
                let namespaces: Vec<String> = notes.list_namespaces().await?.into_iter().collect();
                if namespaces.is_empty() {
                    println!("No namespaces found in the index.");
                    break;
                }
                match choose_namespaces(namespaces)? {
                    Some(selected) => selected,
                    None => break,
                }
            }
        };

        let query: String = Input::new()
            .with_prompt("Enter search query")
            .allow_empty(true)
            .interact_text()?;
        let query = query.trim();
        if query.is_empty() {
            println!("Query cannot be empty. Please try again.");
            continue;
        }

        let results = notes.search_in(query, &selected).await?;
        print!("{}", format_results(&results));

        if !Confirm::new()
            .with_prompt("Search again?")
            .default(false)
            .interact()?
        {
            break;
        }
    }

    Ok(())
}

/// `None` when the user picks exit
fn choose_namespaces(namespaces: Vec<String>) -> Result<Option<Vec<String>>> {
    let mut items = namespaces.clone();
    items.push("all".to_string());
    items.push("exit".to_string());

    let choice = Select::new()
        .with_prompt("Select namespace to search")
        .default(0)
        .items(&items)
        .interact()?;

    Ok(match choice {
        index if index < namespaces.len() => Some(vec![namespaces[index].clone()]),
        index if index == namespaces.len() => Some(namespaces),
        _ => None,
    })
}

/// Render results the way the CLI prints them
#[inline]
pub fn format_results(results: &SearchResults) -> String {
    let mut out = String::new();
    let rule = "-".repeat(RULE_WIDTH);

    if !results.failed_namespaces.is_empty() {
        let _ = writeln!(
            out,
            "\nSkipped namespaces: {}",
            results.failed_namespaces.join(", ")
        );
    }

    if results.matches.is_empty() {
        out.push_str("\nNo matching documents found.\n");
        return out;
    }

    let _ = writeln!(out, "\nSearch Results:\n{rule}");
    for (i, hit) in results.matches.iter().enumerate() {
        let _ = writeln!(
            out,
            "\n{}. Score: {:.4} | Namespace: {}",
            i + 1,
            hit.score,
            hit.namespace
        );
        if let Some(title) = &hit.title {
            let _ = writeln!(out, "Title: {title}");
        }
        let _ = writeln!(out, "Content: {}", hit.content);
        let _ = writeln!(out, "{rule}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{Match, Source};

    fn hit(content: &str, score: f32, title: Option<&str>) -> Match {
        Match {
            content: content.to_string(),
            score,
            source: Source::AiChat,
            namespace: "aichat".to_string(),
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn format_empty_results() {
        let out = format_results(&SearchResults::default());
        assert_eq!(out, "\nNo matching documents found.\n");
    }

    #[test]
    fn format_results_with_score_and_title() {
        let results = SearchResults {
            matches: vec![hit("first", 0.91234, Some("Recipes")), hit("second", 0.5, None)],
            namespaces_queried: 1,
            failed_namespaces: Vec::new(),
        };

        let out = format_results(&results);

        assert!(out.contains("1. Score: 0.9123 | Namespace: aichat"));
        assert!(out.contains("Title: Recipes\nContent: first"));
        assert!(out.contains("2. Score: 0.5000 | Namespace: aichat\nContent: second"));
        assert_eq!(out.matches("Title:").count(), 1);
    }

    #[test]
    fn format_mentions_skipped_namespaces() {
        let results = SearchResults {
            matches: Vec::new(),
            namespaces_queried: 2,
            failed_namespaces: vec!["notion".to_string()],
        };

        let out = format_results(&results);

        assert!(out.contains("Skipped namespaces: notion"));
        assert!(out.ends_with("No matching documents found.\n"));
    }
}
