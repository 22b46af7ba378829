//! ponder — command-line front end for the Ponder journaling server
//!
//! Talks JSON to the ponder-server HTTP API. Core journaling commands fail
//! loudly; the AI enrichment commands (summarize / reflect / trends) degrade
//! to fallback values instead, so a flaky completion API never blocks writing.
//!
//! # Subcommands
//! - `new <content>`        — write a new entry
//! - `list [--json]`        — list entries, newest first
//! - `show <id>`            — print one entry with its enrichments
//! - `edit <id> <content>`  — rewrite an entry's text
//! - `delete <id>`          — delete an entry
//! - `summarize <id>`       — generate + store a summary
//! - `reflect <id>`         — generate + store reflection questions
//! - `trends`               — trend narrative across all entries
//! - `export [-o <file>]`   — export all entries as JSON
//! - `import <file>`        — import a JSON export
//! - `reset [--yes]`        — delete all entries
//! - `status`               — show server health

use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::json;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8970";
const SUMMARY_FALLBACK: &str = "Unable to generate summary.";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "ponder", version, about = "Ponder journaling CLI")]
struct Cli {
    /// Ponder HTTP server URL (overrides PONDER_URL env var)
    #[arg(long, env = "PONDER_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a new journal entry
    New {
        /// Entry text
        content: String,
    },

    /// List entries, newest first
    List {
        /// Output raw wire-form JSON instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Show one entry, including summary and reflection questions
    Show { id: String },

    /// Rewrite an entry's text in place
    Edit { id: String, content: String },

    /// Delete an entry
    Delete { id: String },

    /// Generate a summary for an entry and store it
    Summarize { id: String },

    /// Generate reflection questions for an entry and store them
    Reflect { id: String },

    /// Summarize trends across all entries
    Trends,

    /// Export all entries as a JSON file
    Export {
        /// Output path ("-" for stdout)
        #[arg(short, long, default_value = "journal-export.json")]
        output: PathBuf,
    },

    /// Import entries from a JSON export file
    Import { file: PathBuf },

    /// Permanently delete all entries
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show Ponder server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

/// Wire-form entry as returned by the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub content: String,
    pub summary: Option<String>,
    pub reflection_questions: Option<Vec<String>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    questions: Vec<String>,
}

// ============================================================================
// Display helpers
// ============================================================================

/// First non-empty line of an entry, truncated for table display.
pub fn preview_line(content: &str, max_chars: usize) -> String {
    content
        .lines()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .chars()
        .take(max_chars)
        .collect()
}

/// Wire timestamp → "YYYY-MM-DD HH:MM" local display, or the raw string if it
/// fails to parse (the server is trusted, but don't panic over display).
pub fn display_timestamp(raw: &str) -> String {
    match raw.parse::<DateTime<Utc>>() {
        Ok(t) => t.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Sort newest-first for display. The store itself leaves order unspecified.
pub fn sort_newest_first(entries: &mut [Entry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Entry texts oldest-first, the order the trends prompt expects.
pub fn contents_oldest_first(mut entries: Vec<Entry>) -> Vec<String> {
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    entries.into_iter().map(|e| e.content).collect()
}

// ============================================================================
// HTTP Client
// ============================================================================

struct Api {
    client: reqwest::blocking::Client,
    server: String,
}

impl Api {
    fn new(server: String) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, server })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server, path)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self.client.get(self.url(path)).send()?;
        Self::parse(resp)
    }

    fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<T> {
        let resp = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()?;
        Self::parse(resp)
    }

    fn delete(&self, path: &str) -> anyhow::Result<()> {
        let resp = self.client.delete(self.url(path)).send()?;
        Self::parse::<serde_json::Value>(resp)?;
        Ok(())
    }

    fn parse<T: serde::de::DeserializeOwned>(
        resp: reqwest::blocking::Response,
    ) -> anyhow::Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body: serde_json::Value = resp.json().unwrap_or_default();
            let msg = body["error"].as_str().unwrap_or("unknown error");
            anyhow::bail!("server returned {}: {}", status, msg);
        }
        Ok(resp.json()?)
    }

    fn fetch_entry(&self, id: &str) -> anyhow::Result<Entry> {
        self.get_json(&format!("/entries/{id}"))
    }

    /// Forward the full entry back through upsert, with `created_at`
    /// preserved so history survives the round trip.
    fn store_entry(&self, entry: &Entry) -> anyhow::Result<Entry> {
        self.send_json(
            reqwest::Method::POST,
            "/entries",
            &json!({
                "id": entry.id,
                "content": entry.content,
                "summary": entry.summary,
                "reflectionQuestions": entry.reflection_questions,
                "createdAt": entry.created_at,
            }),
        )
    }

    // --- Soft-fail enrichment calls -------------------------------------
    // Any transport, HTTP, or parse failure degrades to a fallback value;
    // these never abort the command.

    fn fetch_summary(&self, content: &str) -> String {
        let result: anyhow::Result<SummaryResponse> = self.send_json(
            reqwest::Method::POST,
            "/summarize",
            &json!({ "content": content }),
        );
        match result {
            Ok(r) => r.summary,
            Err(e) => {
                eprintln!("ponder: error generating summary: {e}");
                SUMMARY_FALLBACK.to_string()
            }
        }
    }

    fn fetch_reflection_questions(&self, content: &str) -> Option<Vec<String>> {
        let result: anyhow::Result<QuestionsResponse> = self.send_json(
            reqwest::Method::POST,
            "/reflect",
            &json!({ "content": content }),
        );
        match result {
            Ok(r) => Some(r.questions),
            Err(e) => {
                eprintln!("ponder: error generating reflection questions: {e}");
                None
            }
        }
    }

    fn fetch_trends(&self, contents: &[String]) -> String {
        let result: anyhow::Result<SummaryResponse> = self.send_json(
            reqwest::Method::POST,
            "/trends",
            &json!({ "entries": contents }),
        );
        match result {
            Ok(r) => r.summary,
            Err(e) => {
                eprintln!("ponder: error generating trends summary: {e}");
                String::new()
            }
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn print_entry(entry: &Entry) {
    println!("id:      {}", entry.id);
    println!("written: {}", display_timestamp(&entry.created_at));
    println!("updated: {}", display_timestamp(&entry.updated_at));
    println!("\n{}\n", entry.content);
    if let Some(summary) = &entry.summary {
        println!("summary: {}", summary);
    }
    if let Some(questions) = &entry.reflection_questions {
        println!("reflection questions:");
        for q in questions {
            println!("  - {}", q);
        }
    }
}

fn do_new(api: &Api, content: String) -> anyhow::Result<()> {
    let entry: Entry = api.send_json(
        reqwest::Method::POST,
        "/entries",
        &json!({ "content": content }),
    )?;
    println!("Saved entry {}", entry.id);
    Ok(())
}

fn do_list(api: &Api, json_output: bool) -> anyhow::Result<()> {
    let mut list: ListResponse = api.get_json("/entries")?;
    sort_newest_first(&mut list.entries);

    if json_output {
        let wire: Vec<serde_json::Value> = list
            .entries
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "content": e.content,
                    "summary": e.summary,
                    "reflectionQuestions": e.reflection_questions,
                    "createdAt": e.created_at,
                    "updatedAt": e.updated_at,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&wire)?);
        return Ok(());
    }

    if list.entries.is_empty() {
        println!("No entries yet. Write one with: ponder new \"...\"");
        return Ok(());
    }
    for e in &list.entries {
        println!(
            "{}  {}  {}",
            display_timestamp(&e.created_at),
            e.id,
            preview_line(&e.content, 60)
        );
    }
    Ok(())
}

fn do_summarize(api: &Api, id: &str) -> anyhow::Result<()> {
    let mut entry = api.fetch_entry(id)?;
    let summary = api.fetch_summary(&entry.content);

    entry.summary = Some(summary.clone());
    api.store_entry(&entry)?;

    println!("{}", summary);
    Ok(())
}

fn do_reflect(api: &Api, id: &str) -> anyhow::Result<()> {
    let mut entry = api.fetch_entry(id)?;

    match api.fetch_reflection_questions(&entry.content) {
        Some(questions) => {
            entry.reflection_questions = Some(questions.clone());
            api.store_entry(&entry)?;
            for q in &questions {
                println!("- {}", q);
            }
        }
        None => println!("No reflection questions available."),
    }
    Ok(())
}

fn do_trends(api: &Api) -> anyhow::Result<()> {
    let list: ListResponse = api.get_json("/entries")?;
    if list.entries.is_empty() {
        println!("No entries to analyze yet.");
        return Ok(());
    }

    let contents = contents_oldest_first(list.entries);
    let summary = api.fetch_trends(&contents);
    if summary.is_empty() {
        println!("No trends available.");
    } else {
        println!("{}", summary);
    }
    Ok(())
}

fn do_export(api: &Api, output: &PathBuf) -> anyhow::Result<()> {
    let payload: serde_json::Value = api.get_json("/export")?;
    let pretty = serde_json::to_string_pretty(&payload)?;

    if output.as_os_str() == "-" {
        println!("{}", pretty);
    } else {
        std::fs::write(output, pretty)?;
        let count = payload["entries"].as_array().map(Vec::len).unwrap_or(0);
        println!("Exported {} entries to {}", count, output.display());
    }
    Ok(())
}

fn do_import(api: &Api, file: &PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)?;
    let payload: serde_json::Value = serde_json::from_str(&text)?;

    let body: serde_json::Value = api.send_json(reqwest::Method::POST, "/import", &payload)?;
    let imported = body["imported"].as_u64().unwrap_or(0);
    println!(
        "Successfully imported {} {}.",
        imported,
        if imported == 1 { "entry" } else { "entries" }
    );
    Ok(())
}

fn do_reset(api: &Api, yes: bool) -> anyhow::Result<()> {
    if !yes {
        print!("Delete all entries? This cannot be undone. [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }
    api.delete("/entries")?;
    println!("All entries have been deleted.");
    Ok(())
}

fn do_status(api: &Api) -> anyhow::Result<()> {
    let body: serde_json::Value = api.get_json("/health")?;
    println!("Ponder server: {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
    println!("SQLite:        {}", body["sqlite"].as_str().unwrap_or("?"));
    println!("Entries:       {}", body["entries"]);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let api = match Api::new(server) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("ponder: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::New { content } => do_new(&api, content),
        Commands::List { json } => do_list(&api, json),
        Commands::Show { id } => api.fetch_entry(&id).map(|e| print_entry(&e)),
        Commands::Edit { id, content } => api
            .send_json::<Entry>(
                reqwest::Method::PUT,
                &format!("/entries/{id}"),
                &json!({ "content": content }),
            )
            .map(|e| println!("Updated entry {}", e.id)),
        Commands::Delete { id } => api
            .delete(&format!("/entries/{id}"))
            .map(|_| println!("Deleted.")),
        Commands::Summarize { id } => do_summarize(&api, &id),
        Commands::Reflect { id } => do_reflect(&api, &id),
        Commands::Trends => do_trends(&api),
        Commands::Export { output } => do_export(&api, &output),
        Commands::Import { file } => do_import(&api, &file),
        Commands::Reset { yes } => do_reset(&api, yes),
        Commands::Status => do_status(&api),
    };

    if let Err(e) = result {
        eprintln!("ponder: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
