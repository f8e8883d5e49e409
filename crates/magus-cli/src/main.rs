//! Magus CLI
//!
//! Command-line operations client for the Magus freight email-automation backend.

use std::sync::Arc;

use anyhow::Result;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use magus_core::aggregate::{
    bucket_by_period, category_counts, route_leaderboard, sender_leaderboard, ChartBucket,
    Period,
};
use magus_core::api::{fetch_all_email_records, ApiClient, MagusApi};
use magus_core::assistant::{Assistant, Conversation};
use magus_core::config::Config;
use magus_core::inbox::{find_email, InboxController, InboxFilter, Total};
use magus_core::mapper::{map_records, MapperOptions};
use magus_core::models::{
    Decision, Email, RouteStatsQuery, StepClassifier, TitleHeuristic, TraceStep, UiStatus,
};
use magus_core::review::submit_decision;

#[derive(Parser)]
#[command(name = "magus")]
#[command(about = "Magus - Operations client for the freight email-automation backend")]
#[command(long_about = "Magus answers freight quote requests by email. Most are replied to \
automatically; the rest wait for a human decision. This client lists the inbox, submits \
decisions, and shows processing statistics.

QUICK START:
  1. Write a config:   magus config init
  2. Pending emails:   magus inbox list --filter needs_review
  3. Inspect one:      magus inbox show <id>
  4. Send the quote:   magus decide <id> accept --quote \"USD 2,328.75\" --yes

OUTPUT FORMAT:
  All commands output JSON by default (best for programmatic/AI use).
  Add --human only for direct terminal reading by humans.

JSON RESPONSE FIELDS:
  inbox list returns: filter, total, exhausted, count, items
    (items: id, sender_name, from, subject, preview, status, backend_status, timestamp, confidence)

  total is either {kind: server, count} for server-paged filters (all, needs_review) or
    {kind: client_filtered, matched, scanned, truncated} for filters computed locally

  decide returns: success, id, decision, sent, status, quote_text, webhook_status

  chart returns: period, timezone, scanned, truncated, buckets (label, total, reviewed, processed)

ENVIRONMENT:
  MAGUS_API_BASE_URL       - Override api.base_url
  MAGUS_ASSISTANT_API_KEY  - Completion API key used by 'ask'
  MAGUS_ASSISTANT_MODEL    - Override assistant.model
  MAGUS_TIMEZONE           - Override general.timezone (chart bucketing)
  RUST_LOG                 - Log filter for stderr (default: warn)

EXAMPLES:
  magus inbox list --filter auto_replied --pages 2
  magus decide 6f1c2a reject --comment \"Lane not served\" --yes
  magus chart --period hour --human
  magus leaderboard routes --top 5
  magus ask \"How many quotes are waiting for review?\"")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in human-readable format instead of JSON. Applies to all subcommands.
    #[arg(long, global = true)]
    human: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List, show and count inbox emails by filter.
    Inbox {
        #[command(subcommand)]
        command: InboxCommands,
    },
    /// Accept (send the quote) or reject a pending email.
    #[command(long_about = "Submit a human decision for an email waiting for review.

accept: sends the reply, optionally with a refined quote. The email is marked processed
        only when the backend confirms the reply was sent.
reject: marks the email ignored. No reply goes out.

Blank --quote/--comment values are sent as null. Without --yes, human mode asks for
confirmation and JSON mode refuses to submit.

EXAMPLES:
  magus decide 6f1c2a accept --quote \"USD 2,328.75\" --yes
  magus decide 6f1c2a reject --comment \"Lane not served\" --yes")]
    Decide {
        /// Email record ID
        id: String,

        /// accept or reject
        decision: Decision,

        /// Refined quote text to send instead of the draft
        #[arg(long)]
        quote: Option<String>,

        /// Operator comment stored with the decision
        #[arg(long)]
        comment: Option<String>,

        /// Submit without asking
        #[arg(long)]
        yes: bool,
    },
    /// Server-side sender and route statistics.
    Stats {
        #[command(subcommand)]
        command: StatsCommands,
    },
    /// Processing volume bucketed by hour, day or week in the configured time zone.
    Chart {
        /// Bucket width: hour, day or week (weeks start on Monday)
        #[arg(long, default_value = "day")]
        period: Period,
    },
    /// Top senders or routes computed from the full dataset.
    Leaderboard {
        #[command(subcommand)]
        command: LeaderboardCommands,
    },
    /// Ask the Magus assistant a question about the inbox.
    Ask {
        /// The question (quote it or pass several words)
        #[arg(required = true)]
        question: Vec<String>,
    },
    /// Show or create the configuration file.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

// ============================================================================
// Inbox Commands
// ============================================================================

#[derive(Subcommand)]
enum InboxCommands {
    /// List emails for a filter: all, processed, needs_review, auto_replied, ignored.
    /// all and needs_review are paged by the server; the others are filtered locally
    /// from the full dataset, and the total says so.
    List {
        /// Filter to apply
        #[arg(long, default_value = "all")]
        filter: InboxFilter,

        /// Page size (defaults to inbox.page_size)
        #[arg(long)]
        limit: Option<u32>,

        /// Number of pages to load
        #[arg(long, default_value = "1")]
        pages: u32,
    },
    /// Show one email with its draft reply, data sources and processing steps.
    Show {
        /// Email record ID
        id: String,
    },
    /// Email counts per UI category and per backend status.
    Counts,
}

// ============================================================================
// Stats Commands
// ============================================================================

#[derive(Subcommand)]
enum StatsCommands {
    /// Top senders as counted by the backend.
    Senders,
    /// Top origin → destination routes as counted by the backend.
    Routes {
        /// Number of routes to return (defaults to stats.route_top)
        #[arg(long)]
        top: Option<u32>,

        /// Rows the backend may scan (defaults to stats.route_max_rows)
        #[arg(long)]
        max_rows: Option<u32>,

        /// Backend scan batch size (defaults to stats.route_batch_size)
        #[arg(long)]
        batch_size: Option<u32>,
    },
}

// ============================================================================
// Leaderboard Commands
// ============================================================================

#[derive(Subcommand)]
enum LeaderboardCommands {
    /// Senders with the most emails.
    Senders {
        #[arg(long, default_value = "10")]
        top: usize,
    },
    /// Routes with the most quote requests.
    Routes {
        #[arg(long, default_value = "10")]
        top: usize,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration (file + environment).
    Show,
    /// Print the config file path.
    Path,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// JSON Output Types
// ============================================================================

#[derive(Serialize)]
struct EmailSummary {
    id: String,
    sender_name: String,
    from: String,
    subject: String,
    preview: String,
    status: UiStatus,
    backend_status: String,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<String>,
}

impl EmailSummary {
    fn from_email(email: &Email) -> Self {
        Self {
            id: email.id.clone(),
            sender_name: email.sender_name.clone(),
            from: email.from.clone(),
            subject: email.subject.clone(),
            preview: email.preview.clone(),
            status: email.status,
            backend_status: email.backend_status.to_string(),
            timestamp: email.timestamp.clone(),
            confidence: email.confidence.clone(),
        }
    }
}

#[derive(Serialize)]
struct InboxListing {
    filter: InboxFilter,
    total: Total,
    exhausted: bool,
    count: usize,
    items: Vec<EmailSummary>,
}

#[derive(Serialize)]
struct DecisionResult {
    success: bool,
    id: String,
    decision: Decision,
    sent: bool,
    status: UiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    quote_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_status: Option<u16>,
}

#[derive(Serialize)]
struct ChartOutput {
    period: Period,
    timezone: String,
    scanned: usize,
    truncated: bool,
    buckets: Vec<ChartBucket>,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    error: String,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<&'a str>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let human = cli.human;
    init_tracing();

    let result = match cli.command {
        Commands::Inbox { command } => handle_inbox_command(command, human).await,
        Commands::Decide {
            id,
            decision,
            quote,
            comment,
            yes,
        } => decide(&id, decision, quote, comment, yes, human).await,
        Commands::Stats { command } => handle_stats_command(command, human).await,
        Commands::Chart { period } => chart(period, human).await,
        Commands::Leaderboard { command } => handle_leaderboard_command(command, human).await,
        Commands::Ask { question } => ask(&question.join(" "), human).await,
        Commands::Config { command } => handle_config_command(command, human),
    };

    if let Err(e) = result {
        report_error(&e, human);
        std::process::exit(1);
    }
}

/// Logs go to stderr so JSON on stdout stays parseable
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report_error(e: &anyhow::Error, human: bool) {
    let core = e.downcast_ref::<magus_core::Error>();
    let code = core.map(|c| c.code()).unwrap_or("INTERNAL_ERROR");
    let hint = core.and_then(|c| c.action_hint());

    if human {
        eprintln!("❌ {}", e);
        if let Some(hint) = hint {
            eprintln!("   {}", hint);
        }
    } else {
        let out = ErrorOutput {
            error: e.to_string(),
            code,
            hint,
        };
        if let Ok(json) = serde_json::to_string_pretty(&out) {
            println!("{}", json);
        }
    }
}

/// Loaded config plus an API client built from it
struct Context {
    config: Config,
    api: Arc<dyn MagusApi>,
}

impl Context {
    fn load() -> Result<Self> {
        let config = Config::load()?;
        let api: Arc<dyn MagusApi> = Arc::new(ApiClient::new(&config.api)?);
        debug!("Using Magus API at {}", config.api.base_url);
        Ok(Self { config, api })
    }

    fn timezone(&self) -> Result<Tz> {
        Ok(self.config.timezone()?)
    }

    fn mapper_options(&self) -> MapperOptions {
        MapperOptions::from(&self.config.inbox)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Inbox Command Handlers
// ============================================================================

async fn handle_inbox_command(command: InboxCommands, human: bool) -> Result<()> {
    let ctx = Context::load()?;

    match command {
        InboxCommands::List {
            filter,
            limit,
            pages,
        } => {
            let mut inbox_config = ctx.config.inbox.clone();
            if let Some(limit) = limit {
                inbox_config.page_size = limit.clamp(1, 500);
            }
            let inbox = InboxController::new(ctx.api.clone(), &inbox_config);

            inbox.set_filter(filter).await?;
            for _ in 1..pages.max(1) {
                if inbox.snapshot().exhausted {
                    break;
                }
                inbox.load_more().await?;
            }
            let state = inbox.snapshot();

            if human {
                let tz = ctx.timezone()?;
                println!("\n📬 Inbox: {}", filter);
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                match state.total {
                    Total::Server { count } => {
                        println!("Showing {} of {}", state.items.len(), count)
                    }
                    Total::ClientFiltered {
                        matched,
                        scanned,
                        truncated,
                    } => {
                        println!(
                            "Showing {} of {} matches ({} emails scanned{})",
                            state.items.len(),
                            matched,
                            scanned,
                            if truncated { ", row cap reached" } else { "" }
                        );
                    }
                }
                println!();
                if state.items.is_empty() {
                    println!("No emails found.");
                }
                for email in &state.items {
                    println!("{} {}", status_glyph(email.status), email.subject);
                    println!("   From: {} <{}>", email.sender_name, email.from);
                    println!("   Received: {}", format_received(email, tz));
                    if !email.preview.is_empty() {
                        println!("   {}", email.preview);
                    }
                    println!("   ID: {}", email.id);
                    println!();
                }
                if !state.exhausted {
                    println!("More available: re-run with --pages {}", pages.max(1) + 1);
                }
            } else {
                print_json(&InboxListing {
                    filter: state.filter,
                    total: state.total,
                    exhausted: state.exhausted,
                    count: state.items.len(),
                    items: state.items.iter().map(EmailSummary::from_email).collect(),
                })?;
            }
        }

        InboxCommands::Show { id } => {
            let email =
                find_email(ctx.api.as_ref(), &ctx.config.inbox, &ctx.mapper_options(), &id)
                    .await?;
            if human {
                print_email_human(&email, ctx.timezone()?);
            } else {
                print_json(&email)?;
            }
        }

        InboxCommands::Counts => {
            let raw = ctx.api.status_counts().await?;
            let categories = category_counts(&raw);

            if human {
                println!("\n📊 Inbox counts");
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                println!("All:           {}", categories.all);
                for status in UiStatus::ALL {
                    println!(
                        "{} {:<13} {}",
                        status_glyph(status),
                        format!("{}:", status.label()),
                        categories.get(status)
                    );
                }
                let mut backend: Vec<_> = raw.iter().collect();
                backend.sort();
                println!("\nBackend statuses:");
                for (status, n) in backend {
                    println!("  {:<26} {}", status, n);
                }
            } else {
                print_json(&serde_json::json!({
                    "categories": categories,
                    "backend": raw,
                }))?;
            }
        }
    }

    Ok(())
}

fn status_glyph(status: UiStatus) -> &'static str {
    match status {
        UiStatus::Processed => "✅",
        UiStatus::NeedsReview => "👀",
        UiStatus::AutoReplied => "🤖",
        UiStatus::Ignored => "🚫",
    }
}

fn format_received(email: &Email, tz: Tz) -> String {
    match email.received_at {
        Some(dt) => dt.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z").to_string(),
        None => email.timestamp.clone(),
    }
}

fn print_email_human(email: &Email, tz: Tz) {
    println!("\n{} {}", status_glyph(email.status), email.subject);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("From:     {} <{}>", email.sender_name, email.from);
    println!("To:       {}", email.to);
    println!("Received: {}", format_received(email, tz));
    println!("Status:   {} ({})", email.status.label(), email.backend_status);
    if let Some(confidence) = &email.confidence {
        println!("Confidence: {}", confidence);
    }
    if let Some(secs) = email.response_time_secs {
        println!("Response time: {}m {}s", secs / 60, secs % 60);
    }
    if let Some(route) = &email.route {
        let place = |p: &Option<String>| p.clone().unwrap_or_else(|| "?".to_string());
        print!("Route:    {} → {}", place(&route.origin), place(&route.destination));
        if let Some(price) = route.price {
            print!(" @ {:.2} {}", price, route.currency.clone().unwrap_or_default());
        }
        println!();
    }

    println!("\n{}", email.body);

    if !email.draft_response.is_empty() {
        println!("\n✉️  Draft reply");
        println!("────────────────────────────────────────");
        println!("{}", email.draft_response);
    }

    if !email.data_sources.is_empty() {
        println!("\n🗄  Data sources");
        for source in &email.data_sources {
            println!("   - {} ({})", source.name, source.kind);
        }
    }

    if !email.steps.is_empty() {
        println!("\n🧭 Processing steps");
        let classifier = TitleHeuristic;
        for (i, step) in email.steps.iter().enumerate() {
            let kind = classifier.classify(step);
            match step {
                TraceStep::Step(rec) => {
                    println!(
                        "{:>3}. {} {}",
                        i + 1,
                        kind.glyph(),
                        rec.title.as_deref().unwrap_or("(untitled step)")
                    );
                    if let Some(summary) = &rec.summary {
                        println!("       {}", summary);
                    }
                }
                TraceStep::Unknown(value) => {
                    println!("{:>3}. {} {}", i + 1, kind.glyph(), value);
                }
            }
        }
    }
    println!("\nID: {}", email.id);
}

// ============================================================================
// Decision Handler
// ============================================================================

async fn decide(
    id: &str,
    decision: Decision,
    quote: Option<String>,
    comment: Option<String>,
    yes: bool,
    human: bool,
) -> Result<()> {
    let ctx = Context::load()?;
    let mut email =
        find_email(ctx.api.as_ref(), &ctx.config.inbox, &ctx.mapper_options(), id).await?;

    if !yes {
        if !human {
            println!("{{\"success\": false, \"error\": \"Must pass --yes to submit a decision\"}}");
            return Ok(());
        }

        use dialoguer::Confirm;
        println!("\n{} {}", status_glyph(email.status), email.subject);
        println!("   From: {} <{}>", email.sender_name, email.from);
        if let Some(q) = quote.as_deref().filter(|q| !q.trim().is_empty()) {
            println!("   Quote: {}", q);
        }
        let proceed = Confirm::new()
            .with_prompt(format!("{} this email?", capitalize(&decision.to_string())))
            .default(false)
            .interact()?;
        if !proceed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let response = submit_decision(
        ctx.api.as_ref(),
        &mut email,
        decision,
        quote.as_deref(),
        comment.as_deref(),
    )
    .await?;

    if human {
        match decision {
            Decision::Accept => println!("✅ Reply sent for {}", email.id),
            Decision::Reject => println!("🚫 Rejected {}", email.id),
        }
        println!("   Status: {}", email.status.label());
        if let Some(q) = &response.quote_text {
            println!("   Quote: {}", q);
        }
        if let Some(webhook) = &response.webhook {
            println!("   Webhook: HTTP {}", webhook.status_code);
        }
    } else {
        print_json(&DecisionResult {
            success: true,
            id: email.id.clone(),
            decision,
            sent: email.sent.unwrap_or(false),
            status: email.status,
            quote_text: response.quote_text.clone(),
            webhook_status: response.webhook.as_ref().map(|w| w.status_code),
        })?;
    }
    Ok(())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Stats Command Handlers
// ============================================================================

async fn handle_stats_command(command: StatsCommands, human: bool) -> Result<()> {
    let ctx = Context::load()?;

    match command {
        StatsCommands::Senders => {
            let stats = ctx.api.sender_stats().await?;
            if human {
                println!("\n📨 Top senders ({} unique, {} scanned)", stats.unique_senders, stats.scanned);
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                for (i, item) in stats.items.iter().enumerate() {
                    println!("{:>3}. {:<40} {}", i + 1, item.sender, item.count);
                }
                if stats.reached_max_rows {
                    println!("\n⚠️  Row cap of {} reached, counts are partial", stats.max_rows);
                }
            } else {
                print_json(&stats)?;
            }
        }

        StatsCommands::Routes {
            top,
            max_rows,
            batch_size,
        } => {
            let defaults = RouteStatsQuery::from(&ctx.config.stats);
            let query = RouteStatsQuery {
                top: top.unwrap_or(defaults.top),
                max_rows: max_rows.unwrap_or(defaults.max_rows),
                batch_size: batch_size.unwrap_or(defaults.batch_size),
            };
            let stats = ctx.api.route_stats(&query).await?;
            if human {
                println!("\n🚢 Top routes ({} unique, {} scanned)", stats.unique_routes, stats.scanned);
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                for (i, item) in stats.items.iter().enumerate() {
                    println!("{:>3}. {:<40} {}", i + 1, item.route, item.count);
                }
                if stats.reached_max_rows {
                    println!("\n⚠️  Row cap of {} reached, counts are partial", stats.max_rows);
                }
            } else {
                print_json(&stats)?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// Chart & Leaderboard Handlers
// ============================================================================

async fn chart(period: Period, human: bool) -> Result<()> {
    let ctx = Context::load()?;
    let tz = ctx.timezone()?;
    let dataset = fetch_all_email_records(
        ctx.api.as_ref(),
        ctx.config.inbox.full_fetch_batch,
        ctx.config.inbox.full_fetch_max_rows,
    )
    .await?;
    let buckets = bucket_by_period(&dataset.records, period, tz);

    if human {
        println!("\n📈 Emails per {} ({})", period, tz);
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        let widest = buckets.iter().map(|b| b.total).max().unwrap_or(0).max(1);
        for b in &buckets {
            let bar = "█".repeat(((b.total * 30) / widest) as usize);
            println!(
                "{:<18} {:<30} {:>5}  reviewed {:>4}  processed {:>4}",
                b.label, bar, b.total, b.reviewed, b.processed
            );
        }
        if dataset.reached_max_rows {
            println!("\n⚠️  Row cap reached after {} emails", dataset.scanned());
        }
    } else {
        print_json(&ChartOutput {
            period,
            timezone: tz.to_string(),
            scanned: dataset.scanned(),
            truncated: dataset.reached_max_rows,
            buckets,
        })?;
    }
    Ok(())
}

async fn handle_leaderboard_command(command: LeaderboardCommands, human: bool) -> Result<()> {
    let ctx = Context::load()?;
    let dataset = fetch_all_email_records(
        ctx.api.as_ref(),
        ctx.config.inbox.full_fetch_batch,
        ctx.config.inbox.full_fetch_max_rows,
    )
    .await?;

    let (title, rows): (&str, Vec<(String, u64)>) = match command {
        LeaderboardCommands::Senders { top } => {
            let emails = map_records(&dataset.records, &ctx.mapper_options());
            let items = sender_leaderboard(&emails, top);
            ("📨 Sender leaderboard", items.into_iter().map(|i| (i.sender, i.count)).collect())
        }
        LeaderboardCommands::Routes { top } => {
            let items = route_leaderboard(&dataset.records, top);
            ("🚢 Route leaderboard", items.into_iter().map(|i| (i.route, i.count)).collect())
        }
    };

    if human {
        println!("\n{} ({} emails scanned)", title, dataset.scanned());
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if rows.is_empty() {
            println!("Nothing to rank yet.");
        }
        for (i, (key, count)) in rows.iter().enumerate() {
            println!("{:>3}. {:<40} {}", i + 1, key, count);
        }
    } else {
        let items: Vec<_> = rows
            .iter()
            .map(|(key, count)| serde_json::json!({ "key": key, "count": count }))
            .collect();
        print_json(&serde_json::json!({
            "scanned": dataset.scanned(),
            "truncated": dataset.reached_max_rows,
            "items": items,
        }))?;
    }
    Ok(())
}

// ============================================================================
// Assistant Handler
// ============================================================================

async fn ask(question: &str, human: bool) -> Result<()> {
    let ctx = Context::load()?;
    let assistant = Assistant::new(&ctx.config.assistant)?;
    let mut conversation = Conversation::new();

    let reply = assistant
        .ask(&mut conversation, question, ctx.api.as_ref())
        .await?;

    if human {
        println!("\n🧙 Magus ({})", assistant.model());
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        println!("{}", reply.content);
    } else {
        print_json(&serde_json::json!({
            "model": assistant.model(),
            "messages": conversation.messages(),
        }))?;
    }
    Ok(())
}

// ============================================================================
// Config Command Handlers
// ============================================================================

fn handle_config_command(command: ConfigCommands, human: bool) -> Result<()> {
    let path = Config::default_path();

    match command {
        ConfigCommands::Path => {
            if human {
                println!("{}", path.display());
            } else {
                print_json(&serde_json::json!({ "path": path }))?;
            }
        }

        ConfigCommands::Show => {
            let mut config = Config::load_from(&path)?;
            config.apply_env(|key| std::env::var(key).ok());
            let valid = config.validate();

            if human {
                println!("# {}", path.display());
                print!("{}", toml::to_string_pretty(&config)?);
                println!(
                    "\n# assistant API key: {}",
                    if config.assistant.api_key.is_some() { "set" } else { "not set" }
                );
                if let Err(e) = &valid {
                    println!("\n❌ {}", e);
                }
            } else {
                print_json(&serde_json::json!({
                    "path": path,
                    "config": config,
                    "assistant_api_key_set": config.assistant.api_key.is_some(),
                    "valid": valid.is_ok(),
                    "error": valid.err().map(|e| e.to_string()),
                }))?;
            }
        }

        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                if human {
                    println!("Config already exists at {}", path.display());
                    println!("Pass --force to overwrite it with defaults.");
                } else {
                    println!("{{\"success\": false, \"error\": \"Config already exists, pass --force to overwrite\"}}");
                }
                return Ok(());
            }

            Config::default().save_to(&path)?;
            if human {
                println!("✅ Wrote default config to {}", path.display());
            } else {
                print_json(&serde_json::json!({ "success": true, "path": path }))?;
            }
        }
    }

    Ok(())
}
