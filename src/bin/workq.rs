//! workq CLI: operator and agent interface to the work queue.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use workq::agent::WorkQueueAgent;
use workq::config::Config;
use workq::config::secrets::ExposeSecret;
use workq::db::Db;
use workq::model::{WorkAction, WorkId, WorkItem, WorkStatus};
use workq::queue::WorkQueue;
use workq::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "workq", about = "Audited work-claim queue")]
struct Cli {
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new work item
    Create {
        /// What needs doing
        title: String,
        /// Who is creating it
        #[arg(long)]
        supervisor: String,
    },
    /// Assign a specific work item to an agent
    Assign {
        /// Work item ID
        id: WorkId,
        #[arg(long)]
        agent: String,
    },
    /// Mark a work item completed
    Complete {
        /// Work item ID
        id: WorkId,
        #[arg(long)]
        agent: String,
    },
    /// Claim the oldest unclaimed work item
    Next {
        #[arg(long)]
        agent: String,
    },
    /// List work items in creation order
    List {
        /// Filter by status (new, assigned, completed)
        #[arg(long)]
        status: Option<WorkStatus>,
    },
    /// Show the audit trail, most recent first
    Audit,
    /// Show a work item and its history
    Show {
        /// Work item ID
        id: WorkId,
    },
    /// Check the database is reachable
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "workq".to_string(),
        default_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret(), &config.db).await?;
    db.migrate().await?;
    let db = Arc::new(db);
    let queue = Arc::new(WorkQueue::new(Arc::clone(&db), config.queue));
    let out = Output { json: cli.json };

    match cli.command {
        Command::Create { title, supervisor } => {
            out.item(&queue.create(&title, &supervisor).await?)
        }
        Command::Assign { id, agent } => out.item(&queue.assign(id, &agent).await?),
        Command::Complete { id, agent } => out.item(&queue.complete(id, &agent).await?),
        Command::Next { agent } => {
            let agent_facade = WorkQueueAgent::new(Arc::clone(&queue));
            out.item(&agent_facade.pick_next(&agent).await?)
        }
        Command::List { status } => {
            let items = match status {
                Some(status) => queue.list_by_status(status).await?,
                None => queue.list_queue().await?,
            };
            out.items(&items)
        }
        Command::Audit => out.actions(&queue.list_audit().await?),
        Command::Show { id } => {
            let item = queue.get(id).await?;
            let history = queue.history(id).await?;
            out.show(&item, &history)
        }
        Command::Health => {
            db.health_check().await?;
            if out.json {
                out.print_json(&serde_json::json!({ "status": "ok" }))
            } else {
                println!("ok");
                Ok(())
            }
        }
    }
}

struct Output {
    json: bool,
}

impl Output {
    fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    fn item(&self, item: &WorkItem) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(item);
        }
        println!(
            "#{} {} ({}, assigned to {})",
            item.id,
            item.title,
            item.status,
            item.assigned_to.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    fn items(&self, items: &[WorkItem]) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(items);
        }
        if items.is_empty() {
            println!("No work items found.");
            return Ok(());
        }

        println!(
            "{:<6}  {:<10}  {:<16}  {:<16}  TITLE",
            "ID", "STATUS", "ASSIGNED_TO", "UPDATED"
        );
        println!("{}", "-".repeat(80));
        for item in items {
            println!(
                "{:<6}  {:<10}  {:<16}  {:<16}  {}",
                item.id,
                item.status,
                truncate(item.assigned_to.as_deref().unwrap_or("-"), 16),
                item.updated_at.format("%Y-%m-%d %H:%M"),
                item.title
            );
        }
        println!("\n{} item(s)", items.len());
        Ok(())
    }

    fn actions(&self, actions: &[WorkAction]) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(actions);
        }
        if actions.is_empty() {
            println!("No audit records.");
            return Ok(());
        }

        println!(
            "{:<26}  {:<6}  {:<12}  ACTOR",
            "OCCURRED_AT", "ITEM", "ACTION"
        );
        println!("{}", "-".repeat(70));
        for action in actions {
            println!(
                "{:<26}  {:<6}  {:<12}  {}",
                action.occurred_at.format("%Y-%m-%d %H:%M:%S%.6f"),
                action.work_item_id,
                action.action_type,
                action.actor
            );
        }
        Ok(())
    }

    fn show(&self, item: &WorkItem, history: &[WorkAction]) -> anyhow::Result<()> {
        if self.json {
            return self.print_json(&serde_json::json!({
                "item": item,
                "history": history,
            }));
        }

        println!("ID:          {}", item.id);
        println!("Title:       {}", item.title);
        println!("Status:      {}", item.status);
        println!(
            "Assigned To: {}",
            item.assigned_to.as_deref().unwrap_or("-")
        );
        println!("Created:     {}", item.created_at);
        println!("Updated:     {}", item.updated_at);
        println!("---");
        for action in history {
            println!(
                "{}  {:<12}  {}",
                action.occurred_at.format("%Y-%m-%d %H:%M:%S"),
                action.action_type,
                action.actor
            );
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
