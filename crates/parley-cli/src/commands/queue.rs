//! Offline queue commands.

use parley_agent::{AgentConfig, ChatTurnRequest};
use parley_core::Role;
use parley_store::OfflineQueue;

use crate::output::{truncate, DeltaWriter};
use crate::{AppContext, QueueAction};

pub async fn handle(action: QueueAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        QueueAction::List => {
            let queue = OfflineQueue::<ChatTurnRequest>::load(ctx.storage()?).await?;
            let items = queue.list().await;
            if items.is_empty() {
                println!("Queue is empty.");
                return Ok(());
            }
            for item in items {
                println!(
                    "{}  {}  attempts={}  {}",
                    item.id,
                    item.created_at.format("%Y-%m-%d %H:%M:%S"),
                    item.attempts,
                    truncate(&last_user_text(&item.payload), 60)
                );
                if let Some(error) = &item.last_error {
                    println!("    last error: {}", error);
                }
            }
        }
        QueueAction::Flush => {
            let agent = ctx.agent(AgentConfig::from(&ctx.config.agent)).await?;
            let sink = DeltaWriter::stdout();
            let report = agent.replay_queued(&sink).await?;
            if !sink.written().is_empty() {
                println!();
            }
            println!(
                "Processed {}, failed {}, remaining {}",
                report.processed, report.failed, report.remaining
            );
        }
        QueueAction::Clear => {
            let queue = OfflineQueue::<ChatTurnRequest>::load(ctx.storage()?).await?;
            let count = queue.len().await;
            queue.clear().await?;
            println!("Removed {} queued request(s).", count);
        }
    }
    Ok(())
}

fn last_user_text(request: &ChatTurnRequest) -> String {
    request
        .conversation
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text.clone())
        .unwrap_or_default()
}
