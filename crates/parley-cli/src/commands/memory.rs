//! Memory store commands.

use chrono::Utc;

use parley_store::{MemoryStore, NewMemory};

use crate::output::truncate;
use crate::{AppContext, MemoryAction};

pub async fn handle(action: MemoryAction, ctx: &AppContext) -> anyhow::Result<()> {
    let memory = MemoryStore::load(ctx.storage()?).await?;

    match action {
        MemoryAction::Add {
            content,
            kind,
            importance,
            ttl,
        } => {
            if !(0.0..=1.0).contains(&importance) {
                tracing::warn!(importance, "Importance outside [0, 1] will be clamped");
            }
            let mut new = NewMemory::new(kind, content, importance);
            if let Some(seconds) = ttl {
                new = new.with_ttl(seconds);
            }
            let entry = memory.add(new).await?;
            println!("Stored memory {}", entry.id);
        }
        MemoryAction::List => {
            let purged = memory.purge_expired().await?;
            if purged > 0 {
                tracing::info!(purged, "Removed expired memories");
            }
            let entries = memory.all().await;
            if entries.is_empty() {
                println!("No memories stored.");
                return Ok(());
            }
            let now = Utc::now();
            for entry in entries {
                let expiry = match entry.ttl_seconds {
                    Some(ttl) => {
                        let left = ttl - (now - entry.created_at).num_seconds();
                        format!("  expires in {}s", left.max(0))
                    }
                    None => String::new(),
                };
                println!(
                    "{}  [{}] {:.2}  {}{}",
                    entry.id,
                    entry.kind,
                    entry.importance,
                    truncate(&entry.content, 60),
                    expiry
                );
            }
        }
        MemoryAction::Remove { id } => {
            if memory.remove(&id).await? {
                println!("Removed memory {}", id);
            } else {
                anyhow::bail!("No memory with id '{}'", id);
            }
        }
        MemoryAction::Clear => {
            let count = memory.len().await;
            memory.clear().await?;
            println!("Removed {} memories.", count);
        }
    }
    Ok(())
}
