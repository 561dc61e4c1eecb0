//! MCP server inspection commands.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use parley_core::McpServerDescriptor;
use parley_mcp::{format_tool_result, McpClient};

use crate::{AppContext, McpAction};

pub async fn handle(action: McpAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        McpAction::Tools { server } => {
            let servers = select_servers(ctx, server.as_deref())?;
            let report = ctx.registry().discover_tools(&servers).await;

            for (server_id, message) in &report.errors {
                eprintln!("  ✗ {}: {}", server_id, message);
            }
            if report.tools.is_empty() {
                println!("No tools available.");
            }
            for tool in &report.tools {
                println!("{}", tool.function_name());
                if let Some(description) = tool.description.as_deref().filter(|d| !d.is_empty()) {
                    println!("    {}", description);
                }
            }
        }
        McpAction::Resources { server } => {
            for client in clients(ctx, server.as_deref())? {
                println!("{}:", client.server().name);
                let resources = client.list_resources().await;
                if resources.is_empty() {
                    println!("  (none)");
                }
                for resource in resources {
                    let name = if resource.name.is_empty() {
                        resource.uri.as_str()
                    } else {
                        resource.name.as_str()
                    };
                    match resource.mime_type {
                        Some(mime) => println!("  {} - {} [{}]", name, resource.uri, mime),
                        None => println!("  {} - {}", name, resource.uri),
                    }
                }
            }
        }
        McpAction::Prompts { server } => {
            for client in clients(ctx, server.as_deref())? {
                println!("{}:", client.server().name);
                let prompts = client.list_prompts().await;
                if prompts.is_empty() {
                    println!("  (none)");
                }
                for prompt in prompts {
                    match prompt.description {
                        Some(description) => println!("  {} - {}", prompt.name, description),
                        None => println!("  {}", prompt.name),
                    }
                }
            }
        }
        McpAction::Call {
            server,
            tool,
            arguments,
        } => {
            let arguments: Value =
                serde_json::from_str(&arguments).context("Arguments must be a JSON object")?;
            let client = clients(ctx, Some(server.as_str()))?
                .into_iter()
                .next()
                .context("No matching server")?;
            let result = client.call_tool(&tool, arguments).await?;
            println!("{}", format_tool_result(&result));
            if result.is_error() {
                anyhow::bail!("Tool '{}' reported an error", tool);
            }
        }
    }
    Ok(())
}

/// Enabled servers, optionally narrowed to one id.
fn select_servers(ctx: &AppContext, only: Option<&str>) -> anyhow::Result<Vec<McpServerDescriptor>> {
    let servers: Vec<McpServerDescriptor> = ctx
        .config
        .enabled_servers()
        .filter(|s| only.map_or(true, |id| s.id == id))
        .cloned()
        .collect();

    if servers.is_empty() {
        match only {
            Some(id) => anyhow::bail!("MCP server '{}' not found or disabled", id),
            None => anyhow::bail!("No MCP servers configured. Add [[servers]] to your config."),
        }
    }
    Ok(servers)
}

fn clients(ctx: &AppContext, only: Option<&str>) -> anyhow::Result<Vec<Arc<McpClient>>> {
    let registry = ctx.registry();
    Ok(select_servers(ctx, only)?
        .iter()
        .map(|server| registry.client_for(server))
        .collect())
}
