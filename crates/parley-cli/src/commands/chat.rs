//! Single chat turn with streamed output.

use std::io::{self, IsTerminal, Read};

use parley_agent::{AgentConfig, ChatTurnRequest, TurnOutcome};
use parley_core::{Attachment, ConversationMessage, TextSink};
use tracing::info;

use super::endpoint_with;
use crate::output::DeltaWriter;
use crate::{AppContext, ChatArgs};

pub async fn run(args: ChatArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let prompt = read_prompt(&args.prompt)?;

    let endpoint = endpoint_with(
        &ctx.config.endpoint,
        args.provider.as_deref(),
        args.model.as_deref(),
        args.system.as_deref(),
    );

    let mut turn = ConversationMessage::user(prompt);
    for image in &args.image {
        turn = turn.with_attachment(Attachment::image(image.clone()));
    }

    let mut config = AgentConfig::from(&ctx.config.agent);
    if let Some(max_depth) = args.max_depth {
        config.max_depth = max_depth;
    }
    let use_tools = config.use_tools && !args.no_tools;
    let agent = ctx.agent(config).await?;

    let mut request = ChatTurnRequest::new(endpoint, vec![turn])
        .with_servers(ctx.config.servers.clone())
        .queue_on_failure(args.queue || ctx.config.agent.queue_on_failure);
    if !use_tools {
        request = request.without_tools();
    }

    let sink = DeltaWriter::stdout();
    match agent.run(request, &sink).await? {
        TurnOutcome::Completed(response) => {
            // Non-streaming endpoints may never emit.
            if sink.written().is_empty() && !response.text.is_empty() {
                sink.emit(&response.text);
            }
            println!();

            for tool in &response.tools {
                info!(tool = %tool.function_name, success = tool.success, "Tool executed");
            }
            info!(
                model = %response.decision.model,
                reason = %response.decision.reason,
                depth = response.depth,
                prompt_tokens = response.usage.prompt_tokens,
                completion_tokens = response.usage.completion_tokens,
                "Turn completed"
            );
        }
        TurnOutcome::Queued { request_id } => {
            eprintln!(
                "Endpoint unreachable; request queued as {}. Run `parley queue flush` to retry.",
                request_id
            );
        }
    }

    Ok(())
}

/// Prompt from the arguments, or from stdin when none were given.
fn read_prompt(words: &[String]) -> anyhow::Result<String> {
    let prompt = if words.is_empty() {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            anyhow::bail!("No prompt given. Pass it as an argument or pipe it on stdin.");
        }
        let mut buffer = String::new();
        stdin.lock().read_to_string(&mut buffer)?;
        buffer
    } else {
        words.join(" ")
    };

    let prompt = prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("Prompt is empty");
    }
    Ok(prompt.to_string())
}
