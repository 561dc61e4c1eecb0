//! Dry-run of the decision engine.

use parley_core::{Attachment, ConversationMessage};
use parley_providers::DecisionRequest;

use super::endpoint_with;
use crate::output::print_json;
use crate::{AppContext, DecideArgs};

pub fn run(args: DecideArgs, ctx: &AppContext) -> anyhow::Result<()> {
    let endpoint = endpoint_with(
        &ctx.config.endpoint,
        args.provider.as_deref(),
        args.model.as_deref(),
        None,
    );

    let mut turn = ConversationMessage::user(args.prompt.join(" "));
    if args.image {
        turn = turn.with_attachment(Attachment::image("image.png"));
    }
    let conversation = vec![turn];

    let tool_count = args.tools.unwrap_or_else(|| {
        if ctx.config.agent.use_tools {
            ctx.config.enabled_servers().count()
        } else {
            0
        }
    });

    let mut request = DecisionRequest::new(&endpoint, &conversation);
    if tool_count > 0 {
        request = request.with_tools(tool_count);
    }

    let decision = ctx.decisions().decide(&request);
    print_json(&decision)
}
