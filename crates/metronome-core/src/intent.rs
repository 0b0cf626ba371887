use crate::args::ParsedArgs;

/// What one invocation asked for, derived from its parsed options.
///
/// Every flag that was present is recorded; precedence between them (help
/// first, then start, then the stop/pause/continue trio) is applied when the
/// intent is turned into an action, not here. The `continue` option maps to
/// `resume`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandIntent {
    pub help: bool,
    pub start: bool,
    pub stop: bool,
    pub pause: bool,
    pub resume: bool,
    pub show: bool,
    pub hidden: bool,
    pub instance_name: Option<String>,
    pub command_text: Option<String>,
}

/// Derives the intent for one invocation. Pure and total.
///
/// Zero options from a non-interactive session count as a help request, so a
/// double-clicked binary shows usage instead of silently starting.
pub fn interpret(args: &ParsedArgs, interactive: bool) -> CommandIntent {
    CommandIntent {
        help: args.contains("help") || args.contains("?") || (args.is_empty() && !interactive),
        start: args.contains("start") || args.contains("run"),
        stop: args.contains("stop") || args.contains("exit"),
        pause: args.contains("pause"),
        resume: args.contains("continue"),
        show: args.contains("show"),
        hidden: args.contains("hidden") || args.contains("hide"),
        instance_name: non_empty(args.first("name")),
        command_text: non_empty(args.first("command")),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_owned)
}
