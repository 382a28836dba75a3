/// One line typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Answer(String),
    ClearLogs,
    Dismiss,
    Reconnect,
    Project(String),
    Quit,
    Help,
}

pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix(':') else {
        return Err(format!("commands start with ':' (got {line:?}); try :help"));
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "answer" | "a" => {
            if arg.is_empty() {
                return Err("usage: :answer <text>".to_string());
            }
            Command::Answer(arg.to_string())
        }
        "clear" => Command::ClearLogs,
        "dismiss" => Command::Dismiss,
        "reconnect" => Command::Reconnect,
        "project" | "p" => {
            if arg.is_empty() {
                return Err("usage: :project <name>".to_string());
            }
            Command::Project(arg.to_string())
        }
        "quit" | "q" => Command::Quit,
        "help" | "h" => Command::Help,
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(command))
}

pub const HELP: &str = ":answer <text>  answer the pending question
:clear          clear the log view
:dismiss        hide the pending question without answering
:reconnect      drop the connection and dial again
:project <name> switch to another project
:quit           exit";
