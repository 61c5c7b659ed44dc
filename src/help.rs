/// Statements understood by the parser.
pub const STATEMENTS: &[(&str, &str)] = &[
    ("let", "let [-r] <name> [=] <value | ask <prompt> | add|sub|mul|div ...>: assign a variable"),
    ("say", "say <text...>: print text, resolving variables"),
    ("ask", "ask <name> [prompt...]: read a line into a variable"),
    ("if", "if <cond> then <stmt> [else <stmt>] | if <cond> then ... [else ...] endrpt"),
    ("rpt", "rpt <n|inf> <stmt> | rpt [n|inf] ... endrpt: repeat"),
    ("try", "try <stmt> [else <stmt>]: run the else branch when the first one fails"),
    ("exit", "exit [code]: leave the current script"),
    ("inc", "inc <file> (or include): run a script in the current scope"),
    ("run", "run <file> [args...]: run a script in a child scope"),
    ("alia", "alia [name [command...]]: list, show or define aliases"),
    ("unalia", "unalia <name>: remove an alias"),
    ("add", "add <n...>: sum (also sub, mul, div <a> <b>)"),
];

/// Commands handled by the interpreter itself.
pub const SESSION_COMMANDS: &[(&str, &str)] = &[
    ("help", "help [glyph]: list glyphs or describe one"),
    ("schk", "schk <file>: check a script for syntax errors"),
    ("pse", "pse [message]: wait for Enter"),
    ("prof", "prof [show | new <n> | del <n> | set <key> <value...> | <n>]: manage profiles"),
    ("svrc", "svrc: save the active profile"),
    ("rrc", "rrc: reload the active profile from disk"),
    ("pin", "pin [source]: list plugins or install one from a directory or .sigin archive"),
    ("prv", "prv <name>: remove a plugin"),
];

/// Help line for a statement keyword or session command.
pub fn topic(name: &str) -> Option<&'static str> {
    STATEMENTS
        .iter()
        .chain(SESSION_COMMANDS)
        .find(|(key, _)| *key == name)
        .map(|(_, text)| *text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry;

    #[test]
    fn test_every_session_command_is_documented() {
        for name in registry::SESSION_COMMANDS {
            assert!(topic(name).is_some(), "{name} has no help");
        }
        assert!(topic("rpt").unwrap().contains("endrpt"));
        assert_eq!(topic("frobnicate"), None);
    }
}
