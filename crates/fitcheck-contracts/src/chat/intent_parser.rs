use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{
    CommandSpec, GARMENT_COMMAND, INDEX_COMMANDS, NO_ARG_COMMANDS, RAW_ARG_COMMANDS,
    SINGLE_PATH_COMMANDS, UPLOAD_GARMENT_COMMAND, VIDEO_COMMAND,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }

    fn invalid(raw: &str, reason: String) -> Self {
        Self::new("invalid", raw).with_arg("reason", Value::String(reason))
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = parse_path_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let remainder = &slash_tail[command_len..];
            let arg = remainder.trim();
            return parse_command(text, &command, arg);
        }
    }

    // Bare text describes a scene.
    let mut intent = Intent::new("generate_background", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

fn parse_command(raw: &str, command: &str, arg: &str) -> Intent {
    if let Some(action) = find_action(command, RAW_ARG_COMMANDS) {
        if action == "generate_background" {
            if arg.is_empty() {
                return Intent::invalid(raw, "/background requires a prompt".to_string());
            }
            let mut intent = Intent::new(action, raw);
            intent.prompt = Some(arg.to_string());
            return intent;
        }
        return Intent::new(action, raw).with_arg("text", Value::String(arg.to_string()));
    }

    if let Some(action) = find_action(command, SINGLE_PATH_COMMANDS) {
        let path = parse_single_path_arg(arg);
        if path.is_empty() {
            return Intent::invalid(raw, format!("/{command} requires a path"));
        }
        return Intent::new(action, raw).with_arg("path", Value::String(path));
    }

    if let Some(action) = find_action(command, INDEX_COMMANDS) {
        return match arg.parse::<u64>() {
            Ok(index) => Intent::new(action, raw).with_arg("index", Value::from(index)),
            Err(_) => Intent::invalid(raw, format!("/{command} requires a number, got '{arg}'")),
        };
    }

    if let Some(action) = find_action(command, NO_ARG_COMMANDS) {
        return Intent::new(action, raw);
    }

    if command == GARMENT_COMMAND.command {
        if arg.is_empty() {
            return Intent::invalid(raw, "/garment requires a wardrobe id".to_string());
        }
        return Intent::new(GARMENT_COMMAND.action, raw)
            .with_arg("garment_id", Value::String(arg.to_string()));
    }

    if command == UPLOAD_GARMENT_COMMAND.command {
        let mut parts = parse_path_args(arg).into_iter();
        let Some(path) = parts.next() else {
            return Intent::invalid(raw, "/upload_garment requires a path".to_string());
        };
        let name = parts.collect::<Vec<String>>().join(" ");
        return Intent::new(UPLOAD_GARMENT_COMMAND.action, raw)
            .with_arg("path", Value::String(path))
            .with_arg(
                "name",
                if name.is_empty() {
                    Value::Null
                } else {
                    Value::String(name)
                },
            );
    }

    if command == VIDEO_COMMAND.command {
        return Intent::new(VIDEO_COMMAND.action, raw).with_arg(
            "template_id",
            if arg.is_empty() {
                Value::Null
            } else {
                Value::String(arg.to_string())
            },
        );
    }

    Intent::new("unknown", raw)
        .with_arg("command", Value::String(command.to_string()))
        .with_arg("arg", Value::String(arg.to_string()))
}
