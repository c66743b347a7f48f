//! Per-chat answer formats.
//!
//! `Json` and `Markdown` pin the provider to a fixed layout through a system
//! prompt placed ahead of the raw conversation turns; `Default` leaves the
//! provider free to answer in plain text.

use crate::core_types::{Message, Role};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const JSON_PROMPT: &str = "You are a professional AI that always responds in strict JSON format.\n\
Do not include explanations or markdown.\n\
Return only a valid JSON object matching this schema:\n\
{ \"title\": \"string\", \"summary\": \"string\", \"key_points\": [\"string\", \"string\", \"string\"] }";

const MARKDOWN_PROMPT: &str = "You are a professional AI that always responds in clean Markdown.\n\
Format your answer as follows:\n\
\n\
# {title}\n\
\n\
**Summary:** {summary}\n\
\n\
## Key Points\n\
- {point1}\n\
- {point2}\n\
- {point3}\n\
\n\
Do not include JSON or extra commentary.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    Json,
    Markdown,
    #[default]
    Default,
}

impl ResponseFormat {
    pub fn system_prompt(&self) -> Option<&'static str> {
        match self {
            ResponseFormat::Json => Some(JSON_PROMPT),
            ResponseFormat::Markdown => Some(MARKDOWN_PROMPT),
            ResponseFormat::Default => None,
        }
    }

    /// Adds the format's system prompt, if any, to a provider context. The
    /// prompt goes after any leading system turns so a conversation summary
    /// stays the first element.
    pub fn apply(&self, mut context: Vec<Message>) -> Vec<Message> {
        if let Some(prompt) = self.system_prompt() {
            let at = context
                .iter()
                .take_while(|m| m.role == Role::System)
                .count();
            context.insert(at, Message::system(prompt));
        }
        context
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "JSON (strict)",
            ResponseFormat::Markdown => "Markdown",
            ResponseFormat::Default => "DEFAULT (free text)",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Markdown => "markdown",
            ResponseFormat::Default => "default",
        }
    }
}

impl fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ResponseFormat::Json),
            "markdown" => Ok(ResponseFormat::Markdown),
            "default" => Ok(ResponseFormat::Default),
            other => Err(format!("unknown format '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("JSON".parse::<ResponseFormat>().unwrap(), ResponseFormat::Json);
        assert_eq!(" markdown ".parse::<ResponseFormat>().unwrap(), ResponseFormat::Markdown);
        assert!("yaml".parse::<ResponseFormat>().is_err());
    }

    #[test]
    fn test_default_format_leaves_context_untouched() {
        let context = vec![Message::user("hi")];
        assert_eq!(ResponseFormat::Default.apply(context.clone()), context);
    }

    #[test]
    fn test_json_format_adds_prompt_after_summary() {
        let context = vec![Message::system("summary"), Message::user("hi")];
        let applied = ResponseFormat::Json.apply(context);

        assert_eq!(applied.len(), 3);
        assert_eq!(applied[0].content, "summary");
        assert_eq!(applied[1].role, Role::System);
        assert!(applied[1].content.contains("strict JSON"));
        assert_eq!(applied[2].content, "hi");
    }

    #[test]
    fn test_markdown_format_leads_when_no_summary() {
        let applied = ResponseFormat::Markdown.apply(vec![Message::user("hi")]);

        assert_eq!(applied[0].role, Role::System);
        assert!(applied[0].content.contains("## Key Points"));
        assert_eq!(applied[1].content, "hi");
    }
}
