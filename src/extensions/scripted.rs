//! Extensions defined by a `reply` template instead of native code

use crate::application::errors::CommandError;
use crate::domain::entities::{Command, Invocation};
use super::trait_def::{ExtensionModule, SetupContext};

/// Exposes a single command, named after the extension, that renders a template.
///
/// Placeholders: `{args}`, `{user}`, `{server}`.
pub struct ScriptedExtension {
    name: String,
    description: String,
    usage: Option<String>,
    reply: String,
}

impl ScriptedExtension {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        usage: Option<String>,
        reply: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            description: description.unwrap_or_else(|| format!("Runs the {} extension.", name)),
            name,
            usage,
            reply: reply.into(),
        }
    }
}

const ARGS: &str = "{args}";

/// Expand placeholders in one pass, so values are never expanded again
fn render(template: &str, inv: &Invocation) -> String {
    let user = inv
        .message
        .sender
        .as_ref()
        .map(|u| u.display_name().to_string())
        .unwrap_or_else(|| "someone".to_string());
    let args = inv.args().join(" ");
    let placeholders = [
        (ARGS, args.as_str()),
        ("{user}", user.as_str()),
        ("{server}", inv.server_id().unwrap_or("direct messages")),
    ];

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        match placeholders.iter().find(|(key, _)| rest.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &rest[key.len()..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl ExtensionModule for ScriptedExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, ctx: &mut SetupContext) -> Result<(), String> {
        let reply = self.reply.clone();
        // A template that echoes arguments needs some when a usage line says so
        let required = self
            .usage
            .clone()
            .filter(|_| self.reply.contains(ARGS));
        let mut command = Command::new(&self.name)
            .with_description(&self.description)
            .with_handler(move |inv| match &required {
                Some(usage) if inv.args().is_empty() => {
                    Err(CommandError::InvalidArgs(format!("Usage: {}", usage)))
                }
                _ => Ok(render(&reply, inv)),
            });
        if let Some(usage) = &self.usage {
            command = command.with_usage(usage);
        }
        ctx.register(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Message, User};

    #[test]
    fn test_render_placeholders() {
        let msg = Message::from_command("c1", "weather", vec!["Oslo".into(), "today".into()])
            .with_server("42")
            .with_sender(User::new("7").with_username("ana"));
        let inv = Invocation::new("weather", msg);

        assert_eq!(
            render("{user} asked for {args} in {server}", &inv),
            "ana asked for Oslo today in 42"
        );
    }

    #[test]
    fn test_arguments_are_not_expanded() {
        let msg = Message::from_command("c1", "echo", vec!["{server}".into(), "{user}".into(), "{".into()])
            .with_server("42");
        let inv = Invocation::new("echo", msg);

        assert_eq!(render("you said {args} {unknown}", &inv), "you said {server} {user} { {unknown}");
    }

    #[test]
    fn test_usage_required_when_template_echoes_args() {
        let descriptions = std::sync::Arc::new(crate::infrastructure::storage::CommandDescriptions::in_memory());
        let mut ctx = SetupContext::new("weather", descriptions);
        ScriptedExtension::new("weather", None, Some("weather <city>".into()), "Sunny in {args}")
            .setup(&mut ctx)
            .unwrap();
        let command = ctx.into_commands().remove(0);
        assert_eq!(command.usage.as_deref(), Some("weather <city>"));

        let bare = Invocation::new("weather", Message::from_command("c1", "weather", vec![]));
        assert!(matches!(command.execute(&bare), Err(CommandError::InvalidArgs(ref m)) if m == "Usage: weather <city>"));

        let city = Invocation::new("weather", Message::from_command("c1", "weather", vec!["Oslo".into()]));
        assert_eq!(command.execute(&city).unwrap(), "Sunny in Oslo");
    }
}
