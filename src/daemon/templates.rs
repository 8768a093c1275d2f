//! Rendering of events into human-facing messages
//!
//! The subject and plain body are shared by every delivery sink; only the
//! mail sink turns them into an HTML document.

use crate::errors::{AppError, AppResult};
use crate::shared::protocol::{Level, NotificationEvent};
use handlebars::Handlebars;
use serde_json::json;

const MAIL_TEMPLATE_NAME: &str = "mail";

const MAIL_TEMPLATE: &str = r#"<html><head>
<style>
    body { font-family: 'Helvetica', sans-serif; }
    h2 { font-size: 16px; font-weight: bold; color: #333; margin-bottom: 10px; }
    pre { font-size: 12px; }
    .footer { font-size: 11px; color: #888; margin-top: 20px; }
</style>
</head>
<body>
<h2>{{title}}</h2>
{{#if body}}<p><pre>{{body}}</pre></p>{{/if}}
<div class="footer">[{{source}}] [{{level}}]{{#if tag}} {{tag}}{{/if}} via notify-relay on {{host}}</div>
</body></html>
"#;

/// Subject and body derived from one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub title: String,
    pub body: String,
    pub source: String,
    pub level: Level,
    pub tag: String,
}

#[derive(Debug, Clone)]
pub struct MessageRenderer {
    handlebars: Handlebars<'static>,
}

impl MessageRenderer {
    pub fn new() -> AppResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars
            .register_template_string(MAIL_TEMPLATE_NAME, MAIL_TEMPLATE)
            .map_err(|e| AppError::config_with_source("Failed to register mail template", e))?;
        Ok(Self { handlebars })
    }

    /// `System notification [<source>] [<level>] <tag>`
    pub fn subject(event: &NotificationEvent) -> String {
        let mut subject = format!("System notification [{}] [{}]", event.source, event.level);
        if !event.tag_str().is_empty() {
            subject.push(' ');
            subject.push_str(event.tag_str());
        }
        subject
    }

    pub fn render(&self, event: &NotificationEvent) -> RenderedMessage {
        RenderedMessage {
            subject: Self::subject(event),
            title: event.title.clone(),
            body: event.details.clone(),
            source: event.source.clone(),
            level: event.level,
            tag: event.tag_str().to_string(),
        }
    }

    /// HTML mail body for `message`
    pub fn render_mail_html(&self, message: &RenderedMessage, host: &str) -> AppResult<String> {
        let data = json!({
            "title": message.title,
            "body": message.body,
            "source": message.source,
            "level": message.level.as_str(),
            "tag": message.tag,
            "host": host,
        });
        self.handlebars
            .render(MAIL_TEMPLATE_NAME, &data)
            .map_err(|e| AppError::delivery_with_source("mail", "failed to render message", e))
    }
}
