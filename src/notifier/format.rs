//! Provider-specific webhook message bodies.

use serde_json::{json, Value};

use super::payload::NotificationPayload;
use crate::config::WebhookKind;

/// Discord embed accent color.
pub const EMBED_COLOR: u32 = 0x00d4aa;

const FOOTER: &str = "Cloudflare Tunnel Monitor";

/// Build the JSON body for one endpoint kind.
#[must_use]
pub fn build_body(kind: WebhookKind, username: &str, payload: &NotificationPayload) -> Value {
    match kind {
        WebhookKind::Discord => discord_body(username, payload),
        WebhookKind::Slack => slack_body(payload),
        WebhookKind::Generic => serde_json::to_value(payload).unwrap_or_default(),
    }
}

fn detected_at(payload: &NotificationPayload) -> String {
    payload.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn headline(payload: &NotificationPayload) -> String {
    if payload.shortened_url.is_some() {
        "New tunnel URL detected and shortened!".to_string()
    } else {
        "New tunnel URL detected!".to_string()
    }
}

fn discord_body(username: &str, payload: &NotificationPayload) -> Value {
    let link = payload.link();
    let mut fields = vec![
        json!({
            "name": "Shortened URL",
            "value": format!("[{link}]({link})"),
            "inline": false,
        }),
        json!({
            "name": "Original URL",
            "value": format!("```{}```", payload.original_url),
            "inline": false,
        }),
        json!({
            "name": "Log File",
            "value": format!("`{}`", payload.source_file.display()),
            "inline": true,
        }),
        json!({
            "name": "Detected At",
            "value": format!("`{}`", detected_at(payload)),
            "inline": true,
        }),
    ];
    if let Some(host) = payload.meta_str("hostname") {
        fields.push(json!({ "name": "Host", "value": format!("`{host}`"), "inline": true }));
    }

    json!({
        "username": username,
        "content": format!("**{}**\n**Quick Access:** {link}", headline(payload)),
        "embeds": [{
            "title": payload.title,
            "color": EMBED_COLOR,
            "fields": fields,
            "footer": { "text": FOOTER },
            "timestamp": payload.timestamp.to_rfc3339(),
        }],
    })
}

fn slack_body(payload: &NotificationPayload) -> Value {
    let link = payload.link();
    let mut details = vec![
        format!("*Original URL:* `{}`", payload.original_url),
        format!("*Log File:* `{}`", payload.source_file.display()),
        format!("*Detected At:* {}", detected_at(payload)),
    ];
    if let Some(host) = payload.meta_str("hostname") {
        details.push(format!("*Host:* `{host}`"));
    }

    json!({
        "text": format!("{}: {link}", headline(payload)),
        "blocks": [
            {
                "type": "header",
                "text": { "type": "plain_text", "text": payload.title },
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": format!("*Quick Access:* <{link}>") },
            },
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": details.join("\n") },
            },
            {
                "type": "context",
                "elements": [{ "type": "mrkdwn", "text": FOOTER }],
            },
        ],
    })
}
