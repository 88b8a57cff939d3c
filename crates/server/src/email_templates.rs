//! Email template rendering with HTML (Askama) and SCSS styling
use askama::Template;
use once_cell::sync::Lazy;

use crate::notification::{Notification, NotificationKind};
use crate::utils::{hours_text, spaced_fingerprint};

/// Compiled and inlined CSS from SCSS
static COMPILED_CSS: Lazy<String> = Lazy::new(|| {
    let scss = include_str!("../styles/email.scss");
    grass::from_string(scss.to_string(), &grass::Options::default()).unwrap_or_else(|e| {
        tracing::error!(
            name = "email.scss.compile_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            message = "Failed to compile email SCSS"
        );
        String::new()
    })
});

/// Inline CSS into HTML
#[tracing::instrument(skip(html))]
fn inline_css(html: &str) -> String {
    let options = css_inline::InlineOptions {
        load_remote_stylesheets: false,
        ..css_inline::InlineOptions::default()
    };

    let inliner = css_inline::CSSInliner::new(options);

    let html_with_style = html.replace(
        "</head>",
        &format!("<style>{}</style></head>", COMPILED_CSS.as_str()),
    );

    match inliner.inline(&html_with_style) {
        Ok(inlined) => inlined,
        Err(e) => {
            tracing::error!(
                name = "email.inline_css.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = ?e,
                message = "Failed to inline CSS"
            );
            html.to_string()
        }
    }
}

/// Links rendered into a notification email.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailLinks {
    /// Subscription page, offered to operators in welcome mail.
    pub subscribe: Option<String>,
    pub unsubscribe: Option<String>,
    pub preferences: Option<String>,
}

#[derive(Template)]
#[template(path = "notification_email.html")]
pub struct NotificationEmailTemplate {
    pub title: String,
    pub paragraphs: Vec<String>,
    pub relay_name: String,
    pub fingerprint: String,
    pub action_url: Option<String>,
    pub action_label: String,
    pub unsubscribe_url: Option<String>,
    pub preferences_url: Option<String>,
}

/// Subject line for a notification.
pub fn subject_for(kind: &NotificationKind) -> &'static str {
    match kind {
        NotificationKind::Welcome { .. } => "[Tor Weather] Welcome to Tor!",
        NotificationKind::NodeDown { .. } => "[Tor Weather] Node Down!",
        NotificationKind::LowBandwidth { .. } => "[Tor Weather] Low Bandwidth!",
        NotificationKind::OutdatedVersion { .. } => "[Tor Weather] Node Out of Date!",
    }
}

impl NotificationEmailTemplate {
    pub fn for_notification(notification: &Notification, links: EmailLinks) -> Self {
        let name = &notification.name;
        let (title, paragraphs) = match &notification.kind {
            NotificationKind::Welcome { exit } => {
                let mut paragraphs = vec![
                    format!(
                        "We noticed that your relay {name} has been running long enough to be \
                         flagged as stable. Thank you for contributing to the Tor network!"
                    ),
                    "Tor Weather can email you when your relay goes down, runs an outdated \
                     version of Tor, or its bandwidth drops. Follow the link below to subscribe."
                        .to_string(),
                ];
                if *exit {
                    paragraphs.insert(
                        1,
                        "Your relay is configured as an exit. Please make sure you have read the \
                         exit relay guidelines so you know what to expect from abuse complaints."
                            .to_string(),
                    );
                }
                ("Welcome to Tor!".to_string(), paragraphs)
            }
            NotificationKind::NodeDown { grace_pd_hours } => (
                "Your relay is down".to_string(),
                vec![
                    format!(
                        "It appears that your relay {name} has been unreachable for at least {}.",
                        hours_text(*grace_pd_hours)
                    ),
                    "You may want to check that the tor process is still running and that its \
                     ports are reachable."
                        .to_string(),
                ],
            ),
            NotificationKind::LowBandwidth {
                observed_kbs,
                threshold_kbs,
            } => (
                "Your relay's bandwidth is low".to_string(),
                vec![format!(
                    "The observed bandwidth of your relay {name} is {observed_kbs} KB/s, which is \
                     below your threshold of {threshold_kbs} KB/s."
                )],
            ),
            NotificationKind::OutdatedVersion { version_type } => (
                "Your relay is out of date".to_string(),
                vec![
                    format!(
                        "The version of Tor your relay {name} is running has been marked \
                         {version_type} by the directory authorities."
                    ),
                    "Please upgrade to a recommended version as soon as you can.".to_string(),
                ],
            ),
        };

        let (action_url, action_label) = match notification.kind {
            NotificationKind::Welcome { .. } => (links.subscribe, "Subscribe to Tor Weather"),
            _ => (None, ""),
        };

        Self {
            title,
            paragraphs,
            relay_name: name.clone(),
            fingerprint: spaced_fingerprint(&notification.fingerprint),
            action_url,
            action_label: action_label.to_string(),
            unsubscribe_url: links.unsubscribe,
            preferences_url: links.preferences,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn render_html(&self) -> Result<String, askama::Error> {
        let html = self.render()?;
        Ok(inline_css(&html))
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        let mut text = String::from("Hello,\n\n");
        for paragraph in &self.paragraphs {
            text.push_str(paragraph);
            text.push_str("\n\n");
        }
        text.push_str(&format!(
            "Relay: {}\nFingerprint: {}\n\n",
            self.relay_name, self.fingerprint
        ));
        if let Some(url) = &self.action_url {
            text.push_str(&format!("{}: {}\n\n", self.action_label, url));
        }
        text.push_str("Thanks for running a relay,\nThe Tor Weather Team");

        if self.preferences_url.is_some() || self.unsubscribe_url.is_some() {
            text.push_str("\n\n---");
        }
        if let Some(url) = &self.preferences_url {
            text.push_str(&format!("\nChange your preferences: {url}"));
        }
        if let Some(url) = &self.unsubscribe_url {
            text.push_str(&format!("\nUnsubscribe: {url}"));
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FP: &str = "9695DFC35FFEB861329B9F1AB04C46397020CE31";

    fn subscriber_links() -> EmailLinks {
        EmailLinks {
            subscribe: None,
            unsubscribe: Some("https://weather.example.org/unsubscribe/abc/".into()),
            preferences: Some("https://weather.example.org/preferences/def/".into()),
        }
    }

    #[test]
    fn test_node_down_email_template() {
        let mut n = Notification::welcome("op@example.org", FP, "moria1", false);
        n.kind = NotificationKind::NodeDown { grace_pd_hours: 2 };
        let template = NotificationEmailTemplate::for_notification(&n, subscriber_links());

        let html = template.render_html().expect("Failed to render HTML");
        assert!(html.contains("moria1"));
        assert!(html.contains("9695 DFC3"));
        assert!(html.contains("style="));
        assert!(html.contains("unsubscribe/abc/"));

        let text = template.render_text();
        assert!(text.contains("unreachable for at least 2 hours"));
        assert!(text.contains("Unsubscribe: https://weather.example.org/unsubscribe/abc/"));
        assert!(text.contains("Change your preferences"));
    }

    #[test]
    fn test_welcome_email_template() {
        let n = Notification::welcome("op@example.org", FP, "moria1", true);
        let links = EmailLinks {
            subscribe: Some("https://weather.example.org/subscribe/".into()),
            ..EmailLinks::default()
        };
        let template = NotificationEmailTemplate::for_notification(&n, links);

        let html = template.render_html().expect("Failed to render HTML");
        assert!(html.contains("Welcome to Tor!"));
        assert!(html.contains("https://weather.example.org/subscribe/"));

        let text = template.render_text();
        assert!(text.contains("exit relay guidelines"));
        assert!(!text.contains("Unsubscribe"));
    }

    #[test]
    fn test_bandwidth_and_version_text() {
        let mut n = Notification::welcome("op@example.org", FP, "moria1", false);
        n.kind = NotificationKind::LowBandwidth {
            observed_kbs: 19,
            threshold_kbs: 20,
        };
        let text = NotificationEmailTemplate::for_notification(&n, subscriber_links()).render_text();
        assert!(text.contains("19 KB/s"));
        assert!(text.contains("threshold of 20 KB/s"));

        n.kind = NotificationKind::OutdatedVersion {
            version_type: "OBSOLETE".into(),
        };
        let text = NotificationEmailTemplate::for_notification(&n, subscriber_links()).render_text();
        assert!(text.contains("marked OBSOLETE"));
        assert_eq!(subject_for(&n.kind), "[Tor Weather] Node Out of Date!");
    }

    #[test]
    fn test_html_escapes_relay_name() {
        let n = Notification::welcome("op@example.org", FP, "<b>evil</b>", false);
        let html = NotificationEmailTemplate::for_notification(&n, EmailLinks::default())
            .render()
            .expect("render");
        assert!(!html.contains("<b>evil</b>"));
    }

    #[test]
    fn test_scss_compilation() {
        let css = &*COMPILED_CSS;
        assert!(!css.is_empty());
        assert!(css.contains("email-container"));
    }
}
