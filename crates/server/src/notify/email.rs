//! Email sending for relay notifications.

use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use url::Url;

use super::Notifier;
use crate::config::SmtpConfig;
use crate::email_templates::{EmailLinks, NotificationEmailTemplate, subject_for};
use crate::error::NotifyError;
use crate::notification::{Notification, NotificationKind};

/// Builds the subscribe, unsubscribe and preference links for a notification.
///
/// Links are resolved below `base_url` even when its path lacks a trailing slash.
pub fn email_links(base_url: &Url, notification: &Notification) -> EmailLinks {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let join = |path: String| base.join(&path).ok().map(String::from);
    EmailLinks {
        subscribe: match notification.kind {
            NotificationKind::Welcome { .. } => join("subscribe/".to_string()),
            _ => None,
        },
        unsubscribe: notification
            .unsubs_auth
            .as_ref()
            .and_then(|token| join(format!("unsubscribe/{token}/"))),
        preferences: notification
            .pref_auth
            .as_ref()
            .and_then(|token| join(format!("preferences/{token}/"))),
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e: lettre::address::AddressError| NotifyError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Renders a notification into a multipart (plain text + HTML) message.
pub fn compose_message(
    from: &Mailbox,
    base_url: &Url,
    notification: &Notification,
) -> Result<Message, NotifyError> {
    let links = email_links(base_url, notification);
    let unsubscribe = links.unsubscribe.clone();
    let template = NotificationEmailTemplate::for_notification(notification, links);

    let html_body = template.render_html().map_err(|e| {
        tracing::error!(
            name = "notify.compose_message.template_render_failed",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            error = %e,
            fingerprint = %notification.fingerprint,
            message = "Failed to render HTML email template"
        );
        NotifyError::Template(e.to_string())
    })?;
    let text_body = template.render_text();

    let mut builder = Message::builder()
        .from(from.clone())
        .to(parse_mailbox(&notification.recipient)?)
        .subject(subject_for(&notification.kind))
        .header(lettre::message::header::MIME_VERSION_1_0)
        .message_id(None);
    if let Some(url) = unsubscribe {
        builder = builder.header(UnsubscribeHeader::from(format!("<{url}>")));
    }

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(text_body),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(html_body),
                ),
        )
        .map_err(|e| NotifyError::Message(e.to_string()))
}

/// Delivers notifications over SMTP.
#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    base_url: Url,
}

impl SmtpNotifier {
    pub fn new(smtp: &SmtpConfig, base_url: &str) -> Result<Self, NotifyError> {
        let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.server)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(smtp.port)
            .credentials(creds)
            .build();
        let base_url = Url::parse(base_url).map_err(|e| NotifyError::Address {
            address: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            mailer,
            from: parse_mailbox(&smtp.from)?,
            base_url,
        })
    }
}

impl Notifier for SmtpNotifier {
    #[tracing::instrument(skip_all, fields(kind = notification.kind.as_str(), fingerprint = %notification.fingerprint))]
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = compose_message(&self.from, &self.base_url, notification)?;

        match self.mailer.send(message).await {
            Ok(_) => {
                tracing::info!(
                    name = "notify.email.sent",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    kind = notification.kind.as_str(),
                    fingerprint = %notification.fingerprint,
                    message = "Sent notification email"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    name = "notify.email.send_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    kind = notification.kind.as_str(),
                    fingerprint = %notification.fingerprint,
                    message = "Failed to send notification email"
                );
                Err(NotifyError::Transport(e.to_string()))
            }
        }
    }
}

/// Custom List-Unsubscribe header for email messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeHeader(String);

impl Header for UnsubscribeHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("List-Unsubscribe")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn core::error::Error + Send + Sync>> {
        Ok(Self(s.into()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

impl From<String> for UnsubscribeHeader {
    fn from(content: String) -> Self {
        Self(content)
    }
}

impl AsRef<str> for UnsubscribeHeader {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber_notification() -> Notification {
        Notification {
            recipient: "op@example.org".into(),
            fingerprint: "9695DFC35FFEB861329B9F1AB04C46397020CE31".into(),
            name: "moria1".into(),
            kind: NotificationKind::NodeDown { grace_pd_hours: 1 },
            unsubs_auth: Some("unsub-token".into()),
            pref_auth: Some("pref-token".into()),
        }
    }

    #[test]
    fn links_for_subscriber_notification() {
        let base = Url::parse("https://weather.example.org/").unwrap();
        let links = email_links(&base, &subscriber_notification());
        assert_eq!(links.subscribe, None);
        assert_eq!(
            links.unsubscribe.as_deref(),
            Some("https://weather.example.org/unsubscribe/unsub-token/")
        );
        assert_eq!(
            links.preferences.as_deref(),
            Some("https://weather.example.org/preferences/pref-token/")
        );
    }

    #[test]
    fn links_for_welcome() {
        let base = Url::parse("https://weather.example.org/").unwrap();
        let welcome = Notification::welcome("op@example.org", "AAAA", "alpha", false);
        let links = email_links(&base, &welcome);
        assert_eq!(
            links.subscribe.as_deref(),
            Some("https://weather.example.org/subscribe/")
        );
        assert_eq!(links.unsubscribe, None);
    }

    #[test]
    fn links_keep_base_path_without_trailing_slash() {
        let base = Url::parse("https://weather.example.org/weather").unwrap();
        let links = email_links(&base, &subscriber_notification());
        assert_eq!(
            links.unsubscribe.as_deref(),
            Some("https://weather.example.org/weather/unsubscribe/unsub-token/")
        );
        assert_eq!(
            links.preferences.as_deref(),
            Some("https://weather.example.org/weather/preferences/pref-token/")
        );

        let welcome = Notification::welcome("op@example.org", "AAAA", "alpha", false);
        let with_slash = Url::parse("https://weather.example.org/weather/").unwrap();
        assert_eq!(
            email_links(&with_slash, &welcome).subscribe.as_deref(),
            Some("https://weather.example.org/weather/subscribe/")
        );
    }

    #[test]
    fn composed_message_has_unsubscribe_header() {
        let base = Url::parse("https://weather.example.org/").unwrap();
        let from: Mailbox = "Tor Weather <weather@example.org>".parse().unwrap();
        let message = compose_message(&from, &base, &subscriber_notification()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: [Tor Weather] Node Down!"));
        assert!(raw.contains(
            "List-Unsubscribe: <https://weather.example.org/unsubscribe/unsub-token/>"
        ));
        assert!(raw.contains("To: op@example.org"));
    }

    #[test]
    fn rejects_invalid_recipient() {
        let base = Url::parse("https://weather.example.org/").unwrap();
        let from: Mailbox = "weather@example.org".parse().unwrap();
        let mut n = subscriber_notification();
        n.recipient = "not an address".into();
        assert!(matches!(
            compose_message(&from, &base, &n),
            Err(NotifyError::Address { .. })
        ));
    }
}
