use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Built-in verification email used when no frontend template is configured
/// or the configured file cannot be read.
const DEFAULT_TEMPLATE: &str = r#"<html>
  <body>
    <h2>Verify your email</h2>
    <p>Hi {{user_email}},</p>
    <p>Your verification code is <strong>{{verification_code}}</strong>.</p>
    <p><a href="{{verification_link}}">Verify your account</a></p>
    <p>The code expires in 24 hours. If you did not create this account, ignore this message.</p>
  </body>
</html>"#;

const TEMPLATE_START_MARKER: &str = "export const EmailVerificationTemplate = `";
const TEMPLATE_END_MARKER: &str = "`;";

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()>;
}

/// Delivers mail through an HTTP mail-API endpoint as a JSON POST.
pub struct HttpApiMailer {
    client: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct MailApiRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl HttpApiMailer {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        api_token: Option<String>,
        from: String,
    ) -> Self {
        Self {
            client,
            api_url,
            api_token,
            from,
        }
    }
}

#[async_trait]
impl Mailer for HttpApiMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        let payload = MailApiRequest {
            from: &self.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html_body,
            text: &email.text_body,
        };
        let mut request = self.client.post(&self.api_url).json(&payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

/// Fallback mailer for environments without a mail API. Logs the message
/// instead of delivering it, so local verification flows stay testable.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> anyhow::Result<()> {
        info!(
            to = %email.to,
            subject = %email.subject,
            body = %email.text_body,
            "mail delivery disabled, logging message instead"
        );
        Ok(())
    }
}

/// Verification email template. Substitutes `{{verification_link}}`,
/// `{{verification_code}}`, `{{user_email}}` and `{{user_id}}`. Resolved once
/// at startup and shared through the application state.
#[derive(Debug, Clone)]
pub struct EmailTemplate {
    html: String,
}

impl EmailTemplate {
    pub fn built_in() -> Self {
        Self {
            html: DEFAULT_TEMPLATE.to_string(),
        }
    }

    /// Extracts the template literal exported by the frontend's email-template
    /// module, so backend and frontend render the same message. Any read or
    /// parse failure falls back to the built-in template.
    pub fn load_from_frontend_asset(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(source) => match extract_template_literal(&source) {
                Some(html) => Self { html },
                None => {
                    tracing::warn!(
                        path = %path.display(),
                        "no email template export found, using built-in template"
                    );
                    Self::built_in()
                }
            },
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "failed to read email template, using built-in template"
                );
                Self::built_in()
            }
        }
    }

    pub fn render(&self, link: &str, code: &str, user_email: &str, user_id: Uuid) -> String {
        self.html
            .replace("{{verification_link}}", link)
            .replace("{{verification_code}}", code)
            .replace("{{user_email}}", user_email)
            .replace("{{user_id}}", &user_id.to_string())
    }
}

fn extract_template_literal(source: &str) -> Option<String> {
    let start = source.find(TEMPLATE_START_MARKER)? + TEMPLATE_START_MARKER.len();
    let end = source[start..].find(TEMPLATE_END_MARKER)? + start;
    Some(source[start..end].to_string())
}

/// Crude tag-stripper producing the text alternative of an HTML body.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_substitutes_all_tokens() {
        let template = EmailTemplate::built_in();
        let html = template.render("https://x/verify?token=042311", "042311", "a@b.se", Uuid::nil());
        assert!(html.contains("https://x/verify?token=042311"));
        assert!(html.contains("<strong>042311</strong>"));
        assert!(html.contains("Hi a@b.se"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn extracts_template_literal_from_frontend_module() {
        let source = "import x from 'y';\n\
             export const EmailVerificationTemplate = `<p>Code: {{verification_code}}</p>`;\n\
             export default EmailVerificationTemplate;\n";
        let html = extract_template_literal(source).unwrap();
        assert_eq!(html, "<p>Code: {{verification_code}}</p>");
    }

    #[test]
    fn missing_export_yields_none() {
        assert_eq!(extract_template_literal("export const Other = `x`;"), None);
    }

    #[test]
    fn missing_file_falls_back_to_built_in() {
        let template =
            EmailTemplate::load_from_frontend_asset(Path::new("/nonexistent/template.ts"));
        assert!(template.html.contains("{{verification_code}}"));
    }

    #[test]
    fn strip_html_drops_tags_and_collapses_whitespace() {
        let text = strip_html("<p>Your  code is\n<strong>042311</strong>.</p>");
        assert_eq!(text, "Your code is 042311.");
    }
}
