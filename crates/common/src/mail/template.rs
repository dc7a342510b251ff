//! Notification email bodies

/// HTML and plain-text renderings of one notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Escape text for inclusion in HTML element content or attributes
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the email sent alongside an in-app notification
pub fn render_notification_email(title: &str, message: &str, case_url: Option<&str>) -> RenderedEmail {
    let subject = format!("Casefile: {}", title);

    let title_html = escape_html(title);
    let message_html = escape_html(message).replace('\n', "<br>");

    let link_html = case_url
        .map(|url| {
            let url = escape_html(url);
            format!(
                r#"<p style="margin:24px 0"><a href="{url}" style="background:#1f2937;color:#ffffff;padding:10px 18px;border-radius:4px;text-decoration:none">View case</a></p>"#
            )
        })
        .unwrap_or_default();

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<body style="font-family:Arial,sans-serif;color:#111827;max-width:600px;margin:0 auto;padding:24px">
<h2 style="margin:0 0 16px">{title_html}</h2>
<p style="line-height:1.5">{message_html}</p>
{link_html}
<hr style="border:none;border-top:1px solid #e5e7eb;margin:24px 0">
<p style="font-size:12px;color:#6b7280">You are receiving this because you follow this case on Casefile. Manage your email preferences from your account.</p>
</body>
</html>"#
    );

    let mut text = format!("{}\n\n{}\n", title, message);
    if let Some(url) = case_url {
        text.push_str(&format!("\nView case: {}\n", url));
    }
    text.push_str("\nManage your email preferences from your Casefile account.\n");

    RenderedEmail { subject, html, text }
}
