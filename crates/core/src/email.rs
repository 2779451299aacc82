//! Delivery email composition: template rendering plus a hand-assembled MIME tree
//! suitable for Gmail's `raw` send endpoint.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

use crate::config::EmailConfig;
use crate::errors::{ApplicationError, DomainError};
use crate::placeholders::email_placeholders;
use crate::template::TemplateSet;

const LINE_WIDTH: usize = 76;
pub const LOGO_CONTENT_ID: &str = "logo";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineImage {
    pub content_id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: Option<String>,
    pub inline_logo: Option<InlineImage>,
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, Default)]
pub struct ProposalEmailRequest {
    pub to: String,
    pub client_name: String,
    pub proposal_link: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub attachment: Option<Attachment>,
    pub logo: Option<InlineImage>,
}

/// Renders the branded email and assembles the message the mailer will send.
pub fn compose_proposal_email(
    templates: &TemplateSet,
    defaults: &EmailConfig,
    request: ProposalEmailRequest,
) -> Result<OutgoingEmail, ApplicationError> {
    let link = request.proposal_link.as_deref().map(str::trim).filter(|link| !link.is_empty());
    if link.is_none() && request.attachment.is_none() {
        return Err(DomainError::InvalidEmail(
            "either a proposal link or an attachment is required".to_string(),
        )
        .into());
    }

    let html_body = templates.render_email(&email_placeholders(&request.client_name, link))?;
    let text_body = request
        .body
        .filter(|body| !body.trim().is_empty())
        .unwrap_or_else(|| match link {
            Some(link) => format!("Your proposal is ready: {link}"),
            None => "Your proposal is attached. Open it in your browser to review and sign."
                .to_string(),
        });
    let subject = request
        .subject
        .filter(|subject| !subject.trim().is_empty())
        .unwrap_or_else(|| defaults.default_subject.clone());
    let from = Some(defaults.sender.clone()).filter(|sender| sender.contains('@'));

    let email = OutgoingEmail {
        to: request.to,
        from,
        subject,
        text_body,
        html_body: Some(html_body),
        inline_logo: request.logo,
        attachments: request.attachment.into_iter().collect(),
    };
    email.validate()?;
    Ok(email)
}

impl OutgoingEmail {
    pub fn validate(&self) -> Result<(), DomainError> {
        let to = self.to.trim();
        let looks_like_address = to.contains('@') && !to.starts_with('@') && !to.ends_with('@');
        if !looks_like_address {
            return Err(DomainError::InvalidEmail(format!("`{to}` is not an email address")));
        }
        for (field, value) in
            [("to", self.to.as_str()), ("subject", self.subject.as_str())]
        {
            if value.contains(['\r', '\n']) {
                return Err(DomainError::InvalidEmail(format!("{field} must be a single line")));
            }
        }
        Ok(())
    }

    /// RFC 2822 message. `seed` makes the multipart boundaries deterministic.
    pub fn to_mime(&self, seed: &str) -> String {
        MimeMessage { email: self, seed }.to_string()
    }

    /// Base64url of the MIME message, as Gmail's `users.messages.send` expects.
    pub fn to_gmail_raw(&self) -> String {
        let seed = uuid::Uuid::new_v4().simple().to_string();
        URL_SAFE.encode(self.to_mime(&seed))
    }
}

struct MimeMessage<'a> {
    email: &'a OutgoingEmail,
    seed: &'a str,
}

impl fmt::Display for MimeMessage<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let email = self.email;
        write!(out, "To: {}\r\n", email.to.trim())?;
        if let Some(from) = &email.from {
            write!(out, "From: {from}\r\n")?;
        }
        write!(out, "Subject: {}\r\n", encode_header(&email.subject))?;
        out.write_str("MIME-Version: 1.0\r\n")?;

        let mixed = format!("mixed_{}", self.seed);
        write!(out, "Content-Type: multipart/mixed; boundary=\"{mixed}\"\r\n\r\n")?;
        write!(out, "--{mixed}\r\n")?;
        self.write_alternative(out)?;

        for attachment in &email.attachments {
            write!(out, "--{mixed}\r\n")?;
            write!(
                out,
                "Content-Type: {}; name=\"{}\"\r\n",
                attachment.content_type, attachment.filename
            )?;
            write!(out, "Content-Disposition: attachment; filename=\"{}\"\r\n", attachment.filename)?;
            write_base64_body(out, &attachment.bytes)?;
        }

        write!(out, "--{mixed}--\r\n")
    }
}

impl MimeMessage<'_> {
    fn write_alternative(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alternative = format!("alt_{}", self.seed);
        write!(out, "Content-Type: multipart/alternative; boundary=\"{alternative}\"\r\n\r\n")?;

        write!(out, "--{alternative}\r\n")?;
        out.write_str("Content-Type: text/plain; charset=\"utf-8\"\r\n")?;
        write_base64_body(out, self.email.text_body.as_bytes())?;

        if let Some(html) = &self.email.html_body {
            write!(out, "--{alternative}\r\n")?;
            match &self.email.inline_logo {
                Some(logo) => {
                    let related = format!("rel_{}", self.seed);
                    write!(out, "Content-Type: multipart/related; boundary=\"{related}\"\r\n\r\n")?;
                    write!(out, "--{related}\r\n")?;
                    out.write_str("Content-Type: text/html; charset=\"utf-8\"\r\n")?;
                    write_base64_body(out, html.as_bytes())?;

                    write!(out, "--{related}\r\n")?;
                    write!(out, "Content-Type: {}\r\n", logo.content_type)?;
                    write!(out, "Content-ID: <{}>\r\n", logo.content_id)?;
                    write!(out, "Content-Disposition: inline; filename=\"{}\"\r\n", logo.content_id)?;
                    write_base64_body(out, &logo.bytes)?;
                    write!(out, "--{related}--\r\n")?;
                }
                None => {
                    out.write_str("Content-Type: text/html; charset=\"utf-8\"\r\n")?;
                    write_base64_body(out, html.as_bytes())?;
                }
            }
        }

        write!(out, "--{alternative}--\r\n")
    }
}

fn write_base64_body(out: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    out.write_str("Content-Transfer-Encoding: base64\r\n\r\n")?;
    let encoded = STANDARD.encode(bytes);
    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(LINE_WIDTH));
        out.write_str(line)?;
        out.write_str("\r\n")?;
        rest = tail;
    }
    Ok(())
}

fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value))
    }
}

/// Copy-and-paste delivery email for sending a proposal file by hand.
pub fn delivery_copy(client_name: &str, filename: &str, team: &str) -> String {
    let first_name = client_name.split_whitespace().next().unwrap_or(client_name);
    format!(
        "SUBJECT: Proposal for {client_name} - Review & Signature Required\n\
         \n\
         Hi {first_name},\n\
         \n\
         Please find our proposal attached. This is an interactive digital document designed to be viewed in your web browser.\n\
         \n\
         INSTRUCTIONS TO SIGN:\n\
         1. Download the attached file ({filename}).\n\
         2. Double-click the file to open it in your browser (Chrome/Safari/Edge).\n\
         3. Scroll to the bottom and draw your signature in the box.\n\
         4. Click the \"Download as PDF\" button.\n\
         5. Save the PDF to your computer.\n\
         6. Reply to this email with the signed PDF attached.\n\
         \n\
         Let me know if you have any questions!\n\
         \n\
         Best,\n\
         {team} Team\n"
    )
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::{STANDARD, URL_SAFE};
    use base64::Engine;

    use super::{
        compose_proposal_email, delivery_copy, encode_header, Attachment, InlineImage,
        OutgoingEmail, ProposalEmailRequest,
    };
    use crate::config::AppConfig;
    use crate::errors::{ApplicationError, DomainError};
    use crate::template::TemplateSet;

    fn request() -> ProposalEmailRequest {
        ProposalEmailRequest {
            to: "jane@acme.test".to_string(),
            client_name: "Jane Doe".to_string(),
            proposal_link: Some("https://proposal-acme.vercel.app".to_string()),
            ..ProposalEmailRequest::default()
        }
    }

    #[test]
    fn composes_with_defaults() {
        let templates = TemplateSet::embedded().expect("templates");
        let config = AppConfig::default();

        let email = compose_proposal_email(&templates, &config.email, request()).expect("compose");

        assert_eq!(email.subject, "Your Proposal from InstantProd");
        assert_eq!(email.text_body, "Your proposal is ready: https://proposal-acme.vercel.app");
        assert_eq!(email.from, None, "`me` sender is resolved by the mail provider");
        assert!(email.html_body.as_deref().unwrap_or_default().contains("Hi Jane,"));
    }

    #[test]
    fn link_or_attachment_is_required() {
        let templates = TemplateSet::embedded().expect("templates");
        let config = AppConfig::default();
        let error = compose_proposal_email(
            &templates,
            &config.email,
            ProposalEmailRequest { proposal_link: None, ..request() },
        )
        .expect_err("nothing to deliver");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidEmail(_))));
    }

    #[test]
    fn header_injection_is_rejected() {
        let templates = TemplateSet::embedded().expect("templates");
        let config = AppConfig::default();
        let error = compose_proposal_email(
            &templates,
            &config.email,
            ProposalEmailRequest {
                subject: Some("Hi\r\nBcc: someone@evil.test".to_string()),
                ..request()
            },
        )
        .expect_err("multi-line subject");

        assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidEmail(_))));
    }

    #[test]
    fn mime_tree_nests_related_inside_alternative_and_attachments_last() {
        let email = OutgoingEmail {
            to: "jane@acme.test".to_string(),
            from: None,
            subject: "Proposal".to_string(),
            text_body: "plain".to_string(),
            html_body: Some("<p>html</p>".to_string()),
            inline_logo: Some(InlineImage {
                content_id: "logo".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            }),
            attachments: vec![Attachment {
                filename: "acme.html".to_string(),
                content_type: "text/html".to_string(),
                bytes: b"<html></html>".to_vec(),
            }],
        };

        let mime = email.to_mime("seed");
        let mixed = mime.find("multipart/mixed").expect("mixed");
        let alternative = mime.find("multipart/alternative").expect("alternative");
        let related = mime.find("multipart/related").expect("related");
        let attachment = mime.find("filename=\"acme.html\"").expect("attachment");

        assert!(mixed < alternative && alternative < related && related < attachment);
        assert!(mime.contains("Content-ID: <logo>"));
        assert!(mime.contains(&STANDARD.encode("plain")));
        assert!(mime.ends_with("--mixed_seed--\r\n"));
    }

    #[test]
    fn attachment_bodies_wrap_at_seventy_six_columns() {
        let bytes: Vec<u8> = (0..=255).collect();
        let email = OutgoingEmail {
            to: "jane@acme.test".to_string(),
            from: Some("team@closer.test".to_string()),
            subject: "Proposal".to_string(),
            text_body: "plain".to_string(),
            html_body: None,
            inline_logo: None,
            attachments: vec![Attachment {
                filename: "blob.bin".to_string(),
                content_type: "application/octet-stream".to_string(),
                bytes: bytes.clone(),
            }],
        };

        let mime = email.to_mime("seed");
        let body = mime
            .split("filename=\"blob.bin\"\r\nContent-Transfer-Encoding: base64\r\n\r\n")
            .nth(1)
            .expect("attachment body");
        let lines: Vec<&str> = body.split("\r\n").take_while(|line| !line.starts_with("--")).collect();

        assert!(mime.starts_with("To: jane@acme.test\r\nFrom: team@closer.test\r\n"));
        assert!(lines.iter().all(|line| line.len() <= 76));
        assert_eq!(lines[0].len(), 76);
        assert_eq!(STANDARD.decode(lines.concat()).expect("base64"), bytes);
    }

    #[test]
    fn gmail_raw_is_url_safe_base64_of_the_message() {
        let email = OutgoingEmail {
            to: "jane@acme.test".to_string(),
            from: None,
            subject: "Hello".to_string(),
            text_body: "body".to_string(),
            html_body: None,
            inline_logo: None,
            attachments: Vec::new(),
        };

        let raw = email.to_gmail_raw();
        let decoded = URL_SAFE.decode(raw).expect("url-safe base64");
        let text = String::from_utf8(decoded).expect("utf8");
        assert!(text.starts_with("To: jane@acme.test\r\n"));
        assert!(text.contains("Subject: Hello\r\n"));
    }

    #[test]
    fn non_ascii_subjects_are_encoded_words() {
        assert_eq!(encode_header("Plain"), "Plain");
        assert!(encode_header("Propuesta para José").starts_with("=?UTF-8?B?"));
    }

    #[test]
    fn delivery_copy_addresses_first_name() {
        let copy = delivery_copy("Jane Doe", "acme_20250101.html", "InstantProd");
        assert!(copy.starts_with("SUBJECT: Proposal for Jane Doe - Review & Signature Required"));
        assert!(copy.contains("Hi Jane,"));
        assert!(copy.contains("(acme_20250101.html)"));
        assert!(copy.contains("InstantProd Team"));
    }
}
