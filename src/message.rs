//! Outbound message model and its MIME wire form.
//!
//! A [`Message`] is populated once, handed to the transport, and dropped.
//! [`Message::to_bytes`] produces the exact byte stream written during the
//! SMTP `DATA` phase: a `multipart/mixed` document with one `text/html` body
//! part and one `application/octet-stream` part per attachment.

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;

use crate::error::MailError;
use crate::render::TemplateRenderer;

/// Base64 output is folded at this width so no payload line can exceed the
/// SMTP 1000-octet limit.
const BASE64_LINE_WIDTH: usize = 76;

#[derive(Debug, Clone, Default)]
pub struct Message {
    pub sender: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    /// Single HTML body part. Exactly one body part is ever emitted.
    pub body: String,
    auto_bcc: bool,
    attachments: BTreeMap<String, Vec<u8>>,
}

impl Message {
    /// When `auto_bcc` is set the sender receives a blind copy of every
    /// send: the address is appended to the envelope, never to a header.
    pub fn new(sender: impl Into<String>, subject: impl Into<String>, auto_bcc: bool) -> Self {
        Self {
            sender: sender.into(),
            subject: subject.into(),
            auto_bcc,
            ..Self::default()
        }
    }

    /// Attach raw bytes under `name`. A second attachment with the same name
    /// replaces the first; names are unique by construction.
    pub fn attach(&mut self, name: impl Into<String>, content: Vec<u8>) {
        self.attachments.insert(name.into(), content);
    }

    /// Render `template` through the collaborator and attach the output
    /// under the template's file name (its final path component).
    pub fn attach_rendered<R: TemplateRenderer>(
        &mut self,
        renderer: &R,
        template: &str,
        data: &Value,
    ) -> Result<(), MailError> {
        let rendered = renderer.render(template, data)?;
        let name = Path::new(template)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| template.to_owned());
        self.attachments.insert(name, rendered.into_bytes());
        Ok(())
    }

    /// Render `template` through the collaborator and use the output as the
    /// HTML body.
    pub fn set_body_from<R: TemplateRenderer>(
        &mut self,
        renderer: &R,
        template: &str,
        data: &Value,
    ) -> Result<(), MailError> {
        self.body = renderer.render(template, data)?;
        Ok(())
    }

    pub fn attachments(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.attachments
    }

    /// The full address list for the protocol's `RCPT` phase:
    /// `to + cc + bcc`, plus the sender when `auto_bcc` is set. Headers
    /// reflect only `to` and `cc`; this list is what actually gets the mail.
    pub fn envelope_recipients(&self) -> Vec<&str> {
        let mut rcpt: Vec<&str> = self.to.iter().map(String::as_str).collect();
        rcpt.extend(self.cc.iter().map(String::as_str));
        rcpt.extend(self.bcc.iter().map(String::as_str));
        if self.auto_bcc {
            rcpt.push(&self.sender);
        }
        rcpt
    }

    /// Serialize to the MIME byte stream written during `DATA`.
    ///
    /// Pure: same message, same bytes, except for the boundary token which
    /// is freshly generated per call. `bcc` addresses never appear in the
    /// output; they ride on the envelope only. Attachment names pass
    /// through unvalidated.
    pub fn to_bytes(&self) -> Vec<u8> {
        let boundary = boundary_token();
        let mut buf = String::new();

        buf.push_str(&format!(
            "Subject: =?UTF-8?B?{}?=\r\n",
            BASE64.encode(self.subject.as_bytes())
        ));
        buf.push_str(&format!("From: {}\r\n", self.sender));
        buf.push_str(&format!("To: {}\r\n", self.to.join(",")));
        if !self.cc.is_empty() {
            buf.push_str(&format!("Cc: {}\r\n", self.cc.join(",")));
        }
        buf.push_str("MIME-Version: 1.0\r\n");
        buf.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n",
            boundary
        ));

        buf.push_str(&format!("\r\n--{}\r\n", boundary));
        buf.push_str("Content-Type: text/html; charset=\"utf-8\"\r\n");
        buf.push_str(&format!("\r\n{}\r\n", self.body));

        for (name, content) in &self.attachments {
            buf.push_str(&format!("--{}\r\n", boundary));
            buf.push_str(&format!(
                "Content-Type: application/octet-stream; name={}\r\n",
                name
            ));
            buf.push_str("Content-Transfer-Encoding: base64\r\n");
            buf.push_str("Content-Disposition: attachment;\r\n\r\n");
            let encoded = BASE64.encode(content);
            let mut rest = encoded.as_str();
            while !rest.is_empty() {
                let (line, tail) = rest.split_at(rest.len().min(BASE64_LINE_WIDTH));
                buf.push_str(line);
                buf.push_str("\r\n");
                rest = tail;
            }
        }

        buf.push_str(&format!("--{}--\r\n", boundary));

        buf.into_bytes()
    }
}

fn boundary_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailparse::{parse_mail, MailHeaderMap};

    fn serialized(message: &Message) -> String {
        String::from_utf8(message.to_bytes()).unwrap()
    }

    #[test]
    fn subject_survives_encoded_word_round_trip() {
        let message = Message::new("a@x.test", "회의 안내 ✔", false);
        let raw = serialized(&message);

        let line = raw
            .lines()
            .find(|l| l.starts_with("Subject: "))
            .expect("no Subject header");
        let encoded = line
            .trim_start_matches("Subject: =?UTF-8?B?")
            .trim_end_matches("?=");
        let decoded = BASE64.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "회의 안내 ✔");
    }

    #[test]
    fn cc_header_omitted_when_empty() {
        let mut message = Message::new("a@x.test", "hi", false);
        message.to.push("b@x.test".into());
        let raw = serialized(&message);
        assert!(!raw.contains("\r\nCc:"), "empty cc must not emit a header");
    }

    #[test]
    fn bcc_never_appears_in_headers() {
        let mut message = Message::new("a@x.test", "hi", false);
        message.to.push("b@x.test".into());
        message.cc.push("c@x.test".into());
        message.bcc.push("hidden@x.test".into());
        let raw = serialized(&message);

        assert!(raw.contains("Cc: c@x.test\r\n"));
        assert!(!raw.contains("Bcc"), "bcc is envelope-only");
        assert!(!raw.contains("hidden@x.test"));
    }

    #[test]
    fn envelope_expands_in_order_with_auto_bcc() {
        let mut message = Message::new("s@x.test", "hi", true);
        message.to.push("a@x.test".into());
        message.cc.push("b@x.test".into());
        message.bcc.push("c@x.test".into());

        assert_eq!(
            message.envelope_recipients(),
            vec!["a@x.test", "b@x.test", "c@x.test", "s@x.test"]
        );
    }

    #[test]
    fn envelope_without_auto_bcc_excludes_sender() {
        let mut message = Message::new("s@x.test", "hi", false);
        message.to.push("a@x.test".into());
        assert_eq!(message.envelope_recipients(), vec!["a@x.test"]);
    }

    #[test]
    fn attachments_round_trip_exactly_once() {
        let mut message = Message::new("a@x.test", "files", false);
        message.to.push("b@x.test".into());
        message.body = "<p>see attached</p>".into();
        message.attach("report.bin", vec![0u8, 1, 2, 250, 251, 252]);
        message.attach("notes.txt", b"plain text payload".to_vec());

        let bytes = message.to_bytes();
        let parsed = parse_mail(&bytes).unwrap();
        assert_eq!(parsed.subparts.len(), 3);

        let html = &parsed.subparts[0];
        assert!(html.ctype.mimetype.starts_with("text/html"));
        assert_eq!(html.get_body().unwrap().trim_end(), "<p>see attached</p>");

        // BTreeMap order: notes.txt before report.bin
        let notes = &parsed.subparts[1];
        assert_eq!(notes.ctype.params.get("name").unwrap(), "notes.txt");
        assert_eq!(notes.get_body_raw().unwrap(), b"plain text payload");

        let report = &parsed.subparts[2];
        assert_eq!(report.ctype.params.get("name").unwrap(), "report.bin");
        assert_eq!(report.get_body_raw().unwrap(), vec![0u8, 1, 2, 250, 251, 252]);
    }

    #[test]
    fn large_attachment_keeps_lines_under_smtp_limit() {
        let mut message = Message::new("a@x.test", "big", false);
        message.attach("blob.bin", vec![0xAB; 4096]);
        let raw = serialized(&message);
        assert!(raw.lines().all(|l| l.len() <= 998));

        let parsed = parse_mail(raw.as_bytes()).unwrap();
        assert_eq!(parsed.subparts[1].get_body_raw().unwrap(), vec![0xAB; 4096]);
    }

    #[test]
    fn multipart_is_terminated_with_closing_delimiter() {
        let mut with_attachment = Message::new("a@x.test", "hi", false);
        with_attachment.attach("f.bin", vec![1, 2, 3]);
        let without_attachment = Message::new("a@x.test", "hi", false);

        for message in [&with_attachment, &without_attachment] {
            let raw = serialized(message);
            let boundary = boundary_of(&raw);
            assert!(
                raw.ends_with(&format!("--{}--\r\n", boundary)),
                "missing closing delimiter"
            );
        }
    }

    #[test]
    fn serialization_is_stable_modulo_boundary() {
        let mut message = Message::new("a@x.test", "stable?", false);
        message.to.push("b@x.test".into());
        message.cc.push("c@x.test".into());
        message.body = "<h1>same</h1>".into();
        message.attach("data.bin", vec![9, 8, 7]);

        let first = serialized(&message);
        let second = serialized(&message);

        // Byte-identical once the random token is normalized away.
        let normalized_first = first.replace(&boundary_of(&first), "B");
        let normalized_second = second.replace(&boundary_of(&second), "B");
        assert_eq!(normalized_first, normalized_second);

        // And each output independently parses to the same structure.
        for raw in [&first, &second] {
            let parsed = parse_mail(raw.as_bytes()).unwrap();
            assert_eq!(
                parsed.headers.get_first_value("Subject").unwrap(),
                "stable?"
            );
            assert_eq!(parsed.headers.get_first_value("To").unwrap(), "b@x.test");
            assert_eq!(parsed.subparts.len(), 2);
            assert_eq!(
                parsed.subparts[0].get_body().unwrap().trim_end(),
                "<h1>same</h1>"
            );
            assert_eq!(parsed.subparts[1].get_body_raw().unwrap(), vec![9, 8, 7]);
        }
    }

    #[test]
    fn attach_rendered_uses_template_file_name() {
        struct CannedRenderer;
        impl TemplateRenderer for CannedRenderer {
            fn render(
                &self,
                _template: &str,
                data: &Value,
            ) -> Result<String, crate::render::RenderError> {
                Ok(format!("<p>{}</p>", data["name"].as_str().unwrap()))
            }
        }

        let mut message = Message::new("a@x.test", "hi", false);
        message
            .attach_rendered(
                &CannedRenderer,
                "templates/welcome.html",
                &serde_json::json!({ "name": "mogi" }),
            )
            .unwrap();

        assert_eq!(
            message.attachments().get("welcome.html").unwrap(),
            b"<p>mogi</p>"
        );
    }

    #[test]
    fn render_failure_propagates_unchanged() {
        struct FailingRenderer;
        impl TemplateRenderer for FailingRenderer {
            fn render(
                &self,
                template: &str,
                _data: &Value,
            ) -> Result<String, crate::render::RenderError> {
                Err(crate::render::RenderError::new(template, "missing variable"))
            }
        }

        let mut message = Message::new("a@x.test", "hi", false);
        let err = message
            .set_body_from(&FailingRenderer, "broken.html", &Value::Null)
            .unwrap_err();
        assert!(matches!(err, MailError::Render(_)));
        assert!(err.to_string().contains("broken.html"));
    }

    fn boundary_of(raw: &str) -> String {
        let start = raw.find("boundary=\"").unwrap() + "boundary=\"".len();
        let end = raw[start..].find('"').unwrap();
        raw[start..start + end].to_string()
    }
}
