use base64::Engine;

/// Assemble the wire-ready message handed to `DATA`.
///
/// Headers are CRLF terminated and separated from the body by exactly one
/// empty line. Servers split headers from body on that first empty line, so
/// the order and layout here are fixed.
pub fn compose(sender: &str, subject: &str, body: &str) -> String {
    let mut message = String::with_capacity(body.len() + 128);
    message.push_str(&format!("From: {}\r\n", single_line(sender)));
    message.push_str(&format!("Subject: {}\r\n", encode_subject(subject)));
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/html; charset=\"UTF-8\"\r\n");
    message.push_str("\r\n");
    message.push_str(body);
    message
}

/// RFC 2047 encoded word for non-ASCII subjects, the subject itself otherwise.
fn encode_subject(subject: &str) -> String {
    let subject = single_line(subject);
    if subject.is_ascii() {
        subject
    } else {
        let encoded = base64::engine::general_purpose::STANDARD.encode(subject.as_bytes());
        format!("=?UTF-8?B?{}?=", encoded)
    }
}

/// Header values may not carry line breaks.
fn single_line(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_layout() {
        let message = compose("shop@example.com", "Welcome", "<p>hi</p>");
        assert_eq!(
            message,
            "From: shop@example.com\r\n\
             Subject: Welcome\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/html; charset=\"UTF-8\"\r\n\
             \r\n\
             <p>hi</p>"
        );
    }

    #[test]
    fn test_single_blank_line_before_body() {
        for body in ["", "\r\n", "\r\n\r\nleading blanks", "plain"] {
            let message = compose("a@b.c", "s", body);
            let (headers, rest) = message.split_once("\r\n\r\n").unwrap();
            assert!(!headers.contains("\r\n\r\n"));
            assert_eq!(rest, body);
        }
    }

    #[test]
    fn test_compose_is_deterministic() {
        let first = compose("a@b.c", "Bid alert", "body");
        let second = compose("a@b.c", "Bid alert", "body");
        assert_eq!(first, second);
    }

    #[test]
    fn test_header_injection_stripped() {
        let message = compose("a@b.c", "hi\r\nBcc: evil@x.y", "body");
        assert!(message.contains("Subject: hiBcc: evil@x.y\r\n"));
        assert!(!message.contains("\r\nBcc:"));
    }

    #[test]
    fn test_non_ascii_subject_is_encoded() {
        let message = compose("a@b.c", "Überbieten", "body");
        assert!(message.contains("Subject: =?UTF-8?B?w5xiZXJiaWV0ZW4=?=\r\n"));
    }
}
