/// A complete, possibly multi-line, SMTP server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    /// Parse the raw text of a reply, all lines included.
    ///
    /// Every line must start with the same three digit code, followed by `-`
    /// on continuation lines and a space (or nothing) on the last one.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut code = None;
        let mut lines = Vec::new();

        for line in raw.lines() {
            let line = line.trim_end_matches('\r');
            let digits = line
                .get(..3)
                .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
                .ok_or_else(|| format!("malformed reply line: {:?}", line))?;
            let parsed: u16 = digits
                .parse()
                .map_err(|_| format!("malformed reply code: {:?}", line))?;

            match code {
                None => code = Some(parsed),
                Some(c) if c != parsed => {
                    return Err(format!("inconsistent reply codes {} and {}", c, parsed))
                }
                _ => {}
            }
            lines.push(line.get(4..).unwrap_or("").to_string());
        }

        let code = code.ok_or_else(|| "empty reply".to_string())?;
        Ok(Self { code, lines })
    }

    /// Whether `line` ends a reply, i.e. is not a `NNN-` continuation.
    pub fn is_last_line(line: &str) -> bool {
        line.as_bytes().get(3) != Some(&b'-')
    }

    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// Extension keywords of an `EHLO` reply, upper-cased. The first line is
    /// the server greeting and is skipped.
    pub fn extensions(&self) -> Vec<String> {
        self.lines
            .iter()
            .skip(1)
            .filter_map(|line| line.split_whitespace().next())
            .map(|kw| kw.to_ascii_uppercase())
            .collect()
    }

    /// SASL mechanisms from the `AUTH` line of an `EHLO` reply, upper-cased.
    pub fn auth_mechanisms(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|line| {
                let mut words = line.split_whitespace();
                match words.next() {
                    Some(kw) if kw.eq_ignore_ascii_case("AUTH") => {
                        Some(words.map(|w| w.to_ascii_uppercase()).collect::<Vec<_>>())
                    }
                    _ => None,
                }
            })
            .flatten()
            .collect()
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.code, self.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line() {
        let reply = Reply::parse("250 Ok\r\n").unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.text(), "Ok");
        assert!(reply.is_positive());
    }

    #[test]
    fn test_ehlo_capabilities() {
        let reply = Reply::parse(
            "250-smtp.example.com at your service\r\n\
             250-SIZE 35882577\r\n\
             250-AUTH LOGIN plain XOAUTH2\r\n\
             250 SMTPUTF8\r\n",
        )
        .unwrap();
        assert_eq!(reply.lines.len(), 4);
        assert_eq!(reply.auth_mechanisms(), vec!["LOGIN", "PLAIN", "XOAUTH2"]);
        assert_eq!(reply.extensions(), vec!["SIZE", "AUTH", "SMTPUTF8"]);
    }

    #[test]
    fn test_bare_code() {
        let reply = Reply::parse("354\r\n").unwrap();
        assert_eq!(reply.code, 354);
        assert_eq!(reply.text(), "");
    }

    #[test]
    fn test_malformed() {
        assert!(Reply::parse("").is_err());
        assert!(Reply::parse("hello\r\n").is_err());
        assert!(Reply::parse("250-a\r\n251 b\r\n").is_err());
    }

    #[test]
    fn test_last_line() {
        assert!(!Reply::is_last_line("250-SIZE"));
        assert!(Reply::is_last_line("250 Ok"));
        assert!(Reply::is_last_line("250"));
    }
}
