//! Command-line tokenizing and MAIL/RCPT path parsing.
//!
//! Addresses are extracted from their angle brackets and otherwise left
//! untouched; canonicalization is the embedder's concern.

/// Split an operation into its uppercased verb and the parameter rest.
///
/// Trailing CR/LF and surrounding whitespace are trimmed first; the verb ends
/// at the first space. Grouped operations keep their embedded line breaks in
/// the returned parameters, which the default dispatcher rejects.
#[must_use]
pub fn tokenize(operation: &str) -> (String, String) {
    let operation = operation.trim();
    match operation.split_once(' ') {
        Some((verb, params)) => (verb.to_ascii_uppercase(), params.to_string()),
        None => (operation.to_ascii_uppercase(), String::new()),
    }
}

/// A parsed `MAIL FROM:` / `RCPT TO:` argument.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PathArgs {
    pub address: String,
    pub options: Vec<String>,
}

/// Parse `<PREFIX>\s*<address>( option...)?`, e.g. `FROM: <a@b> BODY=8BITMIME`.
///
/// The prefix is matched case-insensitively; the address keeps its case.
/// Options are the whitespace-separated tokens after the closing bracket.
/// Returns `None` on any syntax failure (the caller replies 501).
pub(crate) fn parse_path(params: &str, prefix: &str) -> Option<PathArgs> {
    // get() instead of slicing: the byte at the prefix boundary may fall
    // inside a multi-byte character on garbage input
    let head = params.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }

    let rest = params[prefix.len()..].trim_start();
    let rest = rest.strip_prefix('<')?;
    let (address, after) = rest.split_once('>')?;

    let options = if after.is_empty() {
        Vec::new()
    } else if after.starts_with(char::is_whitespace) {
        after.split_whitespace().map(str::to_string).collect()
    } else {
        // residue glued to the bracket is a syntax error
        return None;
    };

    Some(PathArgs {
        address: address.to_string(),
        options,
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{parse_path, tokenize, PathArgs};

    #[test]
    fn tokenize_upcases_verb() {
        assert_eq!(
            tokenize("helo localhost\r\n"),
            ("HELO".to_string(), "localhost".to_string())
        );
        assert_eq!(tokenize("DATA\r\n"), ("DATA".to_string(), String::new()));
        assert_eq!(tokenize("\r\n"), (String::new(), String::new()));
    }

    #[test]
    fn tokenize_keeps_grouped_lines_in_params() {
        let (verb, params) = tokenize("MAIL FROM: <a@b>\r\nRCPT TO: <c@d>\r\n");
        assert_eq!(verb, "MAIL");
        assert!(params.contains('\n'));
    }

    #[test]
    fn parse_bare_address() {
        assert_eq!(
            parse_path("FROM: <from@example.net>", "FROM:"),
            Some(PathArgs {
                address: "from@example.net".to_string(),
                options: Vec::new(),
            })
        );
    }

    #[test]
    fn parse_prefix_case_insensitive_address_case_preserved() {
        assert_eq!(
            parse_path("from:<MixedCase@Example.NET>", "FROM:"),
            Some(PathArgs {
                address: "MixedCase@Example.NET".to_string(),
                options: Vec::new(),
            })
        );
    }

    #[test]
    fn parse_null_sender() {
        assert_eq!(
            parse_path("FROM:<>", "FROM:"),
            Some(PathArgs {
                address: String::new(),
                options: Vec::new(),
            })
        );
    }

    #[test]
    fn parse_options() {
        assert_eq!(
            parse_path("FROM: <a@b> BODY=8BITMIME SIZE=1000", "FROM:"),
            Some(PathArgs {
                address: "a@b".to_string(),
                options: vec!["BODY=8BITMIME".to_string(), "SIZE=1000".to_string()],
            })
        );
    }

    #[test]
    fn parse_failures() {
        assert_eq!(parse_path("TO: <a@b>", "FROM:"), None);
        assert_eq!(parse_path("FROM: a@b", "FROM:"), None);
        assert_eq!(parse_path("FROM: <a@b", "FROM:"), None);
        assert_eq!(parse_path("FROM: <a@b>junk", "FROM:"), None);
    }

    #[test]
    fn parse_survives_multibyte_garbage() {
        assert_eq!(parse_path("FRÖM: <a@b>", "FROM:"), None);
        assert_eq!(parse_path("é", "FROM:"), None);
    }
}
