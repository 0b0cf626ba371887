use std::collections::BTreeMap;

/// Options parsed from a command line: name -> ordered values.
///
/// Names are case-insensitive (stored lowercased) and unique; when an option
/// repeats, the last occurrence wins. An option that appeared without values
/// maps to an empty vector, never to a missing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArgs {
    options: BTreeMap<String, Vec<String>>,
}

impl ParsedArgs {
    pub fn insert(&mut self, name: &str, values: Vec<String>) {
        self.options.insert(name.to_ascii_lowercase(), values);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.options.contains_key(&name.to_ascii_lowercase())
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.options
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(|v| v.as_str())
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.options
            .get(&name.to_ascii_lowercase())
            .map(|values| values.as_slice())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.options
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Renders the mapping back to a single command line. Tokenizing the
    /// result yields an equivalent mapping.
    pub fn to_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.options.len());
        for (name, values) in &self.options {
            let mut part = format!("-{name}");
            for value in values {
                part.push(' ');
                part.push_str(&quote_value(value));
            }
            parts.push(part);
        }
        parts.join(" ")
    }
}

/// Tokenizes an argument vector. The arguments are joined with single spaces
/// and scanned as one line, so values holding spaces must carry their own
/// quotes to survive (the usage text recommends single quotes for that).
pub fn tokenize(args: &[String]) -> ParsedArgs {
    tokenize_line(&args.join(" "))
}

/// Tokenizes a single command line into options and values.
///
/// Grammar: an introducer (`/`, `-`, `--`) starts an option whose name runs
/// to the next whitespace; the values that follow belong to it until the next
/// introducer. A value is a double- or single-quoted string (one surrounding
/// layer stripped, interior spaces kept) or a bare token. A bare token in
/// name position maps to itself with no values. Total on malformed input: a
/// value missing its closing quote is taken verbatim, unstripped, and an
/// introducer with an empty name is skipped.
pub fn tokenize_line(line: &str) -> ParsedArgs {
    let mut parsed = ParsedArgs::default();
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        if let Some(stripped) = strip_introducer(rest) {
            let (name, after) = split_token(stripped);
            rest = after.trim_start();
            if name.is_empty() {
                continue;
            }

            let mut values = Vec::new();
            while !rest.is_empty() && !starts_option(rest) {
                let (value, after) = take_value(rest);
                values.push(value);
                rest = after.trim_start();
            }
            parsed.insert(name, values);
        } else {
            let (token, after) = split_token(rest);
            rest = after.trim_start();
            if !token.is_empty() {
                parsed.insert(token, Vec::new());
            }
        }
    }

    parsed
}

fn strip_introducer(rest: &str) -> Option<&str> {
    rest.strip_prefix("--")
        .or_else(|| rest.strip_prefix('-'))
        .or_else(|| rest.strip_prefix('/'))
}

fn starts_option(rest: &str) -> bool {
    rest.starts_with('-') || rest.starts_with('/')
}

fn split_token(rest: &str) -> (&str, &str) {
    match rest.find(char::is_whitespace) {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    }
}

fn take_value(rest: &str) -> (String, &str) {
    let first = rest.chars().next();
    if let Some(quote @ ('"' | '\'')) = first {
        let body = &rest[1..];
        if let Some(end) = body.find(quote) {
            return (body[..end].to_owned(), &body[end + 1..]);
        }
        // No closing quote: fall through and keep the token verbatim.
    }

    let (token, after) = split_token(rest);
    (token.to_owned(), after)
}

fn quote_value(value: &str) -> String {
    if value.is_empty() || value.contains(char::is_whitespace) {
        if value.contains('"') {
            format!("'{value}'")
        } else {
            format!("\"{value}\"")
        }
    } else {
        value.to_owned()
    }
}
