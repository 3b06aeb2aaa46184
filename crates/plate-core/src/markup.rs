use thiserror::Error;

use crate::view::{RawPart, ViewElement, ViewNode};

const VOID_ELEMENTS: [&str; 4] = ["br", "hr", "img", "input"];

/// Deepest element nesting [`parse`] accepts. Everything downstream of the
/// reader walks the tree recursively.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkupError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("unexpected closing tag </{name}> at byte {offset}")]
    UnexpectedClosingTag { name: String, offset: usize },
    #[error("element <{0}> is never closed")]
    Unclosed(String),
    #[error("malformed tag at byte {0}")]
    MalformedTag(usize),
    #[error("elements nested {depth} deep at byte {offset}")]
    TooDeep { depth: usize, offset: usize },
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

pub fn to_markup(nodes: &[ViewNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        write_node(&mut out, node);
    }
    out
}

fn write_node(out: &mut String, node: &ViewNode) {
    match node {
        ViewNode::Text(text) => escape_into(out, text, false),
        ViewNode::Element(el) => write_element(out, el),
    }
}

fn write_element(out: &mut String, el: &ViewElement) {
    out.push('<');
    out.push_str(&el.name);
    if !el.classes.is_empty() {
        out.push_str(" class=\"");
        escape_into(out, &el.classes.join(" "), true);
        out.push('"');
    }
    for (key, value) in &el.attrs {
        if key == "class" {
            continue;
        }
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_into(out, value, true);
        out.push('"');
    }
    out.push('>');

    if is_void(&el.name) {
        return;
    }

    for child in &el.children {
        write_node(out, child);
    }
    if let Some(raw) = &el.raw {
        for part in &raw.parts {
            match part {
                RawPart::Text(text) => escape_into(out, text, false),
                RawPart::Control(control) => {
                    out.push_str("<button type=\"button\">");
                    escape_into(out, &control.label, false);
                    out.push_str("</button>");
                }
            }
        }
    }

    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}

fn escape_into(out: &mut String, text: &str, attr: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

pub fn parse(input: &str) -> Result<Vec<ViewNode>, MarkupError> {
    let mut reader = Reader {
        src: input,
        pos: 0,
        depth: 0,
    };
    reader.nodes(None)
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) {
        if let Some(ch) = self.peek() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn name(&mut self) -> &'a str {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':'))
        {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn nodes(&mut self, closing: Option<&str>) -> Result<Vec<ViewNode>, MarkupError> {
        let mut out = Vec::new();
        loop {
            if self.eof() {
                return match closing {
                    Some(name) => Err(MarkupError::Unclosed(name.to_string())),
                    None => Ok(out),
                };
            }

            let rest = self.rest();
            if rest.starts_with("<!--") {
                let Some(end) = rest.find("-->") else {
                    return Err(MarkupError::UnexpectedEof(self.src.len()));
                };
                self.pos += end + 3;
            } else if rest.starts_with("</") {
                let offset = self.pos;
                self.pos += 2;
                let name = self.name().to_ascii_lowercase();
                self.skip_whitespace();
                if self.peek() != Some('>') {
                    return Err(MarkupError::MalformedTag(offset));
                }
                self.bump();
                if closing == Some(name.as_str()) {
                    return Ok(out);
                }
                return Err(MarkupError::UnexpectedClosingTag { name, offset });
            } else if rest.starts_with('<') {
                out.push(ViewNode::Element(self.element()?));
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                let text = decode_entities(&rest[..end]);
                self.pos += end;
                if !text.is_empty() {
                    out.push(ViewNode::Text(text));
                }
            }
        }
    }

    fn element(&mut self) -> Result<ViewElement, MarkupError> {
        let offset = self.pos;
        self.bump();
        let name = self.name().to_ascii_lowercase();
        if name.is_empty() {
            return Err(MarkupError::MalformedTag(offset));
        }

        let mut el = ViewElement::new(name);
        let mut self_closing = false;
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(MarkupError::UnexpectedEof(self.pos)),
                Some('>') => {
                    self.bump();
                    break;
                }
                Some('/') => {
                    self.bump();
                    if self.peek() != Some('>') {
                        return Err(MarkupError::MalformedTag(offset));
                    }
                    self.bump();
                    self_closing = true;
                    break;
                }
                Some(_) => {
                    let key = self.name().to_ascii_lowercase();
                    if key.is_empty() {
                        return Err(MarkupError::MalformedTag(offset));
                    }
                    self.skip_whitespace();
                    let value = if self.peek() == Some('=') {
                        self.bump();
                        self.skip_whitespace();
                        self.attr_value(offset)?
                    } else {
                        String::new()
                    };
                    if key == "class" {
                        for class in value.split_whitespace() {
                            el.add_class(class);
                        }
                    } else {
                        el.attrs.insert(key, value);
                    }
                }
            }
        }

        if !self_closing && !is_void(&el.name) {
            if self.depth == MAX_DEPTH {
                return Err(MarkupError::TooDeep {
                    depth: self.depth + 1,
                    offset,
                });
            }
            let name = el.name.clone();
            self.depth += 1;
            el.children = self.nodes(Some(&name))?;
            self.depth -= 1;
        }
        Ok(el)
    }

    fn attr_value(&mut self, offset: usize) -> Result<String, MarkupError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.bump();
                let rest = self.rest();
                let Some(end) = rest.find(quote) else {
                    return Err(MarkupError::UnexpectedEof(self.src.len()));
                };
                let value = decode_entities(&rest[..end]);
                self.pos += end + 1;
                Ok(value)
            }
            Some(_) => {
                let rest = self.rest();
                let end = rest
                    .find(|ch: char| ch.is_whitespace() || ch == '>')
                    .unwrap_or(rest.len());
                if end == 0 {
                    return Err(MarkupError::MalformedTag(offset));
                }
                self.pos += end;
                Ok(decode_entities(&rest[..end]))
            }
            None => Err(MarkupError::UnexpectedEof(self.pos)),
        }
    }
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest.find(';').and_then(|end| {
            let entity = &rest[1..end];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
