//! Content stream analysis and rewriting
//!
//! Tokenizes a page's raw drawing-operator stream, parses it into typed
//! operators, extracts text-show operators with their positioning context,
//! and can re-emit a stream with substituted text runs.

use std::collections::HashMap;

/// A typed operand value
///
/// Content streams carry postfix operand/operator sequences; operands are
/// one of a small set of value shapes. Keeping them typed lets the
/// interpreter match exhaustively instead of sniffing strings.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Bool(bool),
    /// A name token, without its leading slash
    Name(String),
    /// A string literal, unescaped
    Str(String),
    Array(Vec<Operand>),
}

/// One operator with the operands that preceded it
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    pub name: String,
    pub operands: Vec<Operand>,
}

/// A text-show occurrence with its accumulated graphics context
#[derive(Debug, Clone, PartialEq)]
pub struct TextOp {
    /// The operator that showed the text: `Tj`, `TJ`, `'` or `"`
    pub operator: String,
    pub text: String,
    /// Text-matrix translation at the time of the show
    pub x: f64,
    pub y: f64,
    /// Estimated advance width
    pub width: f64,
    pub height: f64,
    pub font: String,
    pub font_size: f64,
    /// Fill color as set by `rg` (black until set)
    pub color: (f64, f64, f64),
}

/// Average glyph width as a fraction of the font size, used when no font
/// metrics are available.
const AVG_GLYPH_WIDTH_RATIO: f64 = 0.6;

const KNOWN_OPERATORS: &[&str] = &[
    "q", "Q", "cm", "w", "J", "j", "M", "d", "ri", "i", "gs", "BT", "ET", "Tc", "Tw", "Tz", "TL",
    "Tf", "Tr", "Ts", "Td", "TD", "Tm", "T*", "Tj", "TJ", "'", "\"", "Do", "MP", "DP", "BMC",
    "BDC", "EMC", "BX", "EX", "cs", "CS", "sc", "SC", "scn", "SCN", "G", "g", "RG", "rg", "K",
    "k", "re", "s", "S", "f", "F", "f*", "B", "B*", "b", "b*", "n", "W", "W*", "m", "l", "c", "v",
    "y", "h", "sh", "BI", "ID", "EI", "d0", "d1",
];

fn is_operator(token: &str) -> bool {
    KNOWN_OPERATORS.contains(&token)
}

/// Split a content stream into tokens
///
/// Whitespace separates tokens except inside `(…)` / `<…>` string literals
/// and `[…]` arrays, which stay intact as single tokens. Backslash escapes
/// and nested balanced parentheses are honored inside literal strings.
pub fn tokenize(stream: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(stream);
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 0usize;
    let mut in_hex = false;
    let mut array_depth = 0usize;
    let mut escaped = false;

    for ch in text.chars() {
        if paren_depth > 0 {
            if escaped {
                current.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' => {
                    current.push(ch);
                    escaped = true;
                }
                '(' => {
                    current.push(ch);
                    paren_depth += 1;
                }
                ')' => {
                    current.push(ch);
                    paren_depth -= 1;
                }
                _ => current.push(ch),
            }
            continue;
        }

        if in_hex {
            current.push(ch);
            if ch == '>' {
                in_hex = false;
            }
            continue;
        }

        match ch {
            '(' => {
                current.push(ch);
                paren_depth = 1;
            }
            '<' => {
                current.push(ch);
                in_hex = true;
            }
            '[' => {
                current.push(ch);
                array_depth += 1;
            }
            ']' => {
                current.push(ch);
                array_depth = array_depth.saturating_sub(1);
            }
            _ if ch.is_whitespace() && array_depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Group tokens into operators
///
/// Each recognized operator keyword closes one `Operator`, taking every
/// token accumulated since the previous keyword as its operands.
pub fn parse(tokens: &[String]) -> Vec<Operator> {
    let mut operators = Vec::new();
    let mut pending: Vec<Operand> = Vec::new();

    for token in tokens {
        if is_operator(token) {
            operators.push(Operator {
                name: token.clone(),
                operands: std::mem::take(&mut pending),
            });
        } else {
            pending.push(parse_operand(token));
        }
    }

    operators
}

/// Tokenize and parse in one step
pub fn parse_stream(stream: &[u8]) -> Vec<Operator> {
    parse(&tokenize(stream))
}

fn parse_operand(token: &str) -> Operand {
    if let Ok(number) = token.parse::<f64>() {
        return Operand::Number(number);
    }
    if token == "true" {
        return Operand::Bool(true);
    }
    if token == "false" {
        return Operand::Bool(false);
    }
    if let Some(name) = token.strip_prefix('/') {
        return Operand::Name(name.to_string());
    }
    if token.len() >= 2 && token.starts_with('(') && token.ends_with(')') {
        return Operand::Str(unescape_string(&token[1..token.len() - 1]));
    }
    if token.len() >= 2 && token.starts_with('<') && token.ends_with('>') {
        return Operand::Str(decode_hex_string(&token[1..token.len() - 1]));
    }
    if token.len() >= 2 && token.starts_with('[') && token.ends_with(']') {
        let inner = tokenize(token[1..token.len() - 1].as_bytes());
        return Operand::Array(inner.iter().map(|t| parse_operand(t)).collect());
    }
    // Unknown keyword; keep it addressable as a name-less string.
    Operand::Str(token.to_string())
}

fn unescape_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Escape a string for emission as a `(…)` literal
pub fn escape_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

fn decode_hex_string(raw: &str) -> String {
    let digits: Vec<u8> = raw
        .bytes()
        .filter(|byte| byte.is_ascii_hexdigit())
        .collect();
    let mut bytes = Vec::with_capacity(digits.len() / 2 + 1);
    for pair in digits.chunks(2) {
        let high = hex_value(pair[0]);
        let low = if pair.len() == 2 { hex_value(pair[1]) } else { 0 };
        bytes.push(high << 4 | low);
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

/// Walk operators maintaining text state and emit one `TextOp` per shown
/// string
///
/// `Tf`, `rg` and `Tm` update the running state. A `TJ` array emits one
/// `TextOp` per string element, advancing an x-cursor by the element's
/// estimated width plus `adjustment * font_size * 0.001` for numeric
/// spacing elements.
pub fn extract_text_operators(operators: &[Operator]) -> Vec<TextOp> {
    let mut text_ops = Vec::new();
    let mut font = String::from("Helvetica");
    let mut font_size = 12.0;
    let mut color = (0.0, 0.0, 0.0);
    let mut text_matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

    for op in operators {
        match op.name.as_str() {
            "Tf" => {
                if let [Operand::Name(name), Operand::Number(size)] = op.operands.as_slice() {
                    font = name.clone();
                    font_size = *size;
                }
            }
            "rg" => {
                if let [Operand::Number(r), Operand::Number(g), Operand::Number(b)] =
                    op.operands.as_slice()
                {
                    color = (*r, *g, *b);
                }
            }
            "Tm" => {
                if op.operands.len() >= 6 {
                    for (slot, operand) in text_matrix.iter_mut().zip(&op.operands) {
                        if let Operand::Number(value) = operand {
                            *slot = *value;
                        }
                    }
                }
            }
            "Tj" | "'" | "\"" => {
                let text = match op.name.as_str() {
                    // The " operator carries word and char spacing first.
                    "\"" => op.operands.get(2),
                    _ => op.operands.first(),
                };
                if let Some(Operand::Str(text)) = text {
                    let width = text.len() as f64 * font_size * AVG_GLYPH_WIDTH_RATIO;
                    text_ops.push(TextOp {
                        operator: op.name.clone(),
                        text: text.clone(),
                        x: text_matrix[4],
                        y: text_matrix[5],
                        width,
                        height: font_size,
                        font: font.clone(),
                        font_size,
                        color,
                    });
                }
            }
            "TJ" => {
                let Some(Operand::Array(elements)) = op.operands.first() else {
                    continue;
                };
                let mut cursor_x = text_matrix[4];
                for element in elements {
                    match element {
                        Operand::Str(text) => {
                            let width = text.len() as f64 * font_size * AVG_GLYPH_WIDTH_RATIO;
                            text_ops.push(TextOp {
                                operator: op.name.clone(),
                                text: text.clone(),
                                x: cursor_x,
                                y: text_matrix[5],
                                width,
                                height: font_size,
                                font: font.clone(),
                                font_size,
                                color,
                            });
                            cursor_x += width;
                        }
                        Operand::Number(adjustment) => {
                            cursor_x += adjustment * font_size * 0.001;
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    text_ops
}

/// Re-emit operators with matched text substituted
///
/// Every operator is written back verbatim except text-show operators whose
/// string operand matches a replacement key. `TJ` arrays are rewritten
/// element-wise; a `TJ` whose first operand is not an array passes through
/// unmodified.
pub fn rebuild(operators: &[Operator], replacements: &HashMap<String, String>) -> Vec<u8> {
    let mut output = String::new();

    for op in operators {
        match op.name.as_str() {
            "Tj" | "'" | "\"" => {
                let replacement = match op.operands.last() {
                    Some(Operand::Str(text)) => replacements.get(text),
                    _ => None,
                };
                if let Some(replacement) = replacement {
                    for operand in &op.operands[..op.operands.len() - 1] {
                        format_operand(operand, &mut output);
                        output.push(' ');
                    }
                    output.push_str(&format!("({}) ", escape_string(replacement)));
                    output.push_str(&op.name);
                    output.push('\n');
                    continue;
                }
            }
            "TJ" => {
                if let Some(Operand::Array(elements)) = op.operands.first() {
                    let mut rewritten = Vec::with_capacity(elements.len());
                    let mut modified = false;
                    for element in elements {
                        match element {
                            Operand::Str(text) => match replacements.get(text) {
                                Some(replacement) => {
                                    rewritten.push(Operand::Str(replacement.clone()));
                                    modified = true;
                                }
                                None => rewritten.push(element.clone()),
                            },
                            other => rewritten.push(other.clone()),
                        }
                    }
                    if modified {
                        format_operand(&Operand::Array(rewritten), &mut output);
                        output.push(' ');
                        output.push_str(&op.name);
                        output.push('\n');
                        continue;
                    }
                }
            }
            _ => {}
        }

        for operand in &op.operands {
            format_operand(operand, &mut output);
            output.push(' ');
        }
        output.push_str(&op.name);
        output.push('\n');
    }

    output.into_bytes()
}

fn format_operand(operand: &Operand, out: &mut String) {
    match operand {
        Operand::Number(value) => out.push_str(&format_number(*value)),
        Operand::Bool(value) => out.push_str(if *value { "true" } else { "false" }),
        Operand::Name(name) => {
            out.push('/');
            out.push_str(name);
        }
        Operand::Str(text) => {
            out.push('(');
            out.push_str(&escape_string(text));
            out.push(')');
        }
        Operand::Array(elements) => {
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                format_operand(element, out);
            }
            out.push(']');
        }
    }
}

/// Format a number the way content streams expect: no exponent, no
/// trailing fraction on integral values.
pub fn format_number(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e12 {
        format!("{}", value as i64)
    } else {
        let mut text = format!("{value:.4}");
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
        text
    }
}
