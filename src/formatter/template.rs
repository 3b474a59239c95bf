//! Go-style text templates evaluated against JSON values
//!
//! Supported: `{{.Field.Sub}}`, `{{.}}`, string/number/bool literals,
//! function calls, pipes (`{{.Name | upper}}`), parenthesised
//! sub-pipelines, `{{if}}`/`{{else}}`/`{{end}}`, `{{range}}` and the
//! `{{-`/`-}}` whitespace trim markers.

use crate::{CliError, Result};
use serde_json::Value;
use std::fmt::Write as _;

/// Printed for map keys that do not exist
pub const NO_VALUE: &str = "<no value>";

#[derive(Debug, Clone, PartialEq)]
enum Arg {
    /// `.A.B`; an empty path is the dot itself
    Field(Vec<String>),
    Str(String),
    Int(i64),
    Bool(bool),
    Func(String),
    Sub(Pipeline),
}

#[derive(Debug, Clone, PartialEq)]
struct Command {
    args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
struct Pipeline {
    commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Action(Pipeline),
    If {
        cond: Pipeline,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
    Range {
        over: Pipeline,
        body: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// A parsed template
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

const FUNCS: &[&str] = &[
    "json", "split", "join", "lower", "upper", "title", "pad", "truncate", "println", "index",
    "len",
];

fn parse_error(msg: impl Into<String>) -> CliError {
    CliError::Template(msg.into())
}

enum Piece {
    Text(String),
    Action(String),
}

/// Split the source into text and action bodies, applying trim markers.
fn split_actions(src: &str) -> Result<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut rest = src;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }
        let after = &rest[start + 2..];
        let trim_prev = after.starts_with("- ") || after.starts_with("-\t") || after.starts_with("-\n");
        if trim_prev {
            text = text.trim_end();
        }
        if !text.is_empty() {
            pieces.push(Piece::Text(text.to_string()));
        }

        let body_start = if trim_prev { 1 } else { 0 };
        let end = find_close(&after[body_start..])
            .ok_or_else(|| parse_error("unclosed action"))?;
        let mut body = &after[body_start..body_start + end];
        trim_next = false;
        if body.ends_with(" -") || body.ends_with("\t-") || body.ends_with("\n-") {
            body = &body[..body.len() - 1];
            trim_next = true;
        }
        pieces.push(Piece::Action(body.trim().to_string()));
        rest = &after[body_start + end + 2..];
    }

    let text = if trim_next { rest.trim_start() } else { rest };
    if !text.is_empty() {
        pieces.push(Piece::Text(text.to_string()));
    }
    Ok(pieces)
}

/// Offset of the closing `}}`, skipping string literals.
fn find_close(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q == b'"' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => {
                if b == b'"' || b == b'`' {
                    quote = Some(b);
                } else if b == b'}' && bytes.get(i + 1) == Some(&b'}') {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Open,
    Close,
    Pipe,
}

fn tokenize(action: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = action.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '"' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(parse_error("unterminated quoted string")),
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(other) => s.push(other),
                            None => return Err(parse_error("unterminated quoted string")),
                        },
                        Some(other) => s.push(other),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '`' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(parse_error("unterminated raw quoted string")),
                        Some('`') => break,
                        Some(other) => s.push(other),
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '|' | '"' | '`') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Ok(tokens)
}

struct PipelineParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl PipelineParser {
    fn parse(action: &str) -> Result<Pipeline> {
        let mut parser = Self {
            tokens: tokenize(action)?,
            pos: 0,
        };
        let pipeline = parser.pipeline()?;
        if parser.pos != parser.tokens.len() {
            return Err(parse_error(format!("unexpected {:?} in command", parser.tokens[parser.pos])));
        }
        Ok(pipeline)
    }

    fn pipeline(&mut self) -> Result<Pipeline> {
        let mut commands = vec![self.command()?];
        while self.tokens.get(self.pos) == Some(&Token::Pipe) {
            self.pos += 1;
            commands.push(self.command()?);
        }
        Ok(Pipeline { commands })
    }

    fn command(&mut self) -> Result<Command> {
        let mut args = Vec::new();
        while let Some(token) = self.tokens.get(self.pos).cloned() {
            match token {
                Token::Pipe | Token::Close => break,
                Token::Open => {
                    self.pos += 1;
                    let sub = self.pipeline()?;
                    if self.tokens.get(self.pos) != Some(&Token::Close) {
                        return Err(parse_error("unclosed left paren"));
                    }
                    self.pos += 1;
                    args.push(Arg::Sub(sub));
                }
                Token::Str(s) => {
                    self.pos += 1;
                    args.push(Arg::Str(s));
                }
                Token::Word(word) => {
                    self.pos += 1;
                    args.push(parse_word(&word)?);
                }
            }
        }
        if args.is_empty() {
            return Err(parse_error("missing value for command"));
        }
        Ok(Command { args })
    }
}

fn parse_word(word: &str) -> Result<Arg> {
    if word == "." {
        return Ok(Arg::Field(Vec::new()));
    }
    if let Some(path) = word.strip_prefix('.') {
        let parts: Vec<String> = path.split('.').map(str::to_string).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(parse_error(format!("bad field name {:?}", word)));
        }
        return Ok(Arg::Field(parts));
    }
    match word {
        "true" => return Ok(Arg::Bool(true)),
        "false" => return Ok(Arg::Bool(false)),
        _ => {}
    }
    if let Ok(n) = word.parse::<i64>() {
        return Ok(Arg::Int(n));
    }
    if FUNCS.contains(&word) {
        return Ok(Arg::Func(word.to_string()));
    }
    Err(parse_error(format!("function {:?} not defined", word)))
}

impl Template {
    pub fn parse(src: &str) -> Result<Self> {
        let pieces = split_actions(src)?;
        let mut iter = pieces.into_iter();
        let (nodes, end) = parse_list(&mut iter)?;
        match end {
            None => Ok(Self { nodes }),
            Some(keyword) => Err(parse_error(format!("unexpected {{{{{}}}}}", keyword))),
        }
    }

    /// Render against `data`.
    pub fn execute(&self, data: &Value) -> Result<String> {
        let mut out = String::new();
        exec_nodes(&self.nodes, data, &mut out)?;
        Ok(out)
    }
}

/// Parse nodes until `{{else}}`/`{{end}}` (returned) or the end of input.
fn parse_list(iter: &mut impl Iterator<Item = Piece>) -> Result<(Vec<Node>, Option<String>)> {
    let mut nodes = Vec::new();
    while let Some(piece) = iter.next() {
        let action = match piece {
            Piece::Text(text) => {
                nodes.push(Node::Text(text));
                continue;
            }
            Piece::Action(action) => action,
        };
        if action.starts_with("/*") {
            continue;
        }
        let (keyword, rest) = match action.split_once(char::is_whitespace) {
            Some((k, r)) => (k, r.trim()),
            None => (action.as_str(), ""),
        };
        match keyword {
            "end" | "else" => return Ok((nodes, Some(keyword.to_string()))),
            "if" | "range" => {
                if rest.is_empty() {
                    return Err(parse_error(format!("missing value for {}", keyword)));
                }
                let pipeline = PipelineParser::parse(rest)?;
                let (body, end) = parse_list(iter)?;
                let otherwise = match end.as_deref() {
                    Some("end") => Vec::new(),
                    Some("else") => match parse_list(iter)? {
                        (nodes, Some(end)) if end == "end" => nodes,
                        _ => return Err(parse_error(format!("missing {{{{end}}}} for {}", keyword))),
                    },
                    _ => return Err(parse_error(format!("missing {{{{end}}}} for {}", keyword))),
                };
                nodes.push(if keyword == "if" {
                    Node::If {
                        cond: pipeline,
                        then: body,
                        otherwise,
                    }
                } else {
                    Node::Range {
                        over: pipeline,
                        body,
                        otherwise,
                    }
                });
            }
            _ => nodes.push(Node::Action(PipelineParser::parse(&action)?)),
        }
    }
    Ok((nodes, None))
}

fn exec_nodes(nodes: &[Node], dot: &Value, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action(pipeline) => {
                let value = eval_pipeline(pipeline, dot)?;
                print_value(&value, out);
            }
            Node::If {
                cond,
                then,
                otherwise,
            } => {
                if truthy(&eval_pipeline(cond, dot)?) {
                    exec_nodes(then, dot, out)?;
                } else {
                    exec_nodes(otherwise, dot, out)?;
                }
            }
            Node::Range {
                over,
                body,
                otherwise,
            } => {
                let items: Vec<Value> = match eval_pipeline(over, dot)? {
                    Value::Array(items) => items,
                    Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
                    Value::Null => Vec::new(),
                    other => {
                        return Err(CliError::Template(format!(
                            "range can't iterate over {}",
                            display(&other)
                        )))
                    }
                };
                if items.is_empty() {
                    exec_nodes(otherwise, dot, out)?;
                }
                for item in &items {
                    exec_nodes(body, item, out)?;
                }
            }
        }
    }
    Ok(())
}

fn eval_pipeline(pipeline: &Pipeline, dot: &Value) -> Result<Value> {
    let mut piped: Option<Value> = None;
    for command in &pipeline.commands {
        piped = Some(eval_command(command, dot, piped.take())?);
    }
    Ok(piped.unwrap_or(Value::Null))
}

fn eval_command(command: &Command, dot: &Value, piped: Option<Value>) -> Result<Value> {
    let (first, rest) = command
        .args
        .split_first()
        .ok_or_else(|| parse_error("empty command"))?;
    if let Arg::Func(name) = first {
        let mut args = rest
            .iter()
            .map(|a| eval_arg(a, dot))
            .collect::<Result<Vec<_>>>()?;
        args.extend(piped);
        return call(name, &args);
    }
    if !rest.is_empty() || piped.is_some() {
        return Err(CliError::Template(format!(
            "can't give argument to non-function {}",
            describe(first)
        )));
    }
    eval_arg(first, dot)
}

fn describe(arg: &Arg) -> String {
    match arg {
        Arg::Field(path) => format!(".{}", path.join(".")),
        Arg::Str(s) => format!("{:?}", s),
        Arg::Int(n) => n.to_string(),
        Arg::Bool(b) => b.to_string(),
        Arg::Func(f) => f.clone(),
        Arg::Sub(_) => "(...)".to_string(),
    }
}

fn eval_arg(arg: &Arg, dot: &Value) -> Result<Value> {
    match arg {
        Arg::Field(path) => lookup(dot, path),
        Arg::Str(s) => Ok(Value::String(s.clone())),
        Arg::Int(n) => Ok(Value::from(*n)),
        Arg::Bool(b) => Ok(Value::Bool(*b)),
        Arg::Func(name) => call(name, &[]),
        Arg::Sub(pipeline) => eval_pipeline(pipeline, dot),
    }
}

fn lookup(dot: &Value, path: &[String]) -> Result<Value> {
    let mut current = dot;
    for (i, key) in path.iter().enumerate() {
        match current {
            Value::Object(map) => match map.get(key) {
                Some(v) => current = v,
                None if i + 1 == path.len() => return Ok(Value::Null),
                None => {
                    return Err(CliError::Template(format!(
                        "nil pointer evaluating .{}",
                        path[..=i].join(".")
                    )))
                }
            },
            Value::Null => {
                return Err(CliError::Template(format!(
                    "nil pointer evaluating .{}",
                    path[..=i].join(".")
                )))
            }
            other => {
                return Err(CliError::Template(format!(
                    "can't evaluate field {} in type {}",
                    key,
                    type_name(other)
                )))
            }
        }
    }
    Ok(current.clone())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// Go `%v`-style rendering
pub fn display(value: &Value) -> String {
    let mut out = String::new();
    print_value(value, &mut out);
    out
}

fn print_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str(NO_VALUE),
        Value::Bool(b) => {
            let _ = write!(out, "{}", b);
        }
        Value::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                print_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push_str("map[");
            for (i, (k, v)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(k);
                out.push(':');
                print_value(v, out);
            }
            out.push(']');
        }
    }
}

fn as_str<'a>(name: &str, value: &'a Value) -> Result<std::borrow::Cow<'a, str>> {
    match value {
        Value::String(s) => Ok(std::borrow::Cow::Borrowed(s)),
        Value::Number(_) | Value::Bool(_) => Ok(std::borrow::Cow::Owned(display(value))),
        other => Err(CliError::Template(format!(
            "{}: expected string, got {}",
            name,
            type_name(other)
        ))),
    }
}

fn as_int(name: &str, value: &Value) -> Result<usize> {
    value
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| CliError::Template(format!("{}: expected non-negative integer", name)))
}

fn arity(name: &str, args: &[Value], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(CliError::Template(format!(
            "wrong number of args for {}: want {} got {}",
            name,
            n,
            args.len()
        )));
    }
    Ok(())
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        start = !c.is_alphanumeric();
    }
    out
}

fn call(name: &str, args: &[Value]) -> Result<Value> {
    match name {
        "json" => {
            arity(name, args, 1)?;
            Ok(Value::String(serde_json::to_string(&args[0])?))
        }
        "split" => {
            arity(name, args, 2)?;
            let s = as_str(name, &args[0])?;
            let sep = as_str(name, &args[1])?;
            Ok(Value::Array(
                s.split(sep.as_ref())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            arity(name, args, 2)?;
            let sep = as_str(name, &args[1])?;
            let parts: Vec<String> = match &args[0] {
                Value::Array(items) => items.iter().map(display).collect(),
                Value::Null => Vec::new(),
                other => vec![display(other)],
            };
            Ok(Value::String(parts.join(&sep)))
        }
        "lower" => {
            arity(name, args, 1)?;
            Ok(Value::String(as_str(name, &args[0])?.to_lowercase()))
        }
        "upper" => {
            arity(name, args, 1)?;
            Ok(Value::String(as_str(name, &args[0])?.to_uppercase()))
        }
        "title" => {
            arity(name, args, 1)?;
            Ok(Value::String(title_case(&as_str(name, &args[0])?)))
        }
        "pad" => {
            arity(name, args, 3)?;
            let s = display(&args[0]);
            let before = as_int(name, &args[1])?;
            let after = as_int(name, &args[2])?;
            Ok(Value::String(format!(
                "{}{}{}",
                " ".repeat(before),
                s,
                " ".repeat(after)
            )))
        }
        "truncate" => {
            arity(name, args, 2)?;
            let s = display(&args[0]);
            let n = as_int(name, &args[1])?;
            Ok(Value::String(s.chars().take(n).collect()))
        }
        "println" => {
            let parts: Vec<String> = args.iter().map(display).collect();
            Ok(Value::String(format!("{}\n", parts.join(" "))))
        }
        "len" => {
            arity(name, args, 1)?;
            let n = match &args[0] {
                Value::Array(a) => a.len(),
                Value::Object(m) => m.len(),
                Value::String(s) => s.len(),
                other => {
                    return Err(CliError::Template(format!(
                        "len of type {}",
                        type_name(other)
                    )))
                }
            };
            Ok(Value::from(n as u64))
        }
        "index" => {
            let (target, keys) = args
                .split_first()
                .ok_or_else(|| CliError::Template("index of nothing".to_string()))?;
            let mut current = target.clone();
            for key in keys {
                current = match (&current, key) {
                    (Value::Object(map), Value::String(k)) => {
                        map.get(k).cloned().unwrap_or(Value::Null)
                    }
                    (Value::Array(items), k) => {
                        let i = as_int(name, k)?;
                        items.get(i).cloned().ok_or_else(|| {
                            CliError::Template(format!("index out of range: {}", i))
                        })?
                    }
                    (Value::Null, _) => Value::Null,
                    (other, _) => {
                        return Err(CliError::Template(format!(
                            "can't index item of type {}",
                            type_name(other)
                        )))
                    }
                };
            }
            Ok(current)
        }
        other => Err(CliError::Template(format!("function {:?} not defined", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(src: &str, data: Value) -> String {
        Template::parse(src).unwrap().execute(&data).unwrap()
    }

    #[test]
    fn test_fields_and_text() {
        let data = json!({"ID": "abc", "Config": {"Image": "nginx"}});
        assert_eq!(render("id={{.ID}} image={{.Config.Image}}", data.clone()), "id=abc image=nginx");
        assert_eq!(render("{{.Missing}}", data), NO_VALUE);
    }

    #[test]
    fn test_functions_and_pipes() {
        let data = json!({"Names": ["a", "b"], "Name": "Web", "Labels": {"k": "v"}});
        assert_eq!(render(r#"{{join .Names ","}}"#, data.clone()), "a,b");
        assert_eq!(render("{{.Name | lower}}", data.clone()), "web");
        assert_eq!(render("{{upper .Name}}", data.clone()), "WEB");
        assert_eq!(render("{{json .Labels}}", data.clone()), r#"{"k":"v"}"#);
        assert_eq!(render(r#"{{index .Labels "k"}}"#, data.clone()), "v");
        assert_eq!(render("{{pad .Name 1 2}}|", data.clone()), " Web  |");
        assert_eq!(render("{{truncate .Name 2}}", data.clone()), "We");
        assert_eq!(render(r#"{{split "a:b" ":"}}"#, data.clone()), "[a b]");
        assert_eq!(render(r#"{{title "hello world"}}"#, data.clone()), "Hello World");
        assert_eq!(render("{{len .Names}}", data.clone()), "2");
        assert_eq!(render(r#"{{(index .Names 1) | upper}}"#, data), "B");
    }

    #[test]
    fn test_if_and_range() {
        let data = json!({"Ports": [{"P": 80}, {"P": 443}], "Tty": false});
        assert_eq!(
            render("{{range .Ports}}{{.P}} {{end}}", data.clone()),
            "80 443 "
        );
        assert_eq!(
            render("{{if .Tty}}tty{{else}}no tty{{end}}", data.clone()),
            "no tty"
        );
        assert_eq!(render("{{range .None}}x{{else}}empty{{end}}", data), "empty");
    }

    #[test]
    fn test_trim_markers() {
        let data = json!({"A": "1"});
        assert_eq!(render("a  {{- .A -}}  b", data), "a1b");
    }

    #[test]
    fn test_parse_errors_are_template_errors() {
        for bad in ["{{.ID", "{{nosuchfunc .}}", "{{if .A}}x", "{{end}}", "{{\"open}}"] {
            let err = Template::parse(bad).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Template, "{}", bad);
            assert_eq!(err.exit_code(), 64);
        }
    }

    #[test]
    fn test_execution_errors() {
        let t = Template::parse("{{.Name.First}}").unwrap();
        let err = t.execute(&json!({"Name": "x"})).unwrap_err();
        assert!(err.to_string().contains("can't evaluate field First"));
        assert_eq!(err.kind(), crate::ErrorKind::Template);
    }
}
