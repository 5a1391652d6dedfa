use std::{collections::HashMap, sync::Arc, sync::OnceLock};

use regex::Regex;
use serde_json::Value;

use super::{PromptArgs, PromptError};

/// A value transformation applied with `{{ value | name }}`.
pub type Filter = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| {
        Regex::new(r"(?s)\{\{(-?)(.*?)(-?)\}\}|\{%(-?)(.*?)(-?)%\}|\{#.*?#\}")
            .expect("Invalid tag regex")
    })
}

fn path_regex() -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    PATH.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").expect("Invalid path regex")
    })
}

fn ident_regex() -> &'static Regex {
    static IDENT: OnceLock<Regex> = OnceLock::new();
    IDENT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid ident regex"))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text(String),
    Expr(String),
    Block(String),
}

/// Dotted lookup such as `result.title` or `results.0`.
#[derive(Debug, Clone, PartialEq)]
struct VarPath {
    raw: String,
    segments: Vec<String>,
}

impl VarPath {
    fn parse(raw: &str, template: &str) -> Result<Self, PromptError> {
        let raw = raw.trim();
        if !path_regex().is_match(raw) {
            return Err(PromptError::render(
                template,
                format!("invalid variable reference `{}`", raw),
            ));
        }
        Ok(Self {
            raw: raw.to_string(),
            segments: raw.split('.').map(str::to_string).collect(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Expression {
    path: VarPath,
    filters: Vec<String>,
}

impl Expression {
    fn parse(source: &str, template: &str) -> Result<Self, PromptError> {
        let mut parts = source.split('|');
        let path = VarPath::parse(parts.next().unwrap_or_default(), template)?;
        let filters = parts
            .map(|f| {
                let f = f.trim();
                if ident_regex().is_match(f) {
                    Ok(f.to_string())
                } else {
                    Err(PromptError::render(
                        template,
                        format!("invalid filter `{}` in `{{{{{}}}}}`", f, source),
                    ))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { path, filters })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Expr(Expression),
    For {
        var: String,
        iterable: VarPath,
        body: Vec<Node>,
    },
    If {
        condition: VarPath,
        then: Vec<Node>,
        otherwise: Vec<Node>,
    },
}

/// A parsed template, ready to be rendered against any number of contexts.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(name: &str, source: &str) -> Result<Self, PromptError> {
        let tokens = tokenize(source);
        let mut tokens = tokens.into_iter();
        let (nodes, _) = parse_nodes(&mut tokens, name, &[])?;
        Ok(Self {
            name: name.to_string(),
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(
        &self,
        context: &PromptArgs,
        filters: &HashMap<String, Filter>,
    ) -> Result<String, PromptError> {
        let mut renderer = NodeRenderer {
            template: &self.name,
            context,
            filters,
            scopes: Vec::new(),
        };
        let mut out = String::new();
        renderer.render_nodes(&self.nodes, &mut out)?;
        Ok(out)
    }
}

/// Whether an optional `-` marker was present.
fn flag(m: Option<regex::Match<'_>>) -> bool {
    m.map_or(false, |m| !m.as_str().is_empty())
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;
    let mut trim_next = false;

    let push_text = |tokens: &mut Vec<Token>, text: &str, trim_start: bool| {
        let text = if trim_start { text.trim_start() } else { text };
        if !text.is_empty() {
            tokens.push(Token::Text(text.to_string()));
        }
    };

    for caps in tag_regex().captures_iter(source) {
        let Some(whole) = caps.get(0) else { continue };
        let trim_before = flag(caps.get(1)) || flag(caps.get(4));
        let text = &source[last..whole.start()];
        if trim_before {
            push_text(&mut tokens, text.trim_end(), trim_next);
        } else {
            push_text(&mut tokens, text, trim_next);
        }

        if let Some(expr) = caps.get(2) {
            tokens.push(Token::Expr(expr.as_str().trim().to_string()));
            trim_next = flag(caps.get(3));
        } else if let Some(block) = caps.get(5) {
            tokens.push(Token::Block(block.as_str().trim().to_string()));
            trim_next = flag(caps.get(6));
        } else {
            trim_next = false;
        }
        last = whole.end();
    }
    push_text(&mut tokens, &source[last..], trim_next);
    tokens
}

fn parse_nodes(
    tokens: &mut std::vec::IntoIter<Token>,
    template: &str,
    until: &[&str],
) -> Result<(Vec<Node>, Option<String>), PromptError> {
    let mut nodes = Vec::new();

    while let Some(token) = tokens.next() {
        match token {
            Token::Text(text) => nodes.push(Node::Text(text)),
            Token::Expr(expr) => nodes.push(Node::Expr(Expression::parse(&expr, template)?)),
            Token::Block(block) => {
                let words: Vec<&str> = block.split_whitespace().collect();
                let keyword = words.first().copied().unwrap_or_default();
                if until.contains(&keyword) {
                    if words.len() > 1 {
                        return Err(PromptError::render(
                            template,
                            format!("unexpected arguments in `{{% {} %}}`", block),
                        ));
                    }
                    return Ok((nodes, Some(keyword.to_string())));
                }

                match (keyword, words.as_slice()) {
                    ("for", [_, var, "in", iterable]) => {
                        if !ident_regex().is_match(var) {
                            return Err(PromptError::render(
                                template,
                                format!("invalid loop variable `{}`", var),
                            ));
                        }
                        let iterable = VarPath::parse(iterable, template)?;
                        let (body, end) = parse_nodes(tokens, template, &["endfor"])?;
                        if end.is_none() {
                            return Err(PromptError::render(
                                template,
                                format!("`{{% {} %}}` is never closed", block),
                            ));
                        }
                        nodes.push(Node::For {
                            var: var.to_string(),
                            iterable,
                            body,
                        });
                    }
                    ("if", [_, condition]) => {
                        let condition = VarPath::parse(condition, template)?;
                        let (then, end) = parse_nodes(tokens, template, &["else", "endif"])?;
                        let otherwise = match end.as_deref() {
                            Some("endif") => Vec::new(),
                            Some(_) => {
                                let (otherwise, end) = parse_nodes(tokens, template, &["endif"])?;
                                if end.is_none() {
                                    return Err(PromptError::render(
                                        template,
                                        format!("`{{% {} %}}` is never closed", block),
                                    ));
                                }
                                otherwise
                            }
                            None => {
                                return Err(PromptError::render(
                                    template,
                                    format!("`{{% {} %}}` is never closed", block),
                                ))
                            }
                        };
                        nodes.push(Node::If {
                            condition,
                            then,
                            otherwise,
                        });
                    }
                    _ => {
                        return Err(PromptError::render(
                            template,
                            format!("unexpected block `{{% {} %}}`", block),
                        ))
                    }
                }
            }
        }
    }

    Ok((nodes, None))
}

struct NodeRenderer<'a> {
    template: &'a str,
    context: &'a PromptArgs,
    filters: &'a HashMap<String, Filter>,
    scopes: Vec<(String, Value)>,
}

impl<'a> NodeRenderer<'a> {
    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> Result<(), PromptError> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Expr(expr) => {
                    let mut value = self.lookup(&expr.path)?;
                    for name in &expr.filters {
                        let filter = self.filters.get(name).ok_or_else(|| {
                            PromptError::render(self.template, format!("unknown filter `{}`", name))
                        })?;
                        value = filter(&value);
                    }
                    out.push_str(&display_value(&value));
                }
                Node::For {
                    var,
                    iterable,
                    body,
                } => {
                    let items = match self.lookup(iterable)? {
                        Value::Array(items) => items,
                        other => {
                            return Err(PromptError::render(
                                self.template,
                                format!(
                                    "`{}` is not a list (found {})",
                                    iterable.raw,
                                    value_kind(&other)
                                ),
                            ))
                        }
                    };
                    for item in items {
                        self.scopes.push((var.clone(), item));
                        let rendered = self.render_nodes(body, out);
                        self.scopes.pop();
                        rendered?;
                    }
                }
                Node::If {
                    condition,
                    then,
                    otherwise,
                } => {
                    let truthy = self.resolve(condition).map_or(false, is_truthy);
                    if truthy {
                        self.render_nodes(then, out)?;
                    } else {
                        self.render_nodes(otherwise, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve(&self, path: &VarPath) -> Option<&Value> {
        let (first, rest) = path.segments.split_first()?;
        let root = self
            .scopes
            .iter()
            .rev()
            .find(|(name, _)| name == first)
            .map(|(_, value)| value)
            .or_else(|| self.context.get(first))?;

        rest.iter().try_fold(root, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    fn lookup(&self, path: &VarPath) -> Result<Value, PromptError> {
        self.resolve(path).cloned().ok_or_else(|| {
            PromptError::render(self.template, format!("undefined variable `{}`", path.raw))
        })
    }
}

/// String form of a context value as it appears in a rendered prompt.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
