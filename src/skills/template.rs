//! Sandboxed template and condition evaluation.
//!
//! Step parameters and conditions may embed `{{ ... }}` expressions over a
//! fixed grammar: comparisons, boolean connectives, membership and string
//! predicates, evaluated against a resolved scope of skill parameters, prior
//! step results (`steps.<id>.result`) and built-in variables. This is not a
//! general-purpose evaluator; anything outside the grammar is a parse error.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use crate::error::TemplateError;

/// Resolved variable scope for one skill execution.
///
/// Lookup paths are dot-separated (`params.service`,
/// `steps.check.result.count`). Bare names fall back to `params.<name>`.
#[derive(Debug, Clone)]
pub struct Scope {
    root: Value,
}

impl Scope {
    /// Build a scope from resolved parameters, prior step results and
    /// built-ins (current timestamp, current user, session id).
    pub fn new(
        params: &HashMap<String, Value>,
        step_results: &HashMap<String, Value>,
        session_id: &str,
        user: &str,
    ) -> Self {
        let mut steps = serde_json::Map::new();
        for (step_id, result) in step_results {
            steps.insert(
                step_id.clone(),
                serde_json::json!({ "result": result.clone() }),
            );
        }

        let root = serde_json::json!({
            "params": Value::Object(params.clone().into_iter().collect()),
            "steps": Value::Object(steps),
            "session_id": session_id,
            "timestamp": Utc::now().to_rfc3339(),
            "user": user,
        });

        Self { root }
    }

    /// Look up a dot-separated path; bare names fall back to `params.<path>`
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        walk(&self.root, path).or_else(|| {
            walk(&self.root, &format!("params.{}", path))
        })
    }
}

fn walk<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Resolve a template string against the scope.
///
/// A string that is exactly one `{{ expr }}` yields the expression's typed
/// value; mixed text yields a string with each expression interpolated.
/// Unresolved variables are an error.
pub fn resolve_template(template: &str, scope: &Scope) -> Result<Value, TemplateError> {
    let trimmed = template.trim();
    if let Some(inner) = single_expression(trimmed) {
        return evaluate(inner, scope);
    }

    let mut out = String::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| TemplateError::Parse {
            message: format!("unterminated '{{{{' in template: {}", template),
        })?;
        out.push_str(&rest[..start]);
        let value = evaluate(&after[..end], scope)?;
        out.push_str(&stringify(&value));
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(Value::String(out))
}

/// Resolve every template expression in a step's parameter map.
///
/// String values are template-resolved; arrays and objects are resolved
/// recursively; other values pass through unchanged.
pub fn resolve_parameters(
    parameters: &HashMap<String, Value>,
    scope: &Scope,
) -> Result<HashMap<String, Value>, TemplateError> {
    let mut resolved = HashMap::with_capacity(parameters.len());
    for (key, value) in parameters {
        resolved.insert(key.clone(), resolve_value(value, scope)?);
    }
    Ok(resolved)
}

fn resolve_value(value: &Value, scope: &Scope) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) => resolve_template(s, scope),
        Value::Array(items) => {
            let resolved: Result<Vec<_>, _> =
                items.iter().map(|v| resolve_value(v, scope)).collect();
            Ok(Value::Array(resolved?))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_value(v, scope)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Evaluate a condition expression to a boolean.
///
/// Accepts either a bare expression or one wrapped in `{{ }}`.
pub fn evaluate_condition(condition: &str, scope: &Scope) -> Result<bool, TemplateError> {
    let trimmed = condition.trim();
    let expr = single_expression(trimmed).unwrap_or(trimmed);
    match evaluate(expr, scope)? {
        Value::Bool(b) => Ok(b),
        _ => Err(TemplateError::NotBoolean {
            expression: condition.to_string(),
        }),
    }
}

/// Returns the inner expression when the whole string is one `{{ expr }}`
fn single_expression(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    // A second opener means mixed text, not a single expression
    if inner.contains("{{") {
        return None;
    }
    Some(inner)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn evaluate(expression: &str, scope: &Scope) -> Result<Value, TemplateError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        scope,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(TemplateError::Parse {
            message: format!("unexpected trailing input in '{}'", expression.trim()),
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    True,
    False,
    Null,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    In,
    Contains,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(TemplateError::Parse {
                        message: format!("unterminated string in '{}'", input.trim()),
                    });
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            '-' | '0'..='9' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text.parse::<f64>().map_err(|_| TemplateError::Parse {
                    message: format!("invalid number '{}'", text),
                })?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "in" => Token::In,
                    "contains" => Token::Contains,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(TemplateError::Parse {
                    message: format!("unexpected character '{}' in '{}'", other, input.trim()),
                });
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    scope: &'a Scope,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Value, TemplateError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Value::Bool(as_bool(&left)? || as_bool(&right)?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, TemplateError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Value::Bool(as_bool(&left)? && as_bool(&right)?);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Value, TemplateError> {
        if self.peek() == Some(&Token::Not) {
            self.advance();
            let value = self.parse_unary()?;
            return Ok(Value::Bool(!as_bool(&value)?));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Value, TemplateError> {
        let left = self.parse_term()?;
        let op = match self.peek() {
            Some(
                t @ (Token::Eq
                | Token::Ne
                | Token::Lt
                | Token::Le
                | Token::Gt
                | Token::Ge
                | Token::In
                | Token::Contains),
            ) => t.clone(),
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_term()?;
        compare(&op, &left, &right)
    }

    fn parse_term(&mut self) -> Result<Value, TemplateError> {
        match self.advance() {
            Some(Token::Number(n)) => {
                Ok(serde_json::Number::from_f64(n)
                    .map(Value::Number)
                    .unwrap_or(Value::Null))
            }
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::Null) => Ok(Value::Null),
            Some(Token::Ident(path)) => self
                .scope
                .lookup(&path)
                .cloned()
                .ok_or(TemplateError::UnresolvedVariable { name: path }),
            Some(Token::LParen) => {
                let value = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(TemplateError::Parse {
                        message: "expected ')'".to_string(),
                    }),
                }
            }
            other => Err(TemplateError::Parse {
                message: format!("unexpected token: {:?}", other),
            }),
        }
    }
}

fn as_bool(value: &Value) -> Result<bool, TemplateError> {
    value.as_bool().ok_or_else(|| TemplateError::Type {
        message: format!("expected boolean, got {}", type_name(value)),
    })
}

fn as_number(value: &Value) -> Result<f64, TemplateError> {
    value.as_f64().ok_or_else(|| TemplateError::Type {
        message: format!("expected number, got {}", type_name(value)),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Equality that treats 2 and 2.0 as the same number; literals always
/// tokenize as floats, scope values are often integers.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) if left.is_number() && right.is_number() => a == b,
        _ => left == right,
    }
}

fn compare(op: &Token, left: &Value, right: &Value) -> Result<Value, TemplateError> {
    let result = match op {
        Token::Eq => values_equal(left, right),
        Token::Ne => !values_equal(left, right),
        Token::Lt => as_number(left)? < as_number(right)?,
        Token::Le => as_number(left)? <= as_number(right)?,
        Token::Gt => as_number(left)? > as_number(right)?,
        Token::Ge => as_number(left)? >= as_number(right)?,
        Token::In => membership(left, right)?,
        Token::Contains => membership(right, left)?,
        _ => {
            return Err(TemplateError::Parse {
                message: "invalid comparison operator".to_string(),
            })
        }
    };
    Ok(Value::Bool(result))
}

/// `needle in haystack`: array membership or substring
fn membership(needle: &Value, haystack: &Value) -> Result<bool, TemplateError> {
    match haystack {
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, needle))),
        Value::String(s) => match needle {
            Value::String(n) => Ok(s.contains(n.as_str())),
            other => Err(TemplateError::Type {
                message: format!(
                    "substring test requires a string, got {}",
                    type_name(other)
                ),
            }),
        },
        other => Err(TemplateError::Type {
            message: format!(
                "membership requires an array or string, got {}",
                type_name(other)
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Scope {
        Scope::new(
            &HashMap::from([
                ("service".to_string(), json!("checkout")),
                ("current_count".to_string(), json!(2)),
                ("target_count".to_string(), json!(5)),
                ("dry_run".to_string(), json!(false)),
                ("regions".to_string(), json!(["us-east-1", "eu-west-1"])),
            ]),
            &HashMap::from([(
                "check".to_string(),
                json!({"status": "ok", "replicas": 2, "message": "2 of 5 ready"}),
            )]),
            "sess-42",
            "oncall",
        )
    }

    // ============================================================================
    // Scope Lookup Tests
    // ============================================================================

    #[test]
    fn test_lookup_param_with_prefix() {
        let s = scope();
        assert_eq!(s.lookup("params.service"), Some(&json!("checkout")));
    }

    #[test]
    fn test_lookup_bare_name_falls_back_to_params() {
        let s = scope();
        assert_eq!(s.lookup("service"), Some(&json!("checkout")));
    }

    #[test]
    fn test_lookup_step_result_path() {
        let s = scope();
        assert_eq!(s.lookup("steps.check.result.replicas"), Some(&json!(2)));
    }

    #[test]
    fn test_lookup_builtins() {
        let s = scope();
        assert_eq!(s.lookup("session_id"), Some(&json!("sess-42")));
        assert_eq!(s.lookup("user"), Some(&json!("oncall")));
        assert!(s.lookup("timestamp").is_some());
    }

    #[test]
    fn test_lookup_missing() {
        let s = scope();
        assert!(s.lookup("nope").is_none());
        assert!(s.lookup("steps.missing.result").is_none());
    }

    // ============================================================================
    // Template Resolution Tests
    // ============================================================================

    #[test]
    fn test_resolve_single_expression_keeps_type() {
        let s = scope();
        assert_eq!(resolve_template("{{ target_count }}", &s).unwrap(), json!(5));
        assert_eq!(resolve_template("{{ dry_run }}", &s).unwrap(), json!(false));
    }

    #[test]
    fn test_resolve_interpolation_produces_string() {
        let s = scope();
        let value =
            resolve_template("scale {{ service }} to {{ target_count }} replicas", &s).unwrap();
        assert_eq!(value, json!("scale checkout to 5 replicas"));
    }

    #[test]
    fn test_resolve_plain_string_passthrough() {
        let s = scope();
        assert_eq!(
            resolve_template("no templates here", &s).unwrap(),
            json!("no templates here")
        );
    }

    #[test]
    fn test_resolve_unresolved_variable_fails() {
        let s = scope();
        let err = resolve_template("{{ missing_var }}", &s).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedVariable { .. }));
    }

    #[test]
    fn test_resolve_unterminated_template_fails() {
        let s = scope();
        let err = resolve_template("oops {{ service", &s).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_resolve_parameters_recurses() {
        let s = scope();
        let params = HashMap::from([
            ("svc".to_string(), json!("{{ service }}")),
            ("count".to_string(), json!("{{ target_count }}")),
            ("fixed".to_string(), json!(7)),
            (
                "nested".to_string(),
                json!({"name": "{{ service }}", "list": ["{{ user }}"]}),
            ),
        ]);

        let resolved = resolve_parameters(&params, &s).unwrap();
        assert_eq!(resolved["svc"], json!("checkout"));
        assert_eq!(resolved["count"], json!(5));
        assert_eq!(resolved["fixed"], json!(7));
        assert_eq!(resolved["nested"]["name"], json!("checkout"));
        assert_eq!(resolved["nested"]["list"][0], json!("oncall"));
    }

    // ============================================================================
    // Condition Evaluation Tests
    // ============================================================================

    #[test]
    fn test_condition_comparison() {
        let s = scope();
        assert!(evaluate_condition("{{ current_count < target_count }}", &s).unwrap());
        assert!(!evaluate_condition("{{ current_count >= target_count }}", &s).unwrap());
        assert!(evaluate_condition("current_count == 2", &s).unwrap());
        assert!(evaluate_condition("current_count != 3", &s).unwrap());
    }

    #[test]
    fn test_condition_string_equality() {
        let s = scope();
        assert!(evaluate_condition("service == 'checkout'", &s).unwrap());
        assert!(evaluate_condition("steps.check.result.status == 'ok'", &s).unwrap());
    }

    #[test]
    fn test_condition_boolean_connectives() {
        let s = scope();
        assert!(
            evaluate_condition("current_count < target_count && service == 'checkout'", &s)
                .unwrap()
        );
        assert!(evaluate_condition("dry_run || current_count < 3", &s).unwrap());
        assert!(evaluate_condition("!dry_run", &s).unwrap());
    }

    #[test]
    fn test_condition_membership() {
        let s = scope();
        assert!(evaluate_condition("'us-east-1' in regions", &s).unwrap());
        assert!(!evaluate_condition("'ap-south-1' in regions", &s).unwrap());
        assert!(evaluate_condition("regions contains 'eu-west-1'", &s).unwrap());
    }

    #[test]
    fn test_condition_string_predicates() {
        let s = scope();
        assert!(evaluate_condition("'ready' in steps.check.result.message", &s).unwrap());
        assert!(
            evaluate_condition("steps.check.result.message contains '2 of 5'", &s).unwrap()
        );
    }

    #[test]
    fn test_condition_parentheses() {
        let s = scope();
        assert!(
            evaluate_condition("(dry_run || current_count < 3) && target_count == 5", &s)
                .unwrap()
        );
    }

    #[test]
    fn test_condition_not_boolean_fails() {
        let s = scope();
        let err = evaluate_condition("{{ service }}", &s).unwrap_err();
        assert!(matches!(err, TemplateError::NotBoolean { .. }));
    }

    #[test]
    fn test_condition_type_error_on_ordering_strings() {
        let s = scope();
        let err = evaluate_condition("service < 3", &s).unwrap_err();
        assert!(matches!(err, TemplateError::Type { .. }));
    }

    #[test]
    fn test_condition_unresolved_variable_fails() {
        let s = scope();
        let err = evaluate_condition("{{ missing < 3 }}", &s).unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedVariable { .. }));
    }

    #[test]
    fn test_condition_parse_error_on_garbage() {
        let s = scope();
        let err = evaluate_condition("{{ service @ 3 }}", &s).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_condition_trailing_input_fails() {
        let s = scope();
        let err = evaluate_condition("current_count < 3 service", &s).unwrap_err();
        assert!(matches!(err, TemplateError::Parse { .. }));
    }

    #[test]
    fn test_no_code_evaluation_possible() {
        // The grammar has no call syntax, assignment, or access to anything
        // outside the scope; these all fail to parse.
        let s = scope();
        assert!(evaluate_condition("std::process::exit(1)", &s).is_err());
        assert!(evaluate_condition("service = 'x'", &s).is_err());
    }
}
