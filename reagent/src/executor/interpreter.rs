//! The code-action interpreter.
//!
//! Code actions use a small tool-call language: one expression per line,
//! `name(arg: value, ...)` calls routed through the tool registry,
//! `x = name(...)` assignment into sandbox variables, `print(...)` capture
//! into logs, and a `final_answer(...)` primitive that raises the
//! final-answer signal. Values are JSON literals or variable references;
//! there are no loops or branches, so the operation budget charges one
//! unit per statement and one per call.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::event::EventBus;
use crate::tool::ToolRegistry;

static ASSIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]\w*)\s*=\s*([^=].*)$").expect("valid regex"));
static NAMED_ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]\w*)\s*:\s*(.+)$").expect("valid regex"));
static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("valid regex"));

/// How a code action finished.
#[derive(Debug)]
pub(super) enum ExecSignal {
    /// Ran to the end; carries the value of the last expression.
    Completed(Option<Value>),
    /// `final_answer` was called with this payload.
    FinalAnswer(Value),
}

enum Evaluated {
    Value(Value),
    Final(Value),
}

/// One sandboxed execution. Consumed by [`Interpreter::run`].
pub(super) struct Interpreter<'a> {
    registry: &'a ToolRegistry,
    bus: &'a EventBus,
    variables: HashMap<String, Value>,
    logs: Vec<String>,
    ops: u64,
    max_operations: u64,
}

impl<'a> Interpreter<'a> {
    pub(super) fn new(
        registry: &'a ToolRegistry,
        bus: &'a EventBus,
        injected: &HashMap<String, Value>,
        max_operations: u64,
    ) -> Self {
        Self {
            registry,
            bus,
            variables: injected.clone(),
            logs: Vec::new(),
            ops: 0,
            max_operations,
        }
    }

    /// Execute the code, returning the signal and the captured logs.
    ///
    /// Logs survive errors so a failing action still reports what it
    /// printed before dying.
    pub(super) async fn run(mut self, code: &str) -> (Result<ExecSignal>, Vec<String>) {
        let mut last_value = None;

        for line in code.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let evaluated = match self.exec_line(line).await {
                Ok(evaluated) => evaluated,
                Err(e) => return (Err(e), self.logs),
            };
            match evaluated {
                Some(Evaluated::Final(value)) => {
                    return (Ok(ExecSignal::FinalAnswer(value)), self.logs);
                }
                Some(Evaluated::Value(value)) => last_value = Some(value),
                None => {}
            }
        }

        (Ok(ExecSignal::Completed(last_value)), self.logs)
    }

    async fn exec_line(&mut self, line: &str) -> Result<Option<Evaluated>> {
        self.charge()?;

        if let Some(captures) = ASSIGN_RE.captures(line) {
            let target = captures[1].to_owned();
            let rhs = captures[2].trim().to_owned();
            return match self.eval_expr(&rhs).await? {
                Evaluated::Final(value) => Ok(Some(Evaluated::Final(value))),
                Evaluated::Value(value) => {
                    self.variables.insert(target, value);
                    Ok(None)
                }
            };
        }

        Ok(Some(self.eval_expr(line).await?))
    }

    async fn eval_expr(&mut self, expr: &str) -> Result<Evaluated> {
        let Some((name, args_src)) = parse_call(expr) else {
            return Ok(Evaluated::Value(self.parse_value(expr)?));
        };

        self.charge()?;
        let parts = self.parse_args(&args_src)?;

        match name.as_str() {
            "print" => {
                let rendered = parts
                    .iter()
                    .map(|(_, v)| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                self.logs.push(rendered);
                Ok(Evaluated::Value(Value::Null))
            }
            "final_answer" => Ok(Evaluated::Final(final_answer_payload(parts))),
            _ => {
                let args = self.build_args(&name, parts)?;
                let invocation = self.registry.invoke(&name, args, self.bus).await;
                match invocation.result {
                    Ok(value) => Ok(Evaluated::Value(value)),
                    Err(err) => Err(AgentError::Tool(err)),
                }
            }
        }
    }

    /// Parse the comma-separated argument list into (name, value) parts.
    fn parse_args(&self, src: &str) -> Result<Vec<(Option<String>, Value)>> {
        let src = src.trim();
        if src.is_empty() {
            return Ok(Vec::new());
        }

        let mut parts = Vec::new();
        for raw in split_top_level(src) {
            let raw = raw.trim();
            if let Some(captures) = NAMED_ARG_RE.captures(raw) {
                let value = self.parse_value(captures[2].trim())?;
                parts.push((Some(captures[1].to_owned()), value));
            } else {
                parts.push((None, self.parse_value(raw)?));
            }
        }
        Ok(parts)
    }

    /// Parse one value token: a JSON literal or a variable reference.
    fn parse_value(&self, token: &str) -> Result<Value> {
        let token = token.trim();

        if matches!(token, "true" | "false" | "null") {
            return serde_json::from_str(token).map_err(AgentError::Json);
        }
        if IDENT_RE.is_match(token) {
            return self.variables.get(token).cloned().ok_or_else(|| {
                AgentError::interpreter(format!("undefined variable '{token}'"))
            });
        }
        if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
            return Ok(Value::String(token[1..token.len() - 1].to_owned()));
        }
        serde_json::from_str(token)
            .map_err(|e| AgentError::interpreter(format!("could not parse value {token:?}: {e}")))
    }

    /// Assemble the final JSON arguments object for a tool call.
    fn build_args(&self, name: &str, parts: Vec<(Option<String>, Value)>) -> Result<Value> {
        let unnamed = parts.iter().filter(|(n, _)| n.is_none()).count();

        if unnamed == 0 {
            let map: serde_json::Map<String, Value> = parts
                .into_iter()
                .filter_map(|(n, v)| n.map(|n| (n, v)))
                .collect();
            return Ok(Value::Object(map));
        }

        if unnamed == 1 && parts.len() == 1 {
            let (_, value) = parts.into_iter().next().unwrap_or((None, Value::Null));
            // A single positional argument binds to the tool's only parameter.
            if let Some(tool) = self.registry.resolve(name) {
                let definition = tool.definition();
                let properties: Vec<String> = definition
                    .parameters
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|p| p.keys().cloned().collect())
                    .unwrap_or_default();
                if properties.len() == 1 {
                    let mut map = serde_json::Map::new();
                    map.insert(properties.into_iter().next().unwrap_or_default(), value);
                    return Ok(Value::Object(map));
                }
                return Err(AgentError::interpreter(format!(
                    "tool '{name}' requires named arguments"
                )));
            }
            // Unknown tool: let the registry report NotFound.
            return Ok(value);
        }

        Err(AgentError::interpreter(
            "mixed or multiple positional arguments are not supported",
        ))
    }

    fn charge(&mut self) -> Result<()> {
        self.ops += 1;
        if self.ops > self.max_operations {
            return Err(AgentError::interpreter("operation budget exceeded"));
        }
        Ok(())
    }
}

/// Extract the final-answer payload from its argument parts.
fn final_answer_payload(parts: Vec<(Option<String>, Value)>) -> Value {
    if parts.len() == 1 {
        let (name, value) = parts.into_iter().next().unwrap_or((None, Value::Null));
        return match name.as_deref() {
            None | Some("answer") => value,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert(other.to_owned(), value);
                Value::Object(map)
            }
        };
    }
    let map: serde_json::Map<String, Value> = parts
        .into_iter()
        .filter_map(|(n, v)| n.map(|n| (n, v)))
        .collect();
    Value::Object(map)
}

/// Split `ident(args)` into name and raw argument source.
fn parse_call(expr: &str) -> Option<(String, String)> {
    let open = expr.find('(')?;
    if !expr.ends_with(')') {
        return None;
    }
    let name = expr[..open].trim();
    if !IDENT_RE.is_match(name) {
        return None;
    }
    Some((name.to_owned(), expr[open + 1..expr.len() - 1].to_owned()))
}

/// Split on top-level commas, respecting quotes and brackets.
fn split_top_level(src: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut in_string: Option<char> = None;
    let mut current = String::new();
    let mut escaped = false;

    for c in src.chars() {
        if let Some(quote) = in_string {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => {
                in_string = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::tool::{FinalAnswerTool, Tool};
    use async_trait::async_trait;
    use serde::Deserialize;

    #[derive(Debug, Clone, Copy, Default)]
    struct SearchTool;

    #[derive(Debug, Deserialize)]
    struct SearchArgs {
        query: String,
    }

    #[async_trait]
    impl Tool for SearchTool {
        const NAME: &'static str = "search";
        type Args = SearchArgs;
        type Output = String;
        type Error = ToolError;

        fn description(&self) -> String {
            "Searches".to_owned()
        }

        fn parameters_schema(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            })
        }

        async fn call(&self, args: Self::Args) -> std::result::Result<Self::Output, Self::Error> {
            Ok(format!("results for {}", args.query))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.add(SearchTool);
        registry.add(FinalAnswerTool);
        registry
    }

    async fn run(code: &str) -> (Result<ExecSignal>, Vec<String>) {
        let registry = registry();
        let bus = EventBus::new();
        let interpreter = Interpreter::new(&registry, &bus, &HashMap::new(), 100);
        interpreter.run(code).await
    }

    #[tokio::test]
    async fn final_answer_signal() {
        let (result, _) = run("final_answer(answer: 4)").await;
        match result.unwrap() {
            ExecSignal::FinalAnswer(v) => assert_eq!(v, Value::from(4)),
            ExecSignal::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn assignment_flows_into_later_calls() {
        let code = "result = search(query: \"ruby news\")\nfinal_answer(answer: result)";
        let (result, _) = run(code).await;
        match result.unwrap() {
            ExecSignal::FinalAnswer(v) => {
                assert_eq!(v, Value::String("results for ruby news".into()));
            }
            ExecSignal::Completed(_) => panic!("expected final answer"),
        }
    }

    #[tokio::test]
    async fn print_captures_logs() {
        let code = "print(\"checking\", 42)\nsearch(query: \"x\")";
        let (result, logs) = run(code).await;
        assert!(matches!(result.unwrap(), ExecSignal::Completed(Some(_))));
        assert_eq!(logs, vec!["checking 42"]);
    }

    #[tokio::test]
    async fn positional_argument_binds_single_parameter() {
        let (result, _) = run("search(\"ruby\")").await;
        match result.unwrap() {
            ExecSignal::Completed(Some(v)) => {
                assert_eq!(v, Value::String("results for ruby".into()));
            }
            _ => panic!("expected completion value"),
        }
    }

    #[tokio::test]
    async fn undefined_variable_is_an_error() {
        let (result, _) = run("final_answer(answer: missing_var)").await;
        assert!(matches!(
            result.unwrap_err(),
            AgentError::Interpreter { .. }
        ));
    }

    #[tokio::test]
    async fn operation_budget_is_enforced() {
        let registry = registry();
        let bus = EventBus::new();
        let interpreter = Interpreter::new(&registry, &bus, &HashMap::new(), 3);
        let code = "a = search(query: \"one\")\nb = search(query: \"two\")\nfinal_answer(answer: b)";
        let (result, _) = interpreter.run(code).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("operation budget exceeded"));
    }

    #[tokio::test]
    async fn injected_variables_are_readable() {
        let registry = registry();
        let bus = EventBus::new();
        let injected = HashMap::from([("city".to_owned(), Value::String("Paris".into()))]);
        let interpreter = Interpreter::new(&registry, &bus, &injected, 100);
        let (result, _) = interpreter.run("final_answer(answer: city)").await;
        match result.unwrap() {
            ExecSignal::FinalAnswer(v) => assert_eq!(v, Value::String("Paris".into())),
            ExecSignal::Completed(_) => panic!("expected final answer"),
        }
    }

    #[test]
    fn split_top_level_respects_nesting() {
        let parts = split_top_level(r#"a: [1, 2], b: "x, y", c: 3"#);
        assert_eq!(parts.len(), 3);
    }
}
