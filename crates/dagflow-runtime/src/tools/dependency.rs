//! Dependency-substitution strategy table (§4.2, §9 "Dependency substitution
//! rules"): rather than a single `match` on tool name, each tool with
//! bespoke substitution semantics gets its own [`DependencyResolver`], and
//! the executor dispatches through a `HashMap` built once at construction.
//! Any tool not in the table falls back to the generic
//! `<Result(s) (from|of) Task N>` text substitution.

use dagflow_kernel::model::{SubTask, NO_DEPENDENCIES};
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::OnceLock;

pub trait DependencyResolver: Send + Sync {
    fn resolve(&self, task: &SubTask, results: &HashMap<String, Value>) -> Value;
}

pub fn strategy_table() -> HashMap<&'static str, Box<dyn DependencyResolver>> {
    let mut table: HashMap<&'static str, Box<dyn DependencyResolver>> = HashMap::new();
    table.insert("fetchURLs", Box::new(FetchUrlsResolver));
    table.insert("writeFile", Box::new(WriteFileResolver));
    table.insert("sendEmail", Box::new(SendEmailResolver));
    table
}

pub fn resolve(table: &HashMap<&'static str, Box<dyn DependencyResolver>>, task: &SubTask, results: &HashMap<String, Value>) -> Value {
    match table.get(task.tool_or_prompt.name.as_str()) {
        Some(resolver) => resolver.resolve(task, results),
        None => GenericResolver.resolve(task, results),
    }
}

fn dependency_values<'a>(task: &SubTask, results: &'a HashMap<String, Value>) -> Vec<&'a Value> {
    task.dependencies
        .iter()
        .filter(|d| d.as_str() != NO_DEPENDENCIES)
        .filter_map(|d| results.get(d))
        .collect()
}

fn join_dependency_content(task: &SubTask, results: &HashMap<String, Value>) -> String {
    dependency_values(task, results)
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Object(map) => map.get("content").and_then(Value::as_str).map(str::to_string).unwrap_or_else(|| v.to_string()),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

struct FetchUrlsResolver;

impl DependencyResolver for FetchUrlsResolver {
    fn resolve(&self, task: &SubTask, results: &HashMap<String, Value>) -> Value {
        let mut urls = Vec::new();
        for value in dependency_values(task, results) {
            collect_urls(value, &mut urls);
        }
        let mut params = task.tool_or_prompt.params.clone().unwrap_or_else(|| json!({}));
        match params.as_object_mut() {
            Some(obj) => {
                obj.insert("urls".to_string(), Value::Array(urls.into_iter().map(Value::String).collect()));
            }
            None => params = json!({ "urls": urls }),
        }
        params
    }
}

fn collect_urls(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(url_regex().find_iter(s).map(|m| m.as_str().to_string())),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(map) => {
                        if let Some(u) = map.get("url").and_then(Value::as_str) {
                            out.push(u.to_string());
                        }
                    }
                    Value::String(s) => out.extend(url_regex().find_iter(s).map(|m| m.as_str().to_string())),
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            if let Some(u) = map.get("url").and_then(Value::as_str) {
                out.push(u.to_string());
            }
        }
        _ => {}
    }
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).unwrap())
}

struct WriteFileResolver;

impl DependencyResolver for WriteFileResolver {
    fn resolve(&self, task: &SubTask, results: &HashMap<String, Value>) -> Value {
        let mut params = task.tool_or_prompt.params.clone().unwrap_or_else(|| json!({}));
        if let Some(obj) = params.as_object_mut() {
            if obj.contains_key("content") {
                obj.insert("content".to_string(), Value::String(join_dependency_content(task, results)));
            }
            generic_substitute_object(obj, &["content"], results);
        }
        params
    }
}

struct SendEmailResolver;

impl DependencyResolver for SendEmailResolver {
    fn resolve(&self, task: &SubTask, results: &HashMap<String, Value>) -> Value {
        let mut params = task.tool_or_prompt.params.clone().unwrap_or_else(|| json!({}));
        if let Some(obj) = params.as_object_mut() {
            let has_attachments = matches!(obj.get("attachments"), Some(Value::Array(a)) if !a.is_empty());
            if has_attachments {
                let joined = join_dependency_content(task, results);
                if let Some(Value::Array(attachments)) = obj.get_mut("attachments") {
                    if let Some(Value::Object(first)) = attachments.get_mut(0) {
                        first.insert("content".to_string(), Value::String(joined));
                    }
                }
            }
            generic_substitute_object(obj, &["attachments"], results);
        }
        params
    }
}

struct GenericResolver;

impl DependencyResolver for GenericResolver {
    fn resolve(&self, task: &SubTask, results: &HashMap<String, Value>) -> Value {
        let mut params = task.tool_or_prompt.params.clone().unwrap_or_else(|| json!({}));
        if let Some(obj) = params.as_object_mut() {
            generic_substitute_object(obj, &[], results);
        }
        params
    }
}

/// Apply the literal `<Result(s) (from|of) Task N>` substitution (§4.2
/// "Otherwise" branch) to every key except `skip_keys`, which a tool-specific
/// resolver has already populated from dependency results directly.
fn generic_substitute_object(obj: &mut Map<String, Value>, skip_keys: &[&str], results: &HashMap<String, Value>) {
    for (key, value) in obj.iter_mut() {
        if skip_keys.contains(&key.as_str()) {
            continue;
        }
        substitute_result_refs_in_value(value, results);
    }
}

fn substitute_result_refs_in_value(value: &mut Value, results: &HashMap<String, Value>) {
    match value {
        Value::String(s) => *s = substitute_result_refs(s, results),
        Value::Array(items) => {
            for item in items {
                substitute_result_refs_in_value(item, results);
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                substitute_result_refs_in_value(v, results);
            }
        }
        _ => {}
    }
}

/// Replaces every occurrence of `<Result(s) (from|of) Task N>` with the
/// stringified result of the dependency whose renumbered id is `N`
/// zero-padded to three digits (§4.2, §8 boundary behaviour: "replaced
/// twice" when the pattern appears twice).
fn substitute_result_refs(input: &str, results: &HashMap<String, Value>) -> String {
    result_ref_regex()
        .replace_all(input, |caps: &Captures| {
            let n: usize = caps[1].parse().unwrap_or(0);
            let padded = format!("{n:03}");
            results.get(&padded).map(stringify_for_substitution).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn stringify_for_substitution(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn result_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<results?\s+(?:from|of)\s+task\s+(\d+)>").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_kernel::model::{ActionType, ToolOrPrompt};

    fn task_with_params(name: &str, deps: &[&str], params: Value) -> SubTask {
        SubTask {
            id: "999".into(),
            description: "d".into(),
            thought: "t".into(),
            action_type: ActionType::Tool,
            tool_or_prompt: ToolOrPrompt { name: name.into(), params: Some(params) },
            expected_output: "o".into(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn generic_substitution_replaces_every_occurrence() {
        let mut results = HashMap::new();
        results.insert("003".to_string(), Value::String("done".to_string()));
        let task = task_with_params(
            "summarize",
            &["003"],
            json!({"text": "<Result from Task 3> and again <Results of Task 3>"}),
        );
        let resolved = resolve(&strategy_table(), &task, &results);
        assert_eq!(resolved["text"], "done and again done");
    }

    #[test]
    fn fetch_urls_flattens_string_and_object_dependencies() {
        let mut results = HashMap::new();
        results.insert("001".to_string(), Value::String("see https://a.example/x for details".to_string()));
        results.insert("002".to_string(), json!([{"url": "https://b.example/y"}]));
        let task = task_with_params("fetchURLs", &["001", "002"], json!({}));
        let resolved = resolve(&strategy_table(), &task, &results);
        let urls = resolved["urls"].as_array().unwrap();
        assert!(urls.contains(&Value::String("https://a.example/x".to_string())));
        assert!(urls.contains(&Value::String("https://b.example/y".to_string())));
    }

    #[test]
    fn write_file_concatenates_dependency_content_in_order() {
        let mut results = HashMap::new();
        results.insert("001".to_string(), Value::String("first".to_string()));
        results.insert("002".to_string(), Value::String("second".to_string()));
        let task = task_with_params("writeFile", &["001", "002"], json!({"content": "", "path": "out.md"}));
        let resolved = resolve(&strategy_table(), &task, &results);
        assert_eq!(resolved["content"], "first\nsecond");
    }

    #[test]
    fn send_email_fills_first_attachment_content() {
        let mut results = HashMap::new();
        results.insert("001".to_string(), Value::String("report body".to_string()));
        let task = task_with_params(
            "sendEmail",
            &["001"],
            json!({"attachments": [{"filename": "report.md", "content": ""}]}),
        );
        let resolved = resolve(&strategy_table(), &task, &results);
        assert_eq!(resolved["attachments"][0]["content"], "report body");
    }
}
