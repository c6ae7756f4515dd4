use std::collections::HashMap;

use crate::domain::types::{value_text, CollectionVariable, Environment};

/// Build the merged variable map for one run. Enabled collection variables
/// first, enabled environment values overwrite on key collision.
pub fn build_scope(
    environment: Option<&Environment>,
    collection_vars: &[CollectionVariable],
) -> HashMap<String, String> {
    let mut scope = HashMap::new();

    for var in collection_vars {
        if var.disabled || var.key.is_empty() {
            continue;
        }
        if let Some(value) = var.value.as_ref().and_then(value_text) {
            scope.insert(var.key.clone(), value);
        }
    }

    if let Some(environment) = environment {
        for entry in &environment.values {
            if entry.enabled == Some(false) || entry.key.is_empty() {
                continue;
            }
            if let Some(value) = entry.value.as_ref().and_then(value_text) {
                scope.insert(entry.key.clone(), value);
            }
        }
    }

    scope
}

/// Substitute every `{{name}}` occurrence in a single left-to-right pass.
/// Unknown names stay verbatim, and replacement text is never rescanned, so a
/// value that itself contains `{{...}}` cannot trigger further expansion.
pub fn interpolate(template: &str, scope: &HashMap<String, String>) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let (head, tail) = rest.split_at(open);
        output.push_str(head);

        match tail[2..].find("}}") {
            Some(close) => {
                let name = &tail[2..2 + close];
                match scope.get(name.trim()) {
                    Some(value) => output.push_str(value),
                    None => output.push_str(&tail[..close + 4]),
                }
                rest = &tail[close + 4..];
            }
            None => {
                output.push_str(tail);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}
