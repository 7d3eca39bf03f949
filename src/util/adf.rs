use serde_json::Value;

/// Flatten a Jira Atlassian Document Format tree into plain text.
///
/// Block nodes become paragraphs separated by a blank line, list items are
/// rendered as `- ` bullets and hard breaks as newlines. Returns `None` when
/// the document holds no text.
pub fn adf_to_text(value: &Value) -> Option<String> {
    let mut out = String::new();
    match value {
        Value::String(s) => out.push_str(s),
        _ => render(value, &mut out),
    }
    let text = out.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn render(node: &Value, out: &mut String) {
    let Value::Object(obj) = node else {
        if let Value::Array(nodes) = node {
            nodes.iter().for_each(|n| render(n, out));
        }
        return;
    };

    match obj.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = obj.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        Some("hardBreak") => out.push('\n'),
        Some("listItem") => {
            out.push_str("- ");
            render_children(obj.get("content"), out);
            end_line(out);
        }
        Some("paragraph" | "heading" | "codeBlock" | "blockquote") => {
            render_children(obj.get("content"), out);
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
        Some("bulletList" | "orderedList") => {
            render_children(obj.get("content"), out);
            out.push('\n');
        }
        _ => render_children(obj.get("content"), out),
    }
}

fn render_children(content: Option<&Value>, out: &mut String) {
    if let Some(content) = content {
        render(content, out);
    }
}

// Paragraphs nested in list items leave a blank line behind; collapse it.
fn end_line(out: &mut String) {
    while out.ends_with("\n\n") {
        out.pop();
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
}
