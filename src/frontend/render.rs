use crate::{agent::session::Event, auth::templates::escape_html};
use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\s][^*]*?)\*").unwrap());
static CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*•]\s+(.*)$").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#{1,6}\s+(.*)$").unwrap());

// Text the agents said during one run, one event per paragraph. User
// events and tool traffic are skipped.
pub fn extract_response_text(events: &[Event]) -> String {
    events
        .iter()
        .filter(|event| event.author != "user")
        .filter_map(Event::text)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn inline(line: &str) -> String {
    let line = CODE.replace_all(line, "<code>$1</code>");
    let line = BOLD.replace_all(&line, "<strong>$1</strong>");
    EMPHASIS.replace_all(&line, "<em>$1</em>").into_owned()
}

// Escapes model output and applies light markdown-style formatting.
pub fn render_agent_html(text: &str) -> String {
    let escaped = escape_html(text);
    let mut lines: Vec<String> = Vec::new();
    let mut in_list = false;

    for line in escaped.lines() {
        if let Some(caps) = BULLET.captures(line) {
            if !in_list {
                lines.push("<ul>".to_string());
                in_list = true;
            }
            lines.push(format!("<li>{}</li>", inline(&caps[1])));
            continue;
        }
        if in_list {
            lines.push("</ul>".to_string());
            in_list = false;
        }

        match HEADING.captures(line) {
            Some(caps) => lines.push(format!("<strong>{}</strong>", inline(&caps[1]))),
            None => lines.push(inline(line)),
        }
    }
    if in_list {
        lines.push("</ul>".to_string());
    }

    let mut html = String::new();
    for (index, line) in lines.iter().enumerate() {
        html.push_str(line);
        let next = lines.get(index + 1).map(String::as_str);
        let is_block = |l: &str| l.starts_with("<ul>") || l.starts_with("<li>") || l.starts_with("</ul>");
        if let Some(next) = next {
            if !is_block(line) && !is_block(next) {
                html.push_str("<br>");
            }
        }
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::session::{Content, FunctionCall, Part};
    use serde_json::json;

    #[test]
    fn test_extract_skips_user_and_tool_events() {
        let events = vec![
            Event::new("e-1", "user", Some(Content::user_text("hi"))),
            Event::new(
                "e-1",
                "root_agent",
                Some(Content::model(vec![Part::function_call(FunctionCall {
                    id: None,
                    name: "find_products".to_string(),
                    args: json!({}),
                })])),
            ),
            Event::new("e-1", "shopper", Some(Content::model(vec![Part::text("Here are options.")]))),
            Event::new("e-1", "shopper", Some(Content::model(vec![Part::text("Pick one.")]))),
        ];
        assert_eq!(extract_response_text(&events), "Here are options.\n\nPick one.");
        assert_eq!(extract_response_text(&events[..2]), "");
    }

    #[test]
    fn test_render_escapes_before_formatting() {
        let html = render_agent_html("<script>alert(1)</script> **Total:** $10");
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("<strong>Total:</strong>"));
    }

    #[test]
    fn test_render_lists_headings_and_breaks() {
        let html = render_agent_html("## Receipt\nItem: *shoes*\n- Price: `$89.99`\n- Tax: $7.87\nThanks");
        assert_eq!(
            html,
            "<strong>Receipt</strong><br>Item: <em>shoes</em><ul><li>Price: <code>$89.99</code></li><li>Tax: $7.87</li></ul>Thanks"
        );
    }
}
