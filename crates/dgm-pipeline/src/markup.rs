//! Self-contained HTML page wrapping one diagram source.

/// Build the page the backend loads for one diagram.
///
/// The diagram library is loaded from `library_url` (pinned to a version by
/// the caller). The source is HTML-escaped: the library reads the container's
/// text content, so escaping round-trips exactly. With `container_width` the
/// container is laid out at a fixed width; otherwise it shrinks to the diagram.
pub(crate) fn wrap_diagram(source: &str, library_url: &str, container_width: Option<u32>) -> String {
    let width_rule = match container_width {
        Some(width) => format!("width: {width}px;"),
        None => "display: inline-block;".to_owned(),
    };
    let library_url = escape_html(library_url);
    let source = escape_html(source);

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="UTF-8">
<script src="{library_url}"></script>
<style>
body {{ margin: 0; padding: 20px; background-color: white; }}
#diagram {{ {width_rule} margin: 0 auto; background: white; }}
</style>
</head>
<body>
<div id="diagram" class="mermaid">
{source}
</div>
<script>
mermaid.initialize({{ startOnLoad: true, theme: 'default', securityLevel: 'strict' }});
</script>
</body>
</html>
"#
    )
}

fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_escapes_source() {
        let page = wrap_diagram("graph A-->B & C<D", "https://cdn/mermaid@10.9.1.js", None);

        assert!(page.contains("graph A--&gt;B &amp; C&lt;D"));
        assert!(!page.contains("A-->B"));
    }

    #[test]
    fn test_wrap_pins_library() {
        let page = wrap_diagram("graph A", "https://cdn/mermaid@10.9.1.js", None);

        assert!(page.contains(r#"<script src="https://cdn/mermaid@10.9.1.js"></script>"#));
        assert!(page.contains("mermaid.initialize"));
    }

    #[test]
    fn test_wrap_container_width() {
        let fixed = wrap_diagram("graph A", "lib.js", Some(800));
        let fit = wrap_diagram("graph A", "lib.js", None);

        assert!(fixed.contains("width: 800px;"));
        assert!(fit.contains("display: inline-block;"));
        assert!(fixed.contains(r#"<div id="diagram" class="mermaid">"#));
    }
}
