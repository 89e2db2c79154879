use anyhow::{anyhow, Result};
use chromiumoxide::async_process::Child;
use futures::io::{AsyncBufReadExt, BufReader};
use futures::stream::StreamExt;
use tokio::time::{timeout, Duration};
use url::Url;

/// Extract the DevTools websocket URL from Chromium's stderr.
pub async fn extract_ws_url(child: &mut Child) -> Result<String> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("chromium process missing stderr handle"))?;
    let mut lines = BufReader::new(stderr).lines();
    let mut captured = Vec::new();

    let reader = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            if let Some(ws) = parse_devtools_line(&line) {
                return Ok(ws);
            }
            captured.push(line);
        }
        Err(anyhow!(
            "chromium exited before exposing devtools websocket url. stderr preview: {}",
            captured
                .iter()
                .take(8)
                .cloned()
                .collect::<Vec<_>>()
                .join(" | ")
        ))
    };

    timeout(Duration::from_secs(20), reader)
        .await
        .map_err(|_| anyhow!("timed out waiting for chromium devtools websocket url"))?
}

fn parse_devtools_line(line: &str) -> Option<String> {
    let (_, ws) = line.rsplit_once("listening on ")?;
    let ws = ws.trim();
    (ws.starts_with("ws") && ws.contains("devtools/browser")).then(|| ws.to_string())
}

/// Frames loaded from `about:blank`, `about:srcdoc` or no URL at all take the
/// origin of the document that created them.
pub fn inherits_origin(url: &str) -> bool {
    let url = url.trim();
    url.is_empty()
        || url.eq_ignore_ascii_case("about:blank")
        || url.eq_ignore_ascii_case("about:srcdoc")
}

/// Whether a frame document at `child` may be walked from a document whose
/// effective origin is `parent`. Pass the inherited origin, not the literal
/// `about:blank`, for nested frames. Anything unparseable is treated as foreign.
pub fn same_origin(parent: &str, child: &str) -> bool {
    if inherits_origin(child) {
        return true;
    }
    match (Url::parse(parent), Url::parse(child.trim())) {
        (Ok(parent), Ok(child)) => {
            let (parent, child) = (parent.origin(), child.origin());
            parent.is_tuple() && parent == child
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_devtools_banner() {
        let line = "DevTools listening on ws://127.0.0.1:9222/devtools/browser/abc";
        assert_eq!(
            parse_devtools_line(line).as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/abc")
        );
        assert!(parse_devtools_line("[0101/000000.000:ERROR] something").is_none());
    }

    #[test]
    fn origin_rules() {
        assert!(same_origin("https://shop.test/a", "https://shop.test/frame?x=1"));
        assert!(same_origin("https://shop.test/a", "about:blank"));
        assert!(!same_origin("https://shop.test/a", "https://ads.test/frame"));
        assert!(!same_origin("https://shop.test/a", "http://shop.test/a"));
        assert!(!same_origin("https://shop.test:8443/", "https://shop.test/"));
        assert!(!same_origin("data:text/html,hi", "data:text/html,hi"));
        assert!(!same_origin("about:blank", "https://shop.test/"));
    }

    #[test]
    fn blank_and_srcdoc_inherit() {
        assert!(inherits_origin(""));
        assert!(inherits_origin("About:Blank"));
        assert!(inherits_origin(" about:srcdoc "));
        assert!(!inherits_origin("https://shop.test/"));
    }
}
