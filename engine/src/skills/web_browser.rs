//! Web browser skill
//!
//! Searches through DuckDuckGo's HTML endpoint, fetches pages as plain text,
//! and opens URLs in the system browser. Search results and page text are
//! pulled out of the HTML with regular expressions; no DOM is built.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use sdk::errors::EngineError;
use sdk::types::{Params, ParamsExt, PermissionLevel, SkillDescriptor, SkillResult};
use sdk::Skill;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::{check_action, optional_positive, require_str};
use crate::command_executor::truncate_chars;
use crate::config::WebConfig;
use crate::platform;

const ACTIONS: &[&str] = &["search", "read_webpage", "open_url", "get_weather"];

const DEFAULT_MAX_RESULTS: usize = 5;
const WEATHER_RESULTS: usize = 3;

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug)]
pub struct WebBrowserSkill {
    client: Client,
    search_url: String,
    max_output_chars: usize,
    result_link: Regex,
    result_snippet: Regex,
    href: Regex,
    script_or_style: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl WebBrowserSkill {
    pub fn new(config: &WebConfig, max_output_chars: usize) -> Result<Self, EngineError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| EngineError::Network(format!("failed to build HTTP client: {}", e)))?;

        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| EngineError::Config(format!("invalid extraction pattern: {}", e)))
        };

        Ok(Self {
            client,
            search_url: config.search_url.clone(),
            max_output_chars,
            result_link: compile(r#"(?is)<a\s([^>]*\bresult__a\b[^>]*)>(.*?)</a>"#)?,
            result_snippet: compile(
                r#"(?is)<(a|div|td)\s[^>]*\bresult__snippet\b[^>]*>(.*?)</(?:a|div|td)>"#,
            )?,
            href: compile(r#"(?i)\bhref\s*=\s*"([^"]*)""#)?,
            script_or_style: compile(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>")?,
            tag: compile(r"(?s)<[^>]+>")?,
            whitespace: compile(r"\s+")?,
        })
    }

    /// Strip scripts, styles and tags, decode entities, collapse whitespace
    pub fn extract_text(&self, html: &str) -> String {
        let without_code = self.script_or_style.replace_all(html, " ");
        let without_tags = self.tag.replace_all(&without_code, " ");
        let decoded = unescape_entities(&without_tags);
        self.whitespace.replace_all(&decoded, " ").trim().to_string()
    }

    /// Parse a DuckDuckGo HTML results page
    ///
    /// A snippet belongs to the result whose title link precedes it, up to
    /// the next title link; results without one get an empty snippet.
    pub fn parse_results(&self, html: &str, max_results: usize) -> Vec<SearchResult> {
        let snippets: Vec<(usize, String)> = self
            .result_snippet
            .captures_iter(html)
            .filter_map(|c| Some((c.get(0)?.start(), self.extract_text(&c[2]))))
            .collect();

        let links: Vec<_> = self.result_link.captures_iter(html).collect();

        links
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let block_start = c.get(0)?.end();
                let block_end = links
                    .get(i + 1)
                    .and_then(|next| next.get(0))
                    .map_or(html.len(), |m| m.start());

                let href = self.href.captures(&c[1])?.get(1)?.as_str();
                let snippet = snippets
                    .iter()
                    .find(|(pos, _)| (block_start..block_end).contains(pos))
                    .map(|(_, text)| text.clone())
                    .unwrap_or_default();

                Some(SearchResult {
                    title: self.extract_text(&c[2]),
                    url: resolve_result_url(&unescape_entities(href)),
                    snippet,
                })
            })
            .take(max_results)
            .collect()
    }

    async fn search(&self, query: &str, max_results: usize) -> SkillResult {
        info!(query, max_results, "Searching the web");

        let response = match self
            .client
            .get(&self.search_url)
            .query(&[("q", query)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SkillResult::failure(format!("search failed: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return SkillResult::failure(format!("search failed: HTTP {}", status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return SkillResult::failure(format!("search failed: {}", e)),
        };

        let results = self.parse_results(&body, max_results);
        debug!(count = results.len(), "Parsed search results");

        SkillResult::success(json!({
            "query": query,
            "count": results.len(),
            "results": results,
        }))
    }

    async fn read_webpage(&self, url: &str) -> SkillResult {
        info!(url, "Reading web page");

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return SkillResult::failure(format!("HTTP error: {}", e)),
        };

        let status = response.status();
        if !status.is_success() {
            return SkillResult::failure(format!("HTTP error: status {} for {}", status.as_u16(), url));
        }

        match response.text().await {
            Ok(html) => SkillResult::success(json!({
                "url": url,
                "status_code": status.as_u16(),
                "content": truncate_chars(&self.extract_text(&html), self.max_output_chars),
            })),
            Err(e) => SkillResult::failure(format!("HTTP error: {}", e)),
        }
    }

    fn open_url(&self, url: &str) -> SkillResult {
        info!(url, "Opening URL in browser");
        match platform::open_url(url) {
            Ok(()) => SkillResult::success(json!({"url": url, "opened": true})),
            Err(e) => SkillResult::failure(format!("could not open browser: {}", e)),
        }
    }
}

/// DuckDuckGo wraps result links in `//duckduckgo.com/l/?uddg=<target>`
fn resolve_result_url(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    match Url::parse(&absolute) {
        Ok(url) => url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or(absolute),
        Err(_) => absolute,
    }
}

/// Decode named entities common in search pages plus numeric references
fn unescape_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| decode_entity(&candidate[1..end]).map(|c| (c, end)));

        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn http_url(params: &Params) -> Option<String> {
    let raw = params.str_param("url").unwrap_or_default();
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => None,
        Ok(url) => Some(format!("unsupported URL scheme '{}'", url.scheme())),
        Err(e) => Some(format!("invalid URL '{}': {}", raw, e)),
    }
}

#[async_trait]
impl Skill for WebBrowserSkill {
    fn descriptor(&self) -> SkillDescriptor {
        SkillDescriptor::new(
            "web_browser",
            "Search the web, read web pages as text, open URLs in the browser, look up the weather",
            PermissionLevel::ReadOnly,
        )
        .with_param(
            "action",
            json!({"type": "string", "enum": ACTIONS, "description": "Operation to perform"}),
            true,
        )
        .with_param(
            "query",
            json!({"type": "string", "description": "Search keywords (search)"}),
            false,
        )
        .with_param(
            "url",
            json!({"type": "string", "description": "Page URL (read_webpage, open_url)"}),
            false,
        )
        .with_param(
            "city",
            json!({"type": "string", "description": "City name (get_weather)"}),
            false,
        )
        .with_param(
            "max_results",
            json!({"type": "integer", "description": "Maximum number of results (search)"}),
            false,
        )
    }

    async fn execute(&self, params: &Params) -> SkillResult {
        match params.str_param("action").unwrap_or_default() {
            "search" => {
                let max_results = params
                    .u64_param("max_results")
                    .map_or(DEFAULT_MAX_RESULTS, |n| n as usize);
                self.search(params.str_param("query").unwrap_or_default(), max_results)
                    .await
            }
            "read_webpage" => self.read_webpage(params.str_param("url").unwrap_or_default()).await,
            "open_url" => self.open_url(params.str_param("url").unwrap_or_default()),
            "get_weather" => {
                let city = params.str_param("city").unwrap_or_default();
                self.search(&format!("{} weather", city.trim()), WEATHER_RESULTS)
                    .await
            }
            other => SkillResult::failure(format!("unknown action '{}'", other)),
        }
    }

    fn validate_params(&self, params: &Params) -> Option<String> {
        if let Some(err) = check_action(params, ACTIONS) {
            return Some(err);
        }
        match params.str_param("action").unwrap_or_default() {
            "search" => require_str(params, "query")
                .or_else(|| optional_positive(params, "max_results")),
            "read_webpage" | "open_url" => require_str(params, "url").or_else(|| http_url(params)),
            "get_weather" => require_str(params, "city"),
            _ => None,
        }
    }
}
