use std::sync::OnceLock;

use regex::Regex;

fn url_regex() -> &'static Regex {
    static URL: OnceLock<Regex> = OnceLock::new();
    URL.get_or_init(|| Regex::new(r"https?://\S+|www\.\S+").expect("valid url regex"))
}

/// Every URL-looking token in `text`, in order of appearance, duplicates kept.
/// Tokens without a scheme get `http://` in front.
pub fn extract_urls(text: &str) -> Vec<String> {
    url_regex()
        .find_iter(text)
        .map(|m| {
            let url = m.as_str();
            if url.starts_with("http") {
                url.to_string()
            } else {
                format!("http://{}", url)
            }
        })
        .collect()
}
