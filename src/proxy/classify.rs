//! Routing of intercepted requests to caching strategies

use url::{Origin, Url};

use crate::http::Request;

/// Caching strategy chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Non-GET: straight to the network, never cached
    Bypass,
    /// Remote question/dictionary API: TTL-bounded stale-while-revalidate
    Api,
    /// Other foreign origins: network first, cache fallback
    CrossOrigin,
    /// Page loads: network first, root document fallback
    Navigation,
    /// Own static files: cache first, background refresh
    ShellAsset,
}

/// Decides the strategy for each request; the first matching rule wins
#[derive(Debug, Clone)]
pub struct Classifier {
    app_origin: Origin,
    api_hosts: Vec<String>,
}

impl Classifier {
    pub fn new(app_origin: &Url, api_hosts: &[String]) -> Self {
        Self {
            app_origin: app_origin.origin(),
            api_hosts: api_hosts
                .iter()
                .map(|host| host.trim().to_ascii_lowercase())
                .filter(|host| !host.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, request: &Request) -> Strategy {
        if request.method != reqwest::Method::GET {
            Strategy::Bypass
        } else if self.is_api(&request.url) {
            Strategy::Api
        } else if request.url.origin() != self.app_origin {
            Strategy::CrossOrigin
        } else if request.is_navigation() {
            Strategy::Navigation
        } else {
            Strategy::ShellAsset
        }
    }

    /// Host equals a configured API host or is a subdomain of one
    fn is_api(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.api_hosts.iter().any(|api| {
            host == *api
                || host
                    .strip_suffix(api.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn classifier() -> Classifier {
        Classifier::new(
            &Url::parse("https://cbt.example").unwrap(),
            &["questions.aloc.com.ng".to_string(), "api.dictionaryapi.dev".to_string()],
        )
    }

    fn get(url: &str) -> Request {
        Request::get(Url::parse(url).unwrap())
    }

    #[test]
    fn test_non_get_bypasses_even_for_api_hosts() {
        let mut request = get("https://questions.aloc.com.ng/api/v2/q");
        request.method = Method::POST;
        assert_eq!(classifier().classify(&request), Strategy::Bypass);
    }

    #[test]
    fn test_api_hosts_and_subdomains() {
        let c = classifier();
        assert_eq!(c.classify(&get("https://questions.aloc.com.ng/api/v2/q/40")), Strategy::Api);
        assert_eq!(c.classify(&get("https://api.dictionaryapi.dev/api/v2/entries/en/x")), Strategy::Api);
        assert_eq!(c.classify(&get("https://eu.questions.aloc.com.ng/x")), Strategy::Api);
    }

    #[test]
    fn test_lookalike_host_is_not_api() {
        let c = classifier();
        assert_eq!(
            c.classify(&get("https://notquestions.aloc.com.ng/x")),
            Strategy::CrossOrigin
        );
    }

    #[test]
    fn test_foreign_origin_is_cross_origin() {
        let c = classifier();
        assert_eq!(c.classify(&get("https://fonts.example/font.woff2")), Strategy::CrossOrigin);
        // Same host, different scheme is still a different origin
        assert_eq!(c.classify(&get("http://cbt.example/app.js")), Strategy::CrossOrigin);
    }

    #[test]
    fn test_navigation_and_shell_asset() {
        let c = classifier();
        let nav = Request::navigate(Url::parse("https://cbt.example/exam/physics").unwrap());
        assert_eq!(c.classify(&nav), Strategy::Navigation);
        assert_eq!(c.classify(&get("https://cbt.example/assets/app.js")), Strategy::ShellAsset);
    }
}
