//! GitHub issues and pull requests
//!
//! Both kinds are watched through the issues endpoint, which also serves
//! pull requests. The watermark is the `updated_at` timestamp.

use crate::batch::{group, Batcher, Pending, Processor};
use crate::error::Result;
use crate::transport::{endpoint, Transport};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

static ISSUE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://github\.com/([^/#?\s]+/[^/#?\s]+)/issues/([0-9]+)/?(?:#\S*)?$")
        .expect("issue URL pattern")
});

static PULL_REQUEST_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://github\.com/([^/#?\s]+/[^/#?\s]+)/pull/([0-9]+)/?(?:#\S*)?$")
        .expect("pull request URL pattern")
});

/// Identity (`repo`, `number`) plus the last observed `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GithubRef {
    /// `owner/name`
    pub repo: String,
    pub number: u64,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl PartialEq for GithubRef {
    fn eq(&self, other: &Self) -> bool {
        self.repo == other.repo && self.number == other.number
    }
}

impl Eq for GithubRef {}

impl Hash for GithubRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.repo.hash(state);
        self.number.hash(state);
    }
}

pub fn is_issue_url(url: &str) -> bool {
    ISSUE_URL.is_match(url)
}

pub fn is_pull_request_url(url: &str) -> bool {
    PULL_REQUEST_URL.is_match(url)
}

pub fn parse_issue_url(url: &str) -> Option<GithubRef> {
    parse(&ISSUE_URL, url)
}

pub fn parse_pull_request_url(url: &str) -> Option<GithubRef> {
    parse(&PULL_REQUEST_URL, url)
}

fn parse(re: &Regex, url: &str) -> Option<GithubRef> {
    let caps = re.captures(url)?;
    let number = caps[2].parse().ok()?;
    Some(GithubRef::new(&caps[1], number))
}

impl GithubRef {
    pub fn new(repo: &str, number: u64) -> Self {
        Self {
            repo: repo.to_string(),
            number,
            last_updated: None,
        }
    }

    pub fn issue_url(&self) -> String {
        format!("https://github.com/{}/issues/{}", self.repo, self.number)
    }

    pub fn pull_request_url(&self) -> String {
        format!("https://github.com/{}/pull/{}", self.repo, self.number)
    }

    /// Submit the lookup now; the returned future only awaits its result.
    pub fn refresh<'a>(
        &'a mut self,
        github: &Batcher<GithubProcessor>,
    ) -> impl Future<Output = Result<bool>> + Send + 'a {
        let issue = github.submit(GithubQuery {
            repo: self.repo.clone(),
            number: self.number,
        });
        async move {
            let issue = issue.await?;
            Ok(self.observe(issue.updated_at))
        }
    }

    /// Record the fetched timestamp. Any difference, including the first
    /// observation, counts as a change.
    pub fn observe(&mut self, updated_at: DateTime<Utc>) -> bool {
        if self.last_updated == Some(updated_at) {
            return false;
        }
        debug!(repo = %self.repo, number = self.number, %updated_at, "GitHub item updated");
        self.last_updated = Some(updated_at);
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GithubQuery {
    pub repo: String,
    pub number: u64,
}

/// Subset of the issue payload we look at.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub updated_at: DateTime<Utc>,
}

/// Looks up issues one request each; identical queries share a request.
#[derive(Debug, Clone)]
pub struct GithubProcessor {
    transport: Transport,
    api_url: Url,
    token: Option<String>,
    concurrency: usize,
}

impl GithubProcessor {
    pub fn new(transport: Transport, api_url: Url, token: Option<String>, concurrency: usize) -> Self {
        Self {
            transport,
            api_url,
            token,
            concurrency: concurrency.max(1),
        }
    }

    async fn fetch(&self, query: &GithubQuery) -> Result<Issue> {
        let mut segments = vec!["repos"];
        segments.extend(query.repo.split('/'));
        let number = query.number.to_string();
        segments.extend(["issues", number.as_str()]);

        let url = endpoint(&self.api_url, &segments);
        debug!(%url, "fetching GitHub issue");
        self.transport.get_json(&url, self.token.as_deref()).await
    }
}

impl Processor for GithubProcessor {
    type Query = GithubQuery;
    type Output = Issue;

    fn name(&self) -> &'static str {
        "github"
    }

    fn execute(&self, pending: Vec<Pending<GithubQuery, Issue>>) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            let lookups = group(pending.into_iter().map(|p| (p.query, p.resolver)));
            info!(count = lookups.len(), "querying GitHub");

            let this = &this;
            futures::stream::iter(lookups)
                .for_each_concurrent(this.concurrency, |(query, resolvers)| async move {
                    match this.fetch(&query).await {
                        Ok(issue) => {
                            for resolver in resolvers {
                                resolver.resolve(issue.clone());
                            }
                        }
                        Err(e) => {
                            for resolver in resolvers {
                                resolver.fail(e.clone());
                            }
                        }
                    }
                })
                .await;
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Coordinator;
    use crate::error::Error;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn processor(server: &MockServer) -> GithubProcessor {
        GithubProcessor::new(
            Transport::new(Duration::from_secs(5)).unwrap(),
            Url::parse(&server.uri()).unwrap(),
            None,
            4,
        )
    }

    #[test]
    fn test_issue_urls() {
        assert!(is_issue_url("https://github.com/octo/widgets/issues/1"));
        assert!(is_issue_url("https://github.com/octo/widgets/issues/1/"));
        assert!(is_issue_url("https://github.com/octo/widgets/issues/1#issuecomment-42"));
        assert!(!is_issue_url("http://github.com/octo/widgets/pull/21"));
        assert!(!is_issue_url("https://github.com/octo/widgets/issues"));
        assert!(!is_issue_url("https://github.com/octo/widgets/issues/1/events"));

        let issue = parse_issue_url("http://github.com/octo/widgets/issues/1").unwrap();
        assert_eq!((issue.repo.as_str(), issue.number), ("octo/widgets", 1));
        assert_eq!(issue.issue_url(), "https://github.com/octo/widgets/issues/1");
    }

    #[test]
    fn test_pull_request_urls() {
        assert!(!is_pull_request_url("https://github.com/octo/widgets/issues/21"));
        assert!(is_pull_request_url("http://github.com/octo/widgets/pull/1"));
        assert!(!is_pull_request_url("https://github.com/octo/widgets/pulls"));

        let pr = parse_pull_request_url("http://github.com/octo/widgets/pull/21/").unwrap();
        assert_eq!((pr.repo.as_str(), pr.number), ("octo/widgets", 21));
        assert_eq!(pr.pull_request_url(), "https://github.com/octo/widgets/pull/21");
    }

    #[test]
    fn test_equality_ignores_watermark() {
        let a = GithubRef::new("octo/widgets", 3);
        let mut b = GithubRef::new("octo/widgets", 3);
        b.last_updated = Some(Utc::now());
        assert_eq!(a, b);
        assert_ne!(a, GithubRef::new("octo/widgets", 4));
        assert_ne!(a, GithubRef::new("octo/gadgets", 3));
    }

    #[test]
    fn test_observe() {
        let t1: DateTime<Utc> = "2024-01-01T00:00:00Z".parse().unwrap();
        let t2: DateTime<Utc> = "2024-02-01T00:00:00Z".parse().unwrap();
        let mut issue = GithubRef::new("octo/widgets", 3);

        assert!(issue.observe(t1));
        assert!(!issue.observe(t1));
        assert!(issue.observe(t2));
        assert_eq!(issue.last_updated, Some(t2));
    }

    #[tokio::test]
    async fn test_refresh_coalesces_duplicate_lookups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/widgets/issues/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "number": 7,
                "updated_at": "2024-03-01T12:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let coordinator = Coordinator::new();
        let github = coordinator.register(processor(&server));

        let mut issue = GithubRef::new("octo/widgets", 7);
        let mut pr = GithubRef::new("octo/widgets", 7);
        pr.last_updated = Some("2024-03-01T12:00:00Z".parse().unwrap());

        let first = issue.refresh(&github);
        let second = pr.refresh(&github);
        coordinator.flush();

        let (first, second) = futures::join!(first, second);
        assert!(first.unwrap());
        assert!(!second.unwrap());
        assert!(issue.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_refresh_not_found_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let coordinator = Coordinator::new();
        let github = coordinator.register(processor(&server));

        let mut issue = GithubRef::new("octo/widgets", 9);
        let refresh = issue.refresh(&github);
        coordinator.flush();

        assert!(matches!(refresh.await, Err(Error::Transport { .. })));
        assert_eq!(issue.last_updated, None);
    }
}
