//! StackExchange questions and answers
//!
//! Every watched post needs two lookups, the post itself (edit date) and its
//! comments. Both go through one batch processor which partitions queries by
//! (query kind, site) and asks the API for up to 100 posts per call.

use crate::batch::{batch, group, Batcher, Pending, Processor, Resolver, MAX_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::transport::{endpoint, Transport};
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const SITES: &[&str] = &[
    r"stackoverflow\.com",
    r"superuser\.com",
    r"askubuntu\.com",
    r"serverfault\.com",
    r"[a-z0-9-]+\.stackexchange\.com",
];

fn sites_pattern() -> String {
    SITES
        .iter()
        .map(|site| format!("(?:{})", site))
        .collect::<Vec<_>>()
        .join("|")
}

static QUESTION_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^https?://({})/(?:questions|q)/([0-9]+)(?:/(?:[^/#]+(?:/[0-9]*)?)?)?(?:#\S*)?$",
        sites_pattern()
    ))
    .expect("question URL pattern")
});

static ANSWER_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^https?://({})/a/([0-9]+)(?:/[0-9]*)?(?:#\S*)?$", sites_pattern()))
        .expect("answer URL pattern")
});

/// Identity (`site`, `id`) plus the last observed edit and comment dates
/// (epoch seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackExchangeRef {
    pub site: String,
    pub id: u64,
    #[serde(default)]
    pub last_edit_date: Option<i64>,
    #[serde(default)]
    pub last_comment_date: Option<i64>,
}

impl PartialEq for StackExchangeRef {
    fn eq(&self, other: &Self) -> bool {
        self.site == other.site && self.id == other.id
    }
}

impl Eq for StackExchangeRef {}

impl Hash for StackExchangeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.site.hash(state);
        self.id.hash(state);
    }
}

pub fn is_question_url(url: &str) -> bool {
    QUESTION_URL.is_match(url)
}

pub fn is_answer_url(url: &str) -> bool {
    ANSWER_URL.is_match(url)
}

pub fn parse_question_url(url: &str) -> Option<StackExchangeRef> {
    parse(&QUESTION_URL, url)
}

pub fn parse_answer_url(url: &str) -> Option<StackExchangeRef> {
    parse(&ANSWER_URL, url)
}

fn parse(re: &Regex, url: &str) -> Option<StackExchangeRef> {
    let caps = re.captures(url)?;
    let id = caps[2].parse().ok()?;
    Some(StackExchangeRef::new(&caps[1], id))
}

/// Whether a newly fetched latest-comment date should be reported.
///
/// A comment appearing where there was none, or a strictly newer latest
/// comment, is a change. Losing every comment is not reported.
pub fn comment_changed(stored: Option<i64>, latest: Option<i64>) -> bool {
    match (stored, latest) {
        (None, Some(_)) => true,
        (Some(stored), Some(latest)) => latest > stored,
        (_, None) => false,
    }
}

impl StackExchangeRef {
    pub fn new(site: &str, id: u64) -> Self {
        Self {
            site: site.to_string(),
            id,
            last_edit_date: None,
            last_comment_date: None,
        }
    }

    pub fn question_url(&self) -> String {
        format!("https://{}/q/{}", self.site, self.id)
    }

    pub fn answer_url(&self) -> String {
        format!("https://{}/a/{}", self.site, self.id)
    }

    /// Submit the post and comments lookups now; the returned future awaits
    /// both and only then updates the watermarks.
    pub fn refresh<'a>(
        &'a mut self,
        stackexchange: &Batcher<StackExchangeProcessor>,
    ) -> impl Future<Output = Result<bool>> + Send + 'a {
        let post = stackexchange.submit(PostQuery {
            kind: QueryKind::Post,
            site: self.site.clone(),
            id: self.id,
        });
        let comments = stackexchange.submit(PostQuery {
            kind: QueryKind::Comments,
            site: self.site.clone(),
            id: self.id,
        });

        async move {
            let (post, comments) = futures::try_join!(post, comments)?;
            let post = match post {
                Reply::Post(post) => post,
                other => return Err(mismatched(QueryKind::Post, &other)),
            };
            let comments = match comments {
                Reply::Comments(comments) => comments,
                other => return Err(mismatched(QueryKind::Comments, &other)),
            };

            if post.is_none() {
                warn!(site = %self.site, id = self.id, "post not returned by the API");
            }
            Ok(self.observe(post.and_then(|p| p.last_edit_date), &comments))
        }
    }

    /// Apply fetched state, returning whether anything changed.
    pub fn observe(&mut self, last_edit_date: Option<i64>, comments: &[Comment]) -> bool {
        let mut changed = false;

        if last_edit_date != self.last_edit_date {
            debug!(site = %self.site, id = self.id, ?last_edit_date, "post edited");
            self.last_edit_date = last_edit_date;
            changed = true;
        }

        let latest_comment = comments.iter().map(|c| c.creation_date).max();
        if comment_changed(self.last_comment_date, latest_comment) {
            debug!(site = %self.site, id = self.id, ?latest_comment, "new comment");
            changed = true;
        }
        self.last_comment_date = latest_comment;

        changed
    }
}

fn mismatched(expected: QueryKind, reply: &Reply) -> Error {
    Error::ContractViolation(format!("expected a {} reply, got {:?}", expected, reply))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Post,
    Comments,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::Post => write!(f, "post"),
            QueryKind::Comments => write!(f, "comments"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostQuery {
    pub kind: QueryKind,
    /// Grouping key: one API call never spans two sites.
    pub site: String,
    pub id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub post_id: u64,
    #[serde(default)]
    pub last_edit_date: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comment {
    pub post_id: u64,
    pub creation_date: i64,
}

/// Result of one query. `Post(None)` when the API did not return the post.
#[derive(Debug, Clone)]
pub enum Reply {
    Post(Option<Post>),
    Comments(Vec<Comment>),
}

/// Common wrapper of StackExchange API responses.
#[derive(Debug, Deserialize)]
struct Wrapper<T> {
    items: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    backoff: Option<u64>,
    #[serde(default)]
    quota_remaining: Option<u64>,
}

type Slot = (u64, Vec<Resolver<Reply>>);

#[derive(Debug, Clone)]
pub struct StackExchangeProcessor {
    transport: Transport,
    api_url: Url,
    key: Option<String>,
}

impl StackExchangeProcessor {
    pub fn new(transport: Transport, api_url: Url, key: Option<String>) -> Self {
        Self {
            transport,
            api_url,
            key,
        }
    }

    fn url(&self, kind: QueryKind, site: &str, ids: &[u64]) -> Url {
        let ids = ids.iter().map(u64::to_string).collect::<Vec<_>>().join(";");
        let mut url = match kind {
            QueryKind::Post => endpoint(&self.api_url, &["posts", ids.as_str()]),
            QueryKind::Comments => endpoint(&self.api_url, &["posts", ids.as_str(), "comments"]),
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("site", site);
            query.append_pair("pagesize", &MAX_BATCH_SIZE.to_string());
            if kind == QueryKind::Comments {
                query.append_pair("sort", "creation");
                query.append_pair("order", "desc");
            }
            if let Some(key) = &self.key {
                query.append_pair("key", key);
            }
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, url: &Url) -> Result<Wrapper<T>> {
        let wrapper: Wrapper<T> = self.transport.get_json(url, None).await?;
        if let Some(seconds) = wrapper.backoff {
            warn!(seconds, "StackExchange API asked to back off");
        }
        if let Some(quota) = wrapper.quota_remaining {
            debug!(quota, "StackExchange quota remaining");
        }
        Ok(wrapper)
    }

    /// One API call for one chunk; every slot gets resolved or failed.
    async fn run_chunk(&self, kind: QueryKind, site: &str, chunk: Vec<Slot>) {
        info!(%kind, site, size = chunk.len(), "sending StackExchange batch");

        let ids: Vec<u64> = chunk.iter().map(|(id, _)| *id).collect();
        let url = self.url(kind, site, &ids);

        let replies = match kind {
            QueryKind::Post => self.posts(&url).await,
            QueryKind::Comments => self.comments(&url, &ids).await,
        };

        match replies {
            Ok(mut replies) => {
                for (id, resolvers) in chunk {
                    let reply = replies.remove(&id).unwrap_or_else(|| match kind {
                        QueryKind::Post => Reply::Post(None),
                        QueryKind::Comments => Reply::Comments(Vec::new()),
                    });
                    for resolver in resolvers {
                        resolver.resolve(reply.clone());
                    }
                }
            }
            Err(e) => {
                warn!(%kind, site, error = %e, "StackExchange batch failed");
                for (_, resolvers) in chunk {
                    for resolver in resolvers {
                        resolver.fail(e.clone());
                    }
                }
            }
        }
    }

    async fn posts(&self, url: &Url) -> Result<HashMap<u64, Reply>> {
        let wrapper: Wrapper<Post> = self.get(url).await?;
        Ok(wrapper
            .items
            .into_iter()
            .map(|post| (post.post_id, Reply::Post(Some(post))))
            .collect())
    }

    /// Comments come back flat and paged across every post in the chunk;
    /// walk all pages and regroup them under their posts.
    async fn comments(&self, url: &Url, ids: &[u64]) -> Result<HashMap<u64, Reply>> {
        let mut by_post: HashMap<u64, Vec<Comment>> = ids.iter().map(|id| (*id, Vec::new())).collect();

        for page in 1u32.. {
            let mut page_url = url.clone();
            page_url.query_pairs_mut().append_pair("page", &page.to_string());

            let wrapper: Wrapper<Comment> = self.get(&page_url).await?;
            for comment in wrapper.items {
                match by_post.get_mut(&comment.post_id) {
                    Some(comments) => comments.push(comment),
                    None => debug!(post_id = comment.post_id, "ignoring comment on unrequested post"),
                }
            }

            if !wrapper.has_more {
                break;
            }
            debug!(page, "fetching next page of comments");
            if let Some(seconds) = wrapper.backoff {
                tokio::time::sleep(Duration::from_secs(seconds)).await;
            }
        }

        Ok(by_post
            .into_iter()
            .map(|(id, comments)| (id, Reply::Comments(comments)))
            .collect())
    }
}

impl Processor for StackExchangeProcessor {
    type Query = PostQuery;
    type Output = Reply;

    fn name(&self) -> &'static str {
        "stackexchange"
    }

    fn execute(&self, pending: Vec<Pending<PostQuery, Reply>>) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            info!(count = pending.len(), "sending StackExchange queries");

            let partitions = group(pending.into_iter().map(|p| {
                let PostQuery { kind, site, id } = p.query;
                ((kind, site), (id, p.resolver))
            }));

            for ((kind, site), entries) in partitions {
                for chunk in batch(group(entries), MAX_BATCH_SIZE) {
                    this.run_chunk(kind, &site, chunk).await;
                }
            }
        }
        .boxed()
    }
}
