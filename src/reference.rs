//! Trackable references and their kind tags
//!
//! A [`Reference`] is one external object found in source: a GitHub issue or
//! pull request, or a StackExchange question or answer. Equality and hashing
//! cover the kind and the identity fields only, never the watermarks.

use crate::check::{Refresh, Remotes};
use crate::error::{Error, Result};
use crate::github::{self, GithubRef};
use crate::stackexchange::{self, StackExchangeRef};
use crate::status::Record;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Stable tag of a reference variant, also the status file discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Issue,
    PullRequest,
    Question,
    Answer,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Issue, Kind::PullRequest, Kind::Question, Kind::Answer];

    pub fn tag(self) -> &'static str {
        match self {
            Kind::Issue => "github-issue",
            Kind::PullRequest => "github-pull-request",
            Kind::Question => "stackexchange-question",
            Kind::Answer => "stackexchange-answer",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Whether `url` points at an object of this kind. Never fails.
    pub fn recognizes(self, url: &str) -> bool {
        match self {
            Kind::Issue => github::is_issue_url(url),
            Kind::PullRequest => github::is_pull_request_url(url),
            Kind::Question => stackexchange::is_question_url(url),
            Kind::Answer => stackexchange::is_answer_url(url),
        }
    }

    /// Build a reference of this kind from a URL found in source.
    pub fn construct(self, url: &str) -> Result<Reference> {
        let reference = match self {
            Kind::Issue => github::parse_issue_url(url).map(Reference::Issue),
            Kind::PullRequest => github::parse_pull_request_url(url).map(Reference::PullRequest),
            Kind::Question => stackexchange::parse_question_url(url).map(Reference::Question),
            Kind::Answer => stackexchange::parse_answer_url(url).map(Reference::Answer),
        };
        reference.ok_or_else(|| Error::InvalidReference {
            kind: self.tag(),
            url: url.to_string(),
        })
    }

    /// Rebuild a reference of this kind from persisted fields.
    /// Unknown or missing fields are rejected.
    pub fn from_fields(self, fields: serde_yaml::Mapping) -> Result<Reference> {
        Ok(match self {
            Kind::Issue => Reference::Issue(self.decode(fields)?),
            Kind::PullRequest => Reference::PullRequest(self.decode(fields)?),
            Kind::Question => Reference::Question(self.decode(fields)?),
            Kind::Answer => Reference::Answer(self.decode(fields)?),
        })
    }

    fn decode<T: DeserializeOwned>(self, fields: serde_yaml::Mapping) -> Result<T> {
        serde_yaml::from_value(serde_yaml::Value::Mapping(fields)).map_err(|e| Error::InvalidItem {
            kind: self.tag().to_string(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Issue(GithubRef),
    PullRequest(GithubRef),
    Question(StackExchangeRef),
    Answer(StackExchangeRef),
}

impl Reference {
    pub fn kind(&self) -> Kind {
        match self {
            Reference::Issue(_) => Kind::Issue,
            Reference::PullRequest(_) => Kind::PullRequest,
            Reference::Question(_) => Kind::Question,
            Reference::Answer(_) => Kind::Answer,
        }
    }

    /// Human-readable form, also the ordering key within a kind.
    pub fn canonical_url(&self) -> String {
        match self {
            Reference::Issue(r) => r.issue_url(),
            Reference::PullRequest(r) => r.pull_request_url(),
            Reference::Question(r) => r.question_url(),
            Reference::Answer(r) => r.answer_url(),
        }
    }

    pub fn to_record(&self) -> Result<Record> {
        let fields = match self {
            Reference::Issue(r) | Reference::PullRequest(r) => encode(r)?,
            Reference::Question(r) | Reference::Answer(r) => encode(r)?,
        };
        Ok(Record {
            kind: self.kind().tag().to_string(),
            fields,
        })
    }

    /// Start checking this reference against its remote.
    ///
    /// Queries are submitted before this returns, so references refreshed
    /// before the coordinator is flushed share batches.
    pub fn refresh(&mut self, remotes: &Remotes) -> Refresh<'_> {
        match self {
            Reference::Issue(r) | Reference::PullRequest(r) => match &remotes.github {
                Some(github) => Refresh::Pending(r.refresh(github).boxed()),
                None => Refresh::Immediate(false),
            },
            Reference::Question(r) | Reference::Answer(r) => match &remotes.stackexchange {
                Some(stackexchange) => Refresh::Pending(r.refresh(stackexchange).boxed()),
                None => Refresh::Immediate(false),
            },
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<serde_yaml::Mapping> {
    match serde_yaml::to_value(value) {
        Ok(serde_yaml::Value::Mapping(fields)) => Ok(fields),
        Ok(other) => Err(Error::ContractViolation(format!(
            "reference serialized to a non-mapping: {:?}",
            other
        ))),
        Err(e) => Err(Error::ContractViolation(e.to_string())),
    }
}
