use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::listing::{
    assemble, forest, CommentNode, Listing, MoreChildrenResponse, MoreData, PostData,
};
use super::ForumError;
use crate::thread::Thread;

/// Reddit caps listing pages at 100 items.
const MAX_PAGE_SIZE: usize = 100;
/// Reddit caps `/api/morechildren` at 100 ids per call.
const MORE_CHILDREN_CHUNK: usize = 100;
const COMMENT_LIMIT: &str = "500";

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Application-only OAuth client for reading community listings.
#[derive(Debug)]
pub struct RedditClient {
    http: Client,
    credentials: RedditCredentials,
    auth_url: String,
    api_base: String,
    page_size: usize,
    token: OnceCell<String>,
}

impl RedditClient {
    pub fn new(
        credentials: RedditCredentials,
        auth_url: &str,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, ForumError> {
        let http = Client::builder()
            .user_agent(&credentials.user_agent)
            .timeout(timeout)
            .build()
            .map_err(|source| ForumError::Network {
                endpoint: "client setup".into(),
                source,
            })?;

        Ok(Self {
            http,
            credentials,
            auth_url: auth_url.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            page_size: MAX_PAGE_SIZE,
            token: OnceCell::new(),
        })
    }

    #[cfg(test)]
    fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Fetches the `limit` newest posts of `community` with fully expanded
    /// comment trees, in the order Reddit lists them.
    pub async fn fetch(
        &self,
        community: &str,
        limit: usize,
        mut on_post: impl FnMut(&Thread),
    ) -> Result<Vec<Thread>, ForumError> {
        let posts = self.newest_posts(community, limit).await?;
        info!(community, posts = posts.len(), "listed newest posts");

        let mut threads = Vec::with_capacity(posts.len());
        for post in posts {
            let comments = self.comment_bodies(&post.id).await?;
            let thread = into_thread(post, comments)?;
            debug!(id = %thread.id, comment_chars = thread.comments.len(), "fetched thread");
            on_post(&thread);
            threads.push(thread);
        }

        Ok(threads)
    }

    async fn newest_posts(&self, community: &str, limit: usize) -> Result<Vec<PostData>, ForumError> {
        let endpoint = format!("/r/{}/new", community);
        let mut posts = Vec::new();
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let page_limit = (limit - posts.len()).min(self.page_size).to_string();
            let mut query = vec![("limit", page_limit.as_str()), ("raw_json", "1")];
            if let Some(cursor) = after.as_deref() {
                query.push(("after", cursor));
            }

            let listing: Listing = self.get_json(&endpoint, &query).await?;
            let page_len = listing.data.children.len();

            for child in listing.data.children {
                if child.kind != "t3" {
                    continue;
                }
                let post: PostData =
                    serde_json::from_value(child.data).map_err(|e| ForumError::Payload {
                        endpoint: endpoint.clone(),
                        details: e.to_string(),
                    })?;
                posts.push(post);
            }

            after = listing.data.after;
            if after.is_none() || page_len == 0 {
                break;
            }
        }

        posts.truncate(limit);
        Ok(posts)
    }

    /// Comment bodies of a post in depth-first order, with every
    /// "load more" and "continue this thread" placeholder resolved.
    async fn comment_bodies(&self, post_id: &str) -> Result<String, ForumError> {
        let mut stack: Vec<CommentNode> = self.comment_forest(post_id, None).await?;
        stack.reverse();

        let mut bodies: Vec<String> = Vec::new();
        let mut continued: HashSet<String> = HashSet::new();

        while let Some(node) = stack.pop() {
            match node {
                CommentNode::Comment { body, replies, .. } => {
                    bodies.push(body);
                    stack.extend(replies.into_iter().rev());
                }
                CommentNode::More(more) if more.is_continuation() => {
                    let Some(parent) = more.parent_id.strip_prefix("t1_") else {
                        continue;
                    };
                    if !continued.insert(parent.to_string()) {
                        continue;
                    }
                    let replies = self.continued_replies(post_id, parent).await?;
                    stack.extend(replies.into_iter().rev());
                }
                CommentNode::More(mut more) => {
                    let rest = more
                        .children
                        .split_off(more.children.len().min(MORE_CHILDREN_CHUNK));
                    if !rest.is_empty() {
                        stack.push(CommentNode::More(MoreData {
                            parent_id: more.parent_id.clone(),
                            children: rest,
                        }));
                    }
                    let expanded = self.more_children(post_id, &more.children).await?;
                    stack.extend(expanded.into_iter().rev());
                }
            }
        }

        Ok(bodies.join(" "))
    }

    async fn comment_forest(
        &self,
        post_id: &str,
        focus: Option<&str>,
    ) -> Result<Vec<CommentNode>, ForumError> {
        let endpoint = format!("/comments/{}", post_id);
        let mut query = vec![("limit", COMMENT_LIMIT), ("raw_json", "1")];
        if let Some(comment) = focus {
            query.push(("comment", comment));
        }

        // [post listing, comment listing]
        let pages: Vec<Listing> = self.get_json(&endpoint, &query).await?;
        let comments = pages.into_iter().nth(1).ok_or_else(|| ForumError::Payload {
            endpoint: endpoint.clone(),
            details: "missing comment listing".into(),
        })?;

        Ok(forest(&comments.data.children))
    }

    async fn continued_replies(
        &self,
        post_id: &str,
        parent: &str,
    ) -> Result<Vec<CommentNode>, ForumError> {
        let focused = self.comment_forest(post_id, Some(parent)).await?;
        Ok(focused
            .into_iter()
            .find_map(|node| match node {
                CommentNode::Comment { replies, .. } => Some(replies),
                CommentNode::More(_) => None,
            })
            .unwrap_or_default())
    }

    async fn more_children(
        &self,
        post_id: &str,
        children: &[String],
    ) -> Result<Vec<CommentNode>, ForumError> {
        let endpoint = "/api/morechildren";
        let link_id = format!("t3_{}", post_id);
        let ids = children.join(",");
        let query = [
            ("api_type", "json"),
            ("link_id", link_id.as_str()),
            ("children", ids.as_str()),
            ("limit_children", "false"),
            ("raw_json", "1"),
        ];

        let response: MoreChildrenResponse = self.get_json(endpoint, &query).await?;
        if !response.json.errors.is_empty() {
            return Err(ForumError::Payload {
                endpoint: endpoint.into(),
                details: format!("{:?}", response.json.errors),
            });
        }

        let things = response.json.data.map(|d| d.things).unwrap_or_default();
        Ok(assemble(forest(&things)))
    }

    async fn access_token(&self) -> Result<&str, ForumError> {
        let token = self
            .token
            .get_or_try_init(|| async {
                let response = self
                    .http
                    .post(&self.auth_url)
                    .basic_auth(
                        &self.credentials.client_id,
                        Some(&self.credentials.client_secret),
                    )
                    .form(&[("grant_type", "client_credentials")])
                    .send()
                    .await
                    .map_err(|source| ForumError::Network {
                        endpoint: self.auth_url.clone(),
                        source,
                    })?;

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ForumError::Auth {
                        status: status.as_u16(),
                        body,
                    });
                }

                let token: TokenResponse =
                    response.json().await.map_err(|e| ForumError::Payload {
                        endpoint: self.auth_url.clone(),
                        details: e.to_string(),
                    })?;
                debug!("obtained Reddit application token");
                Ok(token.access_token)
            })
            .await?;

        Ok(token.as_str())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ForumError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.api_base, endpoint);

        debug!(endpoint, "Reddit API request");
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|source| ForumError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => ForumError::Auth {
                    status: status.as_u16(),
                    body,
                },
                _ => ForumError::Status {
                    endpoint: endpoint.to_string(),
                    status: status.as_u16(),
                    body,
                },
            });
        }

        response.json().await.map_err(|e| ForumError::Payload {
            endpoint: endpoint.to_string(),
            details: e.to_string(),
        })
    }
}

fn into_thread(post: PostData, comments: String) -> Result<Thread, ForumError> {
    let created = chrono::DateTime::from_timestamp(post.created_utc as i64, 0)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| ForumError::Payload {
            endpoint: format!("/comments/{}", post.id),
            details: format!("invalid created_utc {}", post.created_utc),
        })?;

    Ok(Thread {
        id: post.id,
        title: post.title,
        body: post.selftext,
        comments,
        url: post.url,
        created,
        summary: None,
    })
}
