//! Reddit listing payloads and the comment forest built from them.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<RawThing>,
    pub after: Option<String>,
}

/// A `{kind, data}` pair. `data` stays untyped until the kind is known.
#[derive(Debug, Clone, Deserialize)]
pub struct RawThing {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostData {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: String,
    pub created_utc: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct CommentData {
    #[serde(default)]
    name: String,
    #[serde(default)]
    parent_id: String,
    #[serde(default)]
    body: String,
    // Either "" or a nested listing.
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MoreData {
    #[serde(default)]
    pub parent_id: String,
    #[serde(default)]
    pub children: Vec<String>,
}

impl MoreData {
    /// "Continue this thread" placeholders carry no child ids; the subtree
    /// has to be loaded through the parent comment's permalink.
    pub fn is_continuation(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentNode {
    Comment {
        name: String,
        parent_id: String,
        body: String,
        replies: Vec<CommentNode>,
    },
    More(MoreData),
}

impl CommentNode {
    fn name(&self) -> Option<&str> {
        match self {
            CommentNode::Comment { name, .. } => Some(name),
            CommentNode::More(_) => None,
        }
    }

    fn parent_id(&self) -> &str {
        match self {
            CommentNode::Comment { parent_id, .. } => parent_id,
            CommentNode::More(more) => &more.parent_id,
        }
    }

    pub fn from_thing(thing: &RawThing) -> Option<Self> {
        match thing.kind.as_str() {
            "t1" => {
                let data: CommentData = serde_json::from_value(thing.data.clone()).ok()?;
                let replies = serde_json::from_value::<Listing>(data.replies)
                    .map(|l| forest(&l.data.children))
                    .unwrap_or_default();
                Some(CommentNode::Comment {
                    name: data.name,
                    parent_id: data.parent_id,
                    body: data.body,
                    replies,
                })
            }
            "more" => serde_json::from_value(thing.data.clone())
                .ok()
                .map(CommentNode::More),
            _ => None,
        }
    }
}

/// Parses the children of a comment listing into a forest, skipping kinds
/// that are not comments or placeholders.
pub fn forest(children: &[RawThing]) -> Vec<CommentNode> {
    children.iter().filter_map(CommentNode::from_thing).collect()
}

/// Rebuilds a forest from the flat, depth-first list returned by
/// `/api/morechildren`. Nodes whose parent is not in the list become roots.
pub fn assemble(flat: Vec<CommentNode>) -> Vec<CommentNode> {
    let index: HashMap<String, usize> = flat
        .iter()
        .enumerate()
        .filter_map(|(i, node)| node.name().map(|n| (n.to_string(), i)))
        .collect();

    let mut slots: Vec<Option<CommentNode>> = flat.into_iter().map(Some).collect();
    let mut roots = Vec::new();

    // Children always follow their parent, so walking backwards lets each
    // node be moved into a parent that has not been moved yet.
    for i in (0..slots.len()).rev() {
        let Some(node) = slots[i].take() else { continue };
        let parent = index
            .get(node.parent_id())
            .copied()
            .filter(|&p| p < i);
        match parent.and_then(|p| slots[p].as_mut()) {
            Some(CommentNode::Comment { replies, .. }) => replies.insert(0, node),
            _ => roots.insert(0, node),
        }
    }

    roots
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenResponse {
    pub json: MoreChildrenJson,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenJson {
    #[serde(default)]
    pub errors: Vec<Value>,
    pub data: Option<MoreChildrenData>,
}

#[derive(Debug, Deserialize)]
pub struct MoreChildrenData {
    #[serde(default)]
    pub things: Vec<RawThing>,
}
