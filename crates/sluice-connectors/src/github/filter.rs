//! Filter fields the GitHub pulls endpoint can apply, and the request they
//! render to.

use sluice_core::{CompareOp, Comparison, FilterVocabulary};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullRequestFilter {
    pub state: Option<String>,
    pub head: Option<String>,
    pub base: Option<String>,
    pub author: Option<String>,
}

impl FilterVocabulary for PullRequestFilter {
    fn accept(&mut self, c: &Comparison) -> bool {
        let (CompareOp::Eq, Some(value)) = (c.op, c.value.as_text()) else {
            return false;
        };
        let slot = match c.field.as_str() {
            "state" => &mut self.state,
            "head" => &mut self.head,
            "base" => &mut self.base,
            "author" => &mut self.author,
            _ => return false,
        };
        *slot = Some(value.to_string());
        true
    }

    fn is_empty(&self) -> bool {
        *self == PullRequestFilter::default()
    }
}

/// Request parameters for one pull request listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullRequestQuery {
    /// `open` or `closed`; `None` lists every state.
    pub state: Option<String>,
    /// `owner:branch`.
    pub head: Option<String>,
    pub base: Option<String>,
    /// Carried for API flavours that can filter by author; the REST pulls
    /// endpoint cannot.
    pub author: Option<String>,
}

impl PullRequestQuery {
    pub fn from_filter(filter: &PullRequestFilter) -> Self {
        let state = filter
            .state
            .as_deref()
            .filter(|s| matches!(*s, "open" | "closed"))
            .map(str::to_string);
        // The endpoint only understands `owner:branch`; a bare branch name
        // is left to the host.
        let head = filter.head.clone().filter(|h| h.contains(':'));
        Self {
            state,
            head,
            base: filter.base.clone(),
            author: filter.author.clone(),
        }
    }

    /// Query string pairs for the list endpoint.
    pub fn query_pairs(&self, page: usize, per_page: usize) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("state", self.state.clone().unwrap_or_else(|| "all".to_string()))];
        if let Some(head) = &self.head {
            pairs.push(("head", head.clone()));
        }
        if let Some(base) = &self.base {
            pairs.push(("base", base.clone()));
        }
        pairs.push(("per_page", per_page.to_string()));
        pairs.push(("page", page.to_string()));
        pairs
    }
}
