//! Resource handlers: knowledge CRUD, reasoning knowledge CRUD, and the completed-run archive.

pub(crate) mod knowledge;
pub(crate) mod reasoning;
pub(crate) mod tasks;

/// `?skip=&limit=` paging. `limit` is capped at [`MAX_PAGE`].
#[derive(Debug, serde::Deserialize)]
pub(crate) struct Page {
    #[serde(default)]
    pub(crate) skip: usize,
    #[serde(default = "default_limit")]
    pub(crate) limit: usize,
}

pub(crate) const MAX_PAGE: usize = 500;

fn default_limit() -> usize {
    100
}

impl Page {
    pub(crate) fn limit(&self) -> usize {
        self.limit.min(MAX_PAGE)
    }
}
