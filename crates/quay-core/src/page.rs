//! Offset/limit pagination types.

/// Default page size applied when building collection requests without an
/// explicit override.
pub const DEFAULT_COLLECTION_LIMIT: u64 = 100;

/// One bounded slice of a server-side collection, addressed by offset and
/// limit, with an optional free-text filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Number of items to skip.
    pub offset: u64,
    /// Maximum number of items per page. Always greater than zero.
    pub limit: u64,
    /// Optional free-text filter, sent as the `q` query parameter.
    pub q: Option<String>,
}

impl PageRequest {
    /// A page request with the defaults: offset 0, limit 10.
    pub fn new() -> Self {
        Self {
            offset: 0,
            limit: 10,
            q: None,
        }
    }

    /// Override the page size. Values of zero fall back to the default
    /// limit of 10.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = if limit == 0 { 10 } else { limit };
        self
    }

    /// Override the starting offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Attach a free-text filter.
    pub fn with_query(mut self, q: impl Into<String>) -> Self {
        self.q = Some(q.into());
        self
    }

    /// Materialize the offset/limit (and filter, when present) as query
    /// parameters.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("offset".to_string(), self.offset.to_string()),
            ("limit".to_string(), self.limit.to_string()),
        ];
        if let Some(ref q) = self.q {
            pairs.push(("q".to_string(), q.clone()));
        }
        pairs
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// One page of a collection response: the items in server order plus the
/// total server-side collection size at the time of the request.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Total number of items in the collection, as reported by the server.
    pub total_count: u64,
    /// The items on this page, in server order.
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_offset_zero_limit_ten() {
        let page = PageRequest::new();
        assert_eq!(page.offset, 0);
        assert_eq!(page.limit, 10);
        assert!(page.q.is_none());
    }

    #[test]
    fn zero_limit_falls_back_to_default() {
        let page = PageRequest::new().with_limit(0);
        assert_eq!(page.limit, 10);
    }

    #[test]
    fn query_pairs_include_filter() {
        let page = PageRequest::new()
            .with_offset(20)
            .with_limit(50)
            .with_query("name:demo");
        assert_eq!(
            page.query_pairs(),
            vec![
                ("offset".to_string(), "20".to_string()),
                ("limit".to_string(), "50".to_string()),
                ("q".to_string(), "name:demo".to_string()),
            ]
        );
    }

    #[test]
    fn query_pairs_omit_absent_filter() {
        let page = PageRequest::new();
        assert_eq!(page.query_pairs().len(), 2);
    }
}
